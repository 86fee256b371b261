//! Error types for rulekit.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RulekitError {
    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Another build is already running in {0}")]
    Locked(String),
}

/// Why a source could not be retrieved.
#[derive(Error, Debug)]
pub enum LoadCause {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("response too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: usize, max: usize },
}

/// A named source (file or URL) could not be retrieved.
#[derive(Error, Debug)]
#[error("Failed to load {identifier}: {cause}")]
pub struct LoadError {
    pub identifier: String,
    pub cause: LoadCause,
}

impl LoadError {
    pub fn new(identifier: impl Into<String>, cause: impl Into<LoadCause>) -> Self {
        Self {
            identifier: identifier.into(),
            cause: cause.into(),
        }
    }
}

/// The external rule-set compiler failed for one outbound.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Failed to run compiler {binary}: {reason}")]
    Spawn { binary: String, reason: String },

    #[error("Compiler exited with {}: {stderr}", exit_label(.code))]
    Exit { code: Option<i32>, stderr: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {}", c),
        None => "signal".to_string(),
    }
}
