//! Compilation of rule-set source documents into binary rule-sets.

use std::path::Path;

#[cfg(test)]
use mockall::automock;

use crate::cmd_abstraction::{CommandExecutor, SystemExecutor};
use crate::error::CompileError;

/// Turns a rule-set source document into a compiled artifact.
#[cfg_attr(test, automock)]
pub trait RuleSetCompiler: Send + Sync {
    fn compile(&self, source: &Path, output: &Path) -> Result<(), CompileError>;
}

/// Runs `<binary> rule-set compile --output <output> <source>`.
pub struct SingBoxCompiler {
    binary: String,
    executor: Box<dyn CommandExecutor>,
}

impl SingBoxCompiler {
    pub fn new(binary: impl Into<String>) -> Self {
        Self::with_executor(binary, Box::new(SystemExecutor))
    }

    pub fn with_executor(binary: impl Into<String>, executor: Box<dyn CommandExecutor>) -> Self {
        Self {
            binary: binary.into(),
            executor,
        }
    }
}

impl RuleSetCompiler for SingBoxCompiler {
    fn compile(&self, source: &Path, output: &Path) -> Result<(), CompileError> {
        let args = vec![
            "rule-set".to_string(),
            "compile".to_string(),
            "--output".to_string(),
            output.display().to_string(),
            source.display().to_string(),
        ];

        let result = self
            .executor
            .execute(&self.binary, &args)
            .map_err(|e| CompileError::Spawn {
                binary: self.binary.clone(),
                reason: format!("{:#}", e),
            })?;

        if result.succeeded() {
            Ok(())
        } else {
            Err(CompileError::Exit {
                code: result.code,
                stderr: result.stderr.trim().to_string(),
            })
        }
    }
}
