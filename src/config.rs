//! Configuration management for rulekit.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::classifier::Classifier;
use crate::loader::FetchSettings;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where rule-set documents are written (relative to the config file)
    pub output_dir: PathBuf,

    /// Maximum number of rule declarations loaded at once
    pub concurrency: usize,

    /// Use full address parsing instead of the fast heuristic
    pub strict_ip_parsing: bool,

    /// Rule-set compiler invocation
    pub compiler: CompilerConfig,

    /// HTTP fetch settings for remote lists
    pub fetch: FetchSettings,

    /// Rule declarations, processed in order
    pub rules: Vec<RuleDeclaration>,

    /// Directory of the loaded config file; relative paths resolve against it
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("rule-sets"),
            concurrency: 4,
            strict_ip_parsing: false,
            compiler: CompilerConfig::default(),
            fetch: FetchSettings::default(),
            rules: Vec::new(),
            base_dir: PathBuf::from("."),
        }
    }
}

/// One rule declaration: sources that feed a single outbound.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleDeclaration {
    /// Outbound key these entries route to
    pub outbound: String,

    /// List of domains only (file path or URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domains: Option<String>,

    /// List of IPs/CIDRs only (file path or URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnets: Option<String>,

    /// Inline entries: domains, IPs/CIDRs, or references to further lists
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub list: Vec<String>,
}

impl RuleDeclaration {
    pub fn has_sources(&self) -> bool {
        self.domains.is_some() || self.subnets.is_some() || !self.list.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompilerConfig {
    /// Compile emitted documents into binary rule-sets
    pub enabled: bool,
    /// Compiler executable (looked up in PATH when not absolute)
    pub binary: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: "sing-box".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.base_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Ok(config)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be at least 1");
        }

        if self.compiler.enabled && self.compiler.binary.trim().is_empty() {
            anyhow::bail!("compiler.binary cannot be empty when the compiler is enabled");
        }

        for (i, rule) in self.rules.iter().enumerate() {
            validate_outbound_key(&rule.outbound)
                .with_context(|| format!("Invalid rule #{}", i + 1))?;

            if !rule.has_sources() {
                anyhow::bail!(
                    "Rule #{} for '{}' has no domains, subnets or list",
                    i + 1,
                    rule.outbound
                );
            }

            for source in [&rule.domains, &rule.subnets].into_iter().flatten() {
                if source.trim().is_empty() {
                    anyhow::bail!("Rule #{} for '{}' has an empty source", i + 1, rule.outbound);
                }
            }
        }

        Ok(())
    }

    /// Directory relative paths are resolved against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Output directory, resolved against the config file's directory.
    pub fn output_dir(&self) -> PathBuf {
        if self.output_dir.is_absolute() {
            self.output_dir.clone()
        } else {
            self.base_dir.join(&self.output_dir)
        }
    }

    pub fn classifier(&self) -> Classifier {
        Classifier::from_strict_flag(self.strict_ip_parsing)
    }

    /// Distinct outbound keys in first-seen order.
    pub fn outbounds(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.rules
            .iter()
            .map(|r| r.outbound.as_str())
            .filter(|o| seen.insert(*o))
            .collect()
    }

    /// Declarations for the selected outbounds (all when `filter` is empty).
    ///
    /// Fails if the filter names an outbound no rule references.
    pub fn declarations_for(&self, filter: &[String]) -> Result<Vec<RuleDeclaration>> {
        if filter.is_empty() {
            return Ok(self.rules.clone());
        }

        let known = self.outbounds();
        for name in filter {
            if !known.contains(&name.as_str()) {
                anyhow::bail!(
                    "Unknown outbound '{}'. Configured outbounds: {}",
                    name,
                    known.join(", ")
                );
            }
        }

        Ok(self
            .rules
            .iter()
            .filter(|r| filter.contains(&r.outbound))
            .cloned()
            .collect())
    }

    /// Generate default config with comments
    pub fn generate_default_yaml() -> String {
        include_str!("../templates/rulekit.yaml").to_string()
    }

    /// Write the default config atomically.
    ///
    /// Uses tempfile + rename pattern to prevent corruption on crash.
    pub fn write_default<P: AsRef<Path>>(path: P, force: bool) -> Result<()> {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let path = path.as_ref();
        if path.exists() && !force {
            anyhow::bail!("{:?} already exists (use --force to overwrite)", path);
        }

        let parent_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent_dir)
            .with_context(|| format!("Failed to create directory {:?}", parent_dir))?;

        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .context("Failed to create temporary file for config")?;
        temp_file.write_all(Self::generate_default_yaml().as_bytes())?;
        temp_file.as_file().sync_all()?;
        temp_file
            .persist(path)
            .with_context(|| format!("Failed to persist config file: {:?}", path))?;

        Ok(())
    }
}

/// Outbound keys become file names, so only a conservative charset is allowed.
pub fn validate_outbound_key(key: &str) -> Result<()> {
    if key.is_empty() {
        anyhow::bail!("outbound cannot be empty");
    }
    if key.starts_with('.') {
        anyhow::bail!("outbound '{}' cannot start with '.'", key);
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "._-".contains(c))
    {
        anyhow::bail!(
            "outbound '{}' contains invalid characters (allowed: A-Z a-z 0-9 . _ -)",
            key
        );
    }
    Ok(())
}
