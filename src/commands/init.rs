//! Init command implementation.

use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::config::Config;

/// Run the init command
pub fn run(config_path: &Path, force: bool) -> Result<()> {
    Config::write_default(config_path, force)?;
    info!("Configuration written to {}", config_path.display());
    info!("Edit the rules, then run: rulekit build");
    Ok(())
}
