//! Check command implementation.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::{Config, RuleDeclaration};

/// Run the check command
pub fn run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    println!();
    println!("Configuration OK: {}", config_path.display());
    println!("  Output directory: {}", config.output_dir().display());
    println!("  Concurrency: {}", config.concurrency);
    println!(
        "  IP parsing: {}",
        if config.strict_ip_parsing {
            "strict"
        } else {
            "heuristic"
        }
    );
    if config.compiler.enabled {
        println!("  Compiler: {}", config.compiler.binary);
    } else {
        println!("  Compiler: disabled");
    }
    println!();

    let outbounds = config.outbounds();
    if outbounds.is_empty() {
        println!("No rules configured.");
        println!();
        return Ok(());
    }

    println!(" OUTBOUND           RULES  SOURCES  INLINE");
    println!(" ────────────────── ─────  ───────  ──────");
    for outbound in outbounds {
        let rules: Vec<&RuleDeclaration> = config
            .rules
            .iter()
            .filter(|r| r.outbound == outbound)
            .collect();
        println!(
            " {:<18} {:>5}  {:>7}  {:>6}",
            outbound,
            rules.len(),
            rules.iter().map(|r| source_count(r)).sum::<usize>(),
            rules.iter().map(|r| r.list.len()).sum::<usize>(),
        );
    }
    println!();

    Ok(())
}

/// Number of file/URL sources a declaration names directly.
fn source_count(rule: &RuleDeclaration) -> usize {
    usize::from(rule.domains.is_some()) + usize::from(rule.subnets.is_some())
}
