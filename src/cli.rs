//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rulekit")]
#[command(author, version, about = "Per-outbound routing rule-set builder")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "rulekit.yaml", global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load all lists and write one rule-set per outbound
    Build {
        /// Load and classify but write nothing
        #[arg(long)]
        dry_run: bool,

        /// Write JSON rule-sets but skip the compiler
        #[arg(long)]
        no_compile: bool,

        /// Exit non-zero if any list fails to load or any rule-set fails to compile
        #[arg(long)]
        strict: bool,

        /// Only build these outbounds (repeatable)
        #[arg(long = "outbound", value_name = "NAME")]
        outbounds: Vec<String>,

        /// Override the configured output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Write a JSON build summary to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Validate the configuration and list outbounds
    Check,

    /// Show how list entries would be classified
    Classify {
        /// Entries to classify (domains, IPs, CIDRs, list references)
        #[arg(required = true)]
        tokens: Vec<String>,
    },

    /// Write a starter configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show version
    Version,
}
