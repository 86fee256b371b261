//! rulekit - Per-outbound routing rule-set builder

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use rulekit::cli::{Cli, Commands};
use rulekit::commands::build::BuildOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Execute command
    match cli.command {
        Commands::Build {
            dry_run,
            no_compile,
            strict,
            outbounds,
            output_dir,
            report,
        } => {
            let options = BuildOptions {
                dry_run,
                no_compile,
                strict,
                outbounds,
                output_dir,
                report,
            };
            rulekit::commands::build::run(options, &cli.config).await
        }
        Commands::Check => rulekit::commands::check::run(&cli.config),
        Commands::Classify { tokens } => rulekit::commands::classify::run(&tokens, &cli.config),
        Commands::Init { force } => rulekit::commands::init::run(&cli.config, force),
        Commands::Version => {
            println!("rulekit {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
