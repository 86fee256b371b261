//! # rulekit - Per-outbound routing rule-set builder
//!
//! Reads rule declarations that route domain and IP lists to named outbounds,
//! classifies and normalizes every entry, merges and deduplicates them per
//! outbound, and writes one version-3 rule-set document per outbound for a
//! sing-box style proxy (optionally compiled to binary form).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        rulekit                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: build, check, classify, init, version      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml)                                        │
//! │    └── Rule declarations: domains / subnets / list          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Loader (reqwest + rustls, local files)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pipeline (futures, bounded concurrency)                    │
//! │    ├── Classifier: IPv4 / IPv6 / not an IP                  │
//! │    ├── Normalizer: domain suffix, CIDR                      │
//! │    ├── Resolver: mixed entries and list references          │
//! │    └── Accumulator: merge and deduplicate per outbound      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Emitter (serde_json)                                       │
//! │    └── RuleSetCompiler (sing-box rule-set compile)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use rulekit::config::Config;
//! use rulekit::emitter::Emitter;
//! use rulekit::events::TracingObserver;
//! use rulekit::loader::Loader;
//! use rulekit::pipeline::Pipeline;
//! use rulekit::resolver::Resolver;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("rulekit.yaml")?;
//!     let observer = Arc::new(TracingObserver);
//!
//!     let loader = Loader::new(config.base_dir(), config.fetch.clone())?;
//!     let pipeline = Pipeline::new(
//!         Arc::new(loader),
//!         Resolver::new(config.classifier()),
//!         observer.clone(),
//!     );
//!     let report = pipeline.build(&config.rules).await;
//!
//!     let emitter = Emitter::new(config.output_dir(), observer);
//!     for result in emitter.emit_all(&report.outbounds)? {
//!         println!("{}: {}", result.outbound, result.outcome.status());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`accumulator`] - Per-outbound merge and deduplication
//! - [`classifier`] - IP/CIDR detection
//! - [`cli`] - Command-line interface definitions
//! - [`cmd_abstraction`] - External command execution (mockable)
//! - [`commands`] - CLI command implementations
//! - [`compiler`] - Rule-set compiler invocation
//! - [`config`] - Configuration parsing and validation
//! - [`emitter`] - Rule-set document generation
//! - [`error`] - Error types
//! - [`events`] - Build progress events and observers
//! - [`fs_abstraction`] - Filesystem access (mockable)
//! - [`loader`] - Local and HTTP list loading
//! - [`lock`] - Output directory locking
//! - [`normalize`] - Domain suffix and CIDR normalization
//! - [`pipeline`] - Declaration processing
//! - [`resolver`] - Mixed entry routing
//! - [`summary`] - Build summary report

pub mod accumulator;
pub mod classifier;
pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod compiler;
pub mod config;
pub mod emitter;
pub mod error;
pub mod events;
pub mod fs_abstraction;
pub mod loader;
pub mod lock;
pub mod normalize;
pub mod pipeline;
pub mod resolver;
pub mod summary;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::RulekitError;
