//! Build command implementation.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::compiler::SingBoxCompiler;
use crate::config::Config;
use crate::emitter::{count_compile_failures, EmittedOutbound, Emitter};
use crate::events::{BuildObserver, TracingObserver};
use crate::loader::Loader;
use crate::lock::LockGuard;
use crate::pipeline::{DeclarationFailure, Pipeline};
use crate::resolver::Resolver;
use crate::summary::BuildSummary;

/// Flags of the `build` subcommand.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub dry_run: bool,
    pub no_compile: bool,
    pub strict: bool,
    pub outbounds: Vec<String>,
    pub output_dir: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

/// Run the build command
pub async fn run(options: BuildOptions, config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let declarations = config.declarations_for(&options.outbounds)?;
    if declarations.is_empty() {
        warn!("No rules configured. Check your configuration.");
        return Ok(());
    }

    let output_dir = options
        .output_dir
        .clone()
        .unwrap_or_else(|| config.output_dir());

    // Dry runs write nothing, so they never contend for the directory
    let _lock = if options.dry_run {
        None
    } else {
        Some(LockGuard::acquire(&output_dir)?)
    };

    let observer: Arc<dyn BuildObserver> = Arc::new(TracingObserver);
    let loader = Arc::new(Loader::new(config.base_dir(), config.fetch.clone())?);
    let pipeline = Pipeline::new(
        loader.clone(),
        Resolver::new(config.classifier()),
        observer.clone(),
    )
    .with_concurrency(config.concurrency);

    info!(
        "Building {} rules ({} at a time)...",
        declarations.len(),
        pipeline.concurrency()
    );
    let report = pipeline.build(&declarations).await;

    let downloaded = loader.total_downloaded();
    if downloaded > 0 {
        info!("Downloaded {} KiB of remote lists", downloaded.div_ceil(1024));
    }

    let mut emitter = Emitter::new(&output_dir, observer).dry_run(options.dry_run);
    if config.compiler.enabled && !options.no_compile {
        emitter = emitter.with_compiler(Box::new(SingBoxCompiler::new(
            config.compiler.binary.clone(),
        )));
    }
    let emitted = emitter.emit_all(&report.outbounds)?;

    let summary = BuildSummary::new(&emitted, &report.failures);
    summary.display();

    if let Some(path) = &options.report {
        summary.save(path)?;
        info!("Build summary written to {}", path.display());
    }

    if options.dry_run {
        info!("Dry-run mode: nothing written to {}", output_dir.display());
    }

    check_outcome(&options, &emitted, &report.failures)
}

/// Decide the exit status of a finished build.
///
/// Fails when outbounds exist but none produced a document, and in strict
/// mode when any rule failed to load or any rule-set failed to compile.
pub fn check_outcome(
    options: &BuildOptions,
    emitted: &[EmittedOutbound],
    failures: &[DeclarationFailure],
) -> Result<()> {
    if !options.dry_run
        && !emitted.is_empty()
        && !emitted.iter().any(|e| e.outcome.wrote_document())
    {
        anyhow::bail!(
            "No rule-set was written: {} outbounds are empty ({} rules failed to load)",
            emitted.len(),
            failures.len()
        );
    }

    if options.strict {
        if !failures.is_empty() {
            anyhow::bail!("{} rules failed to load (strict mode)", failures.len());
        }
        let compile_failures = count_compile_failures(emitted);
        if compile_failures > 0 {
            anyhow::bail!(
                "{} rule-sets failed to compile (strict mode)",
                compile_failures
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::EmitOutcome;
    use crate::error::{CompileError, LoadError};
    use std::io;
    use tempfile::TempDir;

    fn emitted(name: &str, outcome: EmitOutcome) -> EmittedOutbound {
        EmittedOutbound {
            outbound: name.to_string(),
            domains: 1,
            subnets: 0,
            outcome,
        }
    }

    fn written(name: &str) -> EmittedOutbound {
        emitted(
            name,
            EmitOutcome::Written {
                source: PathBuf::from(format!("{}-rule.json", name)),
            },
        )
    }

    fn compile_failed(name: &str) -> EmittedOutbound {
        emitted(
            name,
            EmitOutcome::CompileFailed {
                source: PathBuf::from(format!("{}-rule.json", name)),
                error: CompileError::Exit {
                    code: Some(1),
                    stderr: String::new(),
                },
            },
        )
    }

    fn failure() -> DeclarationFailure {
        DeclarationFailure {
            index: 0,
            outbound: "proxy".to_string(),
            error: LoadError::new("x.txt", io::Error::new(io::ErrorKind::NotFound, "gone")),
        }
    }

    #[test]
    fn test_outcome_ok_with_compile_failure_by_default() {
        let options = BuildOptions::default();
        assert!(check_outcome(&options, &[written("a"), compile_failed("b")], &[failure()]).is_ok());
    }

    #[test]
    fn test_outcome_fails_when_nothing_written() {
        let options = BuildOptions::default();
        let result = check_outcome(
            &options,
            &[emitted("a", EmitOutcome::Skipped), emitted("b", EmitOutcome::Skipped)],
            &[failure()],
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("No rule-set was written"));
    }

    #[test]
    fn test_outcome_dry_run_never_fails_on_empty() {
        let options = BuildOptions {
            dry_run: true,
            ..Default::default()
        };
        assert!(check_outcome(&options, &[emitted("a", EmitOutcome::Skipped)], &[]).is_ok());
    }

    #[test]
    fn test_outcome_strict_load_failure() {
        let options = BuildOptions {
            strict: true,
            ..Default::default()
        };
        assert!(check_outcome(&options, &[written("a")], &[]).is_ok());
        assert!(check_outcome(&options, &[written("a")], &[failure()]).is_err());
    }

    #[test]
    fn test_outcome_strict_compile_failure() {
        let options = BuildOptions {
            strict: true,
            ..Default::default()
        };
        let err = check_outcome(&options, &[written("a"), compile_failed("b")], &[]).unwrap_err();
        assert!(err.to_string().contains("failed to compile"));
    }

    #[tokio::test]
    async fn test_run_writes_rule_sets() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cn.txt"), "1.1.1.1/32\n# comment\n").unwrap();
        let config_path = dir.path().join("rulekit.yaml");
        std::fs::write(
            &config_path,
            r#"
output_dir: out
compiler:
  enabled: false
rules:
  - outbound: direct
    list: ["8.8.8.8", "example.com"]
  - outbound: direct
    subnets: cn.txt
  - outbound: block
    list: ["missing/list.txt"]
"#,
        )
        .unwrap();

        let report_path = dir.path().join("summary.json");
        let options = BuildOptions {
            report: Some(report_path.clone()),
            ..Default::default()
        };
        run(options, &config_path).await.unwrap();

        let doc: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("out/direct-rule.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(doc["version"], 3);
        assert_eq!(doc["rules"][0]["domain_suffix"][0], "example.com");
        assert_eq!(
            doc["rules"][1]["ip_cidr"],
            serde_json::json!(["8.8.8.8/32", "1.1.1.1/32"])
        );
        assert!(!dir.path().join("out/block-rule.json").exists());

        let summary = BuildSummary::load(&report_path).unwrap();
        assert_eq!(summary.failed_declarations.len(), 1);
        assert_eq!(summary.outbounds.len(), 2);
    }

    #[tokio::test]
    async fn test_run_strict_fails_on_missing_list() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("rulekit.yaml");
        std::fs::write(
            &config_path,
            "compiler:\n  enabled: false\nrules:\n  - outbound: direct\n    list: [a.com]\n  - outbound: direct\n    domains: nope.txt\n",
        )
        .unwrap();

        let options = BuildOptions {
            strict: true,
            ..Default::default()
        };
        assert!(run(options, &config_path).await.is_err());
        // The surviving rule was still written
        assert!(dir.path().join("rule-sets/direct-rule.json").exists());
    }

    #[tokio::test]
    async fn test_run_missing_config() {
        let result = run(BuildOptions::default(), Path::new("/nonexistent/rulekit.yaml")).await;
        assert!(result.is_err());
    }
}
