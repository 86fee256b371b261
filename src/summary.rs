//! Build summary: a machine-readable record of one `build` run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::emitter::{count_compile_failures, EmitOutcome, EmittedOutbound};
use crate::events::{compact_count, entry_counts};
use crate::pipeline::DeclarationFailure;

/// Width of the outbound name column in [`BuildSummary::display`]
const NAME_WIDTH: usize = 18;

/// Everything a CI job needs to know about a build
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BuildSummary {
    pub generated_at: Option<DateTime<Utc>>,
    pub outbounds: Vec<OutboundSummary>,
    pub failed_declarations: Vec<FailedDeclaration>,
    pub total_domains: usize,
    pub total_subnets: usize,
    #[serde(default)]
    pub compile_failures: usize,
}

/// Result for a single outbound
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutboundSummary {
    pub name: String,
    pub domains: usize,
    pub subnets: usize,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiled: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedDeclaration {
    /// 0-based position in the configuration's `rules`
    pub index: usize,
    pub outbound: String,
    pub error: String,
}

impl BuildSummary {
    /// Record emission results and load failures, stamped with the current time.
    pub fn new(emitted: &[EmittedOutbound], failures: &[DeclarationFailure]) -> Self {
        let outbounds: Vec<OutboundSummary> = emitted
            .iter()
            .map(|e| OutboundSummary {
                name: e.outbound.clone(),
                domains: e.domains,
                subnets: e.subnets,
                status: e.outcome.status().to_string(),
                source: e
                    .outcome
                    .wrote_document()
                    .then(|| e.outcome.source_path().map(Path::to_path_buf))
                    .flatten(),
                compiled: e.outcome.compiled_path().map(Path::to_path_buf),
                error: match &e.outcome {
                    EmitOutcome::CompileFailed { error, .. } => Some(error.to_string()),
                    _ => None,
                },
            })
            .collect();

        Self {
            generated_at: Some(Utc::now()),
            total_domains: outbounds.iter().map(|o| o.domains).sum(),
            total_subnets: outbounds.iter().map(|o| o.subnets).sum(),
            compile_failures: count_compile_failures(emitted),
            outbounds,
            failed_declarations: failures
                .iter()
                .map(|f| FailedDeclaration {
                    index: f.index,
                    outbound: f.outbound.clone(),
                    error: f.error.to_string(),
                })
                .collect(),
        }
    }

    /// Load a summary previously written by [`BuildSummary::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read build summary: {:?}", path))?;
        serde_json::from_str(&content).context("Failed to parse build summary")
    }

    /// Write the summary as JSON, atomically.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize build summary")?;

        let mut temp_file = NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {:?}", parent))?;
        temp_file
            .write_all(content.as_bytes())
            .context("Failed to write build summary")?;
        temp_file
            .persist(path)
            .with_context(|| format!("Failed to persist build summary to {:?}", path))?;
        Ok(())
    }

    /// Print a table of outbounds to stdout.
    pub fn display(&self) {
        println!();
        println!(" OUTBOUND             DOMAINS      SUBNETS  STATUS");
        println!(" ────────────────── ──────────── ──────────── ──────────────");
        for outbound in &self.outbounds {
            println!(
                " {:<18} {:>12} {:>12}  {}",
                name_column(&outbound.name),
                compact_count(outbound.domains),
                compact_count(outbound.subnets),
                outbound.status,
            );
        }
        println!(" ────────────────── ──────────── ──────────── ──────────────");
        println!(
            " {:<18} {:>12} {:>12}",
            "TOTAL",
            compact_count(self.total_domains),
            compact_count(self.total_subnets),
        );
        println!(
            " {} across {} outbounds",
            entry_counts(self.total_domains, self.total_subnets),
            self.outbounds.len()
        );

        if !self.failed_declarations.is_empty() {
            println!();
            println!(" Failed rules:");
            for failed in &self.failed_declarations {
                println!("   #{} ({}): {}", failed.index + 1, failed.outbound, failed.error);
            }
        }
        println!();
    }
}

/// Outbound names wider than the column are cut and end in `~`.
fn name_column(name: &str) -> String {
    if name.chars().count() <= NAME_WIDTH {
        return name.to_string();
    }
    let mut cut: String = name.chars().take(NAME_WIDTH - 1).collect();
    cut.push('~');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CompileError, LoadError};
    use std::io;
    use tempfile::TempDir;

    fn emitted(name: &str, domains: usize, subnets: usize, outcome: EmitOutcome) -> EmittedOutbound {
        EmittedOutbound {
            outbound: name.to_string(),
            domains,
            subnets,
            outcome,
        }
    }

    fn sample() -> BuildSummary {
        let results = vec![
            emitted(
                "direct",
                2,
                3,
                EmitOutcome::Compiled {
                    source: PathBuf::from("out/direct-rule.json"),
                    compiled: PathBuf::from("out/direct-rule.srs"),
                },
            ),
            emitted("empty", 0, 0, EmitOutcome::Skipped),
            emitted(
                "proxy",
                10,
                0,
                EmitOutcome::CompileFailed {
                    source: PathBuf::from("out/proxy-rule.json"),
                    error: CompileError::Exit {
                        code: Some(1),
                        stderr: "bad".to_string(),
                    },
                },
            ),
        ];
        let failures = vec![DeclarationFailure {
            index: 4,
            outbound: "proxy".to_string(),
            error: LoadError::new("gfw.txt", io::Error::new(io::ErrorKind::NotFound, "gone")),
        }];
        BuildSummary::new(&results, &failures)
    }

    #[test]
    fn test_summary_totals_and_statuses() {
        let summary = sample();
        assert!(summary.generated_at.is_some());
        assert_eq!(summary.total_domains, 12);
        assert_eq!(summary.total_subnets, 3);
        assert_eq!(summary.compile_failures, 1);

        let direct = &summary.outbounds[0];
        assert_eq!(direct.status, "compiled");
        assert_eq!(direct.compiled, Some(PathBuf::from("out/direct-rule.srs")));

        let empty = &summary.outbounds[1];
        assert_eq!(empty.status, "skipped");
        assert!(empty.source.is_none());

        let proxy = &summary.outbounds[2];
        assert_eq!(proxy.source, Some(PathBuf::from("out/proxy-rule.json")));
        assert!(proxy.error.as_deref().unwrap().contains("bad"));

        assert_eq!(summary.failed_declarations[0].index, 4);
        assert!(summary.failed_declarations[0].error.contains("gfw.txt"));
    }

    #[test]
    fn test_dry_run_has_no_source_path() {
        let summary = BuildSummary::new(
            &[emitted(
                "direct",
                1,
                0,
                EmitOutcome::DryRun {
                    source: PathBuf::from("out/direct-rule.json"),
                },
            )],
            &[],
        );
        assert_eq!(summary.outbounds[0].status, "dry_run");
        assert!(summary.outbounds[0].source.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports/build.json");

        let summary = sample();
        summary.save(&path).unwrap();

        let loaded = BuildSummary::load(&path).unwrap();
        assert_eq!(loaded.outbounds, summary.outbounds);
        assert_eq!(loaded.failed_declarations, summary.failed_declarations);
        assert_eq!(loaded.generated_at, summary.generated_at);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        // Optional fields are omitted, not null
        assert!(raw["outbounds"][1].get("source").is_none());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(BuildSummary::load("/nonexistent/summary.json").is_err());
    }

    #[test]
    fn test_name_column() {
        assert_eq!(name_column("direct"), "direct");
        assert_eq!(name_column("exactly-eighteen!!"), "exactly-eighteen!!");
        assert_eq!(name_column("proxy-hong-kong-premium"), "proxy-hong-kong-p~");
        assert_eq!(name_column("прокси-гонконг-премиум").chars().count(), NAME_WIDTH);
    }

    #[test]
    fn test_display_does_not_panic() {
        sample().display();
        BuildSummary::default().display();
    }
}
