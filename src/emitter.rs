//! Rule-set document emission.
//!
//! Each finalized outbound becomes one version-3 rule-set source document,
//! `<output_dir>/<outbound>-rule.json`, which is then handed to the
//! [`RuleSetCompiler`] to produce `<outbound>-rule.srs`.
//!
//! An outbound with no domains and no subnets produces nothing. A compiler
//! failure is recorded in the [`EmitOutcome`] and never stops the remaining
//! outbounds.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::accumulator::FinalizedOutbound;
use crate::compiler::RuleSetCompiler;
use crate::error::{CompileError, RulekitError};
use crate::events::{BuildEvent, BuildObserver};
use crate::fs_abstraction::{write_atomic, FileSystem, RealFileSystem};

/// Rule-set format version written into every document
pub const RULE_SET_VERSION: u8 = 3;

const SOURCE_SUFFIX: &str = "-rule.json";
const COMPILED_SUFFIX: &str = "-rule.srs";

/// A sing-box style rule-set source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSetDocument {
    pub version: u8,
    pub rules: Vec<RuleBlock>,
}

/// One headless rule. Serialized without a tag, e.g. `{"ip_cidr": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleBlock {
    DomainSuffix { domain_suffix: Vec<String> },
    IpCidr { ip_cidr: Vec<String> },
}

impl RuleSetDocument {
    /// Build the document for an outbound, or `None` when it has no entries.
    ///
    /// The `domain_suffix` block comes first, then `ip_cidr`; empty blocks
    /// are omitted.
    pub fn from_outbound(outbound: &FinalizedOutbound) -> Option<Self> {
        let mut rules = Vec::with_capacity(2);
        if !outbound.domains.is_empty() {
            rules.push(RuleBlock::DomainSuffix {
                domain_suffix: outbound.domains.clone(),
            });
        }
        if !outbound.subnets.is_empty() {
            rules.push(RuleBlock::IpCidr {
                ip_cidr: outbound.subnets.clone(),
            });
        }

        if rules.is_empty() {
            None
        } else {
            Some(Self {
                version: RULE_SET_VERSION,
                rules,
            })
        }
    }

    /// Pretty-printed JSON with a trailing newline.
    pub fn to_json(&self) -> Result<String, RulekitError> {
        let mut json = serde_json::to_string_pretty(self)
            .map_err(|e| RulekitError::Serialize(e.to_string()))?;
        json.push('\n');
        Ok(json)
    }
}

/// What happened to one outbound during emission.
#[derive(Debug)]
pub enum EmitOutcome {
    /// No domains and no subnets, nothing written
    Skipped,
    /// Document built but not written
    DryRun { source: PathBuf },
    /// Document written, compiler disabled
    Written { source: PathBuf },
    Compiled { source: PathBuf, compiled: PathBuf },
    CompileFailed { source: PathBuf, error: CompileError },
}

impl EmitOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            EmitOutcome::Skipped => "skipped",
            EmitOutcome::DryRun { .. } => "dry_run",
            EmitOutcome::Written { .. } => "written",
            EmitOutcome::Compiled { .. } => "compiled",
            EmitOutcome::CompileFailed { .. } => "compile_failed",
        }
    }

    /// Whether a source document exists on disk after this outcome.
    pub fn wrote_document(&self) -> bool {
        matches!(
            self,
            EmitOutcome::Written { .. }
                | EmitOutcome::Compiled { .. }
                | EmitOutcome::CompileFailed { .. }
        )
    }

    pub fn is_compile_failure(&self) -> bool {
        matches!(self, EmitOutcome::CompileFailed { .. })
    }

    pub fn source_path(&self) -> Option<&Path> {
        match self {
            EmitOutcome::Skipped => None,
            EmitOutcome::DryRun { source }
            | EmitOutcome::Written { source }
            | EmitOutcome::Compiled { source, .. }
            | EmitOutcome::CompileFailed { source, .. } => Some(source),
        }
    }

    pub fn compiled_path(&self) -> Option<&Path> {
        match self {
            EmitOutcome::Compiled { compiled, .. } => Some(compiled),
            _ => None,
        }
    }
}

/// Emission result for one outbound, with the counts that went into it.
#[derive(Debug)]
pub struct EmittedOutbound {
    pub outbound: String,
    pub domains: usize,
    pub subnets: usize,
    pub outcome: EmitOutcome,
}

/// Outbounds whose document was written but did not compile.
pub fn count_compile_failures(emitted: &[EmittedOutbound]) -> usize {
    emitted
        .iter()
        .filter(|e| e.outcome.is_compile_failure())
        .count()
}

/// Writes rule-set documents and drives the compiler.
pub struct Emitter {
    output_dir: PathBuf,
    fs: Arc<dyn FileSystem>,
    compiler: Option<Box<dyn RuleSetCompiler>>,
    observer: Arc<dyn BuildObserver>,
    dry_run: bool,
}

impl Emitter {
    pub fn new(output_dir: impl Into<PathBuf>, observer: Arc<dyn BuildObserver>) -> Self {
        Self {
            output_dir: output_dir.into(),
            fs: Arc::new(RealFileSystem),
            compiler: None,
            observer,
            dry_run: false,
        }
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_compiler(mut self, compiler: Box<dyn RuleSetCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn source_path(&self, outbound: &str) -> PathBuf {
        self.output_dir.join(format!("{}{}", outbound, SOURCE_SUFFIX))
    }

    pub fn compiled_path(&self, outbound: &str) -> PathBuf {
        self.output_dir.join(format!("{}{}", outbound, COMPILED_SUFFIX))
    }

    /// Emit one outbound.
    ///
    /// Only filesystem and serialization failures are errors; a compiler
    /// failure is reported as [`EmitOutcome::CompileFailed`].
    pub fn emit(&self, outbound: &FinalizedOutbound) -> Result<EmitOutcome, RulekitError> {
        let name = outbound.outbound.as_str();
        let document = match RuleSetDocument::from_outbound(outbound) {
            Some(doc) => doc,
            None => {
                self.notify(BuildEvent::ArtifactSkipped {
                    outbound: name.to_string(),
                });
                return Ok(EmitOutcome::Skipped);
            }
        };

        let source = self.source_path(name);
        if self.dry_run {
            return Ok(EmitOutcome::DryRun { source });
        }

        let json = document.to_json()?;
        self.fs.create_dir_all(&self.output_dir).map_err(|e| {
            RulekitError::FileSystem(format!("{}: {}", self.output_dir.display(), e))
        })?;
        write_atomic(self.fs.as_ref(), &source, json.as_bytes())
            .map_err(|e| RulekitError::FileSystem(format!("{}: {}", source.display(), e)))?;
        self.notify(BuildEvent::ArtifactWritten {
            outbound: name.to_string(),
            path: source.clone(),
        });

        let Some(compiler) = &self.compiler else {
            return Ok(EmitOutcome::Written { source });
        };

        let compiled = self.compiled_path(name);
        match compiler.compile(&source, &compiled) {
            Ok(()) => {
                self.notify(BuildEvent::ArtifactCompiled {
                    outbound: name.to_string(),
                    path: compiled.clone(),
                });
                Ok(EmitOutcome::Compiled { source, compiled })
            }
            Err(error) => {
                self.notify(BuildEvent::CompileFailed {
                    outbound: name.to_string(),
                    error: error.to_string(),
                });
                Ok(EmitOutcome::CompileFailed { source, error })
            }
        }
    }

    /// Emit every outbound in order, stopping only on a filesystem error.
    pub fn emit_all(
        &self,
        outbounds: &[FinalizedOutbound],
    ) -> Result<Vec<EmittedOutbound>, RulekitError> {
        outbounds
            .iter()
            .map(|outbound| {
                Ok(EmittedOutbound {
                    outbound: outbound.outbound.clone(),
                    domains: outbound.domains.len(),
                    subnets: outbound.subnets.len(),
                    outcome: self.emit(outbound)?,
                })
            })
            .collect()
    }

    fn notify(&self, event: BuildEvent) {
        self.observer.on_event(&event);
    }
}
