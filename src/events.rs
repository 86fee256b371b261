//! Progress events emitted by the build pipeline.
//!
//! The pipeline and emitter never log directly; they report [`BuildEvent`]s to
//! a [`BuildObserver`]. The CLI installs [`TracingObserver`], tests use
//! [`CollectingObserver`] to assert on what happened.

use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Which channel of a rule declaration a source was loaded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Domains,
    Subnets,
    Mixed,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Domains => write!(f, "domains"),
            SourceKind::Subnets => write!(f, "subnets"),
            SourceKind::Mixed => write!(f, "mixed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    SourceLoaded {
        outbound: String,
        source: String,
        kind: SourceKind,
        lines: usize,
    },
    DeclarationFailed {
        index: usize,
        outbound: String,
        error: String,
    },
    OutboundBuilt {
        outbound: String,
        domains: usize,
        subnets: usize,
    },
    ArtifactSkipped {
        outbound: String,
    },
    ArtifactWritten {
        outbound: String,
        path: PathBuf,
    },
    ArtifactCompiled {
        outbound: String,
        path: PathBuf,
    },
    CompileFailed {
        outbound: String,
        error: String,
    },
}

/// Receiver for build progress.
pub trait BuildObserver: Send + Sync {
    fn on_event(&self, event: &BuildEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl BuildObserver for TracingObserver {
    fn on_event(&self, event: &BuildEvent) {
        match event {
            BuildEvent::SourceLoaded {
                outbound,
                source,
                kind,
                lines,
            } => info!(
                "Loaded {} ({} for {}) - {} lines",
                source,
                kind,
                outbound,
                compact_count(*lines)
            ),
            BuildEvent::DeclarationFailed {
                index,
                outbound,
                error,
            } => warn!("Rule #{} for {} skipped: {}", index + 1, outbound, error),
            BuildEvent::OutboundBuilt {
                outbound,
                domains,
                subnets,
            } => info!("{}: {}", outbound, entry_counts(*domains, *subnets)),
            BuildEvent::ArtifactSkipped { outbound } => {
                info!("{}: no domains or subnets, skipped", outbound)
            }
            BuildEvent::ArtifactWritten { outbound, path } => {
                debug!("{}: wrote {}", outbound, path.display())
            }
            BuildEvent::ArtifactCompiled { outbound, path } => {
                info!("{}: compiled {}", outbound, path.display())
            }
            BuildEvent::CompileFailed { outbound, error } => {
                warn!("{}: compile failed: {}", outbound, error)
            }
        }
    }
}

/// Short count for log lines and tables: `950`, `12.3K`, `4.1M`.
pub fn compact_count(count: usize) -> String {
    match count {
        0..=999 => count.to_string(),
        1_000..=999_999 => format!("{:.1}K", count as f64 / 1e3),
        _ => format!("{:.1}M", count as f64 / 1e6),
    }
}

/// What an outbound holds, e.g. `1.2K domains, 1 subnet`.
pub fn entry_counts(domains: usize, subnets: usize) -> String {
    let noun = |count: usize, singular: &str| {
        if count == 1 {
            singular.to_string()
        } else {
            format!("{}s", singular)
        }
    };
    format!(
        "{} {}, {} {}",
        compact_count(domains),
        noun(domains, "domain"),
        compact_count(subnets),
        noun(subnets, "subnet")
    )
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<BuildEvent>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BuildEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl BuildObserver for CollectingObserver {
    fn on_event(&self, event: &BuildEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl BuildObserver for NullObserver {
    fn on_event(&self, _event: &BuildEvent) {}
}
