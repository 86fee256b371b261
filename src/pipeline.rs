//! The build pipeline: rule declarations in, finalized outbounds out.
//!
//! Declarations are loaded through a bounded concurrent stream. Each one fills
//! a private [`OutboundAccumulator`]; the contributions are merged on the
//! calling task in configuration order, so the result does not depend on
//! which load finishes first.

use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::accumulator::{Accumulators, FinalizedOutbound, OutboundAccumulator};
use crate::config::RuleDeclaration;
use crate::error::LoadError;
use crate::events::{BuildEvent, BuildObserver, SourceKind};
use crate::loader::SourceLoader;
use crate::normalize::{normalize_cidr_with, normalize_domain_suffix};
use crate::resolver::{ListEntry, Resolver};

/// Default number of declarations loaded at once
pub const DEFAULT_CONCURRENCY: usize = 4;

/// A declaration whose contribution was discarded.
#[derive(Debug)]
pub struct DeclarationFailure {
    /// Position of the declaration in the configuration (0-based)
    pub index: usize,
    pub outbound: String,
    pub error: LoadError,
}

/// Result of running the pipeline over a set of declarations.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Every referenced outbound, sorted by key, including empty ones
    pub outbounds: Vec<FinalizedOutbound>,
    pub failures: Vec<DeclarationFailure>,
}

impl BuildReport {
    pub fn outbound(&self, name: &str) -> Option<&FinalizedOutbound> {
        self.outbounds.iter().find(|o| o.outbound == name)
    }
}

pub struct Pipeline {
    loader: Arc<dyn SourceLoader>,
    resolver: Resolver,
    concurrency: usize,
    observer: Arc<dyn BuildObserver>,
}

impl Pipeline {
    pub fn new(
        loader: Arc<dyn SourceLoader>,
        resolver: Resolver,
        observer: Arc<dyn BuildObserver>,
    ) -> Self {
        Self {
            loader,
            resolver,
            concurrency: DEFAULT_CONCURRENCY,
            observer,
        }
    }

    /// Set how many declarations load at once (values below 1 mean 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every declaration and finalize the per-outbound results.
    ///
    /// A declaration that fails to load contributes nothing, but its outbound
    /// still exists in the report (possibly empty) and other declarations are
    /// unaffected.
    pub async fn build(&self, declarations: &[RuleDeclaration]) -> BuildReport {
        let results: Vec<_> = stream::iter(declarations.iter().enumerate().map(
            |(index, declaration)| async move {
                (index, declaration, self.process_declaration(declaration).await)
            },
        ))
        .buffered(self.concurrency)
        .collect()
        .await;

        let mut accumulators = Accumulators::new();
        let mut failures = Vec::new();

        for (index, declaration, result) in results {
            let accumulator = accumulators.entry(&declaration.outbound);
            match result {
                Ok(contribution) => accumulator.merge(contribution),
                Err(error) => {
                    self.notify(BuildEvent::DeclarationFailed {
                        index,
                        outbound: declaration.outbound.clone(),
                        error: error.to_string(),
                    });
                    failures.push(DeclarationFailure {
                        index,
                        outbound: declaration.outbound.clone(),
                        error,
                    });
                }
            }
        }

        let outbounds = accumulators.finalize();
        for outbound in &outbounds {
            self.notify(BuildEvent::OutboundBuilt {
                outbound: outbound.outbound.clone(),
                domains: outbound.domains.len(),
                subnets: outbound.subnets.len(),
            });
        }

        BuildReport {
            outbounds,
            failures,
        }
    }

    /// Load every source of one declaration into a fresh accumulator.
    ///
    /// Domain-only sources skip IP detection; subnet-only sources skip domain
    /// normalization. Inline list entries are classified one by one, and a
    /// reference is loaded with each line resolved as a token. Lines of a
    /// referenced list are never followed as further references.
    pub async fn process_declaration(
        &self,
        declaration: &RuleDeclaration,
    ) -> Result<OutboundAccumulator, LoadError> {
        let mut contribution = OutboundAccumulator::new();

        if let Some(source) = &declaration.domains {
            let lines = self.load(declaration, source, SourceKind::Domains).await?;
            for line in lines {
                contribution.push_domain(normalize_domain_suffix(&line));
            }
        }

        if let Some(source) = &declaration.subnets {
            let lines = self.load(declaration, source, SourceKind::Subnets).await?;
            let classifier = self.resolver.classifier();
            for line in lines {
                contribution.push_subnet(normalize_cidr_with(classifier, &line));
            }
        }

        for entry in &declaration.list {
            match self.resolver.classify_list_entry(entry) {
                Some(ListEntry::Token(token)) => contribution.push(token),
                Some(ListEntry::Reference(source)) => {
                    let lines = self.load(declaration, &source, SourceKind::Mixed).await?;
                    for line in lines {
                        if let Some(token) = self.resolver.resolve_mixed_entry(&line) {
                            contribution.push(token);
                        }
                    }
                }
                None => {}
            }
        }

        Ok(contribution)
    }

    async fn load(
        &self,
        declaration: &RuleDeclaration,
        source: &str,
        kind: SourceKind,
    ) -> Result<Vec<String>, LoadError> {
        let lines = self.loader.load_lines(source).await?;
        self.notify(BuildEvent::SourceLoaded {
            outbound: declaration.outbound.clone(),
            source: source.to_string(),
            kind,
            lines: lines.len(),
        });
        Ok(lines)
    }

    fn notify(&self, event: BuildEvent) {
        self.observer.on_event(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;
    use crate::emitter::{RuleBlock, RuleSetDocument};
    use crate::events::{CollectingObserver, NullObserver};
    use crate::loader::MockSourceLoader;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::io;
    use std::time::Duration;

    /// Serves lists from memory, optionally delaying each source so that
    /// concurrent loads complete out of order.
    #[derive(Default)]
    struct MemoryLoader {
        lists: HashMap<String, Vec<String>>,
        delays_ms: HashMap<String, u64>,
    }

    impl MemoryLoader {
        fn with_list(mut self, source: &str, lines: &[&str]) -> Self {
            self.lists.insert(
                source.to_string(),
                lines.iter().map(|s| s.to_string()).collect(),
            );
            self
        }

        fn with_delay(mut self, source: &str, ms: u64) -> Self {
            self.delays_ms.insert(source.to_string(), ms);
            self
        }
    }

    #[async_trait]
    impl SourceLoader for MemoryLoader {
        async fn load_lines(&self, source: &str) -> Result<Vec<String>, LoadError> {
            if let Some(ms) = self.delays_ms.get(source) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            self.lists.get(source).cloned().ok_or_else(|| {
                LoadError::new(source, io::Error::new(io::ErrorKind::NotFound, "not found"))
            })
        }
    }

    fn pipeline(loader: MemoryLoader) -> Pipeline {
        Pipeline::new(
            Arc::new(loader),
            Resolver::default(),
            Arc::new(NullObserver),
        )
    }

    fn inline(outbound: &str, entries: &[&str]) -> RuleDeclaration {
        RuleDeclaration {
            outbound: outbound.to_string(),
            list: entries.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn subnets(outbound: &str, source: &str) -> RuleDeclaration {
        RuleDeclaration {
            outbound: outbound.to_string(),
            subnets: Some(source.to_string()),
            ..Default::default()
        }
    }

    fn domains(outbound: &str, source: &str) -> RuleDeclaration {
        RuleDeclaration {
            outbound: outbound.to_string(),
            domains: Some(source.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_direct_end_to_end() {
        let loader = MemoryLoader::default().with_list("lists/direct.txt", &["1.1.1.1/32"]);
        let report = pipeline(loader)
            .build(&[
                inline("direct", &["8.8.8.8", "example.com"]),
                subnets("direct", "lists/direct.txt"),
            ])
            .await;

        assert!(report.failures.is_empty());
        let direct = report.outbound("direct").unwrap();
        assert_eq!(direct.domains, vec!["example.com"]);
        let subnets: HashSet<_> = direct.subnets.iter().map(String::as_str).collect();
        assert_eq!(subnets, HashSet::from(["8.8.8.8/32", "1.1.1.1/32"]));

        let doc = RuleSetDocument::from_outbound(direct).unwrap();
        assert!(doc
            .rules
            .iter()
            .any(|r| matches!(r, RuleBlock::DomainSuffix { .. })));
        assert!(doc.rules.iter().any(|r| matches!(r, RuleBlock::IpCidr { .. })));
    }

    #[tokio::test]
    async fn test_mixed_list_routing_with_reference() {
        let loader = MemoryLoader::default().with_list(
            "./extra-list.txt",
            &["192.168.0.1", "*.Nested.example.org", "2001:db8::/32"],
        );
        let report = pipeline(loader)
            .build(&[inline(
                "proxy",
                &["10.0.0.0/24", "sub.example.com", "./extra-list.txt"],
            )])
            .await;

        let proxy = report.outbound("proxy").unwrap();
        assert_eq!(proxy.domains, vec!["sub.example.com", "nested.example.org"]);
        assert_eq!(
            proxy.subnets,
            vec!["10.0.0.0/24", "192.168.0.1/32", "2001:db8::/32"]
        );
    }

    #[tokio::test]
    async fn test_referenced_lines_are_not_followed() {
        let loader = MemoryLoader::default()
            .with_list("lists/outer.txt", &["lists/inner.txt", "a.com"])
            .with_list("lists/inner.txt", &["never.loaded"]);
        let report = pipeline(loader)
            .build(&[inline("proxy", &["lists/outer.txt"])])
            .await;

        let proxy = report.outbound("proxy").unwrap();
        // The nested path is kept as a (malformed) domain token
        assert_eq!(proxy.domains, vec!["lists/inner.txt", "a.com"]);
        assert!(proxy.subnets.is_empty());
    }

    #[tokio::test]
    async fn test_domains_source_skips_ip_detection() {
        let loader = MemoryLoader::default()
            .with_list("d.txt", &["*.Example.COM", "1.2.3.4"])
            .with_list("s.txt", &["10.0.0.0/8", "::1"]);
        let report = pipeline(loader)
            .build(&[domains("x", "d.txt"), subnets("x", "s.txt")])
            .await;

        let x = report.outbound("x").unwrap();
        assert_eq!(x.domains, vec!["example.com", "1.2.3.4"]);
        assert_eq!(x.subnets, vec!["10.0.0.0/8", "::1/128"]);
    }

    #[tokio::test]
    async fn test_duplicates_across_declarations_removed() {
        let loader = MemoryLoader::default().with_list("lists/more.txt", &["b.com", "A.com"]);
        let report = pipeline(loader)
            .build(&[
                inline("direct", &["a.com", "b.com", "8.8.8.8"]),
                inline("direct", &["lists/more.txt", ".a.com", "8.8.8.8/32"]),
            ])
            .await;

        assert!(report.failures.is_empty());
        let direct = report.outbound("direct").unwrap();
        assert_eq!(direct.domains, vec!["a.com", "b.com"]);
        assert_eq!(direct.subnets, vec!["8.8.8.8/32"]);
    }

    #[tokio::test]
    async fn test_empty_outbound_is_reported() {
        let report = pipeline(MemoryLoader::default().with_list("empty.txt", &[]))
            .build(&[domains("block", "empty.txt"), inline("direct", &["a.com"])])
            .await;

        let names: Vec<_> = report.outbounds.iter().map(|o| o.outbound.as_str()).collect();
        assert_eq!(names, vec!["block", "direct"]);
        assert!(report.outbound("block").unwrap().is_empty());
        assert!(RuleSetDocument::from_outbound(report.outbound("block").unwrap()).is_none());
    }

    #[tokio::test]
    async fn test_failed_declaration_is_isolated() {
        let loader = MemoryLoader::default().with_list("ok.txt", &["1.1.1.1"]);
        let observer = Arc::new(CollectingObserver::new());
        let pipeline = Pipeline::new(Arc::new(loader), Resolver::default(), observer.clone());

        let report = pipeline
            .build(&[
                RuleDeclaration {
                    outbound: "direct".to_string(),
                    subnets: Some("ok.txt".to_string()),
                    domains: Some("missing.txt".to_string()),
                    ..Default::default()
                },
                subnets("direct", "ok.txt"),
                domains("proxy", "missing.txt"),
            ])
            .await;

        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].index, 0);
        assert_eq!(report.failures[0].error.identifier, "missing.txt");
        assert_eq!(report.failures[1].outbound, "proxy");

        // Only the second declaration's subnet survives for direct
        assert_eq!(report.outbound("direct").unwrap().subnets, vec!["1.1.1.1/32"]);
        // proxy still exists, empty
        assert!(report.outbound("proxy").unwrap().is_empty());

        let failed = observer
            .events()
            .into_iter()
            .filter(|e| matches!(e, BuildEvent::DeclarationFailed { .. }))
            .count();
        assert_eq!(failed, 2);
    }

    #[tokio::test]
    async fn test_concurrent_matches_sequential() {
        let make_loader = || {
            MemoryLoader::default()
                .with_list("lists/slow.txt", &["a.com", "10.0.0.1", "shared.com"])
                .with_delay("lists/slow.txt", 40)
                .with_list("lists/fast.txt", &["shared.com", "b.com", "10.0.0.1"])
                .with_list("lists/mid.txt", &["c.com", "2001:db8::1"])
                .with_delay("lists/mid.txt", 15)
        };
        let declarations = vec![
            inline("direct", &["x.com", "lists/slow.txt"]),
            domains("direct", "lists/slow.txt"),
            inline("direct", &["lists/fast.txt"]),
            domains("proxy", "lists/mid.txt"),
            domains("direct", "lists/fast.txt"),
            subnets("proxy", "lists/mid.txt"),
            inline("proxy", &["lists/missing.txt"]),
        ];

        let sequential = pipeline(make_loader())
            .with_concurrency(1)
            .build(&declarations)
            .await;
        let concurrent = pipeline(make_loader())
            .with_concurrency(8)
            .build(&declarations)
            .await;

        assert_eq!(sequential.outbounds, concurrent.outbounds);
        assert_eq!(sequential.failures.len(), 1);
        assert_eq!(concurrent.failures.len(), 1);
        let direct = concurrent.outbound("direct").unwrap();
        assert_eq!(
            direct.domains,
            vec!["x.com", "a.com", "shared.com", "10.0.0.1", "b.com"]
        );
        assert_eq!(direct.subnets, vec!["10.0.0.1/32"]);
    }

    #[tokio::test]
    async fn test_process_declaration_with_mock_loader() {
        let mut loader = MockSourceLoader::new();
        loader
            .expect_load_lines()
            .withf(|source| source == "https://example.org/gfw.txt")
            .times(1)
            .returning(|_| Ok(vec!["Google.com".to_string(), "8.8.4.4".to_string()]));

        let observer = Arc::new(CollectingObserver::new());
        let pipeline = Pipeline::new(Arc::new(loader), Resolver::default(), observer.clone());
        let contribution = pipeline
            .process_declaration(&inline("proxy", &["https://example.org/gfw.txt"]))
            .await
            .unwrap();

        assert_eq!(contribution.domains(), ["google.com"]);
        assert_eq!(contribution.subnets(), ["8.8.4.4/32"]);
        assert_eq!(
            observer.events(),
            vec![BuildEvent::SourceLoaded {
                outbound: "proxy".to_string(),
                source: "https://example.org/gfw.txt".to_string(),
                kind: SourceKind::Mixed,
                lines: 2,
            }]
        );
    }

    #[tokio::test]
    async fn test_strict_classifier_rejects_heuristic_ipv6() {
        let loader = MemoryLoader::default();
        let report = Pipeline::new(
            Arc::new(loader),
            Resolver::new(Classifier::Strict),
            Arc::new(NullObserver),
        )
        .build(&[inline("x", &["dead:beef:cafe", "::ffff"])])
        .await;

        let x = report.outbound("x").unwrap();
        assert_eq!(x.domains, vec!["dead:beef:cafe"]);
        assert_eq!(x.subnets, vec!["::ffff/128"]);
    }

    #[test]
    fn test_concurrency_floor() {
        let p = pipeline(MemoryLoader::default()).with_concurrency(0);
        assert_eq!(p.concurrency(), 1);
        assert_eq!(pipeline(MemoryLoader::default()).concurrency(), DEFAULT_CONCURRENCY);
    }
}
