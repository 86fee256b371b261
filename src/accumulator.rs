//! Per-outbound collection of normalized domains and subnets.

use std::collections::{BTreeMap, HashSet};

use crate::resolver::ClassifiedToken;

/// Mutable domains/subnets for one outbound, built up across declarations.
///
/// Values pushed here are expected to be normalizer output. Empty values are
/// dropped: an empty `domain_suffix` would match every domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundAccumulator {
    domains: Vec<String>,
    subnets: Vec<String>,
}

impl OutboundAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_domain(&mut self, domain: String) {
        if !domain.is_empty() {
            self.domains.push(domain);
        }
    }

    pub fn push_subnet(&mut self, subnet: String) {
        if !subnet.is_empty() {
            self.subnets.push(subnet);
        }
    }

    /// Route a classified token to its bucket.
    pub fn push(&mut self, token: ClassifiedToken) {
        match token {
            ClassifiedToken::Domain(d) => self.push_domain(d),
            ClassifiedToken::Subnet(s) => self.push_subnet(s),
        }
    }

    /// Append everything from `other`, keeping its order.
    pub fn merge(&mut self, other: OutboundAccumulator) {
        self.domains.extend(other.domains);
        self.subnets.extend(other.subnets);
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn subnets(&self) -> &[String] {
        &self.subnets
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty() && self.subnets.is_empty()
    }

    /// Deduplicate both buckets and freeze the result.
    ///
    /// Consumes the accumulator, so each outbound is finalized exactly once.
    pub fn finalize(self, outbound: impl Into<String>) -> FinalizedOutbound {
        FinalizedOutbound {
            outbound: outbound.into(),
            domains: deduplicate(self.domains),
            subnets: deduplicate(self.subnets),
        }
    }
}

/// Deduplicated contents of one outbound, ready for emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedOutbound {
    pub outbound: String,
    pub domains: Vec<String>,
    pub subnets: Vec<String>,
}

impl FinalizedOutbound {
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty() && self.subnets.is_empty()
    }
}

/// All accumulators of a build, keyed by outbound.
///
/// Keys are kept sorted so finalization and emission order is stable.
#[derive(Debug, Default)]
pub struct Accumulators {
    by_outbound: BTreeMap<String, OutboundAccumulator>,
}

impl Accumulators {
    pub fn new() -> Self {
        Self::default()
    }

    /// The accumulator for `outbound`, created on first reference.
    pub fn entry(&mut self, outbound: &str) -> &mut OutboundAccumulator {
        self.by_outbound.entry(outbound.to_string()).or_default()
    }

    /// Finalize every accumulator, in outbound key order.
    pub fn finalize(self) -> Vec<FinalizedOutbound> {
        self.by_outbound
            .into_iter()
            .map(|(outbound, acc)| acc.finalize(outbound))
            .collect()
    }
}

/// Remove duplicates, keeping the first occurrence of each value.
pub fn deduplicate(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(values.len());
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}
