//! Routing of unclassified entries to the domain or subnet bucket.
//!
//! Lines loaded from a mixed list go through [`Resolver::resolve_mixed_entry`].
//! Inline `list` entries in a rule declaration go through
//! [`Resolver::classify_list_entry`], which adds one more outcome: a reference
//! to another list that has to be loaded first.

use serde::Serialize;

use crate::classifier::Classifier;
use crate::normalize::{normalize_cidr_with, normalize_domain_suffix};

/// A single normalized token and the bucket it belongs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ClassifiedToken {
    Domain(String),
    Subnet(String),
}

/// An inline `list` entry: either a literal token or a nested list to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEntry {
    Token(ClassifiedToken),
    Reference(String),
}

/// Classifies raw entries with a fixed [`Classifier`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Resolver {
    classifier: Classifier,
}

impl Resolver {
    pub fn new(classifier: Classifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> Classifier {
        self.classifier
    }

    /// Classify and normalize one line of a mixed list.
    ///
    /// Returns `None` for blank lines. An IP or CIDR becomes a subnet;
    /// everything else is a domain suffix.
    pub fn resolve_mixed_entry(&self, line: &str) -> Option<ClassifiedToken> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(self.resolve_token(trimmed))
    }

    /// Classify an inline `list` entry.
    ///
    /// Order matters: a valid IP/CIDR wins over the reference check, so
    /// `10.0.0.0/8` is a subnet even though it contains a `/`.
    pub fn classify_list_entry(&self, entry: &str) -> Option<ListEntry> {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            return None;
        }
        if self.classifier.is_ip_or_cidr(trimmed) {
            return Some(ListEntry::Token(ClassifiedToken::Subnet(
                normalize_cidr_with(self.classifier, trimmed),
            )));
        }
        if is_source_reference(trimmed) {
            return Some(ListEntry::Reference(trimmed.to_string()));
        }
        Some(ListEntry::Token(ClassifiedToken::Domain(
            normalize_domain_suffix(trimmed),
        )))
    }

    fn resolve_token(&self, trimmed: &str) -> ClassifiedToken {
        if self.classifier.is_ip_or_cidr(trimmed) {
            ClassifiedToken::Subnet(normalize_cidr_with(self.classifier, trimmed))
        } else {
            ClassifiedToken::Domain(normalize_domain_suffix(trimmed))
        }
    }
}

/// Resolve one mixed-list line with the default heuristic classifier.
///
/// # Examples
/// ```
/// use rulekit::resolver::{resolve_mixed_entry, ClassifiedToken};
/// assert_eq!(
///     resolve_mixed_entry("10.0.0.0/24"),
///     Some(ClassifiedToken::Subnet("10.0.0.0/24".to_string()))
/// );
/// assert_eq!(
///     resolve_mixed_entry("*.Example.com"),
///     Some(ClassifiedToken::Domain("example.com".to_string()))
/// );
/// assert_eq!(resolve_mixed_entry("   "), None);
/// ```
pub fn resolve_mixed_entry(line: &str) -> Option<ClassifiedToken> {
    Resolver::default().resolve_mixed_entry(line)
}

/// Whether a non-IP entry names another list (URL or filesystem path).
///
/// Anything with a scheme or a `/` counts. `/` never appears in a legal domain
/// name, so a domain is only misrouted here if it was malformed to begin with.
pub fn is_source_reference(entry: &str) -> bool {
    is_url(entry) || entry.contains('/')
}

/// Whether a source identifier is fetched over HTTP.
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}
