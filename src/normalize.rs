//! Canonical forms for domain suffixes and CIDR ranges.

use crate::classifier::{Classifier, IpKind};

/// Normalize a domain token to suffix-match form.
///
/// Trims, lowercases, then strips a leading `*.` or (failing that) a leading
/// `.`. Both spellings mean "this domain and all subdomains". Stripping repeats
/// until neither prefix remains so the result is stable under re-normalization.
///
/// # Examples
/// ```
/// use rulekit::normalize::normalize_domain_suffix;
/// assert_eq!(normalize_domain_suffix("*.Example.COM "), "example.com");
/// assert_eq!(normalize_domain_suffix(".example.com"), "example.com");
/// ```
pub fn normalize_domain_suffix(token: &str) -> String {
    let lowered = token.trim().to_lowercase();
    let mut rest = lowered.as_str();
    loop {
        let next = match rest.strip_prefix("*.") {
            Some(r) => r,
            None => match rest.strip_prefix('.') {
                Some(r) => r,
                None => break,
            },
        };
        // Stripping can expose whitespace (". example.com")
        rest = next.trim_start();
    }
    rest.to_string()
}

/// Normalize an IP or CIDR token to CIDR form using the heuristic classifier.
///
/// Tokens that already carry a `/` are kept as-is. Bare addresses get `/32`
/// (IPv4) or `/128` (IPv6). Anything else passes through trimmed; the
/// rule-set compiler is the one to reject it.
///
/// # Examples
/// ```
/// use rulekit::normalize::normalize_cidr;
/// assert_eq!(normalize_cidr("1.2.3.4"), "1.2.3.4/32");
/// assert_eq!(normalize_cidr("::1"), "::1/128");
/// assert_eq!(normalize_cidr("10.0.0.0/8"), "10.0.0.0/8");
/// ```
pub fn normalize_cidr(token: &str) -> String {
    normalize_cidr_with(Classifier::Heuristic, token)
}

/// [`normalize_cidr`] with an explicit classifier.
pub fn normalize_cidr_with(classifier: Classifier, token: &str) -> String {
    let trimmed = token.trim().to_lowercase();
    if trimmed.contains('/') {
        return trimmed;
    }
    match classifier.classify_ip(&trimmed) {
        IpKind::V4 => format!("{}/32", trimmed),
        IpKind::V6 => format!("{}/128", trimmed),
        IpKind::NotIp => trimmed,
    }
}
