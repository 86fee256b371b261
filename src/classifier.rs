//! Token classification: is a raw string an IP address, a CIDR range, or neither?
//!
//! Two classifiers share the same entry points:
//! - [`Classifier::Heuristic`] (default) - cheap checks meant to tell addresses
//!   apart from domain names, not to validate them
//! - [`Classifier::Strict`] - full address parsing via `std::net` and `ipnet`
//!
//! The heuristic IPv6 check accepts any token made only of hex digits and `:`
//! that contains at least one `:`. Strings such as `"1:::2"` or `"abcde::"`
//! are therefore classified as IPv6 even though no address parser would accept
//! them. This is a known imprecision of the heuristic, not a defect.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Address family of a token, or `NotIp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpKind {
    V4,
    V6,
    NotIp,
}

impl IpKind {
    /// Longest valid prefix for the family.
    pub fn max_prefix(self) -> Option<u32> {
        match self {
            IpKind::V4 => Some(32),
            IpKind::V6 => Some(128),
            IpKind::NotIp => None,
        }
    }
}

/// Which classification rules to apply.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Classifier {
    /// Digit/range checks for IPv4, character-set check for IPv6
    #[default]
    Heuristic,
    /// Full parsing; rejects malformed IPv6 the heuristic lets through
    Strict,
}

impl Classifier {
    pub fn from_strict_flag(strict: bool) -> Self {
        if strict {
            Classifier::Strict
        } else {
            Classifier::Heuristic
        }
    }

    /// Classify a bare address (no `/prefix`).
    pub fn classify_ip(self, token: &str) -> IpKind {
        match self {
            Classifier::Heuristic => classify_ip(token),
            Classifier::Strict => match token.parse::<IpAddr>() {
                Ok(IpAddr::V4(_)) => IpKind::V4,
                Ok(IpAddr::V6(_)) => IpKind::V6,
                Err(_) => IpKind::NotIp,
            },
        }
    }

    /// Whether `token` is an address or an address with a valid prefix length.
    pub fn is_ip_or_cidr(self, token: &str) -> bool {
        match self {
            Classifier::Heuristic => is_ip_or_cidr(token),
            Classifier::Strict => {
                // Same address rules with or without a prefix
                let (address, prefix) = token.split_once('/').unwrap_or((token, ""));
                let Ok(addr) = address.parse::<IpAddr>() else {
                    return false;
                };
                prefix.is_empty()
                    || (is_all_digits(prefix)
                        && prefix
                            .parse::<u8>()
                            .is_ok_and(|len| IpNet::new(addr, len).is_ok()))
            }
        }
    }
}

/// Classify a token as IPv4, IPv6 or not an IP, using the heuristic rules.
///
/// # Examples
/// ```
/// use rulekit::classifier::{classify_ip, IpKind};
/// assert_eq!(classify_ip("1.2.3.4"), IpKind::V4);
/// assert_eq!(classify_ip("300.1.1.1"), IpKind::NotIp);
/// assert_eq!(classify_ip("::1"), IpKind::V6);
/// assert_eq!(classify_ip("example.com"), IpKind::NotIp);
/// ```
pub fn classify_ip(token: &str) -> IpKind {
    if is_ipv4(token) {
        IpKind::V4
    } else if looks_like_ipv6(token) {
        IpKind::V6
    } else {
        IpKind::NotIp
    }
}

/// Whether `token` is an IP address, optionally followed by `/prefix`.
///
/// The prefix must be decimal digits within the family's range
/// (0-32 for IPv4, 0-128 for IPv6). An empty prefix after `/` counts as absent.
///
/// # Examples
/// ```
/// use rulekit::classifier::is_ip_or_cidr;
/// assert!(is_ip_or_cidr("10.0.0.0/8"));
/// assert!(!is_ip_or_cidr("10.0.0.0/33"));
/// assert!(!is_ip_or_cidr("::1/129"));
/// assert!(!is_ip_or_cidr("example.com"));
/// ```
pub fn is_ip_or_cidr(token: &str) -> bool {
    let (address, prefix) = match token.split_once('/') {
        Some((address, prefix)) => (address, Some(prefix)),
        None => (token, None),
    };

    if address.is_empty() {
        return false;
    }

    let prefix = match prefix {
        Some(p) if !p.is_empty() => {
            if !is_all_digits(p) {
                return false;
            }
            Some(p)
        }
        _ => None,
    };

    let Some(max) = classify_ip(address).max_prefix() else {
        return false;
    };

    match prefix {
        None => true,
        Some(p) => p.parse::<u32>().map(|len| len <= max).unwrap_or(false),
    }
}

fn is_ipv4(token: &str) -> bool {
    let parts: Vec<&str> = token.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|part| {
            is_all_digits(part) && part.parse::<u32>().map(|n| n <= 255).unwrap_or(false)
        })
}

// Character-set check only; see module docs.
fn looks_like_ipv6(token: &str) -> bool {
    token.contains(':') && token.chars().all(|c| c == ':' || c.is_ascii_hexdigit())
}

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
