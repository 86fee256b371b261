//! Classify command implementation.

use anyhow::Result;
use std::path::Path;

use crate::classifier::Classifier;
use crate::config::Config;
use crate::resolver::{ClassifiedToken, ListEntry, Resolver};

/// Run the classify command
///
/// Uses the config's IP parsing mode when the config file exists.
pub fn run(tokens: &[String], config_path: &Path) -> Result<()> {
    let classifier = if config_path.exists() {
        Config::load(config_path)?.classifier()
    } else {
        Classifier::default()
    };
    let resolver = Resolver::new(classifier);

    for token in tokens {
        println!("{}", describe(&resolver, token));
    }
    Ok(())
}

/// One output line: the raw token, where it goes, and its normalized form.
pub fn describe(resolver: &Resolver, token: &str) -> String {
    match resolver.classify_list_entry(token) {
        Some(ListEntry::Token(ClassifiedToken::Domain(value))) => {
            format!("{}\tdomain_suffix\t{}", token, value)
        }
        Some(ListEntry::Token(ClassifiedToken::Subnet(value))) => {
            format!("{}\tip_cidr\t{}", token, value)
        }
        Some(ListEntry::Reference(source)) => format!("{}\treference\t{}", token, source),
        None => format!("{:?}\tignored", token),
    }
}
