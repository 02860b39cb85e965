// src/normalizer.rs
//! Turns free-form tool output into validated subdomains.
//!
//! Every line either lands in the subdomain set or in the rejected archive;
//! nothing here fails. Lines of five characters or fewer that do not validate
//! are dropped without archiving.

use crate::tools::profile_for;
use crate::utils::is_valid_subdomain;
use std::collections::BTreeSet;

const DELIMITERS: &[char] = &['|', '[', ']', '(', ')', '{', '}', ',', ';', '"', '\''];
const PREFIXES: &[&str] = &["http://", "https://", "www.", "ftp://"];
const SCHEMES: &[&str] = &["https://", "http://", "ftp://"];
const MIN_ARCHIVED_LEN: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    pub subdomains: BTreeSet<String>,
    pub rejected: Vec<String>,
}

pub fn normalize<S: AsRef<str>>(lines: &[S], tool_name: &str) -> Normalized {
    let profile = profile_for(tool_name);
    let mut normalized = Normalized::default();

    for line in lines {
        let original = line.as_ref().trim();
        if original.is_empty() {
            continue;
        }

        let lowered = original.to_lowercase();
        if profile.is_noise(&strip_schemes(&lowered)) {
            normalized.rejected.push(original.to_string());
            continue;
        }

        match extract_candidate(&lowered, profile.keep_ports) {
            Some(candidate) if is_valid_subdomain(&candidate) => {
                normalized.subdomains.insert(candidate);
            }
            _ => {
                if original.chars().count() > MIN_ARCHIVED_LEN {
                    normalized.rejected.push(original.to_string());
                }
            }
        }
    }

    normalized
}

// Scheme markers alone must not trip the "http"/"https" noise terms.
fn strip_schemes(line: &str) -> String {
    SCHEMES
        .iter()
        .fold(line.to_string(), |acc, scheme| acc.replace(scheme, ""))
}

fn extract_candidate(line: &str, keep_ports: bool) -> Option<String> {
    let mut candidate = line.split_whitespace().next()?;

    for delimiter in DELIMITERS {
        if let Some(idx) = candidate.find(*delimiter) {
            candidate = &candidate[..idx];
        }
    }

    for prefix in PREFIXES {
        if let Some(rest) = candidate.strip_prefix(prefix) {
            candidate = rest;
        }
    }

    if !keep_ports {
        if let Some(idx) = candidate.find(':') {
            candidate = &candidate[..idx];
        }
    }

    if let Some(idx) = candidate.find('/') {
        candidate = &candidate[..idx];
    }

    let candidate = candidate.trim().to_lowercase();
    if candidate.is_empty() {
        None
    } else {
        Some(candidate)
    }
}
