// src/utils.rs
use once_cell::sync::Lazy;
use regex::Regex;

static SUBDOMAIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^([a-z0-9]([a-z0-9\-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$")
        .expect("subdomain pattern is a valid regex")
});

/// Check if a string looks like a subdomain.
///
/// Accepts `(label.)+tld` where every label is 1-63 ASCII alphanumerics or
/// interior hyphens and the TLD is at least two letters. Total length must
/// be within 4..=254. IP literals and trailing dots never match.
pub fn is_valid_subdomain(candidate: &str) -> bool {
    let len = candidate.len();
    if !(4..=254).contains(&len) || !candidate.is_ascii() || !candidate.contains('.') {
        return false;
    }

    SUBDOMAIN_PATTERN.is_match(candidate)
}

/// Named groups used by the report and terminal summary.
pub const SUBDOMAIN_PATTERNS: &[(&str, &[&str])] = &[
    ("www", &["www."]),
    ("api", &["api"]),
    ("admin", &["admin", "manage", "control"]),
    ("dev", &["dev", "test", "stage", "staging"]),
    ("mail", &["mail", "smtp", "imap", "pop"]),
    ("cdn", &["cdn", "static", "assets", "media"]),
];

/// Groups subdomains by the keywords in [`SUBDOMAIN_PATTERNS`], skipping empty groups.
pub fn group_by_pattern(subdomains: &[String]) -> Vec<(&'static str, Vec<&str>)> {
    SUBDOMAIN_PATTERNS
        .iter()
        .filter_map(|(label, keywords)| {
            let matches: Vec<&str> = subdomains
                .iter()
                .filter(|s| {
                    if *label == "www" {
                        s.starts_with("www.")
                    } else {
                        keywords.iter().any(|k| s.contains(k))
                    }
                })
                .map(String::as_str)
                .collect();
            if matches.is_empty() {
                None
            } else {
                Some((*label, matches))
            }
        })
        .collect()
}
