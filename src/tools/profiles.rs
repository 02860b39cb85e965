// src/tools/profiles.rs

/// Substrings marking a line as log/status output for every tool.
pub const GENERIC_NOISE: &[&str] = &[
    "timestamp",
    "server",
    "timeout",
    "resolver",
    "query",
    "lookup",
    "dns",
    "http",
    "https",
    "certificate",
    "ssl",
    "tls",
    "error",
    "warning",
    "debug",
    "info",
    "trace",
    "starting",
    "finished",
    "complete",
    "initializing",
    "configuration",
    "version",
];

const AMASS_NOISE: &[&str] = &[
    "subdomain found:",
    "[info]",
    "[error]",
    "enum",
    "passive",
    "active",
    "average:",
    "dns queries",
    "alterations",
    "brute forcing",
    "scraping",
];

const SUDOMY_NOISE: &[&str] = &[
    "scanning",
    "found",
    "target:",
    "results:",
    "total:",
    "webanalyze",
    "httpx",
    "dnsprobe",
    "checking",
    "subdomain takeover",
];

const BBOT_NOISE: &[&str] = &[
    "[info]", "[debug]", "[warning]", "[error]", "scan", "module", "starting", "finished",
    "emitting", "type=",
];

const SUBFINDER_NOISE: &[&str] = &["[inf]", "[wrn]", "[err]", "[dbg]", "current configuration"];

const DNSCAN_NOISE: &[&str] = &[
    "scanning",
    "found",
    "threads:",
    "wordlist:",
    "dns server",
    "wildcards detected",
    "progress",
];

const FFUF_NOISE: &[&str] = &["status:", "size:", "words:", "lines:", "duration:", "headers"];

/// How raw output of one tool is filtered.
#[derive(Debug, Clone, Copy)]
pub struct NormalizationProfile {
    pub noise: &'static [&'static str],
    /// Port-bearing candidates are left intact (and therefore rejected).
    pub keep_ports: bool,
}

impl NormalizationProfile {
    pub fn is_noise(&self, line: &str) -> bool {
        GENERIC_NOISE
            .iter()
            .chain(self.noise.iter())
            .any(|pattern| line.contains(pattern))
    }
}

pub fn profile_for(tool_name: &str) -> NormalizationProfile {
    let (noise, keep_ports) = match tool_name {
        "amass" => (AMASS_NOISE, false),
        "sudomy" => (SUDOMY_NOISE, false),
        "bbot" => (BBOT_NOISE, false),
        "subfinder" => (SUBFINDER_NOISE, false),
        "dnscan" => (DNSCAN_NOISE, false),
        "ffuf" => (FFUF_NOISE, true),
        _ => (&[][..], false),
    };
    NormalizationProfile { noise, keep_ports }
}
