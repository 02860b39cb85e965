// src/tools/mod.rs
use crate::types::ToolSpec;

mod profiles;

pub use profiles::{profile_for, NormalizationProfile, GENERIC_NOISE};

// Built-in registry, in registration order
pub fn default_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            "subfinder",
            &["subfinder", "-d", "TARGET", "-silent", "-all", "-recursive"],
        )
        .with_category("passive")
        .with_description("Fast passive subdomain enumeration")
        .with_priority(1)
        .with_timeout_multiplier(1.0),
        ToolSpec::new("assetfinder", &["assetfinder", "--subs-only", "TARGET"])
            .with_category("passive")
            .with_description("Find domains and subdomains")
            .with_priority(1)
            .with_timeout_multiplier(0.8),
        ToolSpec::new(
            "amass",
            &["amass", "enum", "-active", "-d", "TARGET", "-silent", "-brute"],
        )
        .with_category("active")
        .with_description("In-depth attack surface mapping")
        .with_priority(2)
        .with_timeout_multiplier(2.0),
        ToolSpec::new(
            "bbot",
            &[
                "bbot", "-t", "TARGET", "-f", "subdomain-enum", "-s", "--output-dir",
                "/tmp/bbot_TARGET",
            ],
        )
        .with_category("active")
        .with_description("Recursive internet scanner")
        .with_priority(2)
        .with_timeout_multiplier(1.5),
        ToolSpec::new(
            "sudomy",
            &[
                "sudomy", "-d", "TARGET", "-aI", "webanalyze", "-rS", "-dP", "-pS", "-tO", "-gW",
                "--httpx", "--dnsprobe", "-s",
            ],
        )
        .with_category("comprehensive")
        .with_description("Advanced subdomain analysis")
        .with_priority(3)
        .with_timeout_multiplier(2.5),
        ToolSpec::new(
            "dnscan",
            &[
                "python3",
                "/usr/share/dnscan/dnscan.py",
                "-d",
                "TARGET",
                "-t",
                "100",
                "-w",
                "/usr/share/wordlists/subdomains-5000.txt",
            ],
        )
        .with_category("bruteforce")
        .with_description("Fast DNS brute force scanner")
        .with_priority(2)
        .with_timeout_multiplier(1.8),
        ToolSpec::new("subwiz", &["subwiz", "-d", "TARGET"])
            .with_category("ai")
            .with_description("ML-based subdomain prediction")
            .with_priority(3)
            .with_timeout_multiplier(1.2),
        ToolSpec::new("subdog", &["subdog", "TARGET", "--all"])
            .with_category("passive")
            .with_description("Fast subdomain discovery")
            .with_priority(1)
            .with_timeout_multiplier(1.0),
        ToolSpec::new(
            "ffuf",
            &[
                "ffuf",
                "-w",
                "/usr/share/wordlists/dirb/common.txt",
                "-u",
                "https://TARGET/FUZZ",
                "-mc",
                "200,204,301,302,307,401,403,405",
                "-fs",
                "0",
                "-t",
                "50",
            ],
        )
        .with_category("directory")
        .with_description("Fast web fuzzer for directories")
        .with_priority(4)
        .with_timeout_multiplier(1.5),
    ]
}

/// Case-insensitive lookup by tool name.
pub fn find_tool<'a>(tools: &'a [ToolSpec], name: &str) -> Option<&'a ToolSpec> {
    tools.iter().find(|t| t.name.eq_ignore_ascii_case(name))
}

/// Installation hints shown when nothing on the host is runnable.
pub const INSTALL_HINTS: &[(&str, &[&str])] = &[
    ("BlackArch/Arch Linux", &["sudo pacman -S subfinder assetfinder amass ffuf"]),
    (
        "Go tools",
        &[
            "go install github.com/projectdiscovery/subfinder/v2/cmd/subfinder@latest",
            "go install github.com/tomnomnom/assetfinder@latest",
            "go install github.com/owasp-amass/amass/v4/...@latest",
            "go install github.com/ffuf/ffuf@latest",
        ],
    ),
    ("Python tools", &["pip install bbot subwiz"]),
];
