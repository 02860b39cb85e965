use clap::Parser;
use std::path::PathBuf;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    " on ",
    env!("GIT_BRANCH"),
    ", built ",
    env!("BUILD_TIME"),
    ")"
);

#[derive(Parser, Debug, Clone)]
#[command(
    name = "subdo",
    version,
    long_version = LONG_VERSION,
    about = "Subdomain discovery orchestrator",
    long_about = "SubDO runs the subdomain discovery tools installed on this host in parallel,\nfilters their output down to valid subdomains and merges the results.",
    after_help = "Examples:\n  subdo -t example.com\n  subdo -t example.com --silent\n  subdo -t example.com --tools subfinder amass --threads 12\n  subdo -t example.com --timeout 600 --verbose"
)]
pub struct Args {
    /// Target domain for reconnaissance (e.g. example.com)
    #[arg(short = 't', long = "target", value_name = "DOMAIN", required_unless_present = "list_tools")]
    pub target: Option<String>,

    /// Silent mode - minimal output, suited for automation
    #[arg(short = 's', long = "silent")]
    pub silent: bool,

    /// Base timeout per tool in seconds [default: 300]
    #[arg(long = "timeout", value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Number of tools run in parallel [default: 8]
    #[arg(long = "threads", value_name = "N")]
    pub threads: Option<usize>,

    /// Specific tools to use (default: all available)
    #[arg(long = "tools", num_args = 1.., value_name = "TOOL")]
    pub tools: Option<Vec<String>>,

    /// Skip banner display
    #[arg(long = "no-banner")]
    pub no_banner: bool,

    /// Verbose output with debug information
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_path: Option<PathBuf>,

    /// Parent directory for the results folder
    #[arg(short = 'o', long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Print subdomains to stdout instead of writing a results folder
    #[arg(long = "no-save")]
    pub no_save: bool,

    /// List registered tools and whether they are installed
    #[arg(long = "list-tools")]
    pub list_tools: bool,
}

impl Args {
    /// Banner and progress bar only make sense on an interactive terminal.
    pub fn show_decorations(&self) -> bool {
        !self.silent && atty::is(atty::Stream::Stdout)
    }
}
