// src/lib.rs
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod normalizer;
pub mod output;
pub mod prober;
pub mod runner;
pub mod tools;
pub mod types;
pub mod utils;

pub use cli::Args;
pub use engine::{ScanEngine, ScanOptions};
pub use normalizer::normalize;
pub use types::{Config, ScanResult, SubdoError, ToolErrorKind, ToolResult, ToolSpec};
pub use utils::is_valid_subdomain;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
