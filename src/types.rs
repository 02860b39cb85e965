// src/types.rs
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Placeholder substituted with the scan target in command templates.
pub const TARGET_PLACEHOLDER: &str = "TARGET";

/// Upper bound on rejected lines archived per tool.
pub const MAX_ARCHIVED_LINES: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub base_timeout: Duration,
    pub threads: usize,
    pub include_stderr: Option<bool>,
    pub output_dir: Option<PathBuf>,
    pub disabled_tools: Vec<String>,
    pub tools: Vec<ToolSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_secs(300),
            threads: 8,
            include_stderr: None,
            output_dir: None,
            disabled_tools: Vec::new(),
            tools: crate::tools::default_tools(),
        }
    }
}

/// One external recon tool as registered at start-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub command: Vec<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default = "default_multiplier")]
    pub timeout_multiplier: f64,
}

fn default_category() -> String {
    "general".to_string()
}

fn default_priority() -> u32 {
    1
}

fn default_multiplier() -> f64 {
    1.0
}

impl ToolSpec {
    pub fn new(name: &str, command: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
            category: default_category(),
            description: String::new(),
            priority: default_priority(),
            timeout_multiplier: default_multiplier(),
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout_multiplier(mut self, multiplier: f64) -> Self {
        self.timeout_multiplier = multiplier;
        self
    }

    /// The executable the template invokes.
    pub fn binary(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    Timeout,
    SpawnFailure,
    Other,
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ToolErrorKind::Timeout => "timeout",
            ToolErrorKind::SpawnFailure => "spawn failure",
            ToolErrorKind::Other => "error",
        };
        f.write_str(label)
    }
}

/// Outcome of a single tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: String,
    pub subdomains: BTreeSet<String>,
    pub other_output: Vec<String>,
    pub success: bool,
    pub execution_time: Duration,
    pub error_kind: Option<ToolErrorKind>,
    pub error: Option<String>,
    pub return_code: Option<i32>,
}

impl ToolResult {
    pub fn completed(
        tool: &str,
        subdomains: BTreeSet<String>,
        mut other_output: Vec<String>,
        execution_time: Duration,
        return_code: Option<i32>,
    ) -> Self {
        other_output.truncate(MAX_ARCHIVED_LINES);
        Self {
            tool: tool.to_string(),
            subdomains,
            other_output,
            success: true,
            execution_time,
            error_kind: None,
            error: None,
            return_code,
        }
    }

    pub fn failed(tool: &str, kind: ToolErrorKind, message: String, execution_time: Duration) -> Self {
        Self {
            tool: tool.to_string(),
            subdomains: BTreeSet::new(),
            other_output: Vec::new(),
            success: false,
            execution_time,
            error_kind: Some(kind),
            error: Some(message),
            return_code: None,
        }
    }

    pub fn with_other_output(mut self, mut lines: Vec<String>) -> Self {
        lines.truncate(MAX_ARCHIVED_LINES);
        self.other_output = lines;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStatistics {
    pub tools_run: usize,
    pub tools_successful: usize,
    pub tools_failed: usize,
    pub total_subdomains_before_dedup: usize,
    pub unique_subdomains: usize,
    pub total_execution_time: Duration,
}

impl ScanStatistics {
    pub fn record(&mut self, result: &ToolResult) {
        self.tools_run += 1;
        if result.success {
            self.tools_successful += 1;
            self.total_subdomains_before_dedup += result.subdomains.len();
        } else {
            self.tools_failed += 1;
        }
    }

    /// Percentage of tools that completed, 0 when nothing ran.
    pub fn success_rate(&self) -> f64 {
        if self.tools_run == 0 {
            return 0.0;
        }
        self.tools_successful as f64 / self.tools_run as f64 * 100.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanInfo {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub threads_used: usize,
    pub timeout_per_tool: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub target: String,
    pub subdomains: Vec<String>,
    pub tool_results: IndexMap<String, ToolResult>,
    pub statistics: ScanStatistics,
    pub scan_info: ScanInfo,
    pub interrupted: bool,
    pub skipped_tools: Vec<String>,
}

#[derive(Debug, Error)]
pub enum SubdoError {
    #[error("No tools available: {0}")]
    NoToolsAvailable(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Output error: {0}")]
    OutputError(String),

    #[error("Failed to spawn {0}")]
    SpawnError(String),

    #[error("Process error: {0}")]
    ProcessError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
