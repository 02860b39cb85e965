// src/prober.rs
use crate::types::ToolSpec;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Decides whether a binary can be invoked on this host.
#[async_trait]
pub trait AvailabilityProbe: Send + Sync {
    async fn is_available(&self, binary: &str) -> bool;
}

/// Probes by running short help/lookup commands, in order, until one exits 0.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    per_probe_timeout: Duration,
}

impl CommandProbe {
    pub fn new() -> Self {
        Self {
            per_probe_timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(per_probe_timeout: Duration) -> Self {
        Self { per_probe_timeout }
    }

    fn candidates(binary: &str) -> Vec<Vec<String>> {
        vec![
            vec![binary.to_string(), "--help".to_string()],
            vec![binary.to_string(), "-h".to_string()],
            vec!["which".to_string(), binary.to_string()],
            // `command` is a shell builtin; the binary is passed as $1, never spliced in
            vec![
                "sh".to_string(),
                "-c".to_string(),
                "command -v \"$1\"".to_string(),
                "sh".to_string(),
                binary.to_string(),
            ],
        ]
    }

    async fn try_probe(&self, argv: &[String]) -> bool {
        let Some((program, args)) = argv.split_first() else {
            return false;
        };

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                debug!("probe {:?} could not start: {}", argv, e);
                return false;
            }
        };

        match timeout(self.per_probe_timeout, child.wait()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!("probe {:?} failed: {}", argv, e);
                false
            }
            Err(_) => {
                debug!("probe {:?} exceeded {:?}", argv, self.per_probe_timeout);
                let _ = child.kill().await;
                false
            }
        }
    }
}

impl Default for CommandProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AvailabilityProbe for CommandProbe {
    async fn is_available(&self, binary: &str) -> bool {
        for argv in Self::candidates(binary) {
            if self.try_probe(&argv).await {
                return true;
            }
        }
        false
    }
}

/// Returns the runnable subset of `tools`, preserving registration order.
pub async fn probe_tools(tools: &[ToolSpec], probe: &dyn AvailabilityProbe) -> Vec<ToolSpec> {
    info!("Scanning for available reconnaissance tools...");
    let mut available = Vec::new();

    for tool in tools {
        let Some(binary) = tool.binary() else {
            warn!("{}: empty command template, skipping", tool.name);
            continue;
        };

        if probe.is_available(binary).await {
            info!("{} [{}] available", tool.name, tool.category);
            available.push(tool.clone());
        } else {
            warn!("{} not found in PATH", tool.name);
        }
    }

    info!("Arsenal status: {}/{} tools available", available.len(), tools.len());
    available
}
