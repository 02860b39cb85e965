// src/runner.rs
use crate::normalizer::normalize;
use crate::types::{SubdoError, ToolErrorKind, ToolResult, ToolSpec, TARGET_PLACEHOLDER};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, timeout_at};
use tokio_util::sync::CancellationToken;

/// stderr lines containing any of these are never treated as data.
const STDERR_NOISE: &[&str] = &["error", "warning", "failed"];

/// How long output readers may keep draining once a tool's budget is spent.
pub const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Runs one tool against one target. Implementations never return an error:
/// every failure is folded into the returned [`ToolResult`].
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool: &ToolSpec, target: &str, base_timeout: Duration) -> ToolResult;
}

/// Scales the base timeout by the tool's multiplier, rounded down to whole
/// seconds and never below one second.
pub fn effective_timeout(base: Duration, multiplier: f64) -> Duration {
    let scaled = (base.as_secs() as f64 * multiplier).floor();
    // NaN and negative values saturate to 0 in the cast
    Duration::from_secs((scaled as u64).max(1))
}

/// Replaces the target placeholder in every token of the template.
pub fn build_command(template: &[String], target: &str) -> Vec<String> {
    template
        .iter()
        .map(|token| token.replace(TARGET_PLACEHOLDER, target))
        .collect()
}

enum ProcessOutcome {
    Exited {
        code: Option<i32>,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    TimedOut {
        stdout: Vec<u8>,
    },
    Aborted {
        stdout: Vec<u8>,
    },
}

/// Executes tools as local subprocesses with an explicit argument vector.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    include_stderr: bool,
    abort: CancellationToken,
}

impl ProcessRunner {
    pub fn new(include_stderr: bool) -> Self {
        Self {
            include_stderr,
            abort: CancellationToken::new(),
        }
    }

    /// Once `abort` fires, running tools are killed as if their timeout expired.
    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.abort = abort;
        self
    }

    async fn run_process(&self, argv: &[String], limit: Duration) -> Result<ProcessOutcome, SubdoError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| SubdoError::ProcessError("empty command template".to_string()))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .env("LANG", "C")
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so the whole tree can be signalled at once
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| SubdoError::SpawnError(format!("{}: {}", program, e)))?;

        // The group id equals the leader's pid; captured now because `id()`
        // is cleared once the leader is reaped.
        let pgid = child.id();
        let deadline = time::Instant::now() + limit;
        let stdout_reader = OutputReader::spawn(child.stdout.take());
        let stderr_reader = OutputReader::spawn(child.stderr.take());

        let waited = tokio::select! {
            waited = timeout_at(deadline, child.wait()) => Some(waited),
            _ = self.abort.cancelled() => None,
        };

        let timed_out = match waited {
            Some(Ok(status)) => {
                let status = status?;
                // Stragglers would otherwise hold the pipes open
                terminate_group(pgid);
                // A descendant that left the group can still hold them open
                let drain_until = deadline + DRAIN_GRACE;
                let stdout = stdout_reader.drain(drain_until).await?;
                let stderr = stderr_reader.drain(drain_until).await?;
                return Ok(ProcessOutcome::Exited {
                    code: status.code(),
                    stdout,
                    stderr,
                });
            }
            Some(Err(_)) => true,
            None => false,
        };

        terminate_group(pgid);
        kill_leader(&mut child).await;
        stderr_reader.abort();
        let stdout = stdout_reader
            .drain(time::Instant::now() + DRAIN_GRACE)
            .await
            .unwrap_or_default();

        if timed_out {
            Ok(ProcessOutcome::TimedOut { stdout })
        } else {
            Ok(ProcessOutcome::Aborted { stdout })
        }
    }

    fn collect_lines(&self, stdout: &[u8], stderr: &[u8]) -> Vec<String> {
        let mut lines: Vec<String> = String::from_utf8_lossy(stdout)
            .lines()
            .map(str::to_string)
            .collect();

        if self.include_stderr {
            lines.extend(
                String::from_utf8_lossy(stderr)
                    .lines()
                    .filter(|line| {
                        let lowered = line.to_lowercase();
                        !STDERR_NOISE.iter().any(|noise| lowered.contains(noise))
                    })
                    .map(str::to_string),
            );
        }

        lines
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl ToolExecutor for ProcessRunner {
    async fn execute(&self, tool: &ToolSpec, target: &str, base_timeout: Duration) -> ToolResult {
        let limit = effective_timeout(base_timeout, tool.timeout_multiplier);
        let argv = build_command(&tool.command, target);
        let start = Instant::now();

        info!(
            "Launching {} [{}] -> {} (timeout {}s)",
            tool.name,
            tool.category,
            target,
            limit.as_secs()
        );
        debug!("{}: argv {:?}", tool.name, argv);

        match self.run_process(&argv, limit).await {
            Ok(ProcessOutcome::Exited { code, stdout, stderr }) => {
                let lines = self.collect_lines(&stdout, &stderr);
                let normalized = normalize(&lines, &tool.name);
                let elapsed = start.elapsed();
                info!(
                    "{} completed: {} subdomains in {:.1}s",
                    tool.name,
                    normalized.subdomains.len(),
                    elapsed.as_secs_f64()
                );
                ToolResult::completed(
                    &tool.name,
                    normalized.subdomains,
                    normalized.rejected,
                    elapsed,
                    code,
                )
            }
            Ok(ProcessOutcome::TimedOut { stdout }) => {
                error!("{} timed out after {}s", tool.name, limit.as_secs());
                ToolResult::failed(
                    &tool.name,
                    ToolErrorKind::Timeout,
                    format!("timed out after {}s", limit.as_secs()),
                    start.elapsed(),
                )
                .with_other_output(partial_lines(&stdout))
            }
            Ok(ProcessOutcome::Aborted { stdout }) => {
                warn!("{} aborted", tool.name);
                ToolResult::failed(
                    &tool.name,
                    ToolErrorKind::Other,
                    "aborted by operator".to_string(),
                    start.elapsed(),
                )
                .with_other_output(partial_lines(&stdout))
            }
            Err(SubdoError::SpawnError(message)) => {
                error!("{} could not be started: {}", tool.name, message);
                ToolResult::failed(&tool.name, ToolErrorKind::SpawnFailure, message, start.elapsed())
            }
            Err(e) => {
                error!("{} failed: {}", tool.name, e);
                ToolResult::failed(&tool.name, ToolErrorKind::Other, e.to_string(), start.elapsed())
            }
        }
    }
}

fn partial_lines(stdout: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads a child's pipe into a shared buffer so that bytes already read
/// survive when the reader is abandoned.
struct OutputReader {
    buf: Arc<Mutex<Vec<u8>>>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl OutputReader {
    fn spawn<R>(stream: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let handle = tokio::spawn(async move {
            let Some(mut stream) = stream else {
                return Ok(());
            };
            let mut chunk = [0u8; 8192];
            loop {
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    return Ok(());
                }
                sink.lock().await.extend_from_slice(&chunk[..n]);
            }
        });
        Self { buf, handle }
    }

    /// Waits for end of stream until `deadline`, then gives up on the pipe and
    /// returns what was read so far.
    async fn drain(mut self, deadline: time::Instant) -> Result<Vec<u8>, SubdoError> {
        match timeout_at(deadline, &mut self.handle).await {
            Ok(joined) => joined
                .map_err(|e| SubdoError::ProcessError(format!("output reader aborted: {}", e)))??,
            Err(_) => {
                debug!("output pipe still open at deadline, keeping partial output");
                self.handle.abort();
            }
        }
        let mut buf = self.buf.lock().await;
        Ok(std::mem::take(&mut *buf))
    }

    fn abort(self) {
        self.handle.abort();
    }
}

#[cfg(unix)]
fn terminate_group(pgid: Option<u32>) {
    let Some(Ok(pgid)) = pgid.map(libc::pid_t::try_from) else {
        return;
    };
    // SAFETY: killpg only sends a signal; ESRCH for an empty group is ignored
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!("killpg({}) returned {}", pgid, std::io::Error::last_os_error());
    }
}

#[cfg(not(unix))]
fn terminate_group(_pgid: Option<u32>) {}

async fn kill_leader(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("failed to kill timed-out process: {}", e);
    }
}
