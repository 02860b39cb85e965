use crate::prober::{probe_tools, AvailabilityProbe, CommandProbe};
use crate::runner::{ProcessRunner, ToolExecutor};
use crate::tools::find_tool;
use crate::types::{
    ScanInfo, ScanResult, ScanStatistics, SubdoError, ToolErrorKind, ToolResult, ToolSpec,
};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use indexmap::IndexMap;
use indicatif::ProgressBar;
use log::{error, info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CONCURRENCY: usize = 8;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub concurrency: usize,
    pub base_timeout: Duration,
    /// Restricts the scan to these tool names when set.
    pub allow_list: Option<Vec<String>>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            base_timeout: Duration::from_secs(300),
            allow_list: None,
        }
    }
}

pub struct ScanEngine {
    tools: Vec<ToolSpec>,
    options: ScanOptions,
    probe: Arc<dyn AvailabilityProbe>,
    executor: Arc<dyn ToolExecutor>,
    progress: Option<ProgressBar>,
}

impl ScanEngine {
    pub fn new(tools: Vec<ToolSpec>, options: ScanOptions) -> Self {
        Self {
            tools,
            options,
            probe: Arc::new(CommandProbe::new()),
            executor: Arc::new(ProcessRunner::default()),
            progress: None,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn AvailabilityProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Probes the registry and applies the allow-list, ordered by priority.
    pub async fn runnable_tools(&self) -> Result<Vec<ToolSpec>, SubdoError> {
        let mut available = probe_tools(&self.tools, self.probe.as_ref()).await;
        if available.is_empty() {
            return Err(SubdoError::NoToolsAvailable(
                "no reconnaissance tools found in PATH".to_string(),
            ));
        }

        if let Some(allowed) = &self.options.allow_list {
            for name in allowed {
                if find_tool(&self.tools, name).is_none() {
                    warn!("Unknown tool: {}", name);
                }
            }
            available.retain(|t| allowed.iter().any(|name| name.eq_ignore_ascii_case(&t.name)));
            if available.is_empty() {
                return Err(SubdoError::NoToolsAvailable(format!(
                    "none of the requested tools are available: {}",
                    allowed.join(", ")
                )));
            }
        }

        // stable sort keeps registration order among equal priorities
        available.sort_by_key(|t| t.priority);
        Ok(available)
    }

    pub async fn execute(&self, target: &str, cancel: CancellationToken) -> Result<ScanResult, SubdoError> {
        let start_time = Utc::now();
        let started = Instant::now();

        let runnable = self.runnable_tools().await?;
        let concurrency = self.options.concurrency.max(1);
        info!(
            "Initiating parallel reconnaissance of {} with {} tools ({} workers)",
            target,
            runnable.len(),
            concurrency
        );

        if let Some(pb) = &self.progress {
            pb.set_length(runnable.len() as u64);
        }

        let mut pending = runnable.into_iter();
        let mut running = FuturesUnordered::new();
        let mut all_subdomains = BTreeSet::new();
        let mut tool_results = IndexMap::new();
        let mut statistics = ScanStatistics::default();

        loop {
            // Top the pool up in priority order; nothing new once cancelled
            while running.len() < concurrency && !cancel.is_cancelled() {
                match pending.next() {
                    Some(tool) => running.push(self.spawn_tool(tool, target)),
                    None => break,
                }
            }

            let Some(result) = running.next().await else {
                break;
            };

            // Single merge point: all shared state is touched only here
            statistics.record(&result);
            if result.success {
                all_subdomains.extend(result.subdomains.iter().cloned());
            }
            if let Some(pb) = &self.progress {
                pb.inc(1);
                pb.set_message(format!("{} done", result.tool));
            }
            tool_results.insert(result.tool.clone(), result);
        }

        let skipped_tools: Vec<String> = pending.map(|t| t.name).collect();
        let interrupted = cancel.is_cancelled();
        if interrupted {
            warn!(
                "Scan interrupted; {} tools were not started: {}",
                skipped_tools.len(),
                skipped_tools.join(", ")
            );
        }

        let subdomains: Vec<String> = all_subdomains.into_iter().collect();
        statistics.unique_subdomains = subdomains.len();
        statistics.total_execution_time = started.elapsed();

        info!(
            "Reconnaissance complete! {}/{} tools successful, {} unique subdomains",
            statistics.tools_successful,
            statistics.tools_run,
            statistics.unique_subdomains
        );

        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }

        Ok(ScanResult {
            target: target.to_string(),
            subdomains,
            tool_results,
            statistics,
            scan_info: ScanInfo {
                start_time,
                end_time: Utc::now(),
                threads_used: concurrency,
                timeout_per_tool: self.options.base_timeout,
            },
            interrupted,
            skipped_tools,
        })
    }

    fn spawn_tool(
        &self,
        tool: ToolSpec,
        target: &str,
    ) -> impl std::future::Future<Output = ToolResult> {
        let executor = self.executor.clone();
        let base_timeout = self.options.base_timeout;
        let target = target.to_string();
        let name = tool.name.clone();
        let started = Instant::now();

        let handle = tokio::spawn(async move { executor.execute(&tool, &target, base_timeout).await });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    // A panicking executor must not take the scan down with it
                    error!("{} task aborted: {}", name, e);
                    ToolResult::failed(&name, ToolErrorKind::Other, e.to_string(), started.elapsed())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct AllAvailable;

    #[async_trait]
    impl AvailabilityProbe for AllAvailable {
        async fn is_available(&self, _binary: &str) -> bool {
            true
        }
    }

    struct NoneAvailable;

    #[async_trait]
    impl AvailabilityProbe for NoneAvailable {
        async fn is_available(&self, _binary: &str) -> bool {
            false
        }
    }

    #[derive(Clone)]
    enum Behavior {
        Emit(Vec<&'static str>),
        Sleep(Duration, Vec<&'static str>),
        Timeout,
        Panic,
    }

    /// Scripted executor recording concurrency and start order.
    struct MockExecutor {
        behaviors: HashMap<String, Behavior>,
        active: AtomicUsize,
        peak: AtomicUsize,
        started: Mutex<Vec<String>>,
    }

    impl MockExecutor {
        fn new(behaviors: Vec<(&str, Behavior)>) -> Self {
            Self {
                behaviors: behaviors
                    .into_iter()
                    .map(|(name, b)| (name.to_string(), b))
                    .collect(),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                started: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ToolExecutor for MockExecutor {
        async fn execute(&self, tool: &ToolSpec, _target: &str, _base_timeout: Duration) -> ToolResult {
            self.started.lock().unwrap().push(tool.name.clone());
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let behavior = self.behaviors[&tool.name].clone();
            let result = match behavior {
                Behavior::Emit(names) => ToolResult::completed(
                    &tool.name,
                    names.iter().map(|s| s.to_string()).collect(),
                    Vec::new(),
                    Duration::from_millis(1),
                    Some(0),
                ),
                Behavior::Sleep(delay, names) => {
                    tokio::time::sleep(delay).await;
                    ToolResult::completed(
                        &tool.name,
                        names.iter().map(|s| s.to_string()).collect(),
                        Vec::new(),
                        delay,
                        Some(0),
                    )
                }
                Behavior::Timeout => ToolResult::failed(
                    &tool.name,
                    ToolErrorKind::Timeout,
                    "timed out after 1s".to_string(),
                    Duration::from_secs(1),
                ),
                Behavior::Panic => {
                    self.active.fetch_sub(1, Ordering::SeqCst);
                    panic!("{} blew up", tool.name);
                }
            };

            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn tool(name: &str, priority: u32) -> ToolSpec {
        ToolSpec::new(name, &[name, "TARGET"]).with_priority(priority)
    }

    fn options(concurrency: usize) -> ScanOptions {
        ScanOptions {
            concurrency,
            base_timeout: Duration::from_secs(1),
            allow_list: None,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_merge_and_statistics() {
        let tools = vec![tool("one", 1), tool("two", 1), tool("three", 2)];
        let executor = Arc::new(MockExecutor::new(vec![
            ("one", Behavior::Emit(vec!["a.example.com"])),
            ("two", Behavior::Emit(vec!["a.example.com", "b.example.com"])),
            ("three", Behavior::Timeout),
        ]));
        let engine = ScanEngine::new(tools, options(8))
            .with_probe(Arc::new(AllAvailable))
            .with_executor(executor);

        let result = engine.execute("example.com", CancellationToken::new()).await.unwrap();

        assert_eq!(result.subdomains, vec!["a.example.com", "b.example.com"]);
        assert_eq!(result.statistics.tools_run, 3);
        assert_eq!(result.statistics.tools_successful, 2);
        assert_eq!(result.statistics.tools_failed, 1);
        assert_eq!(result.statistics.total_subdomains_before_dedup, 3);
        assert_eq!(result.statistics.unique_subdomains, result.subdomains.len());
        assert_eq!(
            result.tool_results["three"].error_kind,
            Some(ToolErrorKind::Timeout)
        );
        assert!(!result.interrupted);
        assert!(result.skipped_tools.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_bound_is_respected() {
        let names: Vec<String> = (0..12).map(|i| format!("tool{}", i)).collect();
        let tools: Vec<ToolSpec> = names.iter().map(|n| tool(n, 1)).collect();
        let executor = Arc::new(MockExecutor::new(
            names
                .iter()
                .map(|n| {
                    (
                        n.as_str(),
                        Behavior::Sleep(Duration::from_millis(60), vec!["x.example.com"]),
                    )
                })
                .collect(),
        ));
        let engine = ScanEngine::new(tools, options(3))
            .with_probe(Arc::new(AllAvailable))
            .with_executor(executor.clone());

        let result = engine.execute("example.com", CancellationToken::new()).await.unwrap();

        assert_eq!(result.statistics.tools_run, 12);
        let peak = executor.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {} exceeded pool width", peak);
        assert!(peak >= 2, "tools never overlapped");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_submission_follows_priority() {
        let tools = vec![tool("late", 4), tool("early", 1), tool("middle", 2), tool("early2", 1)];
        let executor = Arc::new(MockExecutor::new(vec![
            ("late", Behavior::Emit(vec![])),
            ("early", Behavior::Emit(vec![])),
            ("middle", Behavior::Emit(vec![])),
            ("early2", Behavior::Emit(vec![])),
        ]));
        let engine = ScanEngine::new(tools, options(1))
            .with_probe(Arc::new(AllAvailable))
            .with_executor(executor.clone());

        engine.execute("example.com", CancellationToken::new()).await.unwrap();

        // with one worker, start order is exactly submission order
        assert_eq!(
            *executor.started.lock().unwrap(),
            vec!["early", "early2", "middle", "late"]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_panicking_tool_is_isolated() {
        let tools = vec![tool("good", 1), tool("bad", 1)];
        let executor = Arc::new(MockExecutor::new(vec![
            ("good", Behavior::Emit(vec!["ok.example.com"])),
            ("bad", Behavior::Panic),
        ]));
        let engine = ScanEngine::new(tools, options(2))
            .with_probe(Arc::new(AllAvailable))
            .with_executor(executor);

        let result = engine.execute("example.com", CancellationToken::new()).await.unwrap();

        assert_eq!(result.subdomains, vec!["ok.example.com"]);
        assert_eq!(result.statistics.tools_successful, 1);
        assert_eq!(result.statistics.tools_failed, 1);
        let bad = &result.tool_results["bad"];
        assert!(!bad.success);
        assert_eq!(bad.error_kind, Some(ToolErrorKind::Other));
        assert!(result.tool_results["good"].success);
    }

    #[tokio::test]
    async fn test_no_tools_available_is_terminal() {
        let engine = ScanEngine::new(vec![tool("one", 1)], options(2))
            .with_probe(Arc::new(NoneAvailable))
            .with_executor(Arc::new(MockExecutor::new(vec![])));

        let err = engine.execute("example.com", CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SubdoError::NoToolsAvailable(_)));
    }

    #[tokio::test]
    async fn test_allow_list_filters_and_can_empty_the_set() {
        let tools = vec![tool("one", 1), tool("two", 1)];
        let executor = Arc::new(MockExecutor::new(vec![
            ("one", Behavior::Emit(vec!["one.example.com"])),
            ("two", Behavior::Emit(vec!["two.example.com"])),
        ]));

        let mut opts = options(2);
        opts.allow_list = Some(vec!["TWO".to_string()]);
        let engine = ScanEngine::new(tools.clone(), opts)
            .with_probe(Arc::new(AllAvailable))
            .with_executor(executor.clone());
        let result = engine.execute("example.com", CancellationToken::new()).await.unwrap();
        assert_eq!(result.subdomains, vec!["two.example.com"]);
        assert_eq!(result.tool_results.len(), 1);

        let mut opts = options(2);
        opts.allow_list = Some(vec!["missing".to_string()]);
        let engine = ScanEngine::new(tools, opts)
            .with_probe(Arc::new(AllAvailable))
            .with_executor(executor);
        let err = engine.execute("example.com", CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SubdoError::NoToolsAvailable(_)));
    }

    #[tokio::test]
    async fn test_allow_list_matches_mixed_case_tool_names() {
        let tools = vec![tool("MyTool", 1), tool("other", 1)];
        let executor = Arc::new(MockExecutor::new(vec![
            ("MyTool", Behavior::Emit(vec!["mine.example.com"])),
            ("other", Behavior::Emit(vec!["other.example.com"])),
        ]));

        let mut opts = options(2);
        opts.allow_list = Some(vec!["mytool".to_string()]);
        let engine = ScanEngine::new(tools, opts)
            .with_probe(Arc::new(AllAvailable))
            .with_executor(executor);
        let result = engine.execute("example.com", CancellationToken::new()).await.unwrap();

        assert_eq!(result.subdomains, vec!["mine.example.com"]);
        assert!(result.tool_results.contains_key("MyTool"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancellation_stops_new_submissions() {
        let tools = vec![tool("first", 1), tool("second", 2), tool("third", 3)];
        let executor = Arc::new(MockExecutor::new(vec![
            (
                "first",
                Behavior::Sleep(Duration::from_millis(200), vec!["first.example.com"]),
            ),
            ("second", Behavior::Emit(vec!["second.example.com"])),
            ("third", Behavior::Emit(vec!["third.example.com"])),
        ]));
        let engine = ScanEngine::new(tools, options(1))
            .with_probe(Arc::new(AllAvailable))
            .with_executor(executor.clone());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = engine.execute("example.com", cancel).await.unwrap();

        // the in-flight tool finished normally and kept its output
        assert!(result.interrupted);
        assert_eq!(result.subdomains, vec!["first.example.com"]);
        assert_eq!(result.statistics.tools_run, 1);
        assert_eq!(result.skipped_tools, vec!["second", "third"]);
        assert_eq!(*executor.started.lock().unwrap(), vec!["first"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_end_to_end_with_real_processes() {
        let tools = vec![
            ToolSpec::new("single", &["sh", "-c", "echo a.TARGET"]),
            ToolSpec::new("double", &["sh", "-c", "echo a.TARGET; echo '[x] b.TARGET'; echo b.TARGET"]),
            ToolSpec::new("stuck", &["sh", "-c", "sleep 30"]).with_timeout_multiplier(1.0),
        ];
        let engine = ScanEngine::new(tools, options(3))
            .with_probe(Arc::new(AllAvailable))
            .with_executor(Arc::new(ProcessRunner::new(false)));

        let started = Instant::now();
        let result = engine.execute("example.com", CancellationToken::new()).await.unwrap();

        assert_eq!(result.subdomains, vec!["a.example.com", "b.example.com"]);
        assert_eq!(result.statistics.tools_successful, 2);
        assert_eq!(result.statistics.tools_failed, 1);
        assert_eq!(
            result.tool_results["stuck"].error_kind,
            Some(ToolErrorKind::Timeout)
        );
        // effective timeout is 1s; allow generous slack for slow CI hosts
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
