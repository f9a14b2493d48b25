use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::application::Config;
use crate::domain::file_walker::scan_roots_logged;
use crate::domain::{count_files, CancelToken, FinderError, NameQuery, WalkOptions, WalkOutcome};
use crate::infrastructure::{LoggerTrait, MonitoringTrait};

/// 一次后台搜索请求
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub generation: u64,
    pub query: NameQuery,
    pub roots: Vec<PathBuf>,
    pub token: CancelToken,
}

/// 后台线程发回前台的事件
///
/// 每个请求先发 `Started`，然后是若干 `Progress`，最后恰好一个
/// `Finished`、`Cancelled` 或 `Failed`。
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    Started {
        generation: u64,
        total: Option<u64>,
    },
    Progress {
        generation: u64,
        scanned: u64,
        total: Option<u64>,
    },
    Finished {
        generation: u64,
        matches: Vec<PathBuf>,
        scanned: u64,
        errors: u64,
        elapsed: Duration,
    },
    Cancelled {
        generation: u64,
    },
    Failed {
        generation: u64,
        message: String,
    },
}

impl SearchEvent {
    pub fn generation(&self) -> u64 {
        match self {
            SearchEvent::Started { generation, .. }
            | SearchEvent::Progress { generation, .. }
            | SearchEvent::Finished { generation, .. }
            | SearchEvent::Cancelled { generation }
            | SearchEvent::Failed { generation, .. } => *generation,
        }
    }

    /// 是否为请求的最后一个事件
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SearchEvent::Finished { .. } | SearchEvent::Cancelled { .. } | SearchEvent::Failed { .. }
        )
    }
}

/// 后台搜索参数
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub walk: WalkOptions,
    pub precount: bool,
    pub progress_interval: u64,
}

impl From<&Config> for WorkerOptions {
    fn from(config: &Config) -> Self {
        Self {
            walk: config.walk_options(),
            precount: config.search.precount,
            progress_interval: config.performance.progress_interval.max(1),
        }
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

enum WorkerMessage {
    Run(SearchRequest),
    Shutdown,
}

/// 单个常驻的后台搜索线程
pub struct SearchWorker {
    requests: Sender<WorkerMessage>,
    events: Receiver<SearchEvent>,
    handle: Option<JoinHandle<()>>,
}

impl SearchWorker {
    pub fn spawn(
        options: WorkerOptions,
        logger: Arc<dyn LoggerTrait>,
        monitor: Option<Arc<dyn MonitoringTrait>>,
    ) -> Result<Self> {
        let (request_tx, request_rx) = unbounded::<WorkerMessage>();
        let (event_tx, event_rx) = unbounded::<SearchEvent>();

        let handle = thread::Builder::new()
            .name("search-worker".to_string())
            .spawn(move || {
                worker_loop(&options, &logger, monitor.as_deref(), &request_rx, &event_tx)
            })
            .context("无法启动后台搜索线程")?;

        Ok(Self {
            requests: request_tx,
            events: event_rx,
            handle: Some(handle),
        })
    }

    /// 提交搜索请求，不等待结果
    pub fn submit(&self, request: SearchRequest) -> Result<(), FinderError> {
        self.requests
            .send(WorkerMessage::Run(request))
            .map_err(|_| FinderError::WorkerGone)
    }

    /// 前台用来接收事件的通道
    pub fn events(&self) -> &Receiver<SearchEvent> {
        &self.events
    }

    /// 收到第一个请求后不发任何事件就退出的线程
    #[cfg(test)]
    pub(crate) fn exiting_after_first_request() -> Self {
        let (request_tx, request_rx) = unbounded::<WorkerMessage>();
        let (event_tx, event_rx) = unbounded::<SearchEvent>();

        let handle = thread::spawn(move || {
            let _ = request_rx.recv();
            drop(event_tx);
        });

        Self {
            requests: request_tx,
            events: event_rx,
            handle: Some(handle),
        }
    }
}

impl Drop for SearchWorker {
    fn drop(&mut self) {
        let _ = self.requests.send(WorkerMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    options: &WorkerOptions,
    logger: &Arc<dyn LoggerTrait>,
    monitor: Option<&dyn MonitoringTrait>,
    requests: &Receiver<WorkerMessage>,
    events: &Sender<SearchEvent>,
) {
    while let Ok(message) = requests.recv() {
        let mut request = match message {
            WorkerMessage::Run(request) => request,
            WorkerMessage::Shutdown => return,
        };

        // 只执行排队中最新的请求
        let mut shutdown = false;
        while let Ok(next) = requests.try_recv() {
            match next {
                WorkerMessage::Run(newer) => {
                    let _ = events.send(SearchEvent::Cancelled {
                        generation: request.generation,
                    });
                    request = newer;
                }
                WorkerMessage::Shutdown => {
                    shutdown = true;
                    break;
                }
            }
        }
        if shutdown {
            return;
        }

        let generation = request.generation;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            run_search(&request, options, logger, monitor, events)
        }));

        let terminal = match result {
            Ok(event) => event,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "未知错误".to_string());
                if logger.is_enabled() {
                    let _ = logger.log_message(&format!("搜索 #{} 失败: {}", generation, message));
                }
                SearchEvent::Failed { generation, message }
            }
        };

        if events.send(terminal).is_err() {
            // 前台已经退出
            return;
        }
    }
}

/// 执行一次搜索，返回最后一个事件
fn run_search(
    request: &SearchRequest,
    options: &WorkerOptions,
    logger: &Arc<dyn LoggerTrait>,
    monitor: Option<&dyn MonitoringTrait>,
    events: &Sender<SearchEvent>,
) -> SearchEvent {
    let generation = request.generation;
    let token = &request.token;
    let start_time = Instant::now();

    if logger.is_enabled() {
        let _ = logger.log_message(&format!(
            "搜索 #{}: \"{}\", 文件夹数: {}",
            generation,
            request.query.text(),
            request.roots.len()
        ));
    }

    if token.is_cancelled() {
        return SearchEvent::Cancelled { generation };
    }

    let total = if options.precount {
        match count_files(&request.roots, &options.walk, token, logger) {
            Some(total) => Some(total),
            None => return SearchEvent::Cancelled { generation },
        }
    } else {
        None
    };

    let _ = events.send(SearchEvent::Started { generation, total });

    let interval = options.progress_interval.max(1);
    let mut scanned = 0u64;
    let mut matches = Vec::new();

    let outcome = scan_roots_logged(&request.roots, &options.walk, token, logger, |path| {
        scanned += 1;
        if request.query.matches(path) {
            matches.push(path.to_path_buf());
        }

        if scanned % interval == 0 {
            let _ = events.send(SearchEvent::Progress {
                generation,
                scanned,
                total,
            });
            if let Some(monitor) = monitor {
                monitor.apply_throttle();
            }
        }
    });

    match outcome {
        WalkOutcome::Cancelled => {
            if logger.is_enabled() {
                let _ = logger.log_message(&format!("搜索 #{} 已取消", generation));
            }
            SearchEvent::Cancelled { generation }
        }
        WalkOutcome::Completed { visited, errors } => {
            let _ = events.send(SearchEvent::Progress {
                generation,
                scanned: visited,
                total,
            });

            let elapsed = start_time.elapsed();
            if logger.is_enabled() {
                let _ = logger.log_message(&format!(
                    "搜索 #{} 完成: 扫描 {} 文件, 匹配 {} 个, 错误 {} 个, 用时 {:.3}秒",
                    generation,
                    visited,
                    matches.len(),
                    errors,
                    elapsed.as_secs_f64()
                ));
            }

            SearchEvent::Finished {
                generation,
                matches,
                scanned: visited,
                errors,
                elapsed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::Logger;
    use std::fs;
    use tempfile::tempdir;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn collect_until_terminal(worker: &SearchWorker) -> Vec<SearchEvent> {
        let mut events = Vec::new();
        loop {
            let event = worker.events().recv_timeout(TIMEOUT).unwrap();
            let done = event.is_terminal();
            events.push(event);
            if done {
                return events;
            }
        }
    }

    fn request(generation: u64, text: &str, roots: Vec<PathBuf>) -> SearchRequest {
        SearchRequest {
            generation,
            query: NameQuery::new(text).unwrap(),
            roots,
            token: CancelToken::new(),
        }
    }

    #[test]
    fn test_search_reports_progress_and_matches() {
        let dir = tempdir().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("invoice_{}.pdf", i)), "").unwrap();
            fs::write(dir.path().join(format!("photo_{}.jpg", i)), "").unwrap();
        }

        let options = WorkerOptions {
            progress_interval: 3,
            ..WorkerOptions::default()
        };
        let worker = SearchWorker::spawn(options, Logger::disabled_arc(), None).unwrap();
        worker
            .submit(request(1, "INVOICE", vec![dir.path().to_path_buf()]))
            .unwrap();

        let events = collect_until_terminal(&worker);

        assert_eq!(events[0], SearchEvent::Started { generation: 1, total: Some(10) });
        let progress: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                SearchEvent::Progress { scanned, .. } => Some(*scanned),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![3, 6, 9, 10]);

        match events.last().unwrap() {
            SearchEvent::Finished {
                generation,
                matches,
                scanned,
                errors,
                ..
            } => {
                assert_eq!(*generation, 1);
                assert_eq!(*scanned, 10);
                assert_eq!(*errors, 0);
                assert_eq!(matches.len(), 5);
                assert!(matches[0].ends_with("invoice_0.pdf"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_cancelled_request_yields_no_results() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("match.txt"), "").unwrap();

        let worker =
            SearchWorker::spawn(WorkerOptions::default(), Logger::disabled_arc(), None).unwrap();
        let req = request(7, "match", vec![dir.path().to_path_buf()]);
        req.token.cancel();
        worker.submit(req).unwrap();

        let events = collect_until_terminal(&worker);
        assert_eq!(events, vec![SearchEvent::Cancelled { generation: 7 }]);
    }

    #[test]
    fn test_without_precount_total_is_unknown() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "").unwrap();

        let options = WorkerOptions {
            precount: false,
            ..WorkerOptions::default()
        };
        let worker = SearchWorker::spawn(options, Logger::disabled_arc(), None).unwrap();
        worker
            .submit(request(2, "a", vec![dir.path().to_path_buf()]))
            .unwrap();

        let events = collect_until_terminal(&worker);
        assert_eq!(events[0], SearchEvent::Started { generation: 2, total: None });
        assert!(matches!(events.last(), Some(SearchEvent::Finished { .. })));
    }

    #[test]
    fn test_event_helpers() {
        let event = SearchEvent::Failed {
            generation: 4,
            message: "boom".to_string(),
        };
        assert_eq!(event.generation(), 4);
        assert!(event.is_terminal());
        assert!(!SearchEvent::Started { generation: 1, total: None }.is_terminal());
    }
}
