use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::application::settings::SettingsStore;
use crate::application::worker::{SearchEvent, SearchRequest, SearchWorker, WorkerOptions};
use crate::application::Config;
use crate::domain::{CancelToken, FinderError, NameQuery};
use crate::infrastructure::{
    CpuMonitor, ErrorLogger, ErrorType, LoggerTrait, MonitoringTrait, ShellActions, SystemShell,
};

/// 前台看到的搜索状态
#[derive(Debug, Clone, PartialEq)]
pub enum SearchState {
    Idle,
    Searching {
        query: String,
        scanned: u64,
        total: Option<u64>,
    },
    Finished {
        query: String,
        scanned: u64,
        errors: u64,
        elapsed: Duration,
    },
    Cancelled {
        query: String,
    },
    Failed {
        query: String,
        message: String,
    },
}

impl SearchState {
    pub fn is_searching(&self) -> bool {
        matches!(self, SearchState::Searching { .. })
    }
}

/// 前台搜索会话：持有设置、后台线程句柄和当前结果
///
/// 所有方法都在前台线程上调用，后台事件通过 `apply_event` / `poll_events` 应用。
pub struct SearchSession {
    store: SettingsStore,
    worker: SearchWorker,
    shell: Arc<dyn ShellActions>,
    logger: Arc<dyn LoggerTrait>,
    error_logger: Arc<ErrorLogger>,
    generation: u64,
    token: Option<CancelToken>,
    state: SearchState,
    results: Vec<PathBuf>,
    searches: u64,
}

impl SearchSession {
    pub fn new(
        store: SettingsStore,
        worker: SearchWorker,
        shell: Arc<dyn ShellActions>,
        logger: Arc<dyn LoggerTrait>,
        error_logger: Arc<ErrorLogger>,
    ) -> Self {
        Self {
            store,
            worker,
            shell,
            logger,
            error_logger,
            generation: 0,
            token: None,
            state: SearchState::Idle,
            results: Vec::new(),
            searches: 0,
        }
    }

    /// 按配置创建会话，使用系统默认的打开方式
    pub fn from_config(
        config: &Config,
        settings_path: &Path,
        logger: Arc<dyn LoggerTrait>,
        error_logger: Arc<ErrorLogger>,
    ) -> Result<Self> {
        let store = SettingsStore::open(settings_path)?;

        let monitor: Option<Arc<dyn MonitoringTrait>> = if config.performance.throttle {
            let monitor = CpuMonitor::new(&config.performance, Arc::clone(&logger));
            monitor.start()?;
            Some(Arc::new(monitor))
        } else {
            None
        };

        let worker = SearchWorker::spawn(WorkerOptions::from(config), Arc::clone(&logger), monitor)?;

        Ok(Self::new(store, worker, Arc::new(SystemShell), logger, error_logger))
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn results(&self) -> &[PathBuf] {
        &self.results
    }

    pub fn folders(&self) -> &[PathBuf] {
        self.store.folders()
    }

    pub fn settings_path(&self) -> &Path {
        self.store.path()
    }

    /// 本次会话中发起的搜索次数
    pub fn searches(&self) -> u64 {
        self.searches
    }

    /// 后台事件通道，供前台循环等待
    pub fn events(&self) -> Receiver<SearchEvent> {
        self.worker.events().clone()
    }

    /// 开始新的搜索
    ///
    /// 空白输入被忽略并返回 `None`。正在进行的搜索会被取消，旧结果被丢弃。
    pub fn start_search(&mut self, text: &str) -> Result<Option<u64>> {
        let query = match NameQuery::new(text) {
            Ok(query) => query,
            Err(FinderError::EmptyQuery) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        if let Some(token) = self.token.take() {
            token.cancel();
        }

        self.generation += 1;
        self.searches += 1;
        self.results.clear();

        let token = CancelToken::new();
        self.token = Some(token.clone());
        self.state = SearchState::Searching {
            query: query.text().to_string(),
            scanned: 0,
            total: None,
        };

        let request = SearchRequest {
            generation: self.generation,
            query,
            roots: self.store.folders().to_vec(),
            token,
        };

        if let Err(err) = self.worker.submit(request) {
            self.token = None;
            self.state = SearchState::Failed {
                query: text.trim().to_string(),
                message: err.to_string(),
            };
            return Err(err.into());
        }

        if self.logger.is_enabled() {
            let _ = self.logger.log_message(&format!(
                "提交搜索 #{}: \"{}\"",
                self.generation,
                text.trim()
            ));
        }

        Ok(Some(self.generation))
    }

    /// 请求取消当前搜索，没有进行中的搜索时返回 `false`
    pub fn cancel(&mut self) -> bool {
        if !self.state.is_searching() {
            return false;
        }

        match &self.token {
            Some(token) => {
                token.cancel();
                if self.logger.is_enabled() {
                    let _ = self
                        .logger
                        .log_message(&format!("请求取消搜索 #{}", self.generation));
                }
                true
            }
            None => false,
        }
    }

    /// 应用一个后台事件，过期的事件被丢弃并返回 `false`
    pub fn apply_event(&mut self, event: &SearchEvent) -> bool {
        if event.generation() != self.generation {
            return false;
        }

        let query = match &self.state {
            SearchState::Searching { query, .. } => query.clone(),
            // 终止事件之后不再接受同一请求的事件
            _ => return false,
        };
        let cancel_requested = self.token.as_ref().map_or(false, CancelToken::is_cancelled);

        match event {
            SearchEvent::Started { total, .. } => {
                self.state = SearchState::Searching {
                    query,
                    scanned: 0,
                    total: *total,
                };
            }
            SearchEvent::Progress { scanned, total, .. } => {
                self.state = SearchState::Searching {
                    query,
                    scanned: *scanned,
                    total: *total,
                };
            }
            // 取消请求发出之后才到达的结果同样丢弃
            SearchEvent::Finished { .. } if cancel_requested => {
                self.token = None;
                self.results.clear();
                self.state = SearchState::Cancelled { query };
            }
            SearchEvent::Finished {
                matches,
                scanned,
                errors,
                elapsed,
                ..
            } => {
                self.token = None;
                self.results = matches.clone();
                self.state = SearchState::Finished {
                    query,
                    scanned: *scanned,
                    errors: *errors,
                    elapsed: *elapsed,
                };
            }
            SearchEvent::Cancelled { .. } => {
                self.token = None;
                self.results.clear();
                self.state = SearchState::Cancelled { query };
            }
            SearchEvent::Failed { message, .. } => {
                self.token = None;
                self.results.clear();
                let _ = self.error_logger.log_error(
                    ErrorType::Search,
                    None,
                    &format!("搜索 \"{}\" 失败", query),
                    Some(message.as_str()),
                );
                self.state = SearchState::Failed {
                    query,
                    message: message.clone(),
                };
            }
        }

        true
    }

    /// 应用所有已到达的事件，不阻塞
    pub fn poll_events(&mut self) -> Vec<SearchEvent> {
        let pending: Vec<SearchEvent> = self.worker.events().try_iter().collect();
        pending
            .into_iter()
            .filter(|event| self.apply_event(event))
            .collect()
    }

    /// 等待下一个有效事件，超时返回 `None`
    pub fn wait_event(&mut self, timeout: Duration) -> Option<SearchEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.worker.events().recv_timeout(remaining) {
                Ok(event) => {
                    if self.apply_event(&event) {
                        return Some(event);
                    }
                }
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => {
                    self.worker_gone();
                    return None;
                }
            }
        }
    }

    /// 后台线程已退出，进行中的搜索不会再收到事件
    fn worker_gone(&mut self) {
        if !self.state.is_searching() {
            return;
        }
        let event = SearchEvent::Failed {
            generation: self.generation,
            message: FinderError::WorkerGone.to_string(),
        };
        self.apply_event(&event);
    }

    /// 等待当前搜索结束，超时返回 `false`
    pub fn wait_until_done(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.state.is_searching() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || self.wait_event(remaining).is_none() {
                return !self.state.is_searching();
            }
        }
        true
    }

    pub fn result(&self, index: usize) -> Result<&Path, FinderError> {
        self.results
            .get(index)
            .map(PathBuf::as_path)
            .ok_or(FinderError::NoSuchResult {
                index,
                len: self.results.len(),
            })
    }

    /// 用系统默认程序打开结果
    pub fn open_result(&self, index: usize) -> Result<PathBuf> {
        let path = self.result(index)?.to_path_buf();
        self.run_shell(ErrorType::OpenFile, "无法打开文件", &path, |shell| shell.open_path(&path))?;
        Ok(path)
    }

    /// 在文件管理器中显示结果
    pub fn reveal_result(&self, index: usize) -> Result<PathBuf> {
        let path = self.result(index)?.to_path_buf();
        self.run_shell(ErrorType::RevealFile, "无法打开文件位置", &path, |shell| {
            shell.reveal_path(&path)
        })?;
        Ok(path)
    }

    /// 把结果路径复制到剪贴板
    pub fn copy_result(&self, index: usize) -> Result<PathBuf> {
        let path = self.result(index)?.to_path_buf();
        let text = path.to_string_lossy().to_string();
        self.run_shell(ErrorType::Clipboard, "无法复制路径", &path, |shell| {
            shell.copy_text(&text)
        })?;
        Ok(path)
    }

    fn run_shell<F>(&self, error_type: ErrorType, message: &str, path: &Path, action: F) -> Result<()>
    where
        F: FnOnce(&dyn ShellActions) -> Result<(), crate::infrastructure::ShellError>,
    {
        if let Err(err) = action(self.shell.as_ref()) {
            let path_text = path.to_string_lossy();
            let _ = self.error_logger.log_error(
                error_type,
                Some(&path_text),
                message,
                Some(&err.to_string()),
            );
            return Err(anyhow::Error::new(err).context(format!("{}: {}", message, path.display())));
        }

        if self.logger.is_enabled() {
            let _ = self
                .logger
                .log_message(&format!("{}: {}", error_type.as_str(), path.display()));
        }
        Ok(())
    }

    /// 添加搜索文件夹并立即保存，已存在时返回 `false`
    pub fn add_folder(&mut self, folder: impl Into<PathBuf>) -> Result<bool> {
        let folder = folder.into();
        let added = self
            .store
            .add_folder(&folder)
            .map_err(|err| self.settings_error(err, &folder))?;

        if added && self.logger.is_enabled() {
            let _ = self
                .logger
                .log_message(&format!("添加搜索文件夹: {}", folder.display()));
        }
        Ok(added)
    }

    /// 移除搜索文件夹并立即保存，不存在时返回 `false`
    pub fn remove_folder(&mut self, folder: &Path) -> Result<bool> {
        let removed = self
            .store
            .remove_folder(folder)
            .map_err(|err| self.settings_error(err, folder))?;

        if removed && self.logger.is_enabled() {
            let _ = self
                .logger
                .log_message(&format!("移除搜索文件夹: {}", folder.display()));
        }
        Ok(removed)
    }

    /// 按位置移除搜索文件夹
    pub fn remove_folder_at(&mut self, index: usize) -> Result<PathBuf> {
        let folder = self
            .store
            .folders()
            .get(index)
            .cloned()
            .ok_or(FinderError::NoSuchFolder {
                index,
                len: self.store.folders().len(),
            })?;

        self.remove_folder(&folder)?;
        Ok(folder)
    }

    fn settings_error(&self, err: anyhow::Error, folder: &Path) -> anyhow::Error {
        // 输入错误不记入错误日志
        if err.downcast_ref::<FinderError>().is_none() {
            let folder_text = folder.to_string_lossy();
            let _ = self.error_logger.log_error(
                ErrorType::Settings,
                Some(&folder_text),
                "无法保存设置",
                Some(&format!("{:#}", err)),
            );
        }
        err
    }
}

impl Drop for SearchSession {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}
