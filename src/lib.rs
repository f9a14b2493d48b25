// 三层架构模块
pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

// 重新导出主要类型
pub use domain::{search_files, CancelToken, FinderError, NameQuery, WalkOptions};
pub use application::{Config, SearchSession, SearchState, Settings, SettingsStore};
pub use infrastructure::{ErrorLogger, ErrorType, Logger, LoggerTrait, ShellActions, SystemShell};
pub use presentation::{print_results, Console, SearchSummary};
