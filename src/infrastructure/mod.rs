pub mod logging;
pub mod error_logging;
pub mod monitoring;
pub mod shell;

pub use logging::{Logger, LoggerTrait};
pub use error_logging::{ErrorLogger, ErrorType};
pub use monitoring::{CpuMonitor, MonitoringTrait};
pub use shell::{ShellActions, ShellError, SystemShell};
