use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::Local;

/// 日志记录器trait
pub trait LoggerTrait: Send + Sync {
    fn is_enabled(&self) -> bool;
    fn log_message(&self, message: &str) -> Result<()>;
    fn log_file(&self, path: &Path, size: u64, status: &str) -> Result<()>;
    fn finalize(&self, searches: u64, matched_files: u64, duration: Duration) -> Result<()>;
}

/// 调试日志记录器（记录搜索请求、文件夹变更和扫描过程）
pub struct Logger {
    log_file: Arc<Mutex<Option<File>>>,
    log_path: PathBuf,
    enabled: bool,
}

impl Logger {
    /// 创建新的日志记录器，日志文件写入当前目录
    pub fn new(enabled: bool) -> Result<Self> {
        if !enabled {
            return Ok(Self::disabled());
        }

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        Self::with_path(PathBuf::from(format!("filefinder_{}.log", timestamp)))
    }

    /// 写入指定路径的日志记录器
    pub fn with_path(log_path: PathBuf) -> Result<Self> {
        let now = Local::now();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        // 写入UTF-8 BOM以确保文件被正确识别为UTF-8
        let mut file_clone = file.try_clone()?;
        file_clone.write_all(&[0xEF, 0xBB, 0xBF])?;

        writeln!(file_clone, "# FileFinder 调试日志")?;
        writeln!(file_clone, "# 开始时间: {}", now.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(file_clone, "# --------------------------------------------")?;

        Ok(Self {
            log_file: Arc::new(Mutex::new(Some(file))),
            log_path,
            enabled: true,
        })
    }

    /// 不写任何内容的日志记录器
    pub fn disabled() -> Self {
        Self {
            log_file: Arc::new(Mutex::new(None)),
            log_path: PathBuf::new(),
            enabled: false,
        }
    }

    pub fn disabled_arc() -> Arc<dyn LoggerTrait> {
        Arc::new(Self::disabled())
    }

    /// 获取日志文件路径
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn write_line(&self, line: &str) -> Result<()> {
        if let Ok(mut file_guard) = self.log_file.lock() {
            if let Some(ref mut file) = *file_guard {
                writeln!(file, "{}", line)?;
                file.flush()?;
            }
        }
        Ok(())
    }
}

impl LoggerTrait for Logger {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn log_message(&self, message: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        self.write_line(&format!("[{}] {}", timestamp, message))
    }

    fn log_file(&self, path: &Path, size: u64, status: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        self.write_line(&format!(
            "[{}] 文件: {} | 大小: {} 字节 | 状态: {}",
            timestamp,
            path.display(),
            size,
            status
        ))
    }

    fn finalize(&self, searches: u64, matched_files: u64, duration: Duration) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let now = Local::now();
        self.write_line("# --------------------------------------------")?;
        self.write_line(&format!("# 结束时间: {}", now.format("%Y-%m-%d %H:%M:%S")))?;
        self.write_line(&format!("# 运行时长: {:.3}秒", duration.as_secs_f64()))?;
        self.write_line(&format!("# 搜索次数: {}", searches))?;
        self.write_line(&format!("# 最近一次匹配文件数: {}", matched_files))?;
        self.write_line("# ============================================")?;

        println!("完整日志已保存到: {}", self.log_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_disabled_logger() {
        let logger = Logger::new(false).unwrap();
        assert!(!logger.is_enabled());
        assert!(logger.log_message("ignored").is_ok());
        assert_eq!(logger.log_path(), Path::new(""));
    }

    #[test]
    fn test_logger_writes_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("debug.log");
        let logger = Logger::with_path(path.clone()).unwrap();
        let logger_trait: &dyn LoggerTrait = &logger;

        assert!(logger_trait.is_enabled());
        logger_trait.log_message("开始搜索").unwrap();
        logger_trait
            .log_file(Path::new("/tmp/a.txt"), 12, "已扫描")
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("FileFinder 调试日志"));
        assert!(content.contains("开始搜索"));
        assert!(content.contains("大小: 12 字节"));
    }
}
