use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use sysinfo::System;

use crate::application::config::PerformanceConfig;
use crate::infrastructure::LoggerTrait;

/// 后台搜索的限流接口
pub trait MonitoringTrait: Send + Sync {
    fn start(&self) -> Result<()>;
    fn stop(&self);
    /// CPU负载过高时让当前线程暂停一段时间
    fn apply_throttle(&self);
}

/// CPU监控器
pub struct CpuMonitor {
    cpu_threshold: f32,
    search_delay_ms: u64,
    should_throttle: Arc<AtomicBool>,
    is_running: Arc<AtomicBool>,
    logger: Arc<dyn LoggerTrait>,
}

impl CpuMonitor {
    pub fn new(config: &PerformanceConfig, logger: Arc<dyn LoggerTrait>) -> Self {
        Self {
            cpu_threshold: config.cpu_threshold,
            search_delay_ms: config.search_delay_ms,
            should_throttle: Arc::new(AtomicBool::new(false)),
            is_running: Arc::new(AtomicBool::new(false)),
            logger,
        }
    }

    fn should_throttle(&self) -> bool {
        self.should_throttle.load(Ordering::Relaxed)
    }
}

impl MonitoringTrait for CpuMonitor {
    fn start(&self) -> Result<()> {
        if self.is_running.swap(true, Ordering::Relaxed) {
            return Ok(());
        }

        let cpu_threshold = self.cpu_threshold;
        let should_throttle = Arc::clone(&self.should_throttle);
        let is_running = Arc::clone(&self.is_running);
        let logger = Arc::clone(&self.logger);

        thread::Builder::new()
            .name("cpu-monitor".to_string())
            .spawn(move || {
                let mut system = System::new_all();
                let mut last_log_time = Instant::now();

                while is_running.load(Ordering::Relaxed) {
                    system.refresh_cpu();

                    let cpus = system.cpus();
                    let cpu_usage = if cpus.is_empty() {
                        0.0
                    } else {
                        cpus.iter().map(|cpu| cpu.cpu_usage()).sum::<f32>() / cpus.len() as f32
                    };

                    let needs_throttle = cpu_usage > cpu_threshold;
                    should_throttle.store(needs_throttle, Ordering::Relaxed);

                    // 每5秒记录一次CPU使用率
                    if logger.is_enabled() && last_log_time.elapsed() >= Duration::from_secs(5) {
                        let status = if needs_throttle { "限流中" } else { "正常" };
                        let _ = logger.log_message(&format!(
                            "CPU使用率: {:.1}% (阈值: {:.1}%) - {}",
                            cpu_usage, cpu_threshold, status
                        ));
                        last_log_time = Instant::now();
                    }

                    thread::sleep(Duration::from_secs(1));
                }
            })?;

        if self.logger.is_enabled() {
            self.logger.log_message(&format!(
                "CPU监控已启动 - 阈值: {:.1}%, 延迟: {}ms",
                self.cpu_threshold, self.search_delay_ms
            ))?;
        }

        Ok(())
    }

    fn stop(&self) {
        if !self.is_running.swap(false, Ordering::Relaxed) {
            return;
        }

        if self.logger.is_enabled() {
            let _ = self.logger.log_message("CPU监控已停止");
        }
    }

    fn apply_throttle(&self) {
        if self.should_throttle() {
            thread::sleep(Duration::from_millis(self.search_delay_ms));
        }
    }
}

impl Drop for CpuMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::Config;
    use crate::infrastructure::Logger;

    #[test]
    fn test_cpu_monitor_creation() {
        let config = Config::default();
        let monitor = CpuMonitor::new(&config.performance, Logger::disabled_arc());

        assert_eq!(monitor.cpu_threshold, 80.0);
        assert_eq!(monitor.search_delay_ms, 100);
        assert!(!monitor.should_throttle());
    }

    #[test]
    fn test_throttle_sleeps_only_when_flagged() {
        let config = Config::default();
        let monitor = CpuMonitor::new(&config.performance, Logger::disabled_arc());

        let start = Instant::now();
        monitor.apply_throttle();
        assert!(start.elapsed() < Duration::from_millis(100));

        monitor.should_throttle.store(true, Ordering::Relaxed);
        let start = Instant::now();
        monitor.apply_throttle();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_start_and_stop() {
        let config = Config::default();
        let monitor = CpuMonitor::new(&config.performance, Logger::disabled_arc());

        monitor.start().unwrap();
        assert!(monitor.is_running.load(Ordering::Relaxed));

        monitor.stop();
        assert!(!monitor.is_running.load(Ordering::Relaxed));
    }
}
