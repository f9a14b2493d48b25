use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use humansize::{format_size, BINARY};

use crate::application::config::DisplayConfig;
use crate::application::SearchState;

/// 格式化文件大小
pub fn format_file_size(size: u64) -> String {
    format_size(size, BINARY)
}

/// 格式化持续时间
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}.{:03}s", secs, duration.subsec_millis())
    }
}

/// 进度文字
pub fn progress_message(scanned: u64, total: Option<u64>) -> String {
    match total {
        Some(total) if total > 0 => {
            let percentage = (scanned as f64 / total as f64) * 100.0;
            format!("已扫描 {}/{} 文件 ({:.1}%)", scanned, total, percentage)
        }
        _ => format!("已扫描 {} 文件", scanned),
    }
}

/// 输出结果列表，编号从1开始
pub fn write_results<W: Write>(out: &mut W, results: &[PathBuf], config: &DisplayConfig) -> Result<()> {
    if results.is_empty() {
        writeln!(out, "No files found.")?;
        return Ok(());
    }

    let shown = if config.max_results_shown == 0 {
        results.len()
    } else {
        results.len().min(config.max_results_shown)
    };

    for (index, path) in results.iter().take(shown).enumerate() {
        write!(out, "\x1b[1;34m{:>4}\x1b[0m  \x1b[1;32m{}\x1b[0m", index + 1, path.display())?;
        if config.show_sizes {
            if let Ok(metadata) = std::fs::metadata(path) {
                write!(out, "  \x1b[2;37m({})\x1b[0m", format_file_size(metadata.len()))?;
            }
        }
        writeln!(out)?;
    }

    if shown < results.len() {
        writeln!(out, "\x1b[2;37m... 另有 {} 个结果未显示\x1b[0m", results.len() - shown)?;
    }

    Ok(())
}

pub fn print_results(results: &[PathBuf], config: &DisplayConfig) -> Result<()> {
    let mut stdout = io::stdout().lock();
    write_results(&mut stdout, results, config)
}

/// 输出搜索文件夹列表
pub fn write_folders<W: Write>(out: &mut W, folders: &[PathBuf]) -> Result<()> {
    writeln!(out, "搜索文件夹:")?;
    if folders.is_empty() {
        writeln!(out, "  (无, 使用 add <目录> 添加)")?;
        return Ok(());
    }

    for (index, folder) in folders.iter().enumerate() {
        writeln!(out, "  {:>2}. {}", index + 1, folder.display())?;
    }
    Ok(())
}

pub fn print_folders(folders: &[PathBuf]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    write_folders(&mut stdout, folders)
}

/// 以醒目的方式输出错误通知
pub fn write_notification<W: Write>(out: &mut W, title: &str, err: &anyhow::Error) -> Result<()> {
    writeln!(out, "\x1b[1;31m┌─ {} ─\x1b[0m", title)?;
    for cause in err.chain() {
        writeln!(out, "\x1b[1;31m│\x1b[0m {}", cause)?;
    }
    writeln!(out, "\x1b[1;31m└─\x1b[0m")?;
    Ok(())
}

pub fn print_notification(title: &str, err: &anyhow::Error) {
    let mut stderr = io::stderr().lock();
    let _ = write_notification(&mut stderr, title, err);
}

/// 单行状态说明
pub fn state_line(state: &SearchState) -> String {
    match state {
        SearchState::Idle => "输入文件名的一部分开始搜索".to_string(),
        SearchState::Searching { query, scanned, total } => {
            format!("🔄 Searching \"{}\"... {}", query, progress_message(*scanned, *total))
        }
        SearchState::Finished { query, .. } => format!("\"{}\" 搜索完成", query),
        SearchState::Cancelled { query } => format!("\"{}\" 搜索已取消", query),
        SearchState::Failed { query, message } => format!("\"{}\" 搜索失败: {}", query, message),
    }
}

/// 搜索摘要
pub struct SearchSummary {
    pub matched_files: usize,
    pub scanned_files: u64,
    pub errors: u64,
    pub duration: Duration,
}

impl SearchSummary {
    /// 仅对已完成的搜索生成摘要
    pub fn from_state(state: &SearchState, matched_files: usize) -> Option<Self> {
        match state {
            SearchState::Finished {
                scanned,
                errors,
                elapsed,
                ..
            } => Some(Self {
                matched_files,
                scanned_files: *scanned,
                errors: *errors,
                duration: *elapsed,
            }),
            _ => None,
        }
    }

    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "\n搜索摘要:")?;
        writeln!(out, "----------------------------")?;
        writeln!(out, "总用时: {}", format_duration(self.duration))?;
        writeln!(out, "扫描文件: {}", self.scanned_files)?;
        writeln!(out, "匹配文件: {}", self.matched_files)?;
        if self.errors > 0 {
            writeln!(out, "无法访问: {}", self.errors)?;
        }
        Ok(())
    }

    pub fn print(&self) -> Result<()> {
        let mut stdout = io::stdout().lock();
        self.write(&mut stdout)
    }
}

/// 用于显示的短路径（只保留文件名）
pub fn short_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::Config;

    fn plain(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1250)), "1.250s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_progress_message() {
        assert_eq!(progress_message(50, Some(200)), "已扫描 50/200 文件 (25.0%)");
        assert_eq!(progress_message(7, None), "已扫描 7 文件");
        assert_eq!(progress_message(0, Some(0)), "已扫描 0 文件");
    }

    #[test]
    fn test_empty_results() {
        let mut out = Vec::new();
        write_results(&mut out, &[], &Config::default().display).unwrap();
        assert_eq!(plain(out), "No files found.\n");
    }

    #[test]
    fn test_results_are_numbered_and_limited() {
        let mut config = Config::default().display;
        config.show_sizes = false;
        config.max_results_shown = 2;

        let results = vec![
            PathBuf::from("/a/one.txt"),
            PathBuf::from("/a/two.txt"),
            PathBuf::from("/a/three.txt"),
        ];
        let mut out = Vec::new();
        write_results(&mut out, &results, &config).unwrap();
        let text = plain(out);

        assert!(text.contains("   1"));
        assert!(text.contains("/a/two.txt"));
        assert!(!text.contains("/a/three.txt"));
        assert!(text.contains("另有 1 个结果未显示"));
    }

    #[test]
    fn test_folders_listing() {
        let mut out = Vec::new();
        write_folders(&mut out, &[]).unwrap();
        assert!(plain(out).contains("(无"));

        let mut out = Vec::new();
        write_folders(&mut out, &[PathBuf::from("/srv/docs")]).unwrap();
        assert!(plain(out).contains(" 1. /srv/docs"));
    }

    #[test]
    fn test_notification_lists_causes() {
        let err = anyhow::anyhow!("xdg-open 执行失败").context("无法打开文件: /a/b.txt");
        let mut out = Vec::new();
        write_notification(&mut out, "错误", &err).unwrap();
        let text = plain(out);

        assert!(text.contains("错误"));
        assert!(text.contains("无法打开文件: /a/b.txt"));
        assert!(text.contains("xdg-open 执行失败"));
    }

    #[test]
    fn test_summary_only_for_finished_search() {
        let state = SearchState::Finished {
            query: "x".to_string(),
            scanned: 10,
            errors: 1,
            elapsed: Duration::from_millis(20),
        };
        let summary = SearchSummary::from_state(&state, 3).unwrap();
        let mut out = Vec::new();
        summary.write(&mut out).unwrap();
        let text = plain(out);
        assert!(text.contains("扫描文件: 10"));
        assert!(text.contains("匹配文件: 3"));
        assert!(text.contains("无法访问: 1"));

        let cancelled = SearchState::Cancelled { query: "x".to_string() };
        assert!(SearchSummary::from_state(&cancelled, 0).is_none());
    }

    #[test]
    fn test_state_line() {
        let state = SearchState::Searching {
            query: "abc".to_string(),
            scanned: 1,
            total: Some(4),
        };
        assert!(state_line(&state).contains("Searching \"abc\""));
        assert!(state_line(&SearchState::Cancelled { query: "abc".into() }).contains("已取消"));
    }
}
