use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use ignore::{DirEntry, WalkBuilder, WalkState};

use crate::infrastructure::{Logger, LoggerTrait};

/// 协作式取消标记，遍历过程中每个文件之前检查一次
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// 遍历选项
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// 包含隐藏文件
    pub include_hidden: bool,
    /// 跟随符号链接
    pub follow_links: bool,
    /// 遵循 .gitignore 规则
    pub respect_gitignore: bool,
    /// 跳过的目录名
    pub excluded_dirs: HashSet<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            include_hidden: true,
            follow_links: false,
            respect_gitignore: false,
            excluded_dirs: HashSet::new(),
        }
    }
}

impl WalkOptions {
    /// 检查目录是否被排除
    pub fn is_dir_excluded(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || self.excluded_dirs.is_empty() {
            return false;
        }
        if !entry.file_type().map_or(false, |ft| ft.is_dir()) {
            return false;
        }
        self.excluded_dirs
            .contains(entry.file_name().to_string_lossy().as_ref())
    }

    fn builder(&self, roots: &[PathBuf]) -> Option<WalkBuilder> {
        let (first, rest) = roots.split_first()?;

        let mut builder = WalkBuilder::new(first);
        for root in rest {
            builder.add(root);
        }

        let options = self.clone();
        builder
            .hidden(!self.include_hidden)
            .follow_links(self.follow_links)
            .ignore(self.respect_gitignore)
            .parents(self.respect_gitignore)
            .git_global(self.respect_gitignore)
            .git_ignore(self.respect_gitignore)
            .git_exclude(self.respect_gitignore)
            .filter_entry(move |entry| !options.is_dir_excluded(entry));

        Some(builder)
    }
}

/// 遍历结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    /// 所有文件夹遍历完成
    Completed { visited: u64, errors: u64 },
    /// 遍历途中被取消
    Cancelled,
}

/// 普通文件，或者未跟随的指向非目录的符号链接（包括失效的链接）
fn is_regular_file(entry: &DirEntry) -> bool {
    match entry.file_type() {
        Some(ft) if ft.is_file() => true,
        Some(ft) if ft.is_symlink() => {
            std::fs::metadata(entry.path()).map_or(true, |m| !m.is_dir())
        }
        _ => false,
    }
}

/// 预先统计所有搜索文件夹中的文件数，用于计算进度
///
/// 使用并行遍历，线程数等于CPU数。被取消时返回 `None`。
pub fn count_files(
    roots: &[PathBuf],
    options: &WalkOptions,
    token: &CancelToken,
    logger: &Arc<dyn LoggerTrait>,
) -> Option<u64> {
    let Some(mut builder) = options.builder(roots) else {
        return Some(0);
    };
    builder.threads(num_cpus::get());

    let total = Arc::new(AtomicU64::new(0));

    builder.build_parallel().run(|| {
        let total = Arc::clone(&total);
        let token = token.clone();
        let logger = Arc::clone(logger);

        Box::new(move |result| {
            if token.is_cancelled() {
                return WalkState::Quit;
            }

            match result {
                Ok(entry) if is_regular_file(&entry) => {
                    total.fetch_add(1, Ordering::Relaxed);
                }
                Ok(_) => {}
                Err(err) => {
                    if logger.is_enabled() {
                        let _ = logger.log_message(&format!("统计时遍历错误: {}", err));
                    }
                }
            }

            WalkState::Continue
        })
    });

    if token.is_cancelled() {
        return None;
    }

    Some(total.load(Ordering::Relaxed))
}

/// 依次遍历所有搜索文件夹，对每个普通文件调用回调函数
///
/// 文件夹按给定顺序遍历，同一目录下的条目按文件名排序，因此结果顺序是确定的。
/// 无法读取的条目只记录日志，不会中断遍历。
pub fn scan_roots<F>(
    roots: &[PathBuf],
    options: &WalkOptions,
    token: &CancelToken,
    on_file: F,
) -> WalkOutcome
where
    F: FnMut(&Path),
{
    scan_roots_logged(roots, options, token, &Logger::disabled_arc(), on_file)
}

/// 与 `scan_roots` 相同，但把遍历错误和扫描到的文件写入日志
pub fn scan_roots_logged<F>(
    roots: &[PathBuf],
    options: &WalkOptions,
    token: &CancelToken,
    logger: &Arc<dyn LoggerTrait>,
    mut on_file: F,
) -> WalkOutcome
where
    F: FnMut(&Path),
{
    let mut visited = 0u64;
    let mut errors = 0u64;

    for root in roots {
        if logger.is_enabled() {
            let _ = logger.log_message(&format!("开始扫描目录: {}", root.display()));
        }

        let Some(mut builder) = options.builder(std::slice::from_ref(root)) else {
            continue;
        };
        builder.sort_by_file_name(|a, b| a.cmp(b));

        for result in builder.build() {
            if token.is_cancelled() {
                if logger.is_enabled() {
                    let _ = logger.log_message(&format!("扫描已取消, 已访问 {} 文件", visited));
                }
                return WalkOutcome::Cancelled;
            }

            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    errors += 1;
                    if logger.is_enabled() {
                        let _ = logger.log_message(&format!("遍历错误: {}", err));
                    }
                    continue;
                }
            };

            // 只处理文件
            if !is_regular_file(&entry) {
                continue;
            }

            if logger.is_enabled() {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                let _ = logger.log_file(entry.path(), size, "已扫描");
            }

            visited += 1;
            on_file(entry.path());
        }
    }

    // 最后一个文件之后的取消同样视为取消
    if token.is_cancelled() {
        return WalkOutcome::Cancelled;
    }

    WalkOutcome::Completed { visited, errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn sample_tree() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b/inner")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("b/inner/c.txt"), "c").unwrap();
        fs::write(dir.path().join("b/d.txt"), "d").unwrap();
        fs::write(dir.path().join(".hidden"), "h").unwrap();
        fs::write(dir.path().join("node_modules/pkg.js"), "p").unwrap();
        dir
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());

        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_scan_visits_every_file_in_order() {
        let dir = sample_tree();
        let roots = vec![dir.path().to_path_buf()];
        let mut seen = Vec::new();

        let outcome = scan_roots(&roots, &WalkOptions::default(), &CancelToken::new(), |p| {
            seen.push(p.strip_prefix(dir.path()).unwrap().to_path_buf())
        });

        assert_eq!(outcome, WalkOutcome::Completed { visited: 5, errors: 0 });
        assert_eq!(
            seen,
            vec![
                PathBuf::from(".hidden"),
                PathBuf::from("a.txt"),
                PathBuf::from("b/d.txt"),
                PathBuf::from("b/inner/c.txt"),
                PathBuf::from("node_modules/pkg.js"),
            ]
        );
    }

    #[test]
    fn test_hidden_and_excluded_options() {
        let dir = sample_tree();
        let roots = vec![dir.path().to_path_buf()];
        let options = WalkOptions {
            include_hidden: false,
            excluded_dirs: ["node_modules".to_string()].into_iter().collect(),
            ..WalkOptions::default()
        };

        let mut count = 0;
        let outcome = scan_roots(&roots, &options, &CancelToken::new(), |_| count += 1);

        assert_eq!(count, 3);
        assert_eq!(outcome, WalkOutcome::Completed { visited: 3, errors: 0 });
    }

    #[test]
    fn test_missing_root_is_counted_as_error() {
        let dir = sample_tree();
        let roots = vec![dir.path().join("does-not-exist"), dir.path().to_path_buf()];

        let outcome = scan_roots(&roots, &WalkOptions::default(), &CancelToken::new(), |_| {});

        assert_eq!(outcome, WalkOutcome::Completed { visited: 5, errors: 1 });
    }

    #[test]
    fn test_cancel_stops_scan() {
        let dir = sample_tree();
        let roots = vec![dir.path().to_path_buf()];
        let token = CancelToken::new();
        let mut visited = 0;

        let outcome = scan_roots(&roots, &WalkOptions::default(), &token, |_| {
            visited += 1;
            token.cancel();
        });

        assert_eq!(outcome, WalkOutcome::Cancelled);
        assert_eq!(visited, 1);
    }

    #[test]
    fn test_count_files() {
        let dir = sample_tree();
        let other = tempdir().unwrap();
        fs::write(other.path().join("x.bin"), "x").unwrap();

        let roots = vec![dir.path().to_path_buf(), other.path().to_path_buf()];
        let logger = Logger::disabled_arc();

        let total = count_files(&roots, &WalkOptions::default(), &CancelToken::new(), &logger);
        assert_eq!(total, Some(6));

        let token = CancelToken::new();
        token.cancel();
        assert_eq!(count_files(&roots, &WalkOptions::default(), &token, &logger), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_files_are_visited() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let elsewhere = tempdir().unwrap();
        fs::write(dir.path().join("report_real.txt"), "r").unwrap();
        fs::write(elsewhere.path().join("target.txt"), "t").unwrap();
        fs::create_dir(elsewhere.path().join("sub")).unwrap();
        fs::write(elsewhere.path().join("sub/inside.txt"), "i").unwrap();

        symlink(elsewhere.path().join("target.txt"), dir.path().join("report_link.txt")).unwrap();
        symlink(elsewhere.path().join("gone.txt"), dir.path().join("report_broken.txt")).unwrap();
        symlink(elsewhere.path().join("sub"), dir.path().join("report_dir")).unwrap();

        let roots = vec![dir.path().to_path_buf()];
        let mut seen = Vec::new();
        let outcome = scan_roots(&roots, &WalkOptions::default(), &CancelToken::new(), |p| {
            seen.push(p.file_name().unwrap().to_string_lossy().to_string())
        });

        assert_eq!(outcome, WalkOutcome::Completed { visited: 3, errors: 0 });
        assert_eq!(seen, vec!["report_broken.txt", "report_link.txt", "report_real.txt"]);

        let logger = Logger::disabled_arc();
        let total = count_files(&roots, &WalkOptions::default(), &CancelToken::new(), &logger);
        assert_eq!(total, Some(3));
    }

    #[test]
    fn test_no_roots() {
        let logger = Logger::disabled_arc();
        let token = CancelToken::new();

        assert_eq!(count_files(&[], &WalkOptions::default(), &token, &logger), Some(0));
        assert_eq!(
            scan_roots(&[], &WalkOptions::default(), &token, |_| {}),
            WalkOutcome::Completed { visited: 0, errors: 0 }
        );
    }
}
