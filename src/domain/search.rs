use std::path::{Path, PathBuf};

use crate::domain::error::FinderError;
use crate::domain::file_walker::{scan_roots, CancelToken, WalkOptions};

/// 文件名查询（不区分大小写的子串匹配）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameQuery {
    /// 用户输入（已去除首尾空白）
    text: String,
    /// 小写化后的匹配内容
    needle: String,
}

impl NameQuery {
    /// 从用户输入创建查询，空白输入会被拒绝
    pub fn new(input: &str) -> Result<Self, FinderError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(FinderError::EmptyQuery);
        }

        Ok(Self {
            text: text.to_string(),
            needle: text.to_lowercase(),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// 检查文件名是否包含查询内容
    pub fn matches(&self, path: &Path) -> bool {
        match path.file_name() {
            Some(name) => name.to_string_lossy().to_lowercase().contains(&self.needle),
            None => false,
        }
    }
}

/// 在所有搜索文件夹中查找文件名匹配的文件
///
/// 同步执行，不报告进度，也无法取消。后台搜索见 `application::worker`。
pub fn search_files(query: &NameQuery, roots: &[PathBuf], options: &WalkOptions) -> Vec<PathBuf> {
    let mut matches = Vec::new();
    let token = CancelToken::new();

    // 未取消的遍历总会完成
    let _ = scan_roots(roots, options, &token, |path| {
        if query.matches(path) {
            matches.push(path.to_path_buf());
        }
    });

    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_blank_query_rejected() {
        assert!(matches!(NameQuery::new(""), Err(FinderError::EmptyQuery)));
        assert!(matches!(NameQuery::new("   \t"), Err(FinderError::EmptyQuery)));
    }

    #[test]
    fn test_query_is_trimmed() {
        let query = NameQuery::new("  Report ").unwrap();
        assert_eq!(query.text(), "Report");
    }

    #[test]
    fn test_case_insensitive_match() {
        let query = NameQuery::new("REPORT").unwrap();
        assert!(query.matches(Path::new("/data/Annual_report_2023.PDF")));
        assert!(query.matches(Path::new("report")));
        assert!(!query.matches(Path::new("/data/summary.txt")));
    }

    #[test]
    fn test_only_base_name_is_matched() {
        let query = NameQuery::new("report").unwrap();
        assert!(!query.matches(Path::new("/reports/summary.txt")));
        assert!(!query.matches(Path::new("/")));
    }

    #[test]
    fn test_search_files_across_roots() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();

        fs::create_dir_all(first.path().join("nested/deeper")).unwrap();
        fs::write(first.path().join("Budget.xlsx"), "").unwrap();
        fs::write(first.path().join("nested/deeper/old_budget.csv"), "").unwrap();
        fs::write(first.path().join("nested/notes.txt"), "").unwrap();
        fs::write(second.path().join("BUDGET-final.doc"), "").unwrap();
        fs::create_dir_all(second.path().join("budget_dir")).unwrap();

        let query = NameQuery::new("budget").unwrap();
        let roots = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let results = search_files(&query, &roots, &WalkOptions::default());

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|p| query.matches(p)));
        assert!(results.contains(&first.path().join("nested/deeper/old_budget.csv")));
        // 目录本身不算匹配
        assert!(!results.contains(&second.path().join("budget_dir")));
        // 按文件夹顺序返回
        assert!(results[2].starts_with(second.path()));
    }
}
