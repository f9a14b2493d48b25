use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::WalkOptions;

/// 应用程序配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 搜索相关配置
    pub search: SearchConfig,
    /// 性能相关配置
    pub performance: PerformanceConfig,
    /// 排除规则配置
    pub exclude: ExcludeConfig,
    /// 显示相关配置
    pub display: DisplayConfig,
}

/// 搜索配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// 是否包含隐藏文件
    pub include_hidden: bool,
    /// 是否跟随符号链接
    pub follow_links: bool,
    /// 是否遵循 .gitignore 规则
    pub respect_gitignore: bool,
    /// 搜索前先统计文件总数，以便显示百分比进度
    pub precount: bool,
}

/// 性能配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// 是否在CPU负载过高时限流
    pub throttle: bool,
    /// CPU使用率阈值百分比
    pub cpu_threshold: f32,
    /// 高CPU负载时的搜索延迟毫秒数
    pub search_delay_ms: u64,
    /// 每扫描多少个文件报告一次进度
    pub progress_interval: u64,
}

/// 排除规则配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludeConfig {
    /// 跳过的目录名
    pub dirs: Vec<String>,
}

/// 显示配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// 是否显示文件大小
    pub show_sizes: bool,
    /// 最多显示的结果数 (0 表示全部显示)
    pub max_results_shown: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search: SearchConfig {
                include_hidden: true,
                follow_links: false,
                respect_gitignore: false,
                precount: true,
            },
            performance: PerformanceConfig {
                throttle: false,
                cpu_threshold: 80.0,
                search_delay_ms: 100,
                progress_interval: 200,
            },
            exclude: ExcludeConfig { dirs: vec![] },
            display: DisplayConfig {
                show_sizes: true,
                max_results_shown: 0,
            },
        }
    }
}

impl Config {
    /// 从配置文件加载配置，如果文件不存在则创建默认配置文件
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            Self::load_from_file(config_path)
        } else {
            let config = Self::default();
            config.save_to_file(config_path)?;
            println!("已创建默认配置文件: {}", config_path.display());
            Ok(config)
        }
    }

    /// 从文件加载配置
    pub fn load_from_file(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("无法读取配置文件: {}", config_path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("无法解析配置文件: {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("无法创建配置目录: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("无法序列化配置")?;

        fs::write(config_path, content)
            .with_context(|| format!("无法写入配置文件: {}", config_path.display()))?;

        Ok(())
    }

    /// 获取配置文件的默认路径（程序所在目录）
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(exe_dir()?.join("config.toml"))
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.performance.cpu_threshold < 10.0 || self.performance.cpu_threshold > 100.0 {
            anyhow::bail!("cpu_threshold 必须在 10-100 之间");
        }

        if self.performance.search_delay_ms > 10000 {
            anyhow::bail!("search_delay_ms 不能超过 10000");
        }

        if self.performance.progress_interval == 0 {
            anyhow::bail!("progress_interval 必须大于 0");
        }

        if self.exclude.dirs.iter().any(|d| d.trim().is_empty()) {
            anyhow::bail!("exclude.dirs 不能包含空目录名");
        }

        Ok(())
    }

    /// 由配置生成遍历选项
    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            include_hidden: self.search.include_hidden,
            follow_links: self.search.follow_links,
            respect_gitignore: self.search.respect_gitignore,
            excluded_dirs: self.exclude.dirs.iter().cloned().collect(),
        }
    }
}

/// 程序所在目录
pub(crate) fn exe_dir() -> Result<PathBuf> {
    let exe_path = std::env::current_exe().context("无法获取程序路径")?;

    let dir = exe_path.parent().context("无法获取程序目录")?;

    Ok(dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.search.include_hidden);
        assert!(!config.search.respect_gitignore);
        assert!(config.search.precount);
        assert_eq!(config.performance.cpu_threshold, 80.0);
        assert_eq!(config.performance.progress_interval, 200);
        assert!(config.exclude.dirs.is_empty());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.performance.search_delay_ms, deserialized.performance.search_delay_ms);
        assert_eq!(config.display.max_results_shown, deserialized.display.max_results_shown);
    }

    #[test]
    fn test_load_or_create() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let created = Config::load_or_create(&config_path).unwrap();
        assert!(config_path.exists());

        let loaded = Config::load_or_create(&config_path).unwrap();
        assert_eq!(created.search.precount, loaded.search.precount);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.performance.progress_interval = 0;
        config.save_to_file(&config_path).unwrap();

        assert!(Config::load_from_file(&config_path).is_err());

        fs::write(&config_path, "not = [valid").unwrap();
        assert!(Config::load_from_file(&config_path).is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.performance.cpu_threshold = 150.0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.performance.search_delay_ms = 20000;
        assert!(config.validate().is_err());

        config = Config::default();
        config.exclude.dirs.push("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_walk_options() {
        let mut config = Config::default();
        config.search.include_hidden = false;
        config.exclude.dirs = vec!["target".to_string()];

        let options = config.walk_options();
        assert!(!options.include_hidden);
        assert!(options.excluded_dirs.contains("target"));
    }
}
