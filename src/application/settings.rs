use std::fs;
use std::env;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::application::config::exe_dir;
use crate::domain::FinderError;

/// 持久化的用户设置：搜索文件夹列表
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub search_folders: Vec<PathBuf>,
}

impl Settings {
    /// 加载设置，文件不存在时返回空设置
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("无法读取设置文件: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("无法解析设置文件: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("无法创建设置目录: {}", parent.display()))?;
            }
        }

        let content = serde_json::to_string_pretty(self).context("无法序列化设置")?;

        fs::write(path, content)
            .with_context(|| format!("无法写入设置文件: {}", path.display()))
    }

    /// 设置文件的默认路径（程序所在目录）
    pub fn default_settings_path() -> Result<PathBuf> {
        Ok(exe_dir()?.join("settings.json"))
    }
}

/// 把文件夹路径转换为绝对路径，并去掉 `.` 和 `..`
///
/// 只做字面处理，不解析符号链接。
pub fn normalize_folder(folder: &Path) -> Result<PathBuf> {
    let absolute = if folder.is_absolute() {
        folder.to_path_buf()
    } else {
        env::current_dir().context("无法获取当前目录")?.join(folder)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

/// 绑定到设置文件的搜索文件夹列表，每次修改后立即保存
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = Settings::load(&path)?;
        Ok(Self { path, settings })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn folders(&self) -> &[PathBuf] {
        &self.settings.search_folders
    }

    /// 添加搜索文件夹，已存在时不做任何修改并返回 `false`
    ///
    /// 保存的是绝对路径，相对路径按当前目录解析。
    pub fn add_folder(&mut self, folder: impl Into<PathBuf>) -> Result<bool> {
        let folder = folder.into();
        if !folder.is_dir() {
            return Err(FinderError::NotADirectory(folder).into());
        }
        let folder = normalize_folder(&folder)?;

        if self.settings.search_folders.contains(&folder) {
            return Ok(false);
        }

        self.settings.search_folders.push(folder);
        self.settings.save(&self.path)?;
        Ok(true)
    }

    /// 移除搜索文件夹，不存在时返回 `false`
    pub fn remove_folder(&mut self, folder: &Path) -> Result<bool> {
        let normalized = normalize_folder(folder)?;
        // 也接受与保存内容完全相同的写法，兼容手工编辑的设置文件
        let Some(index) = self
            .settings
            .search_folders
            .iter()
            .position(|f| *f == normalized || f == folder)
        else {
            return Ok(false);
        };

        self.settings.search_folders.remove(index);
        self.settings.save(&self.path)?;
        Ok(true)
    }

    /// 按列表中的位置移除搜索文件夹
    pub fn remove_at(&mut self, index: usize) -> Result<PathBuf> {
        let len = self.settings.search_folders.len();
        if index >= len {
            return Err(FinderError::NoSuchFolder { index, len }.into());
        }

        let removed = self.settings.search_folders.remove(index);
        self.settings.save(&self.path)?;
        Ok(removed)
    }
}
