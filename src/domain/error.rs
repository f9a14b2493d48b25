use std::path::PathBuf;

use thiserror::Error;

/// 查找过程中的领域错误
#[derive(Debug, Error)]
pub enum FinderError {
    /// 查询内容为空
    #[error("搜索内容不能为空")]
    EmptyQuery,

    /// 结果索引超出范围
    #[error("没有编号为 {index} 的结果 (共 {len} 个)")]
    NoSuchResult { index: usize, len: usize },

    /// 文件夹索引超出范围
    #[error("没有编号为 {index} 的搜索文件夹 (共 {len} 个)")]
    NoSuchFolder { index: usize, len: usize },

    /// 路径不是可访问的目录
    #[error("不是有效的目录: {}", .0.display())]
    NotADirectory(PathBuf),

    /// 后台搜索线程已退出
    #[error("后台搜索线程已停止")]
    WorkerGone,
}
