//! 安装/卸载错误分类。
//!
//! 除 [`SetupError::HookInvocationFailed`] 外都是致命错误，会终止流程并以非零退出码结束进程。

use std::path::PathBuf;

use thiserror::Error;

/// 安装/卸载错误。
#[derive(Debug, Error)]
pub enum SetupError {
    /// 未以管理员权限运行（发生在任何写入之前）。
    #[error("需要管理员权限，请以管理员方式运行")]
    PrivilegeDenied,
    /// 操作系统不是 64 位。
    #[error("仅支持 64 位系统（当前: {0}）")]
    UnsupportedArchitecture(String),
    /// 清单内容不合法。
    #[error("安装清单不合法: {0}")]
    InvalidManifest(String),
    /// payload 复制失败（已回滚本次新建的文件）。
    #[error("部署文件失败: {path}: {reason}")]
    PayloadCopyFailed { path: PathBuf, reason: String },
    /// 写入机器级 PATH 失败（文件已部署，不回滚）。
    #[error("写入系统 PATH 失败: {0}")]
    EnvPatchFailed(String),
    /// 未找到已安装记录。
    #[error("未检测到已安装的 {0}")]
    NotInstalled(String),
    /// 钩子执行失败。非致命：只用于日志，不会终止流程。
    #[error("钩子执行失败: {label}: {reason}")]
    HookInvocationFailed { label: String, reason: String },
}
