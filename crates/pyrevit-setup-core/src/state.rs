//! 安装状态落盘模型（install-state-<id>.json）。
//!
//! 目的：
//! - 记录安装根目录与已部署文件摘要，用于卸载与 `verify` 校验
//! - 记录本次卸载事务中已执行的卸载钩子（按 `run_once_id`），中断后重试时跳过
//!
//! 作者：pyRevit CLI 安装器项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// 安装状态（序列化为 JSON 存储到 ProgramData）。
///
/// 字段说明：
/// - `state_id`：本次安装的状态 ID，同时作为卸载事务的标识
/// - `app_id` / `version`：与清单一致
/// - `install_root`：实际安装根目录
/// - `payload_files`：已部署文件（相对安装根目录）及其 SHA-256
/// - `path_entry`：追加到系统 PATH 的目录（卸载时不会移除，仅作记录）
/// - `completed_uninstall_hooks`：本次卸载事务中已执行的钩子 `run_once_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallState {
    pub state_id: Uuid,
    pub app_id: String,
    pub version: String,
    pub install_root: String,
    #[serde(with = "time::serde::rfc3339")]
    pub installed_at: OffsetDateTime,
    #[serde(default)]
    pub payload_files: Vec<PayloadFile>,
    #[serde(default)]
    pub path_entry: Option<String>,
    #[serde(default)]
    pub completed_uninstall_hooks: Vec<String>,
}

/// 已部署文件记录。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayloadFile {
    /// 相对安装根目录的路径（使用 `/` 分隔）。
    pub path: String,
    /// 文件大小（字节）。
    pub size: u64,
    /// 十六进制小写 SHA-256。
    pub sha256: String,
}

impl InstallState {
    /// 创建一份新的安装状态，`state_id` 为随机 UUID，`installed_at` 为当前 UTC 时间。
    pub fn new(app_id: String, version: String, install_root: String) -> Self {
        Self {
            state_id: Uuid::new_v4(),
            app_id,
            version,
            install_root,
            installed_at: OffsetDateTime::now_utc(),
            payload_files: Vec::new(),
            path_entry: None,
            completed_uninstall_hooks: Vec::new(),
        }
    }

    /// 读取状态文件；文件不存在时返回 `Ok(None)`。
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes =
            std::fs::read(path).with_context(|| format!("读取状态文件失败: {}", path.display()))?;
        let state = serde_json::from_slice(&bytes)
            .with_context(|| format!("解析状态文件失败: {}", path.display()))?;
        Ok(Some(state))
    }

    /// 写入状态文件（先写临时文件再替换，避免中断时留下半截 JSON）。
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("创建目录失败: {}", parent.display()))?;
        }
        let bytes = serde_json::to_vec_pretty(self).context("序列化安装状态失败")?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).with_context(|| format!("写入失败: {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("写入状态文件失败: {}", path.display()))?;
        Ok(())
    }

    /// 指定卸载钩子是否已在本次卸载事务中执行过。
    pub fn uninstall_hook_done(&self, run_once_id: &str) -> bool {
        self.completed_uninstall_hooks.iter().any(|id| id == run_once_id)
    }

    /// 记录卸载钩子已执行（重复记录无副作用）。
    pub fn mark_uninstall_hook_done(&mut self, run_once_id: &str) {
        if !self.uninstall_hook_done(run_once_id) {
            self.completed_uninstall_hooks.push(run_once_id.to_string());
        }
    }
}

/// 计算文件的 SHA-256（十六进制小写）与大小。
pub fn file_digest(path: &Path) -> Result<(String, u64)> {
    let mut file =
        std::fs::File::open(path).with_context(|| format!("打开文件失败: {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("读取文件失败: {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), size))
}
