//! 机器级存储抽象：系统 PATH 与“卸载”注册表项。
//!
//! 实现：
//! - Windows：`pyrevit_setup_windows::registry::RegistryMachineStore`（HKLM）
//! - 沙箱：[`crate::sandbox::FileMachineStore`]（JSON 文件，用于测试/演练）
//!
//! 作者：pyRevit CLI 安装器项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::manifest::SetupManifest;

/// 系统环境变量所在注册表键（HKLM 下）。
pub const ENVIRONMENT_KEY: &str = r"SYSTEM\CurrentControlSet\Control\Session Manager\Environment";

/// 已安装程序列表所在注册表键（HKLM 下）。
pub const UNINSTALL_KEY: &str = r"SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall";

/// “卸载”注册表项内容（控制面板“程序和功能”展示，并用于升级时定位上次安装目录）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UninstallEntry {
    pub app_id: String,
    pub display_name: String,
    pub display_version: String,
    pub publisher: String,
    #[serde(default)]
    pub url_info_about: Option<String>,
    #[serde(default)]
    pub help_link: Option<String>,
    #[serde(default)]
    pub url_update_info: Option<String>,
    pub install_location: String,
    pub uninstall_string: String,
    pub quiet_uninstall_string: String,
    #[serde(default)]
    pub display_icon: Option<String>,
}

impl UninstallEntry {
    /// 根据清单与安装结果生成注册表项内容。
    ///
    /// 参数：
    /// - `manifest`：安装清单（产品标识）
    /// - `install_location`：实际安装根目录
    /// - `uninstall_command`：不含 `--silent` 的卸载命令行
    /// - `display_icon`：图标路径（可选）
    pub fn from_manifest(
        manifest: &SetupManifest,
        install_location: &str,
        uninstall_command: &str,
        display_icon: Option<String>,
    ) -> Self {
        let app = &manifest.app;
        Self {
            app_id: app.id.clone(),
            display_name: format!("{} {}", app.name, app.version),
            display_version: app.version.clone(),
            publisher: app.publisher.clone(),
            url_info_about: app.urls.publisher.clone(),
            help_link: app.urls.support.clone(),
            url_update_info: app.urls.updates.clone(),
            install_location: install_location.to_string(),
            uninstall_string: uninstall_command.to_string(),
            quiet_uninstall_string: quiet_variant(uninstall_command),
            display_icon,
        }
    }
}

/// 注册表子键名：`{<uuid>}_is1`。
pub fn uninstall_subkey_name(app_id: &str) -> String {
    format!("{{{app_id}}}_is1")
}

fn quiet_variant(command: &str) -> String {
    match command.rfind(" uninstall") {
        Some(idx) => format!("{} --silent{}", &command[..idx], &command[idx..]),
        None => command.to_string(),
    }
}

/// 机器级存储。
///
/// 说明：
/// - PATH 读写针对系统级（非用户级）环境变量
/// - 写入失败应返回错误，由上层决定是否致命
pub trait MachineStore {
    /// 读取系统 PATH 原值（值不存在时返回 `None`）。
    fn read_path(&self) -> Result<Option<String>>;

    /// 覆盖写入系统 PATH。
    fn write_path(&self, value: &str) -> Result<()>;

    /// 读取指定产品的“卸载”注册表项。
    fn read_uninstall_entry(&self, app_id: &str) -> Result<Option<UninstallEntry>>;

    /// 写入（或覆盖）“卸载”注册表项。
    fn write_uninstall_entry(&self, entry: &UninstallEntry) -> Result<()>;

    /// 删除“卸载”注册表项（不存在时视为成功）。
    fn delete_uninstall_entry(&self, app_id: &str) -> Result<()>;

    /// 通知系统环境变量已变化（默认无操作）。
    fn notify_environment_changed(&self) -> Result<()> {
        Ok(())
    }
}
