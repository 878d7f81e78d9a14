//! 机器级存储选择：设置了沙箱目录时使用文件存储，否则使用 HKLM 注册表。

use std::path::Path;

use anyhow::Result;
use pyrevit_setup_core::machine::MachineStore;
use pyrevit_setup_core::sandbox::{FileMachineStore, SANDBOX_ENV};
use tracing::info;

/// 当前运行环境对应的机器级存储。
///
/// 异常处理：
/// - 非 Windows 平台且未设置 `PYREVIT_SETUP_SANDBOX` 时返回错误
pub fn machine_store() -> Result<Box<dyn MachineStore>> {
    if let Some(dir) = std::env::var_os(SANDBOX_ENV).filter(|v| !v.is_empty()) {
        info!("使用沙箱机器存储: {}", Path::new(&dir).display());
        return Ok(Box::new(FileMachineStore::new(Path::new(&dir))));
    }
    native_store()
}

/// 当前是否运行在沙箱模式。
pub fn is_sandboxed() -> bool {
    std::env::var_os(SANDBOX_ENV).is_some_and(|v| !v.is_empty())
}

#[cfg(windows)]
fn native_store() -> Result<Box<dyn MachineStore>> {
    Ok(Box::new(
        pyrevit_setup_windows::registry::RegistryMachineStore::new(),
    ))
}

#[cfg(not(windows))]
fn native_store() -> Result<Box<dyn MachineStore>> {
    Err(anyhow::anyhow!(
        "当前平台没有系统注册表，请设置 {SANDBOX_ENV} 指定沙箱目录"
    ))
}
