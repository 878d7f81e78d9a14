//! 基于 HKLM 注册表的机器级存储。
//!
//! 主要用途：
//! - 读写系统 PATH（`HKLM\SYSTEM\CurrentControlSet\Control\Session Manager\Environment\Path`）
//! - 写入/读取/删除“卸载”注册表项（`HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall\{id}_is1`）
//!
//! 权限要求：
//! - 写入 HKLM 需要管理员权限
//!
//! 注意：
//! - PATH 以 `REG_EXPAND_SZ` 原样读写，保证 `%SystemRoot%` 等引用继续展开
//!
//! 作者：pyRevit CLI 安装器项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::io;

use anyhow::{anyhow, Context, Result};
use pyrevit_setup_core::machine::{
    uninstall_subkey_name, MachineStore, UninstallEntry, ENVIRONMENT_KEY, UNINSTALL_KEY,
};
use winreg::enums::{RegType, HKEY_LOCAL_MACHINE, KEY_READ, KEY_WRITE};
use winreg::{RegKey, RegValue};

use crate::environment;

const PATH_VALUE: &str = "Path";

/// HKLM 注册表实现的 [`MachineStore`]。
#[derive(Debug, Default)]
pub struct RegistryMachineStore;

impl RegistryMachineStore {
    pub fn new() -> Self {
        Self
    }

    fn uninstall_key_path(app_id: &str) -> String {
        format!("{}\\{}", UNINSTALL_KEY, uninstall_subkey_name(app_id))
    }
}

impl MachineStore for RegistryMachineStore {
    fn read_path(&self) -> Result<Option<String>> {
        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let key = hklm
            .open_subkey_with_flags(ENVIRONMENT_KEY, KEY_READ)
            .context("打开系统环境变量注册表键失败")?;
        match key.get_raw_value(PATH_VALUE) {
            Ok(raw) => Ok(Some(decode_reg_string(&raw)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("读取系统 PATH 失败"),
        }
    }

    fn write_path(&self, value: &str) -> Result<()> {
        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let key = hklm
            .open_subkey_with_flags(ENVIRONMENT_KEY, KEY_READ | KEY_WRITE)
            .context("以写权限打开系统环境变量注册表键失败")?;
        let raw = RegValue {
            bytes: encode_reg_string(value),
            vtype: RegType::REG_EXPAND_SZ,
        };
        key.set_raw_value(PATH_VALUE, &raw)
            .context("写入系统 PATH 失败")?;
        Ok(())
    }

    fn read_uninstall_entry(&self, app_id: &str) -> Result<Option<UninstallEntry>> {
        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let path = Self::uninstall_key_path(app_id);
        let key = match hklm.open_subkey_with_flags(&path, KEY_READ) {
            Ok(k) => k,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("打开卸载注册表项失败: {path}")),
        };
        let required = |name: &str| -> Result<String> {
            key.get_value::<String, _>(name)
                .with_context(|| format!("读取卸载注册表值失败: {name}"))
        };
        let optional = |name: &str| key.get_value::<String, _>(name).ok();
        Ok(Some(UninstallEntry {
            app_id: app_id.to_string(),
            display_name: required("DisplayName")?,
            display_version: required("DisplayVersion")?,
            publisher: optional("Publisher").unwrap_or_default(),
            url_info_about: optional("URLInfoAbout"),
            help_link: optional("HelpLink"),
            url_update_info: optional("URLUpdateInfo"),
            install_location: required("InstallLocation")?,
            uninstall_string: optional("UninstallString").unwrap_or_default(),
            quiet_uninstall_string: optional("QuietUninstallString").unwrap_or_default(),
            display_icon: optional("DisplayIcon"),
        }))
    }

    fn write_uninstall_entry(&self, entry: &UninstallEntry) -> Result<()> {
        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let path = Self::uninstall_key_path(&entry.app_id);
        let (key, _disp) = hklm
            .create_subkey(&path)
            .with_context(|| format!("创建卸载注册表项失败: {path}"))?;

        let mut strings: Vec<(&str, &str)> = vec![
            ("DisplayName", entry.display_name.as_str()),
            ("DisplayVersion", entry.display_version.as_str()),
            ("Publisher", entry.publisher.as_str()),
            ("InstallLocation", entry.install_location.as_str()),
            ("UninstallString", entry.uninstall_string.as_str()),
            ("QuietUninstallString", entry.quiet_uninstall_string.as_str()),
        ];
        for (name, value) in [
            ("URLInfoAbout", &entry.url_info_about),
            ("HelpLink", &entry.help_link),
            ("URLUpdateInfo", &entry.url_update_info),
            ("DisplayIcon", &entry.display_icon),
        ] {
            if let Some(v) = value {
                strings.push((name, v.as_str()));
            }
        }
        for (name, value) in strings {
            key.set_value(name, &value)
                .with_context(|| format!("写入卸载注册表值失败: {name}"))?;
        }
        key.set_value("NoModify", &1u32)?;
        key.set_value("NoRepair", &1u32)?;
        Ok(())
    }

    fn delete_uninstall_entry(&self, app_id: &str) -> Result<()> {
        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let path = Self::uninstall_key_path(app_id);
        match hklm.delete_subkey_all(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("删除卸载注册表项失败: {path}")),
        }
    }

    fn notify_environment_changed(&self) -> Result<()> {
        environment::broadcast_environment_change()
    }
}

/// 将 REG_SZ/REG_EXPAND_SZ 原始字节（UTF-16LE，可能带结尾 NUL）解码为字符串。
fn decode_reg_string(raw: &RegValue) -> Result<String> {
    match raw.vtype {
        RegType::REG_SZ | RegType::REG_EXPAND_SZ => {}
        ref other => return Err(anyhow!("PATH 注册表值类型异常: {other:?}")),
    }
    let wide: Vec<u16> = raw
        .bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    let end = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    Ok(String::from_utf16_lossy(&wide[..end]))
}

fn encode_reg_string(value: &str) -> Vec<u8> {
    value
        .encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(|c| c.to_le_bytes())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reg_string_codec_preserves_expand_references() {
        let value = r"%SystemRoot%\system32;C:\Program Files\pyRevit CLI\bin";
        let raw = RegValue {
            bytes: encode_reg_string(value),
            vtype: RegType::REG_EXPAND_SZ,
        };
        assert_eq!(decode_reg_string(&raw).unwrap(), value);
    }

    #[test]
    fn decode_rejects_dword() {
        let raw = RegValue {
            bytes: vec![1, 0, 0, 0],
            vtype: RegType::REG_DWORD,
        };
        assert!(decode_reg_string(&raw).is_err());
    }
}
