//! 基于 JSON 文件的机器级存储（沙箱）。
//!
//! 用途：
//! - 端到端测试与非 Windows 环境下演练安装流程，不触碰真实注册表
//! - 通过环境变量 [`SANDBOX_ENV`] 指定沙箱目录后由 bootstrapper 自动选用
//!
//! 文件布局（与注册表中两个独立的键对应，各自单独写入）：
//! - `<sandbox>/environment.json`：系统 PATH 与变更通知次数，见 [`SandboxEnvironment`]
//! - `<sandbox>/uninstall.json`：“卸载”注册表项，键为产品 UUID

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::machine::{MachineStore, UninstallEntry};

/// 指定沙箱目录的环境变量名。
pub const SANDBOX_ENV: &str = "PYREVIT_SETUP_SANDBOX";

/// 对应 HKLM `Session Manager\Environment`。
pub const ENVIRONMENT_FILE: &str = "environment.json";

/// 对应 HKLM `CurrentVersion\Uninstall`。
pub const UNINSTALL_FILE: &str = "uninstall.json";

/// 沙箱中的系统环境变量。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SandboxEnvironment {
    #[serde(default)]
    /// 系统 PATH（对应 `Environment\Path`）。
    pub path: Option<String>,
    #[serde(default)]
    /// 环境变量变更通知次数。
    pub broadcasts: u64,
}

type UninstallEntries = BTreeMap<String, UninstallEntry>;

/// 以 JSON 文件模拟机器级注册表。
#[derive(Debug, Clone)]
pub struct FileMachineStore {
    dir: PathBuf,
}

impl FileMachineStore {
    /// 在沙箱目录下创建存储（文件在首次写入时生成）。
    pub fn new(sandbox_dir: &Path) -> Self {
        Self {
            dir: sandbox_dir.to_path_buf(),
        }
    }

    pub fn environment_file(&self) -> PathBuf {
        self.dir.join(ENVIRONMENT_FILE)
    }

    pub fn uninstall_file(&self) -> PathBuf {
        self.dir.join(UNINSTALL_FILE)
    }

    /// 读取环境变量部分；文件不存在时为空。
    pub fn environment(&self) -> Result<SandboxEnvironment> {
        load_json(&self.environment_file())
    }

    fn uninstall_entries(&self) -> Result<UninstallEntries> {
        load_json(&self.uninstall_file())
    }
}

fn load_json<T: DeserializeOwned + Default>(file: &Path) -> Result<T> {
    if !file.exists() {
        return Ok(T::default());
    }
    let bytes =
        std::fs::read(file).with_context(|| format!("读取沙箱注册表失败: {}", file.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("解析沙箱注册表 JSON 失败: {}", file.display()))
}

/// 读取、修改并原子替换一个沙箱文件。
fn update_json<T>(file: &Path, f: impl FnOnce(&mut T)) -> Result<()>
where
    T: Serialize + DeserializeOwned + Default,
{
    let mut value: T = load_json(file)?;
    f(&mut value);
    if let Some(parent) = file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("创建目录失败: {}", parent.display()))?;
    }
    let bytes = serde_json::to_vec_pretty(&value).context("序列化沙箱注册表失败")?;
    let tmp = file.with_extension("json.tmp");
    std::fs::write(&tmp, bytes).with_context(|| format!("写入失败: {}", tmp.display()))?;
    std::fs::rename(&tmp, file)
        .with_context(|| format!("替换沙箱注册表失败: {}", file.display()))?;
    Ok(())
}

impl MachineStore for FileMachineStore {
    fn read_path(&self) -> Result<Option<String>> {
        Ok(self.environment()?.path)
    }

    fn write_path(&self, value: &str) -> Result<()> {
        update_json(&self.environment_file(), |env: &mut SandboxEnvironment| {
            env.path = Some(value.to_string())
        })
    }

    fn read_uninstall_entry(&self, app_id: &str) -> Result<Option<UninstallEntry>> {
        Ok(self.uninstall_entries()?.remove(app_id))
    }

    fn write_uninstall_entry(&self, entry: &UninstallEntry) -> Result<()> {
        update_json(&self.uninstall_file(), |entries: &mut UninstallEntries| {
            entries.insert(entry.app_id.clone(), entry.clone());
        })
    }

    fn delete_uninstall_entry(&self, app_id: &str) -> Result<()> {
        if !self.uninstall_file().exists() {
            return Ok(());
        }
        update_json(&self.uninstall_file(), |entries: &mut UninstallEntries| {
            entries.remove(app_id);
        })
    }

    fn notify_environment_changed(&self) -> Result<()> {
        update_json(&self.environment_file(), |env: &mut SandboxEnvironment| {
            env.broadcasts += 1
        })
    }
}
