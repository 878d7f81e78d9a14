//! 安装目标解析：确定本次安装的根目录。
//!
//! 优先级：
//! 1) 命令行 `--dir`
//! 2) 同一产品 UUID 上次安装记录的 `InstallLocation`（清单 `use_previous_dir` 为真时）
//! 3) `{ProgramFiles}\<默认目录名>`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pyrevit_setup_core::machine::{MachineStore, UninstallEntry};
use pyrevit_setup_core::manifest::SetupManifest;
use pyrevit_setup_core::paths;

/// 安装根目录的来源。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSource {
    Operator,
    PreviousInstall,
    Default,
}

/// 解析结果。
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub root: PathBuf,
    pub source: TargetSource,
    /// 上次安装的注册表记录（首次安装为 `None`）。
    pub previous: Option<UninstallEntry>,
}

/// 解析安装根目录。
///
/// 参数：
/// - `manifest`：安装清单
/// - `store`：机器级存储（用于查找上次安装记录）
/// - `override_dir`：命令行指定的目录（相对路径按当前目录展开）
///
/// 异常处理：
/// - 读取上次安装记录失败返回错误
/// - 需要默认目录但无法确定 Program Files 时返回错误
pub fn resolve(
    manifest: &SetupManifest,
    store: &dyn MachineStore,
    override_dir: Option<&Path>,
) -> Result<ResolvedTarget> {
    let previous = store
        .read_uninstall_entry(&manifest.app.id)
        .context("读取上次安装记录失败")?;

    if let Some(dir) = override_dir {
        let root = if dir.is_relative() {
            std::env::current_dir()
                .context("获取当前目录失败")?
                .join(dir)
        } else {
            dir.to_path_buf()
        };
        return Ok(ResolvedTarget {
            root,
            source: TargetSource::Operator,
            previous,
        });
    }

    if manifest.target.use_previous_dir {
        if let Some(entry) = previous.as_ref().filter(|e| !e.install_location.is_empty()) {
            return Ok(ResolvedTarget {
                root: PathBuf::from(&entry.install_location),
                source: TargetSource::PreviousInstall,
                previous,
            });
        }
    }

    Ok(ResolvedTarget {
        root: paths::default_install_root(manifest.default_dir_name())?,
        source: TargetSource::Default,
        previous,
    })
}
