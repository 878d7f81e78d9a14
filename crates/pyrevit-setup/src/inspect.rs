//! 只读子命令：`detect` / `doctor` / `verify`。
//!
//! 这些命令不修改系统，输出写到 stdout，日志写到 stderr。

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use pyrevit_setup_core::environment::count_path_entries;
use pyrevit_setup_core::error::SetupError;
use pyrevit_setup_core::machine::MachineStore;
use pyrevit_setup_core::manifest::SetupManifest;
use pyrevit_setup_core::paths;
use pyrevit_setup_core::state::{file_digest, InstallState};
use pyrevit_setup_windows::{elevation, platform};
use serde::Serialize;
use tracing::warn;

use crate::{load_manifest, store, Cli};

/// `detect --json` 的输出结构。
#[derive(Debug, Serialize)]
struct DetectReport {
    installed: bool,
    app_id: String,
    version: Option<String>,
    install_location: Option<String>,
    /// 系统 PATH 中安装目录条目的数量（重复安装会大于 1）。
    path_entries: usize,
}

/// 输出安装状态。
///
/// 判断依据：
/// - 优先读取安装状态文件
/// - 不存在时回退到“卸载”注册表项
pub fn detect(cli: &Cli, json: bool) -> Result<()> {
    let manifest = load_manifest(&cli.manifest)?;
    let machine = store::machine_store()?;

    let state = InstallState::load(&paths::state_file(&manifest.app.id)?)?;
    let entry = machine.read_uninstall_entry(&manifest.app.id)?;
    let (version, location) = match (&state, &entry) {
        (Some(s), _) => (Some(s.version.clone()), Some(s.install_root.clone())),
        (None, Some(e)) => (
            Some(e.display_version.clone()),
            Some(e.install_location.clone()),
        ),
        (None, None) => (None, None),
    };
    let path_entries = match location.as_deref() {
        Some(root) => path_entry_count(&manifest, machine.as_ref(), Path::new(root))?,
        None => 0,
    };

    let report = DetectReport {
        installed: location.is_some(),
        app_id: manifest.app.id.clone(),
        version,
        install_location: location,
        path_entries,
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} ({}) = {}",
        manifest.app.name, report.app_id, report.installed
    );
    if let Some(v) = &report.version {
        println!("version = {v}");
    }
    if let Some(l) = &report.install_location {
        println!("install_location = {l}");
    }
    println!("path_entries = {}", report.path_entries);
    Ok(())
}

/// 环境自检（用于排障）。
///
/// 输出：
/// - 是否管理员运行
/// - 操作系统架构及是否满足清单要求
/// - 机器级存储（注册表或沙箱）是否可读
pub fn doctor(cli: &Cli) -> Result<()> {
    println!("admin = {}", elevation::is_running_as_admin()?);

    let arch = platform::os_architecture();
    println!("os_architecture = {arch}");

    let manifest = match load_manifest(&cli.manifest) {
        Ok(m) => Some(m),
        Err(e) => {
            println!("manifest = error: {e:#}");
            None
        }
    };
    if let Some(m) = &manifest {
        println!(
            "architecture_supported = {}",
            platform::is_supported(m.target.architecture, &arch)
        );
    }

    println!("sandbox = {}", store::is_sandboxed());
    match store::machine_store().and_then(|s| s.read_path()) {
        Ok(path) => println!(
            "machine_path_entries = {}",
            path.as_deref()
                .map(|p| p.split(';').filter(|s| !s.is_empty()).count())
                .unwrap_or(0)
        ),
        Err(e) => println!("machine_store = error: {e:#}"),
    }
    match paths::program_data_dir() {
        Ok(dir) => println!("state_dir = {}", dir.display()),
        Err(e) => println!("state_dir = error: {e:#}"),
    }
    Ok(())
}

/// 按安装状态中的 SHA-256 校验已部署文件。
///
/// 异常处理：
/// - 未安装：[`SetupError::NotInstalled`]
/// - 存在缺失或被修改的文件：返回错误（逐个输出差异）
pub fn verify(cli: &Cli) -> Result<()> {
    let manifest = load_manifest(&cli.manifest)?;
    let state = InstallState::load(&paths::state_file(&manifest.app.id)?)?
        .ok_or_else(|| SetupError::NotInstalled(manifest.app.name.clone()))?;
    let root = PathBuf::from(&state.install_root);

    let mut bad = 0usize;
    for file in &state.payload_files {
        let path = root.join(&file.path);
        if !path.is_file() {
            println!("missing = {}", file.path);
            bad += 1;
            continue;
        }
        match file_digest(&path) {
            Ok((sha256, size)) if sha256 == file.sha256 && size == file.size => {}
            Ok(_) => {
                println!("modified = {}", file.path);
                bad += 1;
            }
            Err(e) => {
                warn!("{e:#}");
                println!("unreadable = {}", file.path);
                bad += 1;
            }
        }
    }
    println!("verified = {}/{}", state.payload_files.len() - bad, state.payload_files.len());

    if bad > 0 {
        return Err(anyhow!("{bad} 个已部署文件与安装记录不一致"));
    }
    Ok(())
}

fn path_entry_count(
    manifest: &SetupManifest,
    machine: &dyn MachineStore,
    root: &Path,
) -> Result<usize> {
    let Some(entry) = manifest.environment.path_entry.as_deref() else {
        return Ok(0);
    };
    let entry = paths::resolve_path(root, entry)?;
    let current = machine.read_path()?.unwrap_or_default();
    Ok(count_path_entries(&current, &entry.to_string_lossy()))
}
