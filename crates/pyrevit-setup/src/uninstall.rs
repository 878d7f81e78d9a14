//! 卸载流程。
//!
//! 阶段：`Pending → HooksRun → PayloadRemoved → Complete`
//!
//! 约定：
//! - 带 `run_once_id` 的卸载前钩子在一次卸载事务内最多执行一次；
//!   每执行完一个就写回安装状态，删除文件失败后重新卸载不会再次执行
//! - 系统 PATH 中安装时追加的目录保持不变
//! - 删除 payload 失败为致命错误，安装状态与注册表项保留，便于重试
//! - 卸载程序目录删不掉（例如正从其中运行）时，登记为重启后删除

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pyrevit_setup_core::error::SetupError;
use pyrevit_setup_core::lifecycle::{UninstallPhase, UninstallProgress};
use pyrevit_setup_core::manifest::{HookTrigger, SetupManifest};
use pyrevit_setup_core::paths;
use pyrevit_setup_core::state::InstallState;
use pyrevit_setup_windows::cleanup;
use tracing::{debug, info, warn};

use crate::hooks::HookRunner;
use crate::{load_manifest, require_privileges, store, Cli};

/// 执行卸载流程。
///
/// 异常处理：
/// - 非管理员：[`SetupError::PrivilegeDenied`]
/// - 既没有安装状态也没有注册表项：[`SetupError::NotInstalled`]
/// - 删除已部署文件失败：[`SetupError::PayloadCopyFailed`]
pub fn uninstall(cli: &Cli) -> Result<()> {
    let mut progress = UninstallProgress::new();

    let manifest = load_manifest(&cli.manifest)?;
    require_privileges(manifest.target.privileges)?;
    let machine = store::machine_store()?;
    let state_path = paths::state_file(&manifest.app.id)?;

    let mut state = match InstallState::load(&state_path)? {
        Some(state) => state,
        None => {
            let entry = machine
                .read_uninstall_entry(&manifest.app.id)?
                .ok_or_else(|| SetupError::NotInstalled(manifest.app.name.clone()))?;
            warn!("未找到安装状态文件，按注册表记录卸载: {}", entry.install_location);
            let state = InstallState::new(
                manifest.app.id.clone(),
                entry.display_version,
                entry.install_location,
            );
            state.save(&state_path)?;
            state
        }
    };
    let root = PathBuf::from(&state.install_root);
    info!(
        "开始卸载: {} {}，目录: {}",
        manifest.app.name,
        state.version,
        root.display()
    );

    run_uninstall_hooks(&manifest, &root, &mut state, &state_path)?;
    progress.advance(UninstallPhase::HooksRun)?;

    remove_payload(&manifest, &root)?;
    progress.advance(UninstallPhase::PayloadRemoved)?;

    machine
        .delete_uninstall_entry(&manifest.app.id)
        .context("删除卸载注册表项失败")?;
    if let Err(e) = std::fs::remove_file(&state_path) {
        warn!("删除安装状态文件失败: {}: {e}", state_path.display());
    }
    if let Some(entry) = &state.path_entry {
        info!("系统 PATH 保持不变（仍包含 {entry}）");
    }
    progress.advance(UninstallPhase::Complete)?;
    info!("卸载完成");
    Ok(())
}

/// 依次执行卸载前钩子，已在本事务中执行过的跳过。
///
/// 钩子本身的失败只记录警告；写回安装状态失败返回错误。
fn run_uninstall_hooks(
    manifest: &SetupManifest,
    root: &Path,
    state: &mut InstallState,
    state_path: &Path,
) -> Result<()> {
    let runner = match HookRunner::new() {
        Ok(r) => Some(r),
        Err(e) => {
            warn!("跳过卸载前钩子: {e:#}");
            None
        }
    };

    for hook in manifest.hooks_for(HookTrigger::PreUninstall) {
        if let Some(id) = hook.run_once_id.as_deref() {
            if state.uninstall_hook_done(id) {
                info!("钩子已执行过，跳过: {id}");
                continue;
            }
        }
        if let Some(runner) = &runner {
            runner.run(root, hook);
        }
        if let Some(id) = hook.run_once_id.as_deref() {
            state.mark_uninstall_hook_done(id);
            state.save(state_path)?;
        }
    }
    Ok(())
}

/// 删除清单 payload 规则对应的目标，以及卸载程序目录；安装根目录为空时一并删除。
fn remove_payload(manifest: &SetupManifest, root: &Path) -> Result<(), SetupError> {
    for rule in &manifest.payload {
        let dst = paths::resolve_path(root, &rule.dest).map_err(|e| removal_failed(root, e))?;
        if !dst.starts_with(root) {
            warn!("目标不在安装目录内，跳过删除: {}", dst.display());
            continue;
        }
        remove_entry(&dst)?;
    }

    let uninstall_dir = root.join(paths::UNINSTALL_SUBDIR);
    if uninstall_dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(&uninstall_dir) {
            debug!("删除卸载程序目录失败: {e}");
            defer_removal(&uninstall_dir, root);
            return Ok(());
        }
    }
    match std::fs::remove_dir(root) {
        Ok(()) => info!("已删除安装目录: {}", root.display()),
        Err(e) => debug!("保留安装目录 {}: {e}", root.display()),
    }
    Ok(())
}

/// 把残留的卸载程序目录（以及随后变空的安装目录）登记为重启后删除。
fn defer_removal(uninstall_dir: &Path, root: &Path) {
    match cleanup::schedule_delete_on_reboot(uninstall_dir) {
        Ok(n) => info!("{n} 个条目将在重启后删除: {}", uninstall_dir.display()),
        Err(e) => {
            warn!("删除卸载程序目录失败（可手动删除）: {e:#}");
            return;
        }
    }
    let only_uninstall_left = std::fs::read_dir(root)
        .map(|mut entries| {
            entries.all(|e| e.map(|e| e.path() == uninstall_dir).unwrap_or(false))
        })
        .unwrap_or(false);
    if only_uninstall_left {
        if let Err(e) = cleanup::schedule_entry_on_reboot(root) {
            debug!("保留安装目录 {}: {e:#}", root.display());
        }
    }
}

fn remove_entry(path: &Path) -> Result<(), SetupError> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(removal_failed(path, e)),
    };
    let result = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    result.map_err(|e| removal_failed(path, e))?;
    info!("已删除: {}", path.display());
    Ok(())
}

fn removal_failed(path: &Path, err: impl std::fmt::Display) -> SetupError {
    SetupError::PayloadCopyFailed {
        path: path.to_path_buf(),
        reason: format!("删除失败: {err}"),
    }
}
