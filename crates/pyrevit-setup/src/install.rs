//! 安装流程。
//!
//! 阶段：`Pending → Elevated → PayloadCopied → EnvPatched → HooksRun → Complete`
//!
//! 失败处理：
//! - 权限不足/架构不符/清单不合法：在任何写入之前终止
//! - payload 复制或登记（卸载程序、卸载注册表项、安装状态）失败：回滚本次新建文件，
//!   恢复原有登记后终止，不修改 PATH、不运行钩子
//! - PATH 写入失败：终止，已部署文件保留（已登记卸载信息，可正常卸载）
//! - 钩子失败：只记录警告

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pyrevit_setup_core::environment::append_path_entry;
use pyrevit_setup_core::error::SetupError;
use pyrevit_setup_core::lifecycle::{InstallPhase, InstallProgress};
use pyrevit_setup_core::machine::{MachineStore, UninstallEntry};
use pyrevit_setup_core::manifest::{HookTrigger, SetupManifest};
use pyrevit_setup_core::paths;
use pyrevit_setup_core::state::{InstallState, PayloadFile};
use pyrevit_setup_windows::{platform, process};
use tracing::{info, warn};

use crate::target::{self, ResolvedTarget, TargetSource};
use crate::{base_dir, hooks, load_manifest, payload, require_privileges, store, Cli};

/// 卸载程序副本的文件名。
const UNINSTALLER_NAME: &str = "pyrevit-setup";

/// 执行安装流程。
///
/// 参数：
/// - `cli`：命令行参数（清单路径、silent 标志）
/// - `dir`：命令行指定的安装根目录（可选）
///
/// 异常处理：
/// - 致命错误以 [`SetupError`] 或带上下文的 `anyhow::Error` 返回，进程以非零退出码结束
pub fn install(cli: &Cli, dir: Option<&Path>) -> Result<()> {
    let mut progress = InstallProgress::new();

    let manifest = load_manifest(&cli.manifest)?;
    if let Err(e) = require_privileges(manifest.target.privileges) {
        progress.abort()?;
        return Err(e);
    }
    if let Err(e) = platform::ensure_supported(manifest.target.architecture) {
        progress.abort()?;
        return Err(e.into());
    }

    let machine = store::machine_store()?;
    let target = target::resolve(&manifest, machine.as_ref(), dir)?;
    let state_path = paths::state_file(&manifest.app.id)?;
    let root = target.root.clone();

    info!(
        "开始安装: {} {} ({})",
        manifest.app.name, manifest.app.version, manifest.app.publisher
    );
    if !manifest.app.copyright.is_empty() {
        info!("{}", manifest.app.copyright);
    }
    match (&target.previous, target.source) {
        (Some(prev), _) if prev.display_version == manifest.app.version => {
            info!("重新安装 {}，目录: {}", prev.display_version, root.display())
        }
        (Some(prev), _) => info!(
            "升级 {} -> {}，目录: {}",
            prev.display_version,
            manifest.app.version,
            root.display()
        ),
        (None, TargetSource::Operator) => info!("安装目录（命令行指定）: {}", root.display()),
        (None, _) => info!("安装目录: {}", root.display()),
    }
    progress.advance(InstallPhase::Elevated)?;

    warn_if_running(&manifest, &root);
    let deployed = match payload::deploy(&base_dir(cli), &root, &manifest.payload) {
        Ok(d) => d,
        Err(e) => {
            progress.abort()?;
            return Err(e.into());
        }
    };

    let staged = stage_uninstaller(cli, &root);
    let registration = Registration {
        manifest: &manifest,
        machine: machine.as_ref(),
        target: &target,
        state_path: &state_path,
    };
    let state = match registration.register(&staged.command, deployed.files.clone()) {
        Ok(state) => state,
        Err(e) => {
            warn!("登记安装信息失败，回滚本次部署: {e:#}");
            staged.discard();
            deployed.rollback();
            progress.abort()?;
            return Err(e);
        }
    };
    progress.advance(InstallPhase::PayloadCopied)?;

    if let Some(entry) = &state.path_entry {
        patch_machine_path(machine.as_ref(), entry)?;
    }
    progress.advance(InstallPhase::EnvPatched)?;

    hooks::run_all(&root, manifest.hooks_for(HookTrigger::PostInstall));
    progress.advance(InstallPhase::HooksRun)?;

    progress.advance(InstallPhase::Complete)?;
    info!("安装完成: {}", root.display());
    if !cli.silent {
        info!("提示：新打开的命令行窗口中即可使用 pyrevit 命令");
    }
    Ok(())
}

/// 部署完成后的登记步骤（卸载注册表项 + 安装状态）。
struct Registration<'a> {
    manifest: &'a SetupManifest,
    machine: &'a dyn MachineStore,
    target: &'a ResolvedTarget,
    state_path: &'a Path,
}

impl Registration<'_> {
    /// 先写卸载注册表项，再写安装状态；安装状态写入失败时恢复原注册表项。
    ///
    /// 安装状态是“已安装”的最终判据，只在其余登记都成功后写入。
    fn register(&self, uninstall_command: &str, files: Vec<PayloadFile>) -> Result<InstallState> {
        let root = &self.target.root;
        let mut state = InstallState::new(
            self.manifest.app.id.clone(),
            self.manifest.app.version.clone(),
            root.to_string_lossy().into_owned(),
        );
        state.payload_files = files;
        state.path_entry =
            path_entry(self.manifest, root)?.map(|p| p.to_string_lossy().into_owned());

        let display_icon = self
            .manifest
            .target
            .display_icon
            .as_deref()
            .map(|p| paths::resolve_path(root, p))
            .transpose()?
            .map(|p| p.to_string_lossy().into_owned());
        let entry = UninstallEntry::from_manifest(
            self.manifest,
            &state.install_root,
            uninstall_command,
            display_icon,
        );
        self.machine
            .write_uninstall_entry(&entry)
            .context("写入卸载注册表项失败")?;

        if let Err(e) = state.save(self.state_path) {
            self.restore_previous_entry();
            return Err(e);
        }
        Ok(state)
    }

    fn restore_previous_entry(&self) {
        let restored = match &self.target.previous {
            Some(prev) => self.machine.write_uninstall_entry(prev),
            None => self.machine.delete_uninstall_entry(&self.manifest.app.id),
        };
        if let Err(e) = restored {
            warn!("恢复卸载注册表项失败: {e:#}");
        }
    }
}

/// 清单中 PATH 条目对应的绝对目录。
fn path_entry(manifest: &SetupManifest, root: &Path) -> Result<Option<PathBuf>> {
    manifest
        .environment
        .path_entry
        .as_deref()
        .map(|e| paths::resolve_path(root, e))
        .transpose()
}

/// 在系统 PATH 末尾追加目录并广播变更。
///
/// 异常处理：
/// - 读取或写入失败返回 [`SetupError::EnvPatchFailed`]
/// - 广播失败只记录警告
fn patch_machine_path(machine: &dyn MachineStore, entry: &str) -> Result<()> {
    let current = machine
        .read_path()
        .map_err(|e| SetupError::EnvPatchFailed(format!("{e:#}")))?;
    let updated = append_path_entry(current.as_deref(), entry);
    machine
        .write_path(&updated)
        .map_err(|e| SetupError::EnvPatchFailed(format!("{e:#}")))?;
    info!("已追加到系统 PATH: {entry}");
    if let Err(e) = machine.notify_environment_changed() {
        warn!("环境变量变更通知失败: {e:#}");
    }
    Ok(())
}

/// 钩子引用的程序（去重、按路径排序）。
fn hook_programs(manifest: &SetupManifest) -> BTreeSet<&str> {
    manifest.hooks.iter().map(|h| h.program.as_str()).collect()
}

/// 部署前检测钩子程序是否正在运行（正在运行时文件可能无法覆盖）。
fn warn_if_running(manifest: &SetupManifest, root: &Path) {
    for program in hook_programs(manifest) {
        let Ok(exe) = paths::resolve_path(root, program) else {
            continue;
        };
        if matches!(process::is_process_running_by_exe(&exe), Ok(true)) {
            warn!("检测到正在运行: {}，文件可能被占用", exe.display());
        }
    }
}

/// 复制到安装目录中的卸载程序。
struct StagedUninstaller {
    /// 写入注册表的卸载命令行。
    command: String,
    /// 本次新建的 `{app}\uninstall\` 目录（原本已存在时为 `None`）。
    created_dir: Option<PathBuf>,
}

impl StagedUninstaller {
    /// 撤销本次新建的卸载程序目录。
    fn discard(self) {
        if let Some(dir) = self.created_dir {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!("删除卸载程序目录失败: {}: {e}", dir.display());
            }
        }
    }
}

/// 将当前程序与清单复制到 `{app}\uninstall\`。
///
/// 复制失败只记录警告，命令行仍指向该位置。
fn stage_uninstaller(cli: &Cli, root: &Path) -> StagedUninstaller {
    let dir = root.join(paths::UNINSTALL_SUBDIR);
    let exe_dst = dir.join(format!("{UNINSTALLER_NAME}{}", std::env::consts::EXE_SUFFIX));
    let manifest_dst = dir.join("setup-manifest.json");
    let created_dir = (!dir.exists()).then(|| dir.clone());

    let staged = paths::ensure_dir(&dir).and_then(|_| {
        let exe_src = std::env::current_exe().context("获取当前程序路径失败")?;
        copy_unless_same(&exe_src, &exe_dst)?;
        copy_unless_same(&cli.manifest, &manifest_dst)
    });
    if let Err(e) = staged {
        warn!("复制卸载程序失败（可使用安装介质卸载）: {e:#}");
    }

    StagedUninstaller {
        command: format!(
            "\"{}\" --manifest \"{}\" uninstall",
            exe_dst.display(),
            manifest_dst.display()
        ),
        created_dir,
    }
}

fn copy_unless_same(src: &Path, dst: &Path) -> Result<()> {
    if let (Ok(a), Ok(b)) = (src.canonicalize(), dst.canonicalize()) {
        if a == b {
            return Ok(());
        }
    }
    std::fs::copy(src, dst)
        .with_context(|| format!("复制文件失败: {} -> {}", src.display(), dst.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_programs_are_deduplicated_across_triggers() {
        let manifest: SetupManifest = serde_json::from_str(
            r#"{
              "app": { "id": "9557b432-cf79-4ece-91cf-b8f996c88b47", "name": "pyRevit CLI",
                       "version": "4.8.16.24121", "publisher": "pyRevitLabs" },
              "payload": [ { "source": "bin", "dest": "bin" } ],
              "hooks": [
                { "trigger": "post_install", "program": "bin/pyrevit.exe" },
                { "trigger": "post_install", "program": "bin/helper.exe" },
                { "trigger": "pre_uninstall", "program": "bin/pyrevit.exe" }
              ]
            }"#,
        )
        .unwrap();
        let programs: Vec<&str> = hook_programs(&manifest).into_iter().collect();
        assert_eq!(programs, vec!["bin/helper.exe", "bin/pyrevit.exe"]);
    }
}
