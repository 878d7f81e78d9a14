//! 生命周期钩子执行（尽力而为）。
//!
//! 约定：
//! - 钩子按清单顺序逐个同步执行，每个钩子有最长等待时间，超时即结束子进程
//! - 启动失败、非零退出码、超时都只记录警告，不影响安装/卸载结果
//! - 工作目录为可执行文件所在目录；子进程的标准输入输出不与安装器相连
//! - `run_as: original_user`（默认）：安装器已提权时改用桌面用户令牌启动，
//!   拿不到令牌则记录警告并以当前身份运行；`run_as: elevated` 始终以当前身份运行
//!
//! 作者：pyRevit CLI 安装器项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use pyrevit_setup_core::error::SetupError;
use pyrevit_setup_core::manifest::{LifecycleHook, RunAs};
use pyrevit_setup_core::paths;
use pyrevit_setup_windows::process;
use tokio::runtime::Runtime;
use tracing::{info, warn};

/// 单个钩子的执行结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// 正常退出（退出码 0）。
    Succeeded,
    /// 非零退出码（无退出码时为 `None`，例如被信号结束）。
    ExitedWithError(Option<i32>),
    /// 可执行文件不存在。
    Missing,
    /// 启动或等待失败。
    Failed(String),
    /// 超过最长等待时间，已结束子进程。
    TimedOut,
}

/// 钩子执行器（内部持有单线程 tokio 运行时，用于有界等待）。
pub struct HookRunner {
    runtime: Runtime,
}

impl HookRunner {
    /// 创建执行器。
    ///
    /// 异常处理：
    /// - 运行时创建失败返回错误；调用方应跳过钩子而不是终止流程
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("创建钩子运行时失败")?;
        Ok(Self { runtime })
    }

    /// 执行一个钩子。
    ///
    /// 参数：
    /// - `app_root`：安装根目录（解析钩子 `program`）
    /// - `hook`：钩子定义
    ///
    /// 返回值：
    /// - 执行结果；任何失败都以 [`HookOutcome`] 表达，不返回错误
    pub fn run(&self, app_root: &Path, hook: &LifecycleHook) -> HookOutcome {
        let label = if hook.description.is_empty() {
            format!("{} {}", hook.program, hook.args.join(" "))
        } else {
            hook.description.clone()
        };
        info!("{label}");

        let outcome = self.execute(app_root, hook);
        let reason = match &outcome {
            HookOutcome::Succeeded => None,
            HookOutcome::ExitedWithError(code) => Some(format!("退出码 {code:?}")),
            HookOutcome::Missing => Some(format!("程序不存在: {}", hook.program)),
            HookOutcome::Failed(reason) => Some(reason.clone()),
            HookOutcome::TimedOut => {
                Some(format!("超过 {} 秒未结束，已终止", hook.timeout_secs))
            }
        };
        match reason {
            None => info!("钩子完成: {label}"),
            Some(reason) => {
                let err = SetupError::HookInvocationFailed { label, reason };
                warn!("{err}（已忽略）");
            }
        }
        outcome
    }

    fn execute(&self, app_root: &Path, hook: &LifecycleHook) -> HookOutcome {
        let exe = match paths::resolve_path(app_root, &hook.program) {
            Ok(p) => p,
            Err(e) => return HookOutcome::Failed(format!("{e:#}")),
        };
        if !exe.is_file() {
            return HookOutcome::Missing;
        }

        if hook.run_as == RunAs::OriginalUser {
            if let Some(outcome) = run_deelevated(&exe, hook) {
                return outcome;
            }
        }

        // 不接管输出：钩子留在后台的子进程会一直持有管道
        let mut cmd = tokio::process::Command::from(process::command(&exe, hook.hidden));
        cmd.args(&hook.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = exe.parent() {
            cmd.current_dir(dir);
        }
        let limit = Duration::from_secs(hook.timeout_secs);

        self.runtime.block_on(async move {
            let mut child = match cmd.spawn() {
                Ok(c) => c,
                Err(e) => return HookOutcome::Failed(format!("启动失败: {e}")),
            };
            match tokio::time::timeout(limit, child.wait()).await {
                Ok(Ok(status)) if status.success() => HookOutcome::Succeeded,
                Ok(Ok(status)) => HookOutcome::ExitedWithError(status.code()),
                Ok(Err(e)) => HookOutcome::Failed(format!("等待进程失败: {e}")),
                Err(_) => {
                    let _ = child.kill().await;
                    HookOutcome::TimedOut
                }
            }
        })
    }
}

/// 安装器已提权时，以桌面用户身份运行钩子。
///
/// 返回 `None` 表示应改用当前身份运行（未提权，或取不到桌面用户令牌）。
#[cfg(windows)]
fn run_deelevated(exe: &Path, hook: &LifecycleHook) -> Option<HookOutcome> {
    use pyrevit_setup_windows::elevation;
    use pyrevit_setup_windows::shell_user::{run_as_shell_user, ShellUserExit};

    if !matches!(elevation::is_running_as_admin(), Ok(true)) {
        return None;
    }
    let limit = Duration::from_secs(hook.timeout_secs);
    match run_as_shell_user(exe, &hook.args, exe.parent(), hook.hidden, limit) {
        Ok(ShellUserExit::Exited(0)) => Some(HookOutcome::Succeeded),
        Ok(ShellUserExit::Exited(code)) => Some(HookOutcome::ExitedWithError(Some(code as i32))),
        Ok(ShellUserExit::TimedOut) => Some(HookOutcome::TimedOut),
        Ok(ShellUserExit::Lost) => Some(HookOutcome::Failed("等待进程失败".to_string())),
        Err(e) => {
            warn!("无法以桌面用户身份运行，改用当前身份: {e:#}");
            None
        }
    }
}

#[cfg(not(windows))]
fn run_deelevated(_exe: &Path, _hook: &LifecycleHook) -> Option<HookOutcome> {
    None
}

/// 依次执行一组钩子；执行器创建失败时全部跳过。
pub fn run_all<'a>(app_root: &Path, hooks: impl IntoIterator<Item = &'a LifecycleHook>) {
    let runner = match HookRunner::new() {
        Ok(r) => r,
        Err(e) => {
            warn!("跳过钩子: {e:#}");
            return;
        }
    };
    for hook in hooks {
        runner.run(app_root, hook);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrevit_setup_core::manifest::HookTrigger;
    use std::time::Instant;
    use std::path::PathBuf;
    use uuid::Uuid;

    struct CleanupDir(PathBuf);

    impl Drop for CleanupDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn hook(program: &str, args: &[&str], timeout_secs: u64) -> LifecycleHook {
        LifecycleHook {
            run_once_id: None,
            trigger: HookTrigger::PostInstall,
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            description: String::new(),
            hidden: true,
            run_as: RunAs::OriginalUser,
            timeout_secs,
        }
    }

    #[test]
    fn missing_program_is_reported_not_raised() {
        let runner = HookRunner::new().unwrap();
        let root = std::env::temp_dir().join(format!("pyrevit-setup-hooks-{}", Uuid::new_v4()));
        let out = runner.run(&root, &hook("bin/pyrevit.exe", &["detach", "--all"], 5));
        assert_eq!(out, HookOutcome::Missing);
    }

    #[cfg(unix)]
    fn script(root: &Path, name: &str, body: &str) {
        use std::os::unix::fs::PermissionsExt;

        let path = root.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_and_timeout_are_outcomes() {
        let root = std::env::temp_dir().join(format!("pyrevit-setup-hooks-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&root).unwrap();
        let _g = CleanupDir(root.clone());
        script(&root, "ok.sh", "exit 0");
        script(&root, "fail.sh", "exit 3");
        script(&root, "slow.sh", "sleep 30");

        let runner = HookRunner::new().unwrap();
        assert_eq!(runner.run(&root, &hook("ok.sh", &[], 10)), HookOutcome::Succeeded);
        assert_eq!(
            runner.run(&root, &hook("fail.sh", &[], 10)),
            HookOutcome::ExitedWithError(Some(3))
        );
        assert_eq!(runner.run(&root, &hook("slow.sh", &[], 1)), HookOutcome::TimedOut);
    }

    #[cfg(unix)]
    #[test]
    fn background_child_does_not_hold_the_hook_open() {
        let root = std::env::temp_dir().join(format!("pyrevit-setup-hooks-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&root).unwrap();
        let _g = CleanupDir(root.clone());
        script(&root, "spawn.sh", "echo started\nsleep 20 &\nexit 0");

        let runner = HookRunner::new().unwrap();
        let started = Instant::now();
        let out = runner.run(&root, &hook("spawn.sh", &[], 5));
        assert_eq!(out, HookOutcome::Succeeded);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn elevated_hooks_use_the_current_identity() {
        let mut h = hook("bin/pyrevit.exe", &["caches", "clear", "--all"], 5);
        h.run_as = RunAs::Elevated;
        let root = std::env::temp_dir().join(format!("pyrevit-setup-hooks-{}", Uuid::new_v4()));
        assert_eq!(HookRunner::new().unwrap().run(&root, &h), HookOutcome::Missing);
    }
}
