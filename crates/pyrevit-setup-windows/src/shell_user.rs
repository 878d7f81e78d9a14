//! 以桌面用户（非提权）身份启动子进程。
//!
//! 实现策略：
//! - 取桌面 Shell 窗口（资源管理器）所属进程的令牌，复制为主令牌
//! - 用 `CreateProcessWithTokenW` 启动子进程，同步等待到超时为止
//!
//! 限制：
//! - 没有交互桌面（例如服务会话、无人登录）时找不到 Shell 窗口，返回错误
//! - 调用进程需要 `SeImpersonatePrivilege`（管理员默认具备）

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{CloseHandle, FALSE, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::Security::{
    DuplicateTokenEx, SecurityImpersonation, TokenPrimary, TOKEN_ADJUST_DEFAULT,
    TOKEN_ADJUST_SESSIONID, TOKEN_ASSIGN_PRIMARY, TOKEN_DUPLICATE, TOKEN_QUERY,
};
use windows::Win32::System::Threading::{
    CreateProcessWithTokenW, GetExitCodeProcess, OpenProcess, OpenProcessToken, TerminateProcess,
    WaitForSingleObject, CREATE_NO_WINDOW, CREATE_PROCESS_LOGON_FLAGS, PROCESS_CREATION_FLAGS,
    PROCESS_INFORMATION, PROCESS_QUERY_INFORMATION, STARTUPINFOW,
};
use windows::Win32::UI::WindowsAndMessaging::{GetShellWindow, GetWindowThreadProcessId};

use crate::process::windows_command_line;

/// 子进程的结束方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellUserExit {
    /// 子进程自行退出。
    Exited(u32),
    /// 超时，已结束子进程。
    TimedOut,
    /// 子进程已启动，但等待或读取退出码失败。
    Lost,
}

/// 关闭时自动释放的内核句柄。
struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }
}

fn wide(s: &OsStr) -> Vec<u16> {
    s.encode_wide().chain(std::iter::once(0)).collect()
}

/// 复制桌面 Shell 进程的令牌。
fn shell_primary_token() -> Result<OwnedHandle> {
    unsafe {
        let shell = GetShellWindow();
        if shell.0.is_null() {
            return Err(anyhow!("没有桌面 Shell 窗口"));
        }
        let mut pid = 0u32;
        GetWindowThreadProcessId(shell, Some(&mut pid as *mut u32));
        if pid == 0 {
            return Err(anyhow!("获取 Shell 进程 ID 失败"));
        }

        let process = OwnedHandle(
            OpenProcess(PROCESS_QUERY_INFORMATION, FALSE, pid).context("打开 Shell 进程失败")?,
        );
        let mut token = HANDLE::default();
        OpenProcessToken(process.0, TOKEN_DUPLICATE, &mut token)
            .context("读取 Shell 进程令牌失败")?;
        let token = OwnedHandle(token);

        let mut primary = HANDLE::default();
        DuplicateTokenEx(
            token.0,
            TOKEN_QUERY
                | TOKEN_DUPLICATE
                | TOKEN_ASSIGN_PRIMARY
                | TOKEN_ADJUST_DEFAULT
                | TOKEN_ADJUST_SESSIONID,
            None,
            SecurityImpersonation,
            TokenPrimary,
            &mut primary,
        )
        .context("复制 Shell 进程令牌失败")?;
        Ok(OwnedHandle(primary))
    }
}

/// 以桌面用户身份运行程序并等待结束。
///
/// 参数：
/// - `program`：可执行文件路径
/// - `args`：参数（按 Windows 命令行规则转义）
/// - `cwd`：工作目录
/// - `hidden`：是否隐藏控制台窗口
/// - `limit`：最长等待时间，超时即结束子进程
///
/// 异常处理：
/// - 只在子进程启动前返回错误（取令牌或创建进程失败），调用方可改用当前身份重试
/// - 启动之后的失败以 [`ShellUserExit::Lost`] 表达
pub fn run_as_shell_user(
    program: &Path,
    args: &[String],
    cwd: Option<&Path>,
    hidden: bool,
    limit: Duration,
) -> Result<ShellUserExit> {
    let token = shell_primary_token()?;

    let app = wide(program.as_os_str());
    let mut command_line = wide(OsStr::new(&windows_command_line(program, args)));
    let cwd = cwd.map(|d| wide(d.as_os_str()));
    let cwd_ptr = cwd.as_ref().map_or(PCWSTR::null(), |d| PCWSTR(d.as_ptr()));
    let flags = if hidden {
        CREATE_NO_WINDOW
    } else {
        PROCESS_CREATION_FLAGS(0)
    };

    let startup = STARTUPINFOW {
        cb: std::mem::size_of::<STARTUPINFOW>() as u32,
        ..Default::default()
    };
    let mut info = PROCESS_INFORMATION::default();
    unsafe {
        CreateProcessWithTokenW(
            token.0,
            CREATE_PROCESS_LOGON_FLAGS(0),
            PCWSTR(app.as_ptr()),
            PWSTR(command_line.as_mut_ptr()),
            flags,
            None,
            cwd_ptr,
            &startup,
            &mut info,
        )
        .with_context(|| format!("以桌面用户身份启动失败: {}", program.display()))?;
    }
    let process = OwnedHandle(info.hProcess);
    let _thread = OwnedHandle(info.hThread);

    let millis = u32::try_from(limit.as_millis()).unwrap_or(u32::MAX - 1);
    unsafe {
        let waited = WaitForSingleObject(process.0, millis);
        if waited == WAIT_TIMEOUT {
            let _ = TerminateProcess(process.0, 1);
            return Ok(ShellUserExit::TimedOut);
        }
        if waited != WAIT_OBJECT_0 {
            let _ = TerminateProcess(process.0, 1);
            return Ok(ShellUserExit::Lost);
        }
        let mut code = 0u32;
        match GetExitCodeProcess(process.0, &mut code) {
            Ok(()) => Ok(ShellUserExit::Exited(code)),
            Err(_) => Ok(ShellUserExit::Lost),
        }
    }
}
