//! 进程相关能力：检测已部署程序是否正在运行、构造隐藏窗口的子进程命令。
//!
//! 实现策略：
//! - 运行检测优先按完整路径匹配；拿不到进程路径时退回按文件名匹配（忽略大小写）
//! - 隐藏窗口通过 `CREATE_NO_WINDOW` 创建标志实现（仅 Windows 生效）
//!
//! 作者：pyRevit CLI 安装器项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::path::Path;
use std::process::Command;

use anyhow::Result;
use sysinfo::{ProcessRefreshKind, RefreshKind, System};

/// 不为控制台程序创建窗口。
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// 判断指定可执行文件对应的进程是否正在运行。
///
/// 参数：
/// - `exe_path`：目标可执行文件路径
///
/// 返回值：
/// - `Ok(true)`：检测到该程序正在运行
/// - `Ok(false)`：未检测到
///
/// 异常处理：
/// - sysinfo API 本身不返回错误；保留 `Result` 以统一上层接口
pub fn is_process_running_by_exe(exe_path: &Path) -> Result<bool> {
    let needle = exe_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if needle.is_empty() {
        return Ok(false);
    }

    let mut system = System::new_with_specifics(
        RefreshKind::new().with_processes(ProcessRefreshKind::everything()),
    );
    system.refresh_processes();
    for proc_ in system.processes().values() {
        let matched = match proc_.exe() {
            Some(exe) => exe == exe_path,
            None => proc_.name().to_ascii_lowercase() == needle,
        };
        if matched {
            return Ok(true);
        }
    }
    Ok(false)
}

/// 构造子进程命令。
///
/// 参数：
/// - `program`：可执行文件路径
/// - `hidden`：是否隐藏控制台窗口
///
/// 说明：
/// - 子进程继承当前进程的用户身份
/// - 非 Windows 平台下 `hidden` 不产生影响
pub fn command(program: &Path, hidden: bool) -> Command {
    let mut cmd = Command::new(program);
    configure_window(&mut cmd, hidden);
    cmd
}

#[cfg(windows)]
fn configure_window(cmd: &mut Command, hidden: bool) {
    use std::os::windows::process::CommandExt;

    if hidden {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
}

#[cfg(not(windows))]
fn configure_window(_cmd: &mut Command, _hidden: bool) {}

/// 拼接 Windows 命令行（`CommandLineToArgvW` 规则）。
///
/// 说明：
/// - 程序路径总是加引号
/// - 含空白或引号的参数加引号，引号前的反斜杠与引号本身按规则转义
pub fn windows_command_line(program: &Path, args: &[String]) -> String {
    let mut line = format!("\"{}\"", program.display());
    for arg in args {
        line.push(' ');
        quote_arg(arg, &mut line);
    }
    line
}

fn quote_arg(arg: &str, out: &mut String) {
    let needs_quotes =
        arg.is_empty() || arg.contains(|c: char| matches!(c, ' ' | '\t' | '\n' | '\x0b' | '"'));
    if !needs_quotes {
        out.push_str(arg);
        return;
    }
    out.push('"');
    let mut backslashes = 0usize;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                out.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
                out.push('"');
                backslashes = 0;
            }
            _ => {
                out.extend(std::iter::repeat('\\').take(backslashes));
                out.push(c);
                backslashes = 0;
            }
        }
    }
    // 结尾的反斜杠紧挨闭合引号，需要成对
    out.extend(std::iter::repeat('\\').take(backslashes * 2));
    out.push('"');
}
