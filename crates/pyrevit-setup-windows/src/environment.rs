//! 环境变量变更通知。
//!
//! 写入系统 PATH 后向所有顶层窗口广播 `WM_SETTINGCHANGE("Environment")`，
//! 资源管理器等进程据此刷新环境块；已运行的控制台仍需重新打开才能生效。

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;

use anyhow::{anyhow, Result};
use windows::Win32::Foundation::{LPARAM, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    SendMessageTimeoutW, HWND_BROADCAST, SMTO_ABORTIFHUNG, WM_SETTINGCHANGE,
};

/// 单个窗口的最长等待时间（毫秒）。
const BROADCAST_TIMEOUT_MS: u32 = 5000;

/// 广播环境变量变更。
///
/// 异常处理：
/// - 广播超时或失败时返回错误；调用方按“尽力而为”处理
pub fn broadcast_environment_change() -> Result<()> {
    let area: Vec<u16> = OsStr::new("Environment")
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();
    let mut result = 0usize;
    let ret = unsafe {
        SendMessageTimeoutW(
            HWND_BROADCAST,
            WM_SETTINGCHANGE,
            WPARAM(0),
            LPARAM(area.as_ptr() as isize),
            SMTO_ABORTIFHUNG,
            BROADCAST_TIMEOUT_MS,
            Some(&mut result as *mut usize),
        )
    };
    if ret.0 == 0 {
        return Err(anyhow!("广播 WM_SETTINGCHANGE 失败或超时"));
    }
    Ok(())
}
