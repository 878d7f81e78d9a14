//! 提权/权限相关检测。

use anyhow::Result;

/// 判断当前进程是否以管理员权限运行。
///
/// 返回值：
/// - `Ok(true)`：当前为管理员
/// - `Ok(false)`：当前非管理员（非 Windows 平台始终为 `false`）
///
/// 安全注意：
/// - 该检查仅用于“是否应继续执行需要管理员权限的系统修改”，不能作为完整的安全边界。
#[cfg(windows)]
pub fn is_running_as_admin() -> Result<bool> {
    use windows::Win32::UI::Shell::IsUserAnAdmin;

    unsafe { Ok(IsUserAnAdmin().as_bool()) }
}

#[cfg(not(windows))]
pub fn is_running_as_admin() -> Result<bool> {
    Ok(false)
}
