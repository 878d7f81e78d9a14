//! 重启后删除。
//!
//! 卸载程序从 `{app}\uninstall\` 启动时，正在运行的可执行文件无法删除；
//! 剩余文件与目录通过 `MoveFileExW(MOVEFILE_DELAY_UNTIL_REBOOT)` 登记到下次重启时删除。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// 列出目录下的全部条目，子项在前、目录本身在后（重启时按此顺序删除）。
///
/// 异常处理：
/// - 目录不存在时返回空列表
pub fn removal_order(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if std::fs::symlink_metadata(dir).is_err() {
        return Ok(out);
    }
    collect(dir, &mut out)?;
    Ok(out)
}

fn collect(path: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let meta = std::fs::symlink_metadata(path)
        .with_context(|| format!("读取文件信息失败: {}", path.display()))?;
    if meta.is_dir() {
        let mut children = std::fs::read_dir(path)
            .with_context(|| format!("读取目录失败: {}", path.display()))?
            .map(|e| e.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()
            .with_context(|| format!("读取目录失败: {}", path.display()))?;
        children.sort();
        for child in &children {
            collect(child, out)?;
        }
    }
    out.push(path.to_path_buf());
    Ok(())
}

/// 登记在下次重启时删除 `dir` 及其内容。
///
/// 返回值：
/// - 已登记的条目数
///
/// 异常处理：
/// - 任一条目登记失败即返回错误（需要管理员权限）
/// - 非 Windows 平台始终返回错误
pub fn schedule_delete_on_reboot(dir: &Path) -> Result<usize> {
    let entries = removal_order(dir)?;
    for entry in &entries {
        delay_delete(entry)?;
    }
    Ok(entries.len())
}

/// 登记在下次重启时删除单个文件或空目录。
pub fn schedule_entry_on_reboot(path: &Path) -> Result<()> {
    delay_delete(path)
}

#[cfg(windows)]
fn delay_delete(path: &Path) -> Result<()> {
    use std::os::windows::ffi::OsStrExt;

    use windows::core::PCWSTR;
    use windows::Win32::Storage::FileSystem::{MoveFileExW, MOVEFILE_DELAY_UNTIL_REBOOT};

    let wide: Vec<u16> = path
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();
    unsafe {
        MoveFileExW(PCWSTR(wide.as_ptr()), PCWSTR::null(), MOVEFILE_DELAY_UNTIL_REBOOT)
            .with_context(|| format!("登记重启后删除失败: {}", path.display()))
    }
}

#[cfg(not(windows))]
fn delay_delete(path: &Path) -> Result<()> {
    Err(anyhow::anyhow!("重启后删除仅支持 Windows: {}", path.display()))
}
