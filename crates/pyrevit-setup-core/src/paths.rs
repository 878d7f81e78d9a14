//! 统一路径与目录约定（Program Files、ProgramData 与安装根目录布局）。
//!
//! 目标：
//! - 将落盘路径集中管理，避免散落在各模块中
//! - 所有约定路径都从环境变量推导，便于测试时重定向到沙箱目录
//!
//! 作者：pyRevit CLI 安装器项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

/// ProgramData 下的安装器目录名。
///
/// 示例（默认）：
/// - `%ProgramData%\pyRevitSetup`
pub const VENDOR_DIR: &str = "pyRevitSetup";

/// 安装根目录下存放卸载程序与清单副本的子目录。
pub const UNINSTALL_SUBDIR: &str = "uninstall";

/// 获取安装器在 ProgramData 下的根目录。
///
/// 返回值：
/// - 成功：`%ProgramData%\pyRevitSetup`
///
/// 异常处理：
/// - 当环境变量 `ProgramData` 不存在或不可读时，返回错误。
pub fn program_data_dir() -> Result<PathBuf> {
    let program_data = std::env::var("ProgramData").context("读取 ProgramData 环境变量失败")?;
    Ok(PathBuf::from(program_data).join(VENDOR_DIR))
}

/// 确保目录存在（不存在则递归创建）。
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).with_context(|| format!("创建目录失败: {}", path.display()))?;
    Ok(())
}

/// 指定产品的安装状态文件路径。
///
/// 返回值：
/// - `%ProgramData%\pyRevitSetup\install-state-<app_id>.json`
pub fn state_file(app_id: &str) -> Result<PathBuf> {
    Ok(program_data_dir()?.join(format!("install-state-{app_id}.json")))
}

/// 64 位 Program Files 目录。
///
/// 查找顺序：
/// - `ProgramW6432`（32 位进程下仍指向 64 位目录）
/// - `ProgramFiles`
///
/// 异常处理：
/// - 两者都不存在时返回错误（非 Windows 环境需显式指定 `--dir`）
pub fn program_files_dir() -> Result<PathBuf> {
    ["ProgramW6432", "ProgramFiles"]
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("无法确定 Program Files 目录，请使用 --dir 指定安装目录"))
}

/// 默认安装根目录：`{ProgramFiles}\<dir_name>`。
pub fn default_install_root(dir_name: &str) -> Result<PathBuf> {
    Ok(program_files_dir()?.join(dir_name))
}

/// 将清单中的路径字段解析为实际路径。
///
/// 参数：
/// - `base`：相对路径的基准目录（清单文件所在目录或安装根目录）
/// - `raw`：清单中的路径字符串
///
/// 返回值：
/// - `raw` 为绝对路径：直接返回
/// - `raw` 为相对路径：返回 `base.join(raw)`
///
/// 异常处理：
/// - `raw` 为空字符串时返回错误，避免误用导致写入基准目录本身。
pub fn resolve_path(base: &Path, raw: &str) -> Result<PathBuf> {
    if raw.is_empty() {
        return Err(anyhow!("空路径"));
    }
    let p = PathBuf::from(raw);
    if p.is_absolute() {
        Ok(p)
    } else {
        Ok(base.join(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_path_joins_relative_and_keeps_absolute() {
        let base = std::env::temp_dir();
        assert_eq!(resolve_path(&base, "bin").unwrap(), base.join("bin"));
        let abs = base.join("elsewhere");
        assert_eq!(resolve_path(&base, &abs.to_string_lossy()).unwrap(), abs);
        assert!(resolve_path(&base, "").is_err());
    }
}
