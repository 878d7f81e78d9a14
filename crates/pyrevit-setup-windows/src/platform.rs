//! 操作系统架构检测。

use pyrevit_setup_core::error::SetupError;
use pyrevit_setup_core::manifest::Architecture;

/// 当前操作系统架构名称。
///
/// Windows 下优先读取 `PROCESSOR_ARCHITEW6432`（32 位进程运行在 64 位系统上时存在），
/// 其次 `PROCESSOR_ARCHITECTURE`。
#[cfg(windows)]
pub fn os_architecture() -> String {
    std::env::var("PROCESSOR_ARCHITEW6432")
        .or_else(|_| std::env::var("PROCESSOR_ARCHITECTURE"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(not(windows))]
pub fn os_architecture() -> String {
    std::env::consts::ARCH.to_string()
}

/// 判断架构名称是否满足清单要求。
pub fn is_supported(required: Architecture, os_arch: &str) -> bool {
    match required {
        Architecture::X64 => {
            if cfg!(windows) {
                os_arch.eq_ignore_ascii_case("AMD64")
            } else {
                cfg!(target_pointer_width = "64")
            }
        }
    }
}

/// 校验当前系统架构。
///
/// 异常处理：
/// - 不满足时返回 [`SetupError::UnsupportedArchitecture`]
pub fn ensure_supported(required: Architecture) -> Result<(), SetupError> {
    let arch = os_architecture();
    if is_supported(required, &arch) {
        Ok(())
    } else {
        Err(SetupError::UnsupportedArchitecture(arch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(windows)]
    #[test]
    fn x64_accepts_amd64_only() {
        assert!(is_supported(Architecture::X64, "AMD64"));
        assert!(is_supported(Architecture::X64, "amd64"));
        assert!(!is_supported(Architecture::X64, "x86"));
        assert!(!is_supported(Architecture::X64, "ARM64"));
    }

    #[test]
    fn current_host_passes_on_64_bit_builds() {
        if cfg!(target_pointer_width = "64") && !cfg!(windows) {
            assert!(ensure_supported(Architecture::X64).is_ok());
        }
    }
}
