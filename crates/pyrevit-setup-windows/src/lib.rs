//! Windows 平台能力封装（提权检测、架构检测、注册表、环境变量广播、进程、重启后删除）。
//!
//! 目标：
//! - 将 Windows 专有 API 集中封装，安装流程只依赖 `pyrevit_setup_core::machine::MachineStore` 等抽象
//! - 统一错误处理风格（以 `anyhow::Result` 形式向上返回）
//! - 非 Windows 平台下提供可编译的降级实现，便于在沙箱中测试安装流程
//!
//! 作者：pyRevit CLI 安装器项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

pub mod cleanup;
pub mod elevation;
#[cfg(windows)]
pub mod environment;
pub mod platform;
pub mod process;
#[cfg(windows)]
pub mod registry;
#[cfg(windows)]
pub mod shell_user;
