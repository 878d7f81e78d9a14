//! pyRevit CLI 安装器核心库（跨平台/不依赖 Win32）。
//!
//! 功能：
//! - 定义安装清单（setup-manifest.json）：产品标识、安装目标、payload、PATH 追加、生命周期钩子
//! - 定义安装状态落盘模型（install-state-<id>.json），支持卸载钩子“只执行一次”
//! - 定义安装/卸载状态机与错误分类
//! - 定义机器级存储抽象（PATH 与“卸载”注册表项），并提供基于文件的沙箱实现
//! - 提供统一路径与目录约定（ProgramData/Program Files 等）
//!
//! 作者：pyRevit CLI 安装器项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

pub mod environment;
pub mod error;
pub mod lifecycle;
pub mod machine;
pub mod manifest;
pub mod paths;
pub mod sandbox;
pub mod state;
