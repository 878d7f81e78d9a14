//! pyRevit CLI 安装/卸载引导程序（bootstrapper）。
//!
//! 职责：
//! - 读取 `setup-manifest.json`，按固定生命周期编排安装/卸载
//! - 安装：权限检查 → 部署 payload → 追加系统 PATH → 运行安装后钩子
//! - 卸载：运行卸载前钩子（只执行一次）→ 删除 payload；系统 PATH 保持不变
//! - 辅助：检测安装状态、环境自检、校验已部署文件、生成分发目录
//!
//! 权限要求：
//! - 安装/卸载需要管理员权限（写 Program Files、写 HKLM）
//!
//! 作者：pyRevit CLI 安装器项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

mod hooks;
mod inspect;
mod install;
mod package;
mod payload;
mod store;
mod target;
mod uninstall;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pyrevit_setup_core::error::SetupError;
use pyrevit_setup_core::manifest::{PrivilegeLevel, SetupManifest};
use pyrevit_setup_windows::elevation;
use tracing_subscriber::EnvFilter;

/// 命令行参数。
///
/// 说明：
/// - `manifest` 指向安装清单文件（默认 `setup-manifest.json`）
/// - `silent` 用于无人值守部署（减少提示输出）
#[derive(Debug, Parser)]
#[command(name = "pyrevit-setup", version)]
struct Cli {
    #[arg(long, default_value = "setup-manifest.json")]
    manifest: PathBuf,

    #[arg(long, default_value_t = false)]
    silent: bool,

    #[command(subcommand)]
    command: Commands,
}

/// bootstrapper 支持的子命令。
#[derive(Debug, Subcommand)]
enum Commands {
    /// 安装（升级时沿用上次安装目录）。
    Install {
        /// 指定安装根目录（覆盖默认目录与上次安装目录）。
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// 卸载（系统 PATH 中追加的目录不会移除）。
    Uninstall,
    /// 输出安装状态（不做系统修改）。
    Detect {
        /// 以 JSON 输出。
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// 环境自检（管理员权限、系统架构、PATH 条目等）。
    Doctor,
    /// 按安装状态中的摘要校验已部署文件。
    Verify,
    /// 生成分发目录（按清单命名规则）。
    Package {
        /// 输出目录（默认使用清单 `output.dir`）。
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

/// 程序入口：初始化日志、解析参数并分发子命令。
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Install { dir } => install::install(&cli, dir.as_deref()),
        Commands::Uninstall => uninstall::uninstall(&cli),
        Commands::Detect { json } => inspect::detect(&cli, *json),
        Commands::Doctor => inspect::doctor(&cli),
        Commands::Verify => inspect::verify(&cli),
        Commands::Package { out } => package::package(&cli, out.as_deref()),
    }
}

/// 读取、解析并校验安装清单（JSON）。
///
/// 异常处理：
/// - 文件读取失败（不存在/权限/IO）返回错误
/// - JSON 解析失败或校验不通过返回错误
fn load_manifest(path: &Path) -> Result<SetupManifest> {
    let bytes = std::fs::read(path).with_context(|| format!("读取清单失败: {}", path.display()))?;
    let manifest: SetupManifest = serde_json::from_slice(&bytes).context("解析清单 JSON 失败")?;
    manifest.validate()?;
    Ok(manifest)
}

/// 清单所在目录（payload/素材相对路径的基准）。
fn base_dir(cli: &Cli) -> PathBuf {
    cli.manifest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// 按清单的权限要求检查当前进程。
///
/// 异常处理：
/// - 要求管理员但当前不是管理员：[`SetupError::PrivilegeDenied`]
fn require_privileges(level: PrivilegeLevel) -> Result<()> {
    match level {
        PrivilegeLevel::Admin => {
            if !allow_non_admin_for_tests() && !elevation::is_running_as_admin()? {
                return Err(SetupError::PrivilegeDenied.into());
            }
        }
    }
    Ok(())
}

fn allow_non_admin_for_tests() -> bool {
    matches!(
        std::env::var("PYREVIT_SETUP_TEST_ALLOW_NON_ADMIN").as_deref(),
        Ok("1")
    )
}
