//! 安装清单（setup-manifest.json）模型定义与校验。
//!
//! 该模块描述安装程序需要的全部输入：
//! - 产品标识（名称/版本/UUID/发布者/URL/版权）
//! - 安装目标（默认目录名、架构、权限、是否沿用上次安装目录）
//! - payload 复制规则
//! - 机器级 PATH 追加
//! - 安装后/卸载前生命周期钩子
//! - 安装包命名与品牌素材
//!
//! 约定：
//! - 大部分字段通过 `#[serde(default)]` 提供默认值，以便清单向前兼容
//! - 该模块只做数据定义与静态校验，不执行任何 IO/系统修改
//!
//! 作者：pyRevit CLI 安装器项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SetupError;

/// 安装清单根对象（对应 `setup-manifest.json`）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupManifest {
    /// 产品标识（跨版本稳定）。
    pub app: AppIdentity,
    #[serde(default)]
    /// 安装目标约定。
    pub target: InstallTargetSpec,
    /// payload 复制规则（按顺序执行）。
    pub payload: Vec<PayloadRule>,
    #[serde(default)]
    /// 机器级 PATH 追加配置。
    pub environment: EnvironmentPatch,
    #[serde(default)]
    /// 生命周期钩子（安装后/卸载前）。
    pub hooks: Vec<LifecycleHook>,
    #[serde(default)]
    /// 安装包输出命名。
    pub output: OutputSpec,
    #[serde(default)]
    /// 许可证/图标/位图等品牌素材（原样透传）。
    pub assets: BrandingAssets,
}

/// 产品标识。
///
/// 注意：
/// - `id` 用于升级检测与卸载注册表项的键名，同一产品的所有版本必须保持不变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppIdentity {
    /// 产品 UUID（不带花括号）。
    pub id: String,
    /// 产品显示名称。
    pub name: String,
    /// 版本号（四段点分数字，例如 `4.8.16.24121`）。
    pub version: String,
    /// 发布者。
    pub publisher: String,
    #[serde(default)]
    /// 相关链接。
    pub urls: AppUrls,
    #[serde(default)]
    /// 版权声明。
    pub copyright: String,
}

/// 产品相关链接（写入“卸载”注册表项）。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppUrls {
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub support: Option<String>,
    #[serde(default)]
    pub updates: Option<String>,
}

/// 安装目标约定。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallTargetSpec {
    #[serde(default)]
    /// `{ProgramFiles}` 下的默认目录名；为空时使用产品名称。
    pub default_dir_name: Option<String>,
    #[serde(default)]
    /// 允许的架构。
    pub architecture: Architecture,
    #[serde(default)]
    /// 权限要求。
    pub privileges: PrivilegeLevel,
    #[serde(default = "default_true")]
    /// 升级时是否沿用上次记录的安装目录。
    pub use_previous_dir: bool,
    #[serde(default)]
    /// “程序和功能”中显示的图标（相对安装根目录，例如 `bin/pyrevit.exe`）。
    pub display_icon: Option<String>,
}

impl Default for InstallTargetSpec {
    fn default() -> Self {
        Self {
            default_dir_name: None,
            architecture: Architecture::default(),
            privileges: PrivilegeLevel::default(),
            use_previous_dir: true,
            display_icon: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// 架构模式（仅支持 64 位）。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    #[default]
    X64,
}

/// 权限要求。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeLevel {
    #[default]
    /// 需要管理员（写 Program Files 与 HKLM）。
    Admin,
}

/// 单条 payload 复制规则。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadRule {
    /// 源路径（相对清单所在目录，或绝对路径）。
    pub source: String,
    /// 目标路径（相对安装根目录）。
    pub dest: String,
    #[serde(default)]
    /// 覆盖策略。
    pub overwrite: OverwritePolicy,
    #[serde(default = "default_true")]
    /// 是否递归复制子目录。
    pub recurse: bool,
}

/// 覆盖策略。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    #[default]
    /// 总是覆盖（不比较版本）。
    Always,
    /// 目标已存在时跳过。
    IfMissing,
}

/// 机器级 PATH 追加配置。
///
/// 注意：
/// - 卸载时不会撤销该修改；重复安装会再次追加（重复条目属于已知行为）
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnvironmentPatch {
    #[serde(default)]
    /// 追加到 PATH 的目录（相对安装根目录）；为空则不修改 PATH。
    pub path_entry: Option<String>,
}

/// 生命周期钩子：调用已部署的可执行文件执行维护命令。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleHook {
    #[serde(default)]
    /// 只执行一次标识（卸载钩子使用，保证一次卸载事务内最多执行一次）。
    pub run_once_id: Option<String>,
    /// 触发时机。
    pub trigger: HookTrigger,
    /// 可执行文件路径（相对安装根目录）。
    pub program: String,
    #[serde(default)]
    /// 命令行参数。
    pub args: Vec<String>,
    #[serde(default)]
    /// 展示给安装用户的说明文字。
    pub description: String,
    #[serde(default = "default_true")]
    /// 是否隐藏控制台窗口。
    pub hidden: bool,
    #[serde(default)]
    /// 运行身份。
    pub run_as: RunAs,
    #[serde(default = "default_hook_timeout")]
    /// 最长等待秒数，超时后结束子进程并继续。
    pub timeout_secs: u64,
}

fn default_hook_timeout() -> u64 {
    120
}

/// 钩子触发时机。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HookTrigger {
    PostInstall,
    PreUninstall,
}

/// 钩子运行身份。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunAs {
    #[default]
    /// 发起安装的桌面用户（非提权）。
    OriginalUser,
    /// 安装器自身的身份（管理员）。
    Elevated,
}

/// 安装包输出命名。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSpec {
    #[serde(default = "default_output_dir")]
    pub dir: String,
    /// 文件名模式，`{version}` 会被替换为产品版本。
    #[serde(default = "default_base_filename")]
    pub base_filename: String,
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            base_filename: default_base_filename(),
        }
    }
}

fn default_output_dir() -> String {
    "dist".to_string()
}

fn default_base_filename() -> String {
    "pyRevit_CLI_{version}_admin_signed".to_string()
}

/// 品牌素材（路径相对清单所在目录）。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BrandingAssets {
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub wizard_image: Option<String>,
    #[serde(default)]
    pub wizard_small_image: Option<String>,
}

impl BrandingAssets {
    /// 按固定顺序列出全部素材槽位（许可证、图标、向导大图、向导小图）。
    pub fn slots_mut(&mut self) -> [&mut Option<String>; 4] {
        [
            &mut self.license,
            &mut self.icon,
            &mut self.wizard_image,
            &mut self.wizard_small_image,
        ]
    }
}

impl SetupManifest {
    /// 静态校验清单。
    ///
    /// 校验项：
    /// - `app.id` 可解析为 UUID
    /// - `app.version` 为四段点分数字
    /// - 名称/发布者非空，至少一条 payload 规则
    /// - 钩子 program 非空，`run_once_id` 不重复
    ///
    /// 异常处理：
    /// - 任一项不满足返回 [`SetupError::InvalidManifest`]
    pub fn validate(&self) -> Result<(), SetupError> {
        let invalid = |msg: String| Err(SetupError::InvalidManifest(msg));

        if Uuid::parse_str(&self.app.id).is_err() {
            return invalid(format!("app.id 不是合法的 UUID: {}", self.app.id));
        }
        if !is_four_part_version(&self.app.version) {
            return invalid(format!("app.version 必须为四段点分数字: {}", self.app.version));
        }
        if self.app.name.trim().is_empty() {
            return invalid("app.name 不能为空".to_string());
        }
        if self.app.publisher.trim().is_empty() {
            return invalid("app.publisher 不能为空".to_string());
        }
        if self.payload.is_empty() {
            return invalid("payload 至少需要一条规则".to_string());
        }
        if self.payload.iter().any(|r| r.source.is_empty() || r.dest.is_empty()) {
            return invalid("payload 规则的 source/dest 不能为空".to_string());
        }

        let mut seen = HashSet::new();
        for hook in &self.hooks {
            if hook.program.trim().is_empty() {
                return invalid("钩子 program 不能为空".to_string());
            }
            if let Some(id) = &hook.run_once_id {
                if !seen.insert(id.as_str()) {
                    return invalid(format!("run_once_id 重复: {id}"));
                }
            }
        }
        Ok(())
    }

    /// 安装根目录的默认目录名（未配置时回退为产品名称）。
    pub fn default_dir_name(&self) -> &str {
        self.target
            .default_dir_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.app.name)
    }

    /// 按触发时机筛选钩子（保持清单顺序）。
    pub fn hooks_for(&self, trigger: HookTrigger) -> impl Iterator<Item = &LifecycleHook> {
        self.hooks.iter().filter(move |h| h.trigger == trigger)
    }

    /// 安装包基础文件名（已替换 `{version}`）。
    pub fn installer_base_name(&self) -> String {
        self.output.base_filename.replace("{version}", &self.app.version)
    }
}

/// 判断版本号是否为四段点分无符号整数。
pub fn is_four_part_version(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    parts.len() == 4 && parts.iter().all(|p| !p.is_empty() && p.parse::<u32>().is_ok())
}
