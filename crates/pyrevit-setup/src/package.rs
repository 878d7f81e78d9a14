//! 生成分发目录。
//!
//! 目录布局（`<out>/<base_filename>/`）：
//! - `pyrevit-setup(.exe)`：当前 bootstrapper
//! - `setup-manifest.json`：改写后的清单（source/素材路径指向分发目录内）
//! - `payload/<dest>`：各 payload 规则的源文件
//! - `assets/<文件名>`：许可证、图标与向导位图
//!
//! 分发目录可直接作为安装介质：在其中执行 `pyrevit-setup install` 即可。

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use pyrevit_setup_core::manifest::{OverwritePolicy, PayloadRule, SetupManifest};
use pyrevit_setup_core::paths;
use tracing::info;

use crate::{base_dir, load_manifest, payload, Cli};

const PAYLOAD_DIR: &str = "payload";
const ASSETS_DIR: &str = "assets";

/// 生成分发目录并输出其路径。
///
/// 参数：
/// - `out`：输出目录（默认使用清单 `output.dir`，相对清单所在目录）
///
/// 异常处理：
/// - payload 源或素材文件不存在返回错误
/// - 同名分发目录已存在时先删除再生成
pub fn package(cli: &Cli, out: Option<&Path>) -> Result<()> {
    let manifest = load_manifest(&cli.manifest)?;
    let base = base_dir(cli);
    let out_dir = match out {
        Some(dir) => dir.to_path_buf(),
        None => paths::resolve_path(&base, &manifest.output.dir)?,
    };
    let stage = out_dir.join(manifest.installer_base_name());
    if stage.exists() {
        std::fs::remove_dir_all(&stage)
            .with_context(|| format!("清理旧的分发目录失败: {}", stage.display()))?;
    }
    paths::ensure_dir(&stage)?;

    let mut packaged = manifest.clone();
    packaged.payload = stage_payload(&manifest, &base, &stage)?;
    stage_assets(&mut packaged, &base, &stage)?;

    let exe_src = std::env::current_exe().context("获取当前程序路径失败")?;
    let exe_dst = stage.join(format!("pyrevit-setup{}", std::env::consts::EXE_SUFFIX));
    std::fs::copy(&exe_src, &exe_dst)
        .with_context(|| format!("复制 bootstrapper 失败: {}", exe_dst.display()))?;

    let bytes = serde_json::to_vec_pretty(&packaged).context("序列化清单失败")?;
    std::fs::write(stage.join("setup-manifest.json"), bytes).context("写入清单失败")?;

    info!("分发目录已生成: {}", stage.display());
    println!("{}", stage.display());
    Ok(())
}

/// 把各规则的源复制到 `payload/<dest>`，返回指向分发目录的新规则。
fn stage_payload(manifest: &SetupManifest, base: &Path, stage: &Path) -> Result<Vec<PayloadRule>> {
    let mut copy_rules = Vec::with_capacity(manifest.payload.len());
    let mut packaged = Vec::with_capacity(manifest.payload.len());
    for rule in &manifest.payload {
        let key = payload::relative_key(Path::new(""), Path::new(&rule.dest));
        if key.is_empty() {
            return Err(anyhow!("无法打包 payload 目标: {}", rule.dest));
        }
        let staged = format!("{PAYLOAD_DIR}/{key}");
        copy_rules.push(PayloadRule {
            dest: staged.clone(),
            overwrite: OverwritePolicy::Always,
            ..rule.clone()
        });
        packaged.push(PayloadRule {
            source: staged,
            ..rule.clone()
        });
    }
    let deployed = payload::deploy(base, stage, &copy_rules)?;
    info!("已打包 {} 个 payload 文件", deployed.files.len());
    Ok(packaged)
}

/// 把素材复制到 `assets/`，并改写清单中的素材路径。
fn stage_assets(packaged: &mut SetupManifest, base: &Path, stage: &Path) -> Result<()> {
    let assets_dir = stage.join(ASSETS_DIR);
    for slot in packaged.assets.slots_mut() {
        let Some(raw) = slot.as_deref() else {
            continue;
        };
        let src = paths::resolve_path(base, raw)?;
        if !src.is_file() {
            return Err(anyhow!("素材文件不存在: {}", src.display()));
        }
        let name = src
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("素材路径没有文件名: {}", src.display()))?;
        paths::ensure_dir(&assets_dir)?;
        std::fs::copy(&src, assets_dir.join(&name))
            .with_context(|| format!("复制素材失败: {}", src.display()))?;
        *slot = Some(format!("{ASSETS_DIR}/{}", name.display()));
    }
    Ok(())
}
