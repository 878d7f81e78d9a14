//! payload 部署：按清单规则递归复制文件到安装根目录。
//!
//! 约定：
//! - 目录项按文件名排序后复制，保证顺序稳定
//! - 记录本次新建的文件/目录（复制日志）；任一文件失败时按逆序删除这些新建项，
//!   被覆盖的旧文件保持现状
//! - 每个部署成功的文件都计算 SHA-256，写入安装状态供 `verify` 使用
//!
//! 作者：pyRevit CLI 安装器项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::path::{Component, Path, PathBuf};

use pyrevit_setup_core::error::SetupError;
use pyrevit_setup_core::manifest::{OverwritePolicy, PayloadRule};
use pyrevit_setup_core::paths;
use pyrevit_setup_core::state::{file_digest, PayloadFile};
use tracing::{debug, info, warn};

/// 本次部署新建的文件与目录。
#[derive(Debug, Default)]
struct CopyJournal {
    created_files: Vec<PathBuf>,
    created_dirs: Vec<PathBuf>,
}

impl CopyJournal {
    /// 删除本次新建的文件与目录（逆序，失败忽略）。
    fn rollback(self) {
        for file in self.created_files.iter().rev() {
            if let Err(e) = std::fs::remove_file(file) {
                warn!("回滚删除文件失败: {}: {e}", file.display());
            }
        }
        for dir in self.created_dirs.iter().rev() {
            let _ = std::fs::remove_dir(dir);
        }
        info!(
            "已回滚 {} 个新建文件、{} 个新建目录",
            self.created_files.len(),
            self.created_dirs.len()
        );
    }
}

/// 一次成功的部署：已部署文件列表，以及撤销本次新建项所需的复制日志。
///
/// 部署之后的登记步骤失败时调用 [`Deployment::rollback`]；不调用则保留部署结果。
#[derive(Debug)]
pub struct Deployment {
    pub files: Vec<PayloadFile>,
    journal: CopyJournal,
}

impl Deployment {
    /// 删除本次部署新建的文件与目录。
    pub fn rollback(self) {
        self.journal.rollback();
    }
}

/// 部署过程上下文。
struct Deployer<'a> {
    install_root: &'a Path,
    journal: CopyJournal,
    files: Vec<PayloadFile>,
}

/// 按规则部署 payload。
///
/// 参数：
/// - `base_dir`：清单所在目录（解析 `source` 相对路径）
/// - `install_root`：安装根目录（解析 `dest` 相对路径）
/// - `rules`：payload 规则（按顺序执行）
///
/// 返回值：
/// - 成功：[`Deployment`]（已部署文件列表含摘要）
///
/// 异常处理：
/// - 任一文件复制/目录创建失败：回滚本次新建项并返回 [`SetupError::PayloadCopyFailed`]
pub fn deploy(
    base_dir: &Path,
    install_root: &Path,
    rules: &[PayloadRule],
) -> Result<Deployment, SetupError> {
    let mut deployer = Deployer {
        install_root,
        journal: CopyJournal::default(),
        files: Vec::new(),
    };
    for rule in rules {
        if let Err(e) = deployer.apply(base_dir, rule) {
            deployer.journal.rollback();
            return Err(e);
        }
    }
    info!(
        "已部署 {} 个文件到 {}",
        deployer.files.len(),
        install_root.display()
    );
    Ok(Deployment {
        files: deployer.files,
        journal: deployer.journal,
    })
}

impl Deployer<'_> {
    fn apply(&mut self, base_dir: &Path, rule: &PayloadRule) -> Result<(), SetupError> {
        let src = paths::resolve_path(base_dir, &rule.source).map_err(|e| fail(base_dir, e))?;
        let dst = paths::resolve_path(self.install_root, &rule.dest)
            .map_err(|e| fail(self.install_root, e))?;
        if !src.exists() {
            return Err(SetupError::PayloadCopyFailed {
                path: src,
                reason: "payload 源路径不存在".to_string(),
            });
        }
        info!("部署: {} -> {}", src.display(), dst.display());
        if src.is_file() {
            if let Some(parent) = dst.parent() {
                self.create_dir_all(parent)?;
            }
            self.copy_file(&src, &dst, rule.overwrite)
        } else {
            self.copy_dir(&src, &dst, rule)
        }
    }

    fn copy_dir(&mut self, src: &Path, dst: &Path, rule: &PayloadRule) -> Result<(), SetupError> {
        self.create_dir_all(dst)?;
        let mut entries = std::fs::read_dir(src)
            .and_then(|rd| rd.collect::<Result<Vec<_>, _>>())
            .map_err(|e| fail(src, e))?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let from = entry.path();
            let to = dst.join(entry.file_name());
            let file_type = entry.file_type().map_err(|e| fail(&from, e))?;
            if file_type.is_dir() {
                if rule.recurse {
                    self.copy_dir(&from, &to, rule)?;
                }
            } else {
                self.copy_file(&from, &to, rule.overwrite)?;
            }
        }
        Ok(())
    }

    fn copy_file(
        &mut self,
        from: &Path,
        to: &Path,
        overwrite: OverwritePolicy,
    ) -> Result<(), SetupError> {
        let existed = to.exists();
        if existed && overwrite == OverwritePolicy::IfMissing {
            debug!("目标已存在，跳过: {}", to.display());
        } else {
            std::fs::copy(from, to).map_err(|e| fail(from, e))?;
            if !existed {
                self.journal.created_files.push(to.to_path_buf());
            }
        }

        let (sha256, size) = file_digest(to).map_err(|e| fail(to, e))?;
        self.files.push(PayloadFile {
            path: relative_key(self.install_root, to),
            size,
            sha256,
        });
        Ok(())
    }

    /// 创建目录（含缺失的上级目录），并把新建的每一级记入日志。
    fn create_dir_all(&mut self, dir: &Path) -> Result<(), SetupError> {
        let mut missing = Vec::new();
        let mut cur = Some(dir);
        while let Some(p) = cur {
            if p.exists() {
                break;
            }
            missing.push(p.to_path_buf());
            cur = p.parent();
        }
        for p in missing.into_iter().rev() {
            std::fs::create_dir(&p).map_err(|e| fail(&p, e))?;
            self.journal.created_dirs.push(p);
        }
        Ok(())
    }
}

/// 已部署文件在安装状态中的键：相对安装根目录、以 `/` 分隔。
pub fn relative_key(install_root: &Path, file: &Path) -> String {
    let rel = file.strip_prefix(install_root).unwrap_or(file);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn fail(path: &Path, err: impl std::fmt::Display) -> SetupError {
    SetupError::PayloadCopyFailed {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
