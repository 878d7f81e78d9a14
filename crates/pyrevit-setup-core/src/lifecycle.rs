//! 安装/卸载状态机。
//!
//! 安装：`Pending → Elevated → PayloadCopied → EnvPatched → HooksRun → Complete`，
//! 在 `Pending`（权限检查）或 `Elevated`（复制中）失败时进入 `Aborted`。
//! 卸载：`Pending → HooksRun → PayloadRemoved → Complete`，PATH 不在卸载流程中。
//!
//! 作者：pyRevit CLI 安装器项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::fmt;

use anyhow::{anyhow, Result};
use tracing::info;

/// 安装阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Pending,
    Elevated,
    PayloadCopied,
    EnvPatched,
    HooksRun,
    Complete,
    Aborted,
}

/// 卸载阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallPhase {
    Pending,
    HooksRun,
    PayloadRemoved,
    Complete,
}

impl InstallPhase {
    fn next(self) -> Option<Self> {
        use InstallPhase::*;
        match self {
            Pending => Some(Elevated),
            Elevated => Some(PayloadCopied),
            PayloadCopied => Some(EnvPatched),
            EnvPatched => Some(HooksRun),
            HooksRun => Some(Complete),
            Complete | Aborted => None,
        }
    }

    /// 是否允许从当前阶段进入 `Aborted`。
    ///
    /// 只有权限检查与 payload 复制阶段可以中止；之后的失败不会回滚已完成的修改。
    fn can_abort(self) -> bool {
        matches!(self, InstallPhase::Pending | InstallPhase::Elevated)
    }
}

impl UninstallPhase {
    fn next(self) -> Option<Self> {
        use UninstallPhase::*;
        match self {
            Pending => Some(HooksRun),
            HooksRun => Some(PayloadRemoved),
            PayloadRemoved => Some(Complete),
            Complete => None,
        }
    }
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for UninstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 安装流程状态机：只允许按顺序前进，或在复制完成前中止。
#[derive(Debug)]
pub struct InstallProgress {
    phase: InstallPhase,
}

impl Default for InstallProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallProgress {
    pub fn new() -> Self {
        Self {
            phase: InstallPhase::Pending,
        }
    }

    pub fn phase(&self) -> InstallPhase {
        self.phase
    }

    /// 进入指定阶段。
    ///
    /// 异常处理：
    /// - 目标阶段不是当前阶段的下一步时返回错误（状态不变）
    pub fn advance(&mut self, to: InstallPhase) -> Result<()> {
        if self.phase.next() != Some(to) {
            return Err(anyhow!("非法的安装阶段切换: {} -> {}", self.phase, to));
        }
        info!("安装阶段: {} -> {}", self.phase, to);
        self.phase = to;
        Ok(())
    }

    /// 中止安装。
    ///
    /// 异常处理：
    /// - `PayloadCopied` 之后不允许中止，返回错误
    pub fn abort(&mut self) -> Result<()> {
        if !self.phase.can_abort() {
            return Err(anyhow!("阶段 {} 之后不能中止安装", self.phase));
        }
        info!("安装阶段: {} -> {}", self.phase, InstallPhase::Aborted);
        self.phase = InstallPhase::Aborted;
        Ok(())
    }
}

/// 卸载流程状态机。
#[derive(Debug)]
pub struct UninstallProgress {
    phase: UninstallPhase,
}

impl Default for UninstallProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl UninstallProgress {
    pub fn new() -> Self {
        Self {
            phase: UninstallPhase::Pending,
        }
    }

    pub fn phase(&self) -> UninstallPhase {
        self.phase
    }

    pub fn advance(&mut self, to: UninstallPhase) -> Result<()> {
        if self.phase.next() != Some(to) {
            return Err(anyhow!("非法的卸载阶段切换: {} -> {}", self.phase, to));
        }
        info!("卸载阶段: {} -> {}", self.phase, to);
        self.phase = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_walks_every_phase_in_order() {
        let mut p = InstallProgress::new();
        for to in [
            InstallPhase::Elevated,
            InstallPhase::PayloadCopied,
            InstallPhase::EnvPatched,
            InstallPhase::HooksRun,
            InstallPhase::Complete,
        ] {
            p.advance(to).unwrap();
        }
        assert_eq!(p.phase(), InstallPhase::Complete);
    }

    #[test]
    fn install_cannot_skip_payload_copy() {
        let mut p = InstallProgress::new();
        p.advance(InstallPhase::Elevated).unwrap();
        assert!(p.advance(InstallPhase::EnvPatched).is_err());
        assert!(p.advance(InstallPhase::HooksRun).is_err());
        assert_eq!(p.phase(), InstallPhase::Elevated);
    }

    #[test]
    fn abort_only_before_payload_copied() {
        let mut p = InstallProgress::new();
        p.abort().unwrap();
        assert_eq!(p.phase(), InstallPhase::Aborted);
        assert!(p.advance(InstallPhase::Elevated).is_err());

        let mut p = InstallProgress::new();
        p.advance(InstallPhase::Elevated).unwrap();
        p.abort().unwrap();

        let mut p = InstallProgress::new();
        p.advance(InstallPhase::Elevated).unwrap();
        p.advance(InstallPhase::PayloadCopied).unwrap();
        assert!(p.abort().is_err());
        assert_eq!(p.phase(), InstallPhase::PayloadCopied);
    }

    #[test]
    fn uninstall_runs_hooks_before_removal() {
        let mut p = UninstallProgress::new();
        assert!(p.advance(UninstallPhase::PayloadRemoved).is_err());
        p.advance(UninstallPhase::HooksRun).unwrap();
        p.advance(UninstallPhase::PayloadRemoved).unwrap();
        p.advance(UninstallPhase::Complete).unwrap();
        assert!(p.advance(UninstallPhase::Complete).is_err());
    }
}
