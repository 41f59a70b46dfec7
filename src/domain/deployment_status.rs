//! 部署状态机
//!
//! Unsent → Submitted → {Confirmed, Reverted, Failed}

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentState {
    /// 尚未提交
    Unsent,

    /// 已提交，等待回执
    Submitted,

    /// 回执成功且目标地址存在代码
    Confirmed,

    /// 回执状态为 reverted
    Reverted,

    /// 未拿到回执，或成功回执下目标地址没有代码
    Failed,
}

impl DeploymentState {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Unsent => "部署交易未提交",
            Self::Submitted => "部署交易已提交",
            Self::Confirmed => "部署已确认",
            Self::Reverted => "部署交易已回滚",
            Self::Failed => "部署失败",
        }
    }

    /// 是否为最终状态
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Reverted | Self::Failed)
    }

    /// 验证状态转换合法性
    pub fn can_transition_to(&self, target: &Self) -> bool {
        use DeploymentState::*;

        matches!(
            (self, target),
            (Unsent, Submitted) | (Submitted, Confirmed) | (Submitted, Reverted) | (Submitted, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsent => "unsent",
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
            Self::Reverted => "reverted",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
