//! 统一错误定义
//!
//! 部署路径上的所有错误都携带 chain_id、派生地址以及（已提交时的）交易哈希，
//! 以便把失败归因到具体的链和具体的一次尝试。

use ethers::types::{Address, TxHash};
use thiserror::Error;

use crate::domain::chain_config::ChainId;

#[derive(Debug, Error)]
pub enum DeployError {
    /// 注册表中没有该链的 RPC 端点
    #[error("No RPC URL configured for chain ID {chain_id}")]
    ChainNotConfigured { chain_id: ChainId },

    /// 部署交易已上链但执行回滚
    #[error(
        "Deployment reverted on chain {chain_id} (target {address:?}, tx {tx_hash:?}): \
         constructor failed or code already exists at the CREATE2 address \
         (same salt and init code deployed before?)"
    )]
    DeploymentReverted {
        chain_id: ChainId,
        address: Address,
        tx_hash: TxHash,
    },

    /// 交易成功但目标地址没有代码
    #[error(
        "Deployment transaction succeeded on chain {chain_id} but no code found at {address:?} (tx {tx_hash:?})"
    )]
    NoCodeAtAddress {
        chain_id: ChainId,
        address: Address,
        tx_hash: TxHash,
    },

    /// 轮询预算耗尽仍未拿到回执
    #[error(
        "No receipt for deployment tx {tx_hash:?} on chain {chain_id} (target {address:?}) after {attempts} attempts"
    )]
    ConfirmationTimeout {
        chain_id: ChainId,
        address: Address,
        tx_hash: TxHash,
        attempts: u32,
    },

    /// 通过 attach 绑定的句柄没有 init code，无法部署
    #[error("Contract handle at {address:?} was attached without init code and cannot be deployed")]
    NotDeployable { address: Address },

    #[error("Invalid salt: {0}")]
    InvalidSalt(String),

    #[error("Invalid signer: {0}")]
    InvalidSigner(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// ABI 编解码错误（函数不存在、参数不匹配、返回值无法解码等）
    #[error("ABI error: {0}")]
    Abi(#[from] ethers::abi::Error),

    /// RPC / 传输层错误，原样透传
    #[error(transparent)]
    Rpc(#[from] anyhow::Error),
}

impl DeployError {
    /// 失败所在的链（仅部署路径错误有值）
    pub fn chain_id(&self) -> Option<ChainId> {
        match self {
            Self::ChainNotConfigured { chain_id }
            | Self::DeploymentReverted { chain_id, .. }
            | Self::NoCodeAtAddress { chain_id, .. }
            | Self::ConfirmationTimeout { chain_id, .. } => Some(*chain_id),
            _ => None,
        }
    }

    /// 已提交交易的哈希
    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            Self::DeploymentReverted { tx_hash, .. }
            | Self::NoCodeAtAddress { tx_hash, .. }
            | Self::ConfirmationTimeout { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }
}

pub type DeployResult<T> = std::result::Result<T, DeployError>;
