//! 确定性部署引擎
//!
//! 单条链上的一次部署：推导地址 → 构造交易 → 提交 → 轮询回执 → 校验代码。
//! 每次 `deploy` 只提交一次交易，不在整笔交易层面重试（换 gas 重发等由调用方决定）。

use std::{sync::Arc, time::Duration};

use ethers::types::{
    transaction::eip2718::TypedTransaction, Address, TransactionReceipt, TransactionRequest,
    TxHash, U256, U64,
};

use crate::{
    domain::{derive_address, ChainId, DeploySigner, DeploymentState, InitCode, Salt},
    error::{DeployError, DeployResult},
    infrastructure::{client_pool::ChainClientPool, rpc_client::ChainReader},
};

/// 部署交易默认 gas limit
///
/// 部署交易总是带固定 gas 发送：不经过 `eth_estimateGas`，
/// 地址冲突的部署会被打包并以回执状态失败。
pub const DEFAULT_DEPLOY_GAS_LIMIT: u64 = 5_000_000;

/// 回执轮询策略
///
/// 默认值面向本地快速链：100ms 间隔，最多 100 次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    /// 回执尚未出现时的轮询间隔
    pub poll_interval: Duration,
    /// RPC 出错后的重试间隔
    pub retry_delay: Duration,
    /// 最大尝试次数
    pub max_attempts: u32,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            retry_delay: Duration::from_millis(100),
            max_attempts: 100,
        }
    }
}

impl ConfirmationPolicy {
    /// 在尝试预算内轮询回执，预算耗尽返回 `None`
    pub async fn await_receipt(
        &self,
        reader: &dyn ChainReader,
        tx_hash: TxHash,
    ) -> Option<TransactionReceipt> {
        for attempt in 1..=self.max_attempts {
            match reader.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return Some(receipt),
                Ok(None) => {
                    tracing::trace!(tx_hash = ?tx_hash, attempt, "Receipt not available yet");
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        tx_hash = ?tx_hash,
                        attempt,
                        error = %e,
                        "Receipt poll failed"
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        None
    }
}

/// 无上限地等待回执（普通写交易使用）
///
/// RPC 错误直接返回
pub async fn wait_for_receipt(
    reader: &dyn ChainReader,
    tx_hash: TxHash,
    poll_interval: Duration,
) -> anyhow::Result<TransactionReceipt> {
    loop {
        if let Some(receipt) = reader.transaction_receipt(tx_hash).await? {
            return Ok(receipt);
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// 回执状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

impl ReceiptStatus {
    /// 没有 status 字段（拜占庭分叉之前）的回执按成功处理，交由代码检查兜底
    pub fn from_receipt(receipt: &TransactionReceipt) -> Self {
        match receipt.status {
            Some(status) if status.is_zero() => Self::Reverted,
            _ => Self::Success,
        }
    }
}

/// 一次部署的结果
#[derive(Debug, Clone)]
pub struct DeploymentReceipt {
    pub chain_id: ChainId,
    pub address: Address,
    pub tx_hash: TxHash,
    pub status: ReceiptStatus,
    /// 目标地址上是否存在代码
    pub code_present: bool,
    pub gas_used: Option<U256>,
    pub block_number: Option<U64>,
    /// 节点返回的原始回执
    pub receipt: TransactionReceipt,
}

pub struct DeploymentEngine {
    pool: Arc<ChainClientPool>,
    policy: ConfirmationPolicy,
    factory_address: Address,
    gas_limit: u64,
}

impl DeploymentEngine {
    pub fn new(pool: Arc<ChainClientPool>, policy: ConfirmationPolicy, factory_address: Address) -> Self {
        Self {
            pool,
            policy,
            factory_address,
            gas_limit: DEFAULT_DEPLOY_GAS_LIMIT,
        }
    }

    /// 覆盖部署交易的 gas limit，`None` 使用 [`DEFAULT_DEPLOY_GAS_LIMIT`]
    pub fn with_gas_limit(mut self, gas_limit: Option<u64>) -> Self {
        self.gas_limit = gas_limit.unwrap_or(DEFAULT_DEPLOY_GAS_LIMIT);
        self
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    pub fn factory_address(&self) -> Address {
        self.factory_address
    }

    pub fn policy(&self) -> &ConfirmationPolicy {
        &self.policy
    }

    pub fn pool(&self) -> &Arc<ChainClientPool> {
        &self.pool
    }

    /// 推导目标地址（不发起网络请求）
    pub fn derive_address(&self, init_code: &InitCode, salt: &Salt) -> Address {
        derive_address(init_code.as_bytes(), salt, self.factory_address)
    }

    /// 在指定链上部署
    pub async fn deploy(
        &self,
        chain_id: ChainId,
        signer: &DeploySigner,
        init_code: &InitCode,
        salt: &Salt,
    ) -> DeployResult<DeploymentReceipt> {
        let address = self.derive_address(init_code, salt);
        let mut state = DeploymentState::Unsent;

        // 未配置的链在这里失败，不会发起任何网络请求
        let clients = self.pool.get_clients(chain_id, signer).await?;

        let tx: TypedTransaction = TransactionRequest::new()
            .from(signer.address())
            .to(self.factory_address)
            .data(init_code.deployment_payload(salt))
            .value(0)
            .gas(self.gas_limit)
            .into();

        tracing::info!(
            chain_id = chain_id,
            address = ?address,
            salt = %salt,
            init_code_len = init_code.len(),
            gas_limit = self.gas_limit,
            "Submitting deployment transaction"
        );
        let tx_hash = clients.writer.send_transaction(tx).await?;
        transition(&mut state, DeploymentState::Submitted, chain_id, address, tx_hash);

        let receipt = match self
            .policy
            .await_receipt(clients.reader.as_ref(), tx_hash)
            .await
        {
            Some(receipt) => receipt,
            None => {
                transition(&mut state, DeploymentState::Failed, chain_id, address, tx_hash);
                tracing::error!(
                    chain_id = chain_id,
                    address = ?address,
                    tx_hash = ?tx_hash,
                    attempts = self.policy.max_attempts,
                    "Deployment receipt not found within polling budget"
                );
                return Err(DeployError::ConfirmationTimeout {
                    chain_id,
                    address,
                    tx_hash,
                    attempts: self.policy.max_attempts,
                });
            }
        };

        let status = ReceiptStatus::from_receipt(&receipt);
        if status == ReceiptStatus::Reverted {
            transition(&mut state, DeploymentState::Reverted, chain_id, address, tx_hash);
            return Err(DeployError::DeploymentReverted {
                chain_id,
                address,
                tx_hash,
            });
        }

        // 外层交易成功不代表 CREATE2 一定产出了代码
        let code = clients.reader.get_code(address).await?;
        if code.is_empty() {
            transition(&mut state, DeploymentState::Failed, chain_id, address, tx_hash);
            return Err(DeployError::NoCodeAtAddress {
                chain_id,
                address,
                tx_hash,
            });
        }

        transition(&mut state, DeploymentState::Confirmed, chain_id, address, tx_hash);
        Ok(DeploymentReceipt {
            chain_id,
            address,
            tx_hash,
            status,
            code_present: true,
            gas_used: receipt.gas_used,
            block_number: receipt.block_number,
            receipt,
        })
    }
}

fn transition(
    state: &mut DeploymentState,
    next: DeploymentState,
    chain_id: ChainId,
    address: Address,
    tx_hash: TxHash,
) {
    debug_assert!(
        state.can_transition_to(&next),
        "invalid deployment transition {} -> {}",
        state,
        next
    );

    match next {
        DeploymentState::Confirmed | DeploymentState::Submitted => tracing::info!(
            chain_id = chain_id,
            address = ?address,
            tx_hash = ?tx_hash,
            from = %state,
            to = %next,
            "{}",
            next.description()
        ),
        _ => tracing::warn!(
            chain_id = chain_id,
            address = ?address,
            tx_hash = ?tx_hash,
            from = %state,
            to = %next,
            "{}",
            next.description()
        ),
    }
    *state = next;
}
