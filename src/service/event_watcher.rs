//! 合约事件订阅
//!
//! 后台任务按固定间隔对 [next_block, head] 调用 eth_getLogs，
//! 带区块号的日志补齐所属区块后交给回调；没有区块号的（pending）日志跳过。

use std::{sync::Arc, time::Duration};

use ethers::types::{Address, Block, Filter, Log, H256, U64};
use tokio::{sync::oneshot, task::JoinHandle, time::interval};

use crate::{domain::ChainId, infrastructure::rpc_client::ChainReader};

/// 事件回调，参数为日志和其所在区块
pub type EventCallback = Arc<dyn Fn(Log, Block<H256>) + Send + Sync>;

/// 事件订阅句柄
///
/// 直接 drop 时后台任务继续运行；调用 `unsubscribe` 才会停止投递
pub struct EventSubscription {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl EventSubscription {
    /// 停止投递并等待后台任务退出
    pub async fn unsubscribe(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            tracing::warn!(error = %e, "Event watcher task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

pub(crate) fn spawn_watcher(
    reader: Arc<dyn ChainReader>,
    chain_id: ChainId,
    address: Address,
    from_block: U64,
    poll_interval: Duration,
    callback: EventCallback,
) -> EventSubscription {
    let (stop_tx, mut stop_rx) = oneshot::channel();

    let handle = tokio::spawn(async move {
        tracing::info!(
            chain_id = chain_id,
            address = ?address,
            from_block = %from_block,
            "Event watcher started"
        );

        let mut ticker = interval(poll_interval);
        let mut next_block = from_block;
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {}
            }

            match poll_once(reader.as_ref(), chain_id, address, next_block, &callback).await {
                Ok(next) => next_block = next,
                Err(e) => {
                    tracing::warn!(
                        chain_id = chain_id,
                        address = ?address,
                        next_block = %next_block,
                        error = %e,
                        "Event poll failed"
                    );
                }
            }
        }

        tracing::info!(chain_id = chain_id, address = ?address, "Event watcher stopped");
    });

    EventSubscription {
        stop: Some(stop_tx),
        handle,
    }
}

/// 拉取一轮日志，返回下一轮的起始区块
///
/// 先补齐本轮所有区块再投递：任一区块查询失败时整轮不投递，下一轮从同一起点重试
async fn poll_once(
    reader: &dyn ChainReader,
    chain_id: ChainId,
    address: Address,
    next_block: U64,
    callback: &EventCallback,
) -> anyhow::Result<U64> {
    let head = reader.block_number().await?;
    if head < next_block {
        return Ok(next_block);
    }

    let filter = Filter::new()
        .address(address)
        .from_block(next_block)
        .to_block(head);
    let logs = reader.logs(&filter).await?;

    let mut ready = Vec::with_capacity(logs.len());
    for log in logs {
        let Some(block_number) = log.block_number else {
            tracing::warn!(
                chain_id = chain_id,
                address = ?address,
                tx_hash = ?log.transaction_hash,
                "Skipping log without block number"
            );
            continue;
        };

        match reader.block(block_number).await? {
            Some(block) => ready.push((log, block)),
            None => {
                tracing::warn!(
                    chain_id = chain_id,
                    block_number = %block_number,
                    "Block for log not found, skipping"
                );
            }
        }
    }

    for (log, block) in ready {
        callback(log, block);
    }

    Ok(head + U64::one())
}
