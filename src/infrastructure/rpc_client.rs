//! 链客户端
//!
//! 读写两侧各是一个 trait：`ChainReader` 只做查询，`ChainWriter` 绑定签名者并负责发送交易。
//! 生产实现基于 ethers `Provider<Http>` / `SignerMiddleware`，测试可以替换为内存链。

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{
        transaction::eip2718::TypedTransaction, Address, Block, BlockNumber, Bytes, Filter, Log,
        TransactionReceipt, TxHash, H256, U256, U64,
    },
};

use crate::domain::{ChainId, DeploySigner};

/// 只读 RPC 接口
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn get_code(&self, address: Address) -> Result<Bytes>;

    /// eth_call
    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes>;

    /// 包含 pending 交易的 nonce
    async fn pending_nonce(&self, address: Address) -> Result<U256>;

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256>;

    async fn gas_price(&self) -> Result<U256>;

    /// 回执尚不可用时返回 `Ok(None)`
    async fn transaction_receipt(&self, tx_hash: TxHash) -> Result<Option<TransactionReceipt>>;

    async fn block_number(&self) -> Result<U64>;

    async fn block(&self, number: U64) -> Result<Option<Block<H256>>>;

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>>;
}

/// 绑定签名者的写接口
#[async_trait]
pub trait ChainWriter: Send + Sync {
    /// 签名者地址
    fn address(&self) -> Address;

    /// 自动填充 nonce / gas / gas price 后签名并发送
    async fn send_transaction(&self, tx: TypedTransaction) -> Result<TxHash>;

    /// 本地签名，返回 RLP 编码的已签名交易
    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<Bytes>;

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<TxHash>;
}

/// 同一条链、同一个签名者的一对读写客户端
#[derive(Clone)]
pub struct ClientPair {
    pub reader: Arc<dyn ChainReader>,
    pub writer: Arc<dyn ChainWriter>,
}

/// 客户端工厂
///
/// 只构造客户端，不做任何网络请求。
pub trait ClientFactory: Send + Sync {
    fn connect(&self, chain_id: ChainId, url: &str, signer: &DeploySigner) -> Result<ClientPair>;
}

/// 基于 ethers HTTP Provider 的只读客户端
#[derive(Clone)]
pub struct EthersReader {
    provider: Provider<Http>,
}

impl EthersReader {
    pub fn new(provider: Provider<Http>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ChainReader for EthersReader {
    async fn get_code(&self, address: Address) -> Result<Bytes> {
        self.provider
            .get_code(address, None)
            .await
            .with_context(|| format!("eth_getCode failed for {:?}", address))
    }

    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes> {
        self.provider.call(tx, None).await.context("eth_call failed")
    }

    async fn pending_nonce(&self, address: Address) -> Result<U256> {
        self.provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .with_context(|| format!("eth_getTransactionCount failed for {:?}", address))
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256> {
        self.provider
            .estimate_gas(tx, None)
            .await
            .context("eth_estimateGas failed")
    }

    async fn gas_price(&self) -> Result<U256> {
        self.provider
            .get_gas_price()
            .await
            .context("eth_gasPrice failed")
    }

    async fn transaction_receipt(&self, tx_hash: TxHash) -> Result<Option<TransactionReceipt>> {
        self.provider
            .get_transaction_receipt(tx_hash)
            .await
            .with_context(|| format!("eth_getTransactionReceipt failed for {:?}", tx_hash))
    }

    async fn block_number(&self) -> Result<U64> {
        self.provider
            .get_block_number()
            .await
            .context("eth_blockNumber failed")
    }

    async fn block(&self, number: U64) -> Result<Option<Block<H256>>> {
        self.provider
            .get_block(BlockNumber::Number(number))
            .await
            .with_context(|| format!("eth_getBlockByNumber failed for {}", number))
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        self.provider.get_logs(filter).await.context("eth_getLogs failed")
    }
}

/// 基于 ethers SignerMiddleware 的写客户端
pub struct EthersWriter {
    client: SignerMiddleware<Provider<Http>, LocalWallet>,
    wallet: LocalWallet,
}

impl EthersWriter {
    pub fn new(provider: Provider<Http>, wallet: LocalWallet, chain_id: ChainId) -> Self {
        let wallet = wallet.with_chain_id(chain_id);
        Self {
            client: SignerMiddleware::new(provider, wallet.clone()),
            wallet,
        }
    }
}

#[async_trait]
impl ChainWriter for EthersWriter {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn send_transaction(&self, tx: TypedTransaction) -> Result<TxHash> {
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .context("failed to send transaction")?;
        Ok(pending.tx_hash())
    }

    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<Bytes> {
        let signature = self
            .wallet
            .sign_transaction(tx)
            .await
            .context("failed to sign transaction")?;
        Ok(tx.rlp_signed(&signature))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<TxHash> {
        let pending = self
            .client
            .inner()
            .send_raw_transaction(raw)
            .await
            .context("eth_sendRawTransaction failed")?;
        Ok(pending.tx_hash())
    }
}

/// 生产环境客户端工厂
#[derive(Debug, Clone)]
pub struct EthersClientFactory {
    poll_interval: Duration,
}

impl EthersClientFactory {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Default for EthersClientFactory {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl ClientFactory for EthersClientFactory {
    fn connect(&self, chain_id: ChainId, url: &str, signer: &DeploySigner) -> Result<ClientPair> {
        let provider = Provider::<Http>::try_from(url)
            .with_context(|| format!("invalid RPC URL for chain {}: {}", chain_id, url))?
            .interval(self.poll_interval);

        Ok(ClientPair {
            reader: Arc::new(EthersReader::new(provider.clone())),
            writer: Arc::new(EthersWriter::new(
                provider,
                signer.wallet().clone(),
                chain_id,
            )),
        })
    }
}
