//! 测试辅助模块
//! 内存链：实现 ChainReader / ChainWriter / ClientFactory，无需本地节点

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use ethers::{
    abi::Abi,
    signers::{LocalWallet, Signer},
    types::{
        transaction::eip2718::TypedTransaction, Address, Block, Bytes, Filter, Log,
        TransactionReceipt, TxHash, ValueOrArray, H256, U256, U64,
    },
    utils::{get_create2_address, keccak256, rlp::Rlp},
};
use xdeploy::{
    domain::{ChainEndpointRegistry, ChainId, DeploySigner, CREATE2_FACTORY_ADDRESS},
    infrastructure::{ChainReader, ChainWriter, ClientFactory, ClientPair},
    service::{ConfirmationPolicy, DeploymentContext},
};

/// anvil 默认账户 0
pub const ANVIL_PRIVATE_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub const CHAIN_A: ChainId = 901;
pub const CHAIN_B: ChainId = 902;

/// 测试合约：constructor(uint256) / x() / setX(uint256) / increment() / event XSet(uint256)
pub const TEST_CONTRACT_ABI: &str = r#"[
  {"type":"constructor","inputs":[{"name":"_initialValue","type":"uint256"}],"stateMutability":"nonpayable"},
  {"type":"function","name":"x","inputs":[],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"},
  {"type":"function","name":"setX","inputs":[{"name":"_x","type":"uint256"}],"outputs":[],"stateMutability":"nonpayable"},
  {"type":"function","name":"increment","inputs":[],"outputs":[],"stateMutability":"nonpayable"},
  {"type":"event","name":"XSet","inputs":[{"name":"value","type":"uint256","indexed":false}],"anonymous":false}
]"#;

pub const TEST_CONTRACT_BYTECODE: &str = "608060405234801561001057600080fd5b5060405161010f38038061010f83398101604081905261002f91610037565b600055610050565b60006020828403121561004957600080fd5b5051919050565b60b18061005e6000396000f3fe6080604052348015600f57600080fd5b506004361060325760003560e01c80630c55699c1460375780634018d9aa146051575b600080fd5b603f60005481565b60405190815260200160405180910390f35b6061605c3660046063565b600055565b005b600060208284031215607457600080fd5b503591905056fea264697066735822122034362d374f123dbd53fa899d12d79e6a4339cc81cc43fca80b3c2faae49f0e5864736f6c63430008130033";

pub fn test_abi() -> Abi {
    serde_json::from_str(TEST_CONTRACT_ABI).expect("valid test ABI")
}

pub fn test_bytecode() -> Vec<u8> {
    hex::decode(TEST_CONTRACT_BYTECODE).expect("valid test bytecode")
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn xset_topic() -> H256 {
    H256(keccak256(b"XSet(uint256)"))
}

/// 单条链的可变状态
#[derive(Default)]
pub struct ChainState {
    pub code: HashMap<Address, Bytes>,
    pub storage_x: HashMap<Address, U256>,
    pub nonces: HashMap<Address, U256>,
    pub receipts: HashMap<TxHash, TransactionReceipt>,
    pub logs: Vec<Log>,
    pub block_number: u64,
    /// send_raw_transaction 接受的 nonce，按顺序记录
    pub sent_nonces: Vec<U256>,
    /// 部署交易携带的 gas limit，按顺序记录
    pub deploy_gas: Vec<Option<U256>>,
}

/// 内存链
pub struct MockChain {
    pub chain_id: ChainId,
    pub state: Mutex<ChainState>,
    /// 所有 RPC 调用次数
    pub rpc_calls: AtomicUsize,
    /// 永远不返回回执
    pub withhold_receipts: bool,
    /// 部署成功但不写入代码
    pub skip_code: bool,
    /// 所有读请求返回传输错误
    pub fail_reads: bool,
    /// eth_getLogs 额外返回一条没有区块号的日志
    pub inject_pending_log: bool,
}

impl MockChain {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            state: Mutex::new(ChainState::default()),
            rpc_calls: AtomicUsize::new(0),
            withhold_receipts: false,
            skip_code: false,
            fail_reads: false,
            inject_pending_log: false,
        }
    }

    pub fn rpc_calls(&self) -> usize {
        self.rpc_calls.load(Ordering::SeqCst)
    }

    pub fn sent_nonces(&self) -> Vec<U256> {
        self.state.lock().unwrap().sent_nonces.clone()
    }

    pub fn deploy_gas(&self) -> Vec<Option<U256>> {
        self.state.lock().unwrap().deploy_gas.clone()
    }

    pub fn has_code(&self, address: Address) -> bool {
        self.state.lock().unwrap().code.contains_key(&address)
    }

    fn touch(&self) {
        self.rpc_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn check_reads(&self) -> anyhow::Result<()> {
        self.touch();
        if self.fail_reads {
            anyhow::bail!("connection refused");
        }
        Ok(())
    }

    /// 出块并记录回执
    fn mine(
        &self,
        state: &mut ChainState,
        tx_hash: TxHash,
        from: Address,
        to: Address,
        success: bool,
        logs: Vec<Log>,
    ) {
        state.block_number += 1;
        let block_number = U64::from(state.block_number);

        let logs: Vec<Log> = logs
            .into_iter()
            .map(|mut log| {
                log.block_number = Some(block_number);
                log.block_hash = Some(H256::from_low_u64_be(state.block_number));
                log.transaction_hash = Some(tx_hash);
                log
            })
            .collect();
        state.logs.extend(logs.iter().cloned());

        let receipt = TransactionReceipt {
            transaction_hash: tx_hash,
            block_number: Some(block_number),
            block_hash: Some(H256::from_low_u64_be(state.block_number)),
            from,
            to: Some(to),
            gas_used: Some(U256::from(50_000u64)),
            status: Some(U64::from(u64::from(success))),
            logs,
            ..Default::default()
        };
        state.receipts.insert(tx_hash, receipt);
    }

    fn bump_nonce(state: &mut ChainState, from: Address) -> U256 {
        let nonce = state.nonces.entry(from).or_default();
        let current = *nonce;
        *nonce = current + U256::one();
        current
    }

    /// 部署合约：salt ‖ init_code → CREATE2
    ///
    /// 未带 gas 的交易先经过节点估算，地址冲突时估算失败，交易不会上链
    fn execute_deploy(&self, from: Address, data: &[u8], gas: Option<U256>) -> anyhow::Result<TxHash> {
        let (salt, init_code) = data.split_at(32.min(data.len()));
        let address = get_create2_address(CREATE2_FACTORY_ADDRESS, salt, init_code);

        let mut state = self.state.lock().unwrap();
        if gas.is_none() && state.code.contains_key(&address) {
            anyhow::bail!("execution reverted");
        }
        state.deploy_gas.push(gas);

        let nonce = Self::bump_nonce(&mut state, from);
        let mut preimage = Vec::with_capacity(36 + data.len());
        preimage.extend_from_slice(from.as_bytes());
        preimage.extend_from_slice(&nonce.as_u64().to_be_bytes());
        preimage.extend_from_slice(&self.chain_id.to_be_bytes());
        preimage.extend_from_slice(data);
        let tx_hash = H256(keccak256(preimage));

        // 地址已有代码时 CREATE2 失败
        let success = !state.code.contains_key(&address);
        if success && !self.skip_code {
            state.code.insert(address, Bytes::from(vec![0x60, 0x80, 0x60, 0x40]));
            let initial = if init_code.len() >= 32 {
                U256::from_big_endian(&init_code[init_code.len() - 32..])
            } else {
                U256::zero()
            };
            state.storage_x.insert(address, initial);
        }

        self.mine(&mut state, tx_hash, from, CREATE2_FACTORY_ADDRESS, success, vec![]);
        if self.withhold_receipts {
            state.receipts.remove(&tx_hash);
        }
        Ok(tx_hash)
    }

    /// 执行已签名的合约调用
    fn execute_raw(&self, raw: &Bytes) -> anyhow::Result<TxHash> {
        let rlp = Rlp::new(raw.as_ref());
        let (tx, signature) = TypedTransaction::decode_signed(&rlp)?;
        let from = signature.recover(tx.sighash())?;
        let to = *tx
            .to_addr()
            .ok_or_else(|| anyhow::anyhow!("contract creation not supported"))?;
        let tx_nonce = *tx.nonce().ok_or_else(|| anyhow::anyhow!("missing nonce"))?;

        let mut state = self.state.lock().unwrap();
        let expected = state.nonces.get(&from).copied().unwrap_or_default();
        if tx_nonce != expected {
            anyhow::bail!("nonce mismatch: expected {}, got {}", expected, tx_nonce);
        }
        Self::bump_nonce(&mut state, from);
        state.sent_nonces.push(tx_nonce);

        let data = tx.data().cloned().unwrap_or_default();
        let mut logs = Vec::new();
        let mut success = state.code.contains_key(&to);
        if success && data.len() >= 4 {
            let current = state.storage_x.get(&to).copied().unwrap_or_default();
            let next = if data[..4] == selector("setX(uint256)") && data.len() >= 36 {
                Some(U256::from_big_endian(&data[4..36]))
            } else if data[..4] == selector("increment()") {
                Some(current + U256::one())
            } else {
                success = false;
                None
            };

            if let Some(value) = next {
                state.storage_x.insert(to, value);
                let mut encoded = [0u8; 32];
                value.to_big_endian(&mut encoded);
                logs.push(Log {
                    address: to,
                    topics: vec![xset_topic()],
                    data: Bytes::from(encoded.to_vec()),
                    ..Default::default()
                });
            }
        }

        let tx_hash = H256(keccak256(raw.as_ref()));
        self.mine(&mut state, tx_hash, from, to, success, logs);
        Ok(tx_hash)
    }
}

pub struct MockReader {
    chain: Arc<MockChain>,
}

#[async_trait]
impl ChainReader for MockReader {
    async fn get_code(&self, address: Address) -> anyhow::Result<Bytes> {
        self.chain.check_reads()?;
        let state = self.chain.state.lock().unwrap();
        Ok(state.code.get(&address).cloned().unwrap_or_default())
    }

    async fn call(&self, tx: &TypedTransaction) -> anyhow::Result<Bytes> {
        self.chain.check_reads()?;
        let state = self.chain.state.lock().unwrap();
        let to = tx
            .to_addr()
            .ok_or_else(|| anyhow::anyhow!("eth_call without target"))?;
        let data = tx.data().cloned().unwrap_or_default();

        if !state.code.contains_key(to) {
            return Ok(Bytes::default());
        }
        if data.len() >= 4 && data[..4] == selector("x()") {
            let mut encoded = [0u8; 32];
            state
                .storage_x
                .get(to)
                .copied()
                .unwrap_or_default()
                .to_big_endian(&mut encoded);
            return Ok(Bytes::from(encoded.to_vec()));
        }
        anyhow::bail!("execution reverted")
    }

    async fn pending_nonce(&self, address: Address) -> anyhow::Result<U256> {
        self.chain.check_reads()?;
        let state = self.chain.state.lock().unwrap();
        Ok(state.nonces.get(&address).copied().unwrap_or_default())
    }

    async fn estimate_gas(&self, _tx: &TypedTransaction) -> anyhow::Result<U256> {
        self.chain.check_reads()?;
        Ok(U256::from(100_000u64))
    }

    async fn gas_price(&self) -> anyhow::Result<U256> {
        self.chain.check_reads()?;
        Ok(U256::from(1_000_000_000u64))
    }

    async fn transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> anyhow::Result<Option<TransactionReceipt>> {
        self.chain.check_reads()?;
        let state = self.chain.state.lock().unwrap();
        Ok(state.receipts.get(&tx_hash).cloned())
    }

    async fn block_number(&self) -> anyhow::Result<U64> {
        self.chain.check_reads()?;
        Ok(U64::from(self.chain.state.lock().unwrap().block_number))
    }

    async fn block(&self, number: U64) -> anyhow::Result<Option<Block<H256>>> {
        self.chain.check_reads()?;
        let state = self.chain.state.lock().unwrap();
        if number.as_u64() > state.block_number {
            return Ok(None);
        }
        Ok(Some(Block {
            number: Some(number),
            hash: Some(H256::from_low_u64_be(number.as_u64())),
            ..Default::default()
        }))
    }

    async fn logs(&self, filter: &Filter) -> anyhow::Result<Vec<Log>> {
        self.chain.check_reads()?;
        let state = self.chain.state.lock().unwrap();
        let from = filter
            .get_from_block()
            .unwrap_or_default();
        let to = filter
            .get_to_block()
            .unwrap_or_else(|| U64::from(state.block_number));

        let matches_address = |address: &Address| match &filter.address {
            Some(ValueOrArray::Value(a)) => a == address,
            Some(ValueOrArray::Array(list)) => list.contains(address),
            None => true,
        };

        let mut logs: Vec<Log> = state
            .logs
            .iter()
            .filter(|log| matches_address(&log.address))
            .filter(|log| {
                log.block_number
                    .map(|n| n >= from && n <= to)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        if self.chain.inject_pending_log {
            if let Some(Some(address)) = filter.address.as_ref().map(|a| match a {
                ValueOrArray::Value(a) => Some(*a),
                ValueOrArray::Array(list) => list.first().copied(),
            }) {
                logs.push(Log {
                    address,
                    topics: vec![xset_topic()],
                    data: Bytes::from(vec![0u8; 32]),
                    block_number: None,
                    ..Default::default()
                });
            }
        }
        Ok(logs)
    }
}

pub struct MockWriter {
    chain: Arc<MockChain>,
    wallet: LocalWallet,
}

#[async_trait]
impl ChainWriter for MockWriter {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn send_transaction(&self, tx: TypedTransaction) -> anyhow::Result<TxHash> {
        self.chain.touch();
        let to = tx
            .to_addr()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("missing target"))?;
        if to != CREATE2_FACTORY_ADDRESS {
            anyhow::bail!("mock chain only executes deployer calls via send_transaction");
        }
        let data = tx.data().cloned().unwrap_or_default();
        self.chain
            .execute_deploy(self.wallet.address(), data.as_ref(), tx.gas().copied())
    }

    async fn sign_transaction(&self, tx: &TypedTransaction) -> anyhow::Result<Bytes> {
        let signature = self.wallet.sign_transaction(tx).await?;
        Ok(tx.rlp_signed(&signature))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> anyhow::Result<TxHash> {
        self.chain.touch();
        self.chain.execute_raw(&raw)
    }
}

/// 记录连接次数的客户端工厂
pub struct MockFactory {
    pub chains: HashMap<ChainId, Arc<MockChain>>,
    pub connects: AtomicUsize,
}

impl MockFactory {
    pub fn new(chains: Vec<MockChain>) -> Self {
        Self {
            chains: chains
                .into_iter()
                .map(|chain| (chain.chain_id, Arc::new(chain)))
                .collect(),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn chain(&self, chain_id: ChainId) -> Arc<MockChain> {
        self.chains[&chain_id].clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn total_rpc_calls(&self) -> usize {
        self.chains.values().map(|c| c.rpc_calls()).sum()
    }
}

impl ClientFactory for MockFactory {
    fn connect(
        &self,
        chain_id: ChainId,
        _url: &str,
        signer: &DeploySigner,
    ) -> anyhow::Result<ClientPair> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let chain = self
            .chains
            .get(&chain_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no mock chain {}", chain_id))?;

        Ok(ClientPair {
            reader: Arc::new(MockReader {
                chain: chain.clone(),
            }),
            writer: Arc::new(MockWriter {
                chain,
                wallet: signer.wallet().clone().with_chain_id(chain_id),
            }),
        })
    }
}

pub fn fast_policy() -> ConfirmationPolicy {
    ConfirmationPolicy {
        poll_interval: Duration::from_millis(1),
        retry_delay: Duration::from_millis(1),
        max_attempts: 100,
    }
}

/// 注册表包含所有内存链
pub fn setup(chains: Vec<MockChain>) -> (DeploymentContext, Arc<MockFactory>) {
    setup_with_policy(chains, fast_policy())
}

pub fn setup_with_policy(
    chains: Vec<MockChain>,
    policy: ConfirmationPolicy,
) -> (DeploymentContext, Arc<MockFactory>) {
    let factory = Arc::new(MockFactory::new(chains));
    let registry = ChainEndpointRegistry::from_urls(
        factory
            .chains
            .keys()
            .map(|id| (*id, format!("http://127.0.0.1:{}", 8545 + *id))),
    )
    .expect("valid registry");
    let ctx = DeploymentContext::with_factory(registry, policy, factory.clone());
    (ctx, factory)
}
