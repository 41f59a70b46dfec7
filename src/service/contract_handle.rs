//! 合约句柄
//!
//! 绑定到一个派生地址的长生命周期对象。地址在构造时计算一次，之后在任意链上的
//! 所有读写、订阅都以它为唯一标识；链 ID 在每次调用时传入。

use std::{collections::BTreeMap, sync::Arc};

use ethers::{
    abi::{Abi, RawLog, Token},
    types::{
        transaction::eip2718::TypedTransaction, Address, Block, Log, TransactionReceipt,
        TransactionRequest, H256, U256, U64,
    },
};

use crate::{
    config::Config,
    domain::{ChainEndpointRegistry, ChainId, DeploySigner, InitCode, Salt, SignerSource},
    error::{DeployError, DeployResult},
    infrastructure::{
        client_pool::ChainClientPool,
        rpc_client::{ClientFactory, EthersClientFactory},
    },
    service::{
        deployment_engine::{wait_for_receipt, ConfirmationPolicy, DeploymentEngine, DeploymentReceipt},
        event_watcher::{spawn_watcher, EventSubscription},
    },
};

/// 共享的部署上下文：注册表、客户端池、部署引擎
///
/// 由调用方的顶层配置持有；多个合约句柄共用同一个上下文即共用同一个客户端池。
#[derive(Clone)]
pub struct DeploymentContext {
    registry: Arc<ChainEndpointRegistry>,
    pool: Arc<ChainClientPool>,
    engine: Arc<DeploymentEngine>,
    policy: ConfirmationPolicy,
}

impl DeploymentContext {
    /// 使用 ethers HTTP 客户端
    pub fn new(registry: ChainEndpointRegistry, policy: ConfirmationPolicy) -> Self {
        Self::with_factory(
            registry,
            policy,
            Arc::new(EthersClientFactory::new(policy.poll_interval)),
        )
    }

    /// 使用自定义客户端工厂
    pub fn with_factory(
        registry: ChainEndpointRegistry,
        policy: ConfirmationPolicy,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        let registry = Arc::new(registry);
        let pool = Arc::new(ChainClientPool::new(registry.clone(), factory));
        let engine = Arc::new(DeploymentEngine::new(
            pool.clone(),
            policy,
            crate::domain::CREATE2_FACTORY_ADDRESS,
        ));
        Self {
            registry,
            pool,
            engine,
            policy,
        }
    }

    /// 替换部署合约地址和固定 gas limit
    pub fn with_deployer(mut self, factory_address: Address, gas_limit: Option<u64>) -> Self {
        self.engine = Arc::new(
            DeploymentEngine::new(self.pool.clone(), self.policy, factory_address)
                .with_gas_limit(gas_limit),
        );
        self
    }

    /// 从应用配置构建
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;
        let registry = config.endpoint_registry()?;
        let policy = config.confirmation_policy();
        Ok(Self::new(registry, policy)
            .with_deployer(config.deployer.factory_address()?, config.deployer.gas_limit))
    }

    /// 创建可部署的合约句柄
    pub fn contract(
        &self,
        signer: impl Into<SignerSource>,
        abi: Abi,
        bytecode: &[u8],
        constructor_args: &[Token],
        salt: Option<Salt>,
    ) -> DeployResult<ContractHandle> {
        ContractHandle::new(self.clone(), signer, abi, bytecode, constructor_args, salt)
    }

    pub fn registry(&self) -> &Arc<ChainEndpointRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<ChainClientPool> {
        &self.pool
    }

    pub fn engine(&self) -> &Arc<DeploymentEngine> {
        &self.engine
    }

    pub fn policy(&self) -> &ConfirmationPolicy {
        &self.policy
    }
}

/// 合约句柄
pub struct ContractHandle {
    ctx: DeploymentContext,
    signer: DeploySigner,
    abi: Abi,
    /// attach 得到的句柄没有 init code
    init_code: Option<InitCode>,
    salt: Option<Salt>,
    address: Address,
}

impl ContractHandle {
    /// 构造句柄并计算派生地址；不发起网络请求
    pub fn new(
        ctx: DeploymentContext,
        signer: impl Into<SignerSource>,
        abi: Abi,
        bytecode: &[u8],
        constructor_args: &[Token],
        salt: Option<Salt>,
    ) -> DeployResult<Self> {
        let signer = DeploySigner::new(signer)?;
        let init_code = InitCode::encode(&abi, bytecode, constructor_args)?;
        let salt = salt.unwrap_or_default();
        if salt.is_default() {
            tracing::warn!(
                salt = %salt,
                "Using the default salt; deploying a different contract image needs a fresh salt"
            );
        }

        let address = ctx.engine.derive_address(&init_code, &salt);
        tracing::debug!(address = ?address, salt = %salt, "Contract handle created");

        Ok(Self {
            ctx,
            signer,
            abi,
            init_code: Some(init_code),
            salt: Some(salt),
            address,
        })
    }

    /// 绑定到已知地址的合约（例如预部署合约），不可再部署
    pub fn attach(
        ctx: DeploymentContext,
        signer: impl Into<SignerSource>,
        abi: Abi,
        address: Address,
    ) -> DeployResult<Self> {
        Ok(Self {
            ctx,
            signer: DeploySigner::new(signer)?,
            abi,
            init_code: None,
            salt: None,
            address,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn salt(&self) -> Option<&Salt> {
        self.salt.as_ref()
    }

    pub fn init_code(&self) -> Option<&InitCode> {
        self.init_code.as_ref()
    }

    pub fn signer(&self) -> &DeploySigner {
        &self.signer
    }

    pub fn abi(&self) -> &Abi {
        &self.abi
    }

    /// 在指定链上部署
    pub async fn deploy(&self, chain_id: ChainId) -> DeployResult<DeploymentReceipt> {
        let (Some(init_code), Some(salt)) = (&self.init_code, &self.salt) else {
            return Err(DeployError::NotDeployable {
                address: self.address,
            });
        };
        self.ctx
            .engine
            .deploy(chain_id, &self.signer, init_code, salt)
            .await
    }

    /// 按链 ID 升序部署到所有已配置的链；已有代码的链跳过（结果为 `Ok(None)`）
    ///
    /// 某条链失败不影响其他链
    pub async fn deploy_all(&self) -> BTreeMap<ChainId, DeployResult<Option<DeploymentReceipt>>> {
        let mut outcomes = BTreeMap::new();
        for chain_id in self.ctx.registry.chain_ids() {
            if self.is_deployed(chain_id).await {
                tracing::info!(
                    chain_id = chain_id,
                    address = ?self.address,
                    "Contract already deployed, skipping"
                );
                outcomes.insert(chain_id, Ok(None));
                continue;
            }

            let outcome = self.deploy(chain_id).await.map(Some);
            if let Err(e) = &outcome {
                tracing::error!(chain_id = chain_id, address = ?self.address, error = %e, "Deployment failed");
            }
            outcomes.insert(chain_id, outcome);
        }
        outcomes
    }

    /// 目标地址上是否已有代码
    ///
    /// 任何错误（包括链未配置）都记为 false，不向上抛出
    pub async fn is_deployed(&self, chain_id: ChainId) -> bool {
        let clients = match self.ctx.pool.get_clients(chain_id, &self.signer).await {
            Ok(clients) => clients,
            Err(e) => {
                tracing::warn!(chain_id = chain_id, address = ?self.address, error = %e, "isDeployed check failed");
                return false;
            }
        };

        match clients.reader.get_code(self.address).await {
            Ok(code) => !code.is_empty(),
            Err(e) => {
                tracing::warn!(chain_id = chain_id, address = ?self.address, error = %e, "isDeployed check failed");
                false
            }
        }
    }

    /// 只读调用
    pub async fn call(
        &self,
        chain_id: ChainId,
        function: &str,
        args: &[Token],
    ) -> DeployResult<Vec<Token>> {
        let function = self.abi.function(function)?;
        let data = function.encode_input(args)?;
        let clients = self.ctx.pool.get_clients(chain_id, &self.signer).await?;

        let tx: TypedTransaction = TransactionRequest::new()
            .from(self.signer.address())
            .to(self.address)
            .data(data)
            .into();
        let output = clients.reader.call(&tx).await?;
        Ok(function.decode_output(&output)?)
    }

    /// 写交易：pending nonce → 估算 gas → gas price → 签名 → 发送 → 等待回执
    ///
    /// 同一签名者在同一条链上的并发写入需要调用方自行串行化
    pub async fn send_tx(
        &self,
        chain_id: ChainId,
        function: &str,
        args: &[Token],
        value: U256,
    ) -> DeployResult<TransactionReceipt> {
        let data = self.abi.function(function)?.encode_input(args)?;
        let clients = self.ctx.pool.get_clients(chain_id, &self.signer).await?;
        let from = self.signer.address();

        let nonce = clients.reader.pending_nonce(from).await?;
        let mut tx: TypedTransaction = TransactionRequest::new()
            .from(from)
            .to(self.address)
            .data(data)
            .value(value)
            .nonce(nonce)
            .chain_id(chain_id)
            .into();
        let gas = clients.reader.estimate_gas(&tx).await?;
        tx.set_gas(gas);
        let gas_price = clients.reader.gas_price().await?;
        tx.set_gas_price(gas_price);

        let raw = clients.writer.sign_transaction(&tx).await?;
        let tx_hash = clients.writer.send_raw_transaction(raw).await?;
        tracing::info!(
            chain_id = chain_id,
            address = ?self.address,
            function = function,
            nonce = %nonce,
            tx_hash = ?tx_hash,
            "Transaction submitted"
        );

        let receipt =
            wait_for_receipt(clients.reader.as_ref(), tx_hash, self.ctx.policy.poll_interval).await?;
        if matches!(receipt.status, Some(status) if status.is_zero()) {
            tracing::warn!(chain_id = chain_id, tx_hash = ?tx_hash, function = function, "Transaction reverted");
        }
        Ok(receipt)
    }

    /// 订阅合约事件
    ///
    /// 返回的句柄需要调用 `unsubscribe` 才会停止后台轮询
    pub async fn watch_events<F>(
        &self,
        chain_id: ChainId,
        from_block: U64,
        callback: F,
    ) -> DeployResult<EventSubscription>
    where
        F: Fn(Log, Block<H256>) + Send + Sync + 'static,
    {
        let clients = self.ctx.pool.get_clients(chain_id, &self.signer).await?;
        Ok(spawn_watcher(
            clients.reader,
            chain_id,
            self.address,
            from_block,
            self.ctx.policy.poll_interval,
            Arc::new(callback),
        ))
    }

    /// 按第一个 topic 匹配 ABI 中的事件并解码
    pub fn decode_event(&self, log: &Log) -> DeployResult<ethers::abi::Log> {
        let topic0 = log.topics.first().ok_or_else(|| {
            DeployError::Abi(ethers::abi::Error::Other("log has no topics".into()))
        })?;
        let event = self
            .abi
            .events()
            .find(|event| event.signature() == *topic0)
            .ok_or_else(|| {
                DeployError::Abi(ethers::abi::Error::Other(
                    format!("no event in ABI matches topic {:?}", topic0).into(),
                ))
            })?;

        Ok(event.parse_log(RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        })?)
    }
}

impl std::fmt::Debug for ContractHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractHandle")
            .field("address", &self.address)
            .field("salt", &self.salt)
            .field("signer", &self.signer)
            .field("deployable", &self.init_code.is_some())
            .finish()
    }
}
