//! 客户端缓存池
//!
//! 按 (chain_id, url, signer) 缓存读写客户端。链 ID 必须先通过注册表校验，
//! 未配置的链在任何客户端构造或网络请求之前就返回错误。

use std::{collections::HashMap, sync::Arc};

use ethers::types::Address;
use tokio::sync::RwLock;

use crate::{
    domain::{ChainEndpointRegistry, ChainId, DeploySigner},
    error::DeployResult,
    infrastructure::rpc_client::{ClientFactory, ClientPair},
};

type ClientKey = (ChainId, String, Address);

pub struct ChainClientPool {
    registry: Arc<ChainEndpointRegistry>,
    factory: Arc<dyn ClientFactory>,
    clients: RwLock<HashMap<ClientKey, ClientPair>>,
}

impl ChainClientPool {
    pub fn new(registry: Arc<ChainEndpointRegistry>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            registry,
            factory,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// 获取（或构造）某条链上某个签名者的客户端
    pub async fn get_clients(
        &self,
        chain_id: ChainId,
        signer: &DeploySigner,
    ) -> DeployResult<ClientPair> {
        let record = self.registry.get(chain_id)?;
        let key = (chain_id, record.url.clone(), signer.address());

        // 读锁快速路径
        {
            let clients = self.clients.read().await;
            if let Some(pair) = clients.get(&key) {
                return Ok(pair.clone());
            }
        }

        let mut clients = self.clients.write().await;
        // 双重检查，避免并发时重复构造
        if let Some(pair) = clients.get(&key) {
            return Ok(pair.clone());
        }

        let pair = self.factory.connect(chain_id, &record.url, signer)?;
        tracing::debug!(
            chain_id = chain_id,
            chain = %record.display_name(),
            signer = ?signer.address(),
            "Created chain clients"
        );
        clients.insert(key, pair.clone());
        Ok(pair)
    }

    pub fn registry(&self) -> &Arc<ChainEndpointRegistry> {
        &self.registry
    }

    /// 已缓存的客户端数量
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}
