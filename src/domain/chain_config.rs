//! 链端点注册表
//!
//! 链 ID → RPC 端点的映射；这是链 ID 唯一的校验点，
//! 通过校验的链 ID 在下游组件中被直接信任。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, DeployResult};

/// 链 ID（EIP-155，正整数）
pub type ChainId = u64;

/// 单条链端点记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub chain_id: ChainId,
    /// RPC 端点
    pub url: String,
    /// 链名称（可选，仅用于日志展示）
    #[serde(default)]
    pub name: Option<String>,
}

impl EndpointRecord {
    pub fn new(chain_id: ChainId, url: impl Into<String>) -> Self {
        Self {
            chain_id,
            url: url.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 展示名称，未配置时回退为 "Chain {id}"
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Chain {}", self.chain_id))
    }
}

/// 链端点注册表（构造后不可变）
#[derive(Debug, Clone, Default)]
pub struct ChainEndpointRegistry {
    endpoints: BTreeMap<ChainId, EndpointRecord>,
}

impl ChainEndpointRegistry {
    /// 从记录列表构建注册表
    ///
    /// 拒绝 chain_id 为 0、URL 为空以及重复的 chain_id
    pub fn new(records: impl IntoIterator<Item = EndpointRecord>) -> DeployResult<Self> {
        let mut endpoints = BTreeMap::new();
        for record in records {
            if record.chain_id == 0 {
                return Err(DeployError::InvalidConfig(
                    "chain_id must be a positive integer".into(),
                ));
            }
            if record.url.trim().is_empty() {
                return Err(DeployError::InvalidConfig(format!(
                    "Chain {} has empty RPC URL",
                    record.chain_id
                )));
            }
            let chain_id = record.chain_id;
            if endpoints.insert(chain_id, record).is_some() {
                return Err(DeployError::InvalidConfig(format!(
                    "Chain {} configured more than once",
                    chain_id
                )));
            }
        }
        Ok(Self { endpoints })
    }

    /// 从 (chain_id, url) 映射构建
    pub fn from_urls<I, S>(urls: I) -> DeployResult<Self>
    where
        I: IntoIterator<Item = (ChainId, S)>,
        S: Into<String>,
    {
        Self::new(
            urls.into_iter()
                .map(|(chain_id, url)| EndpointRecord::new(chain_id, url)),
        )
    }

    /// 获取 RPC URL
    pub fn get_url(&self, chain_id: ChainId) -> DeployResult<&str> {
        self.get(chain_id).map(|record| record.url.as_str())
    }

    /// 获取完整端点记录
    pub fn get(&self, chain_id: ChainId) -> DeployResult<&EndpointRecord> {
        self.endpoints
            .get(&chain_id)
            .ok_or(DeployError::ChainNotConfigured { chain_id })
    }

    /// 所有已配置的链 ID（升序）
    pub fn chain_ids(&self) -> Vec<ChainId> {
        self.endpoints.keys().copied().collect()
    }

    pub fn contains(&self, chain_id: ChainId) -> bool {
        self.endpoints.contains_key(&chain_id)
    }

    pub fn records(&self) -> impl Iterator<Item = &EndpointRecord> {
        self.endpoints.values()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
