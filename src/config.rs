//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChainEndpointRegistry, ChainId, EndpointRecord, CREATE2_FACTORY_ADDRESS},
    service::deployment_engine::ConfirmationPolicy,
};

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chains: Vec<EndpointRecord>,
    #[serde(default)]
    pub deployer: DeployerConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 部署合约配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployerConfig {
    /// 确定性部署合约地址
    pub factory_address: String,
    /// 部署交易 gas limit，不设置时使用 5,000,000
    #[serde(default)]
    pub gas_limit: Option<u64>,
}

/// 回执轮询配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    pub poll_interval_ms: u64,
    pub retry_delay_ms: u64,
    pub max_attempts: u32,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

/// 解析 `901=http://..,902=http://..`
fn parse_rpc_urls(raw: &str) -> Result<Vec<EndpointRecord>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (chain_id, url) = entry
                .split_once('=')
                .with_context(|| format!("RPC_URLS entry {:?} must be chain_id=url", entry))?;
            let chain_id: ChainId = chain_id
                .trim()
                .parse()
                .with_context(|| format!("invalid chain id in RPC_URLS entry {:?}", entry))?;
            Ok(EndpointRecord::new(chain_id, url.trim()))
        })
        .collect()
}

/// 未设置 RPC_URLS 时没有链；格式错误直接返回错误
fn chains_from(raw: Option<&str>) -> Result<Vec<EndpointRecord>> {
    match raw {
        Some(raw) => parse_rpc_urls(raw),
        None => Ok(Vec::new()),
    }
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            factory_address: std::env::var("CREATE2_FACTORY_ADDRESS")
                .unwrap_or_else(|_| format!("{:?}", CREATE2_FACTORY_ADDRESS)),
            gas_limit: std::env::var("DEPLOY_GAS_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}

impl DeployerConfig {
    pub fn factory_address(&self) -> Result<Address> {
        self.factory_address
            .parse()
            .with_context(|| format!("invalid factory address {:?}", self.factory_address))
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: std::env::var("RECEIPT_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
            retry_delay_ms: std::env::var("RECEIPT_RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
            max_attempts: std::env::var("RECEIPT_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        let chains = chains_from(std::env::var("RPC_URLS").ok().as_deref())?;

        Ok(Self {
            chains,
            deployer: DeployerConfig::default(),
            confirmation: ConfirmationConfig::default(),
            logging: LoggingConfig::default(),
        })
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                let file_config = Self::from_file(path)?;
                // 文件中没有配置链时沿用 RPC_URLS
                let env_chains = std::mem::take(&mut config.chains);
                config = file_config;
                if config.chains.is_empty() {
                    config.chains = env_chains;
                }
            }
        }

        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for record in &self.chains {
            if record.chain_id == 0 {
                anyhow::bail!("chain_id must be a positive integer");
            }
            if !seen.insert(record.chain_id) {
                anyhow::bail!("Chain {} configured more than once", record.chain_id);
            }
            let valid_scheme = ["http://", "https://"]
                .iter()
                .any(|scheme| record.url.starts_with(scheme));
            if !valid_scheme {
                anyhow::bail!(
                    "RPC URL for chain {} must start with http:// or https://",
                    record.chain_id
                );
            }
        }

        self.deployer.factory_address()?;

        if self.confirmation.max_attempts == 0 {
            anyhow::bail!("RECEIPT_MAX_ATTEMPTS must be at least 1");
        }

        // 验证日志级别
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        // 验证日志格式
        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        Ok(())
    }

    /// 构建链端点注册表
    pub fn endpoint_registry(&self) -> Result<ChainEndpointRegistry> {
        Ok(ChainEndpointRegistry::new(self.chains.iter().cloned())?)
    }

    /// 构建回执轮询策略
    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            poll_interval: Duration::from_millis(self.confirmation.poll_interval_ms),
            retry_delay: Duration::from_millis(self.confirmation.retry_delay_ms),
            max_attempts: self.confirmation.max_attempts,
        }
    }
}
