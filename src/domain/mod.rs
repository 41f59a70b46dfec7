//! Domain 模块
//!
//! 纯数据与纯函数：链端点、CREATE2 地址、签名者、部署状态

pub mod address;
pub mod chain_config;
pub mod deployment_status;
pub mod signer;

// 重新导出常用类型
pub use address::{
    derive_address, derive_address_from_hash, InitCode, Salt, CREATE2_FACTORY_ADDRESS,
    DEFAULT_SALT_PASSPHRASE,
};
pub use chain_config::{ChainEndpointRegistry, ChainId, EndpointRecord};
pub use deployment_status::DeploymentState;
pub use signer::{DeploySigner, SignerSource};
