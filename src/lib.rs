//! xdeploy - 跨链确定性合约部署
//!
//! 通过 CREATE2 部署合约，同一份 init code 和 salt 在所有链上得到同一个地址；
//! 部署后通过同一个合约句柄在任意已配置链上读写和订阅事件。

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod service;

// 重新导出常用类型
pub use error::{DeployError, DeployResult};

pub mod prelude {
    pub use crate::{
        config::Config,
        domain::{
            derive_address, ChainEndpointRegistry, ChainId, DeploySigner, EndpointRecord,
            InitCode, Salt, SignerSource, CREATE2_FACTORY_ADDRESS,
        },
        error::{DeployError, DeployResult},
        service::{
            ConfirmationPolicy, ContractHandle, DeploymentContext, DeploymentReceipt,
            EventSubscription, ReceiptStatus,
        },
    };
}
