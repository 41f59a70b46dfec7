//! 服务层：部署引擎、合约句柄、事件订阅

pub mod contract_handle;
pub mod deployment_engine;
pub mod event_watcher;

pub use contract_handle::{ContractHandle, DeploymentContext};
pub use deployment_engine::{
    ConfirmationPolicy, DeploymentEngine, DeploymentReceipt, ReceiptStatus,
};
pub use event_watcher::{EventCallback, EventSubscription};
