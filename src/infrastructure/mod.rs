//! 基础设施层：RPC 客户端、客户端缓存池、日志

pub mod client_pool;
pub mod logging;
pub mod rpc_client;

pub use client_pool::ChainClientPool;
pub use rpc_client::{
    ChainReader, ChainWriter, ClientFactory, ClientPair, EthersClientFactory, EthersReader,
    EthersWriter,
};
