//! 部署签名者
//!
//! 调用方可以传入已构建的钱包，也可以传入原始私钥字符串；
//! 两种形式在构造时统一归一化为 `LocalWallet`，之后只有一条代码路径。

use std::fmt;

use ethers::{
    signers::{LocalWallet, Signer},
    types::Address,
};

use crate::error::{DeployError, DeployResult};

/// 签名者来源
#[derive(Clone)]
pub enum SignerSource {
    Wallet(LocalWallet),
    /// 十六进制私钥，可带 0x 前缀
    PrivateKey(String),
}

impl From<LocalWallet> for SignerSource {
    fn from(wallet: LocalWallet) -> Self {
        Self::Wallet(wallet)
    }
}

impl From<String> for SignerSource {
    fn from(key: String) -> Self {
        Self::PrivateKey(key)
    }
}

impl From<&str> for SignerSource {
    fn from(key: &str) -> Self {
        Self::PrivateKey(key.to_string())
    }
}

impl fmt::Debug for SignerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wallet(wallet) => f.debug_tuple("Wallet").field(&wallet.address()).finish(),
            Self::PrivateKey(_) => f.write_str("PrivateKey(***)"),
        }
    }
}

/// 归一化后的签名者
///
/// 链 ID 不绑定在签名者上，由每次调用的目标链决定。
#[derive(Clone)]
pub struct DeploySigner {
    wallet: LocalWallet,
}

impl DeploySigner {
    pub fn new(source: impl Into<SignerSource>) -> DeployResult<Self> {
        let wallet = match source.into() {
            SignerSource::Wallet(wallet) => wallet,
            SignerSource::PrivateKey(key) => {
                let trimmed = key.trim();
                let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
                digits
                    .parse::<LocalWallet>()
                    .map_err(|e| DeployError::InvalidSigner(e.to_string()))?
            }
        };
        Ok(Self { wallet })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn wallet(&self) -> &LocalWallet {
        &self.wallet
    }
}

impl fmt::Debug for DeploySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploySigner")
            .field("address", &self.address())
            .finish()
    }
}
