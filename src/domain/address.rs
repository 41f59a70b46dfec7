//! CREATE2 地址推导
//!
//! address = keccak256(0xff ‖ deployer ‖ salt ‖ keccak256(init_code))[12..]
//!
//! 纯函数，不依赖链 ID、发送者和 nonce；必须与链上部署合约的计算逐位一致。

use std::{fmt, str::FromStr};

use ethers::{
    abi::{Abi, Token},
    types::{Address, Bytes, H160, H256},
    utils::keccak256,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{DeployError, DeployResult};

/// 确定性部署合约地址（0x4e59b44847b379578588920cA78FbF26c0B4956C）
///
/// 假设在每条目标链上都已预先部署，调用约定为 `salt(32 字节) ‖ init_code`。
pub const CREATE2_FACTORY_ADDRESS: Address = H160([
    0x4e, 0x59, 0xb4, 0x48, 0x47, 0xb3, 0x79, 0x57, 0x85, 0x88, 0x92, 0x0c, 0xa7, 0x8f, 0xbf, 0x26,
    0xc0, 0xb4, 0x95, 0x6c,
]);

/// 默认 salt 的口令
pub const DEFAULT_SALT_PASSPHRASE: &str = "my_salt";

/// 默认 salt：16 个零字节 ‖ keccak256("my_salt") 的前 16 字节
static DEFAULT_SALT: Lazy<Salt> = Lazy::new(|| {
    let hash = keccak256(DEFAULT_SALT_PASSPHRASE.as_bytes());
    let mut bytes = [0u8; 32];
    bytes[16..].copy_from_slice(&hash[..16]);
    Salt(H256(bytes))
});

/// 32 字节 CREATE2 salt
///
/// 同一个逻辑合约在所有目标链上必须使用同一个 salt。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Salt(H256);

impl Salt {
    pub const fn new(value: H256) -> Self {
        Self(value)
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(H256(bytes))
    }

    /// 低位放整数，便于测试和顺序生成
    pub fn from_low_u64(value: u64) -> Self {
        Self(H256::from_low_u64_be(value))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_fixed_bytes()
    }

    pub fn into_inner(self) -> H256 {
        self.0
    }

    /// 是否为默认 salt
    pub fn is_default(&self) -> bool {
        *self == *DEFAULT_SALT
    }
}

/// 默认 salt
///
/// 注意：不显式指定 salt 时，同样的 init code 会落到同一个地址；
/// 用默认 salt 部署不同的合约镜像是调用方的问题，需要换一个新 salt。
impl Default for Salt {
    fn default() -> Self {
        *DEFAULT_SALT
    }
}

impl FromStr for Salt {
    type Err = DeployError;

    /// 接受 0x 前缀的十六进制，不足 32 字节时左侧补零
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if digits.is_empty() {
            return Err(DeployError::InvalidSalt("empty salt".into()));
        }

        let padded = if digits.len() % 2 == 1 {
            format!("0{}", digits)
        } else {
            digits.to_string()
        };
        let decoded = hex::decode(&padded)
            .map_err(|e| DeployError::InvalidSalt(format!("{}: {}", s, e)))?;
        if decoded.len() > 32 {
            return Err(DeployError::InvalidSalt(format!(
                "salt is {} bytes, at most 32 allowed",
                decoded.len()
            )));
        }

        let mut bytes = [0u8; 32];
        bytes[32 - decoded.len()..].copy_from_slice(&decoded);
        Ok(Self::from_bytes(bytes))
    }
}

impl fmt::Display for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.as_bytes()))
    }
}

impl From<H256> for Salt {
    fn from(value: H256) -> Self {
        Self(value)
    }
}

/// 部署用 init code：合约字节码 ‖ ABI 编码的构造参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitCode(Bytes);

impl InitCode {
    /// 已经拼好构造参数的 init code
    pub fn new(code: impl Into<Bytes>) -> Self {
        Self(code.into())
    }

    /// 根据 ABI 的构造函数编码参数并拼接到字节码之后
    pub fn encode(abi: &Abi, bytecode: &[u8], args: &[Token]) -> DeployResult<Self> {
        match abi.constructor() {
            Some(constructor) => {
                let code = constructor.encode_input(bytecode.to_vec(), args)?;
                Ok(Self(code.into()))
            }
            None if args.is_empty() => Ok(Self(Bytes::from(bytecode.to_vec()))),
            None => Err(DeployError::Abi(ethers::abi::Error::Other(
                "constructor arguments supplied but the ABI has no constructor".into(),
            ))),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// keccak256(init_code)
    pub fn hash(&self) -> H256 {
        H256(keccak256(self.as_bytes()))
    }

    /// 发往部署合约的 calldata：salt ‖ init_code
    pub fn deployment_payload(&self, salt: &Salt) -> Bytes {
        let mut data = Vec::with_capacity(32 + self.len());
        data.extend_from_slice(salt.as_bytes());
        data.extend_from_slice(self.as_bytes());
        data.into()
    }
}

/// 推导 CREATE2 地址
pub fn derive_address(init_code: &[u8], salt: &Salt, deployer: Address) -> Address {
    derive_address_from_hash(H256(keccak256(init_code)), salt, deployer)
}

/// 已知 init code 哈希时推导 CREATE2 地址
pub fn derive_address_from_hash(init_code_hash: H256, salt: &Salt, deployer: Address) -> Address {
    let mut preimage = [0u8; 85];
    preimage[0] = 0xff;
    preimage[1..21].copy_from_slice(deployer.as_bytes());
    preimage[21..53].copy_from_slice(salt.as_bytes());
    preimage[53..85].copy_from_slice(init_code_hash.as_bytes());

    Address::from_slice(&keccak256(preimage)[12..])
}
