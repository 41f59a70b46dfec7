//! xdeploy 主入口
//! 把一个合约以同一地址部署到所有已配置的链

use anyhow::{Context, Result};
use ethers::abi::{
    token::{LenientTokenizer, Tokenizer},
    Abi, Token,
};
use serde::Deserialize;
use xdeploy::{
    config::Config,
    domain::Salt,
    infrastructure::logging::init_logging,
    service::DeploymentContext,
};

/// 编译产物：`abi` + `bytecode`（字符串或 `{ "object": .. }`）
#[derive(Debug, Deserialize)]
struct Artifact {
    abi: Abi,
    bytecode: Bytecode,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Bytecode {
    Hex(String),
    Object { object: String },
}

impl Bytecode {
    fn decode(&self) -> Result<Vec<u8>> {
        let raw = match self {
            Self::Hex(s) => s,
            Self::Object { object } => object,
        };
        hex::decode(raw.trim().trim_start_matches("0x")).context("artifact bytecode is not valid hex")
    }
}

fn load_artifact(path: &str) -> Result<Artifact> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read artifact: {}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse artifact: {}", path))
}

/// CONSTRUCTOR_ARGS 为字符串数组，按构造函数参数类型逐个解析
fn parse_constructor_args(abi: &Abi, raw: Option<String>) -> Result<Vec<Token>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let values: Vec<String> =
        serde_json::from_str(&raw).context("CONSTRUCTOR_ARGS must be a JSON array of strings")?;
    let inputs = abi
        .constructor()
        .map(|c| c.inputs.as_slice())
        .unwrap_or_default();
    if inputs.len() != values.len() {
        anyhow::bail!(
            "constructor takes {} arguments, CONSTRUCTOR_ARGS has {}",
            inputs.len(),
            values.len()
        );
    }

    inputs
        .iter()
        .zip(values.iter())
        .map(|(param, value)| {
            LenientTokenizer::tokenize(&param.kind, value)
                .with_context(|| format!("invalid value {:?} for {}", value, param.name))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载环境变量
    dotenvy::dotenv().ok();

    // 2. 加载配置
    let config_path = std::env::var("CONFIG_PATH").ok();
    let config = Config::from_env_and_file(config_path.as_deref())?;
    config.validate()?;

    // 3. 初始化日志
    init_logging(&config.logging)?;

    let ctx = DeploymentContext::from_config(&config)?;
    if ctx.registry().is_empty() {
        anyhow::bail!("No chains configured (set RPC_URLS or CONFIG_PATH)");
    }

    // 4. 构建合约句柄
    let artifact_path = std::env::var("ARTIFACT_PATH").context("ARTIFACT_PATH must be set")?;
    let artifact = load_artifact(&artifact_path)?;
    let bytecode = artifact.bytecode.decode()?;
    let args = parse_constructor_args(&artifact.abi, std::env::var("CONSTRUCTOR_ARGS").ok())?;
    let salt = std::env::var("SALT")
        .ok()
        .map(|s| s.parse::<Salt>())
        .transpose()?;
    let private_key = std::env::var("PRIVATE_KEY").context("PRIVATE_KEY must be set")?;

    let handle = ctx.contract(private_key, artifact.abi, &bytecode, &args, salt)?;
    println!("address: {:?}", handle.address());

    // 5. 部署到所有链
    let mut failed = 0usize;
    for (chain_id, outcome) in handle.deploy_all().await {
        match outcome {
            Ok(Some(receipt)) => println!(
                "chain {}: deployed in tx {:?} (gas used {:?})",
                chain_id, receipt.tx_hash, receipt.gas_used
            ),
            Ok(None) => println!("chain {}: already deployed", chain_id),
            Err(e) => {
                failed += 1;
                eprintln!("chain {}: {}", chain_id, e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("deployment failed on {} chain(s)", failed);
    }
    Ok(())
}
