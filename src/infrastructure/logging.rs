//! 日志系统配置模块
//! 结构化日志（json）或文本日志，RUST_LOG 优先于配置的级别

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::LoggingConfig;

/// 初始化日志系统
///
/// 全局订阅者已存在时（测试中重复调用、嵌入到其他程序）直接返回 Ok
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;

    let result = if config.format == "json" {
        Registry::default()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .try_init()
    } else {
        Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true).with_ansi(true))
            .try_init()
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "Global subscriber already set, keeping the existing one");
    }

    Ok(())
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| anyhow::anyhow!("invalid log level {:?}: {}", config.level, e)),
    }
}
