//! 配置管理
//!
//! 配置文件（TOML）提供默认值，命令行参数优先。
//!
//! ```toml
//! port = "/dev/ttyUSB0"
//! interval = 1.5
//! cmdver = 2
//! baud_rate = 9600
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use somfy_rts::ProtocolVersion;
use somfy_rts::driver::{DEFAULT_INTERVAL, interval_from_secs};
use somfy_rts::transport::DEFAULT_BAUD_RATE;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 默认配置文件路径：`<config_dir>/somfy/config.toml`
pub fn default_config_file() -> Option<PathBuf> {
    let mut path = dirs::config_dir()?;
    path.push("somfy");
    path.push("config.toml");
    Some(path)
}

/// CLI 配置（所有字段可选）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// 串口路径或 `TEST`
    pub port: Option<String>,

    /// 命令间隔（秒）
    pub interval: Option<f64>,

    /// 控制器协议版本（1 或 2）
    pub cmdver: Option<u8>,

    /// 串口波特率
    pub baud_rate: Option<u32>,
}

impl CliConfig {
    /// 加载配置
    ///
    /// 显式指定的文件必须存在；默认路径不存在时返回空配置。
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_config_file() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        tracing::debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 以 `self` 为准，缺失的字段从 `fallback` 补齐
    pub fn or(self, fallback: CliConfig) -> CliConfig {
        CliConfig {
            port: self.port.or(fallback.port),
            interval: self.interval.or(fallback.interval),
            cmdver: self.cmdver.or(fallback.cmdver),
            baud_rate: self.baud_rate.or(fallback.baud_rate),
        }
    }
}

/// 合并并校验后的运行参数
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub port: String,
    pub interval: Duration,
    pub version: ProtocolVersion,
    pub baud_rate: u32,
}

impl TryFrom<CliConfig> for Settings {
    type Error = anyhow::Error;

    fn try_from(config: CliConfig) -> Result<Self> {
        let port = config
            .port
            .context("No port given: pass <PORT> or set `port` in the config file")?;
        let interval = match config.interval {
            Some(secs) => interval_from_secs(secs)?,
            None => DEFAULT_INTERVAL,
        };
        let version = ProtocolVersion::from_number(config.cmdver.unwrap_or(1))?;

        Ok(Self {
            port,
            interval,
            version,
            baud_rate: config.baud_rate.unwrap_or(DEFAULT_BAUD_RATE),
        })
    }
}
