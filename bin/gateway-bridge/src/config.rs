use anyhow::{Context, Result};
use bridge_core::ForwarderConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

pub const CONFIG_ENV: &str = "GATEWAY_BRIDGE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "gateway-bridge.yaml";

/// Path meaning stdin or stdout
pub const STDIO: &str = "-";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default)]
    pub forwarder: ForwarderConfig,

    #[serde(default)]
    pub meta_data: MetaDataConfig,

    #[serde(default = "default_backend")]
    pub backend: EndpointConfig,

    #[serde(default = "default_integration")]
    pub integration: EndpointConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Time relay loops get to drain after shutdown was requested
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetaDataConfig {
    /// Key/value pairs added to every forwarded stats message
    #[serde(default, rename = "static")]
    pub static_values: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Input file, `-` for stdin. No input leaves the endpoint idle.
    #[serde(default)]
    pub input: Option<String>,

    /// Output file, `-` for stdout
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Listen address of the metrics endpoint, none to disable it
    #[serde(default = "default_metrics_bind")]
    pub bind: Option<SocketAddr>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            bind: default_metrics_bind(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            forwarder: ForwarderConfig::default(),
            meta_data: MetaDataConfig::default(),
            backend: default_backend(),
            integration: default_integration(),
            metrics: MetricsConfig::default(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from `path`.
    ///
    /// A missing file is only an error when the path was given explicitly.
    pub fn load(path: &Path, explicit: bool) -> Result<Self> {
        if !explicit && !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("failed to parse YAML in {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        // An empty document is a valid, all-defaults config
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }
}

// Default values
fn default_log_level() -> String {
    "info".to_string()
}

fn default_output() -> String {
    STDIO.to_string()
}

fn default_channel_capacity() -> usize {
    64
}

fn default_backend() -> EndpointConfig {
    EndpointConfig {
        input: Some(STDIO.to_string()),
        output: default_output(),
        channel_capacity: default_channel_capacity(),
    }
}

fn default_integration() -> EndpointConfig {
    EndpointConfig {
        input: None,
        output: default_output(),
        channel_capacity: default_channel_capacity(),
    }
}

fn default_metrics_bind() -> Option<SocketAddr> {
    Some(SocketAddr::from(([0, 0, 0, 0], 9100)))
}

fn default_shutdown_grace_secs() -> u64 {
    5
}
