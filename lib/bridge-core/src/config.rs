//! Forwarder configuration

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ForwarderConfig {
    /// Gateways subscribed at startup, regardless of backend connection state
    #[serde(default)]
    pub gateways: Vec<GatewayEntry>,

    #[serde(default)]
    pub dispatch: DispatchMode,

    #[serde(default)]
    pub failure_policy: FailurePolicyConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayEntry {
    /// Hex encoded 8-byte gateway id
    pub gateway_id: String,
}

/// How a relay loop hands messages to the opposite endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DispatchMode {
    /// One task per message, no limit
    Unbounded,
    /// One task per message, at most `max_in_flight` per loop
    Bounded {
        #[serde(default = "default_max_in_flight")]
        max_in_flight: usize,
    },
    /// Deliver inline, in receive order
    Sequential,
}

impl Default for DispatchMode {
    fn default() -> Self {
        DispatchMode::Bounded {
            max_in_flight: default_max_in_flight(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailurePolicyConfig {
    Drop,
    Retry {
        #[serde(default = "default_max_retries")]
        max_retries: u32,
        #[serde(default = "default_initial_backoff_ms")]
        initial_backoff_ms: u64,
        #[serde(default = "default_max_backoff_ms")]
        max_backoff_ms: u64,
    },
}

impl Default for FailurePolicyConfig {
    fn default() -> Self {
        FailurePolicyConfig::Drop
    }
}

// Default values
fn default_max_in_flight() -> usize {
    1024
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    10_000
}
