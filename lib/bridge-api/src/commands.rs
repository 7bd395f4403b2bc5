//! Commands produced by the integration and applied by the backend

use crate::{uuid_from_bytes_lossy, GatewayId};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Down,
    Config,
    Raw,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Down => "down",
            CommandKind::Config => "config",
            CommandKind::Raw => "raw",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DownlinkTxInfo {
    pub frequency: u32,
    #[serde(default)]
    pub power: i32,
    #[serde(default)]
    pub bandwidth: u32,
    #[serde(default)]
    pub spreading_factor: u32,
    #[serde(default)]
    pub board: u32,
    #[serde(default)]
    pub antenna: u32,
    /// Scheduling context echoed back from the uplink
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DownlinkFrameItem {
    pub phy_payload: Vec<u8>,
    #[serde(default)]
    pub tx_info: DownlinkTxInfo,
}

/// Downlink with one or more transmission opportunities
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DownlinkFrame {
    pub gateway_id: Vec<u8>,
    #[serde(default)]
    pub downlink_id: Vec<u8>,
    #[serde(default)]
    pub token: u32,
    #[serde(default)]
    pub items: Vec<DownlinkFrameItem>,
}

impl DownlinkFrame {
    pub fn gateway_id(&self) -> GatewayId {
        GatewayId::from_bytes_lossy(&self.gateway_id)
    }

    pub fn downlink_id(&self) -> Uuid {
        uuid_from_bytes_lossy(&self.downlink_id)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfiguration {
    pub frequency: u32,
    #[serde(default)]
    pub bandwidth: u32,
    #[serde(default)]
    pub spreading_factors: Vec<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfiguration {
    pub gateway_id: Vec<u8>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub channels: Vec<ChannelConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats_interval_secs: Option<u64>,
}

impl GatewayConfiguration {
    pub fn gateway_id(&self) -> GatewayId {
        GatewayId::from_bytes_lossy(&self.gateway_id)
    }
}

/// Unparsed packet-forwarder command, passed through as-is
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawForwarderCommand {
    pub gateway_id: Vec<u8>,
    #[serde(default)]
    pub raw_id: Vec<u8>,
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl RawForwarderCommand {
    pub fn gateway_id(&self) -> GatewayId {
        GatewayId::from_bytes_lossy(&self.gateway_id)
    }

    pub fn raw_id(&self) -> Uuid {
        uuid_from_bytes_lossy(&self.raw_id)
    }
}

/// Any command travelling from the integration to the backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlCommand {
    #[serde(rename = "down")]
    DownlinkFrame(DownlinkFrame),
    #[serde(rename = "config")]
    GatewayConfiguration(GatewayConfiguration),
    #[serde(rename = "raw")]
    RawForwarderCommand(RawForwarderCommand),
}

impl ControlCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            ControlCommand::DownlinkFrame(_) => CommandKind::Down,
            ControlCommand::GatewayConfiguration(_) => CommandKind::Config,
            ControlCommand::RawForwarderCommand(_) => CommandKind::Raw,
        }
    }

    pub fn gateway_id(&self) -> GatewayId {
        match self {
            ControlCommand::DownlinkFrame(c) => c.gateway_id(),
            ControlCommand::GatewayConfiguration(c) => c.gateway_id(),
            ControlCommand::RawForwarderCommand(c) => c.gateway_id(),
        }
    }

    /// Configuration updates carry no correlation id
    pub fn correlation_id(&self) -> Option<Uuid> {
        match self {
            ControlCommand::DownlinkFrame(c) => Some(c.downlink_id()),
            ControlCommand::GatewayConfiguration(_) => None,
            ControlCommand::RawForwarderCommand(c) => Some(c.raw_id()),
        }
    }
}

impl From<DownlinkFrame> for ControlCommand {
    fn from(frame: DownlinkFrame) -> Self {
        ControlCommand::DownlinkFrame(frame)
    }
}

impl From<GatewayConfiguration> for ControlCommand {
    fn from(config: GatewayConfiguration) -> Self {
        ControlCommand::GatewayConfiguration(config)
    }
}

impl From<RawForwarderCommand> for ControlCommand {
    fn from(raw: RawForwarderCommand) -> Self {
        ControlCommand::RawForwarderCommand(raw)
    }
}
