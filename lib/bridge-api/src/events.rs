//! Events produced by the backend and published by the integration

use crate::{uuid_from_bytes_lossy, GatewayId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Event type as exposed to the integration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Up,
    Stats,
    Ack,
    Raw,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Up => "up",
            EventKind::Stats => "stats",
            EventKind::Ack => "ack",
            EventKind::Raw => "raw",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Radio parameters an uplink was received with
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UplinkTxInfo {
    pub frequency: u32,
    #[serde(default)]
    pub bandwidth: u32,
    #[serde(default)]
    pub spreading_factor: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code_rate: String,
}

/// Reception metadata of an uplink, as reported by one gateway
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UplinkRxInfo {
    pub gateway_id: Vec<u8>,
    #[serde(default)]
    pub uplink_id: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rssi: i32,
    #[serde(default)]
    pub lora_snr: f64,
    #[serde(default)]
    pub channel: u32,
    #[serde(default)]
    pub rf_chain: u32,
    #[serde(default)]
    pub board: u32,
    #[serde(default)]
    pub antenna: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UplinkFrame {
    pub phy_payload: Vec<u8>,
    #[serde(default)]
    pub tx_info: UplinkTxInfo,
    pub rx_info: UplinkRxInfo,
}

impl UplinkFrame {
    pub fn gateway_id(&self) -> GatewayId {
        GatewayId::from_bytes_lossy(&self.rx_info.gateway_id)
    }

    pub fn uplink_id(&self) -> Uuid {
        uuid_from_bytes_lossy(&self.rx_info.uplink_id)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayStats {
    pub gateway_id: Vec<u8>,
    #[serde(default)]
    pub stats_id: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip: String,
    #[serde(default)]
    pub rx_packets_received: u32,
    #[serde(default)]
    pub rx_packets_received_ok: u32,
    #[serde(default)]
    pub tx_packets_received: u32,
    #[serde(default)]
    pub tx_packets_emitted: u32,
    #[serde(default)]
    pub meta_data: HashMap<String, String>,
}

impl GatewayStats {
    pub fn gateway_id(&self) -> GatewayId {
        GatewayId::from_bytes_lossy(&self.gateway_id)
    }

    pub fn stats_id(&self) -> Uuid {
        uuid_from_bytes_lossy(&self.stats_id)
    }
}

/// Transmission outcome reported by the packet forwarder
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxAckStatus {
    Ignored,
    #[default]
    Ok,
    TooLate,
    TooEarly,
    CollisionPacket,
    CollisionBeacon,
    TxFreq,
    TxPower,
    GpsUnlocked,
    QueueFull,
    InternalError,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DownlinkTxAckItem {
    pub status: TxAckStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DownlinkTxAck {
    pub gateway_id: Vec<u8>,
    #[serde(default)]
    pub token: u32,
    #[serde(default)]
    pub downlink_id: Vec<u8>,
    #[serde(default)]
    pub items: Vec<DownlinkTxAckItem>,
}

impl DownlinkTxAck {
    pub fn gateway_id(&self) -> GatewayId {
        GatewayId::from_bytes_lossy(&self.gateway_id)
    }

    pub fn downlink_id(&self) -> Uuid {
        uuid_from_bytes_lossy(&self.downlink_id)
    }
}

/// Unparsed packet-forwarder event, passed through as-is
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawForwarderEvent {
    pub gateway_id: Vec<u8>,
    #[serde(default)]
    pub raw_id: Vec<u8>,
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl RawForwarderEvent {
    pub fn gateway_id(&self) -> GatewayId {
        GatewayId::from_bytes_lossy(&self.gateway_id)
    }

    pub fn raw_id(&self) -> Uuid {
        uuid_from_bytes_lossy(&self.raw_id)
    }
}

/// Any event travelling from the backend to the integration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventEnvelope {
    #[serde(rename = "uplink")]
    UplinkFrame(UplinkFrame),
    #[serde(rename = "stats")]
    GatewayStats(GatewayStats),
    #[serde(rename = "ack")]
    DownlinkTxAck(DownlinkTxAck),
    #[serde(rename = "raw")]
    RawForwarderEvent(RawForwarderEvent),
}

impl EventEnvelope {
    pub fn kind(&self) -> EventKind {
        match self {
            EventEnvelope::UplinkFrame(_) => EventKind::Up,
            EventEnvelope::GatewayStats(_) => EventKind::Stats,
            EventEnvelope::DownlinkTxAck(_) => EventKind::Ack,
            EventEnvelope::RawForwarderEvent(_) => EventKind::Raw,
        }
    }

    pub fn gateway_id(&self) -> GatewayId {
        match self {
            EventEnvelope::UplinkFrame(e) => e.gateway_id(),
            EventEnvelope::GatewayStats(e) => e.gateway_id(),
            EventEnvelope::DownlinkTxAck(e) => e.gateway_id(),
            EventEnvelope::RawForwarderEvent(e) => e.gateway_id(),
        }
    }

    pub fn correlation_id(&self) -> Uuid {
        match self {
            EventEnvelope::UplinkFrame(e) => e.uplink_id(),
            EventEnvelope::GatewayStats(e) => e.stats_id(),
            EventEnvelope::DownlinkTxAck(e) => e.downlink_id(),
            EventEnvelope::RawForwarderEvent(e) => e.raw_id(),
        }
    }
}

impl From<UplinkFrame> for EventEnvelope {
    fn from(frame: UplinkFrame) -> Self {
        EventEnvelope::UplinkFrame(frame)
    }
}

impl From<GatewayStats> for EventEnvelope {
    fn from(stats: GatewayStats) -> Self {
        EventEnvelope::GatewayStats(stats)
    }
}

impl From<DownlinkTxAck> for EventEnvelope {
    fn from(ack: DownlinkTxAck) -> Self {
        EventEnvelope::DownlinkTxAck(ack)
    }
}

impl From<RawForwarderEvent> for EventEnvelope {
    fn from(raw: RawForwarderEvent) -> Self {
        EventEnvelope::RawForwarderEvent(raw)
    }
}
