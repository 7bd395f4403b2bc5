//! Gateway bridge data model
//!
//! This library defines the messages relayed between the gateway-facing
//! backend and the network-facing integration:
//! - GatewayId: 8-byte gateway identifier used as routing key
//! - EventEnvelope: uplink frames, stats, downlink acks and raw forwarder events
//! - ControlCommand: downlink frames, gateway configuration and raw forwarder commands
//! - SubscriptionIntent: desired subscription state of a gateway

pub mod commands;
pub mod events;
pub mod gateway_id;
pub mod subscription;

pub use commands::{
    ChannelConfiguration, CommandKind, ControlCommand, DownlinkFrame, DownlinkFrameItem,
    DownlinkTxInfo, GatewayConfiguration, RawForwarderCommand,
};
pub use events::{
    DownlinkTxAck, DownlinkTxAckItem, EventEnvelope, EventKind, GatewayStats, RawForwarderEvent,
    TxAckStatus, UplinkFrame, UplinkRxInfo, UplinkTxInfo,
};
pub use gateway_id::{GatewayId, GatewayIdError};
pub use subscription::SubscriptionIntent;

use uuid::Uuid;

/// Copy up to 16 bytes of a raw id field into a UUID, zero-padding short input.
pub fn uuid_from_bytes_lossy(raw: &[u8]) -> Uuid {
    let mut bytes = [0u8; 16];
    let n = raw.len().min(bytes.len());
    bytes[..n].copy_from_slice(&raw[..n]);
    Uuid::from_bytes(bytes)
}
