//! Contracts of the two endpoints the forwarder sits between

use crate::error::EndpointError;
use bridge_api::{
    DownlinkFrame, DownlinkTxAck, EventEnvelope, EventKind, GatewayConfiguration, GatewayId,
    GatewayStats, RawForwarderCommand, RawForwarderEvent, SubscriptionIntent, UplinkFrame,
};
use tokio::sync::mpsc::Receiver;
use uuid::Uuid;

/// Outbound channels of a backend, one per message kind
pub struct BackendChannels {
    pub subscriptions: Receiver<SubscriptionIntent>,
    pub uplink_frames: Receiver<UplinkFrame>,
    pub gateway_stats: Receiver<GatewayStats>,
    pub downlink_tx_acks: Receiver<DownlinkTxAck>,
    pub raw_events: Receiver<RawForwarderEvent>,
}

/// Outbound channels of an integration, one per command kind
pub struct IntegrationChannels {
    pub downlink_frames: Receiver<DownlinkFrame>,
    pub gateway_configurations: Receiver<GatewayConfiguration>,
    pub raw_commands: Receiver<RawForwarderCommand>,
}

/// Gateway-facing endpoint (e.g. a packet-forwarder protocol handler)
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str {
        "backend"
    }

    /// Whether [`Backend::take_channels`] would still hand over the channels
    fn has_channels(&self) -> bool;

    /// Hand over the outbound channels. Returns `None` once they have been taken.
    fn take_channels(&self) -> Option<BackendChannels>;

    async fn send_downlink_frame(&self, frame: &DownlinkFrame) -> Result<(), EndpointError>;

    async fn apply_configuration(
        &self,
        config: &GatewayConfiguration,
    ) -> Result<(), EndpointError>;

    async fn raw_command(&self, command: &RawForwarderCommand) -> Result<(), EndpointError>;
}

/// Network-facing endpoint (e.g. a message-bus publisher)
#[async_trait::async_trait]
pub trait Integration: Send + Sync {
    fn name(&self) -> &'static str {
        "integration"
    }

    fn has_channels(&self) -> bool;

    /// Hand over the outbound channels. Returns `None` once they have been taken.
    fn take_channels(&self) -> Option<IntegrationChannels>;

    async fn set_gateway_subscription(
        &self,
        subscribe: bool,
        gateway_id: GatewayId,
    ) -> Result<(), EndpointError>;

    async fn publish_event(
        &self,
        gateway_id: GatewayId,
        kind: EventKind,
        correlation_id: Uuid,
        event: &EventEnvelope,
    ) -> Result<(), EndpointError>;
}
