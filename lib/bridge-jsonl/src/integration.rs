use crate::LineWriter;
use bridge_api::{
    ControlCommand, DownlinkFrame, EventEnvelope, EventKind, GatewayConfiguration, GatewayId,
    RawForwarderCommand,
};
use bridge_core::{EndpointError, Integration, IntegrationChannels, SubscriptionRegistry};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};
use tokio::sync::mpsc::{self, Sender};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Published event as written by [`JsonLinesIntegration`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventLine {
    pub gateway_id: GatewayId,
    pub event: EventKind,
    pub id: Uuid,
    pub payload: EventEnvelope,
}

#[derive(Serialize)]
struct EventLineRef<'a> {
    gateway_id: GatewayId,
    event: EventKind,
    id: Uuid,
    payload: &'a EventEnvelope,
}

/// Integration publishing events as JSON lines and reading commands back.
///
/// Commands are only routed for gateways that are currently subscribed.
pub struct JsonLinesIntegration<W> {
    channels: Mutex<Option<IntegrationChannels>>,
    registry: SubscriptionRegistry,
    writer: LineWriter<W>,
}

impl<W> JsonLinesIntegration<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Create the integration and the feed that fills its channels
    pub fn new(writer: W, capacity: usize) -> (Self, IntegrationFeed) {
        let capacity = capacity.max(1);
        let (downlink_tx, downlink_frames) = mpsc::channel(capacity);
        let (config_tx, gateway_configurations) = mpsc::channel(capacity);
        let (raw_tx, raw_commands) = mpsc::channel(capacity);
        let registry = SubscriptionRegistry::new();

        let integration = Self {
            channels: Mutex::new(Some(IntegrationChannels {
                downlink_frames,
                gateway_configurations,
                raw_commands,
            })),
            registry: registry.clone(),
            writer: LineWriter::new(writer),
        };

        let feed = IntegrationFeed {
            registry,
            downlink_frames: downlink_tx,
            gateway_configurations: config_tx,
            raw_commands: raw_tx,
        };

        (integration, feed)
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }
}

#[async_trait::async_trait]
impl<W> Integration for JsonLinesIntegration<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn name(&self) -> &'static str {
        "jsonl-integration"
    }

    fn has_channels(&self) -> bool {
        self.channels
            .lock()
            .map(|channels| channels.is_some())
            .unwrap_or(false)
    }

    fn take_channels(&self) -> Option<IntegrationChannels> {
        self.channels
            .lock()
            .ok()
            .and_then(|mut channels| channels.take())
    }

    async fn set_gateway_subscription(
        &self,
        subscribe: bool,
        gateway_id: GatewayId,
    ) -> Result<(), EndpointError> {
        let previous = self.registry.set(gateway_id, subscribe).await;
        if previous != Some(subscribe) {
            info!(gateway_id = %gateway_id, subscribe, "Gateway subscription changed");
        }
        Ok(())
    }

    async fn publish_event(
        &self,
        gateway_id: GatewayId,
        kind: EventKind,
        correlation_id: Uuid,
        event: &EventEnvelope,
    ) -> Result<(), EndpointError> {
        self.writer
            .write(&EventLineRef {
                gateway_id,
                event: kind,
                id: correlation_id,
                payload: event,
            })
            .await
    }
}

/// Producer side of a [`JsonLinesIntegration`]
pub struct IntegrationFeed {
    registry: SubscriptionRegistry,
    downlink_frames: Sender<DownlinkFrame>,
    gateway_configurations: Sender<GatewayConfiguration>,
    raw_commands: Sender<RawForwarderCommand>,
}

impl IntegrationFeed {
    /// Read command lines until end of input, returning the number of lines read
    pub async fn run<R>(self, reader: R) -> io::Result<u64>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut count = 0u64;

        while let Some(line) = lines.next_line().await? {
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            count += 1;

            let command: ControlCommand = match serde_json::from_str(text) {
                Ok(command) => command,
                Err(e) => {
                    warn!(line = count, error = %e, "Skipping malformed command line");
                    continue;
                }
            };

            let gateway_id = command.gateway_id();
            if !self.registry.is_subscribed(&gateway_id).await {
                debug!(
                    gateway_id = %gateway_id,
                    command = %command.kind(),
                    "Dropping command for unsubscribed gateway"
                );
                continue;
            }

            if !self.forward(command).await {
                debug!("Integration channels closed, stopping feed");
                break;
            }
        }

        info!(lines = count, "Command input exhausted");
        Ok(count)
    }

    async fn forward(&self, command: ControlCommand) -> bool {
        match command {
            ControlCommand::DownlinkFrame(frame) => self.downlink_frames.send(frame).await.is_ok(),
            ControlCommand::GatewayConfiguration(config) => {
                self.gateway_configurations.send(config).await.is_ok()
            }
            ControlCommand::RawForwarderCommand(raw) => {
                self.raw_commands.send(raw).await.is_ok()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_api::UplinkFrame;
    use tokio::io::{AsyncReadExt, BufReader};

    #[tokio::test]
    async fn test_publish_writes_event_lines() {
        let (client, mut server) = tokio::io::duplex(4096);
        let (integration, _feed) = JsonLinesIntegration::new(client, 8);

        let gateway_id = GatewayId::new([0xab; 8]);
        let event = EventEnvelope::UplinkFrame(UplinkFrame {
            phy_payload: vec![1, 2],
            rx_info: bridge_api::UplinkRxInfo {
                gateway_id: gateway_id.to_vec(),
                ..Default::default()
            },
            ..Default::default()
        });
        integration
            .publish_event(gateway_id, EventKind::Up, Uuid::from_u128(5), &event)
            .await
            .unwrap();
        drop(integration);

        let mut output = String::new();
        server.read_to_string(&mut output).await.unwrap();
        let line: EventLine = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(
            line,
            EventLine {
                gateway_id,
                event: EventKind::Up,
                id: Uuid::from_u128(5),
                payload: event,
            }
        );

        let value: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(value["gateway_id"], "abababababababab");
        assert_eq!(value["event"], "up");
    }

    #[tokio::test]
    async fn test_commands_routed_only_for_subscribed_gateways() {
        let (integration, feed) = JsonLinesIntegration::new(tokio::io::sink(), 8);
        assert!(integration.has_channels());
        let mut channels = integration.take_channels().unwrap();
        assert!(!integration.has_channels());

        integration
            .set_gateway_subscription(true, GatewayId::new([1; 8]))
            .await
            .unwrap();
        integration
            .set_gateway_subscription(true, GatewayId::new([2; 8]))
            .await
            .unwrap();
        integration
            .set_gateway_subscription(false, GatewayId::new([2; 8]))
            .await
            .unwrap();
        assert_eq!(
            integration.registry().subscribed_gateways().await,
            vec![GatewayId::new([1; 8])]
        );

        let input = concat!(
            "{\"type\":\"down\",\"gateway_id\":[1,1,1,1,1,1,1,1],\"token\":1}\n",
            "{\"type\":\"down\",\"gateway_id\":[2,2,2,2,2,2,2,2],\"token\":2}\n",
            "{\"type\":\"config\",\"gateway_id\":[1,1,1,1,1,1,1,1],\"version\":\"v1\"}\n",
            "{\"type\":\"bogus\"}\n",
            "{\"type\":\"raw\",\"gateway_id\":[1,1,1,1,1,1,1,1],\"payload\":[4]}\n",
        );
        let count = feed.run(BufReader::new(input.as_bytes())).await.unwrap();
        assert_eq!(count, 5);

        assert_eq!(channels.downlink_frames.recv().await.unwrap().token, 1);
        assert!(channels.downlink_frames.recv().await.is_none());
        assert_eq!(
            channels.gateway_configurations.recv().await.unwrap().version,
            "v1"
        );
        assert_eq!(channels.raw_commands.recv().await.unwrap().payload, vec![4]);
    }
}
