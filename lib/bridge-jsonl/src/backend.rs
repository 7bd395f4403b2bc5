use crate::LineWriter;
use bridge_api::{
    DownlinkFrame, DownlinkTxAck, GatewayConfiguration, GatewayStats, RawForwarderCommand,
    RawForwarderEvent, SubscriptionIntent, UplinkFrame,
};
use bridge_core::{Backend, BackendChannels, EndpointError};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};
use tokio::sync::mpsc::{self, Sender};
use tracing::{debug, info, warn};

/// One line of backend input
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum BackendLine {
    #[serde(rename = "uplink")]
    Uplink(UplinkFrame),
    #[serde(rename = "stats")]
    Stats(GatewayStats),
    #[serde(rename = "ack")]
    Ack(DownlinkTxAck),
    #[serde(rename = "raw")]
    Raw(RawForwarderEvent),
    #[serde(rename = "subscribe")]
    Subscription(SubscriptionIntent),
}

/// One line of backend output, tagged like `ControlCommand`
#[derive(Serialize)]
#[serde(tag = "type")]
enum CommandLine<'a> {
    #[serde(rename = "down")]
    Down(&'a DownlinkFrame),
    #[serde(rename = "config")]
    Config(&'a GatewayConfiguration),
    #[serde(rename = "raw")]
    Raw(&'a RawForwarderCommand),
}

/// Backend reading gateway traffic from JSON lines and writing commands back
pub struct JsonLinesBackend<W> {
    channels: Mutex<Option<BackendChannels>>,
    writer: LineWriter<W>,
}

impl<W> JsonLinesBackend<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Create the backend and the feed that fills its channels
    pub fn new(writer: W, capacity: usize) -> (Self, BackendFeed) {
        let capacity = capacity.max(1);
        let (subscriptions_tx, subscriptions) = mpsc::channel(capacity);
        let (uplink_tx, uplink_frames) = mpsc::channel(capacity);
        let (stats_tx, gateway_stats) = mpsc::channel(capacity);
        let (ack_tx, downlink_tx_acks) = mpsc::channel(capacity);
        let (raw_tx, raw_events) = mpsc::channel(capacity);

        let backend = Self {
            channels: Mutex::new(Some(BackendChannels {
                subscriptions,
                uplink_frames,
                gateway_stats,
                downlink_tx_acks,
                raw_events,
            })),
            writer: LineWriter::new(writer),
        };

        let feed = BackendFeed {
            subscriptions: subscriptions_tx,
            uplink_frames: uplink_tx,
            gateway_stats: stats_tx,
            downlink_tx_acks: ack_tx,
            raw_events: raw_tx,
        };

        (backend, feed)
    }
}

#[async_trait::async_trait]
impl<W> Backend for JsonLinesBackend<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn name(&self) -> &'static str {
        "jsonl-backend"
    }

    fn has_channels(&self) -> bool {
        self.channels
            .lock()
            .map(|channels| channels.is_some())
            .unwrap_or(false)
    }

    fn take_channels(&self) -> Option<BackendChannels> {
        self.channels
            .lock()
            .ok()
            .and_then(|mut channels| channels.take())
    }

    async fn send_downlink_frame(&self, frame: &DownlinkFrame) -> Result<(), EndpointError> {
        self.writer.write(&CommandLine::Down(frame)).await
    }

    async fn apply_configuration(
        &self,
        config: &GatewayConfiguration,
    ) -> Result<(), EndpointError> {
        self.writer.write(&CommandLine::Config(config)).await
    }

    async fn raw_command(&self, command: &RawForwarderCommand) -> Result<(), EndpointError> {
        self.writer.write(&CommandLine::Raw(command)).await
    }
}

/// Producer side of a [`JsonLinesBackend`].
///
/// Dropping the feed, or letting [`BackendFeed::run`] return, closes every
/// backend channel.
pub struct BackendFeed {
    subscriptions: Sender<SubscriptionIntent>,
    uplink_frames: Sender<UplinkFrame>,
    gateway_stats: Sender<GatewayStats>,
    downlink_tx_acks: Sender<DownlinkTxAck>,
    raw_events: Sender<RawForwarderEvent>,
}

impl BackendFeed {
    /// Read lines until end of input, returning the number of lines read.
    ///
    /// Malformed lines are logged and skipped.
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

            let parsed: BackendLine = match serde_json::from_str(text) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(line = count, error = %e, "Skipping malformed backend line");
                    continue;
                }
            };

            if !self.forward(parsed).await {
                debug!("Backend channels closed, stopping feed");
                break;
            }
        }

        info!(lines = count, "Backend input exhausted");
        Ok(count)
    }

    async fn forward(&self, line: BackendLine) -> bool {
        match line {
            BackendLine::Uplink(frame) => self.uplink_frames.send(frame).await.is_ok(),
            BackendLine::Stats(stats) => self.gateway_stats.send(stats).await.is_ok(),
            BackendLine::Ack(ack) => self.downlink_tx_acks.send(ack).await.is_ok(),
            BackendLine::Raw(raw) => self.raw_events.send(raw).await.is_ok(),
            BackendLine::Subscription(intent) => self.subscriptions.send(intent).await.is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_api::GatewayId;
    use tokio::io::{AsyncReadExt, BufReader};

    #[tokio::test]
    async fn test_feed_routes_lines_to_channels() {
        let (backend, feed) = JsonLinesBackend::new(tokio::io::sink(), 8);
        assert!(backend.has_channels());
        let mut channels = backend.take_channels().unwrap();
        assert!(!backend.has_channels());
        assert!(backend.take_channels().is_none());

        let input = concat!(
            "{\"type\":\"subscribe\",\"gateway_id\":\"0102030405060708\",\"subscribe\":true}\n",
            "{\"type\":\"uplink\",\"phy_payload\":[1],\"rx_info\":{\"gateway_id\":[1,2,3,4,5,6,7,8]}}\n",
            "\n",
            "not json\n",
            "{\"type\":\"stats\",\"gateway_id\":[1,2,3,4,5,6,7,8]}\n",
            "{\"type\":\"ack\",\"gateway_id\":[1,2,3,4,5,6,7,8],\"token\":3}\n",
            "{\"type\":\"raw\",\"gateway_id\":[1,2,3,4,5,6,7,8],\"payload\":[9]}\n",
        );
        let count = feed.run(BufReader::new(input.as_bytes())).await.unwrap();
        assert_eq!(count, 6);

        let gateway_id = GatewayId::new([1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(
            channels.subscriptions.recv().await,
            Some(SubscriptionIntent::subscribe(gateway_id))
        );
        assert_eq!(
            channels.uplink_frames.recv().await.unwrap().gateway_id(),
            gateway_id
        );
        assert_eq!(
            channels.gateway_stats.recv().await.unwrap().gateway_id(),
            gateway_id
        );
        assert_eq!(channels.downlink_tx_acks.recv().await.unwrap().token, 3);
        assert_eq!(channels.raw_events.recv().await.unwrap().payload, vec![9]);

        // Feed is gone, so the channels are closed
        assert!(channels.uplink_frames.recv().await.is_none());
        assert!(channels.subscriptions.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_commands_written_as_tagged_lines() {
        let (client, mut server) = tokio::io::duplex(4096);
        let (backend, _feed) = JsonLinesBackend::new(client, 8);

        backend
            .send_downlink_frame(&DownlinkFrame {
                gateway_id: vec![1; 8],
                token: 7,
                ..Default::default()
            })
            .await
            .unwrap();
        backend
            .apply_configuration(&GatewayConfiguration {
                gateway_id: vec![1; 8],
                version: "v3".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        drop(backend);

        let mut output = String::new();
        server.read_to_string(&mut output).await.unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "down");
        assert_eq!(lines[0]["token"], 7);
        assert_eq!(lines[1]["type"], "config");
        assert_eq!(lines[1]["version"], "v3");

        // Output parses back into the command envelope
        let command: bridge_api::ControlCommand =
            serde_json::from_value(lines[1].clone()).unwrap();
        assert_eq!(command.kind(), bridge_api::CommandKind::Config);
    }
}
