//! Scripted endpoints for unit tests

use crate::endpoint::{Backend, BackendChannels, Integration, IntegrationChannels};
use crate::error::EndpointError;
use bridge_api::{
    DownlinkFrame, DownlinkTxAck, EventEnvelope, EventKind, GatewayConfiguration, GatewayId,
    GatewayStats, RawForwarderCommand, RawForwarderEvent, SubscriptionIntent, UplinkFrame,
    UplinkRxInfo,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, Sender};
use uuid::Uuid;

const CAPACITY: usize = 16;

pub(crate) fn uplink(gateway_id: [u8; 8], uplink_id: u128) -> UplinkFrame {
    UplinkFrame {
        phy_payload: vec![0x40, 0x01],
        rx_info: UplinkRxInfo {
            gateway_id: gateway_id.to_vec(),
            uplink_id: Uuid::from_u128(uplink_id).as_bytes().to_vec(),
            rssi: -50,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub(crate) fn stats(gateway_id: [u8; 8], stats_id: u128) -> GatewayStats {
    GatewayStats {
        gateway_id: gateway_id.to_vec(),
        stats_id: Uuid::from_u128(stats_id).as_bytes().to_vec(),
        rx_packets_received: 10,
        ..Default::default()
    }
}

pub(crate) fn ack(gateway_id: [u8; 8], downlink_id: u128) -> DownlinkTxAck {
    DownlinkTxAck {
        gateway_id: gateway_id.to_vec(),
        downlink_id: Uuid::from_u128(downlink_id).as_bytes().to_vec(),
        ..Default::default()
    }
}

pub(crate) fn raw_event(gateway_id: [u8; 8], raw_id: u128) -> RawForwarderEvent {
    RawForwarderEvent {
        gateway_id: gateway_id.to_vec(),
        raw_id: Uuid::from_u128(raw_id).as_bytes().to_vec(),
        payload: vec![0xde, 0xad],
    }
}

pub(crate) fn downlink(gateway_id: [u8; 8], downlink_id: u128) -> DownlinkFrame {
    DownlinkFrame {
        gateway_id: gateway_id.to_vec(),
        downlink_id: Uuid::from_u128(downlink_id).as_bytes().to_vec(),
        token: 1,
        items: vec![],
    }
}

pub(crate) fn configuration(gateway_id: [u8; 8], version: &str) -> GatewayConfiguration {
    GatewayConfiguration {
        gateway_id: gateway_id.to_vec(),
        version: version.to_string(),
        ..Default::default()
    }
}

pub(crate) fn raw_command(gateway_id: [u8; 8], raw_id: u128) -> RawForwarderCommand {
    RawForwarderCommand {
        gateway_id: gateway_id.to_vec(),
        raw_id: Uuid::from_u128(raw_id).as_bytes().to_vec(),
        payload: vec![0xbe, 0xef],
    }
}

/// Poll `condition` until it holds, failing the test after two seconds
pub(crate) async fn wait_until<F: Fn() -> bool>(condition: F) {
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not met in time");
}

/// Shared failure script of a mock endpoint
#[derive(Default)]
struct Script {
    failing: Mutex<HashSet<GatewayId>>,
    fail_remaining: AtomicUsize,
    delays: Mutex<HashMap<GatewayId, Duration>>,
}

impl Script {
    async fn run(&self, gateway_id: GatewayId) -> Result<(), EndpointError> {
        let delay = self.delays.lock().unwrap().get(&gateway_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(&gateway_id) {
            return Err(EndpointError::Rejected(format!("gateway {gateway_id}")));
        }

        let fail = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(EndpointError::Unavailable("scripted failure".to_string()));
        }
        Ok(())
    }
}

/// Senders feeding a [`MockBackend`]'s channels
pub(crate) struct BackendSenders {
    pub(crate) subscriptions: Sender<SubscriptionIntent>,
    pub(crate) uplink_frames: Sender<UplinkFrame>,
    pub(crate) gateway_stats: Sender<GatewayStats>,
    pub(crate) downlink_tx_acks: Sender<DownlinkTxAck>,
    pub(crate) raw_events: Sender<RawForwarderEvent>,
}

pub(crate) struct MockBackend {
    channels: Mutex<Option<BackendChannels>>,
    script: Script,
    downlinks: Mutex<Vec<DownlinkFrame>>,
    configurations: Mutex<Vec<GatewayConfiguration>>,
    raw_commands: Mutex<Vec<RawForwarderCommand>>,
}

impl MockBackend {
    pub(crate) fn new() -> (Arc<Self>, BackendSenders) {
        let (subscriptions_tx, subscriptions) = mpsc::channel(CAPACITY);
        let (uplink_tx, uplink_frames) = mpsc::channel(CAPACITY);
        let (stats_tx, gateway_stats) = mpsc::channel(CAPACITY);
        let (ack_tx, downlink_tx_acks) = mpsc::channel(CAPACITY);
        let (raw_tx, raw_events) = mpsc::channel(CAPACITY);

        let backend = Arc::new(Self {
            channels: Mutex::new(Some(BackendChannels {
                subscriptions,
                uplink_frames,
                gateway_stats,
                downlink_tx_acks,
                raw_events,
            })),
            script: Script::default(),
            downlinks: Mutex::default(),
            configurations: Mutex::default(),
            raw_commands: Mutex::default(),
        });

        let senders = BackendSenders {
            subscriptions: subscriptions_tx,
            uplink_frames: uplink_tx,
            gateway_stats: stats_tx,
            downlink_tx_acks: ack_tx,
            raw_events: raw_tx,
        };
        (backend, senders)
    }

    pub(crate) fn fail_for(&self, gateway_id: GatewayId) {
        self.script.failing.lock().unwrap().insert(gateway_id);
    }

    pub(crate) fn channels_taken(&self) -> bool {
        self.channels.lock().unwrap().is_none()
    }

    pub(crate) fn downlinks(&self) -> Vec<DownlinkFrame> {
        self.downlinks.lock().unwrap().clone()
    }

    pub(crate) fn configurations(&self) -> Vec<GatewayConfiguration> {
        self.configurations.lock().unwrap().clone()
    }

    pub(crate) fn raw_commands(&self) -> Vec<RawForwarderCommand> {
        self.raw_commands.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Backend for MockBackend {
    fn has_channels(&self) -> bool {
        !self.channels_taken()
    }

    fn take_channels(&self) -> Option<BackendChannels> {
        self.channels.lock().unwrap().take()
    }

    async fn send_downlink_frame(&self, frame: &DownlinkFrame) -> Result<(), EndpointError> {
        self.script.run(frame.gateway_id()).await?;
        self.downlinks.lock().unwrap().push(frame.clone());
        Ok(())
    }

    async fn apply_configuration(
        &self,
        config: &GatewayConfiguration,
    ) -> Result<(), EndpointError> {
        self.script.run(config.gateway_id()).await?;
        self.configurations.lock().unwrap().push(config.clone());
        Ok(())
    }

    async fn raw_command(&self, command: &RawForwarderCommand) -> Result<(), EndpointError> {
        self.script.run(command.gateway_id()).await?;
        self.raw_commands.lock().unwrap().push(command.clone());
        Ok(())
    }
}

/// Senders feeding a [`MockIntegration`]'s channels
pub(crate) struct IntegrationSenders {
    pub(crate) downlink_frames: Sender<DownlinkFrame>,
    pub(crate) gateway_configurations: Sender<GatewayConfiguration>,
    pub(crate) raw_commands: Sender<RawForwarderCommand>,
}

pub(crate) type Published = (GatewayId, EventKind, Uuid, EventEnvelope);

pub(crate) struct MockIntegration {
    channels: Mutex<Option<IntegrationChannels>>,
    script: Script,
    attempts: AtomicUsize,
    published: Mutex<Vec<Published>>,
    subscription_attempts: AtomicUsize,
    subscriptions: Mutex<Vec<(bool, GatewayId)>>,
}

impl MockIntegration {
    pub(crate) fn new() -> (Arc<Self>, IntegrationSenders) {
        let (downlink_tx, downlink_frames) = mpsc::channel(CAPACITY);
        let (config_tx, gateway_configurations) = mpsc::channel(CAPACITY);
        let (raw_tx, raw_commands) = mpsc::channel(CAPACITY);

        let integration = Arc::new(Self {
            channels: Mutex::new(Some(IntegrationChannels {
                downlink_frames,
                gateway_configurations,
                raw_commands,
            })),
            script: Script::default(),
            attempts: AtomicUsize::new(0),
            published: Mutex::default(),
            subscription_attempts: AtomicUsize::new(0),
            subscriptions: Mutex::default(),
        });

        let senders = IntegrationSenders {
            downlink_frames: downlink_tx,
            gateway_configurations: config_tx,
            raw_commands: raw_tx,
        };
        (integration, senders)
    }

    /// Reject every call concerning `gateway_id`
    pub(crate) fn fail_for(&self, gateway_id: GatewayId) {
        self.script.failing.lock().unwrap().insert(gateway_id);
    }

    /// Fail the next `times` calls
    pub(crate) fn fail_times(&self, times: usize) {
        self.script.fail_remaining.store(times, Ordering::SeqCst);
    }

    /// Delay every call concerning `gateway_id`
    pub(crate) fn delay_for(&self, gateway_id: GatewayId, delay: Duration) {
        self.script.delays.lock().unwrap().insert(gateway_id, delay);
    }

    pub(crate) fn channels_taken(&self) -> bool {
        self.channels.lock().unwrap().is_none()
    }

    pub(crate) fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    /// Number of publish calls, failed ones included
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn subscriptions(&self) -> Vec<(bool, GatewayId)> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub(crate) fn subscription_attempts(&self) -> usize {
        self.subscription_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Integration for MockIntegration {
    fn has_channels(&self) -> bool {
        !self.channels_taken()
    }

    fn take_channels(&self) -> Option<IntegrationChannels> {
        self.channels.lock().unwrap().take()
    }

    async fn set_gateway_subscription(
        &self,
        subscribe: bool,
        gateway_id: GatewayId,
    ) -> Result<(), EndpointError> {
        self.subscription_attempts.fetch_add(1, Ordering::SeqCst);
        self.script.run(gateway_id).await?;
        self.subscriptions
            .lock()
            .unwrap()
            .push((subscribe, gateway_id));
        Ok(())
    }

    async fn publish_event(
        &self,
        gateway_id: GatewayId,
        kind: EventKind,
        correlation_id: Uuid,
        event: &EventEnvelope,
    ) -> Result<(), EndpointError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.script.run(gateway_id).await?;
        self.published
            .lock()
            .unwrap()
            .push((gateway_id, kind, correlation_id, event.clone()));
        Ok(())
    }
}
