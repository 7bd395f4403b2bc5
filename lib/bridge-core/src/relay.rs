//! Relay loops draining one endpoint's channels into the other endpoint

use crate::config::DispatchMode;
use crate::dispatch::DispatchPool;
use crate::endpoint::{Backend, Integration};
use crate::error::EndpointError;
use crate::metadata::MetadataProvider;
use crate::metrics::RelayMetrics;
use crate::policy::{
    DeadLetter, Delivery, DeliveryContext, Direction, FailureAction, FailurePolicy,
};
use bridge_api::{
    CommandKind, DownlinkFrame, DownlinkTxAck, EventEnvelope, EventKind, GatewayConfiguration,
    GatewayId, GatewayStats, RawForwarderCommand, RawForwarderEvent, UplinkFrame,
};
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error};
use uuid::Uuid;

/// Event payloads relayed from the backend to the integration
pub trait Event: Into<EventEnvelope> + Send + 'static {
    const KIND: EventKind;

    fn gateway_id(&self) -> GatewayId;

    fn correlation_id(&self) -> Uuid;

    /// Hook to add process metadata before forwarding
    fn enrich(&mut self, _metadata: &dyn MetadataProvider) {}
}

impl Event for UplinkFrame {
    const KIND: EventKind = EventKind::Up;

    fn gateway_id(&self) -> GatewayId {
        UplinkFrame::gateway_id(self)
    }

    fn correlation_id(&self) -> Uuid {
        self.uplink_id()
    }
}

impl Event for GatewayStats {
    const KIND: EventKind = EventKind::Stats;

    fn gateway_id(&self) -> GatewayId {
        GatewayStats::gateway_id(self)
    }

    fn correlation_id(&self) -> Uuid {
        self.stats_id()
    }

    fn enrich(&mut self, metadata: &dyn MetadataProvider) {
        self.meta_data = metadata.get();
    }
}

impl Event for DownlinkTxAck {
    const KIND: EventKind = EventKind::Ack;

    fn gateway_id(&self) -> GatewayId {
        DownlinkTxAck::gateway_id(self)
    }

    fn correlation_id(&self) -> Uuid {
        self.downlink_id()
    }
}

impl Event for RawForwarderEvent {
    const KIND: EventKind = EventKind::Raw;

    fn gateway_id(&self) -> GatewayId {
        RawForwarderEvent::gateway_id(self)
    }

    fn correlation_id(&self) -> Uuid {
        self.raw_id()
    }
}

/// A message together with the endpoint call that delivers it
#[async_trait::async_trait]
pub(crate) trait Deliverable: Send + Sync + 'static {
    type Target: ?Sized + Send + Sync + 'static;

    fn context(&self) -> DeliveryContext;

    async fn attempt(&self, target: &Self::Target) -> Result<(), EndpointError>;

    fn log_failure(&self, error: &EndpointError);

    fn into_delivery(self) -> Delivery;
}

/// Event with its routing keys extracted
pub(crate) struct PreparedEvent {
    gateway_id: GatewayId,
    correlation_id: Uuid,
    event: EventEnvelope,
}

impl PreparedEvent {
    pub(crate) fn new<E: Event>(event: E) -> Self {
        Self {
            gateway_id: event.gateway_id(),
            correlation_id: event.correlation_id(),
            event: event.into(),
        }
    }
}

#[async_trait::async_trait]
impl Deliverable for PreparedEvent {
    type Target = dyn Integration;

    fn context(&self) -> DeliveryContext {
        DeliveryContext {
            direction: Direction::Event,
            kind: self.event.kind().as_str(),
            gateway_id: self.gateway_id,
            correlation_id: Some(self.correlation_id),
        }
    }

    async fn attempt(&self, integration: &Self::Target) -> Result<(), EndpointError> {
        integration
            .publish_event(
                self.gateway_id,
                self.event.kind(),
                self.correlation_id,
                &self.event,
            )
            .await
    }

    fn log_failure(&self, e: &EndpointError) {
        let gateway_id = self.gateway_id;
        let event_type = self.event.kind();
        let id = self.correlation_id;
        match event_type {
            EventKind::Up => error!(
                gateway_id = %gateway_id, event_type = %event_type, uplink_id = %id, error = %e,
                "publish event error"
            ),
            EventKind::Stats => error!(
                gateway_id = %gateway_id, event_type = %event_type, stats_id = %id, error = %e,
                "publish event error"
            ),
            EventKind::Ack => error!(
                gateway_id = %gateway_id, event_type = %event_type, downlink_id = %id, error = %e,
                "publish event error"
            ),
            EventKind::Raw => error!(
                gateway_id = %gateway_id, event_type = %event_type, raw_id = %id, error = %e,
                "publish event error"
            ),
        }
    }

    fn into_delivery(self) -> Delivery {
        Delivery::Event(self.event)
    }
}

#[async_trait::async_trait]
impl Deliverable for DownlinkFrame {
    type Target = dyn Backend;

    fn context(&self) -> DeliveryContext {
        DeliveryContext {
            direction: Direction::Command,
            kind: CommandKind::Down.as_str(),
            gateway_id: self.gateway_id(),
            correlation_id: Some(self.downlink_id()),
        }
    }

    async fn attempt(&self, backend: &Self::Target) -> Result<(), EndpointError> {
        backend.send_downlink_frame(self).await
    }

    fn log_failure(&self, e: &EndpointError) {
        error!(
            gateway_id = %self.gateway_id(),
            downlink_id = %self.downlink_id(),
            error = %e,
            "send downlink frame error"
        );
    }

    fn into_delivery(self) -> Delivery {
        Delivery::Command(self.into())
    }
}

#[async_trait::async_trait]
impl Deliverable for GatewayConfiguration {
    type Target = dyn Backend;

    fn context(&self) -> DeliveryContext {
        DeliveryContext {
            direction: Direction::Command,
            kind: CommandKind::Config.as_str(),
            gateway_id: self.gateway_id(),
            correlation_id: None,
        }
    }

    async fn attempt(&self, backend: &Self::Target) -> Result<(), EndpointError> {
        backend.apply_configuration(self).await
    }

    fn log_failure(&self, e: &EndpointError) {
        error!(
            gateway_id = %self.gateway_id(),
            version = %self.version,
            error = %e,
            "apply gateway-configuration error"
        );
    }

    fn into_delivery(self) -> Delivery {
        Delivery::Command(self.into())
    }
}

#[async_trait::async_trait]
impl Deliverable for RawForwarderCommand {
    type Target = dyn Backend;

    fn context(&self) -> DeliveryContext {
        DeliveryContext {
            direction: Direction::Command,
            kind: CommandKind::Raw.as_str(),
            gateway_id: self.gateway_id(),
            correlation_id: Some(self.raw_id()),
        }
    }

    async fn attempt(&self, backend: &Self::Target) -> Result<(), EndpointError> {
        backend.raw_command(self).await
    }

    fn log_failure(&self, e: &EndpointError) {
        error!(
            gateway_id = %self.gateway_id(),
            raw_id = %self.raw_id(),
            error = %e,
            "raw packet-forwarder command error"
        );
    }

    fn into_delivery(self) -> Delivery {
        Delivery::Command(self.into())
    }
}

/// Settings shared by all relay loops of a dispatcher
#[derive(Clone)]
pub(crate) struct RelaySettings {
    pub(crate) mode: DispatchMode,
    pub(crate) policy: Arc<dyn FailurePolicy>,
    pub(crate) metrics: RelayMetrics,
}

/// Deliver one message, consulting the failure policy on every failed attempt.
///
/// Errors end here: they are logged and handed to the policy, never returned.
pub(crate) async fn deliver<M: Deliverable>(
    message: M,
    target: Arc<M::Target>,
    policy: Arc<dyn FailurePolicy>,
    metrics: RelayMetrics,
) {
    let context = message.context();
    let labels = [context.direction.as_str(), context.kind];
    let _timer = metrics
        .dispatch_duration_seconds
        .with_label_values(&labels)
        .start_timer();

    let mut attempt = 0;
    loop {
        let error = match message.attempt(&*target).await {
            Ok(()) => {
                metrics.messages_forwarded_total.with_label_values(&labels).inc();
                return;
            }
            Err(e) => e,
        };

        message.log_failure(&error);

        match policy.on_failure(&context, attempt, &error) {
            FailureAction::Retry(backoff) => {
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            FailureAction::Drop => {
                metrics.messages_failed_total.with_label_values(&labels).inc();
                policy
                    .dead_letter(DeadLetter {
                        message: message.into_delivery(),
                        error: error.to_string(),
                        attempts: attempt + 1,
                    })
                    .await;
                return;
            }
        }
    }
}

/// Drain a backend event channel into the integration
pub(crate) async fn relay_events<E: Event>(
    mut events: Receiver<E>,
    integration: Arc<dyn Integration>,
    metadata: Arc<dyn MetadataProvider>,
    settings: RelaySettings,
) {
    let kind = E::KIND.as_str();
    let received = settings
        .metrics
        .messages_received_total
        .with_label_values(&[Direction::Event.as_str(), kind]);
    let mut pool = DispatchPool::new(Direction::Event, kind, settings.mode, &settings.metrics);

    debug!(event_type = kind, "Event relay loop started");

    while let Some(mut event) = events.recv().await {
        received.inc();
        event.enrich(metadata.as_ref());

        pool.submit(deliver(
            PreparedEvent::new(event),
            integration.clone(),
            settings.policy.clone(),
            settings.metrics.clone(),
        ))
        .await;
    }

    pool.drain().await;
    debug!(event_type = kind, "Event channel closed, relay loop stopped");
}

/// Drain an integration command channel into the backend
pub(crate) async fn relay_commands<C>(
    kind: CommandKind,
    mut commands: Receiver<C>,
    backend: Arc<dyn Backend>,
    settings: RelaySettings,
) where
    C: Deliverable<Target = dyn Backend>,
{
    let kind = kind.as_str();
    let received = settings
        .metrics
        .messages_received_total
        .with_label_values(&[Direction::Command.as_str(), kind]);
    let mut pool = DispatchPool::new(Direction::Command, kind, settings.mode, &settings.metrics);

    debug!(command = kind, "Command relay loop started");

    while let Some(command) = commands.recv().await {
        received.inc();
        pool.submit(deliver(
            command,
            backend.clone(),
            settings.policy.clone(),
            settings.metrics.clone(),
        ))
        .await;
    }

    pool.drain().await;
    debug!(command = kind, "Command channel closed, relay loop stopped");
}
