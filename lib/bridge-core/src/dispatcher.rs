//! Wiring of endpoints, synchronizer and relay loops

use crate::config::ForwarderConfig;
use crate::endpoint::{Backend, Integration};
use crate::error::{BridgeError, Result};
use crate::metadata::{MetadataProvider, StaticMetadata};
use crate::metrics::RelayMetrics;
use crate::policy::{self, FailurePolicy};
use crate::relay::{relay_commands, relay_events, RelaySettings};
use crate::synchronizer::SubscriptionSynchronizer;
use bridge_api::{CommandKind, GatewayId};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

/// Collects the collaborators of a [`Dispatcher`]
#[derive(Default)]
pub struct DispatcherBuilder {
    backend: Option<Arc<dyn Backend>>,
    integration: Option<Arc<dyn Integration>>,
    metadata: Option<Arc<dyn MetadataProvider>>,
    failure_policy: Option<Arc<dyn FailurePolicy>>,
    metrics: Option<RelayMetrics>,
    config: ForwarderConfig,
}

impl DispatcherBuilder {
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn integration(mut self, integration: Arc<dyn Integration>) -> Self {
        self.integration = Some(integration);
        self
    }

    /// Metadata merged into gateway stats. Defaults to none.
    pub fn metadata(mut self, metadata: Arc<dyn MetadataProvider>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Overrides the policy selected in the configuration
    pub fn failure_policy(mut self, policy: Arc<dyn FailurePolicy>) -> Self {
        self.failure_policy = Some(policy);
        self
    }

    pub fn metrics(mut self, metrics: RelayMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(mut self, config: ForwarderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Dispatcher> {
        let backend = self.backend.ok_or(BridgeError::MissingBackend)?;
        let integration = self.integration.ok_or(BridgeError::MissingIntegration)?;
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => RelayMetrics::new()?,
        };
        let failure_policy = self
            .failure_policy
            .unwrap_or_else(|| policy::from_config(&self.config.failure_policy));
        let metadata = self
            .metadata
            .unwrap_or_else(|| Arc::new(StaticMetadata::default()));

        Ok(Dispatcher {
            backend,
            integration,
            metadata,
            failure_policy,
            metrics,
            config: self.config,
        })
    }
}

/// Dispatcher connects a backend to an integration.
///
/// Nothing runs until [`Dispatcher::setup`] is called.
pub struct Dispatcher {
    backend: Arc<dyn Backend>,
    integration: Arc<dyn Integration>,
    metadata: Arc<dyn MetadataProvider>,
    failure_policy: Arc<dyn FailurePolicy>,
    metrics: RelayMetrics,
    config: ForwarderConfig,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Subscribe the configured gateways and start the relay loops.
    ///
    /// Gateway ids are all validated before the first subscription call. Any
    /// error aborts before a single loop has been spawned, and neither
    /// endpoint's channels are taken unless both are available.
    pub async fn setup(self) -> Result<RelayHandle> {
        let always_subscribed = self
            .config
            .gateways
            .iter()
            .map(|entry| {
                entry
                    .gateway_id
                    .parse::<GatewayId>()
                    .map_err(|source| BridgeError::InvalidGatewayId {
                        value: entry.gateway_id.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        for gateway_id in &always_subscribed {
            self.integration
                .set_gateway_subscription(true, *gateway_id)
                .await
                .map_err(|source| BridgeError::Subscribe {
                    gateway_id: *gateway_id,
                    source,
                })?;
            info!(gateway_id = %gateway_id, "Subscribed always-on gateway");
        }

        // Neither side gives up its channels unless both still can
        if !self.backend.has_channels() {
            return Err(BridgeError::ChannelsUnavailable(self.backend.name()));
        }
        if !self.integration.has_channels() {
            return Err(BridgeError::ChannelsUnavailable(self.integration.name()));
        }
        let backend_channels = self
            .backend
            .take_channels()
            .ok_or(BridgeError::ChannelsUnavailable(self.backend.name()))?;
        let integration_channels = self
            .integration
            .take_channels()
            .ok_or(BridgeError::ChannelsUnavailable(self.integration.name()))?;

        let settings = RelaySettings {
            mode: self.config.dispatch,
            policy: self.failure_policy.clone(),
            metrics: self.metrics.clone(),
        };

        let mut handle = RelayHandle {
            tasks: Vec::with_capacity(8),
            always_subscribed,
        };

        let synchronizer =
            SubscriptionSynchronizer::new(self.integration.clone(), self.metrics.clone());
        handle.spawn(
            "subscriptions",
            synchronizer.run(backend_channels.subscriptions),
        );

        handle.spawn(
            "uplink_frames",
            relay_events(
                backend_channels.uplink_frames,
                self.integration.clone(),
                self.metadata.clone(),
                settings.clone(),
            ),
        );
        handle.spawn(
            "gateway_stats",
            relay_events(
                backend_channels.gateway_stats,
                self.integration.clone(),
                self.metadata.clone(),
                settings.clone(),
            ),
        );
        handle.spawn(
            "downlink_tx_acks",
            relay_events(
                backend_channels.downlink_tx_acks,
                self.integration.clone(),
                self.metadata.clone(),
                settings.clone(),
            ),
        );
        handle.spawn(
            "raw_events",
            relay_events(
                backend_channels.raw_events,
                self.integration.clone(),
                self.metadata.clone(),
                settings.clone(),
            ),
        );

        handle.spawn(
            "downlink_frames",
            relay_commands(
                CommandKind::Down,
                integration_channels.downlink_frames,
                self.backend.clone(),
                settings.clone(),
            ),
        );
        handle.spawn(
            "gateway_configurations",
            relay_commands(
                CommandKind::Config,
                integration_channels.gateway_configurations,
                self.backend.clone(),
                settings.clone(),
            ),
        );
        handle.spawn(
            "raw_commands",
            relay_commands(
                CommandKind::Raw,
                integration_channels.raw_commands,
                self.backend.clone(),
                settings,
            ),
        );

        info!(
            backend = self.backend.name(),
            integration = self.integration.name(),
            failure_policy = self.failure_policy.name(),
            always_subscribed = handle.always_subscribed.len(),
            "Forwarder started"
        );

        Ok(handle)
    }
}

/// Running relay loops of a dispatcher
pub struct RelayHandle {
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    always_subscribed: Vec<GatewayId>,
}

impl RelayHandle {
    fn spawn<F>(&mut self, name: &'static str, relay: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(relay.instrument(info_span!("relay", channel = name)));
        self.tasks.push((name, task));
    }

    /// Gateways subscribed during setup
    pub fn always_subscribed(&self) -> &[GatewayId] {
        &self.always_subscribed
    }

    /// Number of loops that have not stopped yet
    pub fn running(&self) -> usize {
        self.tasks
            .iter()
            .filter(|(_, task)| !task.is_finished())
            .count()
    }

    /// Wait for every loop to stop.
    ///
    /// Loops stop once their channel is closed and their in-flight deliveries
    /// have completed.
    pub async fn join(self) {
        for (name, task) in self.tasks {
            report(name, task.await);
        }
    }

    /// Wait up to `grace` for the loops to stop, then abort the remaining ones.
    ///
    /// Returns false if any loop had to be aborted.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        let mut drained = true;

        for (name, task) in self.tasks.iter_mut() {
            match tokio::time::timeout_at(deadline, &mut *task).await {
                Ok(result) => report(*name, result),
                Err(_) => {
                    task.abort();
                    warn!(channel = *name, "relay loop aborted after grace period");
                    drained = false;
                }
            }
        }

        drained
    }

    /// Stop every loop immediately, abandoning in-flight deliveries
    pub fn abort(&self) {
        for (_, task) in &self.tasks {
            task.abort();
        }
    }
}

fn report(name: &'static str, result: std::result::Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(channel = name, "relay loop panicked");
        }
    }
}
