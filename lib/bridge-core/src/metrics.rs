//! Prometheus metrics for the relay loops

use anyhow::Result;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Prometheus metrics collector for relayed messages.
///
/// Clones share the same registry and metrics.
#[derive(Clone)]
pub struct RelayMetrics {
    /// Messages taken off an endpoint channel
    pub messages_received_total: CounterVec,
    /// Messages accepted by the opposite endpoint
    pub messages_forwarded_total: CounterVec,
    /// Messages dropped after a failed endpoint call
    pub messages_failed_total: CounterVec,
    /// Dispatch tasks currently running
    pub dispatch_in_flight: IntGaugeVec,
    /// Time spent delivering a message, retries included
    pub dispatch_duration_seconds: HistogramVec,
    /// Subscription changes applied to the integration
    pub subscription_changes_total: CounterVec,
    /// Prometheus registry for metrics
    pub registry: Arc<Registry>,
}

impl RelayMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let messages_received_total = CounterVec::new(
            Opts::new("bridge_messages_received_total", "Messages received from an endpoint"),
            &["direction", "kind"],
        )?;

        let messages_forwarded_total = CounterVec::new(
            Opts::new(
                "bridge_messages_forwarded_total",
                "Messages delivered to the opposite endpoint",
            ),
            &["direction", "kind"],
        )?;

        let messages_failed_total = CounterVec::new(
            Opts::new(
                "bridge_messages_failed_total",
                "Messages dropped after a failed delivery",
            ),
            &["direction", "kind"],
        )?;

        let dispatch_in_flight = IntGaugeVec::new(
            Opts::new("bridge_dispatch_in_flight", "Dispatch tasks currently running"),
            &["direction", "kind"],
        )?;

        let dispatch_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "bridge_dispatch_duration_seconds",
                "Message delivery latency in seconds",
            ),
            &["direction", "kind"],
        )?;

        let subscription_changes_total = CounterVec::new(
            Opts::new(
                "bridge_subscription_changes_total",
                "Gateway subscription changes by desired state",
            ),
            &["subscribe"],
        )?;

        registry.register(Box::new(messages_received_total.clone()))?;
        registry.register(Box::new(messages_forwarded_total.clone()))?;
        registry.register(Box::new(messages_failed_total.clone()))?;
        registry.register(Box::new(dispatch_in_flight.clone()))?;
        registry.register(Box::new(dispatch_duration_seconds.clone()))?;
        registry.register(Box::new(subscription_changes_total.clone()))?;

        Ok(Self {
            messages_received_total,
            messages_forwarded_total,
            messages_failed_total,
            dispatch_in_flight,
            dispatch_duration_seconds,
            subscription_changes_total,
            registry,
        })
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
