//! Failure policies applied when an endpoint call fails

use crate::config::FailurePolicyConfig;
use crate::error::EndpointError;
use bridge_api::{ControlCommand, EventEnvelope, GatewayId};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Direction a message travels in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Backend to integration
    Event,
    /// Integration to backend
    Command,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Event => "event",
            Direction::Command => "command",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing information of a message being delivered
#[derive(Clone, Copy, Debug)]
pub struct DeliveryContext {
    pub direction: Direction,
    pub kind: &'static str,
    pub gateway_id: GatewayId,
    pub correlation_id: Option<Uuid>,
}

/// A message the forwarder gave up on
#[derive(Clone, Debug, PartialEq)]
pub enum Delivery {
    Event(EventEnvelope),
    Command(ControlCommand),
}

#[derive(Debug)]
pub struct DeadLetter {
    pub message: Delivery,
    pub error: String,
    /// Number of attempts made, including the first one
    pub attempts: u32,
}

/// What to do after a failed attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureAction {
    Drop,
    Retry(Duration),
}

/// Decides the fate of messages whose endpoint call failed
#[async_trait::async_trait]
pub trait FailurePolicy: Send + Sync {
    fn name(&self) -> &'static str {
        "UnnamedPolicy"
    }

    /// Called after attempt number `attempt` (0-based) failed with `error`
    fn on_failure(
        &self,
        context: &DeliveryContext,
        attempt: u32,
        error: &EndpointError,
    ) -> FailureAction;

    /// Called once a message is dropped
    async fn dead_letter(&self, _letter: DeadLetter) {}
}

/// Best-effort forwarding: every failure drops the message
#[derive(Clone, Copy, Debug, Default)]
pub struct DropPolicy;

#[async_trait::async_trait]
impl FailurePolicy for DropPolicy {
    fn name(&self) -> &'static str {
        "DropPolicy"
    }

    fn on_failure(
        &self,
        _context: &DeliveryContext,
        _attempt: u32,
        _error: &EndpointError,
    ) -> FailureAction {
        FailureAction::Drop
    }
}

/// Retry failed calls with exponential backoff
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Calculate backoff duration for the given retry count
    pub fn backoff_duration(&self, retry_count: u32) -> Duration {
        let base = self.initial_backoff.as_millis() as u64;
        let exponential = 2u64.saturating_pow(retry_count);
        let backoff_ms = base
            .saturating_mul(exponential)
            .min(self.max_backoff.as_millis() as u64);
        Duration::from_millis(backoff_ms)
    }
}

#[async_trait::async_trait]
impl FailurePolicy for RetryPolicy {
    fn name(&self) -> &'static str {
        "RetryPolicy"
    }

    fn on_failure(
        &self,
        context: &DeliveryContext,
        attempt: u32,
        _error: &EndpointError,
    ) -> FailureAction {
        if attempt >= self.max_retries {
            return FailureAction::Drop;
        }

        let backoff = self.backoff_duration(attempt);
        debug!(
            gateway_id = %context.gateway_id,
            kind = context.kind,
            attempt,
            backoff_ms = backoff.as_millis() as u64,
            "Retrying delivery"
        );
        FailureAction::Retry(backoff)
    }
}

/// Wraps another policy and hands dropped messages to a queue
pub struct DeadLetterPolicy {
    inner: Arc<dyn FailurePolicy>,
    sender: mpsc::Sender<DeadLetter>,
}

impl DeadLetterPolicy {
    pub fn new(inner: Arc<dyn FailurePolicy>, sender: mpsc::Sender<DeadLetter>) -> Self {
        Self { inner, sender }
    }

    /// Dead-letter queue in front of the drop policy
    pub fn dropping(sender: mpsc::Sender<DeadLetter>) -> Self {
        Self::new(Arc::new(DropPolicy), sender)
    }
}

#[async_trait::async_trait]
impl FailurePolicy for DeadLetterPolicy {
    fn name(&self) -> &'static str {
        "DeadLetterPolicy"
    }

    fn on_failure(
        &self,
        context: &DeliveryContext,
        attempt: u32,
        error: &EndpointError,
    ) -> FailureAction {
        self.inner.on_failure(context, attempt, error)
    }

    async fn dead_letter(&self, letter: DeadLetter) {
        if let Err(e) = self.sender.try_send(letter) {
            warn!(error = %e, "Dead-letter queue rejected message");
        }
    }
}

/// Build the policy selected in configuration
pub fn from_config(config: &FailurePolicyConfig) -> Arc<dyn FailurePolicy> {
    match config {
        FailurePolicyConfig::Drop => Arc::new(DropPolicy),
        FailurePolicyConfig::Retry {
            max_retries,
            initial_backoff_ms,
            max_backoff_ms,
        } => Arc::new(RetryPolicy {
            max_retries: *max_retries,
            initial_backoff: Duration::from_millis(*initial_backoff_ms),
            max_backoff: Duration::from_millis(*max_backoff_ms),
        }),
    }
}
