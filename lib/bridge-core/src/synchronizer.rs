use crate::endpoint::Integration;
use crate::metrics::RelayMetrics;
use bridge_api::SubscriptionIntent;
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error};

/// Mirrors the backend's view of connected gateways onto the integration.
///
/// Intents are applied one at a time, in the order the backend emitted them,
/// so a subscribe followed by an unsubscribe for the same gateway can never
/// be reordered.
pub struct SubscriptionSynchronizer {
    integration: Arc<dyn Integration>,
    metrics: RelayMetrics,
}

impl SubscriptionSynchronizer {
    pub fn new(integration: Arc<dyn Integration>, metrics: RelayMetrics) -> Self {
        Self {
            integration,
            metrics,
        }
    }

    /// Apply intents until the backend closes the channel
    pub async fn run(self, mut intents: Receiver<SubscriptionIntent>) {
        debug!("Subscription synchronizer started");
        while let Some(intent) = intents.recv().await {
            self.apply(intent).await;
        }
        debug!("Subscription channel closed, synchronizer stopped");
    }

    /// Apply one intent. Failures are logged and the intent is not retried.
    pub async fn apply(&self, intent: SubscriptionIntent) {
        let SubscriptionIntent {
            gateway_id,
            subscribe,
        } = intent;

        match self
            .integration
            .set_gateway_subscription(subscribe, gateway_id)
            .await
        {
            Ok(()) => {
                self.metrics
                    .subscription_changes_total
                    .with_label_values(&[if subscribe { "true" } else { "false" }])
                    .inc();
                debug!(gateway_id = %gateway_id, subscribe, "Gateway subscription updated");
            }
            Err(e) => {
                error!(
                    gateway_id = %gateway_id,
                    subscribe,
                    error = %e,
                    "set gateway subscription error"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockIntegration;
    use bridge_api::GatewayId;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_intents_applied_in_order() {
        let (integration, _senders) = MockIntegration::new();
        let metrics = RelayMetrics::new().unwrap();
        let synchronizer = SubscriptionSynchronizer::new(integration.clone(), metrics.clone());
        let (tx, rx) = mpsc::channel(8);

        let a = GatewayId::new([0xaa; 8]);
        let b = GatewayId::new([0xbb; 8]);
        tx.send(SubscriptionIntent::subscribe(a)).await.unwrap();
        tx.send(SubscriptionIntent::subscribe(b)).await.unwrap();
        tx.send(SubscriptionIntent::unsubscribe(a)).await.unwrap();
        drop(tx);

        synchronizer.run(rx).await;

        assert_eq!(
            integration.subscriptions(),
            vec![(true, a), (true, b), (false, a)]
        );
        assert_eq!(
            metrics
                .subscription_changes_total
                .with_label_values(&["true"])
                .get(),
            2.0
        );
        assert_eq!(
            metrics
                .subscription_changes_total
                .with_label_values(&["false"])
                .get(),
            1.0
        );
    }

    #[tokio::test]
    async fn test_failed_intent_is_not_retried() {
        let (integration, _senders) = MockIntegration::new();
        let failing = GatewayId::new([1; 8]);
        let healthy = GatewayId::new([2; 8]);
        integration.fail_for(failing);

        let synchronizer =
            SubscriptionSynchronizer::new(integration.clone(), RelayMetrics::new().unwrap());
        let (tx, rx) = mpsc::channel(8);
        tx.send(SubscriptionIntent::subscribe(failing)).await.unwrap();
        tx.send(SubscriptionIntent::subscribe(healthy)).await.unwrap();
        drop(tx);

        synchronizer.run(rx).await;

        assert_eq!(integration.subscription_attempts(), 2);
        assert_eq!(integration.subscriptions(), vec![(true, healthy)]);
    }
}
