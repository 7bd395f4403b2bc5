//! Subscription registry for integrations that track gateway subscriptions

use bridge_api::GatewayId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// SubscriptionRegistry maps gateways to their current subscription state.
///
/// Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    gateways: Arc<RwLock<HashMap<GatewayId, bool>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the subscription state of a gateway, returning the previous state
    pub async fn set(&self, gateway_id: GatewayId, subscribed: bool) -> Option<bool> {
        let mut gateways = self.gateways.write().await;
        let previous = gateways.insert(gateway_id, subscribed);
        debug!(gateway_id = %gateway_id, subscribed, "Updated gateway subscription");
        previous
    }

    pub async fn is_subscribed(&self, gateway_id: &GatewayId) -> bool {
        let gateways = self.gateways.read().await;
        gateways.get(gateway_id).copied().unwrap_or(false)
    }

    /// List gateways that are currently subscribed
    pub async fn subscribed_gateways(&self) -> Vec<GatewayId> {
        let gateways = self.gateways.read().await;
        let mut ids: Vec<GatewayId> = gateways
            .iter()
            .filter(|(_, subscribed)| **subscribed)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Number of gateways with a known state, subscribed or not
    pub async fn len(&self) -> usize {
        self.gateways.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.gateways.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_query() {
        let registry = SubscriptionRegistry::new();
        let id = GatewayId::new([1; 8]);

        assert!(!registry.is_subscribed(&id).await);
        assert_eq!(registry.set(id, true).await, None);
        assert!(registry.is_subscribed(&id).await);

        assert_eq!(registry.set(id, false).await, Some(true));
        assert!(!registry.is_subscribed(&id).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_subscribed_gateways_sorted() {
        let registry = SubscriptionRegistry::new();
        registry.set(GatewayId::new([3; 8]), true).await;
        registry.set(GatewayId::new([1; 8]), true).await;
        registry.set(GatewayId::new([2; 8]), false).await;

        assert_eq!(
            registry.subscribed_gateways().await,
            vec![GatewayId::new([1; 8]), GatewayId::new([3; 8])]
        );
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let registry = SubscriptionRegistry::new();
        let clone = registry.clone();
        clone.set(GatewayId::new([9; 8]), true).await;
        assert!(registry.is_subscribed(&GatewayId::new([9; 8])).await);
    }
}
