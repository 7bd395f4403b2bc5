use crate::GatewayId;
use serde::{Deserialize, Serialize};

/// Desired subscription state of a gateway, usually emitted on connect/disconnect
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionIntent {
    pub gateway_id: GatewayId,
    pub subscribe: bool,
}

impl SubscriptionIntent {
    pub fn subscribe(gateway_id: GatewayId) -> Self {
        Self {
            gateway_id,
            subscribe: true,
        }
    }

    pub fn unsubscribe(gateway_id: GatewayId) -> Self {
        Self {
            gateway_id,
            subscribe: false,
        }
    }
}
