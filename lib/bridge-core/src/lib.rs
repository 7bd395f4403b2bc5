//! Bidirectional forwarding between a gateway backend and an integration
//!
//! This library provides:
//! - Backend and Integration endpoint contracts
//! - Subscription synchronizer mirroring backend connection state
//! - Relay loops for events (backend to integration) and commands (integration to backend)
//! - Dispatcher wiring both endpoints together, with pluggable failure policies

pub mod config;
mod dispatch;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod metadata;
pub mod metrics;
pub mod policy;
pub mod registry;
pub mod relay;
pub mod synchronizer;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{DispatchMode, FailurePolicyConfig, ForwarderConfig, GatewayEntry};
pub use dispatcher::{Dispatcher, DispatcherBuilder, RelayHandle};
pub use endpoint::{Backend, BackendChannels, Integration, IntegrationChannels};
pub use error::{BridgeError, EndpointError, Result};
pub use metadata::{MetadataProvider, StaticMetadata};
pub use metrics::RelayMetrics;
pub use policy::{
    DeadLetter, DeadLetterPolicy, Delivery, DeliveryContext, Direction, DropPolicy,
    FailureAction, FailurePolicy, RetryPolicy,
};
pub use registry::SubscriptionRegistry;
pub use relay::Event;
pub use synchronizer::SubscriptionSynchronizer;
