use bridge_api::{GatewayId, GatewayIdError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that abort forwarder setup
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("backend is not set")]
    MissingBackend,

    #[error("integration is not set")]
    MissingIntegration,

    #[error("unmarshal gateway_id error: {value}: {source}")]
    InvalidGatewayId {
        value: String,
        #[source]
        source: GatewayIdError,
    },

    #[error("subscribe gateway {gateway_id} error: {source}")]
    Subscribe {
        gateway_id: GatewayId,
        #[source]
        source: EndpointError,
    },

    #[error("{0} channels were already taken")]
    ChannelsUnavailable(&'static str),

    #[error("metrics registration error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Errors returned by backend and integration calls
#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("endpoint unavailable: {0}")]
    Unavailable(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
