//! Gateway identifiers

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayIdError {
    #[error("invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("expected 8 bytes, got {0}")]
    InvalidLength(usize),
}

/// GatewayId is the 8-byte EUI of a physical gateway
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GatewayId([u8; 8]);

impl GatewayId {
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Copy up to 8 bytes of a raw payload field, zero-padding short input
    pub fn from_bytes_lossy(raw: &[u8]) -> Self {
        let mut bytes = [0u8; 8];
        let n = raw.len().min(bytes.len());
        bytes[..n].copy_from_slice(&raw[..n]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl From<[u8; 8]> for GatewayId {
    fn from(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for GatewayId {
    type Error = GatewayIdError;

    fn try_from(raw: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; 8] = raw
            .try_into()
            .map_err(|_| GatewayIdError::InvalidLength(raw.len()))?;
        Ok(Self(bytes))
    }
}

impl FromStr for GatewayId {
    type Err = GatewayIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let raw = hex::decode(s)?;
        Self::try_from(raw.as_slice())
    }
}

impl fmt::Display for GatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Serialize for GatewayId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GatewayId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
