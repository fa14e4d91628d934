//! Wire models shared by ledger gateway clients and the peers they talk to.

pub mod blocks;
pub mod discovery;

pub use blocks::{Block, BlockEvent, FilteredBlock, FilteredTransaction, Transaction};
pub use discovery::{DiscoveryRequest, DiscoveryResponse};

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

/// Protocol-level errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown delivery mode: {0}")]
    UnknownDeliveryMode(String),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Granularity of block events a peer connection registers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Complete blocks including transaction payloads.
    #[default]
    Full,
    /// Block number plus transaction ids and validation results only.
    Filtered,
}

impl DeliveryMode {
    pub fn from_filter(filtered: bool) -> Self {
        if filtered {
            Self::Filtered
        } else {
            Self::Full
        }
    }

    pub fn is_filtered(self) -> bool {
        matches!(self, Self::Filtered)
    }
}

impl Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("full"),
            Self::Filtered => f.write_str("filtered"),
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "filtered" => Ok(Self::Filtered),
            other => Err(ProtocolError::UnknownDeliveryMode(other.to_string())),
        }
    }
}

/// Network address of a peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerEndpoint {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msp_id: Option<String>,
}

impl PeerEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            msp_id: None,
        }
    }

    pub fn with_msp_id(mut self, msp_id: impl Into<String>) -> Self {
        self.msp_id = Some(msp_id.into());
        self
    }
}

impl Display for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}

/// Network address of an ordering node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrdererEndpoint {
    pub name: String,
    pub url: String,
}

impl OrdererEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// What a peer is used for within one channel.
///
/// Field names follow the connection profile format, where every role
/// defaults to enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRoles {
    #[serde(default = "enabled")]
    pub endorsing_peer: bool,
    #[serde(default = "enabled")]
    pub chaincode_query: bool,
    #[serde(default = "enabled")]
    pub ledger_query: bool,
    #[serde(default = "enabled")]
    pub event_source: bool,
    #[serde(default = "enabled")]
    pub discover: bool,
}

fn enabled() -> bool {
    true
}

impl PeerRoles {
    pub const fn all() -> Self {
        Self {
            endorsing_peer: true,
            chaincode_query: true,
            ledger_query: true,
            event_source: true,
            discover: true,
        }
    }
}

impl Default for PeerRoles {
    fn default() -> Self {
        Self::all()
    }
}
