//! Channel membership queries answered by a bootstrap peer.

use crate::{OrdererEndpoint, PeerEndpoint};
use ledger_identity::{Fingerprint, Identity};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Asks a peer's discovery service who currently serves `channel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    pub request_id: Uuid,
    pub channel: String,
    pub msp_id: String,
    pub requester: Fingerprint,
}

impl DiscoveryRequest {
    pub fn new(channel: impl Into<String>, identity: &Identity) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            channel: channel.into(),
            msp_id: identity.msp_id().to_string(),
            requester: identity.fingerprint().clone(),
        }
    }
}

/// Answer to a [`DiscoveryRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DiscoveryResponse {
    Members {
        channel: String,
        peers: Vec<PeerEndpoint>,
        #[serde(default)]
        orderers: Vec<OrdererEndpoint>,
    },
    NotFound {
        channel: String,
    },
}

impl DiscoveryResponse {
    pub fn channel(&self) -> &str {
        match self {
            Self::Members { channel, .. } | Self::NotFound { channel } => channel,
        }
    }
}
