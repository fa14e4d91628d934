//! Seams to the peer-facing collaborators a gateway drives.
//!
//! The gateway never speaks a wire protocol itself. It asks a
//! [`PeerConnector`] for connections and a [`DiscoveryClient`] for channel
//! membership; both are supplied through the builder.

mod http;
mod sim;

pub use http::HttpDiscoveryClient;
pub use sim::{SimDiscovery, SimNetwork, SimPeerConnection, SimPeerConnector};

use crate::error::GatewayResult;
use crate::options::PeerConnectionOptions;
use async_trait::async_trait;
use futures::stream::BoxStream;
use ledger_identity::Identity;
use ledger_protocol::{BlockEvent, DiscoveryRequest, DiscoveryResponse, PeerEndpoint};
use std::fmt;
use std::sync::Arc;

/// Block events as seen through one peer connection.
pub type BlockStream = BoxStream<'static, BlockEvent>;

/// Everything a connector needs to open one peer connection for a channel.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub channel: String,
    pub endpoint: PeerEndpoint,
    pub options: PeerConnectionOptions,
    pub identity: Identity,
}

#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(&self, request: ConnectRequest) -> GatewayResult<Arc<dyn PeerConnection>>;
}

/// A live connection to one peer on behalf of one channel.
#[async_trait]
pub trait PeerConnection: Send + Sync + fmt::Debug {
    fn endpoint(&self) -> &PeerEndpoint;

    /// Options the connection registered with.
    fn options(&self) -> PeerConnectionOptions;

    fn is_shutdown(&self) -> bool;

    /// Releases the connection. Calling it again is a no-op.
    async fn shutdown(&self) -> GatewayResult<()>;

    /// Opens a block-event stream in the connection's delivery mode.
    fn subscribe_blocks(&self) -> GatewayResult<BlockStream>;
}

#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    async fn discover(
        &self,
        bootstrap: &PeerEndpoint,
        request: &DiscoveryRequest,
    ) -> GatewayResult<DiscoveryResponse>;
}
