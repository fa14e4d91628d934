use super::cache::Release;
use crate::error::{GatewayError, GatewayResult};
use crate::options::PeerConnectionOptions;
use crate::transport::{BlockStream, PeerConnection};
use async_trait::async_trait;
use futures::future::join_all;
use ledger_protocol::{OrdererEndpoint, PeerEndpoint, PeerRoles};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// How a network's topology was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkSource {
    Configured,
    Discovered,
}

/// One peer connection together with the roles the peer plays on the channel.
#[derive(Clone)]
pub struct ChannelPeer {
    connection: Arc<dyn PeerConnection>,
    roles: PeerRoles,
}

impl ChannelPeer {
    pub(crate) fn new(connection: Arc<dyn PeerConnection>, roles: PeerRoles) -> Self {
        Self { connection, roles }
    }

    pub fn name(&self) -> &str {
        &self.connection.endpoint().name
    }

    pub fn endpoint(&self) -> &PeerEndpoint {
        self.connection.endpoint()
    }

    pub fn roles(&self) -> PeerRoles {
        self.roles
    }

    pub fn options(&self) -> PeerConnectionOptions {
        self.connection.options()
    }

    pub fn is_shutdown(&self) -> bool {
        self.connection.is_shutdown()
    }

    pub fn connection(&self) -> &Arc<dyn PeerConnection> {
        &self.connection
    }
}

impl fmt::Debug for ChannelPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelPeer")
            .field("endpoint", self.endpoint())
            .field("roles", &self.roles)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

/// A resolved channel: its name, connected peers and orderers.
#[derive(Debug)]
pub struct Channel {
    name: String,
    peers: Vec<ChannelPeer>,
    orderers: Vec<OrdererEndpoint>,
    shutdown: AtomicBool,
}

impl Channel {
    pub(crate) fn new(
        name: impl Into<String>,
        peers: Vec<ChannelPeer>,
        orderers: Vec<OrdererEndpoint>,
    ) -> Self {
        Self {
            name: name.into(),
            peers,
            orderers,
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn peers(&self) -> &[ChannelPeer] {
        &self.peers
    }

    pub fn peer(&self, name: &str) -> Option<&ChannelPeer> {
        self.peers.iter().find(|p| p.name() == name)
    }

    pub fn peer_options(&self, name: &str) -> Option<PeerConnectionOptions> {
        self.peer(name).map(ChannelPeer::options)
    }

    pub fn orderers(&self) -> &[OrdererEndpoint] {
        &self.orderers
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Opens a block-event stream through the first open event-source peer.
    pub fn subscribe_blocks(&self) -> GatewayResult<BlockStream> {
        if self.is_shutdown() {
            return Err(GatewayError::Closed);
        }
        let peer = self
            .peers
            .iter()
            .find(|p| p.roles.event_source && !p.is_shutdown())
            .ok_or_else(|| GatewayError::connection(&self.name, "no open event source peer"))?;
        debug!(channel = self.name.as_str(), peer = peer.name(), "subscribing to blocks");
        peer.connection.subscribe_blocks()
    }

    pub(crate) async fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        shutdown_peers(&self.name, &self.peers).await;
    }
}

/// Shuts every peer down, logging failures instead of stopping at the first one.
pub(crate) async fn shutdown_peers(channel: &str, peers: &[ChannelPeer]) {
    let results = join_all(peers.iter().map(|p| p.connection.shutdown())).await;
    for (peer, result) in peers.iter().zip(results) {
        if let Err(err) = result {
            warn!(channel, peer = peer.name(), %err, "peer shutdown failed");
        }
    }
}

/// Handle to one channel of the ledger network, owned by a gateway's cache.
#[derive(Debug)]
pub struct Network {
    channel: Channel,
    options: PeerConnectionOptions,
    source: NetworkSource,
}

impl Network {
    pub(crate) fn new(channel: Channel, options: PeerConnectionOptions, source: NetworkSource) -> Self {
        Self {
            channel,
            options,
            source,
        }
    }

    pub fn name(&self) -> &str {
        self.channel.name()
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn options(&self) -> PeerConnectionOptions {
        self.options
    }

    pub fn source(&self) -> NetworkSource {
        self.source
    }

    pub(crate) async fn shutdown(&self) {
        self.channel.shutdown().await;
        debug!(channel = self.name(), "network shut down");
    }
}

#[async_trait]
impl Release for Network {
    async fn release(&self) {
        self.shutdown().await;
    }
}
