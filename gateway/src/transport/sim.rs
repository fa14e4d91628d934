//! In-process network: peers, channel memberships and block delivery held in
//! memory, for local runs and tests.

use super::{BlockStream, ConnectRequest, DiscoveryClient, PeerConnection, PeerConnector};
use crate::error::{GatewayError, GatewayResult};
use crate::options::PeerConnectionOptions;
use crate::profile::ConnectionProfile;
use async_trait::async_trait;
use futures::stream;
use ledger_identity::Fingerprint;
use ledger_protocol::{
    Block, BlockEvent, DiscoveryRequest, DiscoveryResponse, OrdererEndpoint, PeerEndpoint,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

struct SimPeer {
    endpoint: PeerEndpoint,
    reachable: bool,
}

#[derive(Default)]
struct SimChannel {
    peers: Vec<String>,
    orderers: Vec<OrdererEndpoint>,
}

#[derive(Default)]
struct SimState {
    peers: RwLock<HashMap<String, SimPeer>>,
    channels: RwLock<HashMap<String, SimChannel>>,
    connections: Mutex<Vec<Arc<SimPeerConnection>>>,
    discovery_delay: RwLock<Duration>,
    discovery_queries: AtomicUsize,
}

/// Shared broker behind [`SimPeerConnector`] and [`SimDiscovery`].
///
/// Every connection opened through the network stays on its connection list
/// after shutdown so tests can inspect it. Long-running users call
/// [`SimNetwork::prune_shutdown`] to drop the closed ones.
#[derive(Clone, Default)]
pub struct SimNetwork {
    inner: Arc<SimState>,
}

impl SimNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every peer of `profile` and every channel it declares.
    pub fn from_profile(profile: &ConnectionProfile) -> Self {
        let network = Self::new();
        for name in profile.peers.keys() {
            if let Some(endpoint) = profile.peer_endpoint(name) {
                network.add_peer(endpoint);
            }
        }
        for name in profile.channel_names() {
            if let Some(topology) = profile.channel(&name) {
                network.create_channel(
                    &name,
                    topology.peers.iter().map(|m| m.endpoint.url.clone()),
                );
                for orderer in topology.orderers {
                    network.add_orderer(&name, orderer);
                }
            }
        }
        network
    }

    pub fn add_peer(&self, endpoint: PeerEndpoint) {
        let mut peers = self.inner.peers.write().unwrap_or_else(PoisonError::into_inner);
        peers.insert(
            endpoint.url.clone(),
            SimPeer {
                endpoint,
                reachable: true,
            },
        );
    }

    /// Makes a peer refuse (or accept again) connections and discovery queries.
    pub fn set_reachable(&self, url: &str, reachable: bool) {
        let mut peers = self.inner.peers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(peer) = peers.get_mut(url) {
            peer.reachable = reachable;
        }
    }

    /// Creates (or replaces) a channel served by the peers at `peer_urls`.
    pub fn create_channel<I, S>(&self, name: &str, peer_urls: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut channels = self
            .inner
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        channels.insert(
            name.to_string(),
            SimChannel {
                peers: peer_urls.into_iter().map(Into::into).collect(),
                orderers: Vec::new(),
            },
        );
    }

    pub fn add_orderer(&self, channel: &str, orderer: OrdererEndpoint) {
        let mut channels = self
            .inner
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(channel.to_string())
            .or_default()
            .orderers
            .push(orderer);
    }

    pub fn remove_channel(&self, name: &str) -> bool {
        let mut channels = self
            .inner
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        channels.remove(name).is_some()
    }

    /// Artificial latency applied to every discovery answer.
    pub fn set_discovery_delay(&self, delay: Duration) {
        *self
            .inner
            .discovery_delay
            .write()
            .unwrap_or_else(PoisonError::into_inner) = delay;
    }

    pub fn discovery_queries(&self) -> usize {
        self.inner.discovery_queries.load(Ordering::SeqCst)
    }

    /// Every connection ever opened through this network, shut down or not.
    pub fn connections(&self) -> Vec<Arc<SimPeerConnection>> {
        self.inner
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forgets connections that have been shut down. Returns how many were
    /// removed.
    pub fn prune_shutdown(&self) -> usize {
        let mut connections = self
            .inner
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = connections.len();
        connections.retain(|conn| !conn.is_shutdown());
        before - connections.len()
    }

    pub fn open_connections(&self) -> usize {
        self.connections()
            .iter()
            .filter(|conn| !conn.is_shutdown())
            .count()
    }

    /// Delivers `block` to every open connection on its channel, shaped by
    /// each connection's delivery mode. Returns the number of connections
    /// that had at least one subscriber.
    pub fn publish_block(&self, block: &Block) -> usize {
        self.connections()
            .iter()
            .filter(|conn| conn.channel == block.channel && !conn.is_shutdown())
            .filter(|conn| conn.deliver(block))
            .count()
    }

    pub fn connector(&self) -> SimPeerConnector {
        SimPeerConnector {
            network: self.clone(),
        }
    }

    pub fn discovery(&self) -> SimDiscovery {
        SimDiscovery {
            network: self.clone(),
        }
    }

    fn reachable_peer(&self, url: &str) -> GatewayResult<PeerEndpoint> {
        let peers = self.inner.peers.read().unwrap_or_else(PoisonError::into_inner);
        match peers.get(url) {
            Some(peer) if peer.reachable => Ok(peer.endpoint.clone()),
            Some(_) => Err(GatewayError::connection(url, "peer unreachable")),
            None => Err(GatewayError::connection(url, "unknown peer")),
        }
    }

    fn membership(&self, channel: &str) -> Option<(Vec<PeerEndpoint>, Vec<OrdererEndpoint>)> {
        let channels = self
            .inner
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let sim_channel = channels.get(channel)?;
        let peers = self.inner.peers.read().unwrap_or_else(PoisonError::into_inner);
        let members = sim_channel
            .peers
            .iter()
            .filter_map(|url| peers.get(url).map(|p| p.endpoint.clone()))
            .collect();
        Some((members, sim_channel.orderers.clone()))
    }
}

#[derive(Clone)]
pub struct SimPeerConnector {
    network: SimNetwork,
}

#[async_trait]
impl PeerConnector for SimPeerConnector {
    async fn connect(&self, request: ConnectRequest) -> GatewayResult<Arc<dyn PeerConnection>> {
        let endpoint = self.network.reachable_peer(&request.endpoint.url)?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let connection = Arc::new(SimPeerConnection {
            endpoint,
            channel: request.channel,
            options: request.options,
            client: request.identity.fingerprint().clone(),
            shutdown: AtomicBool::new(false),
            events: Mutex::new(Some(events)),
        });
        debug!(
            peer = %connection.endpoint,
            channel = connection.channel.as_str(),
            delivery = %connection.options.delivery_mode(),
            "peer connection opened"
        );

        self.network
            .inner
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&connection));
        Ok(connection as Arc<dyn PeerConnection>)
    }
}

#[derive(Debug)]
pub struct SimPeerConnection {
    endpoint: PeerEndpoint,
    channel: String,
    options: PeerConnectionOptions,
    client: Fingerprint,
    shutdown: AtomicBool,
    events: Mutex<Option<broadcast::Sender<BlockEvent>>>,
}

impl SimPeerConnection {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Fingerprint of the identity the connection was opened with.
    pub fn client(&self) -> &Fingerprint {
        &self.client
    }

    fn deliver(&self, block: &Block) -> bool {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        match events.as_ref() {
            Some(tx) => tx
                .send(BlockEvent::for_mode(block, self.options.delivery_mode()))
                .is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl PeerConnection for SimPeerConnection {
    fn endpoint(&self) -> &PeerEndpoint {
        &self.endpoint
    }

    fn options(&self) -> PeerConnectionOptions {
        self.options
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) -> GatewayResult<()> {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // Dropping the sender ends every open block stream.
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!(peer = %self.endpoint, channel = self.channel.as_str(), "peer connection shut down");
        Ok(())
    }

    fn subscribe_blocks(&self) -> GatewayResult<BlockStream> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let rx = events.as_ref().ok_or(GatewayError::Closed)?.subscribe();
        let peer = self.endpoint.name.clone();

        let stream = stream::unfold(rx, move |mut rx| {
            let peer = peer.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(event) => return Some((event, rx)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(peer = peer.as_str(), skipped, "block subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

#[derive(Clone)]
pub struct SimDiscovery {
    network: SimNetwork,
}

#[async_trait]
impl DiscoveryClient for SimDiscovery {
    async fn discover(
        &self,
        bootstrap: &PeerEndpoint,
        request: &DiscoveryRequest,
    ) -> GatewayResult<DiscoveryResponse> {
        self.network.reachable_peer(&bootstrap.url)?;
        self.network
            .inner
            .discovery_queries
            .fetch_add(1, Ordering::SeqCst);

        let delay = *self
            .network
            .inner
            .discovery_delay
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let response = match self.network.membership(&request.channel) {
            Some((peers, orderers)) => DiscoveryResponse::Members {
                channel: request.channel.clone(),
                peers,
                orderers,
            },
            None => DiscoveryResponse::NotFound {
                channel: request.channel.clone(),
            },
        };
        debug!(
            bootstrap = %bootstrap,
            channel = request.channel.as_str(),
            requester = %request.requester,
            "answered discovery query"
        );
        Ok(response)
    }
}
