use super::network::{shutdown_peers, Channel, ChannelPeer, Network, NetworkSource};
use crate::error::{GatewayError, GatewayResult};
use crate::options::PeerConnectionOptions;
use crate::profile::{ChannelMember, ConnectionProfile};
use crate::transport::{ConnectRequest, DiscoveryClient, PeerConnector};
use ledger_identity::Identity;
use ledger_protocol::{DiscoveryRequest, DiscoveryResponse, OrdererEndpoint, PeerRoles};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Turns a channel name into a connected [`Network`], either from the
/// profile's static topology or by asking bootstrap peers.
pub(crate) struct TopologyResolver {
    profile: Arc<ConnectionProfile>,
    identity: Identity,
    connector: Arc<dyn PeerConnector>,
    discovery: Option<Arc<dyn DiscoveryClient>>,
}

impl TopologyResolver {
    pub(crate) fn new(
        profile: Arc<ConnectionProfile>,
        identity: Identity,
        connector: Arc<dyn PeerConnector>,
        discovery: Option<Arc<dyn DiscoveryClient>>,
    ) -> Self {
        Self {
            profile,
            identity,
            connector,
            discovery,
        }
    }

    pub(crate) fn discovery_enabled(&self) -> bool {
        self.discovery.is_some()
    }

    pub(crate) async fn resolve(
        &self,
        channel: &str,
        options: PeerConnectionOptions,
    ) -> GatewayResult<Network> {
        if let Some(topology) = self.profile.channel(channel) {
            debug!(channel, peers = topology.peers.len(), "using configured topology");
            let connected = self.connect_all(channel, topology.peers, options).await?;
            info!(channel, peers = connected.len(), "configured network ready");
            return Ok(Network::new(
                Channel::new(channel, connected, topology.orderers),
                options,
                NetworkSource::Configured,
            ));
        }

        let Some(discovery) = &self.discovery else {
            debug!(channel, "channel not configured and discovery disabled");
            return Err(GatewayError::ChannelNotFound(channel.to_string()));
        };

        let (members, orderers) = self.discover(discovery.as_ref(), channel).await?;
        let connected = self.connect_all(channel, members, options).await?;
        info!(channel, peers = connected.len(), "discovered network ready");
        Ok(Network::new(
            Channel::new(channel, connected, orderers),
            options,
            NetworkSource::Discovered,
        ))
    }

    async fn discover(
        &self,
        discovery: &dyn DiscoveryClient,
        channel: &str,
    ) -> GatewayResult<(Vec<ChannelMember>, Vec<OrdererEndpoint>)> {
        let request = DiscoveryRequest::new(channel, &self.identity);
        let limit = self.profile.discovery_timeout();
        let mut last_error = GatewayError::ChannelNotFound(channel.to_string());

        for bootstrap in self.profile.bootstrap_peers() {
            let answer = match timeout(limit, discovery.discover(&bootstrap, &request)).await {
                Ok(answer) => answer,
                Err(_) => Err(GatewayError::Timeout {
                    endpoint: bootstrap.url.clone(),
                    timeout: limit,
                }),
            };

            match answer {
                Ok(DiscoveryResponse::Members { peers, orderers, .. }) => {
                    if peers.is_empty() {
                        debug!(channel, bootstrap = %bootstrap, "discovery returned no peers");
                        return Err(GatewayError::ChannelNotFound(channel.to_string()));
                    }
                    debug!(channel, bootstrap = %bootstrap, peers = peers.len(), "discovery answered");
                    let members = peers
                        .into_iter()
                        .map(|endpoint| ChannelMember {
                            endpoint,
                            roles: PeerRoles::all(),
                        })
                        .collect();
                    return Ok((members, orderers));
                }
                Ok(DiscoveryResponse::NotFound { .. }) => {
                    debug!(channel, bootstrap = %bootstrap, "channel unknown to bootstrap peer");
                    return Err(GatewayError::ChannelNotFound(channel.to_string()));
                }
                Err(err) => {
                    warn!(channel, bootstrap = %bootstrap, %err, "discovery query failed, trying next peer");
                    last_error = err;
                }
            }
        }

        Err(last_error)
    }

    /// Connects every member in order. On the first failure the peers already
    /// connected are shut down before the error is returned.
    async fn connect_all(
        &self,
        channel: &str,
        members: Vec<ChannelMember>,
        options: PeerConnectionOptions,
    ) -> GatewayResult<Vec<ChannelPeer>> {
        let limit = self.profile.connection_timeout();
        let mut connected = Vec::with_capacity(members.len());

        for member in members {
            let url = member.endpoint.url.clone();
            let request = ConnectRequest {
                channel: channel.to_string(),
                endpoint: member.endpoint,
                options,
                identity: self.identity.clone(),
            };
            let result = match timeout(limit, self.connector.connect(request)).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout {
                    endpoint: url.clone(),
                    timeout: limit,
                }),
            };

            match result {
                Ok(connection) => connected.push(ChannelPeer::new(connection, member.roles)),
                Err(err) => {
                    warn!(
                        channel,
                        peer = url.as_str(),
                        rolled_back = connected.len(),
                        %err,
                        "peer connect failed"
                    );
                    shutdown_peers(channel, &connected).await;
                    return Err(err);
                }
            }
        }

        Ok(connected)
    }
}
