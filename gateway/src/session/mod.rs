//! Gateway sessions: one identity, one connection profile and one cache of
//! channel networks that is torn down as a unit.

mod builder;
mod cache;
mod network;
mod resolver;

pub use builder::GatewayBuilder;
pub use network::{Channel, ChannelPeer, Network, NetworkSource};

use crate::error::{GatewayError, GatewayResult};
use crate::options::PeerConnectionOptions;
use crate::profile::ConnectionProfile;
use cache::{NetworkCache, Release};
use ledger_identity::Identity;
use ledger_protocol::DeliveryMode;
use resolver::TopologyResolver;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct GatewayInner {
    identity: Identity,
    profile: Arc<ConnectionProfile>,
    options: PeerConnectionOptions,
    resolver: TopologyResolver,
    networks: NetworkCache<Network>,
}

/// An open session against a ledger network.
///
/// Clones share the same session. Networks are resolved on first request and
/// cached until [`Gateway::close`].
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Returns the network for `channel`, connecting to its peers the first
    /// time the name is requested. Later calls return the same handle.
    pub async fn get_network<'a>(
        &self,
        channel: impl Into<Option<&'a str>>,
    ) -> GatewayResult<Arc<Network>> {
        let channel = match channel.into() {
            Some(name) if !name.is_empty() => name,
            _ => return Err(GatewayError::empty_channel_name()),
        };

        let inner = Arc::clone(&self.inner);
        let name = channel.to_string();
        self.inner
            .networks
            .get_or_resolve(channel, move || async move {
                debug!(channel = name.as_str(), "resolving network");
                inner.resolver.resolve(&name, inner.options).await
            })
            .await
    }

    /// Shuts down every cached network. Later lookups fail with
    /// [`GatewayError::Closed`]. Every caller, including concurrent and
    /// repeated ones, returns only once the shutdown has finished.
    pub async fn close(&self) {
        let released = self.inner.networks.drain_and_close().await;
        info!(networks = released, "gateway closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.networks.is_closed()
    }

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    pub fn profile(&self) -> &ConnectionProfile {
        &self.inner.profile
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.inner.options.delivery_mode()
    }

    pub fn discovery_enabled(&self) -> bool {
        self.inner.resolver.discovery_enabled()
    }

    /// Channel names with a resolved network, sorted.
    pub fn cached_networks(&self) -> Vec<String> {
        self.inner.networks.names()
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("profile", &self.inner.profile.name)
            .field("msp_id", &self.inner.identity.msp_id())
            .field("delivery", &self.delivery_mode())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for GatewayInner {
    fn drop(&mut self) {
        let networks = self.networks.close();
        if networks.is_empty() {
            return;
        }
        warn!(
            networks = networks.len(),
            "gateway dropped without close, shutting networks down"
        );
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    for network in networks {
                        network.release().await;
                    }
                });
            }
            Err(_) => warn!("no runtime available, peer connections left open"),
        }
    }
}
