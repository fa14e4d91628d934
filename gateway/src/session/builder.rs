use super::cache::NetworkCache;
use super::resolver::TopologyResolver;
use super::{Gateway, GatewayInner};
use crate::error::{GatewayError, GatewayResult};
use crate::options::PeerConnectionOptions;
use crate::profile::ConnectionProfile;
use crate::transport::{DiscoveryClient, PeerConnector};
use ledger_identity::{Identity, Wallet};
use ledger_protocol::DeliveryMode;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

enum IdentitySource {
    Direct(Identity),
    Wallet { wallet: Arc<dyn Wallet>, label: String },
}

enum ProfileSource {
    Loaded(ConnectionProfile),
    File(PathBuf),
}

/// Collects gateway configuration. Nothing is validated or loaded until
/// [`GatewayBuilder::connect`].
pub struct GatewayBuilder {
    identity: Option<IdentitySource>,
    profile: Option<ProfileSource>,
    discovery: bool,
    deliver_filter: bool,
    connector: Option<Arc<dyn PeerConnector>>,
    discovery_client: Option<Arc<dyn DiscoveryClient>>,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self {
            identity: None,
            profile: None,
            discovery: true,
            deliver_filter: false,
            connector: None,
            discovery_client: None,
        }
    }
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity looked up under `label` in `wallet` when connecting.
    pub fn identity(mut self, wallet: Arc<dyn Wallet>, label: impl Into<String>) -> Self {
        self.identity = Some(IdentitySource::Wallet {
            wallet,
            label: label.into(),
        });
        self
    }

    pub fn signing_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(IdentitySource::Direct(identity));
        self
    }

    pub fn network_config(mut self, profile: ConnectionProfile) -> Self {
        self.profile = Some(ProfileSource::Loaded(profile));
        self
    }

    /// JSON connection profile read from disk when connecting.
    pub fn network_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.profile = Some(ProfileSource::File(path.into()));
        self
    }

    pub fn discovery(mut self, enabled: bool) -> Self {
        self.discovery = enabled;
        self
    }

    /// Register every peer connection for filtered blocks instead of full blocks.
    pub fn deliver_filter(mut self, filtered: bool) -> Self {
        self.deliver_filter = filtered;
        self
    }

    pub fn peer_connector(mut self, connector: Arc<dyn PeerConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn discovery_client(mut self, client: Arc<dyn DiscoveryClient>) -> Self {
        self.discovery_client = Some(client);
        self
    }

    /// Validates the configuration and opens an idle gateway. Peers are only
    /// contacted when a network is first requested.
    pub async fn connect(self) -> GatewayResult<Gateway> {
        let identity = match self.identity {
            None => return Err(GatewayError::Configuration("no identity configured".into())),
            Some(IdentitySource::Direct(identity)) => identity,
            Some(IdentitySource::Wallet { wallet, label }) => wallet
                .get(&label)
                .map_err(|e| GatewayError::Configuration(e.to_string()))?
                .ok_or_else(|| {
                    GatewayError::Configuration(format!("identity {label:?} not found in wallet"))
                })?,
        };

        let profile = match self.profile {
            None => {
                return Err(GatewayError::Configuration(
                    "no network configuration supplied".into(),
                ))
            }
            Some(ProfileSource::Loaded(profile)) => {
                profile.validate()?;
                profile
            }
            Some(ProfileSource::File(path)) => ConnectionProfile::from_file(&path)?,
        };

        let connector = self
            .connector
            .ok_or_else(|| GatewayError::Configuration("no peer connector configured".into()))?;

        let discovery = if self.discovery {
            let client = self.discovery_client.ok_or_else(|| {
                GatewayError::Configuration("discovery enabled without a discovery client".into())
            })?;
            if profile.bootstrap_peers().is_empty() {
                return Err(GatewayError::Configuration(
                    "discovery enabled but the profile declares no bootstrap peers".into(),
                ));
            }
            Some(client)
        } else {
            None
        };

        let options = PeerConnectionOptions::new(DeliveryMode::from_filter(self.deliver_filter));
        let profile = Arc::new(profile);

        info!(
            profile = profile.name.as_str(),
            msp_id = identity.msp_id(),
            discovery = discovery.is_some(),
            delivery = %options.delivery_mode(),
            "gateway connected"
        );

        let resolver = TopologyResolver::new(
            Arc::clone(&profile),
            identity.clone(),
            connector,
            discovery,
        );

        Ok(Gateway {
            inner: Arc::new(GatewayInner {
                identity,
                profile,
                options,
                resolver,
                networks: NetworkCache::new(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SimNetwork;
    use ledger_identity::InMemoryWallet;

    fn profile() -> ConnectionProfile {
        ConnectionProfile::new("test")
            .with_peer("peer0.org1", "sim://peer0.org1")
            .with_organization("Org1", "Org1MSP", &["peer0.org1"])
            .with_client_organization("Org1")
            .with_channel("mychannel", &["peer0.org1"], &[])
    }

    fn identity() -> Identity {
        Identity::from_seed("Org1MSP", b"builder-tests").unwrap()
    }

    #[tokio::test]
    async fn missing_identity_is_a_configuration_error() {
        let sim = SimNetwork::from_profile(&profile());
        let err = GatewayBuilder::new()
            .network_config(profile())
            .peer_connector(Arc::new(sim.connector()))
            .discovery(false)
            .connect()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::Configuration(_)));
    }

    #[tokio::test]
    async fn unknown_wallet_label_is_a_configuration_error() {
        let sim = SimNetwork::from_profile(&profile());
        let wallet = Arc::new(InMemoryWallet::new());
        let err = GatewayBuilder::new()
            .identity(wallet, "admin")
            .network_config(profile())
            .peer_connector(Arc::new(sim.connector()))
            .discovery(false)
            .connect()
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("admin"));
    }

    #[tokio::test]
    async fn discovery_requires_a_client() {
        let sim = SimNetwork::from_profile(&profile());
        let err = GatewayBuilder::new()
            .signing_identity(identity())
            .network_config(profile())
            .peer_connector(Arc::new(sim.connector()))
            .connect()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::Configuration(_)));
    }

    #[tokio::test]
    async fn defaults_are_discovery_on_and_full_blocks() {
        let sim = SimNetwork::from_profile(&profile());
        let wallet = Arc::new(InMemoryWallet::new());
        wallet.put("user1", identity()).unwrap();

        let gateway = GatewayBuilder::new()
            .identity(wallet, "user1")
            .network_config(profile())
            .peer_connector(Arc::new(sim.connector()))
            .discovery_client(Arc::new(sim.discovery()))
            .connect()
            .await
            .unwrap();

        assert!(gateway.discovery_enabled());
        assert!(!gateway.delivery_mode().is_filtered());
        assert_eq!(gateway.identity().msp_id(), "Org1MSP");
        assert!(gateway.cached_networks().is_empty());
        assert_eq!(sim.open_connections(), 0);
        gateway.close().await;
    }
}
