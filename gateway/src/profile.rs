//! Connection profile: the static description of the network a gateway talks to.
//!
//! A profile names peers and orderers, groups peers into organizations, and
//! optionally declares channels together with the peers serving them. Channels
//! missing from the profile are resolved through discovery instead.

use crate::error::{GatewayError, GatewayResult};
use ledger_protocol::{OrdererEndpoint, PeerEndpoint, PeerRoles};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub organizations: BTreeMap<String, OrganizationConfig>,
    #[serde(default)]
    pub peers: BTreeMap<String, PeerConfig>,
    #[serde(default)]
    pub orderers: BTreeMap<String, OrdererConfig>,
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Organization the client belongs to; its peers bootstrap discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationConfig {
    #[serde(rename = "mspid")]
    pub msp_id: String,
    #[serde(default)]
    pub peers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_ca_cert: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdererConfig {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub orderers: Vec<String>,
    #[serde(default)]
    pub peers: BTreeMap<String, PeerRoles>,
}

/// A peer serving a channel, with the roles it plays there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMember {
    pub endpoint: PeerEndpoint,
    pub roles: PeerRoles,
}

/// Everything needed to open connections for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTopology {
    pub name: String,
    pub peers: Vec<ChannelMember>,
    pub orderers: Vec<OrdererEndpoint>,
}

impl ConnectionProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "1.0.0".into(),
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> GatewayResult<Self> {
        let profile: Self = serde_json::from_str(json).map_err(|e| {
            GatewayError::Configuration(format!("invalid connection profile: {e}"))
        })?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn from_file(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Configuration(format!(
                "failed to read connection profile {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json_str(&json)
    }

    pub fn with_peer(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.peers.insert(
            name.into(),
            PeerConfig {
                url: url.into(),
                tls_ca_cert: None,
            },
        );
        self
    }

    pub fn with_orderer(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.orderers
            .insert(name.into(), OrdererConfig { url: url.into() });
        self
    }

    pub fn with_organization(
        mut self,
        name: impl Into<String>,
        msp_id: impl Into<String>,
        peers: &[&str],
    ) -> Self {
        self.organizations.insert(
            name.into(),
            OrganizationConfig {
                msp_id: msp_id.into(),
                peers: peers.iter().map(|p| p.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_client_organization(mut self, organization: impl Into<String>) -> Self {
        self.client.organization = Some(organization.into());
        self
    }

    /// Declares a channel whose peers take every role.
    pub fn with_channel(mut self, name: impl Into<String>, peers: &[&str], orderers: &[&str]) -> Self {
        self.channels.insert(
            name.into(),
            ChannelConfig {
                orderers: orderers.iter().map(|o| o.to_string()).collect(),
                peers: peers
                    .iter()
                    .map(|p| (p.to_string(), PeerRoles::all()))
                    .collect(),
            },
        );
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.client.connection_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.client.discovery_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Checks that every name the profile refers to is declared.
    pub fn validate(&self) -> GatewayResult<()> {
        if let Some(org) = &self.client.organization {
            if !self.organizations.contains_key(org) {
                return Err(GatewayError::Configuration(format!(
                    "client organization {org} is not declared"
                )));
            }
        }

        for (org_name, org) in &self.organizations {
            if org.msp_id.trim().is_empty() {
                return Err(GatewayError::Configuration(format!(
                    "organization {org_name} has an empty mspid"
                )));
            }
            for peer in &org.peers {
                if !self.peers.contains_key(peer) {
                    return Err(GatewayError::Configuration(format!(
                        "organization {org_name} references undeclared peer {peer}"
                    )));
                }
            }
        }

        for (channel_name, channel) in &self.channels {
            if channel_name.is_empty() {
                return Err(GatewayError::Configuration(
                    "channel names must not be empty".into(),
                ));
            }
            for peer in channel.peers.keys() {
                if !self.peers.contains_key(peer) {
                    return Err(GatewayError::Configuration(format!(
                        "channel {channel_name} references undeclared peer {peer}"
                    )));
                }
            }
            for orderer in &channel.orderers {
                if !self.orderers.contains_key(orderer) {
                    return Err(GatewayError::Configuration(format!(
                        "channel {channel_name} references undeclared orderer {orderer}"
                    )));
                }
            }
        }

        for (peer_name, peer) in &self.peers {
            if peer.url.trim().is_empty() {
                return Err(GatewayError::Configuration(format!(
                    "peer {peer_name} has an empty url"
                )));
            }
        }

        Ok(())
    }

    pub fn is_configured(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    /// Statically declared topology for `channel`, or `None` when the channel
    /// has to be discovered.
    pub fn channel(&self, channel: &str) -> Option<ChannelTopology> {
        let config = self.channels.get(channel)?;
        let peers = config
            .peers
            .iter()
            .filter_map(|(name, roles)| {
                self.peer_endpoint(name).map(|endpoint| ChannelMember {
                    endpoint,
                    roles: *roles,
                })
            })
            .collect();
        let orderers = config
            .orderers
            .iter()
            .filter_map(|name| {
                self.orderers
                    .get(name)
                    .map(|o| OrdererEndpoint::new(name.clone(), o.url.clone()))
            })
            .collect();

        Some(ChannelTopology {
            name: channel.to_string(),
            peers,
            orderers,
        })
    }

    pub fn peer_endpoint(&self, name: &str) -> Option<PeerEndpoint> {
        let peer = self.peers.get(name)?;
        let endpoint = PeerEndpoint::new(name, peer.url.clone());
        Some(match self.msp_of_peer(name) {
            Some(msp_id) => endpoint.with_msp_id(msp_id),
            None => endpoint,
        })
    }

    /// Peers asked for channel membership: the client organization's peers,
    /// or every declared peer when no organization is set.
    pub fn bootstrap_peers(&self) -> Vec<PeerEndpoint> {
        let names: Vec<&String> = match self
            .client
            .organization
            .as_ref()
            .and_then(|org| self.organizations.get(org))
        {
            Some(org) => org.peers.iter().collect(),
            None => self.peers.keys().collect(),
        };
        names
            .into_iter()
            .filter_map(|name| self.peer_endpoint(name))
            .collect()
    }

    pub fn client_msp_id(&self) -> Option<&str> {
        let org = self.client.organization.as_ref()?;
        self.organizations.get(org).map(|o| o.msp_id.as_str())
    }

    pub fn connection_timeout(&self) -> Duration {
        self.client
            .connection_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CONNECTION_TIMEOUT)
    }

    pub fn discovery_timeout(&self) -> Duration {
        self.client
            .discovery_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DISCOVERY_TIMEOUT)
    }

    fn msp_of_peer(&self, peer: &str) -> Option<&str> {
        self.organizations
            .values()
            .find(|org| org.peers.iter().any(|p| p == peer))
            .map(|org| org.msp_id.as_str())
    }
}
