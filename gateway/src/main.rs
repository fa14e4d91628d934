use anyhow::Context;
use ledger_gateway::transport::{HttpDiscoveryClient, SimNetwork};
use ledger_gateway::{
    init_tracing, AppConfig, ConnectionProfile, Gateway, Identity, InMemoryWallet, Wallet,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Profile used when no profile file is present: one organization with two
/// peers serving `mychannel`.
fn sample_profile() -> ConnectionProfile {
    ConnectionProfile::new("sample-network")
        .with_peer("peer0.org1.example.com", "sim://peer0.org1.example.com:7051")
        .with_peer("peer1.org1.example.com", "sim://peer1.org1.example.com:7051")
        .with_orderer("orderer.example.com", "sim://orderer.example.com:7050")
        .with_organization(
            "Org1",
            "Org1MSP",
            &["peer0.org1.example.com", "peer1.org1.example.com"],
        )
        .with_client_organization("Org1")
        .with_channel(
            "mychannel",
            &["peer0.org1.example.com", "peer1.org1.example.com"],
            &["orderer.example.com"],
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env()?;
    info!(run_id = %config.run_id, profile = %config.profile_path.display(), "starting ledger gateway");

    let profile = if config.profile_path.exists() {
        ConnectionProfile::from_file(&config.profile_path)
            .with_context(|| format!("loading {}", config.profile_path.display()))?
    } else {
        warn!(profile = %config.profile_path.display(), "profile not found, using sample network");
        sample_profile()
    };

    let sim = SimNetwork::from_profile(&profile);
    let msp_id = profile.client_msp_id().unwrap_or("Org1MSP").to_string();
    let identity = Identity::from_seed(msp_id, config.identity_label.as_bytes())?;

    let wallet = Arc::new(InMemoryWallet::new());
    wallet.put(&config.identity_label, identity)?;

    let mut builder = Gateway::builder()
        .identity(wallet, config.identity_label.clone())
        .network_config(profile)
        .discovery(config.discovery)
        .deliver_filter(config.delivery.is_filtered())
        .peer_connector(Arc::new(sim.connector()));
    builder = match &config.discovery_url {
        Some(url) => {
            info!(%url, "using HTTP discovery");
            builder.discovery_client(Arc::new(HttpDiscoveryClient::new().with_base_url(url.clone())))
        }
        None => builder.discovery_client(Arc::new(sim.discovery())),
    };

    let gateway = builder.connect().await?;

    for channel in &config.channels {
        match gateway.get_network(channel.as_str()).await {
            Ok(network) => info!(
                channel = network.name(),
                source = ?network.source(),
                peers = network.channel().peers().len(),
                orderers = network.channel().orderers().len(),
                delivery = %network.options().delivery_mode(),
                "network ready"
            ),
            Err(err) => warn!(channel = channel.as_str(), %err, "network unavailable"),
        }
    }

    gateway.close().await;
    let pruned = sim.prune_shutdown();
    info!(
        open_connections = sim.open_connections(),
        pruned,
        "ledger gateway stopped"
    );
    Ok(())
}
