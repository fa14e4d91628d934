pub mod config;
pub mod error;
pub mod options;
pub mod profile;
pub mod session;
pub mod transport;

pub use config::AppConfig;
pub use error::{GatewayError, GatewayResult};
pub use options::PeerConnectionOptions;
pub use profile::ConnectionProfile;
pub use session::{Channel, ChannelPeer, Gateway, GatewayBuilder, Network, NetworkSource};

pub use ledger_identity::{Identity, InMemoryWallet, Wallet};
pub use ledger_protocol::{BlockEvent, DeliveryMode, PeerEndpoint, PeerRoles};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
