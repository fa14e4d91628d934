use anyhow::Context;
use ledger_protocol::DeliveryMode;
use std::env;
use std::path::PathBuf;
use uuid::Uuid;

/// Runtime configuration for the gateway binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub profile_path: PathBuf,
    pub channels: Vec<String>,
    pub identity_label: String,
    pub delivery: DeliveryMode,
    pub discovery: bool,
    pub discovery_url: Option<String>,
    pub run_id: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile_path = lookup("GATEWAY_PROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("connection-profile.json"));

        let channels: Vec<String> = lookup("GATEWAY_CHANNELS")
            .unwrap_or_else(|| "mychannel".to_string())
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();

        let identity_label = lookup("GATEWAY_IDENTITY").unwrap_or_else(|| "user1".to_string());

        let delivery = match (lookup("GATEWAY_DELIVERY"), lookup("GATEWAY_DELIVER_FILTER")) {
            (Some(mode), _) => mode
                .parse::<DeliveryMode>()
                .with_context(|| format!("invalid GATEWAY_DELIVERY value {mode:?}"))?,
            (None, Some(flag)) => DeliveryMode::from_filter(
                parse_flag(&flag).context("invalid GATEWAY_DELIVER_FILTER value")?,
            ),
            (None, None) => DeliveryMode::Full,
        };

        let discovery = match lookup("GATEWAY_DISCOVERY") {
            Some(flag) => parse_flag(&flag).context("invalid GATEWAY_DISCOVERY value")?,
            None => true,
        };

        let discovery_url = lookup("GATEWAY_DISCOVERY_URL").filter(|url| !url.trim().is_empty());
        let run_id = lookup("GATEWAY_RUN_ID").unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(Self {
            profile_path,
            channels,
            identity_label,
            delivery,
            discovery,
            discovery_url,
            run_id,
        })
    }
}

fn parse_flag(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {other:?}"),
    }
}
