use super::DiscoveryClient;
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use ledger_protocol::{DiscoveryRequest, DiscoveryResponse, PeerEndpoint};
use reqwest::Client;
use tracing::debug;

/// Discovery over JSON/HTTP: `POST <bootstrap url>/discovery`.
///
/// With a base url set, every query goes to that service instead of the
/// bootstrap peer's own address.
#[derive(Clone, Default)]
pub struct HttpDiscoveryClient {
    client: Client,
    base_url: Option<String>,
}

impl HttpDiscoveryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

#[async_trait]
impl DiscoveryClient for HttpDiscoveryClient {
    async fn discover(
        &self,
        bootstrap: &PeerEndpoint,
        request: &DiscoveryRequest,
    ) -> GatewayResult<DiscoveryResponse> {
        let base = self.base_url.as_deref().unwrap_or(&bootstrap.url);
        let url = format!("{}/discovery", base.trim_end_matches('/'));
        debug!(%url, channel = request.channel.as_str(), "sending discovery query");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| GatewayError::connection(base, e))?
            .error_for_status()
            .map_err(|e| GatewayError::connection(base, e))?;

        response
            .json::<DiscoveryResponse>()
            .await
            .map_err(|e| GatewayError::connection(base, format!("invalid discovery response: {e}")))
    }
}
