use std::fmt::Display;
use std::time::Duration;

/// Message carried by [`GatewayError::InvalidArgument`] for a missing channel name.
pub const EMPTY_CHANNEL_NAME: &str = "Channel name must be a non-empty string";

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("channel not found: {0}")]
    ChannelNotFound(String),
    #[error("connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },
    #[error("request to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },
    #[error("gateway is closed")]
    Closed,
}

impl GatewayError {
    pub fn connection(endpoint: impl Into<String>, reason: impl Display) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn empty_channel_name() -> Self {
        Self::InvalidArgument(EMPTY_CHANNEL_NAME.to_string())
    }

    /// Whether the same lookup may succeed if attempted again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ChannelNotFound(_) | Self::Connection { .. } | Self::Timeout { .. }
        )
    }
}
