//! Client configuration
//!
//! [`ClientConfig`] carries everything a [`GatewayClient`](crate::http::GatewayClient)
//! needs to know about the remote service and how hard it may push it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Default API host
pub const DEFAULT_BASE_URL: &str = "https://discord.com";

/// Default API version used for the versioned path prefix
pub const DEFAULT_API_VERSION: u16 = 10;

/// How the token is presented in the `Authorization` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// `Authorization: Bot <token>`
    #[default]
    Bot,
    /// `Authorization: Bearer <token>`
    Bearer,
}

impl AuthScheme {
    /// Render the header value for a token
    pub fn header_value(&self, token: &str) -> String {
        match self {
            AuthScheme::Bot => format!("Bot {}", token),
            AuthScheme::Bearer => format!("Bearer {}", token),
        }
    }
}

/// Configuration for the gateway client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Fixed API host
    pub base_url: String,
    /// Version placed in the `/api/v{n}` prefix
    pub api_version: u16,
    /// Authorization token
    pub token: String,
    /// Authorization header scheme
    pub auth_scheme: AuthScheme,
    /// Number of calls allowed in flight at once
    pub concurrency: usize,
    /// Guard margin added to every bucket reset, absorbs clock skew
    pub reset_margin_ms: u64,
    /// Upper bound between bucket re-checks while a call is gated
    pub bucket_poll_ms: u64,
    /// Transport timeout in seconds
    pub timeout_secs: u64,
    /// `User-Agent` header sent with every call
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION,
            token: String::new(),
            auth_scheme: AuthScheme::Bot,
            concurrency: 1,
            reset_margin_ms: 250,
            bucket_poll_ms: 500,
            timeout_secs: 30,
            user_agent: format!(
                "restgate ({}, {})",
                env!("CARGO_PKG_REPOSITORY"),
                env!("CARGO_PKG_VERSION")
            ),
        }
    }
}

impl ClientConfig {
    /// Create a configuration for a token with default settings
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Default::default()
        }
    }

    /// Set the API host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the API version
    pub fn with_api_version(mut self, version: u16) -> Self {
        self.api_version = version;
        self
    }

    /// Set the authorization scheme
    pub fn with_auth_scheme(mut self, scheme: AuthScheme) -> Self {
        self.auth_scheme = scheme;
        self
    }

    /// Set the scheduler concurrency
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the reset guard margin
    pub fn with_reset_margin(mut self, margin: Duration) -> Self {
        self.reset_margin_ms = margin.as_millis() as u64;
        self
    }

    /// Set the upper bound between bucket re-checks
    pub fn with_bucket_poll(mut self, poll: Duration) -> Self {
        self.bucket_poll_ms = poll.as_millis() as u64;
        self
    }

    /// Set the transport timeout
    pub fn with_timeout_secs(mut self, seconds: u64) -> Self {
        self.timeout_secs = seconds;
        self
    }

    /// Guard margin as a duration
    pub fn reset_margin(&self) -> Duration {
        Duration::from_millis(self.reset_margin_ms)
    }

    /// Re-check bound as a duration
    pub fn bucket_poll(&self) -> Duration {
        Duration::from_millis(self.bucket_poll_ms)
    }

    /// `<base_url>/api/v<version>` without a trailing slash
    pub fn api_root(&self) -> String {
        format!(
            "{}/api/v{}",
            self.base_url.trim_end_matches('/'),
            self.api_version
        )
    }

    /// Value of the `Authorization` header
    pub fn authorization(&self) -> String {
        self.auth_scheme.header_value(&self.token)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(Error::configuration("token cannot be empty"));
        }

        if self.concurrency == 0 {
            return Err(Error::configuration("concurrency must be at least 1"));
        }

        if self.api_version == 0 {
            return Err(Error::configuration("api_version cannot be zero"));
        }

        if self.bucket_poll_ms == 0 {
            return Err(Error::configuration("bucket_poll_ms must be at least 1"));
        }

        if self.timeout_secs == 0 {
            return Err(Error::configuration("timeout_secs must be at least 1"));
        }

        Url::parse(&self.base_url).map_err(|e| {
            Error::configuration(format!("invalid base_url '{}': {}", self.base_url, e))
        })?;

        Ok(())
    }
}
