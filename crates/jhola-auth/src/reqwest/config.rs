//! Reqwest client configuration.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Default timeout for HTTP requests: 30 seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default commerce API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.jholabazar.com/api/v1";

/// Default path of the refresh endpoint, relative to the API base URL.
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

/// Configuration for the reqwest HTTP client.
///
/// This configuration is used for both authenticated requests and token
/// refresh calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct ReqwestConfig {
    /// Base URL of the commerce API
    #[cfg_attr(
        feature = "config",
        arg(
            long = "api-base-url",
            env = "API_BASE_URL",
            default_value = DEFAULT_API_BASE_URL
        )
    )]
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Path of the token refresh endpoint, relative to the API base URL
    #[cfg_attr(
        feature = "config",
        arg(
            long = "auth-refresh-path",
            env = "AUTH_REFRESH_PATH",
            default_value = DEFAULT_REFRESH_PATH
        )
    )]
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,

    /// HTTP request timeout in seconds
    #[cfg_attr(
        feature = "config",
        arg(long = "http-timeout", env = "HTTP_TIMEOUT", default_value = "30")
    )]
    #[serde(default = "default_timeout_secs")]
    pub http_timeout: u64,

    /// User-Agent header to send with requests
    #[cfg_attr(
        feature = "config",
        arg(long = "http-user-agent", env = "HTTP_USER_AGENT")
    )]
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_owned()
}

fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_owned()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for ReqwestConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            refresh_path: default_refresh_path(),
            http_timeout: default_timeout_secs(),
            user_agent: None,
        }
    }
}

impl ReqwestConfig {
    /// Create a new configuration for the given API base URL.
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
    }

    /// Returns the timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout)
    }

    /// Returns the effective timeout, using default if zero.
    pub fn effective_timeout(&self) -> Duration {
        if self.http_timeout == 0 {
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        } else {
            Duration::from_secs(self.http_timeout)
        }
    }

    /// Returns the effective user agent, using default if not set.
    pub fn effective_user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(Self::default_user_agent)
    }

    /// Returns the default user agent string.
    fn default_user_agent() -> String {
        format!("jhola-auth/{}", env!("CARGO_PKG_VERSION"))
    }

    /// Returns the absolute URL of the refresh endpoint.
    pub fn refresh_url(&self) -> Result<Url> {
        let joined = format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            self.refresh_path.trim_start_matches('/')
        );

        Url::parse(&joined).map_err(|err| {
            Error::configuration()
                .with_message("invalid refresh endpoint URL")
                .with_context(joined)
                .with_source(err)
        })
    }

    /// Set the refresh endpoint path.
    #[must_use]
    pub fn with_refresh_path(mut self, refresh_path: impl Into<String>) -> Self {
        self.refresh_path = refresh_path.into();
        self
    }

    /// Set the timeout in seconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.http_timeout = timeout_secs;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_default_config() {
        let config = ReqwestConfig::default();
        assert_eq!(config.http_timeout, 30);
        assert!(config.user_agent.is_none());
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(
            config.refresh_url().unwrap().as_str(),
            "https://api.jholabazar.com/api/v1/auth/refresh"
        );
    }

    #[test]
    fn test_refresh_url_normalizes_slashes() {
        let config = ReqwestConfig::new("http://localhost:8080/api/v1/").with_refresh_path("auth/refresh");
        assert_eq!(
            config.refresh_url().unwrap().as_str(),
            "http://localhost:8080/api/v1/auth/refresh"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let config = ReqwestConfig::new("not a url");
        let error = config.refresh_url().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_builder_pattern() {
        let config = ReqwestConfig::default()
            .with_timeout(120)
            .with_user_agent("storefront/2.0");

        assert_eq!(config.http_timeout, 120);
        assert_eq!(config.effective_user_agent(), "storefront/2.0");
    }

    #[test]
    fn test_effective_timeout_uses_default_when_zero() {
        let config = ReqwestConfig::default().with_timeout(0);
        assert_eq!(
            config.effective_timeout(),
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_effective_user_agent_uses_default_when_none() {
        let config = ReqwestConfig::default();
        assert!(config.effective_user_agent().contains("jhola-auth"));
    }
}
