//! Client configuration.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::token::DEFAULT_EXPIRY_MARGIN;

/// Default safety margin before token expiry, in seconds.
pub const DEFAULT_EXPIRY_MARGIN_SECS: u64 = DEFAULT_EXPIRY_MARGIN.as_secs();

/// Configuration for the authenticated client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct AuthConfig {
    /// Seconds before the encoded expiry at which an access token is retired
    #[cfg_attr(
        feature = "config",
        arg(
            long = "auth-expiry-margin",
            env = "AUTH_EXPIRY_MARGIN",
            default_value = "300"
        )
    )]
    #[serde(default = "default_expiry_margin_secs")]
    pub expiry_margin_secs: u64,
}

fn default_expiry_margin_secs() -> u64 {
    DEFAULT_EXPIRY_MARGIN_SECS
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            expiry_margin_secs: default_expiry_margin_secs(),
        }
    }
}

impl AuthConfig {
    /// Returns the expiry margin as a Duration.
    pub fn expiry_margin(&self) -> Duration {
        Duration::from_secs(self.expiry_margin_secs)
    }

    /// Set the expiry margin in seconds.
    #[must_use]
    pub fn with_expiry_margin(mut self, margin_secs: u64) -> Self {
        self.expiry_margin_secs = margin_secs;
        self
    }
}
