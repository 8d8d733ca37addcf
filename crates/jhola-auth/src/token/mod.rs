//! Bearer credentials and their expiry rules.

mod expiry;

use std::fmt;
use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-utils"))]
pub use self::expiry::test_token;
pub use self::expiry::{ExpiryError, decode_expiry};

/// Default safety margin before the encoded expiry: 5 minutes.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(300);

/// Short-lived bearer credential presented on every API call.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the token, returning the raw string.
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Decodes the expiry embedded in the token claims.
    pub fn expires_at(&self) -> Result<Timestamp, ExpiryError> {
        decode_expiry(&self.0)
    }

    /// Returns `true` if the token must not be presented at `now`.
    ///
    /// The token is retired `margin` before its encoded expiry. A token whose
    /// expiry cannot be decoded is always considered expired.
    pub fn is_expired_at(&self, now: Timestamp, margin: Duration) -> bool {
        let Ok(expires_at) = self.expires_at() else {
            return true;
        };

        let margin = SignedDuration::try_from(margin).unwrap_or(SignedDuration::MAX);
        match expires_at.checked_sub(margin) {
            Ok(retire_at) => retire_at < now,
            Err(_) => true,
        }
    }

    /// Returns `true` if the token must not be presented right now.
    pub fn is_expired(&self, margin: Duration) -> bool {
        self.is_expired_at(Timestamp::now(), margin)
    }

    /// Formats the value of an `Authorization` header for this token.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

impl From<String> for AccessToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for AccessToken {
    fn from(token: &str) -> Self {
        Self(token.to_owned())
    }
}

/// Long-lived credential used only to mint new access tokens.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefreshToken(String);

impl RefreshToken {
    /// Wraps a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the token, returning the raw string.
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Formats the value of an `Authorization` header for this token.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshToken(***)")
    }
}

impl From<String> for RefreshToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for RefreshToken {
    fn from(token: &str) -> Self {
        Self(token.to_owned())
    }
}
