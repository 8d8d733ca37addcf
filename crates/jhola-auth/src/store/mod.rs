//! Persistent key-value storage for session credentials.
//!
//! The client treats every operation as an atomic single-key replacement;
//! implementations must never expose a partially written value.

mod file;
mod memory;

use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

pub use self::file::FileTokenStore;
pub use self::memory::MemoryTokenStore;
use crate::Result;

/// Tracing target for token storage operations.
pub const TRACING_TARGET: &str = "jhola_auth::store";

/// Keys under which session credentials are stored.
///
/// The names match the keys the storefront app already persists, so
/// existing sessions survive the upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(AsRefStr, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub enum TokenKey {
    /// The current access token.
    #[strum(serialize = "authToken")]
    AccessToken,
    /// The current refresh token.
    RefreshToken,
}

impl TokenKey {
    /// Every key owned by the session.
    pub const ALL: [TokenKey; 2] = [TokenKey::AccessToken, TokenKey::RefreshToken];
}

/// Durable storage for access and refresh tokens.
///
/// Implement this trait to back the client with platform storage (keychain,
/// key-value database, config directory).
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Reads the value stored under `key`, if any.
    async fn get(&self, key: TokenKey) -> Result<Option<String>>;

    /// Replaces the value stored under `key`.
    async fn set(&self, key: TokenKey, value: &str) -> Result<()>;

    /// Removes every listed key. Missing keys are not an error.
    async fn remove(&self, keys: &[TokenKey]) -> Result<()>;
}
