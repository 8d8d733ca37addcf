//! In-process token storage.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::{TokenKey, TokenStore};
use crate::Result;

/// Token store kept in process memory.
///
/// Clones share the same underlying map, so a test can hold one handle while
/// the client owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    inner: Arc<RwLock<HashMap<TokenKey, String>>>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with the given tokens.
    pub fn with_tokens(access_token: Option<&str>, refresh_token: Option<&str>) -> Self {
        let mut map = HashMap::new();
        if let Some(token) = access_token {
            map.insert(TokenKey::AccessToken, token.to_owned());
        }
        if let Some(token) = refresh_token {
            map.insert(TokenKey::RefreshToken, token.to_owned());
        }

        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    /// Returns `true` if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: TokenKey) -> Result<Option<String>> {
        Ok(self.inner.read().await.get(&key).cloned())
    }

    async fn set(&self, key: TokenKey, value: &str) -> Result<()> {
        self.inner.write().await.insert(key, value.to_owned());
        Ok(())
    }

    async fn remove(&self, keys: &[TokenKey]) -> Result<()> {
        let mut map = self.inner.write().await;
        for key in keys {
            map.remove(key);
        }
        Ok(())
    }
}
