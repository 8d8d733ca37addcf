//! Exchanging a refresh token for a new access token.
//!
//! A refresh cycle reads the stored refresh token, calls the
//! [`RefreshEndpoint`], and either persists the new tokens or drops the whole
//! session. Cycles are coordinated by [`RefreshFlight`] so that concurrent
//! callers never trigger more than one network refresh.

mod flight;

use std::sync::Arc;

pub use self::flight::{RefreshFlight, RefreshOutcome, RefreshPhase, SharedRefresh};
use crate::Result;
use crate::store::{TokenKey, TokenStore};
use crate::token::{AccessToken, RefreshToken};

/// Tracing target for refresh operations.
pub const TRACING_TARGET: &str = "jhola_auth::refresh";

/// Tokens minted by a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    /// The new access token.
    pub access_token: AccessToken,
    /// A rotated refresh token, when the backend issues one.
    pub refresh_token: Option<RefreshToken>,
}

impl RefreshedTokens {
    /// Creates a result carrying only a new access token.
    pub fn new(access_token: AccessToken) -> Self {
        Self {
            access_token,
            refresh_token: None,
        }
    }

    /// Attaches a rotated refresh token.
    pub fn with_refresh_token(mut self, refresh_token: RefreshToken) -> Self {
        self.refresh_token = Some(refresh_token);
        self
    }
}

/// Remote service that exchanges a refresh token for a new access token.
///
/// Every `Err`, whether an explicit rejection, a malformed body or a
/// transport failure, is treated as a failed refresh.
#[async_trait::async_trait]
pub trait RefreshEndpoint: Send + Sync {
    /// Presents `refresh_token` and returns the newly minted tokens.
    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<RefreshedTokens>;
}

/// Runs one refresh cycle to completion.
///
/// Any failure clears both tokens from the store; a refresh token that was
/// rejected once is never presented again.
pub(crate) async fn run_cycle(
    store: Arc<dyn TokenStore>,
    endpoint: Arc<dyn RefreshEndpoint>,
) -> RefreshOutcome {
    let refresh_token = match store.get(TokenKey::RefreshToken).await {
        Ok(Some(token)) => RefreshToken::new(token),
        Ok(None) => {
            tracing::warn!(
                target: TRACING_TARGET,
                "No refresh token stored, ending session"
            );
            clear_tokens(store.as_ref()).await;
            return None;
        }
        Err(error) => {
            tracing::warn!(
                target: TRACING_TARGET,
                error = %error,
                "Failed to read refresh token, ending session"
            );
            clear_tokens(store.as_ref()).await;
            return None;
        }
    };

    let tokens = match endpoint.refresh(&refresh_token).await {
        Ok(tokens) => tokens,
        Err(error) => {
            tracing::warn!(
                target: TRACING_TARGET,
                error = %error,
                kind = %error.kind(),
                "Token refresh failed, ending session"
            );
            clear_tokens(store.as_ref()).await;
            return None;
        }
    };

    if let Err(error) = persist(store.as_ref(), &tokens).await {
        tracing::warn!(
            target: TRACING_TARGET,
            error = %error,
            "Failed to persist refreshed tokens, ending session"
        );
        clear_tokens(store.as_ref()).await;
        return None;
    }

    tracing::info!(
        target: TRACING_TARGET,
        rotated_refresh_token = tokens.refresh_token.is_some(),
        expires_at = ?tokens.access_token.expires_at().ok(),
        "Access token refreshed"
    );

    Some(tokens.access_token)
}

async fn persist(store: &dyn TokenStore, tokens: &RefreshedTokens) -> Result<()> {
    store
        .set(TokenKey::AccessToken, tokens.access_token.as_str())
        .await?;
    if let Some(refresh_token) = &tokens.refresh_token {
        store
            .set(TokenKey::RefreshToken, refresh_token.as_str())
            .await?;
    }
    Ok(())
}

/// Removes both tokens, logging rather than surfacing storage failures.
pub(crate) async fn clear_tokens(store: &dyn TokenStore) {
    match store.remove(&TokenKey::ALL).await {
        Ok(()) => tracing::info!(
            target: TRACING_TARGET,
            "Session tokens cleared"
        ),
        Err(error) => tracing::error!(
            target: TRACING_TARGET,
            error = %error,
            "Failed to clear session tokens"
        ),
    }
}
