//! Authenticated request client.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::config::AuthConfig;
use crate::refresh::{self, RefreshEndpoint, RefreshFlight, RefreshPhase};
use crate::store::{TokenKey, TokenStore};
use crate::token::{AccessToken, RefreshToken};
use crate::transport::{AuthRequest, HttpResponse, HttpTransport};
use crate::{Error, Result};

/// Tracing target for authenticated client operations.
pub const TRACING_TARGET: &str = "jhola_auth::client";

/// Inner client that holds the collaborators and refresh state.
struct AuthenticatedClientInner {
    store: Arc<dyn TokenStore>,
    endpoint: Arc<dyn RefreshEndpoint>,
    transport: Arc<dyn HttpTransport>,
    config: AuthConfig,
    flight: RefreshFlight,
}

/// Client that attaches a valid bearer token to every outbound request.
///
/// Expired access tokens are refreshed before sending, and a request the
/// server rejects with `401` is retried exactly once after a refresh.
/// Concurrent callers share a single in-flight refresh.
///
/// Construct one instance at application start and clone it wherever it is
/// needed; clones share the same refresh state.
///
/// # Examples
///
/// ```rust,ignore
/// use jhola_auth::{AuthConfig, AuthRequest, AuthenticatedClient, FileTokenStore};
/// use jhola_auth::reqwest::{ReqwestClient, ReqwestConfig};
///
/// let http = ReqwestClient::new(ReqwestConfig::default())?;
/// let store = FileTokenStore::new("session/tokens.json");
/// let client = AuthenticatedClient::new(store, http.clone(), http, AuthConfig::default());
///
/// let response = client.send(AuthRequest::get("https://api.jholabazar.com/api/v1/orders")).await?;
/// ```
#[derive(Clone)]
pub struct AuthenticatedClient {
    inner: Arc<AuthenticatedClientInner>,
}

impl fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("config", &self.inner.config)
            .field("flight", &self.inner.flight)
            .finish_non_exhaustive()
    }
}

impl AuthenticatedClient {
    /// Creates a new client from its collaborators.
    pub fn new<S, E, T>(store: S, endpoint: E, transport: T, config: AuthConfig) -> Self
    where
        S: TokenStore + 'static,
        E: RefreshEndpoint + 'static,
        T: HttpTransport + 'static,
    {
        Self::from_shared(
            Arc::new(store),
            Arc::new(endpoint),
            Arc::new(transport),
            config,
        )
    }

    /// Creates a new client from already shared collaborators.
    pub fn from_shared(
        store: Arc<dyn TokenStore>,
        endpoint: Arc<dyn RefreshEndpoint>,
        transport: Arc<dyn HttpTransport>,
        config: AuthConfig,
    ) -> Self {
        tracing::debug!(
            target: TRACING_TARGET,
            expiry_margin_secs = config.expiry_margin_secs,
            "Creating authenticated client"
        );

        let inner = AuthenticatedClientInner {
            store,
            endpoint,
            transport,
            config,
            flight: RefreshFlight::new(),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Gets the client configuration.
    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    /// Returns whether a refresh is currently in flight.
    pub fn refresh_phase(&self) -> RefreshPhase {
        self.inner.flight.phase()
    }

    /// Returns an access token that is safe to present, if one can be had.
    ///
    /// A missing access token yields `None` without contacting the backend.
    /// An expired or undecodable one is replaced through a refresh, whose
    /// outcome is returned. Only storage failures are errors.
    pub async fn valid_token(&self) -> Result<Option<AccessToken>> {
        let Some(token) = self.inner.store.get(TokenKey::AccessToken).await? else {
            tracing::debug!(target: TRACING_TARGET, "No access token stored");
            return Ok(None);
        };

        let token = AccessToken::new(token);
        if !token.is_expired(self.inner.config.expiry_margin()) {
            return Ok(Some(token));
        }

        tracing::debug!(
            target: TRACING_TARGET,
            expires_at = ?token.expires_at().ok(),
            "Access token expired or undecodable"
        );

        Ok(self.refresh().await)
    }

    /// Joins the in-flight refresh, or starts one.
    ///
    /// Returns the new access token, or `None` if the session was dropped.
    pub async fn refresh(&self) -> Option<AccessToken> {
        let store = Arc::clone(&self.inner.store);
        let endpoint = Arc::clone(&self.inner.endpoint);

        self.inner
            .flight
            .join(move || refresh::run_cycle(store, endpoint))
            .await
    }

    /// Sends `request` to a protected resource with a bearer token attached.
    ///
    /// Fails with an authentication error, without touching the network, when
    /// no valid token is available. A `401` response triggers one refresh and,
    /// if it yields a token, one retry whose response is returned whatever its
    /// status. Transport errors are returned unchanged.
    pub async fn send(&self, request: AuthRequest) -> Result<HttpResponse> {
        let Some(token) = self.valid_token().await? else {
            tracing::warn!(
                target: TRACING_TARGET,
                request_id = %request.request_id,
                url = %request.url,
                "No valid token available"
            );
            return Err(Error::no_token().with_context(request.url));
        };

        let response = self.dispatch(&request, &token).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        tracing::info!(
            target: TRACING_TARGET,
            request_id = %request.request_id,
            url = %request.url,
            "Request rejected as unauthorized, refreshing token"
        );

        match self.refresh().await {
            Some(token) => self.dispatch(&request, &token).await,
            None => Ok(response),
        }
    }

    async fn dispatch(&self, request: &AuthRequest, token: &AccessToken) -> Result<HttpResponse> {
        let started_at = Instant::now();
        let request = request.authorized(token);

        tracing::debug!(
            target: TRACING_TARGET,
            request_id = %request.request_id,
            method = %request.method,
            url = %request.url,
            "Sending authenticated request"
        );

        let result = self.inner.transport.send(&request).await;
        let elapsed = started_at.elapsed();

        match &result {
            Ok(response) => tracing::debug!(
                target: TRACING_TARGET,
                request_id = %request.request_id,
                status = response.status,
                elapsed_ms = elapsed.as_millis(),
                "Authenticated request completed"
            ),
            Err(error) => tracing::warn!(
                target: TRACING_TARGET,
                request_id = %request.request_id,
                error = %error,
                elapsed_ms = elapsed.as_millis(),
                "Authenticated request failed"
            ),
        }

        result
    }

    /// Persists the tokens issued by a successful login.
    pub async fn store_tokens(
        &self,
        access_token: &AccessToken,
        refresh_token: &RefreshToken,
    ) -> Result<()> {
        self.inner
            .store
            .set(TokenKey::AccessToken, access_token.as_str())
            .await?;
        self.inner
            .store
            .set(TokenKey::RefreshToken, refresh_token.as_str())
            .await?;

        tracing::info!(target: TRACING_TARGET, "Session tokens stored");
        Ok(())
    }

    /// Removes both tokens from the store.
    pub async fn logout(&self) -> Result<()> {
        self.inner.store.remove(&TokenKey::ALL).await?;
        tracing::info!(target: TRACING_TARGET, "Logged out");
        Ok(())
    }

    /// Checks at startup whether a usable session exists.
    ///
    /// Any storage failure ends the session and reports `false`.
    pub async fn initialize(&self) -> bool {
        match self.valid_token().await {
            Ok(token) => {
                let authenticated = token.is_some();
                tracing::info!(
                    target: TRACING_TARGET,
                    authenticated,
                    "Session initialized"
                );
                authenticated
            }
            Err(error) => {
                tracing::error!(
                    target: TRACING_TARGET,
                    error = %error,
                    "Session initialization failed"
                );
                refresh::clear_tokens(self.inner.store.as_ref()).await;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::future::join_all;
    use jiff::{SignedDuration, Timestamp};

    use super::*;
    use crate::ErrorKind;
    use crate::mock::{MockRefresh, MockRefreshEndpoint, MockReply, MockTransport};
    use crate::store::MemoryTokenStore;
    use crate::token::test_token;
    use crate::transport::AUTHORIZATION;

    const ORDERS: &str = "https://api.jholabazar.com/api/v1/orders";

    fn token_expiring_in(duration: SignedDuration) -> String {
        test_token(Timestamp::now() + duration).unwrap()
    }

    fn fresh_token() -> String {
        token_expiring_in(SignedDuration::from_hours(1))
    }

    fn client(
        store: &MemoryTokenStore,
        endpoint: &MockRefreshEndpoint,
        transport: &MockTransport,
    ) -> AuthenticatedClient {
        AuthenticatedClient::new(
            store.clone(),
            endpoint.clone(),
            transport.clone(),
            AuthConfig::default(),
        )
    }

    fn bearer(request: &AuthRequest) -> Option<&str> {
        request.header(AUTHORIZATION)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_refresh() {
        let expired = token_expiring_in(SignedDuration::from_mins(1));
        let renewed = fresh_token();
        let store = MemoryTokenStore::with_tokens(Some(&expired), Some("r1"));
        let endpoint = MockRefreshEndpoint::with_delay(Duration::from_millis(100))
            .then(MockRefresh::success(renewed.clone()));
        let transport = MockTransport::new();
        let client = client(&store, &endpoint, &transport);

        let results = join_all((0..8).map(|_| client.valid_token())).await;

        assert_eq!(endpoint.calls(), 1);
        for result in results {
            assert_eq!(result.unwrap(), Some(AccessToken::new(renewed.clone())));
        }
        assert_eq!(client.refresh_phase(), RefreshPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_failure() {
        let expired = token_expiring_in(SignedDuration::from_mins(1));
        let store = MemoryTokenStore::with_tokens(Some(&expired), Some("r1"));
        let endpoint = MockRefreshEndpoint::with_delay(Duration::from_millis(100))
            .then(MockRefresh::Rejected);
        let transport = MockTransport::new();
        let client = client(&store, &endpoint, &transport);

        let results = join_all((0..5).map(|_| client.valid_token())).await;

        assert_eq!(endpoint.calls(), 1);
        assert!(results.into_iter().all(|r| r.unwrap().is_none()));
    }

    #[tokio::test]
    async fn test_token_inside_margin_triggers_refresh() {
        let store = MemoryTokenStore::with_tokens(
            Some(&token_expiring_in(SignedDuration::from_mins(4))),
            Some("r1"),
        );
        let renewed = fresh_token();
        let endpoint = MockRefreshEndpoint::new().then(MockRefresh::success(renewed.clone()));
        let client = client(&store, &endpoint, &MockTransport::new());

        let token = client.valid_token().await.unwrap();

        assert_eq!(endpoint.calls(), 1);
        assert_eq!(token, Some(AccessToken::new(renewed)));
    }

    #[tokio::test]
    async fn test_token_outside_margin_is_used_as_is() {
        let current = token_expiring_in(SignedDuration::from_mins(10));
        let store = MemoryTokenStore::with_tokens(Some(&current), Some("r1"));
        let endpoint = MockRefreshEndpoint::new();
        let client = client(&store, &endpoint, &MockTransport::new());

        let token = client.valid_token().await.unwrap();

        assert_eq!(endpoint.calls(), 0);
        assert_eq!(token, Some(AccessToken::new(current)));
    }

    #[tokio::test]
    async fn test_undecodable_token_triggers_refresh() {
        let store = MemoryTokenStore::with_tokens(Some("opaque"), Some("r1"));
        let endpoint = MockRefreshEndpoint::new().then(MockRefresh::success(fresh_token()));
        let client = client(&store, &endpoint, &MockTransport::new());

        assert!(client.valid_token().await.unwrap().is_some());
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_access_token_skips_refresh() {
        let store = MemoryTokenStore::with_tokens(None, Some("r1"));
        let endpoint = MockRefreshEndpoint::new().then(MockRefresh::success(fresh_token()));
        let client = client(&store, &endpoint, &MockTransport::new());

        assert_eq!(client.valid_token().await.unwrap(), None);
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_response_triggers_one_retry() {
        let current = fresh_token();
        let renewed = token_expiring_in(SignedDuration::from_hours(2));
        let store = MemoryTokenStore::with_tokens(Some(&current), Some("r1"));
        let endpoint = MockRefreshEndpoint::new().then(MockRefresh::success(renewed.clone()));
        let transport = MockTransport::new()
            .then(MockReply::status(401))
            .then(MockReply::body(200, "[]"));
        let client = client(&store, &endpoint, &transport);

        let response = client.send(AuthRequest::get(ORDERS)).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(endpoint.calls(), 1);

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(bearer(&requests[0]), Some(format!("Bearer {current}").as_str()));
        assert_eq!(bearer(&requests[1]), Some(format!("Bearer {renewed}").as_str()));
        assert_eq!(requests[0].url, requests[1].url);
    }

    #[tokio::test]
    async fn test_second_unauthorized_response_is_returned() {
        let store = MemoryTokenStore::with_tokens(Some(&fresh_token()), Some("r1"));
        let endpoint = MockRefreshEndpoint::new()
            .then(MockRefresh::success(fresh_token()))
            .then(MockRefresh::success(fresh_token()));
        let transport = MockTransport::new()
            .then(MockReply::status(401))
            .then(MockReply::body(401, "still unauthorized"));
        let client = client(&store, &endpoint, &transport);

        let response = client.send(AuthRequest::get(ORDERS)).await.unwrap();

        assert_eq!(response.status, 401);
        assert_eq!(response.text().unwrap(), "still unauthorized");
        assert_eq!(endpoint.calls(), 1);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_unauthorized_with_failed_refresh_returns_original_response() {
        let store = MemoryTokenStore::with_tokens(Some(&fresh_token()), Some("r1"));
        let endpoint = MockRefreshEndpoint::new().then(MockRefresh::Rejected);
        let transport = MockTransport::new().then(MockReply::body(401, "expired session"));
        let client = client(&store, &endpoint, &transport);

        let response = client.send(AuthRequest::get(ORDERS)).await.unwrap();

        assert_eq!(response.status, 401);
        assert_eq!(response.text().unwrap(), "expired session");
        assert_eq!(transport.calls(), 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_token_and_unauthorized_refresh_at_most_twice() {
        let store = MemoryTokenStore::with_tokens(
            Some(&token_expiring_in(SignedDuration::from_mins(1))),
            Some("r1"),
        );
        let endpoint = MockRefreshEndpoint::new()
            .then(MockRefresh::success(fresh_token()))
            .then(MockRefresh::success(fresh_token()));
        let transport = MockTransport::new()
            .then(MockReply::status(401))
            .then(MockReply::status(204));
        let client = client(&store, &endpoint, &transport);

        let response = client.send(AuthRequest::delete(ORDERS)).await.unwrap();

        assert_eq!(response.status, 204);
        assert_eq!(endpoint.calls(), 2);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_ends_session() {
        let store = MemoryTokenStore::with_tokens(
            Some(&token_expiring_in(SignedDuration::from_mins(1))),
            Some("r1"),
        );
        let endpoint = MockRefreshEndpoint::new().then(MockRefresh::Rejected);
        let client = client(&store, &endpoint, &MockTransport::new());

        assert_eq!(client.valid_token().await.unwrap(), None);
        assert!(store.get(TokenKey::AccessToken).await.unwrap().is_none());
        assert!(store.get(TokenKey::RefreshToken).await.unwrap().is_none());

        assert_eq!(client.valid_token().await.unwrap(), None);
        assert_eq!(client.valid_token().await.unwrap(), None);
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn test_new_login_after_failed_refresh_can_refresh_again() {
        let expired = || token_expiring_in(SignedDuration::from_mins(1));
        let store = MemoryTokenStore::with_tokens(Some(&expired()), Some("r1"));
        let renewed = fresh_token();
        let endpoint = MockRefreshEndpoint::new()
            .then(MockRefresh::Rejected)
            .then(MockRefresh::success(renewed.clone()));
        let client = client(&store, &endpoint, &MockTransport::new());

        assert_eq!(client.valid_token().await.unwrap(), None);
        assert!(store.is_empty().await);

        client
            .store_tokens(&AccessToken::new(expired()), &RefreshToken::new("r2"))
            .await
            .unwrap();

        assert_eq!(
            client.valid_token().await.unwrap(),
            Some(AccessToken::new(renewed))
        );
        assert_eq!(endpoint.calls(), 2);
        assert_eq!(
            endpoint.presented(),
            vec![RefreshToken::new("r1"), RefreshToken::new("r2")]
        );
    }

    #[tokio::test]
    async fn test_fractional_expiry_keeps_session() {
        use jsonwebtoken::{EncodingKey, Header, encode};

        let exp = (Timestamp::now() + SignedDuration::from_hours(1)).as_second() as f64 + 0.5;
        let current = encode(
            &Header::default(),
            &serde_json::json!({ "exp": exp }),
            &EncodingKey::from_secret(b"server-secret"),
        )
        .unwrap();
        let store = MemoryTokenStore::with_tokens(Some(&current), Some("r1"));
        let endpoint = MockRefreshEndpoint::new().then(MockRefresh::Rejected);
        let client = client(&store, &endpoint, &MockTransport::new());

        assert_eq!(
            client.valid_token().await.unwrap(),
            Some(AccessToken::new(current))
        );
        assert_eq!(endpoint.calls(), 0);
        assert!(!store.is_empty().await);
    }

    #[tokio::test]
    async fn test_near_expiry_request_refreshes_first() {
        let store = MemoryTokenStore::with_tokens(
            Some(&token_expiring_in(SignedDuration::from_mins(1))),
            Some("r1"),
        );
        let renewed = fresh_token();
        let endpoint = MockRefreshEndpoint::new().then(MockRefresh::success(renewed.clone()));
        let transport = MockTransport::new().then(MockReply::body(200, r#"{"orders":[]}"#));
        let client = client(&store, &endpoint, &transport);

        let response = client.send(AuthRequest::get(ORDERS)).await.unwrap();

        assert_eq!(endpoint.calls(), 1);
        assert_eq!(
            store.get(TokenKey::AccessToken).await.unwrap(),
            Some(renewed.clone())
        );

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, ORDERS);
        assert_eq!(bearer(&requests[0]), Some(format!("Bearer {renewed}").as_str()));

        assert_eq!(response.status, 200);
        assert_eq!(response.text().unwrap(), r#"{"orders":[]}"#);
        assert_eq!(response.request_id, requests[0].request_id);
    }

    #[tokio::test]
    async fn test_empty_store_fails_without_network() {
        let store = MemoryTokenStore::new();
        let endpoint = MockRefreshEndpoint::new();
        let transport = MockTransport::new();
        let client = client(&store, &endpoint, &transport);

        let error = client.send(AuthRequest::get(ORDERS)).await.unwrap_err();

        assert!(error.is_authentication());
        assert_eq!(error.message.as_deref(), Some("no valid token available"));
        assert_eq!(transport.calls(), 0);
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_is_propagated_without_refresh() {
        let store = MemoryTokenStore::with_tokens(Some(&fresh_token()), Some("r1"));
        let endpoint = MockRefreshEndpoint::new();
        let transport = MockTransport::new().then(MockReply::NetworkError);
        let client = client(&store, &endpoint, &transport);

        let error = client.send(AuthRequest::get(ORDERS)).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::NetworkError);
        assert_eq!(transport.calls(), 1);
        assert_eq!(endpoint.calls(), 0);
        assert!(!store.is_empty().await);
    }

    #[tokio::test]
    async fn test_other_statuses_are_returned_unchanged() {
        let store = MemoryTokenStore::with_tokens(Some(&fresh_token()), Some("r1"));
        let endpoint = MockRefreshEndpoint::new();
        let transport = MockTransport::new()
            .then(MockReply::body(403, "forbidden"))
            .then(MockReply::status(500));
        let client = client(&store, &endpoint, &transport);

        let forbidden = client.send(AuthRequest::get(ORDERS)).await.unwrap();
        let failed = client.send(AuthRequest::get(ORDERS)).await.unwrap();

        assert_eq!(forbidden.status, 403);
        assert_eq!(failed.status, 500);
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn test_caller_headers_are_preserved() {
        let current = fresh_token();
        let store = MemoryTokenStore::with_tokens(Some(&current), Some("r1"));
        let transport = MockTransport::new();
        let client = client(&store, &MockRefreshEndpoint::new(), &transport);

        let request = AuthRequest::patch("https://api.jholabazar.com/api/v1/cart/items/7/increment")
            .with_header("X-Device", "android")
            .with_header("Authorization", "Bearer caller-supplied");
        client.send(request).await.unwrap();

        let sent = &transport.requests()[0];
        assert_eq!(sent.header("x-device"), Some("android"));
        assert_eq!(bearer(sent), Some(format!("Bearer {current}").as_str()));
    }

    #[tokio::test]
    async fn test_store_tokens_and_logout() {
        let store = MemoryTokenStore::new();
        let client = client(&store, &MockRefreshEndpoint::new(), &MockTransport::new());
        let access = AccessToken::new(fresh_token());

        client
            .store_tokens(&access, &RefreshToken::new("r1"))
            .await
            .unwrap();
        assert_eq!(client.valid_token().await.unwrap(), Some(access));
        assert!(client.initialize().await);

        client.logout().await.unwrap();
        assert!(store.is_empty().await);
        assert!(!client.initialize().await);
    }

    #[tokio::test]
    async fn test_initialize_refreshes_expired_session() {
        let store = MemoryTokenStore::with_tokens(
            Some(&token_expiring_in(SignedDuration::from_mins(-30))),
            Some("r1"),
        );
        let endpoint = MockRefreshEndpoint::new().then(MockRefresh::success(fresh_token()));
        let client = client(&store, &endpoint, &MockTransport::new());

        assert!(client.initialize().await);
        assert_eq!(endpoint.calls(), 1);
    }
}
