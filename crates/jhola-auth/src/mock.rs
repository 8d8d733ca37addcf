//! Scripted mock collaborators for testing.
//!
//! This module provides an [`HttpTransport`] and a [`RefreshEndpoint`] that
//! replay scripted outcomes and record what they were asked to do. They are
//! useful for exercising the client without a network.
//!
//! # Feature Flag
//!
//! This module is only available when the `test-utils` feature is enabled:
//!
//! ```toml
//! [dev-dependencies]
//! jhola-auth = { version = "...", features = ["test-utils"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use jhola_auth::mock::{MockRefresh, MockRefreshEndpoint, MockReply, MockTransport};
//!
//! let transport = MockTransport::new().then(MockReply::status(401));
//! let endpoint = MockRefreshEndpoint::new().then(MockRefresh::success("new-token"));
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;

use crate::refresh::{RefreshEndpoint, RefreshedTokens};
use crate::token::{AccessToken, RefreshToken};
use crate::transport::{AuthRequest, HttpResponse, HttpTransport};
use crate::{Error, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A scripted transport reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Respond with the given status and body.
    Response {
        /// HTTP status.
        status: u16,
        /// Response body.
        body: Bytes,
    },
    /// Fail without producing a response.
    NetworkError,
}

impl MockReply {
    /// A response with the given status and an empty body.
    pub fn status(status: u16) -> Self {
        Self::Response {
            status,
            body: Bytes::new(),
        }
    }

    /// A response with the given status and body.
    pub fn body(status: u16, body: impl Into<Bytes>) -> Self {
        Self::Response {
            status,
            body: body.into(),
        }
    }
}

#[derive(Debug, Default)]
struct MockTransportInner {
    script: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<AuthRequest>>,
}

/// Transport replaying scripted replies in order.
///
/// Once the script is exhausted every request receives an empty `200`.
/// Clones share the script and the request log.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    inner: Arc<MockTransportInner>,
}

impl MockTransport {
    /// Creates a transport with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a reply to the script.
    pub fn then(self, reply: MockReply) -> Self {
        lock(&self.inner.script).push_back(reply);
        self
    }

    /// Returns every request sent so far, in order.
    pub fn requests(&self) -> Vec<AuthRequest> {
        lock(&self.inner.requests).clone()
    }

    /// Returns the number of requests sent so far.
    pub fn calls(&self) -> usize {
        lock(&self.inner.requests).len()
    }
}

#[async_trait::async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: &AuthRequest) -> Result<HttpResponse> {
        lock(&self.inner.requests).push(request.clone());
        let reply = lock(&self.inner.script)
            .pop_front()
            .unwrap_or_else(|| MockReply::status(200));

        match reply {
            MockReply::Response { status, body } => {
                Ok(HttpResponse::new(request.request_id, status, body))
            }
            MockReply::NetworkError => Err(Error::network_error()
                .with_message("mock transport is offline")
                .with_context(request.url.clone())),
        }
    }
}

/// A scripted refresh outcome.
#[derive(Debug, Clone)]
pub enum MockRefresh {
    /// Mint the given tokens.
    Success(RefreshedTokens),
    /// Reject the refresh token.
    Rejected,
    /// Fail without reaching the backend.
    NetworkError,
}

impl MockRefresh {
    /// Mint a new access token only.
    pub fn success(access_token: impl Into<String>) -> Self {
        Self::Success(RefreshedTokens::new(AccessToken::new(access_token)))
    }

    /// Mint a new access token and rotate the refresh token.
    pub fn rotated(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self::Success(
            RefreshedTokens::new(AccessToken::new(access_token))
                .with_refresh_token(RefreshToken::new(refresh_token)),
        )
    }
}

#[derive(Debug, Default)]
struct MockRefreshInner {
    script: Mutex<VecDeque<MockRefresh>>,
    presented: Mutex<Vec<RefreshToken>>,
    delay: Option<Duration>,
}

/// Refresh endpoint replaying scripted outcomes in order.
///
/// Once the script is exhausted every refresh is rejected. Clones share the
/// script and the call log.
#[derive(Debug, Clone, Default)]
pub struct MockRefreshEndpoint {
    inner: Arc<MockRefreshInner>,
}

impl MockRefreshEndpoint {
    /// Creates an endpoint with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an endpoint that waits `delay` before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            inner: Arc::new(MockRefreshInner {
                delay: Some(delay),
                ..Default::default()
            }),
        }
    }

    /// Appends an outcome to the script.
    pub fn then(self, outcome: MockRefresh) -> Self {
        lock(&self.inner.script).push_back(outcome);
        self
    }

    /// Returns every refresh token presented so far, in order.
    pub fn presented(&self) -> Vec<RefreshToken> {
        lock(&self.inner.presented).clone()
    }

    /// Returns the number of refresh calls so far.
    pub fn calls(&self) -> usize {
        lock(&self.inner.presented).len()
    }
}

#[async_trait::async_trait]
impl RefreshEndpoint for MockRefreshEndpoint {
    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<RefreshedTokens> {
        lock(&self.inner.presented).push(refresh_token.clone());
        if let Some(delay) = self.inner.delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = lock(&self.inner.script)
            .pop_front()
            .unwrap_or(MockRefresh::Rejected);

        match outcome {
            MockRefresh::Success(tokens) => Ok(tokens),
            MockRefresh::Rejected => Err(Error::external_error().with_message("refresh rejected")),
            MockRefresh::NetworkError => {
                Err(Error::network_error().with_message("mock refresh endpoint is offline"))
            }
        }
    }
}
