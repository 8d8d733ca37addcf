//! Reqwest-based HTTP client for authenticated requests and token refresh.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{Error, ReqwestConfig, TRACING_TARGET};
use crate::refresh::{RefreshEndpoint, RefreshedTokens};
use crate::token::{AccessToken, RefreshToken};
use crate::transport::{AUTHORIZATION, AuthRequest, HttpResponse, HttpTransport, Method};

/// Inner client that holds the HTTP client and configuration.
struct ReqwestClientInner {
    http: Client,
    config: ReqwestConfig,
    refresh_url: Url,
}

/// Body returned by the refresh endpoint.
#[derive(Debug, Deserialize)]
struct RefreshBody {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<RefreshData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshData {
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Reqwest-based HTTP client for the commerce API.
///
/// This client implements both [`HttpTransport`], for the requests the
/// authenticated client issues, and [`RefreshEndpoint`], for exchanging a
/// refresh token against `POST {api_base_url}{refresh_path}`.
///
/// # Examples
///
/// ```rust,ignore
/// use jhola_auth::reqwest::{ReqwestClient, ReqwestConfig};
///
/// let config = ReqwestConfig::new("https://api.jholabazar.com/api/v1");
/// let client = ReqwestClient::new(config)?;
/// ```
#[derive(Clone)]
pub struct ReqwestClient {
    inner: Arc<ReqwestClientInner>,
}

impl std::fmt::Debug for ReqwestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestClient")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl ReqwestClient {
    /// Creates a new reqwest client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh endpoint URL is invalid or the HTTP
    /// client cannot be created.
    pub fn new(config: ReqwestConfig) -> crate::Result<Self> {
        let timeout = config.effective_timeout();
        let user_agent = config.effective_user_agent();

        tracing::debug!(
            target: TRACING_TARGET,
            timeout_ms = timeout.as_millis(),
            api_base_url = %config.api_base_url,
            "Creating reqwest client"
        );

        let refresh_url = config.refresh_url()?;
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(&user_agent)
            .build()
            .map_err(Error::from)?;

        let inner = ReqwestClientInner {
            http,
            config,
            refresh_url,
        };
        let client = Self {
            inner: Arc::new(inner),
        };

        tracing::info!(
            target: TRACING_TARGET,
            "Reqwest client created successfully"
        );

        Ok(client)
    }

    /// Creates a new reqwest client with default configuration.
    pub fn with_defaults() -> crate::Result<Self> {
        Self::new(ReqwestConfig::default())
    }

    /// Gets the client configuration.
    pub fn config(&self) -> &ReqwestConfig {
        &self.inner.config
    }

    /// Gets the absolute URL of the refresh endpoint.
    pub fn refresh_url(&self) -> &Url {
        &self.inner.refresh_url
    }

    /// Resolves a path against the API base URL; absolute URLs pass through.
    pub fn endpoint(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_owned();
        }

        format!(
            "{}/{}",
            self.inner.config.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestClient {
    async fn send(&self, request: &AuthRequest) -> crate::Result<HttpResponse> {
        let mut http_request = self
            .inner
            .http
            .request(Self::method(request.method), request.url.as_str());

        for (name, value) in &request.headers {
            http_request = http_request.header(name, value);
        }
        if let Some(body) = &request.body {
            http_request = http_request.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            http_request = http_request.timeout(timeout);
        }

        let http_response = http_request.send().await.map_err(Error::from)?;

        let status = http_response.status().as_u16();
        let mut headers = HashMap::new();
        for (name, value) in http_response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.to_string(), v.to_string());
            }
        }
        let body = http_response.bytes().await.map_err(Error::from)?;

        tracing::trace!(
            target: TRACING_TARGET,
            request_id = %request.request_id,
            status,
            body_len = body.len(),
            "Response received"
        );

        let mut response = HttpResponse::new(request.request_id, status, body);
        response.headers = headers;
        Ok(response)
    }
}

#[async_trait::async_trait]
impl RefreshEndpoint for ReqwestClient {
    async fn refresh(&self, refresh_token: &RefreshToken) -> crate::Result<RefreshedTokens> {
        tracing::debug!(
            target: TRACING_TARGET,
            url = %self.inner.refresh_url,
            "Requesting token refresh"
        );

        let http_response = self
            .inner
            .http
            .post(self.inner.refresh_url.as_str())
            .header("Content-Type", "application/json")
            .header(AUTHORIZATION, refresh_token.bearer())
            .send()
            .await
            .map_err(Error::from)?;

        let status = http_response.status();
        let bytes = http_response.bytes().await.map_err(Error::from)?;
        if !status.is_success() {
            return Err(Error::RefreshStatus(status.as_u16()).into());
        }

        let body: RefreshBody = serde_json::from_slice(&bytes).map_err(Error::from)?;
        let data = body.data.filter(|_| body.success);
        let Some(RefreshData {
            access_token: Some(access_token),
            refresh_token,
        }) = data
        else {
            return Err(Error::RefreshDenied.into());
        };

        let tokens = RefreshedTokens::new(AccessToken::new(access_token));
        Ok(match refresh_token {
            Some(rotated) => tokens.with_refresh_token(RefreshToken::new(rotated)),
            None => tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::http::header::AUTHORIZATION as AUTHORIZATION_HEADER;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use serde_json::{Value, json};

    use super::*;
    use crate::ErrorKind;

    async fn refresh_handler(headers: HeaderMap) -> (StatusCode, axum::Json<Value>) {
        let bearer = headers
            .get(AUTHORIZATION_HEADER)
            .and_then(|v| v.to_str().ok());

        match bearer {
            Some("Bearer r1") => (
                StatusCode::OK,
                axum::Json(json!({ "success": true, "data": { "accessToken": "a2" } })),
            ),
            Some("Bearer rotate") => (
                StatusCode::OK,
                axum::Json(json!({
                    "success": true,
                    "data": { "accessToken": "a3", "refreshToken": "r2" }
                })),
            ),
            Some("Bearer soft-fail") => (
                StatusCode::OK,
                axum::Json(json!({ "success": false, "message": "session revoked" })),
            ),
            _ => (
                StatusCode::UNAUTHORIZED,
                axum::Json(json!({ "success": false, "message": "invalid refresh token" })),
            ),
        }
    }

    async fn orders_handler(headers: HeaderMap) -> (StatusCode, String) {
        let device = headers
            .get("x-device")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let bearer = headers
            .get(AUTHORIZATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        (StatusCode::ACCEPTED, format!("{device}|{bearer}"))
    }

    async fn spawn_server() -> String {
        let router = Router::new()
            .route("/api/v1/auth/refresh", post(refresh_handler))
            .route("/api/v1/auth/malformed", post(|| async { "not json" }))
            .route("/api/v1/orders", get(orders_handler));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        format!("http://{addr}/api/v1")
    }

    async fn client_for(base_url: &str) -> ReqwestClient {
        ReqwestClient::new(ReqwestConfig::new(base_url)).unwrap()
    }

    #[test]
    fn test_client_creation() {
        let client = ReqwestClient::with_defaults().unwrap();
        assert!(client.config().user_agent.is_none());
        assert_eq!(
            client.refresh_url().as_str(),
            "https://api.jholabazar.com/api/v1/auth/refresh"
        );
    }

    #[test]
    fn test_endpoint_resolution() {
        let client = ReqwestClient::with_defaults().unwrap();
        assert_eq!(
            client.endpoint("/orders"),
            "https://api.jholabazar.com/api/v1/orders"
        );
        assert_eq!(
            client.endpoint("https://maps.example.com/geocode"),
            "https://maps.example.com/geocode"
        );
    }

    #[tokio::test]
    async fn test_refresh_success() {
        let base_url = spawn_server().await;
        let client = client_for(&base_url).await;

        let tokens = client.refresh(&RefreshToken::new("r1")).await.unwrap();

        assert_eq!(tokens.access_token, AccessToken::new("a2"));
        assert!(tokens.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_refresh_with_rotation() {
        let base_url = spawn_server().await;
        let client = client_for(&base_url).await;

        let tokens = client.refresh(&RefreshToken::new("rotate")).await.unwrap();

        assert_eq!(tokens.access_token, AccessToken::new("a3"));
        assert_eq!(tokens.refresh_token, Some(RefreshToken::new("r2")));
    }

    #[tokio::test]
    async fn test_refresh_rejected_status() {
        let base_url = spawn_server().await;
        let client = client_for(&base_url).await;

        let error = client.refresh(&RefreshToken::new("bogus")).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_refresh_unsuccessful_body() {
        let base_url = spawn_server().await;
        let client = client_for(&base_url).await;

        let error = client
            .refresh(&RefreshToken::new("soft-fail"))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ExternalError);
    }

    #[tokio::test]
    async fn test_refresh_malformed_body() {
        let base_url = spawn_server().await;
        let config = ReqwestConfig::new(&base_url).with_refresh_path("/auth/malformed");
        let client = ReqwestClient::new(config).unwrap();

        let error = client.refresh(&RefreshToken::new("r1")).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Serialization);
    }

    #[tokio::test]
    async fn test_refresh_unreachable_endpoint() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(&format!("http://{addr}/api/v1")).await;
        let error = client.refresh(&RefreshToken::new("r1")).await.unwrap_err();
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn test_transport_sends_headers_and_returns_status() {
        let base_url = spawn_server().await;
        let client = client_for(&base_url).await;

        let request = AuthRequest::get(client.endpoint("/orders"))
            .with_header("X-Device", "android")
            .authorized(&AccessToken::new("a1"));
        let response = client.send(&request).await.unwrap();

        assert_eq!(response.status, 202);
        assert_eq!(response.request_id, request.request_id);
        assert_eq!(response.text().unwrap(), "android|Bearer a1");
    }

    #[tokio::test]
    async fn test_transport_returns_error_statuses() {
        let base_url = spawn_server().await;
        let client = client_for(&base_url).await;

        let response = client
            .send(&AuthRequest::get(client.endpoint("/missing")))
            .await
            .unwrap();

        assert_eq!(response.status, 404);
    }
}
