//! Outbound request types.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::Result;
use crate::token::AccessToken;

/// Name of the header carrying the bearer credential.
pub const AUTHORIZATION: &str = "Authorization";

/// HTTP methods used against the commerce API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(AsRefStr, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Method {
    /// `GET`
    #[default]
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

/// A request to a protected resource.
///
/// The body and headers are opaque to the client; only the `Authorization`
/// header is managed by it.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    /// Unique identifier for log correlation.
    pub request_id: Uuid,
    /// HTTP method.
    pub method: Method,
    /// Absolute request target.
    pub url: String,
    /// Caller-supplied headers.
    pub headers: HashMap<String, String>,
    /// Optional request body.
    pub body: Option<Bytes>,
    /// Optional request timeout (uses the transport default if not set).
    pub timeout: Option<Duration>,
}

impl AuthRequest {
    /// Creates a new request.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Creates a `GET` request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Creates a `POST` request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    /// Creates a `PUT` request.
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    /// Creates a `PATCH` request.
    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::Patch, url)
    }

    /// Creates a `DELETE` request.
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    /// Adds a header to the request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets multiple headers.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Sets a raw request body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `body` as JSON and sets the matching content type.
    pub fn with_json<T: Serialize + ?Sized>(self, body: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(body)?;
        Ok(self
            .with_header("Content-Type", "application/json")
            .with_body(bytes))
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the value of a header, matching the name case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns a copy of this request carrying `token` as its bearer credential.
    ///
    /// Any caller-supplied `Authorization` header is replaced; every other
    /// header is preserved.
    pub fn authorized(&self, token: &AccessToken) -> Self {
        let mut request = self.clone();
        request
            .headers
            .retain(|name, _| !name.eq_ignore_ascii_case(AUTHORIZATION));
        request
            .headers
            .insert(AUTHORIZATION.to_owned(), token.bearer());
        request
    }
}
