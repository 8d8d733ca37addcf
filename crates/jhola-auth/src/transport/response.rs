//! Response types returned by the transport.

use std::collections::HashMap;

use bytes::Bytes;
use jiff::Timestamp;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::Result;

/// Status code the server uses to reject a credential.
pub const UNAUTHORIZED: u16 = 401;

/// A response from the commerce API, returned to the caller unchanged.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Request ID this response corresponds to.
    pub request_id: Uuid,
    /// Numeric HTTP status.
    pub status: u16,
    /// Response headers (lowercased names).
    pub headers: HashMap<String, String>,
    /// Raw response body.
    pub body: Bytes,
    /// Timestamp when the response was received.
    pub received_at: Timestamp,
}

impl HttpResponse {
    /// Creates a new response.
    pub fn new(request_id: Uuid, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            request_id,
            status,
            headers: HashMap::new(),
            body: body.into(),
            received_at: Timestamp::now(),
        }
    }

    /// Adds a header to the response.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Returns whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns whether the server rejected the credential.
    pub fn is_unauthorized(&self) -> bool {
        self.status == UNAUTHORIZED
    }

    /// Returns the body decoded as UTF-8.
    pub fn text(&self) -> Result<String> {
        Ok(String::from_utf8(self.body.to_vec())?)
    }

    /// Returns the body decoded as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}
