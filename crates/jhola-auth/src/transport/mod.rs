//! HTTP transport abstraction.
//!
//! The client never speaks HTTP itself; it hands fully-formed requests to an
//! [`HttpTransport`] and inspects the numeric status of what comes back.

mod request;
mod response;

pub use self::request::{AUTHORIZATION, AuthRequest, Method};
pub use self::response::{HttpResponse, UNAUTHORIZED};
use crate::Result;

/// Tracing target for transport operations.
pub const TRACING_TARGET: &str = "jhola_auth::transport";

/// A fetch-like function issuing a single HTTP request.
///
/// Implementations report failures to produce a response (DNS, offline,
/// timeout) as errors; any received status, including 4xx and 5xx, is an
/// `Ok` response.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends the request and returns the received response.
    async fn send(&self, request: &AuthRequest) -> Result<HttpResponse>;
}
