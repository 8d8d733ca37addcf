//! Reqwest-based HTTP transport and refresh endpoint.
//!
//! This module provides a reqwest-based implementation of the
//! [`HttpTransport`] and [`RefreshEndpoint`] traits.
//!
//! [`HttpTransport`]: crate::HttpTransport
//! [`RefreshEndpoint`]: crate::RefreshEndpoint
//!
//! # Example
//!
//! ```rust,ignore
//! use jhola_auth::reqwest::{ReqwestClient, ReqwestConfig};
//! use jhola_auth::{AuthConfig, AuthenticatedClient, MemoryTokenStore};
//!
//! // One reqwest client serves as both transport and refresh endpoint
//! let http = ReqwestClient::new(ReqwestConfig::default())?;
//! let client = AuthenticatedClient::new(
//!     MemoryTokenStore::new(),
//!     http.clone(),
//!     http,
//!     AuthConfig::default(),
//! );
//! ```

mod client;
mod config;
mod error;

pub use client::ReqwestClient;
pub use config::{DEFAULT_API_BASE_URL, DEFAULT_REFRESH_PATH, ReqwestConfig};
pub use error::{Error, Result};

/// Tracing target for reqwest client operations.
pub const TRACING_TARGET: &str = "jhola_auth::reqwest";
