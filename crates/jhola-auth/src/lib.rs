#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod client;
mod config;
mod error;

pub mod refresh;
pub mod store;
pub mod token;
pub mod transport;

#[cfg(feature = "reqwest")]
#[cfg_attr(docsrs, doc(cfg(feature = "reqwest")))]
pub mod reqwest;

#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub mod mock;

pub use client::AuthenticatedClient;
pub use config::{AuthConfig, DEFAULT_EXPIRY_MARGIN_SECS};
pub use error::{BoxedError, Error, ErrorKind, Result};
pub use refresh::{RefreshEndpoint, RefreshPhase, RefreshedTokens};
pub use store::{FileTokenStore, MemoryTokenStore, TokenKey, TokenStore};
pub use token::{AccessToken, DEFAULT_EXPIRY_MARGIN, ExpiryError, RefreshToken, decode_expiry};
pub use transport::{AuthRequest, HttpResponse, HttpTransport, Method};
