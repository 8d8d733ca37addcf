//! Expiry decoding for claims-bearing bearer tokens.

use std::borrow::Cow;

use jiff::Timestamp;
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use thiserror::Error;

/// Reasons a token's expiry could not be determined.
#[derive(Debug, Error)]
pub enum ExpiryError {
    /// The token is not a well-formed JWT (shape, base64url or JSON).
    #[error("token is not a well-formed JWT: {0}")]
    Malformed(#[from] jsonwebtoken::errors::Error),
    /// The claims carry no `exp` claim.
    #[error("token carries no exp claim")]
    MissingExpiry,
    /// The `exp` claim is outside the representable time range.
    #[error("exp claim {0} is out of range")]
    OutOfRange(f64),
}

/// Only the `exp` claim matters; JWT allows it to be any numeric date.
#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    #[serde(default)]
    exp: Option<f64>,
}

/// Validation that only parses the token.
///
/// The signature and every registered claim belong to the server; the client
/// only needs to know when to stop presenting the token.
fn parse_only() -> Validation {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation
}

/// Strips base64 padding so segments decode with or without it.
fn unpadded(token: &str) -> Cow<'_, str> {
    if !token.contains('=') {
        return Cow::Borrowed(token);
    }

    let segments: Vec<&str> = token
        .split('.')
        .map(|segment| segment.trim_end_matches('='))
        .collect();
    Cow::Owned(segments.join("."))
}

/// Decodes the `exp` claim of a token without verifying its signature.
///
/// Fractional expiries are truncated to the whole second.
pub fn decode_expiry(token: &str) -> Result<Timestamp, ExpiryError> {
    let token = unpadded(token);
    let data = decode::<ExpiryClaims>(&*token, &DecodingKey::from_secret(&[]), &parse_only())?;
    let exp = data.claims.exp.ok_or(ExpiryError::MissingExpiry)?;

    if !exp.is_finite() {
        return Err(ExpiryError::OutOfRange(exp));
    }

    Timestamp::from_second(exp.floor() as i64).map_err(|_| ExpiryError::OutOfRange(exp))
}

/// Builds an HS256 token whose claims carry the given `exp`.
///
/// The signing secret is fixed; [`decode_expiry`] never checks it.
#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub fn test_token(exp: Timestamp) -> Result<String, ExpiryError> {
    use jsonwebtoken::{EncodingKey, Header, encode};

    #[derive(serde::Serialize)]
    struct TestClaims {
        sub: &'static str,
        exp: i64,
    }

    let claims = TestClaims {
        sub: "customer",
        exp: exp.as_second(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"jhola-auth-test-secret"),
    )?;
    Ok(token)
}
