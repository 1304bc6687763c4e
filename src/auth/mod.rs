//! Service account authentication for Google APIs
//!
//! Tokens are obtained with the OAuth2 JWT-bearer grant:
//! - `credential` parses the service account JSON key
//! - `pem` and `base64url` handle key decoding and JWT framing
//! - `jwt` builds and signs the RS256 assertion
//! - `exchange` trades the assertion for an access token
//! - `retry` runs the chain end to end with a retry policy
//! - `cache` optionally reuses tokens per scope until they near expiry

pub mod base64url;
pub mod cache;
pub mod credential;
pub mod exchange;
pub mod jwt;
pub mod pem;
pub mod retry;

use async_trait::async_trait;

use crate::error::Result;

pub use cache::TokenCache;
pub use credential::{CredentialRequirements, ServiceAccountCredential};
pub use exchange::{AccessToken, HttpTokenExchanger, TokenExchange};
pub use jwt::{Clock, FixedClock, JwtAssertionBuilder, JwtClaims, SignedAssertion, SystemClock};
pub use retry::{Acquisition, AcquisitionTrace, RetryMode, RetryPolicy, ServiceAccountTokenSource};

/// Read-write access to Drive
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Read-only access to Drive, enough for listing
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Anything that can hand out an access token for a scope.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self, scope: &str) -> Result<AccessToken>;
}
