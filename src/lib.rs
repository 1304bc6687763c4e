//! sa-token: Google service account access tokens via signed JWT assertions
//!
//! This library obtains OAuth2 access tokens for Google APIs (Drive in
//! particular) from a service account JSON key, without any stored refresh
//! token.
//!
//! # Architecture
//!
//! - **Credential loading**: parses and validates the service account JSON.
//! - **Assertion building**: decodes the PKCS#8 key and signs an RS256 JWT.
//! - **Token exchange**: posts the assertion to the OAuth2 token endpoint
//!   with the JWT-bearer grant.
//! - **Retry wrapper**: runs the whole chain with a fixed attempt count and
//!   delay, recording a trace of every attempt.
//! - **Token cache**: optional decorator that reuses tokens per scope.
//!
//! # Example
//!
//! ```no_run
//! use sa_token::auth::{ServiceAccountTokenSource, DRIVE_SCOPE};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let json = std::env::var("GOOGLE_SERVICE_ACCOUNT_KEY")?;
//! let source = ServiceAccountTokenSource::new(json);
//!
//! let acquisition = source.acquire(DRIVE_SCOPE).await?;
//! println!("Authorization: {}", acquisition.token.authorization_header());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod diagnose;
pub mod env;
pub mod error;

pub use error::{AuthError, ErrorBody, Result, Stage};
