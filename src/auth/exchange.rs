//! Exchange of a signed assertion for an OAuth2 access token.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::jwt::SignedAssertion;
use crate::error::{AuthError, Result};

/// Google's OAuth2 token endpoint
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Grant type of the JWT-bearer flow
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Default timeout for a single token request
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Bearer token returned by the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: String,
    token_type: String,
    expires_in: Option<Duration>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_in: Option<Duration>) -> Self {
        Self {
            token: token.into(),
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Lifetime reported by the endpoint, if any
    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_in
    }

    /// Value for an `Authorization` header
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Trades an assertion for an access token.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, assertion: &SignedAssertion) -> Result<AccessToken>;
}

/// Response structure from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    token_type: Option<String>,
}

/// Error fields Google includes on a failed grant.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// [`TokenExchange`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTokenExchanger {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl Default for HttpTokenExchanger {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_ENDPOINT, DEFAULT_EXCHANGE_TIMEOUT)
    }
}

impl HttpTokenExchanger {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_send_error(&self, err: reqwest::Error) -> AuthError {
        if err.is_timeout() {
            AuthError::OAuth2Timeout(self.timeout)
        } else {
            AuthError::OAuth2Exchange {
                status: None,
                body: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchanger {
    async fn exchange(&self, assertion: &SignedAssertion) -> Result<AccessToken> {
        debug!("POST {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(&body) {
                warn!(
                    "token endpoint rejected assertion: {} {}",
                    parsed.error,
                    parsed.error_description.as_deref().unwrap_or("")
                );
            }
            return Err(AuthError::OAuth2Exchange {
                status: Some(status.as_u16()),
                body,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::OAuth2Response(format!("body is not valid JSON: {}", e)))?;

        let token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::OAuth2Response("missing access_token".to_string()))?;

        Ok(AccessToken {
            token,
            token_type: parsed.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_in: parsed.expires_in.map(Duration::from_secs),
        })
    }
}
