use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Stage of a token acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ParsingCredential,
    BuildingJwt,
    ExchangingToken,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ParsingCredential => "parsing_credential",
            Stage::BuildingJwt => "building_jwt",
            Stage::ExchangingToken => "exchanging_token",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for token acquisition
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Service account credential is not valid JSON: {0}")]
    CredentialParse(String),

    #[error("Service account credential is missing required field: {field}")]
    CredentialIncomplete { field: &'static str },

    #[error("Invalid private key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Failed to create JWT assertion: {0}")]
    JwtCreation(String),

    #[error("{}", exchange_message(*status, body))]
    OAuth2Exchange { status: Option<u16>, body: String },

    #[error("OAuth2 token request timed out after {0:?}")]
    OAuth2Timeout(Duration),

    #[error("Unexpected OAuth2 token response: {0}")]
    OAuth2Response(String),

    #[error("Token acquisition failed after {attempts} attempt(s) at stage {}: {source}", source.stage())]
    AcquisitionFailed {
        attempts: u32,
        #[source]
        source: Box<AuthError>,
    },
}

fn exchange_message(status: Option<u16>, body: &str) -> String {
    match status {
        Some(status) => format!("OAuth2 token exchange failed ({}): {}", status, body),
        None => format!("OAuth2 token request failed: {}", body),
    }
}

impl AuthError {
    /// Stage at which this error was raised
    pub fn stage(&self) -> Stage {
        match self {
            AuthError::CredentialParse(_) | AuthError::CredentialIncomplete { .. } => {
                Stage::ParsingCredential
            }
            AuthError::InvalidKeyFormat(_) | AuthError::JwtCreation(_) => Stage::BuildingJwt,
            AuthError::OAuth2Exchange { .. }
            | AuthError::OAuth2Timeout(_)
            | AuthError::OAuth2Response(_) => Stage::ExchangingToken,
            AuthError::AcquisitionFailed { source, .. } => source.stage(),
        }
    }

    /// Errors that cannot succeed on retry with the same inputs
    pub fn is_permanent(&self) -> bool {
        match self {
            AuthError::AcquisitionFailed { source, .. } => source.is_permanent(),
            other => other.stage() != Stage::ExchangingToken,
        }
    }

    /// Number of attempts made before this error was returned
    pub fn attempts(&self) -> u32 {
        match self {
            AuthError::AcquisitionFailed { attempts, .. } => *attempts,
            _ => 1,
        }
    }

    /// Serializable summary, suitable as a JSON error body
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            stage: self.stage(),
            attempts: self.attempts(),
        }
    }
}

/// JSON error body naming the failing stage
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub stage: Stage,
    pub attempts: u32,
}

/// Result type alias for token acquisition
pub type Result<T> = std::result::Result<T, AuthError>;
