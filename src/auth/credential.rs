//! Service account credential parsing.

use std::fmt;

use serde::Deserialize;

use crate::error::{AuthError, Result};

/// Service account fields needed for token acquisition.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceAccountCredential {
    pub client_email: String,
    pub private_key_pem: String,
    pub project_id: String,
}

impl fmt::Debug for ServiceAccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountCredential")
            .field("client_email", &self.client_email)
            .field("private_key_pem", &"<redacted>")
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Which optional fields must be present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CredentialRequirements {
    /// Reject credentials without a `project_id`
    pub require_project_id: bool,
}

/// Raw key file shape. Everything else Google puts in the file is ignored.
#[derive(Debug, Deserialize)]
struct RawCredential {
    client_email: Option<String>,
    private_key: Option<String>,
    project_id: Option<String>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AuthError::CredentialIncomplete { field }),
    }
}

impl ServiceAccountCredential {
    /// Parse and validate a service account JSON key.
    pub fn from_json(json: &str, requirements: CredentialRequirements) -> Result<Self> {
        let raw: RawCredential =
            serde_json::from_str(json).map_err(|e| AuthError::CredentialParse(e.to_string()))?;

        let client_email = required(raw.client_email, "client_email")?;
        let private_key_pem = required(raw.private_key, "private_key")?;
        let project_id = if requirements.require_project_id {
            required(raw.project_id, "project_id")?
        } else {
            raw.project_id.unwrap_or_default()
        };

        Ok(Self {
            client_email,
            private_key_pem,
            project_id,
        })
    }
}
