//! Stage-by-stage health check of a service account credential.
//!
//! Each stage runs only if the previous one succeeded. The report is safe to
//! print: it never contains the private key, the assertion or the token.

use serde::Serialize;
use tracing::{debug, info};

use crate::auth::{
    jwt, pem, CredentialRequirements, JwtAssertionBuilder, ServiceAccountCredential,
    TokenExchange,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyFormat {
    /// Armored with BEGIN/END lines
    Pem,
    /// Bare base64 body
    Raw,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CredentialReport {
    pub parsed: bool,
    pub has_client_email: bool,
    pub has_private_key: bool,
    pub has_project_id: bool,
    pub client_email: Option<String>,
    pub project_id: Option<String>,
    pub key_format: Option<KeyFormat>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct KeyReport {
    pub decoded: bool,
    pub der_len: Option<usize>,
    pub imported: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AssertionReport {
    pub built: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExchangeReport {
    pub attempted: bool,
    pub success: bool,
    pub expires_in_secs: Option<u64>,
    pub error: Option<String>,
}

/// Result of every diagnostic stage
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub timestamp: String,
    pub scope: String,
    pub credential: CredentialReport,
    pub key: KeyReport,
    pub assertion: AssertionReport,
    pub exchange: ExchangeReport,
}

impl DiagnosticReport {
    /// True when every stage that ran succeeded
    pub fn is_healthy(&self) -> bool {
        self.credential.parsed
            && self.key.imported
            && self.assertion.built
            && (!self.exchange.attempted || self.exchange.success)
    }
}

/// Field presence, without enforcing any requirement.
fn inspect_fields(json: &str, report: &mut CredentialReport) {
    let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(json) else {
        return;
    };

    let non_empty = |key: &str| {
        map.get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };

    report.client_email = non_empty("client_email");
    report.project_id = non_empty("project_id");
    report.has_client_email = report.client_email.is_some();
    report.has_project_id = report.project_id.is_some();
    report.has_private_key = non_empty("private_key").is_some();
    report.key_format = non_empty("private_key").map(|k| {
        if pem::is_armored(&k.replace("\\n", "\n")) {
            KeyFormat::Pem
        } else {
            KeyFormat::Raw
        }
    });
}

/// Run the diagnostic stages. The token exchange only runs when an
/// exchanger is supplied.
pub async fn run(
    credential_json: &str,
    requirements: CredentialRequirements,
    scope: &str,
    builder: &JwtAssertionBuilder,
    exchanger: Option<&dyn TokenExchange>,
) -> DiagnosticReport {
    let mut report = DiagnosticReport {
        timestamp: chrono::Utc::now().to_rfc3339(),
        scope: scope.to_string(),
        credential: CredentialReport::default(),
        key: KeyReport::default(),
        assertion: AssertionReport::default(),
        exchange: ExchangeReport::default(),
    };

    inspect_fields(credential_json, &mut report.credential);

    let credential = match ServiceAccountCredential::from_json(credential_json, requirements) {
        Ok(c) => {
            report.credential.parsed = true;
            c
        }
        Err(e) => {
            report.credential.error = Some(e.to_string());
            return report;
        }
    };
    debug!("diagnose: credential for {} parsed", credential.client_email);

    match pem::decode(&credential.private_key_pem) {
        Ok(der) => {
            report.key.decoded = true;
            report.key.der_len = Some(der.len());
            match jwt::import_key(&der) {
                Ok(_) => report.key.imported = true,
                Err(e) => report.key.error = Some(e.to_string()),
            }
        }
        Err(e) => report.key.error = Some(e.to_string()),
    }
    if !report.key.imported {
        return report;
    }

    let assertion = match builder.build(&credential, scope) {
        Ok(a) => {
            report.assertion.built = true;
            a
        }
        Err(e) => {
            report.assertion.error = Some(e.to_string());
            return report;
        }
    };

    if let Some(exchanger) = exchanger {
        report.exchange.attempted = true;
        match exchanger.exchange(&assertion).await {
            Ok(token) => {
                report.exchange.success = true;
                report.exchange.expires_in_secs = token.expires_in().map(|d| d.as_secs());
            }
            Err(e) => report.exchange.error = Some(e.to_string()),
        }
    }

    info!(
        "diagnose finished: {}",
        if report.is_healthy() { "healthy" } else { "unhealthy" }
    );
    report
}
