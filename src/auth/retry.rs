//! End-to-end token acquisition with a fixed retry policy.
//!
//! Each attempt walks the whole chain again: parse the credential, build and
//! sign an assertion, exchange it. Nothing from a failed attempt is reused.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::credential::{CredentialRequirements, ServiceAccountCredential};
use super::exchange::{AccessToken, HttpTokenExchanger, TokenExchange};
use super::jwt::JwtAssertionBuilder;
use super::TokenProvider;
use crate::error::{AuthError, Result, Stage};

/// Which failures are retried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryMode {
    /// Retry every failure, including ones that cannot succeed on retry
    #[default]
    Unconditional,
    /// Give up immediately on credential, key and signing errors
    FailFast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub mode: RetryMode,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
            mode: RetryMode::Unconditional,
        }
    }
}

impl RetryPolicy {
    fn should_retry(&self, attempt: u32, err: &AuthError) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        match self.mode {
            RetryMode::Unconditional => true,
            RetryMode::FailFast => !err.is_permanent(),
        }
    }
}

/// Outcome of a single attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    /// Last stage entered during the attempt
    pub stage: Stage,
    pub error: Option<String>,
}

/// Every attempt made by one acquisition, in order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AcquisitionTrace {
    pub attempts: Vec<AttemptRecord>,
}

impl AcquisitionTrace {
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }
}

/// A token and how it was obtained.
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub token: AccessToken,
    pub trace: AcquisitionTrace,
}

/// Acquires access tokens for a service account.
pub struct ServiceAccountTokenSource {
    credential_json: String,
    requirements: CredentialRequirements,
    builder: JwtAssertionBuilder,
    exchanger: Arc<dyn TokenExchange>,
    policy: RetryPolicy,
}

impl ServiceAccountTokenSource {
    /// Create a source for the given service account JSON, talking to Google
    /// with default settings.
    pub fn new(credential_json: impl Into<String>) -> Self {
        Self {
            credential_json: credential_json.into(),
            requirements: CredentialRequirements::default(),
            builder: JwtAssertionBuilder::default(),
            exchanger: Arc::new(HttpTokenExchanger::default()),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_requirements(mut self, requirements: CredentialRequirements) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_builder(mut self, builder: JwtAssertionBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_exchanger(mut self, exchanger: Arc<dyn TokenExchange>) -> Self {
        self.exchanger = exchanger;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run the full chain, retrying per the policy.
    pub async fn acquire(&self, scope: &str) -> Result<Acquisition> {
        let mut trace = AcquisitionTrace::default();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("token acquisition attempt {}/{}", attempt, self.policy.max_attempts);

            let mut stage = Stage::ParsingCredential;
            let result = self.attempt(scope, &mut stage).await;
            match result {
                Ok(token) => {
                    trace.attempts.push(AttemptRecord {
                        attempt,
                        stage,
                        error: None,
                    });
                    info!("obtained access token after {} attempt(s)", attempt);
                    return Ok(Acquisition { token, trace });
                }
                Err(err) => {
                    warn!(
                        "token acquisition attempt {} failed at {}: {}",
                        attempt,
                        err.stage(),
                        err
                    );
                    trace.attempts.push(AttemptRecord {
                        attempt,
                        stage,
                        error: Some(err.to_string()),
                    });

                    if !self.policy.should_retry(attempt, &err) {
                        return Err(AuthError::AcquisitionFailed {
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }
                }
            }

            tokio::time::sleep(self.policy.delay).await;
        }
    }

    async fn attempt(&self, scope: &str, stage: &mut Stage) -> Result<AccessToken> {
        *stage = Stage::ParsingCredential;
        let credential = ServiceAccountCredential::from_json(&self.credential_json, self.requirements)?;

        *stage = Stage::BuildingJwt;
        let assertion = self.builder.build(&credential, scope)?;

        *stage = Stage::ExchangingToken;
        self.exchanger.exchange(&assertion).await
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountTokenSource {
    async fn access_token(&self, scope: &str) -> Result<AccessToken> {
        self.acquire(scope).await.map(|a| a.token)
    }
}
