//! Configuration parsing and structures

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::auth::cache::DEFAULT_EXPIRY_BUFFER;
use crate::auth::exchange::{DEFAULT_EXCHANGE_TIMEOUT, DEFAULT_TOKEN_ENDPOINT};
use crate::auth::{
    CredentialRequirements, HttpTokenExchanger, RetryMode, RetryPolicy, ServiceAccountTokenSource,
    TokenCache, TokenProvider, DRIVE_SCOPE,
};
use crate::env::substitute_env_vars;

// =============================================================================
// Raw Config (Deserialized from YAML)
// =============================================================================

/// Raw configuration as deserialized from YAML.
/// This is converted to `Config` via `resolve()`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Where the service account key comes from
    pub credentials: RawCredentialsConfig,

    /// Token endpoint settings
    #[serde(default)]
    pub token: RawTokenConfig,

    /// Retry policy
    #[serde(default)]
    pub retry: RawRetryConfig,

    /// Token cache
    #[serde(default)]
    pub cache: RawCacheConfig,
}

/// Credential source; exactly one of `json` or `path` must be set
#[derive(Debug, Clone, Deserialize)]
pub struct RawCredentialsConfig {
    /// Inline service account JSON, usually `${GOOGLE_SERVICE_ACCOUNT_KEY}`
    pub json: Option<String>,

    /// Path to a service account JSON key file
    pub path: Option<String>,

    /// Reject keys without a project_id
    #[serde(default)]
    pub require_project_id: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawTokenConfig {
    /// OAuth2 token endpoint
    pub endpoint: Option<String>,

    /// Default scope requested by the CLI
    pub scope: Option<String>,

    /// Per-request timeout (e.g., "10s")
    #[serde(default)]
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawRetryConfig {
    pub max_attempts: Option<u32>,

    /// Delay between attempts (e.g., "1s", "500ms")
    #[serde(default)]
    #[serde(with = "humantime_serde")]
    pub delay: Option<Duration>,

    #[serde(default)]
    pub mode: RetryMode,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawCacheConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Refresh margin before expiry (e.g., "60s")
    #[serde(default)]
    #[serde(with = "humantime_serde")]
    pub expiry_buffer: Option<Duration>,
}

// =============================================================================
// Resolved Config (Ready for use)
// =============================================================================

/// Top-level configuration (resolved from RawConfig)
#[derive(Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub credentials: CredentialsConfig,
    pub token: TokenConfig,
    pub retry: RetryPolicy,
    pub cache: CacheConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Resolved credential source
#[derive(Clone)]
pub enum CredentialSource {
    Inline(String),
    File(PathBuf),
}

impl std::fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialSource::Inline(json) => write!(f, "Inline(<{} bytes>)", json.len()),
            CredentialSource::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

impl CredentialSource {
    /// Load the service account JSON text
    pub fn load(&self) -> Result<String, ConfigError> {
        match self {
            CredentialSource::Inline(json) => Ok(json.clone()),
            CredentialSource::File(path) => std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CredentialsConfig {
    pub source: CredentialSource,
    pub requirements: CredentialRequirements,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub endpoint: String,
    pub scope: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub expiry_buffer: Duration,
}

// =============================================================================
// Resolution Logic
// =============================================================================

impl RawConfig {
    /// Resolve raw config into final config, applying defaults and
    /// environment substitution
    pub fn resolve(self) -> Result<Config, ConfigError> {
        let RawConfig {
            logging,
            credentials,
            token,
            retry,
            cache,
        } = self;

        Ok(Config {
            logging,
            credentials: Self::resolve_credentials(credentials)?,
            token: Self::resolve_token(token)?,
            retry: RetryPolicy {
                max_attempts: retry.max_attempts.unwrap_or(3),
                delay: retry.delay.unwrap_or(Duration::from_secs(1)),
                mode: retry.mode,
            },
            cache: CacheConfig {
                enabled: cache.enabled,
                expiry_buffer: cache.expiry_buffer.unwrap_or(DEFAULT_EXPIRY_BUFFER),
            },
        })
    }

    fn resolve_credentials(raw: RawCredentialsConfig) -> Result<CredentialsConfig, ConfigError> {
        let source = match (raw.json, raw.path) {
            (Some(json), None) => CredentialSource::Inline(substitute_env_vars(&json)?),
            (None, Some(path)) => CredentialSource::File(PathBuf::from(substitute_env_vars(&path)?)),
            (Some(_), Some(_)) => {
                return Err(ConfigError::ValidationError(
                    "credentials: set either json or path, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(ConfigError::ValidationError(
                    "credentials: one of json or path is required".to_string(),
                ))
            }
        };

        Ok(CredentialsConfig {
            source,
            requirements: CredentialRequirements {
                require_project_id: raw.require_project_id,
            },
        })
    }

    fn resolve_token(raw: RawTokenConfig) -> Result<TokenConfig, ConfigError> {
        let endpoint = match raw.endpoint {
            Some(endpoint) => substitute_env_vars(&endpoint)?,
            None => DEFAULT_TOKEN_ENDPOINT.to_string(),
        };

        Ok(TokenConfig {
            endpoint,
            scope: raw.scope.unwrap_or_else(|| DRIVE_SCOPE.to_string()),
            timeout: raw.timeout.unwrap_or(DEFAULT_EXCHANGE_TIMEOUT),
        })
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        raw.resolve()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.token.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "token.timeout must be greater than zero".to_string(),
            ));
        }

        if !self.token.endpoint.starts_with("https://") && !self.token.endpoint.starts_with("http://")
        {
            return Err(ConfigError::ValidationError(format!(
                "token.endpoint is not an http(s) URL: {}",
                self.token.endpoint
            )));
        }

        if self.token.scope.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "token.scope cannot be empty".to_string(),
            ));
        }

        if let CredentialSource::Inline(json) = &self.credentials.source {
            if json.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "credentials.json is empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl Config {
    /// Build the token source described by this configuration.
    ///
    /// The credential file (if any) is read here, once; the JSON itself is
    /// parsed again on every acquisition attempt.
    pub fn token_source(&self) -> Result<ServiceAccountTokenSource, ConfigError> {
        let credential_json = self.credentials.source.load()?;
        let exchanger = HttpTokenExchanger::new(self.token.endpoint.clone(), self.token.timeout);

        Ok(ServiceAccountTokenSource::new(credential_json)
            .with_requirements(self.credentials.requirements)
            .with_exchanger(Arc::new(exchanger))
            .with_policy(self.retry))
    }

    /// Token source wrapped with the cache layer when enabled
    pub fn token_provider(&self) -> Result<Arc<dyn TokenProvider>, ConfigError> {
        let source = self.token_source()?;
        if self.cache.enabled {
            Ok(Arc::new(TokenCache::with_expiry_buffer(
                source,
                self.cache.expiry_buffer,
            )))
        } else {
            Ok(Arc::new(source))
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
