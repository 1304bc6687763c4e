//! Per-scope token cache.
//!
//! Wraps any [`TokenProvider`] and reuses a token until it is within
//! `expiry_buffer` of expiring.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, trace};

use super::{AccessToken, TokenProvider};
use crate::error::Result;

/// Default refresh margin before token expiry.
pub const DEFAULT_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Lifetime assumed when the endpoint does not report one.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Cached token with expiry tracking.
struct CachedToken {
    token: AccessToken,
    fetched_at: Instant,
    lifetime: Duration,
}

impl CachedToken {
    fn is_valid_at(&self, now: Instant, buffer: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) < self.lifetime.saturating_sub(buffer)
    }
}

pub struct TokenCache<P> {
    inner: P,
    expiry_buffer: Duration,
    entries: RwLock<HashMap<String, CachedToken>>,
}

impl<P: TokenProvider> TokenCache<P> {
    pub fn new(inner: P) -> Self {
        Self::with_expiry_buffer(inner, DEFAULT_EXPIRY_BUFFER)
    }

    pub fn with_expiry_buffer(inner: P, expiry_buffer: Duration) -> Self {
        Self {
            inner,
            expiry_buffer,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Drop the cached token for a scope, if any.
    pub fn invalidate(&self, scope: &str) {
        self.entries.write().remove(scope);
    }

    fn lookup(&self, scope: &str) -> Option<AccessToken> {
        let now = Instant::now();
        let entries = self.entries.read();
        entries
            .get(scope)
            .filter(|cached| cached.is_valid_at(now, self.expiry_buffer))
            .map(|cached| cached.token.clone())
    }
}

#[async_trait]
impl<P: TokenProvider> TokenProvider for TokenCache<P> {
    async fn access_token(&self, scope: &str) -> Result<AccessToken> {
        if let Some(token) = self.lookup(scope) {
            trace!("token cache hit for {}", scope);
            return Ok(token);
        }

        debug!("token cache miss for {}", scope);
        let token = self.inner.access_token(scope).await?;

        self.entries.write().insert(
            scope.to_string(),
            CachedToken {
                token: token.clone(),
                fetched_at: Instant::now(),
                lifetime: token.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME),
            },
        );

        Ok(token)
    }
}
