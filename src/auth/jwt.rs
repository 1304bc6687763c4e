//! RS256 JWT assertions for the OAuth2 JWT-bearer grant.

use std::fmt;
use std::sync::Arc;

use ring::rand::SystemRandom;
use ring::signature::{RsaKeyPair, RSA_PKCS1_SHA256};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::base64url;
use super::credential::ServiceAccountCredential;
use super::pem;
use crate::error::{AuthError, Result};

/// Audience of every assertion; Google only accepts its own token endpoint.
pub const GOOGLE_TOKEN_AUDIENCE: &str = "https://oauth2.googleapis.com/token";

/// Validity of an assertion in seconds (Google's maximum).
pub const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Source of the current time in epoch seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Clock frozen at a given instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0
    }
}

#[derive(Debug, Serialize)]
struct JwtHeader {
    alg: &'static str,
    typ: &'static str,
}

const RS256_HEADER: JwtHeader = JwtHeader {
    alg: "RS256",
    typ: "JWT",
};

/// Claims of a service account assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl JwtClaims {
    pub fn new(credential: &ServiceAccountCredential, scope: &str, now: i64) -> Self {
        Self {
            iss: credential.client_email.clone(),
            scope: scope.to_string(),
            aud: GOOGLE_TOKEN_AUDIENCE.to_string(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        }
    }
}

/// A compact, signed JWT: `header.claims.signature`.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedAssertion(String);

impl SignedAssertion {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for SignedAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SignedAssertion(<redacted>)")
    }
}

/// Import a decoded PKCS#8 key as an RSA signing key.
pub fn import_key(der: &[u8]) -> Result<RsaKeyPair> {
    RsaKeyPair::from_pkcs8(der)
        .map_err(|e| AuthError::JwtCreation(format!("failed to import private key: {}", e)))
}

/// Builds signed assertions from a credential and scope.
#[derive(Clone)]
pub struct JwtAssertionBuilder {
    clock: Arc<dyn Clock>,
}

impl Default for JwtAssertionBuilder {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl JwtAssertionBuilder {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn build(
        &self,
        credential: &ServiceAccountCredential,
        scope: &str,
    ) -> Result<SignedAssertion> {
        let claims = JwtClaims::new(credential, scope, self.clock.now());
        self.sign(&claims, &credential.private_key_pem)
    }

    /// Sign arbitrary claims with a PEM private key.
    pub fn sign(&self, claims: &JwtClaims, private_key_pem: &str) -> Result<SignedAssertion> {
        let header = serde_json::to_vec(&RS256_HEADER)
            .map_err(|e| AuthError::JwtCreation(format!("failed to encode header: {}", e)))?;
        let payload = serde_json::to_vec(claims)
            .map_err(|e| AuthError::JwtCreation(format!("failed to encode claims: {}", e)))?;

        let mut token = format!("{}.{}", base64url::encode(&header), base64url::encode(&payload));

        let der = pem::decode(private_key_pem)?;
        let key_pair = import_key(&der)?;

        let mut signature = vec![0u8; key_pair.public().modulus_len()];
        key_pair
            .sign(
                &RSA_PKCS1_SHA256,
                &SystemRandom::new(),
                token.as_bytes(),
                &mut signature,
            )
            .map_err(|e| AuthError::JwtCreation(format!("failed to sign assertion: {}", e)))?;

        token.push('.');
        token.push_str(&base64url::encode(&signature));

        trace!("built assertion for {} (iat={})", claims.iss, claims.iat);
        Ok(SignedAssertion(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use ring::signature::{UnparsedPublicKey, RSA_PKCS1_2048_8192_SHA256};

    const TEST_KEY: &str = include_str!("../../tests/fixtures/test_key.pem");
    const DRIVE: &str = "https://www.googleapis.com/auth/drive";

    fn credential() -> ServiceAccountCredential {
        ServiceAccountCredential {
            client_email: "a@b.iam.gserviceaccount.com".to_string(),
            private_key_pem: TEST_KEY.to_string(),
            project_id: "p".to_string(),
        }
    }

    fn builder_at(now: i64) -> JwtAssertionBuilder {
        JwtAssertionBuilder::new(Arc::new(FixedClock(now)))
    }

    fn segments(assertion: &SignedAssertion) -> Vec<String> {
        assertion.as_str().split('.').map(str::to_string).collect()
    }

    #[test]
    fn test_three_url_safe_segments() {
        let assertion = builder_at(1_700_000_000).build(&credential(), DRIVE).unwrap();
        let parts = segments(&assertion);
        assert_eq!(parts.len(), 3);
        for part in &parts {
            assert!(!part.is_empty());
            assert!(part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }

    #[test]
    fn test_deterministic_for_fixed_clock() {
        let first = builder_at(1_700_000_000).build(&credential(), DRIVE).unwrap();
        let second = builder_at(1_700_000_000).build(&credential(), DRIVE).unwrap();
        assert_eq!(first, second);

        let later = builder_at(1_700_000_001).build(&credential(), DRIVE).unwrap();
        assert_ne!(first, later);
    }

    #[test]
    fn test_claims_segment() {
        let assertion = builder_at(1_700_000_000).build(&credential(), DRIVE).unwrap();
        let parts = segments(&assertion);

        let header: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(&parts[0]).unwrap()).unwrap();
        assert_eq!(header["alg"], "RS256");
        assert_eq!(header["typ"], "JWT");

        let claims: JwtClaims =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(&parts[1]).unwrap()).unwrap();
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims.iat, 1_700_000_000);
        assert_eq!(claims.iss, "a@b.iam.gserviceaccount.com");
        assert_eq!(claims.aud, GOOGLE_TOKEN_AUDIENCE);
        assert_eq!(claims.scope, DRIVE);
    }

    #[test]
    fn test_signature_verifies() {
        let assertion = builder_at(1_700_000_000).build(&credential(), DRIVE).unwrap();
        let (signing_input, signature) = assertion.as_str().rsplit_once('.').unwrap();

        let key_pair = import_key(&pem::decode(TEST_KEY).unwrap()).unwrap();
        let public_key = UnparsedPublicKey::new(
            &RSA_PKCS1_2048_8192_SHA256,
            key_pair.public().as_ref().to_vec(),
        );
        public_key
            .verify(
                signing_input.as_bytes(),
                &URL_SAFE_NO_PAD.decode(signature).unwrap(),
            )
            .expect("signature should verify");
    }

    #[test]
    fn test_escaped_key_builds_same_assertion() {
        let mut escaped = credential();
        escaped.private_key_pem = TEST_KEY.replace('\n', "\\n");

        let a = builder_at(42).build(&credential(), DRIVE).unwrap();
        let b = builder_at(42).build(&escaped, DRIVE).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_rsa_der_is_jwt_creation_error() {
        let mut cred = credential();
        cred.private_key_pem = base64::engine::general_purpose::STANDARD.encode([1u8; 256]);

        let err = builder_at(0).build(&cred, DRIVE).unwrap_err();
        assert!(matches!(err, AuthError::JwtCreation(_)), "{:?}", err);
    }

    #[test]
    fn test_debug_redacted() {
        let assertion = builder_at(0).build(&credential(), DRIVE).unwrap();
        assert_eq!(format!("{:?}", assertion), "SignedAssertion(<redacted>)");
    }
}
