//! Access token issuance.
//!
//! Tokens are compact JWS (ES512) with a fixed one-hour lifetime. The issuer
//! identifier doubles as the sole audience, so a token is only meant for the
//! deployment that minted it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::audit::{self, AuditEvent};
use super::credentials::Principal;
use super::jws::{self, JwsError, JwsHeader};
use super::keys::KeyProvider;

/// Lifetime of every access token, in seconds.
pub const ACCESS_TOKEN_TTL_SECS: u64 = 3600;

/// Claim set signed into every access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Issuer identifier.
    pub iss: String,
    /// Audience; always `[iss]`.
    pub aud: Vec<String>,
    /// Username of the principal.
    pub sub: String,
    /// Issued-at, unix seconds.
    pub iat: u64,
    /// Expiry, unix seconds.
    pub exp: u64,
    /// Granted roles, verbatim from the credential store.
    #[serde(default)]
    pub role: Vec<String>,
}

/// Error raised when a token cannot be signed.
#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    /// The signing backend rejected the claims or key.
    #[error("Failed to sign access token: {0}")]
    Signing(#[from] JwsError),
}

/// Mints signed access tokens for authenticated principals.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    keys: Arc<KeyProvider>,
    issuer: String,
}

impl TokenIssuer {
    /// Create an issuer signing with `keys` under the identifier `issuer`.
    pub fn new(keys: Arc<KeyProvider>, issuer: impl Into<String>) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
        }
    }

    /// The issuer identifier written to `iss` and `aud`.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Build the claim set for `principal` at time `now`.
    #[must_use]
    pub fn claims_for(&self, principal: &Principal, now: u64) -> AccessClaims {
        AccessClaims {
            iss: self.issuer.clone(),
            aud: vec![self.issuer.clone()],
            sub: principal.username.clone(),
            iat: now,
            exp: now + ACCESS_TOKEN_TTL_SECS,
            role: principal.roles.clone(),
        }
    }

    /// Sign an access token for `principal` issued at `now` (unix seconds).
    ///
    /// # Errors
    ///
    /// Returns [`IssueError::Signing`] if the signing backend fails.
    pub fn issue(&self, principal: &Principal, now: u64) -> Result<String, IssueError> {
        let claims = self.claims_for(principal, now);

        let token = jws::encode(&JwsHeader::for_key(&self.keys), &claims, &self.keys)?;

        info!(
            subject = %claims.sub,
            roles = ?claims.role,
            exp = claims.exp,
            "Issued access token"
        );
        audit::emit(&AuditEvent::issued(&claims.sub, &claims.role, claims.exp));

        Ok(token)
    }
}
