//! Token authority: login, token minting, verification and role gating.
//!
//! 1. **Login**: `POST /auth/login` checks HTTP Basic credentials against the
//!    [`CredentialStore`] and returns an ES512 access token.
//!
//! 2. **Key publishing**: `GET /auth/jwks.json` serves the public half of the
//!    single process key so resource servers can verify tokens offline.
//!
//! 3. **Gating**: the gateway middleware verifies the bearer token with
//!    [`TokenVerifier`] and asks [`AccessPolicy`] whether its roles reach the
//!    requested path.
//!
//! 4. **Audit**: every decision is emitted via [`audit::emit`].
//!
//! # Flow
//!
//! ```text
//! Request arrives
//!   -> AccessPolicy::requirement_for(path)
//!   -> Public?        pass through
//!   -> Bearer token?  no  -> 401
//!   -> verify         err -> 401
//!   -> authorize      deny -> 403
//!   -> handler
//! ```

pub mod audit;
pub mod credentials;
pub mod issuer;
pub mod jws;
pub mod keys;
pub mod policy;
pub mod verifier;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::config::Config;
use crate::{Error, Result};

pub use audit::AuditEvent;
pub use credentials::{AuthFailure, CredentialError, CredentialStore, InMemoryCredentialStore, Principal};
pub use issuer::{ACCESS_TOKEN_TTL_SECS, AccessClaims, IssueError, TokenIssuer};
pub use keys::{KeyError, KeyProvider, PublicJwk, PublicKeySet};
pub use policy::{AccessDecision, AccessPolicy, Requirement};
pub use verifier::{AudienceValidation, TokenVerifier, VerificationError, VerifiedClaims};

/// Central coordinator holding every auth subsystem.
///
/// Built once at startup and shared read-only across request tasks.
pub struct AuthService {
    /// Process signing key
    pub keys: Arc<KeyProvider>,
    /// Principal lookup and password check
    pub credentials: Arc<dyn CredentialStore>,
    /// Token minting
    pub issuer: TokenIssuer,
    /// Token verification
    pub verifier: TokenVerifier,
    /// Path to requirement table
    pub policy: AccessPolicy,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("keys", &self.keys)
            .field("issuer", &self.issuer.issuer())
            .field("policy_rules", &self.policy.rules().len())
            .finish_non_exhaustive()
    }
}

impl AuthService {
    /// Assemble the service from already-built parts.
    #[must_use]
    pub fn new(
        keys: Arc<KeyProvider>,
        credentials: Arc<dyn CredentialStore>,
        issuer: &str,
        audience: AudienceValidation,
        policy: AccessPolicy,
    ) -> Self {
        Self {
            issuer: TokenIssuer::new(Arc::clone(&keys), issuer),
            verifier: TokenVerifier::new(Arc::clone(&keys), issuer, audience),
            keys,
            credentials,
            policy,
        }
    }

    /// Build the service from configuration: load the signing key, hash the
    /// configured principals, resolve the issuer and compile the policy.
    ///
    /// # Errors
    ///
    /// Fails if the key cannot be loaded, the system password is unset, or a
    /// configured policy rule is invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        let keys = Arc::new(KeyProvider::load(&config.auth.key_path)?);
        let credentials = InMemoryCredentialStore::from_config(&config.auth)?;
        let issuer = config.auth.resolve_issuer();

        let policy = match config.policy_rules()? {
            Some(rules) => AccessPolicy::new(rules),
            None => AccessPolicy::default(),
        };

        info!(
            issuer = %issuer,
            kid = %keys.key_id(),
            principals = credentials.len(),
            policy_rules = policy.rules().len(),
            audience = ?config.auth.audience_validation,
            "Auth service ready"
        );

        Ok(Self::new(
            keys,
            Arc::new(credentials),
            &issuer,
            config.auth.audience_validation,
            policy,
        ))
    }
}

impl From<CredentialError> for Error {
    fn from(e: CredentialError) -> Self {
        Self::Config(e.to_string())
    }
}

/// Current time as unix seconds.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
