//! Credential store: principals and password verification.
//!
//! The [`CredentialStore`] trait abstracts over identity backends. The only
//! current implementation is [`InMemoryCredentialStore`]: a fixed set of
//! principals built at startup from configuration, with Argon2id password
//! hashes.
//!
//! # Username probing
//!
//! A lookup miss still runs a full hash verification against a dummy hash,
//! so a failed login costs the same whether or not the username exists.

use std::collections::HashMap;
use std::sync::Arc;

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error};

use crate::config::AuthConfig;

/// Username / password of the demo principal holding `ROLE_A`.
pub const DEMO_USER_A: &str = "USER_A";
/// Username / password of the demo principal holding `ROLE_B`.
pub const DEMO_USER_B: &str = "USER_B";

/// Credentials were rejected. Carries no detail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid credentials")]
pub struct AuthFailure;

/// Errors raised while building a credential store.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Argon2 parameters were out of range.
    #[error("Invalid password hash parameters: {0}")]
    Params(String),

    /// Hashing a configured password failed.
    #[error("Password hashing failed for '{0}'")]
    Hashing(String),

    /// The same username was registered twice.
    #[error("Duplicate principal: {0}")]
    Duplicate(String),

    /// A required credential was not configured.
    #[error("Missing credential: {0}")]
    Missing(&'static str),
}

/// An authenticated identity: username, password hash and granted roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    /// Unique username.
    pub username: String,
    /// PHC-format Argon2id hash.
    #[serde(skip)]
    pub password_hash: String,
    /// Granted roles, in declaration order.
    pub roles: Vec<String>,
}

/// Trait abstracting the identity backend.
///
/// Implementations must be `Send + Sync` because the store is shared across
/// request tasks.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Check `password` for `username` and return the matching principal.
    async fn authenticate(&self, username: &str, password: &str) -> Result<Principal, AuthFailure>;
}

/// Argon2id work factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// Iteration count (`t_cost`).
    pub iterations: u32,
    /// Memory cost in KiB (`m_cost`).
    pub memory_kib: u32,
}

impl HashCost {
    /// Work factor with the given iteration count and the Argon2 default memory cost.
    #[must_use]
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations,
            memory_kib: Params::DEFAULT_M_COST,
        }
    }

    fn hasher(self) -> Result<Argon2<'static>, CredentialError> {
        let params = Params::new(self.memory_kib, self.iterations, Params::DEFAULT_P_COST, None)
            .map_err(|e| CredentialError::Params(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Fixed in-memory principal set.
pub struct InMemoryCredentialStore {
    principals: HashMap<String, Principal>,
    hasher: Argon2<'static>,
    dummy_hash: Arc<str>,
}

impl std::fmt::Debug for InMemoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut usernames: Vec<&str> = self.principals.keys().map(String::as_str).collect();
        usernames.sort_unstable();
        f.debug_struct("InMemoryCredentialStore")
            .field("principals", &usernames)
            .finish_non_exhaustive()
    }
}

impl InMemoryCredentialStore {
    /// Create an empty store hashing with `cost`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] if the Argon2 parameters are invalid.
    pub fn new(cost: HashCost) -> Result<Self, CredentialError> {
        let hasher = cost.hasher()?;
        let dummy_hash = hash_with(&hasher, "uac-dummy-password")
            .map_err(|()| CredentialError::Hashing("<dummy>".to_string()))?;

        Ok(Self {
            principals: HashMap::new(),
            hasher,
            dummy_hash: Arc::from(dummy_hash),
        })
    }

    /// Build the store from configuration: the system principal plus,
    /// unless disabled, the `USER_A` / `USER_B` demo principals.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] if the system password is missing, the
    /// work factor is invalid, or two principals share a username.
    pub fn from_config(config: &AuthConfig) -> Result<Self, CredentialError> {
        if config.system_password.is_empty() {
            return Err(CredentialError::Missing("auth.system_password"));
        }

        let cost = HashCost {
            iterations: config.hash_cost,
            memory_kib: config.hash_memory_kib,
        };
        let mut store = Self::new(cost)?;

        store.register(
            &config.system_username,
            &config.system_password,
            config.system_roles.clone(),
        )?;

        if config.demo_users {
            store.register(DEMO_USER_A, DEMO_USER_A, vec!["ROLE_A".to_string()])?;
            store.register(DEMO_USER_B, DEMO_USER_B, vec!["ROLE_B".to_string()])?;
        }

        Ok(store)
    }

    /// Register a principal, hashing its password.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Duplicate`] if the username is taken.
    pub fn register(
        &mut self,
        username: &str,
        password: &str,
        roles: Vec<String>,
    ) -> Result<(), CredentialError> {
        if self.principals.contains_key(username) {
            return Err(CredentialError::Duplicate(username.to_string()));
        }

        let password_hash = hash_with(&self.hasher, password)
            .map_err(|()| CredentialError::Hashing(username.to_string()))?;

        debug!(username = %username, roles = ?roles, "Registered principal");
        self.principals.insert(
            username.to_string(),
            Principal {
                username: username.to_string(),
                password_hash,
                roles,
            },
        );
        Ok(())
    }

    /// Number of registered principals.
    pub(crate) fn len(&self) -> usize {
        self.principals.len()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Principal, AuthFailure> {
        let principal = self.principals.get(username);
        let hash: Arc<str> = principal.map_or_else(
            || Arc::clone(&self.dummy_hash),
            |p| Arc::from(p.password_hash.as_str()),
        );

        let hasher = self.hasher.clone();
        let password = password.to_owned();
        let matched = tokio::task::spawn_blocking(move || verify_with(&hasher, &password, &hash))
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "Password verification task failed");
                false
            });

        match principal {
            Some(p) if matched => Ok(p.clone()),
            _ => Err(AuthFailure),
        }
    }
}

fn hash_with(hasher: &Argon2<'_>, password: &str) -> Result<String, ()> {
    let salt = SaltString::generate(&mut OsRng);
    hasher
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| ())
}

fn verify_with(hasher: &Argon2<'_>, password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .is_ok_and(|parsed| hasher.verify_password(password.as_bytes(), &parsed).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Cheap work factor so tests stay fast in debug builds.
    const TEST_COST: HashCost = HashCost {
        iterations: 1,
        memory_kib: 64,
    };

    fn demo_store() -> InMemoryCredentialStore {
        let config = AuthConfig {
            system_username: "system".to_string(),
            system_password: "s3cret".to_string(),
            hash_cost: TEST_COST.iterations,
            hash_memory_kib: TEST_COST.memory_kib,
            ..Default::default()
        };
        InMemoryCredentialStore::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn demo_user_authenticates_with_matching_password() {
        // GIVEN: the demo store
        let store = demo_store();

        // WHEN: USER_A logs in with USER_A
        let principal = store.authenticate("USER_A", "USER_A").await.unwrap();

        // THEN: ROLE_A exactly as configured
        assert_eq!(principal.username, "USER_A");
        assert_eq!(principal.roles, vec!["ROLE_A".to_string()]);
    }

    #[tokio::test]
    async fn system_principal_keeps_raw_role_string() {
        let store = demo_store();

        let principal = store.authenticate("system", "s3cret").await.unwrap();

        assert_eq!(principal.roles, vec!["ROLES_SYSTEM".to_string()]);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_fail_identically() {
        let store = demo_store();

        let wrong_password = store.authenticate("USER_A", "USER_B").await;
        let unknown_user = store.authenticate("nobody", "USER_A").await;

        assert_eq!(wrong_password, Err(AuthFailure));
        assert_eq!(unknown_user, Err(AuthFailure));
    }

    #[tokio::test]
    async fn usernames_match_exactly() {
        let store = demo_store();
        assert_eq!(store.authenticate("user_a", "USER_A").await, Err(AuthFailure));
    }

    #[test]
    fn demo_users_can_be_disabled() {
        let config = AuthConfig {
            system_password: "s3cret".to_string(),
            demo_users: false,
            hash_cost: TEST_COST.iterations,
            hash_memory_kib: TEST_COST.memory_kib,
            ..Default::default()
        };
        let store = InMemoryCredentialStore::from_config(&config).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_system_password_is_rejected() {
        let config = AuthConfig::default();
        let result = InMemoryCredentialStore::from_config(&config);
        assert!(matches!(result, Err(CredentialError::Missing(_))));
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let config = AuthConfig {
            system_username: "USER_A".to_string(),
            system_password: "s3cret".to_string(),
            hash_cost: TEST_COST.iterations,
            hash_memory_kib: TEST_COST.memory_kib,
            ..Default::default()
        };
        let result = InMemoryCredentialStore::from_config(&config);
        assert!(matches!(result, Err(CredentialError::Duplicate(name)) if name == "USER_A"));
    }

    #[test]
    fn zero_iterations_is_invalid() {
        let cost = HashCost {
            iterations: 0,
            memory_kib: 64,
        };
        assert!(matches!(
            InMemoryCredentialStore::new(cost),
            Err(CredentialError::Params(_))
        ));
    }

    #[test]
    fn stored_hash_is_salted_argon2id() {
        let store = demo_store();
        let a = &store.principals["USER_A"].password_hash;
        assert!(a.starts_with("$argon2id$"));
        assert!(!a.contains("USER_A"));
    }
}
