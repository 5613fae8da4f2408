//! Audit logging for login, token and access decisions.
//!
//! Every event is emitted via `tracing::info!` with the whole event
//! serialized into a single `audit` field, so a log aggregator can extract
//! the trail without parsing free text.
//!
//! # Events
//!
//! | Event | When |
//! |-------|------|
//! | `token.issued` | `POST /auth/login` succeeded and a token was signed |
//! | `login.failed` | Basic credentials were missing or rejected |
//! | `token.rejected` | A bearer token failed verification |
//! | `access.denied` | A valid token lacked the role a path requires |

use serde::Serialize;

/// Structured audit event.
#[derive(Debug, Serialize)]
pub struct AuditEvent {
    /// Event type string (e.g., `"token.issued"`).
    pub event: &'static str,
    /// Principal the event concerns, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Roles carried by the token (for `token.issued` and `access.denied`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    /// Request path (for `access.denied`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Token expiry, unix seconds (for `token.issued`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// Machine-readable reason for failure events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEvent {
    fn bare(event: &'static str) -> Self {
        Self {
            event,
            subject: None,
            roles: None,
            path: None,
            expires_at: None,
            reason: None,
        }
    }

    /// Construct a `token.issued` event.
    #[must_use]
    pub fn issued(subject: &str, roles: &[String], expires_at: u64) -> Self {
        Self {
            subject: Some(subject.to_string()),
            roles: Some(roles.to_vec()),
            expires_at: Some(expires_at),
            ..Self::bare("token.issued")
        }
    }

    /// Construct a `login.failed` event. `username` is `None` when no
    /// parseable Basic credentials were sent.
    #[must_use]
    pub fn login_failed(username: Option<&str>, reason: impl Into<String>) -> Self {
        Self {
            subject: username.map(str::to_string),
            reason: Some(reason.into()),
            ..Self::bare("login.failed")
        }
    }

    /// Construct a `token.rejected` event.
    #[must_use]
    pub fn rejected(path: &str, reason: impl Into<String>) -> Self {
        Self {
            path: Some(path.to_string()),
            reason: Some(reason.into()),
            ..Self::bare("token.rejected")
        }
    }

    /// Construct an `access.denied` event.
    #[must_use]
    pub fn denied(subject: &str, roles: &[String], path: &str) -> Self {
        Self {
            subject: Some(subject.to_string()),
            roles: Some(roles.to_vec()),
            path: Some(path.to_string()),
            reason: Some("insufficient_role".to_string()),
            ..Self::bare("access.denied")
        }
    }
}

/// Emit an audit event via `tracing::info!`.
///
/// ```text
/// INFO uac_auth::auth::audit audit={"event":"token.issued","subject":"USER_A",...}
/// ```
pub fn emit(event: &AuditEvent) {
    match serde_json::to_string(event) {
        Ok(ref json) => tracing::info!(audit = %json, "uac audit"),
        Err(ref e) => tracing::warn!(error = %e, "Failed to serialize audit event"),
    }
}
