//! HTTP handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/auth/jwks.json` | Public signing key as a JWK Set |
//! | `POST` | `/auth/login` | HTTP Basic login, returns a bearer token as `text/plain` |
//! | `GET` | `/auth/roles` | Subject and roles of the presented token |
//! | `GET` | `/sample/data-a` | Requires `ROLE_A` |
//! | `GET` | `/sample/data-b` | Requires `ROLE_B` |
//! | `GET` | `/sample/data-c` | Requires `ROLE_A` or `ROLE_B` |
//! | `GET` | `/health` | Liveness |

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::json;
use tracing::{error, warn};

use super::auth::{Authenticated, error_body};
use super::router::AppState;
use crate::auth::{
    audit::{self, AuditEvent},
    unix_now,
};

// ── Auth endpoints ────────────────────────────────────────────────────────

/// `GET /auth/jwks.json`
pub(super) async fn jwks_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.auth.keys.public_key_set_document())
}

/// `POST /auth/login`: exchange Basic credentials for an access token.
pub(super) async fn login_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some((username, password)) = basic_credentials(&headers) else {
        warn!("Login without Basic credentials");
        audit::emit(&AuditEvent::login_failed(None, "missing_credentials"));
        return basic_challenge_response();
    };

    let principal = match state.auth.credentials.authenticate(&username, &password).await {
        Ok(p) => p,
        Err(e) => {
            warn!(username = %username, "Login failed");
            audit::emit(&AuditEvent::login_failed(Some(username.as_str()), e.to_string()));
            return basic_challenge_response();
        }
    };

    match state.auth.issuer.issue(&principal, unix_now()) {
        Ok(token) => token.into_response(),
        Err(e) => {
            error!(username = %username, error = %e, "Token signing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("internal_error", "Token could not be issued"),
            )
                .into_response()
        }
    }
}

/// `GET /auth/roles`
pub(super) async fn roles_handler(caller: Authenticated) -> impl IntoResponse {
    Json(json!({
        "subject": caller.subject,
        "roles": caller.roles,
    }))
}

// ── Sample resources ──────────────────────────────────────────────────────

fn sample_payload(resource: &str, caller: &Authenticated) -> Json<serde_json::Value> {
    Json(json!({
        "resource": resource,
        "subject": caller.subject,
        "roles": caller.roles,
    }))
}

/// `GET /sample/data-a`
pub(super) async fn data_a_handler(caller: Authenticated) -> impl IntoResponse {
    sample_payload("data-a", &caller)
}

/// `GET /sample/data-b`
pub(super) async fn data_b_handler(caller: Authenticated) -> impl IntoResponse {
    sample_payload("data-b", &caller)
}

/// `GET /sample/data-c`
pub(super) async fn data_c_handler(caller: Authenticated) -> impl IntoResponse {
    sample_payload("data-c", &caller)
}

/// `GET /health`
pub(super) async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Fallback for unrouted paths (only reached with a valid token).
pub(super) async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, error_body("not_found", "No such resource"))
}

// ── Helpers ───────────────────────────────────────────────────────────────

/// Decode `Authorization: Basic base64(username:password)`.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let encoded = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic ").or_else(|| v.strip_prefix("basic ")))?;

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

fn basic_challenge_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [("WWW-Authenticate", r#"Basic realm="uac""#)],
        error_body("unauthorized", "Invalid username or password"),
    )
        .into_response()
}
