//! Bearer authentication and role gating middleware.
//!
//! For every request the middleware looks up the path's requirement in the
//! [`AccessPolicy`](crate::auth::AccessPolicy):
//!
//! - public paths pass straight through
//! - otherwise `Authorization: Bearer <token>` must verify (else 401)
//! - the verified roles must satisfy the requirement (else 403)
//!
//! A request that gets through carries an [`Authenticated`] value in its
//! extensions, which handlers take as an extractor argument.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{FromRequestParts, State},
    http::{HeaderMap, Request, StatusCode, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use super::router::AppState;
use crate::auth::{
    AccessDecision, VerifiedClaims,
    audit::{self, AuditEvent},
    unix_now,
};

/// Caller identity established by [`auth_middleware`] for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Authenticated {
    /// Username from the token `sub`.
    pub subject: String,
    /// Roles from the token `role` claim.
    pub roles: Vec<String>,
    /// Token expiry, unix seconds.
    pub expires_at: u64,
}

impl From<VerifiedClaims> for Authenticated {
    fn from(claims: VerifiedClaims) -> Self {
        Self {
            subject: claims.subject,
            roles: claims.roles,
            expires_at: claims.expires_at,
        }
    }
}

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(|| unauthorized_response("Authentication required"))
    }
}

/// Extract the bearer token from the `Authorization` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let requirement = state.auth.policy.requirement_for(&path);

    if !requirement.needs_token() {
        debug!(path = %path, "Public path, skipping auth");
        return next.run(request).await;
    }

    let Some(token) = bearer_token(request.headers()) else {
        warn!(path = %path, "Missing bearer token");
        audit::emit(&AuditEvent::rejected(&path, "missing_token"));
        return unauthorized_response("Missing Authorization header. Use: Authorization: Bearer <token>");
    };

    let claims = match state.auth.verifier.verify(token, unix_now()) {
        Ok(claims) => claims,
        Err(e) => {
            warn!(path = %path, kind = e.kind(), "Token rejected");
            audit::emit(&AuditEvent::rejected(&path, e.kind()));
            return unauthorized_response("Invalid token");
        }
    };

    if state.auth.policy.authorize(&path, &claims.roles) == AccessDecision::Deny {
        warn!(subject = %claims.subject, path = %path, "Access denied");
        audit::emit(&AuditEvent::denied(&claims.subject, &claims.roles, &path));
        return forbidden_response();
    }

    debug!(subject = %claims.subject, path = %path, "Authenticated request");
    request.extensions_mut().insert(Authenticated::from(claims));
    next.run(request).await
}

/// JSON error body shared by every error response.
pub(crate) fn error_body(error: &str, message: &str) -> Json<serde_json::Value> {
    Json(json!({ "error": error, "message": message }))
}

/// Create a 401 Unauthorized response
fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [("WWW-Authenticate", "Bearer")],
        error_body("unauthorized", message),
    )
        .into_response()
}

/// Create a 403 Forbidden response
fn forbidden_response() -> Response {
    (
        StatusCode::FORBIDDEN,
        error_body("forbidden", "Insufficient role for this resource"),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn bearer_token_accepts_both_cases() {
        assert_eq!(bearer_token(&headers("Bearer abc.def.ghi")), Some("abc.def.ghi"));
        assert_eq!(bearer_token(&headers("bearer abc.def.ghi")), Some("abc.def.ghi"));
    }

    #[test]
    fn bearer_token_rejects_other_schemes() {
        assert_eq!(bearer_token(&headers("Basic VVNFUl9BOlVTRVJfQQ==")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn unauthorized_response_challenges_bearer() {
        let response = unauthorized_response("nope");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()["WWW-Authenticate"], "Bearer");
    }

    #[tokio::test]
    async fn extractor_rejects_request_without_identity() {
        // GIVEN: a request the middleware never saw
        let (mut parts, ()) = Request::builder().uri("/auth/roles").body(()).unwrap().into_parts();

        // WHEN: a handler asks for the caller
        let result = Authenticated::from_request_parts(&mut parts, &()).await;

        // THEN: 401
        assert_eq!(result.unwrap_err().status(), StatusCode::UNAUTHORIZED);
    }
}
