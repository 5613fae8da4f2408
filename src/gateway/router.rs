//! HTTP router

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::auth::auth_middleware;
use super::handlers::{
    data_a_handler, data_b_handler, data_c_handler, health_handler, jwks_handler, login_handler,
    not_found_handler, roles_handler,
};
use crate::auth::AuthService;

/// Shared application state
#[derive(Debug)]
pub struct AppState {
    /// Token authority
    pub auth: Arc<AuthService>,
}

/// Create the router
pub fn create_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/auth/jwks.json", get(jwks_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/roles", get(roles_handler))
        .route("/sample/data-a", get(data_a_handler))
        .route("/sample/data-b", get(data_b_handler))
        .route("/sample/data-c", get(data_c_handler))
        .fallback(not_found_handler)
        // Authentication middleware (applied before other layers)
        .layer(middleware::from_fn_with_state(Arc::clone(&state), auth_middleware))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
