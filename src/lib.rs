//! UAC Auth Library
//!
//! User access control service: issues ES512-signed access tokens on HTTP
//! Basic login, publishes the verification key as a JWK Set, and gates
//! endpoints by the role claims carried in those tokens.
//!
//! # Features
//!
//! - **Token issuance**: `POST /auth/login` mints a one-hour bearer token
//! - **Key publishing**: `GET /auth/jwks.json` exposes the single public key
//! - **Role gating**: an ordered path → requirement table decides 401/403/allow
//! - **Audit trail**: structured `tracing` events for every token decision

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("tracing subscriber already set: {e}")))
}
