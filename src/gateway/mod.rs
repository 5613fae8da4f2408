//! HTTP surface: router, auth middleware, handlers and server lifecycle

pub mod auth;
mod handlers;
mod router;
mod server;

pub use auth::{Authenticated, auth_middleware};
pub use router::{AppState, create_router};
pub use server::Gateway;
