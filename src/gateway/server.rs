//! Gateway server

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::router::{AppState, create_router};
use crate::auth::{AudienceValidation, AuthService};
use crate::config::Config;
use crate::{Error, Result};

/// UAC HTTP server
pub struct Gateway {
    /// Configuration
    config: Config,
    /// Token authority
    auth: Arc<AuthService>,
}

impl Gateway {
    /// Create a new gateway, loading keys and principals from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the auth service cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        let auth = Arc::new(AuthService::from_config(&config)?);
        Ok(Self { config, auth })
    }

    /// Run the gateway until Ctrl+C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid, the port cannot be bound,
    /// or the server fails.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let state = Arc::new(AppState {
            auth: Arc::clone(&self.auth),
        });
        let app = create_router(state, self.config.server.request_timeout);

        let listener = TcpListener::bind(addr).await?;

        self.log_banner();

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::broadcast::channel(1);
        let shutdown_timeout = self.config.server.shutdown_timeout;
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .into_future();

        // Bound the drain once the signal arrives
        let result = tokio::select! {
            result = server => result.map_err(|e| Error::Internal(e.to_string())),
            () = async {
                let _ = shutdown_rx.recv().await;
                tokio::time::sleep(shutdown_timeout).await;
            } => {
                warn!(timeout = ?shutdown_timeout, "Graceful shutdown timed out, dropping open connections");
                Ok(())
            }
        };

        info!("Server stopped");
        result
    }

    fn log_banner(&self) {
        let host = &self.config.server.host;
        let port = self.config.server.port;

        info!("============================================================");
        info!("UAC AUTH v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %host, port = %port, "Listening");
        info!(issuer = %self.auth.issuer.issuer(), kid = %self.auth.keys.key_id(), "Token authority");

        if self.config.auth.audience_validation == AudienceValidation::Ignore {
            info!("Audience validation: ignore (aud is not checked)");
        } else {
            info!("Audience validation: enforce");
        }

        info!("Endpoints:");
        info!("  GET  http://{host}:{port}/auth/jwks.json");
        info!("  POST http://{host}:{port}/auth/login");
        info!("Access policy (first match wins):");
        for rule in self.auth.policy.rules() {
            info!("  {:?} -> {:?}", rule.pattern, rule.requirement);
        }
        info!("  (unmatched) -> authenticated");
        info!("============================================================");
    }
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
