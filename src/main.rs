//! UAC Auth - token authority and role-gated HTTP service

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use uac_auth::{
    auth::KeyProvider,
    cli::{Cli, Command},
    config::Config,
    gateway::Gateway,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::Keygen { ref out, force }) => run_keygen(cli.config.as_deref(), out.as_deref(), force),
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Generate a signing key and write it as PKCS#8 PEM
fn run_keygen(config_path: Option<&Path>, out: Option<&Path>, force: bool) -> ExitCode {
    let path = match out {
        Some(p) => p.to_path_buf(),
        None => match Config::load(config_path) {
            Ok(config) => config.auth.key_path,
            Err(e) => {
                error!("Failed to load configuration: {e}");
                return ExitCode::FAILURE;
            }
        },
    };

    if path.exists() && !force {
        eprintln!("Refusing to overwrite {} (use --force)", path.display());
        return ExitCode::FAILURE;
    }

    let provider = match KeyProvider::generate() {
        Ok(p) => p,
        Err(e) => {
            error!("Key generation failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = provider.write_pem(&path) {
        error!("Failed to write {}: {e}", path.display());
        return ExitCode::FAILURE;
    }

    println!("Wrote P-521 signing key to {}", path.display());
    println!("  kid: {}", provider.key_id());
    ExitCode::SUCCESS
}

/// Run the auth server
async fn run_server(cli: Cli) -> ExitCode {
    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        key_path = %config.auth.key_path.display(),
        "Starting UAC auth"
    );

    let gateway = match Gateway::new(config) {
        Ok(g) => g,
        Err(e) => {
            error!(fatal = e.is_fatal_at_startup(), "Failed to start: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Run with graceful shutdown
    if let Err(e) = gateway.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Shutdown complete");
    ExitCode::SUCCESS
}
