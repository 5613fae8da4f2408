//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// UAC Auth - ES512 access tokens, JWK Set publishing and role-gated endpoints
#[derive(Parser, Debug)]
#[command(name = "uac-auth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "UAC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "UAC_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "UAC_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "UAC_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "UAC_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the auth server (default)
    Serve,

    /// Generate a P-521 signing key as PKCS#8 PEM
    Keygen {
        /// Output path (defaults to `auth.key_path` from configuration)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["uac-auth", "--port", "9000"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn keygen_takes_out_and_force() {
        let cli = Cli::try_parse_from(["uac-auth", "keygen", "--out", "k.pem", "--force"]).unwrap();
        match cli.command {
            Some(Command::Keygen { out, force }) => {
                assert_eq!(out, Some(PathBuf::from("k.pem")));
                assert!(force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from(["uac-auth", "serve", "--log-format", "json"]).unwrap();
        assert_eq!(cli.log_format.as_deref(), Some("json"));
    }
}
