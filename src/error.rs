//! Error types for the UAC auth service

use std::io;

use thiserror::Error;

use crate::auth::KeyError;

/// Result type alias for the UAC auth service
pub type Result<T> = std::result::Result<T, Error>;

/// UAC auth service errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signing key could not be loaded or generated
    #[error("Signing key error: {0}")]
    Key(#[from] KeyError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error must stop the process before it serves traffic.
    #[must_use]
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Key(_) | Self::Io(_))
    }
}
