//! Errors reported while building or looking up a logger

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by logger construction and registry lookup.
///
/// Emitting records never produces one of these; write failures are reported
/// through `tracing` instead.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// The log directory did not exist and could not be created
    #[error("failed to create log directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No service name was configured and the executable path is unavailable
    #[error("failed to get executable path: {0}")]
    ExecutablePath(#[source] io::Error),

    /// `try_logger` was called before any logger was installed
    #[error("logger has not been initialized")]
    NotInitialized,
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, LoggerError>;
