//! Process-wide logger
//!
//! Holds the most recently constructed [`Logger`] so call sites without access
//! to a handle can still log. Construction holds the write lock from start to
//! finish; readers never see a half-built logger.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use super::instance::Logger;
use crate::config::Config;
use crate::error::{LoggerError, Result};

static GLOBAL: RwLock<Option<Arc<Logger>>> = RwLock::new(None);

/// The installed logger, or `None` before the first successful construction
pub fn logger() -> Option<Arc<Logger>> {
    GLOBAL
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// The installed logger, or [`LoggerError::NotInitialized`]
pub fn try_logger() -> Result<Arc<Logger>> {
    logger().ok_or(LoggerError::NotInitialized)
}

/// Build and install a logger for `dir` with the stock rotation settings
///
/// 10 MB files, 28 days, 7 backups, gzip.
pub fn new_logger_default(dir: impl Into<PathBuf>) -> Result<Arc<Logger>> {
    new_logger(Config::new(dir))
}

/// Build a logger from `config` and install it as the global logger
///
/// Replaces any previously installed logger. Concurrent constructions are
/// serialized; on error the previous logger stays installed.
pub fn new_logger(config: Config) -> Result<Arc<Logger>> {
    let logger = {
        let mut global = GLOBAL.write().unwrap_or_else(PoisonError::into_inner);
        let logger = Arc::new(Logger::new(config)?);
        *global = Some(Arc::clone(&logger));
        logger
    };

    tracing::debug!(
        path = %logger.filename().display(),
        "Installed global logger"
    );
    Ok(logger)
}

#[cfg(test)]
pub(crate) fn clear() {
    *GLOBAL.write().unwrap_or_else(PoisonError::into_inner) = None;
}
