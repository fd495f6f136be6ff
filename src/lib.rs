//! Rotalog - leveled, process-wide logging to a rotated file
//!
//! Build a logger once near the top of the process and fetch it anywhere:
//!
//! ```no_run
//! # fn main() -> rotalog::Result<()> {
//! use rotalog::Field;
//!
//! rotalog::new_logger_default("logs")?;
//!
//! if let Some(logger) = rotalog::logger() {
//!     logger.info("service started", &[Field::new("port", 8080)]);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{LoggerError, Result};
pub use logging::{
    logger, new_logger, new_logger_default, try_logger, Field, Level, Logger, RotatingFile,
    RotationPolicy,
};
