//! Leveled logging to a rotated file
//!
//! Records are rendered by the console encoder, filtered by level and appended
//! to a size-rotated file with numbered backups, age limits and optional
//! compression.

mod encoder;
mod file_writer;
mod instance;
mod level;
mod registry;
mod retention;

pub use encoder::{Encoder, Field, Record};
pub use file_writer::{
    RotatingFile, RotationPolicy, DEFAULT_MAX_SIZE_MB, MAX_BACKUP_LIMIT, MEGABYTE,
};
pub use instance::Logger;
pub use level::{Level, ParseLevelError, MIN_LEVEL};
pub use registry::{logger, new_logger, new_logger_default, try_logger};
pub use retention::{backup_path, compress_file, list_backups, Backup};
