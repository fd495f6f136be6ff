//! Record severity levels

use std::fmt;
use std::str::FromStr;

/// Severity of a log record
///
/// Ordered from least to most severe. `Invalid` sits one step above `Fatal`
/// and is never admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i8)]
pub enum Level {
    Debug = -1,
    Info = 0,
    Warn = 1,
    Error = 2,
    /// Logged in production; reserved for "should never happen" conditions
    DPanic = 3,
    /// Logged, then the calling thread panics
    Panic = 4,
    /// Logged, then the process exits with status 1
    Fatal = 5,
    Invalid = 6,
}

/// Minimum level admitted by every logger built by this crate
pub const MIN_LEVEL: Level = Level::Info;

impl Level {
    /// Get the lowercase name for this level
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::DPanic => "dpanic",
            Level::Panic => "panic",
            Level::Fatal => "fatal",
            Level::Invalid => "Level(6)",
        }
    }

    /// Whether a record at this level passes a `min` threshold
    pub fn is_enabled_at(self, min: Level) -> bool {
        self != Level::Invalid && self >= min
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no level
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized level: {0:?}")]
pub struct ParseLevelError(String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "dpanic" => Ok(Level::DPanic),
            "panic" => Ok(Level::Panic),
            "fatal" => Ok(Level::Fatal),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}
