//! Configuration for the rotating logger

use std::fs::DirBuilder;
use std::io;
use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{LoggerError, Result};

/// Logger configuration
///
/// `filename` is derived during construction and is never read from or written
/// to a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the active log file and its rotated backups
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Base name of the log file (empty: derived from the executable name)
    #[serde(default)]
    pub service_name: String,

    /// Size in megabytes at which the active file is rotated (0 = sink default)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Days to keep rotated backups (0 = keep regardless of age)
    #[serde(default = "default_max_age")]
    pub max_age: u64,

    /// Number of rotated backups to keep (0 = keep all)
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,

    /// Local time rather than UTC for rotation timestamps
    ///
    /// Backups are numbered (`svc.log.1`, `svc.log.2.gz`), so this does not
    /// change any file name; it is read and written with the rest of the
    /// configuration.
    #[serde(default = "default_true")]
    pub local_time: bool,

    /// Gzip rotated backups
    #[serde(default = "default_true")]
    pub compress: bool,

    /// Resolved `log_dir/service_name.log`
    #[serde(skip)]
    pub filename: PathBuf,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_max_file_size() -> u64 {
    10
}

fn default_max_age() -> u64 {
    28
}

fn default_max_backups() -> usize {
    7
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self::new(default_log_dir())
    }
}

impl Config {
    /// Configuration with the stock rotation settings for `log_dir`
    ///
    /// 10 MB files, 28 days, 7 backups, local time, compressed backups.
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: clean_path(&log_dir.into()),
            service_name: String::new(),
            max_file_size: default_max_file_size(),
            max_age: default_max_age(),
            max_backups: default_max_backups(),
            local_time: true,
            compress: true,
            filename: PathBuf::new(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text, filling missing keys with defaults
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Failed to parse logger config")
    }

    /// Normalize the directory, create it, pick the service name and derive
    /// the file path.
    pub fn resolve(mut self) -> Result<Self> {
        self.log_dir = clean_path(&self.log_dir);
        ensure_log_dir(&self.log_dir)?;

        if self.service_name.is_empty() {
            let exe = std::env::current_exe()
                .map_err(LoggerError::ExecutablePath)?;
            self.service_name = service_name_from_exe(&exe);
        }

        self.filename = log_file_path(&self.log_dir, &self.service_name);
        Ok(self)
    }
}

/// Path of the active log file for a service
pub fn log_file_path(log_dir: &Path, service_name: &str) -> PathBuf {
    log_dir.join(format!("{}.log", service_name))
}

/// Executable base name with its final extension removed
///
/// `myservice.exe` becomes `myservice`; a name without extension is unchanged.
pub fn service_name_from_exe(exe: &Path) -> String {
    exe.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lexically normalize a path: drop `.` segments, fold `name/..`, strip
/// trailing separators. An empty result becomes `.`.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                // `..` at the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().collect()
}

/// Create the log directory and any missing parents (mode 0755 on Unix)
pub fn ensure_log_dir(dir: &Path) -> Result<()> {
    create_dir_all(dir).map_err(|source| LoggerError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}

pub(crate) fn create_dir_all(dir: &Path) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }

    builder.create(dir)
}
