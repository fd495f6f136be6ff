//! Size-rotated log file
//!
//! `RotatingFile` drives a `rolling_file` appender behind one mutex. The
//! appender moves `svc.log` to `svc.log.1`, shifts older backups up by one and
//! drops the one past the backup limit. This module decides when to roll over
//! and runs the compression and age steps once it has.

use std::cell::Cell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Local};
use rolling_file::{RollingCondition, RollingFileAppender};
use tracing_subscriber::fmt::MakeWriter;

use super::retention::{self, RetentionFailure};
use crate::config::{self, Config};

/// Bytes per megabyte of `Config::max_file_size`
pub const MEGABYTE: u64 = 1024 * 1024;

/// Rotation size used when the configured size is zero
pub const DEFAULT_MAX_SIZE_MB: u64 = 100;

/// Backups kept when `max_backups` is 0; the appender needs an upper bound
pub const MAX_BACKUP_LIMIT: usize = 1000;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// When to rotate and what to keep afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Rotate before a write would take the file past this many bytes
    pub max_bytes: u64,
    /// Remove backups older than this
    pub max_age: Option<Duration>,
    /// Keep at most this many backups (0 = up to [`MAX_BACKUP_LIMIT`])
    pub max_backups: usize,
    /// Gzip backups after rotation
    pub compress: bool,
}

impl RotationPolicy {
    /// Highest backup number kept on disk
    pub fn backup_limit(&self) -> usize {
        match self.max_backups {
            0 => MAX_BACKUP_LIMIT,
            n => n.min(MAX_BACKUP_LIMIT),
        }
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_SIZE_MB * MEGABYTE,
            max_age: None,
            max_backups: 0,
            compress: false,
        }
    }
}

impl From<&Config> for RotationPolicy {
    fn from(config: &Config) -> Self {
        let max_size_mb = if config.max_file_size == 0 {
            DEFAULT_MAX_SIZE_MB
        } else {
            config.max_file_size
        };
        let max_age = (config.max_age > 0)
            .then(|| Duration::from_secs(config.max_age.saturating_mul(SECONDS_PER_DAY)));

        Self {
            max_bytes: max_size_mb.saturating_mul(MEGABYTE),
            max_age,
            max_backups: config.max_backups,
            compress: config.compress,
        }
    }
}

/// Rolls over before a write that would take a non-empty file past `max_bytes`
#[derive(Debug)]
struct SizeLimit {
    max_bytes: u64,
    /// Length of the write about to be handed to the appender
    pending: u64,
    rolled: bool,
}

impl SizeLimit {
    fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            pending: 0,
            rolled: false,
        }
    }
}

impl RollingCondition for SizeLimit {
    fn should_rollover(&mut self, _now: &DateTime<Local>, current_filesize: u64) -> bool {
        let roll = current_filesize > 0 && current_filesize + self.pending > self.max_bytes;
        self.rolled |= roll;
        roll
    }
}

type Appender = RollingFileAppender<SizeLimit>;

struct Shared {
    path: PathBuf,
    state: Mutex<State>,
}

struct State {
    policy: RotationPolicy,
    /// Opened lazily on the first write
    appender: Option<Appender>,
    /// Retention problems waiting to be reported outside the lock
    failures: Vec<RetentionFailure>,
}

type SinkMap = HashMap<PathBuf, Weak<Shared>>;

/// Live sinks by file, so every handle on one path shares one lock and size
static OPEN_SINKS: OnceLock<Mutex<SinkMap>> = OnceLock::new();

fn open_sinks() -> MutexGuard<'static, SinkMap> {
    OPEN_SINKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Append-only file that rotates itself according to a `RotationPolicy`
///
/// Every `RotatingFile` for the same path in this process is the same sink:
/// clones and later `new` calls write under one lock and one size count, so a
/// rotation started through one handle is seen by all of them.
///
/// Gzip and age pruning run inside that lock right after a rollover. Writers
/// on other threads wait until the fresh backup has been compressed.
#[derive(Clone)]
pub struct RotatingFile {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RotatingFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatingFile")
            .field("path", &self.shared.path)
            .finish()
    }
}

impl RotatingFile {
    /// The sink for `path`; nothing is opened until the first write
    ///
    /// If a sink for `path` is still alive it is returned with `policy`
    /// applied from the next write on.
    pub fn new(path: impl Into<PathBuf>, policy: RotationPolicy) -> Self {
        let path = path.into();
        let key = sink_key(&path);
        let mut sinks = open_sinks();

        if let Some(shared) = sinks.get(&key).and_then(Weak::upgrade) {
            let sink = Self { shared };
            sink.set_policy(policy);
            return sink;
        }

        sinks.retain(|_, sink| sink.strong_count() > 0);
        let shared = Arc::new(Shared {
            path,
            state: Mutex::new(State {
                policy,
                appender: None,
                failures: Vec::new(),
            }),
        });
        sinks.insert(key, Arc::downgrade(&shared));
        Self { shared }
    }

    /// Path of the active file
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn policy(&self) -> RotationPolicy {
        self.lock().policy.clone()
    }

    /// Whether both handles write through the same sink
    pub fn same_sink(&self, other: &RotatingFile) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Append `buf` as one write, rotating first if it would not fit
    pub fn append(&self, buf: &[u8]) -> io::Result<usize> {
        let (result, failures) = {
            let mut state = self.lock();
            let result = self.shared.write_locked(&mut state, buf);
            (result, mem::take(&mut state.failures))
        };
        report_failures(&failures);
        result
    }

    /// Move the active file to the first backup and start a new one
    pub fn rotate(&self) -> io::Result<()> {
        let (result, failures) = {
            let mut state = self.lock();
            let result = self.shared.rotate_locked(&mut state);
            (result, mem::take(&mut state.failures))
        };
        report_failures(&failures);
        result
    }

    /// Flush the active file, if one is open
    pub fn flush_file(&self) -> io::Result<()> {
        match self.lock().appender.as_mut() {
            Some(appender) => appender.flush(),
            None => Ok(()),
        }
    }

    fn set_policy(&self, policy: RotationPolicy) {
        let mut state = self.lock();
        if state.policy != policy {
            // Reopened with the new limits on the next write
            state.appender = None;
            state.policy = policy;
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves the state usable
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Shared {
    fn write_locked(&self, state: &mut State, buf: &[u8]) -> io::Result<usize> {
        let len = buf.len() as u64;
        let max = state.policy.max_bytes;

        if len > max {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("write length {} exceeds maximum file size {}", len, max),
            ));
        }

        let appender = open_appender(&self.path, &state.policy, &mut state.appender)?;
        appender.condition_mut().pending = len;
        let result = appender.write_all(buf).and_then(|()| appender.flush());

        if mem::take(&mut appender.condition_mut().rolled) {
            let failures = retention::after_rotation(&self.path, &state.policy);
            state.failures.extend(failures);
        }

        result.map(|()| buf.len())
    }

    fn rotate_locked(&self, state: &mut State) -> io::Result<()> {
        let appender = open_appender(&self.path, &state.policy, &mut state.appender)?;
        appender.rollover()?;

        let failures = retention::after_rotation(&self.path, &state.policy);
        state.failures.extend(failures);
        Ok(())
    }
}

/// The open appender in `slot`, creating the file and its directory if needed
fn open_appender<'a>(
    path: &Path,
    policy: &RotationPolicy,
    slot: &'a mut Option<Appender>,
) -> io::Result<&'a mut Appender> {
    if slot.is_none() {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            config::create_dir_all(dir)?;
        }
        let condition = SizeLimit::new(policy.max_bytes);
        let appender = RollingFileAppender::new(path, condition, policy.backup_limit())?;
        *slot = Some(appender);
    }

    slot.as_mut()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file is not open"))
}

/// Identify a file independently of how its directory was spelled
fn sink_key(path: &Path) -> PathBuf {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    match (dir.canonicalize(), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_file()
    }
}

/// Lets a `tracing_subscriber::fmt` layer write into the rotated file
impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = RotatingFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

thread_local! {
    static REPORTING: Cell<bool> = const { Cell::new(false) };
}

/// Run `report` unless this thread is already reporting
///
/// A subscriber that writes into the failing sink would otherwise recurse.
pub(crate) fn report_once(report: impl FnOnce()) {
    REPORTING.with(|reporting| {
        if reporting.replace(true) {
            return;
        }
        report();
        reporting.set(false);
    });
}

fn report_failures(failures: &[RetentionFailure]) {
    if failures.is_empty() {
        return;
    }
    report_once(|| {
        for failure in failures {
            tracing::warn!(
                path = %failure.path.display(),
                error = %failure.error,
                "Failed to {} rotated log",
                failure.action
            );
        }
    });
}
