//! Compression and age limits for numbered backups
//!
//! The appender keeps `svc.log.1` (newest) up to `svc.log.N` and knows nothing
//! about gzip. After each rollover the compressed backups are shifted along
//! the same numbering, the fresh `svc.log.1` becomes `svc.log.1.gz`, and
//! backups older than the age limit are removed.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use flate2::write::GzEncoder;
use flate2::Compression;

use super::file_writer::RotationPolicy;

const COMPRESS_SUFFIX: &str = ".gz";

/// A rotated backup found next to the active file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub path: PathBuf,
    /// 1 for the most recent rotation
    pub index: usize,
    pub compressed: bool,
}

/// A retention step that could not be completed
#[derive(Debug)]
pub struct RetentionFailure {
    pub path: PathBuf,
    pub action: &'static str,
    pub error: io::Error,
}

/// Path of backup number `index` of `active`, e.g. `svc.log.3.gz`
pub fn backup_path(active: &Path, index: usize, compressed: bool) -> PathBuf {
    let mut name = OsString::from(active.as_os_str());
    name.push(format!(".{}", index));
    if compressed {
        name.push(COMPRESS_SUFFIX);
    }
    PathBuf::from(name)
}

/// List backups of `active`, newest first
pub fn list_backups(active: &Path) -> io::Result<Vec<Backup>> {
    let dir = match active.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let Some(active_name) = active.file_name().and_then(|n| n.to_str()) else {
        return Ok(Vec::new());
    };
    let prefix = format!("{}.", active_name);

    let mut backups = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let name = entry.file_name();
        let Some(suffix) = name.to_str().and_then(|n| n.strip_prefix(&prefix)) else {
            continue;
        };
        let (number, compressed) = match suffix.strip_suffix(COMPRESS_SUFFIX) {
            Some(number) => (number, true),
            None => (suffix, false),
        };
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }

        if let Ok(index) = number.parse() {
            backups.push(Backup {
                path: entry.path(),
                index,
                compressed,
            });
        }
    }

    backups.sort_by_key(|b| (b.index, b.compressed));
    Ok(backups)
}

/// Compress the backup just rolled over and apply the age limit
///
/// Every step is attempted; failures are returned for the caller to report.
pub fn after_rotation(active: &Path, policy: &RotationPolicy) -> Vec<RetentionFailure> {
    after_rotation_at(active, policy, SystemTime::now())
}

fn after_rotation_at(
    active: &Path,
    policy: &RotationPolicy,
    now: SystemTime,
) -> Vec<RetentionFailure> {
    let mut failures = Vec::new();

    if !policy.compress && policy.max_age.is_none() {
        return failures;
    }

    let backups = match list_backups(active) {
        Ok(backups) => backups,
        Err(error) => {
            failures.push(RetentionFailure {
                path: active.to_path_buf(),
                action: "list backups of",
                error,
            });
            return failures;
        }
    };

    if policy.compress {
        shift_compressed(active, &backups, policy.backup_limit(), &mut failures);

        let fresh = backup_path(active, 1, false);
        if fresh.exists() {
            if let Err(error) = compress_file(&fresh) {
                failures.push(RetentionFailure {
                    path: fresh,
                    action: "compress",
                    error,
                });
            }
        }
    }

    if let Some(max_age) = policy.max_age {
        remove_expired(active, max_age, now, &mut failures);
    }

    failures
}

/// Move every `.N.gz` to `.N+1.gz`, dropping those that would pass `limit`
fn shift_compressed(
    active: &Path,
    backups: &[Backup],
    limit: usize,
    failures: &mut Vec<RetentionFailure>,
) {
    // Highest first so no rename lands on a file still waiting to move
    for backup in backups.iter().rev().filter(|b| b.compressed) {
        if backup.index >= limit {
            if let Err(error) = fs::remove_file(&backup.path) {
                failures.push(RetentionFailure {
                    path: backup.path.clone(),
                    action: "remove",
                    error,
                });
            }
            continue;
        }

        let target = backup_path(active, backup.index + 1, true);
        if let Err(error) = fs::rename(&backup.path, &target) {
            failures.push(RetentionFailure {
                path: backup.path.clone(),
                action: "renumber",
                error,
            });
        }
    }
}

/// Remove backups last modified more than `max_age` before `now`
fn remove_expired(
    active: &Path,
    max_age: Duration,
    now: SystemTime,
    failures: &mut Vec<RetentionFailure>,
) {
    let backups = match list_backups(active) {
        Ok(backups) => backups,
        Err(error) => {
            failures.push(RetentionFailure {
                path: active.to_path_buf(),
                action: "list backups of",
                error,
            });
            return;
        }
    };

    for backup in backups {
        let modified = match fs::metadata(&backup.path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => continue,
        };
        let expired = now.duration_since(modified).is_ok_and(|age| age > max_age);

        if expired {
            if let Err(error) = fs::remove_file(&backup.path) {
                failures.push(RetentionFailure {
                    path: backup.path,
                    action: "remove",
                    error,
                });
            }
        }
    }
}

/// Gzip `src` into `src.gz` and remove `src`
///
/// A partially written archive is removed on failure and `src` is kept.
pub fn compress_file(src: &Path) -> io::Result<PathBuf> {
    let dst = compressed_path(src);

    let result = (|| -> io::Result<()> {
        let mut input = File::open(src)?;
        let output = File::create(&dst)?;
        output.set_permissions(input.metadata()?.permissions())?;

        let mut encoder = GzEncoder::new(output, Compression::default());
        io::copy(&mut input, &mut encoder)?;
        encoder.finish()?.sync_all()
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&dst);
        return Err(e);
    }

    fs::remove_file(src)?;
    Ok(dst)
}

fn compressed_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(COMPRESS_SUFFIX);
    PathBuf::from(name)
}
