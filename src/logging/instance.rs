//! The logger instance: level filter, encoder and rotating file bound together

use std::fmt;
use std::io;
use std::panic::Location;
use std::path::Path;

use chrono::Local;

use super::encoder::{Encoder, Field, Record};
use super::file_writer::{report_once, RotatingFile, RotationPolicy};
use super::level::{Level, MIN_LEVEL};
use crate::config::Config;
use crate::error::Result;

/// A logger writing console-formatted records to a rotated file
///
/// Immutable once built; share it as `Arc<Logger>`. Records below
/// [`MIN_LEVEL`] are discarded after a single comparison.
///
/// # Fatal and Panic
///
/// [`Logger::fatal`] and `log(Level::Fatal, ..)` write the record and then
/// **terminate the process** with exit status 1. No destructors run and no
/// error reaches the caller. Only call them from a binary's top level, never
/// from library code that could return an error instead. `Level::Panic`
/// writes the record and then panics on the calling thread.
#[derive(Debug)]
pub struct Logger {
    encoder: Encoder,
    sink: RotatingFile,
    min_level: Level,
    config: Config,
}

impl Logger {
    /// Build a logger without installing it globally
    ///
    /// Creates the log directory and resolves the service name; the file is
    /// opened on the first admitted record. Loggers built for the same file
    /// write through one shared [`RotatingFile`].
    pub fn new(config: Config) -> Result<Self> {
        let config = config.resolve()?;
        let sink = RotatingFile::new(&config.filename, RotationPolicy::from(&config));

        Ok(Self {
            encoder: Encoder::new(),
            sink,
            min_level: MIN_LEVEL,
            config,
        })
    }

    pub fn log_dir(&self) -> &Path {
        &self.config.log_dir
    }

    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }

    /// Path of the active log file, `log_dir/service_name.log`
    pub fn filename(&self) -> &Path {
        &self.config.filename
    }

    /// The resolved configuration this logger was built from
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn min_level(&self) -> Level {
        self.min_level
    }

    /// Whether a record at `level` would be written
    pub fn enabled(&self, level: Level) -> bool {
        level.is_enabled_at(self.min_level)
    }

    /// Handle to the underlying rotating file, e.g. for a `tracing-subscriber`
    /// fmt layer
    pub fn writer(&self) -> RotatingFile {
        self.sink.clone()
    }

    /// Flush the active log file
    pub fn flush(&self) -> io::Result<()> {
        self.sink.flush_file()
    }

    /// Log a preformatted message at any level
    ///
    /// Arguments are only formatted when `level` is admitted:
    ///
    /// ```no_run
    /// # fn main() -> rotalog::Result<()> {
    /// use rotalog::Level;
    ///
    /// let logger = rotalog::new_logger_default("logs")?;
    /// logger.log(Level::Warn, format_args!("retry {} of {}", 2, 5));
    /// # Ok(())
    /// # }
    /// ```
    #[track_caller]
    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        self.emit(level, args, &[]);
    }

    #[track_caller]
    pub fn debug(&self, message: &str, fields: &[Field]) {
        self.emit(Level::Debug, format_args!("{}", message), fields);
    }

    #[track_caller]
    pub fn info(&self, message: &str, fields: &[Field]) {
        self.emit(Level::Info, format_args!("{}", message), fields);
    }

    #[track_caller]
    pub fn warn(&self, message: &str, fields: &[Field]) {
        self.emit(Level::Warn, format_args!("{}", message), fields);
    }

    #[track_caller]
    pub fn error(&self, message: &str, fields: &[Field]) {
        self.emit(Level::Error, format_args!("{}", message), fields);
    }

    /// Write the record, then exit the process with status 1
    #[track_caller]
    pub fn fatal(&self, message: &str, fields: &[Field]) -> ! {
        self.emit(Level::Fatal, format_args!("{}", message), fields);
        exit_fatal(&self.sink)
    }

    /// Every public entry point is `#[track_caller]` and so is this, so
    /// `Location::caller()` resolves to the application call site.
    #[track_caller]
    fn emit(&self, level: Level, message: fmt::Arguments<'_>, fields: &[Field]) {
        if !self.enabled(level) {
            return;
        }

        let caller = Location::caller();
        self.write_record(level, caller, message, fields);

        match level {
            Level::Panic => panic!("{}", message),
            Level::Fatal => exit_fatal(&self.sink),
            _ => {}
        }
    }

    fn write_record(
        &self,
        level: Level,
        caller: &'static Location<'static>,
        message: fmt::Arguments<'_>,
        fields: &[Field],
    ) {
        let line = self.encoder.encode(&Record {
            time: Local::now(),
            level,
            caller,
            message,
            fields,
        });

        if let Err(e) = self.sink.append(line.as_bytes()) {
            report_once(|| {
                tracing::warn!(
                    path = %self.sink.path().display(),
                    error = %e,
                    "Failed to write log record"
                );
            });
        }
    }
}

fn exit_fatal(sink: &RotatingFile) -> ! {
    let _ = sink.flush_file();
    std::process::exit(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use flate2::read::GzDecoder;
    use std::fs;
    use std::io::Read;
    use std::panic::{self, AssertUnwindSafe};
    use std::process::{Command, Stdio};
    use tempfile::TempDir;

    const FATAL_CHILD_DIR: &str = "ROTALOG_FATAL_CHILD_DIR";

    fn test_logger(dir: &Path) -> Logger {
        let mut config = Config::new(dir);
        config.service_name = "svc".to_string();
        Logger::new(config).unwrap()
    }

    fn read_log(logger: &Logger) -> String {
        fs::read_to_string(logger.filename()).unwrap_or_default()
    }

    fn gunzip(path: &Path) -> String {
        let mut decoded = String::new();
        GzDecoder::new(fs::File::open(path).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        decoded
    }

    #[test]
    fn test_new_resolves_paths() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::new(temp_dir.path().join("logs/"));
        let logger = Logger::new(config).unwrap();

        let exe = std::env::current_exe().unwrap();
        assert_eq!(logger.log_dir(), temp_dir.path().join("logs"));
        assert_eq!(
            logger.service_name(),
            exe.file_stem().unwrap().to_string_lossy()
        );
        assert_eq!(
            logger.filename(),
            logger.log_dir().join(format!("{}.log", logger.service_name()))
        );
        assert_eq!(logger.min_level(), Level::Info);
    }

    #[test]
    fn test_info_writes_message() {
        let temp_dir = TempDir::new().unwrap();
        let logger = test_logger(temp_dir.path());

        logger.info("hello", &[]);

        let content = read_log(&logger);
        assert!(content.contains("hello"));
        assert!(content.contains("\tinfo\t"));
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_admission_by_level() {
        let temp_dir = TempDir::new().unwrap();
        let logger = test_logger(temp_dir.path());

        logger.debug("debug record", &[]);
        logger.info("info record", &[]);
        logger.warn("warn record", &[]);
        logger.error("error record", &[]);
        logger.log(Level::DPanic, format_args!("dpanic record"));
        logger.log(Level::Invalid, format_args!("invalid record"));

        let content = read_log(&logger);
        assert!(!content.contains("debug record"));
        assert!(!content.contains("invalid record"));
        assert!(content.contains("info record"));
        assert!(content.contains("warn record"));
        assert!(content.contains("error record"));
        assert!(content.contains("\tdpanic\tlogging/instance.rs"));
        assert_eq!(content.lines().count(), 4);
    }

    #[test]
    fn test_debug_log_appends_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let logger = test_logger(temp_dir.path());

        logger.log(Level::Debug, format_args!("x={}", 5));
        assert!(!logger.filename().exists());

        logger.info("baseline", &[]);
        let before = fs::metadata(logger.filename()).unwrap().len();
        logger.log(Level::Debug, format_args!("x={}", 5));
        let after = fs::metadata(logger.filename()).unwrap().len();

        assert_eq!(before, after);
        assert!(!read_log(&logger).contains("x=5"));
    }

    #[test]
    fn test_rejected_records_are_not_formatted() {
        struct Tripwire<'a>(&'a Cell<bool>);

        impl fmt::Display for Tripwire<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.set(true);
                f.write_str("formatted")
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let logger = test_logger(temp_dir.path());
        let formatted = Cell::new(false);

        logger.log(Level::Debug, format_args!("{}", Tripwire(&formatted)));
        assert!(!formatted.get());

        logger.log(Level::Info, format_args!("{}", Tripwire(&formatted)));
        assert!(formatted.get());
    }

    #[test]
    fn test_log_formats_arguments() {
        let temp_dir = TempDir::new().unwrap();
        let logger = test_logger(temp_dir.path());

        logger.log(Level::Warn, format_args!("x={} y={:?}", 5, "z"));

        assert!(read_log(&logger).contains("\twarn\t"));
        assert!(read_log(&logger).contains("x=5 y=\"z\""));
    }

    #[test]
    fn test_fields_are_appended_as_json() {
        let temp_dir = TempDir::new().unwrap();
        let logger = test_logger(temp_dir.path());

        logger.error(
            "upload failed",
            &[Field::new("bytes", 512), Field::new("retry", true)],
        );

        let expected = "\tupload failed\t{\"bytes\":512,\"retry\":true}\n";
        assert!(read_log(&logger).ends_with(expected));
    }

    #[test]
    fn test_caller_is_the_call_site() {
        let temp_dir = TempDir::new().unwrap();
        let logger = test_logger(temp_dir.path());

        let info_line = line!() + 1;
        logger.info("attributed", &[]);
        let log_line = line!() + 1;
        logger.log(Level::Error, format_args!("attributed via log"));

        let content = read_log(&logger);
        let info_expected = format!("\tlogging/instance.rs:{}\tattributed\n", info_line);
        let log_expected = format!("\tlogging/instance.rs:{}\tattributed via log\n", log_line);
        assert!(content.contains(&info_expected));
        assert!(content.contains(&log_expected));
    }

    #[test]
    fn test_panic_level_writes_then_panics() {
        let temp_dir = TempDir::new().unwrap();
        let logger = test_logger(temp_dir.path());

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            logger.log(Level::Panic, format_args!("boom {}", 1));
        }));

        assert!(result.is_err());
        let content = read_log(&logger);
        assert!(content.contains("\tpanic\t"));
        assert!(content.contains("boom 1"));
    }

    #[test]
    fn test_rotates_past_max_file_size() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::new(temp_dir.path());
        config.service_name = "svc".to_string();
        config.max_file_size = 1;
        let logger = Logger::new(config).unwrap();

        let payload = "x".repeat(1000);
        for _ in 0..1100 {
            logger.info(&payload, &[]);
        }

        let entries: Vec<String> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(entries.len() >= 2, "no rotated file in {:?}", entries);
        assert!(entries.iter().any(|n| n == "svc.log"));
        assert!(entries.iter().any(|n| n == "svc.log.1.gz"));
    }

    #[test]
    fn test_earlier_instance_keeps_writing_after_rotation() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::new(temp_dir.path());
        config.service_name = "svc".to_string();
        config.max_file_size = 1;
        let earlier = Logger::new(config.clone()).unwrap();
        let later = Logger::new(config).unwrap();
        assert!(earlier.writer().same_sink(&later.writer()));

        earlier.info("opened by the earlier instance", &[]);
        let payload = "x".repeat(1000);
        for _ in 0..1100 {
            later.info(&payload, &[]);
        }
        earlier.info("written after the rotation", &[]);

        let rotated = gunzip(&temp_dir.path().join("svc.log.1.gz"));
        assert!(rotated.contains("opened by the earlier instance"));
        assert!(read_log(&later).contains("written after the rotation"));
    }

    #[test]
    fn test_write_failure_is_not_surfaced() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::new(temp_dir.path());
        config.service_name = "svc".to_string();
        config.max_file_size = 1;
        let logger = Logger::new(config).unwrap();

        // Larger than the rotation size, so the sink refuses it
        let oversized = "x".repeat(2 * 1024 * 1024);
        logger.error(&oversized, &[]);
        assert!(!logger.filename().exists());

        logger.info("still logging", &[]);
        assert!(read_log(&logger).contains("still logging"));
    }

    /// Runs only when re-executed by `test_fatal_writes_then_exits`
    #[test]
    fn fatal_child_process() {
        let Ok(dir) = std::env::var(FATAL_CHILD_DIR) else {
            return;
        };
        let logger = test_logger(Path::new(&dir));
        logger.fatal("fatal record", &[Field::new("code", 7)]);
    }

    #[test]
    fn test_fatal_writes_then_exits() {
        let temp_dir = TempDir::new().unwrap();

        let status = Command::new(std::env::current_exe().unwrap())
            .args([
                "--exact",
                "logging::instance::tests::fatal_child_process",
                "--nocapture",
                "--test-threads=1",
            ])
            .env(FATAL_CHILD_DIR, temp_dir.path())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .unwrap();

        assert_eq!(status.code(), Some(1));
        let content = fs::read_to_string(temp_dir.path().join("svc.log")).unwrap();
        assert!(content.contains("\tfatal\t"));
        assert!(content.contains("fatal record\t{\"code\":7}"));
    }
}
