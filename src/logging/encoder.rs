//! Console-style record encoding
//!
//! One record per line, tab separated:
//! `2026-01-21T14:30:45.123+0100	info	src/main.rs:42	message	{"key":"value"}`

use std::fmt::{self, Write as _};
use std::panic::Location;

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;

use super::level::Level;

/// A structured key/value pair attached to a record
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    key: String,
    value: Value,
}

impl Field {
    /// Create a field from anything convertible to a JSON value
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a field by serializing `value`
    ///
    /// A value that fails to serialize is recorded as the error text instead.
    pub fn json<T: Serialize + ?Sized>(key: impl Into<String>, value: &T) -> Self {
        let value = serde_json::to_value(value)
            .unwrap_or_else(|e| Value::String(format!("<unserializable: {}>", e)));
        Self {
            key: key.into(),
            value,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// Everything the encoder needs to render one record
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    pub time: DateTime<Local>,
    pub level: Level,
    pub caller: &'static Location<'static>,
    pub message: fmt::Arguments<'a>,
    pub fields: &'a [Field],
}

/// Renders records in the tab-separated console layout with ISO-8601 times
#[derive(Debug, Clone, Copy, Default)]
pub struct Encoder;

impl Encoder {
    pub fn new() -> Self {
        Self
    }

    /// Render a record as a single newline-terminated line
    pub fn encode(&self, record: &Record<'_>) -> String {
        let mut out = String::with_capacity(128);

        write_time(&mut out, &record.time);
        out.push('\t');
        out.push_str(record.level.as_str());
        out.push('\t');
        let _ = write!(
            out,
            "{}:{}",
            short_caller(record.caller.file()),
            record.caller.line()
        );
        out.push('\t');
        // A failing Display impl in the arguments truncates the message, nothing more
        let _ = out.write_fmt(record.message);

        if !record.fields.is_empty() {
            out.push('\t');
            write_fields(&mut out, record.fields);
        }

        out.push('\n');
        out
    }
}

/// ISO-8601 with milliseconds; `Z` for a zero offset, `+hhmm` otherwise
fn write_time(out: &mut String, time: &DateTime<Local>) {
    let _ = write!(out, "{}", time.format("%Y-%m-%dT%H:%M:%S%.3f"));
    if time.offset().local_minus_utc() == 0 {
        out.push('Z');
    } else {
        let _ = write!(out, "{}", time.format("%z"));
    }
}

/// JSON object with keys in call order; duplicate keys are kept
fn write_fields(out: &mut String, fields: &[Field]) {
    out.push('{');
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{}:{}", Value::from(field.key.as_str()), field.value);
    }
    out.push('}');
}

/// Keep only the final directory and file name of a source path
fn short_caller(file: &str) -> &str {
    let is_sep = |c: char| c == '/' || c == '\\';
    let mut end = file.len();
    for _ in 0..2 {
        match file[..end].rfind(is_sep) {
            Some(idx) => end = idx,
            None => return file,
        }
    }
    &file[end + 1..]
}
