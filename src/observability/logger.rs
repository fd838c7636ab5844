//! Structured JSON logger
//!
//! - One log line = one event
//! - Deterministic key ordering (`event`, `level`, then fields by key)
//! - Records below the runtime threshold are discarded
//!
//! The threshold lives in a shared [`AtomicLevel`] so the control server can
//! raise or lower verbosity while the process is running.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Log verbosity levels, ordered from most to least verbose
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Diagnostic detail
    Debug = 0,
    /// Normal operations
    #[default]
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Unrecoverable, process exits
    Fatal = 4,
}

impl Level {
    /// Every level, most verbose first
    pub const ALL: [Level; 5] = [
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Fatal,
    ];

    /// Canonical (lowercase) name
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }

    fn from_u8(raw: u8) -> Level {
        match raw {
            0 => Level::Debug,
            1 => Level::Info,
            2 => Level::Warn,
            3 => Level::Error,
            _ => Level::Fatal,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when text does not name a [`Level`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized level: {0:?}")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseLevelError(s.to_string()))
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A level that can be read and replaced concurrently
#[derive(Debug)]
pub struct AtomicLevel(AtomicU8);

impl AtomicLevel {
    pub fn new(level: Level) -> Self {
        Self(AtomicU8::new(level as u8))
    }

    pub fn load(&self) -> Level {
        Level::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Replace the level, returning the previous one
    pub fn swap(&self, level: Level) -> Level {
        Level::from_u8(self.0.swap(level as u8, Ordering::AcqRel))
    }

    /// Whether a record at `level` passes this threshold
    pub fn enabled(&self, level: Level) -> bool {
        level >= self.load()
    }
}

impl Default for AtomicLevel {
    fn default() -> Self {
        Self::new(Level::default())
    }
}

static THRESHOLD: OnceLock<Arc<AtomicLevel>> = OnceLock::new();

/// A structured logger that outputs JSON lines
///
/// Records at `Error` and above go to stderr, the rest to stdout.
pub struct Logger;

impl Logger {
    /// Shared threshold consulted by every `Logger` call
    pub fn threshold() -> Arc<AtomicLevel> {
        Arc::clone(THRESHOLD.get_or_init(|| Arc::new(AtomicLevel::default())))
    }

    /// Whether a record at `level` would be written
    pub fn enabled(level: Level) -> bool {
        THRESHOLD
            .get()
            .map_or(level >= Level::default(), |threshold| threshold.enabled(level))
    }

    /// Log an event with the given level and fields
    pub fn log(level: Level, event: &str, fields: &[(&str, &str)]) {
        if !Self::enabled(level) {
            return;
        }
        if level >= Level::Error {
            Self::log_to_writer(level, event, fields, &mut io::stderr());
        } else {
            Self::log_to_writer(level, event, fields, &mut io::stdout());
        }
    }

    fn log_to_writer<W: Write>(level: Level, event: &str, fields: &[(&str, &str)], writer: &mut W) {
        let line = Self::format_line(level, event, fields);
        // Single write per line
        let _ = writer.write_all(line.as_bytes());
        let _ = writer.flush();
    }

    fn format_line(level: Level, event: &str, fields: &[(&str, &str)]) -> String {
        let mut output = String::with_capacity(128);

        output.push_str("{\"event\":");
        push_json_string(&mut output, event);
        output.push_str(",\"level\":\"");
        output.push_str(level.as_str());
        output.push('"');

        let mut sorted: Vec<_> = fields.iter().collect();
        sorted.sort_by_key(|(k, _)| *k);

        for (key, value) in sorted {
            output.push(',');
            push_json_string(&mut output, key);
            output.push(':');
            push_json_string(&mut output, value);
        }

        output.push_str("}\n");
        output
    }

    pub fn debug(event: &str, fields: &[(&str, &str)]) {
        Self::log(Level::Debug, event, fields);
    }

    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Level::Info, event, fields);
    }

    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Level::Warn, event, fields);
    }

    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Level::Error, event, fields);
    }
}

fn push_json_string(output: &mut String, s: &str) {
    match serde_json::to_string(s) {
        Ok(quoted) => output.push_str(&quoted),
        Err(_) => output.push_str("\"\""),
    }
}

#[cfg(test)]
pub fn capture_log(level: Level, event: &str, fields: &[(&str, &str)]) -> String {
    let mut buffer = Vec::new();
    Logger::log_to_writer(level, event, fields, &mut buffer);
    String::from_utf8(buffer).unwrap()
}
