//! Structured JSON logger
//!
//! - One JSON object per line, one line per event
//! - Keys in deterministic (alphabetical) order
//! - Synchronous, no buffering
//! - ERROR and FATAL go to stderr, everything else to stdout
//!
//! Lines below the process-wide minimum severity are discarded. Tests can
//! capture the lines emitted on the current thread with [`Logger::capture`].

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU8, Ordering};

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    Fatal = 4,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Severity::Trace,
            1 => Severity::Info,
            2 => Severity::Warn,
            3 => Severity::Error,
            _ => Severity::Fatal,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static MIN_SEVERITY: AtomicU8 = AtomicU8::new(Severity::Info as u8);

thread_local! {
    static CAPTURE: RefCell<Option<Vec<String>>> = RefCell::new(None);
}

/// Structured logger writing JSON lines
pub struct Logger;

impl Logger {
    /// Discard lines below `severity` from now on.
    pub fn set_min_severity(severity: Severity) {
        MIN_SEVERITY.store(severity as u8, Ordering::Relaxed);
    }

    pub fn min_severity() -> Severity {
        Severity::from_u8(MIN_SEVERITY.load(Ordering::Relaxed))
    }

    /// Log an event with the given severity and fields.
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        let captured = CAPTURE.with(|capture| {
            if let Some(lines) = capture.borrow_mut().as_mut() {
                lines.push(Self::format_line(severity, event, fields));
                true
            } else {
                false
            }
        });
        if captured || severity < Self::min_severity() {
            return;
        }

        let line = Self::format_line(severity, event, fields);
        if severity >= Severity::Error {
            Self::write_line(&line, &mut io::stderr());
        } else {
            Self::write_line(&line, &mut io::stdout());
        }
    }

    /// Render one log line, newline included.
    ///
    /// `event`, `severity` and `timestamp` are reserved keys; a field using
    /// one of them is dropped.
    pub fn format_line(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut object = Map::new();
        for (key, value) in fields {
            object.insert((*key).to_string(), Value::String((*value).to_string()));
        }
        object.insert("event".to_string(), Value::String(event.to_string()));
        object.insert(
            "severity".to_string(),
            Value::String(severity.as_str().to_string()),
        );
        object.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );

        let mut line = Value::Object(object).to_string();
        line.push('\n');
        line
    }

    fn write_line<W: Write>(line: &str, writer: &mut W) {
        // Observability failure must never fail the caller
        let _ = writer.write_all(line.as_bytes());
        let _ = writer.flush();
    }

    /// Run `f`, collecting every line logged on this thread instead of
    /// writing it. Captured lines ignore the minimum severity.
    pub fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<Value>) {
        let previous = CAPTURE.with(|capture| capture.borrow_mut().replace(Vec::new()));
        let result = f();
        let lines = CAPTURE.with(|capture| {
            let mut capture = capture.borrow_mut();
            let lines = capture.take().unwrap_or_default();
            *capture = previous;
            lines
        });
        let parsed = lines
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        (result, parsed)
    }

    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Trace, event, fields);
    }

    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }

    pub fn fatal(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Fatal, event, fields);
    }
}
