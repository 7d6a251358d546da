use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a classified log entry.
///
/// Tomcat's JULI console format prefixes the message line with a level label.
/// Only the labels the supervisor acts on are distinguished; everything else
/// (`WARNING`, `FINE`, a line that isn't a level line at all) is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// `INFO: ...`
    Info,
    /// `SEVERE: ...`
    Severe,
    /// Any other label
    Unknown,
}

impl LogLevel {
    /// Map a raw level label to a level.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "INFO" => LogLevel::Info,
            "SEVERE" => LogLevel::Severe,
            _ => LogLevel::Unknown,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Info => "INFO",
            LogLevel::Severe => "SEVERE",
            LogLevel::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

/// One entry of server console output.
///
/// # Examples
///
/// ```
/// use tomcat_runner::log::{LogLevel, LogRecord};
///
/// let record = LogRecord::new("2024 Jan 1", LogLevel::Info, "Server startup in 543 ms");
/// assert!(record.text.starts_with("Server startup in"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Line preceding the level line, usually a timestamp and logger name
    pub source: String,
    /// Classified level
    pub level: LogLevel,
    /// Message text, including continuation lines
    pub text: String,
}

impl LogRecord {
    /// Create a new record
    pub fn new(source: impl Into<String>, level: LogLevel, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            level,
            text: text.into(),
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}: {}", self.source, self.level, self.text)
    }
}
