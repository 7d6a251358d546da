use crate::log::{LogLevel, LogRecord};
use crate::server::Transition;

/// Text an `INFO` record starts with once the server has finished starting.
pub const STARTUP_MARKER: &str = "Server startup in";

/// How a starting server's startup ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupOutcome {
    /// The startup marker was logged
    Succeeded,
    /// A severe record was logged first
    Failed,
}

impl StartupOutcome {
    /// Whether the server came up
    pub fn is_success(self) -> bool {
        matches!(self, StartupOutcome::Succeeded)
    }

    /// Status transition this outcome causes
    pub fn transition(self) -> Transition {
        match self {
            StartupOutcome::Succeeded => Transition::StartupSucceeded,
            StartupOutcome::Failed => Transition::StartupFailed,
        }
    }
}

/// Inspect one record of a starting server.
///
/// Returns `None` for records that say nothing about startup. Only call this
/// while the instance is still starting: after the first outcome, records are
/// plain messages.
///
/// # Examples
///
/// ```
/// use tomcat_runner::log::{LogLevel, LogRecord};
/// use tomcat_runner::server::{detect_startup, StartupOutcome};
///
/// let record = LogRecord::new("Catalina start", LogLevel::Info, "Server startup in 812 ms");
/// assert_eq!(detect_startup(&record), Some(StartupOutcome::Succeeded));
/// ```
pub fn detect_startup(record: &LogRecord) -> Option<StartupOutcome> {
    match record.level {
        LogLevel::Info if record.text.starts_with(STARTUP_MARKER) => Some(StartupOutcome::Succeeded),
        LogLevel::Severe => Some(StartupOutcome::Failed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_must_lead_the_text() {
        let record = LogRecord::new("src", LogLevel::Info, "Not a Server startup in 5 ms");
        assert_eq!(detect_startup(&record), None);
    }

    #[test]
    fn test_unknown_level_never_decides() {
        let record = LogRecord::new("src", LogLevel::Unknown, "Server startup in 5 ms");
        assert_eq!(detect_startup(&record), None);
    }

    #[test]
    fn test_any_severe_fails() {
        let record = LogRecord::new("src", LogLevel::Severe, "Address already in use");
        let outcome = detect_startup(&record).unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.transition(), Transition::StartupFailed);
    }
}
