use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a server instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// Configured but never started
    Ready,
    /// Launched, waiting for the startup marker
    Starting,
    /// Startup marker seen
    Running,
    /// Stop requested, waiting for the process to exit
    Stopping,
    /// Process has exited
    Stopped,
    /// Server reported a severe condition during startup
    Failed,
}

/// Something that moves an instance from one status to another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A start was accepted
    Start,
    /// The startup success marker was seen
    StartupSucceeded,
    /// A severe record arrived during startup
    StartupFailed,
    /// A stop was requested
    StopRequested,
    /// The process exited
    Exited,
}

impl ServerStatus {
    /// Apply `transition`, returning the new status.
    ///
    /// # Examples
    ///
    /// ```
    /// use tomcat_runner::server::{ServerStatus, Transition};
    ///
    /// let status = ServerStatus::Ready.apply(Transition::Start).unwrap();
    /// assert_eq!(status, ServerStatus::Starting);
    /// assert!(status.apply(Transition::Start).is_err());
    /// ```
    pub fn apply(self, transition: Transition) -> Result<ServerStatus> {
        use ServerStatus::*;
        use Transition::*;

        match (self, transition) {
            (Ready | Stopped | Failed, Start) => Ok(Starting),
            (Starting, StartupSucceeded) => Ok(Running),
            (Starting, StartupFailed) => Ok(Failed),
            (Starting | Running, StopRequested) => Ok(Stopping),
            (_, Exited) => Ok(Stopped),
            (from, transition) => Err(Error::InvalidTransition { from, transition }),
        }
    }

    /// Whether the instance still owns a live process slot for its name
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ServerStatus::Starting | ServerStatus::Running | ServerStatus::Stopping
        )
    }

    /// Whether a stop request has nothing to do
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ServerStatus::Ready | ServerStatus::Stopped | ServerStatus::Failed
        )
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServerStatus::Ready => "ready",
            ServerStatus::Starting => "starting",
            ServerStatus::Running => "running",
            ServerStatus::Stopping => "stopping",
            ServerStatus::Stopped => "stopped",
            ServerStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}
