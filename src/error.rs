//! Error handling module for Tomcat Runner.
//!
//! This module defines the error types used throughout the library.
//! Failures of the supervised server itself (a crash, a `SEVERE` line during
//! startup) are never errors: they arrive as [`ServerEvent`](crate::ServerEvent)s.
//! The variants below cover everything that can go wrong while *issuing* a
//! command.
//!
//! # Example
//!
//! ```
//! use tomcat_runner::error::{Error, Result};
//!
//! fn handle_error(result: Result<()>) {
//!     match result {
//!         Ok(_) => println!("Operation succeeded"),
//!         Err(Error::ServerNotFound(name)) => println!("Server '{}' is not configured", name),
//!         Err(Error::UnknownInstance(id)) => println!("Instance {} is no longer running", id),
//!         Err(Error::Spawn(msg)) => println!("Could not launch server: {}", msg),
//!         Err(e) => println!("Other error: {}", e),
//!     }
//! }
//! ```

use crate::server::{ServerId, ServerStatus, Transition};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the tomcat-runner library.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to parse configuration from a file or string.
    ///
    /// This error occurs when:
    /// - The configuration file cannot be read
    /// - The JSON or YAML is malformed
    /// - Field types are incorrect
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed but contains invalid values.
    ///
    /// This error occurs when:
    /// - A server references an application server that isn't defined
    /// - An application server has an empty path
    /// - A launch script name contains a path separator
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Requested server name was not found in the configuration.
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    /// The operating system failed to create the server process.
    ///
    /// This error occurs when:
    /// - The launch script is missing
    /// - The working directory doesn't exist
    /// - Permission to execute is denied
    ///
    /// No instance is registered when a start fails this way.
    #[error("Failed to spawn server process: {0}")]
    Spawn(String),

    /// A command referenced a process id the supervisor isn't tracking.
    ///
    /// This is recoverable: a server can exit on its own while a stop request
    /// is in flight. See [`Error::is_recoverable`].
    #[error("Unknown server instance: {0}")]
    UnknownInstance(ServerId),

    /// The named server already has an instance starting, running or stopping.
    #[error("Server '{0}' is already running")]
    AlreadyRunning(String),

    /// A state change was requested that the status machine does not allow.
    #[error("Cannot apply {transition:?} to a server that is {from:?}")]
    InvalidTransition {
        /// State the instance was in
        from: ServerStatus,
        /// Transition that was rejected
        transition: Transition,
    },

    /// The bridge to the supervisor failed.
    ///
    /// This error occurs when:
    /// - The supervisor task has shut down
    /// - A remote worker closed its connection
    /// - A reply was dropped before it was sent
    #[error("Communication error: {0}")]
    Communication(String),

    /// Error in serializing or deserializing bridge messages.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Whether the caller can treat this error as a warning and carry on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::UnknownInstance(_))
    }
}

/// Category of an error carried over the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// See [`Error::Spawn`]
    Spawn,
    /// See [`Error::UnknownInstance`]
    UnknownInstance,
    /// See [`Error::AlreadyRunning`]
    AlreadyRunning,
    /// See [`Error::ServerNotFound`]
    ServerNotFound,
    /// Anything else
    Other,
}

/// Serializable form of an [`Error`], used by the bridge's wire protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Error category
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
    /// Instance the error refers to, for `UnknownInstance`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<ServerId>,
    /// Server name the error refers to, for `AlreadyRunning`/`ServerNotFound`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

impl From<&Error> for RemoteError {
    fn from(error: &Error) -> Self {
        let (kind, instance, server) = match error {
            Error::Spawn(msg) => {
                return Self {
                    kind: ErrorKind::Spawn,
                    message: msg.clone(),
                    instance: None,
                    server: None,
                };
            }
            Error::UnknownInstance(id) => (ErrorKind::UnknownInstance, Some(*id), None),
            Error::AlreadyRunning(name) => (ErrorKind::AlreadyRunning, None, Some(name.clone())),
            Error::ServerNotFound(name) => (ErrorKind::ServerNotFound, None, Some(name.clone())),
            _ => (ErrorKind::Other, None, None),
        };
        Self {
            kind,
            message: error.to_string(),
            instance,
            server,
        }
    }
}

impl From<RemoteError> for Error {
    fn from(remote: RemoteError) -> Self {
        match (remote.kind, remote.instance, remote.server) {
            (ErrorKind::UnknownInstance, Some(id), _) => Error::UnknownInstance(id),
            (ErrorKind::AlreadyRunning, _, Some(name)) => Error::AlreadyRunning(name),
            (ErrorKind::ServerNotFound, _, Some(name)) => Error::ServerNotFound(name),
            (ErrorKind::Spawn, _, _) => Error::Spawn(remote.message),
            _ => Error::Other(remote.message),
        }
    }
}

/// Result type for tomcat-runner operations.
///
/// This is a convenience type alias for `std::result::Result` with the `Error` type
/// from this module.
pub type Result<T> = std::result::Result<T, Error>;
