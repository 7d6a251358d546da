use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::log::LogRecord;
use crate::server::{ServerId, ServerInstance};
use serde::{Deserialize, Serialize};

/// A request to the supervisor. Each one gets exactly one [`Reply`] or error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "camelCase")]
pub enum Command {
    /// Launch a server
    Start(ServerConfig),
    /// Ask an instance to shut down
    Stop(ServerId),
    /// Snapshot of one instance
    GetStatus(ServerId),
    /// Host memory
    GetMemory,
    /// Snapshots of every tracked instance
    ListInstances,
}

/// Successful result of a [`Command`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Reply {
    /// Result of `Start` and `GetStatus`
    Instance(ServerInstance),
    /// Result of `Stop`
    Stopped,
    /// Result of `GetMemory`
    Memory(MemoryInfo),
    /// Result of `ListInstances`
    Instances(Vec<ServerInstance>),
}

impl Reply {
    fn unexpected(self, wanted: &str) -> Error {
        Error::Communication(format!("Expected {} reply, got {:?}", wanted, self))
    }

    pub(crate) fn into_instance(self) -> Result<ServerInstance> {
        match self {
            Reply::Instance(instance) => Ok(instance),
            other => Err(other.unexpected("instance")),
        }
    }

    pub(crate) fn into_stopped(self) -> Result<()> {
        match self {
            Reply::Stopped => Ok(()),
            other => Err(other.unexpected("stop")),
        }
    }

    pub(crate) fn into_memory(self) -> Result<MemoryInfo> {
        match self {
            Reply::Memory(memory) => Ok(memory),
            other => Err(other.unexpected("memory")),
        }
    }

    pub(crate) fn into_instances(self) -> Result<Vec<ServerInstance>> {
        match self {
            Reply::Instances(instances) => Ok(instances),
            other => Err(other.unexpected("instance list")),
        }
    }
}

/// Host memory, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// Total physical memory
    pub total: u64,
    /// Free physical memory
    pub free: u64,
}

/// Notification about one server instance.
///
/// For every instance there is exactly one `Started` and one `Stopped`, in
/// that order, with any number of `Message`s around the `Started`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Startup finished. `record` is the record that decided it, or `None`
    /// if the process exited before deciding.
    Started {
        id: ServerId,
        success: bool,
        record: Option<LogRecord>,
    },
    /// The process exited. `expected` is true if a stop had been requested.
    #[serde(rename_all = "camelCase")]
    Stopped {
        id: ServerId,
        exit_code: Option<i32>,
        signal: Option<String>,
        expected: bool,
    },
    /// A classified console record
    Message { id: ServerId, record: LogRecord },
}

impl ServerEvent {
    /// Instance the event belongs to
    pub fn id(&self) -> ServerId {
        match self {
            ServerEvent::Started { id, .. }
            | ServerEvent::Stopped { id, .. }
            | ServerEvent::Message { id, .. } => *id,
        }
    }

    /// Whether this is the instance's last event
    pub fn is_stopped(&self) -> bool {
        matches!(self, ServerEvent::Stopped { .. })
    }
}
