use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::server::{ServerId, ServerStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::oneshot;

/// Snapshot of one server instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInstance {
    /// Process id of the launch process
    pub id: ServerId,
    /// Descriptor the instance was started from
    pub config: ServerConfig,
    /// Current status
    pub status: ServerStatus,
    /// Exit code, once the process has exited
    #[serde(default)]
    pub exit_code: Option<i32>,
}

impl ServerInstance {
    /// Configured name of the server
    pub fn name(&self) -> &str {
        &self.config.name
    }
}

/// Exit status held back until the stop helper's output is in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingExit {
    pub(crate) exit_code: Option<i32>,
    pub(crate) signal: Option<String>,
}

pub(crate) struct Entry {
    pub(crate) instance: ServerInstance,
    /// Set once a `started` event has been published for this instance.
    pub(crate) started_reported: bool,
    /// Fires the monitor's forced kill.
    pub(crate) kill_switch: Option<oneshot::Sender<()>>,
    /// Fires the stop helper's forced kill while it runs.
    pub(crate) helper_kill: Option<oneshot::Sender<()>>,
    pub(crate) helper_running: bool,
    pub(crate) pending_exit: Option<PendingExit>,
}

/// Supervised instances keyed by process id.
///
/// A second index maps server names to their active instance, so that a
/// name can't be started twice. An instance holds its name while it is
/// starting, running or stopping; a failed instance that is still alive
/// stays tracked until it exits but no longer blocks a new start. Only the
/// supervisor task owns a registry.
#[derive(Default)]
pub struct InstanceRegistry {
    entries: HashMap<ServerId, Entry>,
    active: HashMap<String, ServerId>,
}

impl InstanceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly started instance.
    ///
    /// Fails with [`Error::AlreadyRunning`] if its name already has an active
    /// instance.
    pub(crate) fn insert(
        &mut self,
        instance: ServerInstance,
        kill_switch: oneshot::Sender<()>,
    ) -> Result<()> {
        if let Some(existing) = self.active_for(instance.name()) {
            if existing != instance.id {
                return Err(Error::AlreadyRunning(instance.config.name));
            }
        }

        self.active.insert(instance.config.name.clone(), instance.id);
        self.entries.insert(
            instance.id,
            Entry {
                instance,
                started_reported: false,
                kill_switch: Some(kill_switch),
                helper_kill: None,
                helper_running: false,
                pending_exit: None,
            },
        );
        Ok(())
    }

    /// Snapshot of an instance
    pub fn get(&self, id: ServerId) -> Option<&ServerInstance> {
        self.entries.get(&id).map(|entry| &entry.instance)
    }

    pub(crate) fn entry_mut(&mut self, id: ServerId) -> Option<&mut Entry> {
        self.entries.get_mut(&id)
    }

    /// Active instance of a server name, if any
    pub fn active_for(&self, name: &str) -> Option<ServerId> {
        let id = self.active.get(name).copied()?;
        self.get(id)
            .filter(|instance| instance.status.is_active())
            .map(|instance| instance.id)
    }

    /// Move an instance to `status`, releasing its name once it is no
    /// longer active.
    pub(crate) fn set_status(&mut self, id: ServerId, status: ServerStatus) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        entry.instance.status = status;
        if !status.is_active() && self.active.get(entry.instance.name()) == Some(&id) {
            self.active.remove(entry.instance.name());
        }
    }

    pub(crate) fn remove(&mut self, id: ServerId) -> Option<Entry> {
        let entry = self.entries.remove(&id)?;
        if self.active.get(entry.instance.name()) == Some(&id) {
            self.active.remove(entry.instance.name());
        }
        Some(entry)
    }

    /// Snapshots of every tracked instance, ordered by process id
    pub fn snapshots(&self) -> Vec<ServerInstance> {
        let mut instances: Vec<ServerInstance> = self
            .entries
            .values()
            .map(|entry| entry.instance.clone())
            .collect();
        instances.sort_by_key(|instance| instance.id);
        instances
    }

    /// Number of tracked instances
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
