use crate::bridge::{Command, Envelope, EventBus, MemoryInfo, Reply, ServerEvent, SupervisorHandle};
use crate::config::{ServerConfig, SupervisorConfig};
use crate::error::{Error, Result};
use crate::log::LogRecord;
use crate::server::lifecycle::detect_startup;
use crate::server::monitor::{self, MonitorMessage};
use crate::server::process::{Action, LaunchCommand};
use crate::server::registry::PendingExit;
use crate::server::{InstanceRegistry, ServerId, ServerInstance, ServerStatus, Transition};
use sysinfo::System;
use tokio::sync::{mpsc, oneshot};

/// Monitor messages buffered before monitor tasks wait on the supervisor.
const MONITOR_CHANNEL_CAPACITY: usize = 256;

/// Owns every supervised server process.
///
/// The supervisor runs as a single tokio task. Commands and monitor reports
/// are handled one at a time and no handler waits on a child, so registry
/// updates and event publication are serialized without locks. It is only
/// reachable through the [`SupervisorHandle`] returned by
/// [`ProcessSupervisor::spawn`].
pub struct ProcessSupervisor {
    registry: InstanceRegistry,
    events: EventBus,
    monitor_tx: mpsc::Sender<MonitorMessage>,
    config: SupervisorConfig,
}

impl ProcessSupervisor {
    /// Start a supervisor task on the current tokio runtime.
    ///
    /// The task runs until every handle has been dropped and every instance
    /// it launched has exited.
    pub fn spawn(config: SupervisorConfig) -> SupervisorHandle {
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (monitor_tx, monitor_rx) = mpsc::channel(MONITOR_CHANNEL_CAPACITY);
        let events = EventBus::new(config.event_capacity.max(1));

        let supervisor = Self {
            registry: InstanceRegistry::new(),
            events: events.clone(),
            monitor_tx,
            config,
        };
        tokio::spawn(supervisor.run(command_rx, monitor_rx));

        SupervisorHandle::new(command_tx, events)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Envelope>,
        mut monitors: mpsc::Receiver<MonitorMessage>,
    ) {
        tracing::debug!("Supervisor started");
        let mut accepting = true;

        while accepting || !self.registry.is_empty() {
            tokio::select! {
                biased;
                Some(message) = monitors.recv() => self.handle_monitor(message),
                command = commands.recv(), if accepting => match command {
                    Some(envelope) => self.handle_command(envelope),
                    None => {
                        tracing::debug!(
                            remaining = self.registry.len(),
                            "All supervisor handles dropped, waiting for running servers"
                        );
                        accepting = false;
                    }
                },
            }
        }

        tracing::debug!("Supervisor finished");
    }

    fn handle_command(&mut self, envelope: Envelope) {
        let Envelope { command, reply } = envelope;
        let result = match command {
            Command::Start(config) => self.start(config).map(Reply::Instance),
            Command::Stop(id) => self.stop(id).map(|_| Reply::Stopped),
            Command::GetStatus(id) => self.status(id).map(Reply::Instance),
            Command::GetMemory => Ok(Reply::Memory(memory_info())),
            Command::ListInstances => Ok(Reply::Instances(self.registry.snapshots())),
        };

        if reply.send(result).is_err() {
            tracing::debug!("Caller went away before its reply was ready");
        }
    }

    #[tracing::instrument(skip(self, config), fields(server = %config.name))]
    fn start(&mut self, config: ServerConfig) -> Result<ServerInstance> {
        if let Some(existing) = self.registry.active_for(&config.name) {
            tracing::warn!(instance = %existing, "Server already has an active instance");
            return Err(Error::AlreadyRunning(config.name));
        }

        let command = LaunchCommand::for_action(&config, Action::Run);
        tracing::info!(command = %command, dir = %command.current_dir.display(), "Launching server");
        let child = command.spawn().inspect_err(|e| {
            tracing::error!(error = %e, "Failed to launch server");
        })?;

        let id = ServerId::from_pid(child.id());
        let instance = ServerInstance {
            id,
            config,
            status: ServerStatus::Ready.apply(Transition::Start)?,
            exit_code: None,
        };

        let (kill_tx, kill_rx) = oneshot::channel();
        self.registry.insert(instance.clone(), kill_tx)?;
        monitor::spawn_server_monitor(
            id,
            child,
            self.monitor_tx.clone(),
            kill_rx,
            self.config.idle_flush(),
        );

        tracing::info!(instance = %id, "Server launched");
        Ok(instance)
    }

    #[tracing::instrument(skip(self), fields(instance = %id))]
    fn stop(&mut self, id: ServerId) -> Result<()> {
        let Some(entry) = self.registry.entry_mut(id) else {
            tracing::warn!("Stop requested for an unknown instance");
            return Err(Error::UnknownInstance(id));
        };

        let current = entry.instance.status;
        if current.is_terminal() {
            tracing::warn!(status = %current, "Server is not running, ignoring stop");
            return Ok(());
        }
        let Ok(next) = current.apply(Transition::StopRequested) else {
            tracing::warn!(status = %current, "Server is already stopping");
            return Ok(());
        };

        let command = LaunchCommand::for_action(&entry.instance.config, Action::Stop);
        tracing::info!(command = %command, "Stopping server");
        let helper = command.spawn().inspect_err(|e| {
            tracing::error!(error = %e, "Failed to launch stop script");
        })?;

        let (helper_kill, helper_kill_rx) = oneshot::channel();
        entry.instance.status = next;
        entry.helper_kill = Some(helper_kill);
        entry.helper_running = true;
        monitor::spawn_stop_helper_monitor(
            id,
            helper,
            self.monitor_tx.clone(),
            helper_kill_rx,
            self.config.idle_flush(),
        );

        if let Some(timeout) = self.config.stop_timeout() {
            monitor::spawn_stop_timer(id, timeout, self.monitor_tx.clone());
        }

        Ok(())
    }

    fn status(&self, id: ServerId) -> Result<ServerInstance> {
        self.registry.get(id).cloned().ok_or_else(|| {
            tracing::warn!(instance = %id, "Status requested for an unknown instance");
            Error::UnknownInstance(id)
        })
    }

    fn handle_monitor(&mut self, message: MonitorMessage) {
        match message {
            MonitorMessage::Record { id, record } => self.on_record(id, record),
            MonitorMessage::Exited {
                id,
                exit_code,
                signal,
            } => self.on_exit(id, PendingExit { exit_code, signal }),
            MonitorMessage::HelperFinished { id } => self.on_helper_finished(id),
            MonitorMessage::StopTimedOut { id } => self.on_stop_timeout(id),
        }
    }

    fn on_record(&mut self, id: ServerId, record: LogRecord) {
        let Some(entry) = self.registry.entry_mut(id) else {
            tracing::debug!(instance = %id, "Dropping output of an instance that is gone");
            return;
        };

        let outcome = match entry.instance.status {
            ServerStatus::Starting => detect_startup(&record),
            _ => None,
        };

        self.events.publish(ServerEvent::Message {
            id,
            record: record.clone(),
        });

        let Some(outcome) = outcome else {
            return;
        };

        entry.started_reported = true;
        let name = entry.instance.name().to_string();
        match entry.instance.status.apply(outcome.transition()) {
            Ok(status) => self.registry.set_status(id, status),
            Err(e) => tracing::warn!(instance = %id, error = %e, "Ignoring startup outcome"),
        }

        if outcome.is_success() {
            tracing::info!(instance = %id, server = %name, "Server started");
        } else {
            tracing::warn!(
                instance = %id,
                server = %name,
                text = %record.text,
                "Server failed to start"
            );
        }

        self.events.publish(ServerEvent::Started {
            id,
            success: outcome.is_success(),
            record: Some(record),
        });
    }

    fn on_exit(&mut self, id: ServerId, exit: PendingExit) {
        let Some(entry) = self.registry.entry_mut(id) else {
            tracing::debug!(instance = %id, "Exit reported for an instance that is gone");
            return;
        };

        if entry.helper_running {
            tracing::debug!(instance = %id, "Server exited, waiting for stop script output");
            entry.pending_exit = Some(exit);
            return;
        }

        self.finish_instance(id, exit);
    }

    fn on_helper_finished(&mut self, id: ServerId) {
        let Some(entry) = self.registry.entry_mut(id) else {
            return;
        };
        entry.helper_running = false;
        entry.helper_kill = None;

        if let Some(exit) = entry.pending_exit.take() {
            self.finish_instance(id, exit);
        }
    }

    /// Publish the end of an instance and forget it.
    fn finish_instance(&mut self, id: ServerId, exit: PendingExit) {
        let Some(mut entry) = self.registry.remove(id) else {
            return;
        };
        let PendingExit { exit_code, signal } = exit;

        if !entry.started_reported {
            self.events.publish(ServerEvent::Started {
                id,
                success: false,
                record: None,
            });
        }

        let expected = entry.instance.status == ServerStatus::Stopping;
        entry.instance.status = ServerStatus::Stopped;
        entry.instance.exit_code = exit_code;

        tracing::info!(
            instance = %id,
            server = %entry.instance.name(),
            ?exit_code,
            ?signal,
            expected,
            "Server exited"
        );

        self.events.publish(ServerEvent::Stopped {
            id,
            exit_code,
            signal,
            expected,
        });
    }

    fn on_stop_timeout(&mut self, id: ServerId) {
        let Some(entry) = self.registry.entry_mut(id) else {
            return;
        };
        if entry.instance.status != ServerStatus::Stopping {
            return;
        }

        tracing::warn!(instance = %id, "Server did not stop in time");
        for kill in [entry.kill_switch.take(), entry.helper_kill.take()]
            .into_iter()
            .flatten()
        {
            let _ = kill.send(());
        }
    }
}

/// Total and free physical memory of the host, in bytes.
pub fn memory_info() -> MemoryInfo {
    let mut system = System::new();
    system.refresh_memory();

    MemoryInfo {
        total: system.total_memory(),
        free: system.free_memory(),
    }
}
