use crate::bridge::{Command, EventBus, MemoryInfo, Reply, ServerEvent, Supervisor};
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::server::{ServerId, ServerInstance};
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};

/// A command on its way to the supervisor task, with the slot for its reply
pub(crate) struct Envelope {
    pub(crate) command: Command,
    pub(crate) reply: oneshot::Sender<Result<Reply>>,
}

/// Cloneable handle to an in-process supervisor task.
///
/// Obtained from [`ProcessSupervisor::spawn`](crate::server::ProcessSupervisor::spawn).
/// Once every handle is dropped the supervisor stops taking commands and
/// exits when its last server has.
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::Sender<Envelope>,
    events: EventBus,
}

impl SupervisorHandle {
    pub(crate) fn new(commands: mpsc::Sender<Envelope>, events: EventBus) -> Self {
        Self { commands, events }
    }

    /// Send a command and wait for its reply.
    ///
    /// # Errors
    ///
    /// Whatever the command itself fails with, or [`Error::Communication`] if
    /// the supervisor task is gone.
    pub async fn execute(&self, command: Command) -> Result<Reply> {
        let (reply, response) = oneshot::channel();

        self.commands
            .send(Envelope { command, reply })
            .await
            .map_err(|_| Error::Communication("Supervisor is not running".to_string()))?;

        response
            .await
            .map_err(|_| Error::Communication("Supervisor dropped the command".to_string()))?
    }

    /// The bus events are published on
    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

#[async_trait]
impl Supervisor for SupervisorHandle {
    async fn start(&self, config: ServerConfig) -> Result<ServerInstance> {
        self.execute(Command::Start(config)).await?.into_instance()
    }

    async fn stop(&self, id: ServerId) -> Result<()> {
        self.execute(Command::Stop(id)).await?.into_stopped()
    }

    async fn status(&self, id: ServerId) -> Result<ServerInstance> {
        self.execute(Command::GetStatus(id)).await?.into_instance()
    }

    async fn memory(&self) -> Result<MemoryInfo> {
        self.execute(Command::GetMemory).await?.into_memory()
    }

    async fn instances(&self) -> Result<Vec<ServerInstance>> {
        self.execute(Command::ListInstances).await?.into_instances()
    }

    fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }
}
