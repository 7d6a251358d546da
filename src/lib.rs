/*!
 # Tomcat Runner

 A Rust library for running Apache Tomcat (and similar `catalina`-scripted
 application servers) as supervised child processes.

 ## Overview

 Tomcat Runner provides functionality to:
 - Start and stop servers through their `bin/catalina` scripts
 - Follow each server through `starting`, `running`, `stopping`, `stopped`
   and `failed`
 - Turn the console output into classified `INFO`/`SEVERE` log records
 - Publish `started`, `message` and `stopped` events to any number of subscribers
 - Drive a supervisor that lives in another process over a JSON-lines bridge

 ## Basic Usage

 ```no_run
 use tomcat_runner::{ServerEvent, TomcatRunner, Result};

 #[tokio::main]
 async fn main() -> Result<()> {
     // Create a runner from the manager's config file
     let runner = TomcatRunner::from_config_file(".tomcat-manager.json")?;

     // Subscribe before starting so no event is missed
     let mut events = runner.subscribe();
     let instance = runner.start_server("dev").await?;

     while let Ok(event) = events.recv().await {
         match event {
             ServerEvent::Started { id, success, .. } if id == instance.id => {
                 println!("dev is up: {}", success);
             }
             ServerEvent::Message { record, .. } => println!("{}", record),
             ServerEvent::Stopped { id, .. } if id == instance.id => break,
             _ => {}
         }
     }

     Ok(())
 }
 ```

 ## Features

 - **Log Classification**: Entry-boundary aware parsing of Tomcat console output
 - **Process Supervision**: One task owns every instance, no locks
 - **Event Streams**: Broadcast subscriptions and per-instance streams
 - **Remote Supervision**: The `tomcat-worker` binary serves the bridge on stdin/stdout
 - **Configuration**: JSON or YAML configuration files
*/

pub mod bridge;
pub mod config;
pub mod error;
pub mod log;
pub mod server;

pub use bridge::{
    Command, EventBus, MemoryInfo, RemoteSupervisor, Reply, ServerEvent, Supervisor,
    SupervisorHandle,
};
pub use config::{Config, ServerConfig};
pub use error::{Error, Result};
pub use log::{LogLevel, LogRecord};
pub use server::{ProcessSupervisor, ServerId, ServerInstance, ServerStatus};

use config::{validate_config, validate_server_config};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::broadcast;

fn aggregate_errors<K: std::fmt::Display>(action: &str, mut errors: Vec<(K, Error)>) -> Error {
    if errors.len() == 1 {
        return errors.remove(0).1;
    }

    let error_msg = errors
        .iter()
        .map(|(key, e)| format!("{}: {}", key, e))
        .collect::<Vec<_>>()
        .join("; ");
    Error::Other(format!("Multiple servers failed to {}: {}", action, error_msg))
}

/// Configure and run Tomcat servers by name
///
/// This struct is the main entry point for managing configured servers. It
/// resolves names through the [`Config`] and hands the work to a
/// [`Supervisor`]: by default an in-process one, but any implementation
/// (such as a [`RemoteSupervisor`]) can be plugged in with
/// [`TomcatRunner::with_supervisor`].
/// All public methods are instrumented with `tracing` spans.
pub struct TomcatRunner<S = SupervisorHandle> {
    /// Configuration
    config: Config,
    /// Supervisor doing the work
    supervisor: S,
}

impl TomcatRunner<SupervisorHandle> {
    /// Create a new runner from a configuration file path
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(path), fields(config_path = ?path.as_ref()))]
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        tracing::info!("Loading configuration from file");
        let config = Config::from_file(path)?;
        Self::new(config)
    }

    /// Create a new runner from a JSON configuration string
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(config))]
    pub fn from_config_str(config: &str) -> Result<Self> {
        tracing::info!("Loading configuration from string");
        let config = Config::parse_from_str(config)?;
        Self::new(config)
    }

    /// Create a new runner with an in-process supervisor.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(config), fields(num_servers = config.servers.len()))]
    pub fn new(config: Config) -> Result<Self> {
        validate_config(&config)?;
        tracing::info!("Creating new TomcatRunner");
        let supervisor = ProcessSupervisor::spawn(config.supervisor.clone());
        Ok(Self { config, supervisor })
    }
}

impl<S: Supervisor> TomcatRunner<S> {
    /// Create a runner that delegates to `supervisor`
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(config, supervisor), fields(num_servers = config.servers.len()))]
    pub fn with_supervisor(config: Config, supervisor: S) -> Result<Self> {
        validate_config(&config)?;
        Ok(Self { config, supervisor })
    }

    /// The configuration servers are resolved from
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The supervisor doing the work
    pub fn supervisor(&self) -> &S {
        &self.supervisor
    }

    /// Receive events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.supervisor.subscribe()
    }

    /// Start a configured server
    ///
    /// Returns the instance in `starting`; the startup outcome arrives as a
    /// `started` event.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_name = %name))]
    pub async fn start_server(&self, name: &str) -> Result<ServerInstance> {
        let server = self.config.server_config(name)?;
        validate_server_config(&server)?;

        let instance = self.supervisor.start(server).await?;
        tracing::info!(server_id = %instance.id, "Server starting");
        Ok(instance)
    }

    /// Start all configured servers
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn start_all_servers(&self) -> Result<Vec<ServerInstance>> {
        let server_names = self.config.server_names();
        tracing::info!(servers_to_start = ?server_names, "Starting all configured servers");

        let mut instances = Vec::new();
        let mut errors = Vec::new();

        for name in server_names {
            match self.start_server(&name).await {
                Ok(instance) => instances.push(instance),
                Err(e) => {
                    tracing::error!(server_name = %name, error = %e, "Failed to start server");
                    errors.push((name, e));
                }
            }
        }

        if !errors.is_empty() {
            tracing::warn!(num_failed = errors.len(), "Some servers failed to start");
            return Err(aggregate_errors("start", errors));
        }

        tracing::info!(num_started = instances.len(), "Finished starting all servers");
        Ok(instances)
    }

    /// Current instance of a configured server, if any
    ///
    /// A failed instance whose process hasn't exited yet can coexist with a
    /// newer one; the instance that is starting, running or stopping wins.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_name = %name))]
    pub async fn instance(&self, name: &str) -> Result<Option<ServerInstance>> {
        if !self.config.servers.contains_key(name) {
            return Err(Error::ServerNotFound(name.to_string()));
        }

        let mut instances: Vec<ServerInstance> = self
            .supervisor
            .instances()
            .await?
            .into_iter()
            .filter(|instance| instance.name() == name)
            .collect();
        instances.sort_by_key(|instance| !instance.status.is_active());
        Ok(instances.into_iter().next())
    }

    /// Stop a configured server
    ///
    /// Stopping a server with no instance, or one that exited while the
    /// request was in flight, only logs a warning.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_name = %name))]
    pub async fn stop_server(&self, name: &str) -> Result<()> {
        let Some(instance) = self.instance(name).await? else {
            tracing::warn!("Server is not running");
            return Ok(());
        };

        match self.supervisor.stop(instance.id).await {
            Err(e) if e.is_recoverable() => {
                tracing::warn!(server_id = %instance.id, error = %e, "Server went away before it could be stopped");
                Ok(())
            }
            result => result,
        }
    }

    /// Stop every running instance
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn stop_all_servers(&self) -> Result<()> {
        let instances = self.supervisor.instances().await?;
        tracing::info!(num_instances = instances.len(), "Stopping all servers");

        let mut errors = Vec::new();
        for instance in instances {
            match self.supervisor.stop(instance.id).await {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    tracing::debug!(server_id = %instance.id, "Server already gone");
                }
                Err(e) => {
                    tracing::error!(server_id = %instance.id, error = %e, "Failed to stop server");
                    errors.push((instance.config.name, e));
                }
            }
        }

        if errors.is_empty() {
            tracing::info!("All servers asked to stop");
            Ok(())
        } else {
            tracing::warn!(error_count = errors.len(), "Some servers failed to stop");
            Err(aggregate_errors("stop", errors))
        }
    }

    /// Status of a configured server
    ///
    /// A server with no instance is `ready`.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_name = %name))]
    pub async fn server_status(&self, name: &str) -> Result<ServerStatus> {
        Ok(self
            .instance(name)
            .await?
            .map(|instance| instance.status)
            .unwrap_or(ServerStatus::Ready))
    }

    /// Status of every configured server
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn get_all_server_statuses(&self) -> Result<HashMap<String, ServerStatus>> {
        let mut statuses: HashMap<String, ServerStatus> = self
            .config
            .servers
            .keys()
            .map(|name| (name.clone(), ServerStatus::Ready))
            .collect();

        for instance in self.supervisor.instances().await? {
            if let Some(status) = statuses.get_mut(instance.name()) {
                if instance.status.is_active() || !status.is_active() {
                    *status = instance.status;
                }
            }
        }

        Ok(statuses)
    }

    /// Host memory
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn memory(&self) -> Result<MemoryInfo> {
        self.supervisor.memory().await
    }
}
