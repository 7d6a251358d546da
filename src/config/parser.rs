use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Launch script used when an application server doesn't name one.
pub const DEFAULT_SCRIPT: &str = "catalina";

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Default capacity of the supervisor's command queue.
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

/// Default quiet period after which a buffered log entry is emitted.
pub const DEFAULT_IDLE_FLUSH_MS: u64 = 250;

fn default_script() -> String {
    DEFAULT_SCRIPT.to_string()
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

fn default_command_capacity() -> usize {
    DEFAULT_COMMAND_CAPACITY
}

fn default_idle_flush_ms() -> Option<u64> {
    Some(DEFAULT_IDLE_FLUSH_MS)
}

/// An application-server installation that servers run on.
///
/// The supervisor launches `bin/<script>.sh` (or `bin\<script>.bat` on
/// Windows) from `path`.
///
/// # Examples
///
/// ```
/// use tomcat_runner::config::AppServerConfig;
///
/// let app_server: AppServerConfig =
///     serde_json::from_str(r#"{ "path": "/opt/tomcat7" }"#).unwrap();
/// assert_eq!(app_server.script, "catalina");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppServerConfig {
    /// Installation directory, used as the working directory of the server.
    pub path: PathBuf,

    /// Base name of the start/stop script under `bin/`.
    #[serde(default = "default_script")]
    pub script: String,

    /// Any other settings recorded for this installation.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A server entry as it appears in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEntry {
    /// Name of the [`AppServerConfig`] this server runs on.
    #[serde(rename = "AppServer")]
    pub app_server: String,

    /// Any other settings recorded for this server.
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

/// Resolved descriptor of a server, as handed to the supervisor.
///
/// This is immutable once built: the supervisor only ever reads it.
///
/// # Examples
///
/// ```
/// use tomcat_runner::config::ServerConfig;
///
/// let config = ServerConfig::new("dev", "/opt/tomcat7").with_script("tomcat");
/// assert_eq!(config.script, "tomcat");
/// assert!(config.app_server.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Configured server name. At most one instance per name may be active.
    pub name: String,

    /// Working directory the launch and stop scripts run in.
    pub path: PathBuf,

    /// Base name of the launch script under `bin/`.
    #[serde(default = "default_script")]
    pub script: String,

    /// Application server entry this descriptor was resolved from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_server: Option<String>,

    /// Extra settings carried through untouched.
    #[serde(default)]
    pub settings: Map<String, Value>,
}

impl ServerConfig {
    /// Create a descriptor using the default launch script
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            script: default_script(),
            app_server: None,
            settings: Map::new(),
        }
    }

    /// Use a different launch script
    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = script.into();
        self
    }
}

/// Settings for the supervisor task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorConfig {
    /// Events buffered per subscriber before it starts lagging.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Commands queued before callers wait.
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,

    /// Kill a server this long after a stop request if it hasn't exited.
    /// Unset means a stop waits for the server indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_timeout_ms: Option<u64>,

    /// Emit a buffered log entry after the output has been quiet this long.
    ///
    /// Tomcat's last startup line is otherwise only closed by the next log
    /// entry. `null` turns the flush off, so entries wait for the next
    /// boundary or end of stream.
    #[serde(default = "default_idle_flush_ms")]
    pub idle_flush_ms: Option<u64>,
}

impl SupervisorConfig {
    /// Stop timeout as a duration
    pub fn stop_timeout(&self) -> Option<Duration> {
        self.stop_timeout_ms.map(Duration::from_millis)
    }

    /// Idle flush interval as a duration
    pub fn idle_flush(&self) -> Option<Duration> {
        self.idle_flush_ms.map(Duration::from_millis)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            stop_timeout_ms: None,
            idle_flush_ms: default_idle_flush_ms(),
        }
    }
}

/// Main configuration for the Tomcat Runner.
///
/// # JSON Schema
///
/// ```json
/// {
///   "Servers": {
///     "dev": { "AppServer": "tomcat7", "contextPath": "/app" }
///   },
///   "AppServers": {
///     "tomcat7": { "path": "/opt/tomcat7" }
///   },
///   "Supervisor": { "stopTimeoutMs": 30000 }
/// }
/// ```
///
/// # Examples
///
/// ```
/// use tomcat_runner::config::Config;
///
/// let config = Config::parse_from_str(r#"{
///     "Servers": { "dev": { "AppServer": "tomcat7" } },
///     "AppServers": { "tomcat7": { "path": "/opt/tomcat7" } }
/// }"#).unwrap();
///
/// let server = config.server_config("dev").unwrap();
/// assert_eq!(server.path.to_str(), Some("/opt/tomcat7"));
/// assert_eq!(server.app_server.as_deref(), Some("tomcat7"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Map of server names to their entries.
    #[serde(rename = "Servers", default)]
    pub servers: HashMap<String, ServerEntry>,

    /// Map of application-server names to installations.
    #[serde(rename = "AppServers", default)]
    pub app_servers: HashMap<String, AppServerConfig>,

    /// Supervisor settings.
    #[serde(rename = "Supervisor", default)]
    pub supervisor: SupervisorConfig,
}

impl Config {
    /// Loads a configuration from a file path.
    ///
    /// Files ending in `.yaml` or `.yml` are read as YAML, anything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The file contents are not valid JSON/YAML
    /// * The document does not conform to the expected schema
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::parse_yaml_str(&content),
            _ => Self::parse_from_str(&content),
        }
    }

    /// Parses a configuration from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))
    }

    /// Parses a configuration from a YAML string.
    pub fn parse_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))
    }

    /// Configured server names, sorted.
    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.servers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve a server entry against its application server.
    ///
    /// # Errors
    ///
    /// * [`Error::ServerNotFound`] if no server has this name
    /// * [`Error::ConfigInvalid`] if its application server isn't defined
    pub fn server_config(&self, name: &str) -> Result<ServerConfig> {
        let entry = self
            .servers
            .get(name)
            .ok_or_else(|| Error::ServerNotFound(name.to_string()))?;

        let app_server = self.app_servers.get(&entry.app_server).ok_or_else(|| {
            Error::ConfigInvalid(format!(
                "Server '{}' references unknown app server '{}'",
                name, entry.app_server
            ))
        })?;

        Ok(ServerConfig {
            name: name.to_string(),
            path: app_server.path.clone(),
            script: app_server.script.clone(),
            app_server: Some(entry.app_server.clone()),
            settings: entry.settings.clone(),
        })
    }
}
