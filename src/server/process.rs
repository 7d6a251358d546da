use crate::config::ServerConfig;
use crate::error::{Error, Result};
use async_process::{Child, Command, Stdio};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identity of a server instance: the OS process id of its launch process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(u32);

impl ServerId {
    /// Wrap a raw process id
    pub fn from_pid(pid: u32) -> Self {
        Self(pid)
    }

    /// The raw process id
    pub fn pid(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Argument passed to the launch script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Run the server in the foreground
    Run,
    /// Ask a running server to shut down
    Stop,
}

impl Action {
    fn as_arg(self) -> &'static str {
        match self {
            Action::Run => "run",
            Action::Stop => "stop",
        }
    }
}

/// Fully resolved command line for one script invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    /// Program to execute
    pub program: String,
    /// Arguments for the program
    pub args: Vec<String>,
    /// Working directory
    pub current_dir: PathBuf,
}

impl LaunchCommand {
    /// Build the command for `action` on this host.
    ///
    /// Windows hosts go through `cmd /c bin\<script>.bat`, everything else
    /// through `sh ./bin/<script>.sh`.
    pub fn for_action(config: &ServerConfig, action: Action) -> Self {
        let (program, args) = if cfg!(windows) {
            (
                "cmd",
                vec![
                    "/c".to_string(),
                    format!("bin\\{}.bat", config.script),
                    action.as_arg().to_string(),
                ],
            )
        } else {
            (
                "sh",
                vec![
                    format!("./bin/{}.sh", config.script),
                    action.as_arg().to_string(),
                ],
            )
        };

        Self {
            program: program.to_string(),
            args,
            current_dir: config.path.clone(),
        }
    }

    /// Spawn the command with stdout and stderr piped.
    ///
    /// The child inherits the environment of this process and gets no stdin.
    pub fn spawn(&self) -> Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.current_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::Spawn(format!(
                    "{} {} in {}: {}",
                    self.program,
                    self.args.join(" "),
                    self.current_dir.display(),
                    e
                ))
            })
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.program, self.args.join(" "))
    }
}
