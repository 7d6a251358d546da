//! Server supervision for Tomcat Runner.
//!
//! This module launches application servers, follows their console output
//! and tracks each instance through its status machine.
//!
//! # Components
//!
//! * `status` - The per-instance status machine
//! * `process` - Instance identity and the launch/stop command lines
//! * `registry` - Instances keyed by process id
//! * `lifecycle` - Startup success/failure detection
//! * `monitor` - Per-process tasks that drain output and report exit
//! * `supervisor` - The task that owns all of the above
//!
//! # Examples
//!
//! ```no_run
//! use tomcat_runner::config::{ServerConfig, SupervisorConfig};
//! use tomcat_runner::server::ProcessSupervisor;
//! use tomcat_runner::{ServerEvent, Supervisor};
//!
//! # async fn run() -> tomcat_runner::Result<()> {
//! let supervisor = ProcessSupervisor::spawn(SupervisorConfig::default());
//! let mut events = supervisor.subscribe();
//!
//! let instance = supervisor.start(ServerConfig::new("dev", "/opt/tomcat7")).await?;
//! while let Ok(event) = events.recv().await {
//!     if let ServerEvent::Started { id, success, .. } = event {
//!         if id == instance.id {
//!             println!("dev started: {}", success);
//!             break;
//!         }
//!     }
//! }
//!
//! supervisor.stop(instance.id).await?;
//! # Ok(())
//! # }
//! ```

mod lifecycle;
pub(crate) mod monitor;
mod process;
mod registry;
mod status;
mod supervisor;

pub use lifecycle::{STARTUP_MARKER, StartupOutcome, detect_startup};
pub use process::{Action, LaunchCommand, ServerId};
pub use registry::{InstanceRegistry, ServerInstance};
pub use status::{ServerStatus, Transition};
pub use supervisor::{ProcessSupervisor, memory_info};
