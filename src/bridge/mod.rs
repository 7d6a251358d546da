//! Commands in, events out.
//!
//! The bridge connects callers to a supervisor that may live in the same
//! process ([`SupervisorHandle`]) or in another one ([`RemoteSupervisor`],
//! talking the JSON-lines protocol served by [`serve_connection`]). Both
//! implement [`Supervisor`], so code written against the trait doesn't care
//! which one it has.
//!
//! Every command completes exactly once, with a reply or an error. Events are
//! multicast on an [`EventBus`]; per instance they arrive as `started`, then
//! `message`s, then `stopped`, in the order the supervisor produced them.

mod events;
mod handle;
mod remote;
mod types;
mod wire;

pub use events::{EventBus, instance_events};
pub use handle::SupervisorHandle;
pub use remote::{RemoteSupervisor, serve_connection};
pub use types::{Command, MemoryInfo, Reply, ServerEvent};
pub use wire::WireMessage;

pub(crate) use handle::Envelope;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::server::{ServerId, ServerInstance};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Operations every supervisor offers
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Launch a server.
    ///
    /// Returns the instance in `starting`. Whether startup succeeds is only
    /// reported through the `started` event, so subscribe first.
    async fn start(&self, config: ServerConfig) -> Result<ServerInstance>;

    /// Ask an instance to shut down. Returns once the stop script is launched.
    async fn stop(&self, id: ServerId) -> Result<()>;

    /// Snapshot of one instance
    async fn status(&self, id: ServerId) -> Result<ServerInstance>;

    /// Host memory
    async fn memory(&self) -> Result<MemoryInfo>;

    /// Snapshots of every tracked instance
    async fn instances(&self) -> Result<Vec<ServerInstance>>;

    /// Receive events published from now on
    fn subscribe(&self) -> broadcast::Receiver<ServerEvent>;
}
