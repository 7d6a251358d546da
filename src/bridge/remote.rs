//! The bridge protocol over a byte stream.
//!
//! [`serve_connection`] exposes a supervisor on any reader/writer pair, such
//! as the stdin/stdout of a worker process. [`RemoteSupervisor`] is the other
//! end: it implements [`Supervisor`] by sending requests over the stream and
//! republishes the events it receives on a local [`EventBus`].

use crate::bridge::wire::{WireMessage, into_outcome};
use crate::bridge::{Command, EventBus, MemoryInfo, Reply, ServerEvent, Supervisor, SupervisorHandle};
use crate::config::{DEFAULT_EVENT_CAPACITY, ServerConfig};
use crate::error::{Error, Result};
use crate::server::{ServerId, ServerInstance};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Lines queued for the writer before senders wait.
const OUTBOUND_CAPACITY: usize = 256;

#[derive(Default)]
struct Pending {
    closed: bool,
    replies: HashMap<String, oneshot::Sender<Result<Reply>>>,
}

type PendingReplies = Arc<Mutex<Pending>>;

/// Writes queued messages in order until every sender is gone.
async fn write_messages<W>(mut writer: W, mut outbound: mpsc::Receiver<WireMessage>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outbound.recv().await {
        let line = match message.to_line() {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "Dropping message that cannot be encoded");
                continue;
            }
        };
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Communication(format!("Failed to write message: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| Error::Communication(format!("Failed to flush message: {}", e)))?;
    }
    Ok(())
}

/// Serve `handle` over one connection until the reader hits EOF.
///
/// Requests are answered in the order they arrive. Every event the supervisor
/// publishes while the connection is open is forwarded, in publication order.
/// Lines that cannot be decoded are logged and skipped.
///
/// # Examples
///
/// ```no_run
/// use tomcat_runner::bridge::serve_connection;
/// use tomcat_runner::config::SupervisorConfig;
/// use tomcat_runner::server::ProcessSupervisor;
///
/// # async fn run() -> tomcat_runner::Result<()> {
/// let handle = ProcessSupervisor::spawn(SupervisorConfig::default());
/// serve_connection(handle, tokio::io::stdin(), tokio::io::stdout()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn serve_connection<R, W>(handle: SupervisorHandle, reader: R, writer: W) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let writer_task = tokio::spawn(write_messages(writer, outbound_rx));

    let mut events = handle.events().subscribe();
    let event_tx = outbound_tx.clone();
    let forwarder = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if event_tx.send(WireMessage::Event { event }).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    // The client only sees the gap, so its instance streams
                    // can miss a stopped event.
                    tracing::warn!(missed, "Connection fell behind, events were dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(reader).lines();
    let read_result = loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => break Err(Error::Communication(format!("Failed to read request: {}", e))),
        };
        if line.trim().is_empty() {
            continue;
        }

        match WireMessage::from_line(&line) {
            Ok(WireMessage::Request { id, command }) => {
                tracing::debug!(request = %id, ?command, "Handling request");
                let outcome = handle.execute(command).await;
                if outbound_tx.send(WireMessage::response(id, outcome)).await.is_err() {
                    break Err(Error::Communication("Connection writer stopped".to_string()));
                }
            }
            Ok(_) => tracing::warn!("Ignoring a message that is not a request"),
            Err(e) => tracing::warn!(error = %e, "Ignoring malformed line"),
        }
    };

    forwarder.abort();
    let _ = forwarder.await;
    drop(outbound_tx);

    let write_result = writer_task
        .await
        .map_err(|e| Error::Other(format!("Connection writer failed: {}", e)))?;

    tracing::debug!("Connection closed");
    read_result.and(write_result)
}

/// A [`Supervisor`] living on the other end of a byte stream.
///
/// Requests are matched to responses by a random id, so any number of
/// callers can share one connection. When the connection closes, pending
/// and later requests fail with [`Error::Communication`].
pub struct RemoteSupervisor {
    outbound: mpsc::Sender<WireMessage>,
    pending: PendingReplies,
    events: EventBus,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<Result<()>>,
}

impl RemoteSupervisor {
    /// Connect over `reader`/`writer` with the default event capacity.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::with_event_capacity(reader, writer, DEFAULT_EVENT_CAPACITY)
    }

    /// Connect with a local event bus of `capacity` events per subscriber.
    pub fn with_event_capacity<R, W>(reader: R, writer: W, capacity: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let pending: PendingReplies = Arc::new(Mutex::new(Pending::default()));
        let events = EventBus::new(capacity.max(1));

        let writer_task = tokio::spawn(write_messages(writer, outbound_rx));
        let reader_task = tokio::spawn(read_messages(reader, Arc::clone(&pending), events.clone()));

        Self {
            outbound,
            pending,
            events,
            reader_task,
            writer_task,
        }
    }

    /// The local bus remote events are republished on
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Whether the connection is still being read
    pub fn is_connected(&self) -> bool {
        !self.reader_task.is_finished()
    }

    /// Send a command and wait for its reply
    pub async fn execute(&self, command: Command) -> Result<Reply> {
        let id = Uuid::new_v4().to_string();
        let (reply, response) = oneshot::channel();
        {
            let mut pending = self
                .pending
                .lock()
                .map_err(|_| Error::Other("Failed to lock pending requests".to_string()))?;
            if pending.closed {
                return Err(Error::Communication("Connection is closed".to_string()));
            }
            pending.replies.insert(id.clone(), reply);
        }

        let request = WireMessage::Request {
            id: id.clone(),
            command,
        };
        if self.outbound.send(request).await.is_err() {
            if let Ok(mut pending) = self.pending.lock() {
                pending.replies.remove(&id);
            }
            return Err(Error::Communication("Connection writer stopped".to_string()));
        }

        response
            .await
            .map_err(|_| Error::Communication("Connection closed before a response".to_string()))?
    }

    /// Stop reading and writing. Pending requests fail.
    pub async fn close(self) {
        let Self {
            outbound,
            pending,
            reader_task,
            writer_task,
            ..
        } = self;

        reader_task.abort();
        let _ = reader_task.await;
        fail_pending(&pending);

        drop(outbound);
        if let Ok(Err(e)) = writer_task.await {
            tracing::debug!(error = %e, "Connection writer failed while closing");
        }
    }
}

fn fail_pending(pending: &PendingReplies) {
    if let Ok(mut pending) = pending.lock() {
        pending.closed = true;
        for (_, reply) in pending.replies.drain() {
            let _ = reply.send(Err(Error::Communication("Connection closed".to_string())));
        }
    }
}

async fn read_messages<R>(reader: R, pending: PendingReplies, events: EventBus)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read from connection");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match WireMessage::from_line(&line) {
            Ok(WireMessage::Response { id, result, error }) => {
                let reply = pending.lock().ok().and_then(|mut pending| pending.replies.remove(&id));
                match reply {
                    Some(reply) => {
                        let _ = reply.send(into_outcome(result, error));
                    }
                    None => tracing::warn!(request = %id, "Response for an unknown request"),
                }
            }
            Ok(WireMessage::Event { event }) => {
                events.publish(event);
            }
            Ok(WireMessage::Request { .. }) => tracing::warn!("Ignoring request sent to a client"),
            Err(e) => tracing::warn!(error = %e, "Ignoring malformed line"),
        }
    }

    tracing::debug!("Connection to supervisor closed");
    fail_pending(&pending);
}

#[async_trait]
impl Supervisor for RemoteSupervisor {
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
