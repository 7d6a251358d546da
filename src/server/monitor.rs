use crate::log::{LogClassifier, LogRecord, chunk_stream};
use crate::server::ServerId;
use async_process::Child;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// What a monitor task reports back to the supervisor
#[derive(Debug)]
pub(crate) enum MonitorMessage {
    /// A classified record from one of the instance's processes
    Record { id: ServerId, record: LogRecord },
    /// The server process exited after its output was drained
    Exited {
        id: ServerId,
        exit_code: Option<i32>,
        signal: Option<String>,
    },
    /// The stop helper of an instance exited and its output was drained
    HelperFinished { id: ServerId },
    /// A stop request ran past its timeout
    StopTimedOut { id: ServerId },
}

#[derive(Debug, Clone, Copy)]
enum Pipe {
    Stdout = 0,
    Stderr = 1,
}

enum Next {
    Chunk(Pipe, Vec<u8>),
    Idle,
    End,
}

type Output = stream::Select<BoxStream<'static, (Pipe, Vec<u8>)>, BoxStream<'static, (Pipe, Vec<u8>)>>;

fn merged_output(child: &mut Child) -> Output {
    let stdout = match child.stdout.take() {
        Some(pipe) => chunk_stream(pipe).map(|chunk| (Pipe::Stdout, chunk)).boxed(),
        None => stream::empty().boxed(),
    };
    let stderr = match child.stderr.take() {
        Some(pipe) => chunk_stream(pipe).map(|chunk| (Pipe::Stderr, chunk)).boxed(),
        None => stream::empty().boxed(),
    };
    stream::select(stdout, stderr)
}

async fn next_chunk(output: &mut Output, idle_flush: Option<Duration>) -> Next {
    let next = match idle_flush {
        Some(period) => match tokio::time::timeout(period, output.next()).await {
            Ok(next) => next,
            Err(_) => return Next::Idle,
        },
        None => output.next().await,
    };

    match next {
        Some((pipe, chunk)) => Next::Chunk(pipe, chunk),
        None => Next::End,
    }
}

/// Forwards records to the supervisor. Returns false once the supervisor is gone.
async fn forward(
    tx: &mpsc::Sender<MonitorMessage>,
    id: ServerId,
    records: Vec<LogRecord>,
) -> bool {
    for record in records {
        if tx.send(MonitorMessage::Record { id, record }).await.is_err() {
            tracing::debug!(instance = %id, "Supervisor closed, dropping server output");
            return false;
        }
    }
    true
}

/// Drains both pipes through a classifier each until EOF.
///
/// Stdout and stderr are classified separately so entries from one pipe never
/// split entries from the other. Firing `kill` kills the child; draining
/// then continues until the pipes close.
async fn drain_output(
    id: ServerId,
    child: &mut Child,
    tx: &mpsc::Sender<MonitorMessage>,
    kill: Option<oneshot::Receiver<()>>,
    idle_flush: Option<Duration>,
) {
    let (mut kill, mut armed) = match kill {
        Some(kill) => (kill, true),
        None => (oneshot::channel().1, false),
    };
    let mut output = merged_output(child);
    let mut classifiers = [LogClassifier::new(), LogClassifier::new()];

    loop {
        // Only wait for quiet output while there is something to flush.
        let flush_after = idle_flush.filter(|_| {
            classifiers
                .iter()
                .any(|classifier| !classifier.pending().is_empty())
        });
        let next = tokio::select! {
            next = next_chunk(&mut output, flush_after) => next,
            fired = &mut kill, if armed => {
                armed = false;
                if fired.is_ok() {
                    tracing::warn!(instance = %id, "Killing process");
                    if let Err(e) = child.kill() {
                        tracing::error!(instance = %id, error = %e, "Failed to kill process");
                    }
                }
                continue;
            }
        };

        let records = match next {
            Next::Chunk(pipe, chunk) => classifiers[pipe as usize].feed(&chunk),
            Next::Idle => classifiers
                .iter_mut()
                .flat_map(|classifier| classifier.flush_pending())
                .collect(),
            Next::End => break,
        };

        if !forward(tx, id, records).await {
            return;
        }
    }

    for classifier in classifiers {
        if !forward(tx, id, classifier.finish()).await {
            return;
        }
    }
}

fn exit_details(status: &ExitStatus) -> (Option<i32>, Option<String>) {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        (status.code(), status.signal().map(signal_name))
    }
    #[cfg(not(unix))]
    {
        (status.code(), None)
    }
}

#[cfg(unix)]
fn signal_name(signo: i32) -> String {
    nix::sys::signal::Signal::try_from(signo)
        .map(|signal| signal.as_str().to_string())
        .unwrap_or_else(|_| signo.to_string())
}

/// Watch a server process until it exits.
///
/// Every classified record is sent as [`MonitorMessage::Record`]; once both
/// pipes have closed the exit status is awaited and sent as
/// [`MonitorMessage::Exited`]. Nothing is sent after that.
pub(crate) fn spawn_server_monitor(
    id: ServerId,
    mut child: Child,
    tx: mpsc::Sender<MonitorMessage>,
    kill: oneshot::Receiver<()>,
    idle_flush: Option<Duration>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!(instance = %id, "Monitoring server output");
        drain_output(id, &mut child, &tx, Some(kill), idle_flush).await;

        let (exit_code, signal) = match child.status().await {
            Ok(status) => exit_details(&status),
            Err(e) => {
                tracing::warn!(instance = %id, error = %e, "Failed to read server exit status");
                (None, None)
            }
        };

        if tx
            .send(MonitorMessage::Exited {
                id,
                exit_code,
                signal,
            })
            .await
            .is_err()
        {
            tracing::debug!(instance = %id, "Supervisor closed before server exit was reported");
        }
    })
}

/// Watch the stop helper of `target`.
///
/// The helper's output is reported as records of the target instance, then
/// [`MonitorMessage::HelperFinished`] is sent. The helper's own exit status
/// only gets logged: the target's exit is what ends the instance.
pub(crate) fn spawn_stop_helper_monitor(
    target: ServerId,
    mut helper: Child,
    tx: mpsc::Sender<MonitorMessage>,
    kill: oneshot::Receiver<()>,
    idle_flush: Option<Duration>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        drain_output(target, &mut helper, &tx, Some(kill), idle_flush).await;

        match helper.status().await {
            Ok(status) if status.success() => {
                tracing::debug!(instance = %target, "Stop helper finished");
            }
            Ok(status) => {
                let (code, signal) = exit_details(&status);
                tracing::warn!(instance = %target, ?code, ?signal, "Stop helper exited with failure");
            }
            Err(e) => {
                tracing::warn!(instance = %target, error = %e, "Failed to read stop helper exit status");
            }
        }

        let _ = tx.send(MonitorMessage::HelperFinished { id: target }).await;
    })
}

/// Ask the supervisor to force-kill `id` after `timeout`.
pub(crate) fn spawn_stop_timer(
    id: ServerId,
    timeout: Duration,
    tx: mpsc::Sender<MonitorMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let _ = tx.send(MonitorMessage::StopTimedOut { id }).await;
    })
}
