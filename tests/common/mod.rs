#![allow(dead_code)]

use futures::{Stream, StreamExt};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tomcat_runner::bridge::instance_events;
use tomcat_runner::{ServerConfig, ServerEvent, ServerId};

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs until `stop` creates `stop.flag`, logging like Tomcat on stderr.
pub const WELL_BEHAVED: &str = r#"
case "$1" in
  run)
    printf 'Jan 1, 2024 10:00:00 AM org.apache.catalina.startup.Catalina load\nINFO: Initialization processed in 12 ms\n' >&2
    printf 'Jan 1, 2024 10:00:01 AM org.apache.catalina.startup.Catalina start\nINFO: Server startup in 34 ms\n' >&2
    printf 'Jan 1, 2024 10:00:01 AM org.apache.coyote.AbstractProtocol start\nINFO: Starting ProtocolHandler ["http-bio-8080"]\n' >&2
    while [ ! -f stop.flag ]; do sleep 0.1; done
    rm -f stop.flag
    printf 'Jan 1, 2024 10:00:09 AM org.apache.catalina.core.StandardService stopInternal\nINFO: Stopping service Catalina\n' >&2
    exit 0
    ;;
  stop)
    echo "Using CATALINA_BASE:   $PWD"
    touch stop.flag
    ;;
esac
"#;

/// Write `bin/catalina.sh` into a fresh directory.
pub fn fake_tomcat(script: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("bin")).unwrap();
    std::fs::write(dir.path().join("bin").join("catalina.sh"), script).unwrap();
    dir
}

pub fn server_config(name: &str, dir: &TempDir) -> ServerConfig {
    ServerConfig::new(name, dir.path())
}

/// Events of `id`, failing the test if one takes too long.
pub fn events_of(
    receiver: broadcast::Receiver<ServerEvent>,
    id: ServerId,
) -> impl Stream<Item = ServerEvent> + Unpin {
    Box::pin(instance_events(receiver, id))
}

pub async fn next_event<S: Stream<Item = ServerEvent> + Unpin>(events: &mut S) -> ServerEvent {
    tokio::time::timeout(EVENT_TIMEOUT, events.next())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream ended")
}

/// Skip messages until the next `started` or `stopped` event.
pub async fn next_lifecycle_event<S: Stream<Item = ServerEvent> + Unpin>(
    events: &mut S,
) -> ServerEvent {
    loop {
        match next_event(events).await {
            ServerEvent::Message { .. } => continue,
            event => return event,
        }
    }
}

/// Everything left in the stream, up to and including `stopped`.
pub async fn drain<S: Stream<Item = ServerEvent> + Unpin>(events: S) -> Vec<ServerEvent> {
    tokio::time::timeout(EVENT_TIMEOUT, events.collect::<Vec<_>>())
        .await
        .expect("timed out waiting for the instance to stop")
}
