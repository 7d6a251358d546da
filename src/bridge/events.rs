//! Event distribution for supervised servers.
//!
//! The supervisor publishes every [`ServerEvent`] on one broadcast channel.
//! Subscribers only see events published after they subscribed, and a
//! subscriber that falls behind by more than the channel capacity loses the
//! oldest events and is told how many it missed.
//!
//! The supervisor publishes exactly one `started` and one `stopped` event per
//! instance, but a lagging subscriber may be among those that lose them. An
//! [`instance_events`] stream therefore ends as soon as it lags, since it
//! can no longer tell whether its `stopped` event was dropped.

use crate::bridge::ServerEvent;
use crate::server::ServerId;
use futures::Stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Multicast channel of server events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Get a new receiver for events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to every current subscriber.
    ///
    /// Returns how many subscribers it reached. Publishing with no
    /// subscribers is not an error: the event is simply dropped.
    pub fn publish(&self, event: ServerEvent) -> usize {
        match self.sender.send(event) {
            Ok(count) => count,
            Err(broadcast::error::SendError(event)) => {
                tracing::trace!(instance = %event.id(), "No subscribers for server event");
                0
            }
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Events of one instance, starting now.
    ///
    /// Subscribe before starting the instance to be sure of seeing its
    /// `started` event. See [`instance_events`].
    pub fn instance_events(&self, id: ServerId) -> impl Stream<Item = ServerEvent> + use<> {
        instance_events(self.subscribe(), id)
    }
}

/// Events of instance `id` read from `receiver`.
///
/// The stream ends right after the instance's `stopped` event, when the bus
/// closes, or when the receiver lags. A stream that ends without `stopped`
/// has lost events.
pub fn instance_events(
    mut receiver: broadcast::Receiver<ServerEvent>,
    id: ServerId,
) -> impl Stream<Item = ServerEvent> {
    async_stream::stream! {
        loop {
            match receiver.recv().await {
                Ok(event) if event.id() == id => {
                    let last = event.is_stopped();
                    yield event;
                    if last {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(instance = %id, missed, "Event subscriber fell behind, ending instance stream");
                    break;
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{LogLevel, LogRecord};
    use futures::StreamExt;

    fn message(pid: u32, text: &str) -> ServerEvent {
        ServerEvent::Message {
            id: ServerId::from_pid(pid),
            record: LogRecord::new("src", LogLevel::Info, text),
        }
    }

    fn stopped(pid: u32) -> ServerEvent {
        ServerEvent::Stopped {
            id: ServerId::from_pid(pid),
            exit_code: Some(0),
            signal: None,
            expected: true,
        }
    }

    #[tokio::test]
    async fn test_instance_stream_filters_and_ends() {
        let bus = EventBus::new(16);
        let stream = bus.instance_events(ServerId::from_pid(1));

        bus.publish(message(1, "a"));
        bus.publish(message(2, "other"));
        bus.publish(stopped(1));
        bus.publish(message(1, "after"));

        let events: Vec<ServerEvent> = stream.collect().await;
        assert_eq!(events, vec![message(1, "a"), stopped(1)]);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        assert_eq!(bus.publish(message(1, "lost")), 0);

        let mut receiver = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.publish(message(1, "seen")), 1);
        assert_eq!(receiver.recv().await.unwrap(), message(1, "seen"));
    }

    #[tokio::test]
    async fn test_instance_stream_ends_when_lagging() {
        let bus = EventBus::new(2);
        let stream = bus.instance_events(ServerId::from_pid(1));

        for n in 0..4 {
            bus.publish(message(1, &n.to_string()));
        }
        bus.publish(stopped(1));

        let events: Vec<ServerEvent> = stream.collect().await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_lagging_subscriber_is_told() {
        let bus = EventBus::new(2);
        let mut receiver = bus.subscribe();
        for n in 0..5 {
            bus.publish(message(1, &n.to_string()));
        }

        assert!(matches!(receiver.recv().await, Err(RecvError::Lagged(3))));
        assert_eq!(receiver.recv().await.unwrap(), message(1, "3"));
    }
}
