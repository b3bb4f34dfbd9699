//! The pub/sub channel abstraction (§4.6 "Channel protocol").
//!
//! A channel is keyed by the group's sanitized name. [`InProcessChannel`] is
//! the default, dependency-free backend (an in-process broadcast, used for
//! single-process deployments and for tests). The `sync-postgres` feature
//! adds [`postgres::PostgresChannel`], layered over `LISTEN`/`NOTIFY`, for
//! real multi-process deployments.

#[cfg(feature = "sync-postgres")]
pub mod postgres;

use std::sync::Mutex;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::Result;

use super::payload::Payload;

/// A pub/sub channel for one group's working-memory deltas (§4.6).
///
/// Delivery is at-most-once per listener per notify (§4.6 "Delivery
/// semantics"); callers must tolerate lost notifications via periodic
/// reconciliation, not rely on the channel alone.
pub trait Channel: Send + Sync {
    /// Publishes a payload to every current subscriber.
    fn publish(&self, payload: Payload) -> Result<()>;

    /// Registers a new listener, returning a receiver of future payloads.
    /// Payloads published before this call are not replayed.
    fn subscribe(&self) -> Receiver<Payload>;

    /// The sanitized channel name this instance is bound to.
    fn name(&self) -> &str;
}

/// Dependency-free broadcast channel for single-process deployments and
/// tests: every subscriber gets its own `crossbeam_channel` receiver, and
/// `publish` fans a clone of the payload out to each.
pub struct InProcessChannel {
    name: String,
    subscribers: Mutex<Vec<Sender<Payload>>>,
}

impl InProcessChannel {
    /// Creates a new channel for the given (already-sanitized) name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl Channel for InProcessChannel {
    fn publish(&self, payload: Payload) -> Result<()> {
        let mut subscribers = self.subscribers.lock().expect("channel subscriber lock poisoned");
        subscribers.retain(|sender| sender.send(payload).is_ok());
        Ok(())
    }

    fn subscribe(&self) -> Receiver<Payload> {
        let (sender, receiver) = unbounded();
        self.subscribers
            .lock()
            .expect("channel subscriber lock poisoned")
            .push(sender);
        receiver
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeId, RobotId};
    use std::time::Duration;

    #[test]
    fn subscribers_receive_published_payloads() {
        let channel = InProcessChannel::new("wm_test");
        let receiver = channel.subscribe();
        let payload = Payload::added(NodeId::new(), RobotId::new());
        channel.publish(payload).unwrap();
        let received = receiver.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(received.node_id, payload.node_id);
    }

    #[test]
    fn multiple_subscribers_all_receive() {
        let channel = InProcessChannel::new("wm_test");
        let a = channel.subscribe();
        let b = channel.subscribe();
        channel.publish(Payload::cleared(RobotId::new())).unwrap();
        assert!(a.recv_timeout(Duration::from_millis(100)).is_ok());
        assert!(b.recv_timeout(Duration::from_millis(100)).is_ok());
    }

    #[test]
    fn dropped_subscriber_is_pruned_on_next_publish() {
        let channel = InProcessChannel::new("wm_test");
        {
            let _receiver = channel.subscribe();
        }
        channel.publish(Payload::cleared(RobotId::new())).unwrap();
        assert_eq!(
            channel
                .subscribers
                .lock()
                .unwrap()
                .len(),
            0
        );
    }
}
