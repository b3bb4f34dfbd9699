//! Channel payload (§4.6 "Payload encoding"): a small self-describing
//! record every group member publishes and consumes.

use serde::{Deserialize, Serialize};

use crate::types::{NodeId, RobotId, Timestamp};

/// The three event kinds a channel payload can carry (§4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A node was added to the group's shared working memory.
    Added,
    /// A node was evicted from the group's shared working memory.
    Evicted,
    /// The entire working-memory view was cleared.
    Cleared,
}

/// A single channel notification (§4.6 "Payload encoding").
///
/// All payloads are idempotent: a receiver that re-applies the same payload
/// twice, or applies payloads out of cross-producer order, ends up in the
/// same state, since receivers re-read authoritative state on conflict.
///
/// `Serialize`/`Deserialize` support the `sync-postgres` channel, which
/// carries payloads as the JSON text of a `NOTIFY` message.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Payload {
    /// Which kind of change occurred.
    pub event: Event,
    /// The node the event concerns. Ignored for `Cleared`.
    pub node_id: NodeId,
    /// The robot that originated the change, for origin suppression.
    pub origin_robot_id: RobotId,
    /// When the originator applied the change.
    pub ts: Timestamp,
}

impl Payload {
    /// Builds an `added` payload.
    pub fn added(node_id: NodeId, origin_robot_id: RobotId) -> Self {
        Self {
            event: Event::Added,
            node_id,
            origin_robot_id,
            ts: Timestamp::now(),
        }
    }

    /// Builds an `evicted` payload.
    pub fn evicted(node_id: NodeId, origin_robot_id: RobotId) -> Self {
        Self {
            event: Event::Evicted,
            node_id,
            origin_robot_id,
            ts: Timestamp::now(),
        }
    }

    /// Builds a `cleared` payload.
    pub fn cleared(origin_robot_id: RobotId) -> Self {
        Self {
            event: Event::Cleared,
            node_id: NodeId::nil(),
            origin_robot_id,
            ts: Timestamp::now(),
        }
    }

    /// True if this payload originated from `robot_id` itself (§4.6 "Origin
    /// suppression" — the originator already applied the change locally).
    pub fn is_from(&self, robot_id: RobotId) -> bool {
        self.origin_robot_id == robot_id
    }
}

/// Sanitizes a group name into a channel name (§4.6 "Channel naming"):
/// lowercases and replaces every non-alphanumeric character with `_`.
pub fn channel_name(group_name: &str) -> String {
    let sanitized: String = group_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("wm_{sanitized}")
}
