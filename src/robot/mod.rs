//! Robot identity and the RobotNode provenance link.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{NodeId, RobotId, Timestamp};

/// An agent identity participating in the memory service (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Robot {
    /// Unique identifier.
    pub id: RobotId,
    /// Non-empty name, unique per logical scope.
    pub name: String,
    /// Free-form metadata.
    pub metadata: HashMap<String, String>,
    /// Creation time.
    pub created_at: Timestamp,
}

impl Robot {
    /// Creates a new robot with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RobotId::new(),
            name: name.into(),
            metadata: HashMap::new(),
            created_at: Timestamp::now(),
        }
    }
}

/// Per-robot "remember" provenance for a node (§3).
///
/// Nodes are logically shared and not owned by any single robot; this link
/// table records which robots have remembered a node and how often.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RobotNode {
    /// The robot.
    pub robot_id: RobotId,
    /// The node.
    pub node_id: NodeId,
    /// Number of times this robot has called `Remember` with content
    /// resolving to this node. At least 1.
    pub remember_count: u32,
    /// First time this robot remembered this node.
    pub first_remembered_at: Timestamp,
    /// Most recent time this robot remembered this node.
    pub last_remembered_at: Timestamp,
    /// Whether this node is currently in this robot's working memory.
    pub working_memory: bool,
    /// Soft-delete marker, cascaded from the node's own soft delete.
    pub deleted_at: Option<Timestamp>,
}

impl RobotNode {
    /// Creates the first link between a robot and a node.
    pub fn new(robot_id: RobotId, node_id: NodeId) -> Self {
        let now = Timestamp::now();
        Self {
            robot_id,
            node_id,
            remember_count: 1,
            first_remembered_at: now,
            last_remembered_at: now,
            working_memory: false,
            deleted_at: None,
        }
    }

    /// Records another `Remember` call by the same robot for the same node.
    pub fn reinforce(&mut self) {
        self.remember_count = self.remember_count.saturating_add(1);
        self.last_remembered_at = Timestamp::now();
    }
}
