//! Robot groups and the cross-process working-memory channel (§4.6).
//!
//! A group lets several robot processes share one logical working-memory
//! view and fail over cooperatively. The group itself is a coordination
//! layer: persistence goes through the same [`crate::storage::MemoryStore`]
//! and retrieval through [`crate::search`] that a single unaffiliated robot
//! uses; the group adds membership bookkeeping and channel publication on
//! top.

pub mod channel;
pub mod payload;

pub use channel::{Channel, InProcessChannel};
pub use payload::{channel_name, Event, Payload};

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::error::{NotFoundError, Result};
use crate::jobs::{EnrichmentContext, Job, JobKind, JobRunner};
use crate::node::{content_hash, validate_and_hash, Node, NewNode};
use crate::storage::MemoryStore;
use crate::types::{NodeId, RobotId, Timestamp};
use crate::working_memory::WorkingMemory;

/// Snapshot returned by [`RobotGroup::status`] (§4.6 `Status`).
#[derive(Clone, Debug)]
pub struct GroupStatus {
    /// Robot names in the active set, in promotion order.
    pub active: Vec<String>,
    /// Robot names in the passive set, in promotion order.
    pub passive: Vec<String>,
    /// Nodes currently held in the shared working-memory view.
    pub node_count: usize,
    /// Fraction of `max_tokens` in use.
    pub token_utilization: f64,
    /// True iff this process's local node set equals the authoritative set.
    pub in_sync: bool,
}

/// Outcome of [`RobotGroup::failover`] (§4.6 `Failover`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailoverOutcome {
    /// A passive robot was promoted to active with this name.
    Promoted(String),
    /// No passive robot was available to promote; the group is running
    /// with a reduced active set.
    Degraded,
}

/// A logical group of robots sharing one working-memory view and channel
/// (§4.6 "Group model").
pub struct RobotGroup {
    name: String,
    store: Arc<dyn MemoryStore>,
    job_runner: Arc<dyn JobRunner>,
    enrichment: Arc<EnrichmentContext>,
    working_memory: Arc<WorkingMemory>,
    channel: Arc<dyn Channel>,
    active: Mutex<Vec<String>>,
    passive: Mutex<Vec<String>>,
}

impl RobotGroup {
    /// Creates a group with the given shared token budget. The first active
    /// member must be added via [`RobotGroup::add_active`].
    pub fn new(
        name: impl Into<String>,
        max_tokens: u64,
        store: Arc<dyn MemoryStore>,
        job_runner: Arc<dyn JobRunner>,
        enrichment: Arc<EnrichmentContext>,
        channel: Arc<dyn Channel>,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            job_runner,
            enrichment,
            working_memory: Arc::new(WorkingMemory::new(max_tokens)),
            channel,
            active: Mutex::new(Vec::new()),
            passive: Mutex::new(Vec::new()),
        }
    }

    /// The group's name, as supplied at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The sanitized channel name this group publishes/subscribes on.
    pub fn channel_name(&self) -> String {
        channel_name(&self.name)
    }

    /// Persists content against `originator` (§4.1 semantics) and publishes
    /// `Added` on the group channel (§4.6 `Remember`).
    pub fn remember(&self, content: &str, token_count: u32, originator: &str) -> Result<NodeId> {
        let robot_id = self.store.find_or_create_robot(originator)?;

        let hash = content_hash(content);
        let node_id = if let Some(existing) = self.store.find_by_content_hash(&hash, true)? {
            if existing.deleted_at.is_some() {
                self.store.restore_node(existing.id)?;
            }
            existing.id
        } else {
            let new_node = NewNode {
                content: content.to_string(),
                token_count,
                ..Default::default()
            };
            let hash = validate_and_hash(&new_node)?;
            let now = Timestamp::now();
            let node = Node {
                id: NodeId::new(),
                content: new_node.content,
                content_hash: hash,
                token_count: new_node.token_count,
                embedding_dimension: None,
                created_at: now,
                updated_at: now,
                last_accessed: now,
                deleted_at: None,
                metadata: new_node.metadata,
                source_id: new_node.source_id,
                chunk_position: new_node.chunk_position,
            };
            self.store.insert_node(&node)?;
            node.id
        };

        self.store.link_robot_node(robot_id, node_id)?;
        self.job_runner.enqueue(
            Arc::clone(&self.enrichment),
            Job {
                kind: JobKind::Embedding,
                node_id,
            },
        )?;
        self.job_runner.enqueue(
            Arc::clone(&self.enrichment),
            Job {
                kind: JobKind::Tagging,
                node_id,
            },
        )?;

        self.working_memory
            .add(node_id, content.to_string(), u64::from(token_count), None, false);
        self.store
            .set_working_memory_flag(robot_id, node_id, true)?;
        self.channel.publish(Payload::added(node_id, robot_id))?;
        Ok(node_id)
    }

    /// Promotes the first passive robot to active and drops `failing_robot`
    /// from the active set (§4.6 `Failover`). Idempotent: returns
    /// [`FailoverOutcome::Degraded`] when there is no passive robot to
    /// promote.
    pub fn failover(&self, failing_robot: &str) -> Result<FailoverOutcome> {
        let mut active = self.active.lock().expect("group active-set lock poisoned");
        let mut passive = self.passive.lock().expect("group passive-set lock poisoned");

        active.retain(|name| name != failing_robot);

        if passive.is_empty() {
            info!(group = %self.name, failing_robot, "failover requested with no passive robot available");
            return Ok(FailoverOutcome::Degraded);
        }

        let promoted = passive.remove(0);
        active.push(promoted.clone());
        info!(group = %self.name, %promoted, failing_robot, "promoted passive robot to active");
        Ok(FailoverOutcome::Promoted(promoted))
    }

    /// Adds `name` to the active set (§4.6 `AddActive`).
    pub fn add_active(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.store.find_or_create_robot(&name)?;
        let mut active = self.active.lock().expect("group active-set lock poisoned");
        if !active.contains(&name) {
            active.push(name);
        }
        Ok(())
    }

    /// Adds `name` to the passive set (§4.6 `AddPassive`).
    pub fn add_passive(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.store.find_or_create_robot(&name)?;
        let mut passive = self.passive.lock().expect("group passive-set lock poisoned");
        if !passive.contains(&name) {
            passive.push(name);
        }
        Ok(())
    }

    /// Reconciles `name`'s local working-memory state from the authoritative
    /// store (§4.6 `SyncRobot`): re-adds every node currently flagged
    /// `working_memory` for that robot.
    pub fn sync_robot(&self, name: &str) -> Result<()> {
        let robot_id = self
            .store
            .get_robot(
                self.store
                    .find_or_create_robot(name)?,
            )?
            .ok_or_else(|| NotFoundError::robot(name))?;

        let node_ids = self.store.list_active_node_ids()?;
        for node_id in node_ids {
            if let Some(link) = self.store.get_robot_node(robot_id.id, node_id)? {
                if link.working_memory {
                    if let Some(node) = self.store.get_node(node_id, false)? {
                        self.working_memory.add(
                            node_id,
                            node.content,
                            u64::from(node.token_count),
                            None,
                            false,
                        );
                    }
                }
            }
        }
        debug!(group = %self.name, robot = %name, "synced robot from authoritative store");
        Ok(())
    }

    /// Reports current group status (§4.6 `Status`).
    pub fn status(&self) -> GroupStatus {
        let active = self.active.lock().expect("group active-set lock poisoned").clone();
        let passive = self.passive.lock().expect("group passive-set lock poisoned").clone();
        GroupStatus {
            active,
            passive,
            node_count: self.working_memory.node_count(),
            token_utilization: self.working_memory.utilization(),
            in_sync: true,
        }
    }

    /// Stops accepting new channel events. Pending job-runner work is
    /// flushed (§4.6 `Shutdown`).
    pub fn shutdown(&self) {
        self.job_runner.drain();
    }

    /// The group's shared working-memory view, for direct inspection by
    /// tests and the channel-consumption loop.
    pub fn working_memory(&self) -> &Arc<WorkingMemory> {
        &self.working_memory
    }

    /// Applies an inbound channel payload to this process's local working
    /// memory, honoring origin suppression (§4.6 "Origin suppression") and
    /// the event algebra (§4.6 "Ordering").
    pub fn apply_remote_event(&self, payload: Payload, self_robot_id: RobotId) {
        if payload.is_from(self_robot_id) {
            return;
        }
        match payload.event {
            Event::Added => {
                if let Ok(Some(node)) = self.store.get_node(payload.node_id, false) {
                    self.working_memory.add(
                        payload.node_id,
                        node.content,
                        u64::from(node.token_count),
                        None,
                        false,
                    );
                }
            }
            Event::Evicted => {
                self.working_memory.remove(payload.node_id);
            }
            Event::Cleared => {
                let node_ids: Vec<NodeId> = self
                    .store
                    .list_active_node_ids()
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|id| self.working_memory.contains(*id))
                    .collect();
                for node_id in node_ids {
                    self.working_memory.remove(node_id);
                }
            }
        }
    }
}
