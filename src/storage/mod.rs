//! Storage layer abstractions.
//!
//! This module provides a trait-based abstraction over the storage engine,
//! so that the domain layer never depends on redb directly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Memory facade                         │
//! │                            │                                 │
//! │                            ▼                                 │
//! │                 ┌─────────────────────┐                      │
//! │                 │    MemoryStore      │  ← Trait             │
//! │                 └─────────────────────┘                      │
//! │                       ▲         ▲                             │
//! │                       │         │                             │
//! │            ┌─────────┴─┐   ┌───┴─────────┐                  │
//! │            │ RedbStore │   │ MockStore   │                  │
//! │            └───────────┘   └─────────────┘                  │
//! │              (prod)           (test)                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod redb_store;
pub mod schema;

pub use redb_store::RedbStore;
pub use schema::{DatabaseMetadata, SCHEMA_VERSION};

use std::path::Path;

use crate::config::Config;
use crate::error::Result;
use crate::file_source::FileSource;
use crate::node::{NewNode, Node};
use crate::robot::{Robot, RobotNode};
use crate::tag::Tag;
use crate::types::{FileSourceId, NodeId, RobotId, TagId};

/// Storage engine trait. The primary implementation is [`RedbStore`]; tests
/// may provide their own for isolation from the filesystem.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the engine handles its own
/// internal synchronization so the memory facade can be shared via `Arc`.
pub trait MemoryStore: Send + Sync {
    // -- Lifecycle -----------------------------------------------------

    /// Returns the database metadata (schema version, embedding dimension).
    fn metadata(&self) -> &DatabaseMetadata;

    /// Closes the store, flushing pending writes. Consumes the store.
    fn close(self: Box<Self>) -> Result<()>;

    /// Path to the database file, if the backend is file-based.
    fn path(&self) -> Option<&Path>;

    // -- Node operations (§4.1) -----------------------------------------

    /// Inserts a brand-new node row. Callers must have already resolved
    /// content-hash dedup via [`MemoryStore::find_by_content_hash`]; this
    /// method does not check for an existing row.
    fn insert_node(&self, node: &Node) -> Result<()>;

    /// Retrieves a node by id. Soft-deleted rows are included only if
    /// `include_deleted` is true.
    fn get_node(&self, id: NodeId, include_deleted: bool) -> Result<Option<Node>>;

    /// Finds a node by its content hash, across active and (optionally)
    /// soft-deleted rows, for dedup resolution.
    fn find_by_content_hash(&self, hash: &str, include_deleted: bool) -> Result<Option<Node>>;

    /// Sets `deleted_at` on a node and cascades to its NodeTag and
    /// RobotNode links. Returns `false` if the node does not exist or is
    /// already soft-deleted.
    fn soft_delete_node(&self, id: NodeId) -> Result<bool>;

    /// Clears `deleted_at` on a node and its cascaded links. Returns `false`
    /// if the node does not exist or is not soft-deleted.
    fn restore_node(&self, id: NodeId) -> Result<bool>;

    /// Physically removes a node and all rows that reference it (NodeTag,
    /// RobotNode, embedding). Returns `false` if the node does not exist.
    fn hard_delete_node(&self, id: NodeId) -> Result<bool>;

    /// Updates `updated_at` and `last_accessed`; used after field mutations
    /// that are not a full node rewrite.
    fn touch_last_accessed(&self, id: NodeId) -> Result<()>;

    /// Saves an embedding vector, recording its dimension on the node.
    fn save_embedding(&self, id: NodeId, embedding: &[f32]) -> Result<bool>;

    /// Retrieves an embedding vector by node id.
    fn get_embedding(&self, id: NodeId) -> Result<Option<Vec<f32>>>;

    /// Lists all active (non-deleted) node ids, for rebuilding derived
    /// indexes (vector, full-text) on startup.
    fn list_active_node_ids(&self) -> Result<Vec<NodeId>>;

    /// Returns the most recently created node ids, newest first.
    fn recent_node_ids(&self, limit: usize) -> Result<Vec<NodeId>>;

    // -- Tag operations (§3, §4.1) ---------------------------------------

    /// Finds a tag by exact name, or creates it if absent. Idempotent.
    fn find_or_create_tag(&self, name: &str) -> Result<TagId>;

    /// Looks up a tag by exact name without creating it.
    fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// Attaches the given tag names to a node, materializing every ancestor
    /// prefix per the ancestor-closure invariant. Idempotent: attaching the
    /// same set twice is a no-op the second time.
    fn attach_tags(&self, node_id: NodeId, tag_names: &[String]) -> Result<()>;

    /// Lists the tags currently linked to a node (ancestor tags included).
    fn tags_for_node(&self, node_id: NodeId) -> Result<Vec<Tag>>;

    /// Lists the active node ids linked to a tag, used by tag-boost
    /// intersection during hybrid recall.
    fn nodes_for_tag(&self, tag_id: TagId) -> Result<Vec<NodeId>>;

    /// Returns up to `limit` of the most recently created tag names, used
    /// as the bounded ontology snapshot passed to the tag-extraction
    /// provider (§4.4).
    fn recent_tag_names(&self, limit: usize) -> Result<Vec<String>>;

    // -- Robot operations (§3) -------------------------------------------

    /// Finds a robot by exact name, or creates it if absent.
    fn find_or_create_robot(&self, name: &str) -> Result<RobotId>;

    /// Retrieves a robot by id.
    fn get_robot(&self, id: RobotId) -> Result<Option<Robot>>;

    /// Removes a robot's identity and its RobotNode links. Does not touch
    /// the nodes themselves.
    fn delete_robot(&self, id: RobotId) -> Result<bool>;

    /// Links a robot to a node, creating a new RobotNode with
    /// `remember_count = 1` or reinforcing an existing one.
    fn link_robot_node(&self, robot_id: RobotId, node_id: NodeId) -> Result<RobotNode>;

    /// Retrieves the RobotNode link for a (robot, node) pair, if any.
    fn get_robot_node(&self, robot_id: RobotId, node_id: NodeId) -> Result<Option<RobotNode>>;

    /// Sets the `working_memory` flag on a RobotNode link.
    fn set_working_memory_flag(&self, robot_id: RobotId, node_id: NodeId, value: bool) -> Result<()>;

    /// Lists the robot ids that have remembered a node.
    fn robots_for_node(&self, node_id: NodeId) -> Result<Vec<RobotId>>;

    // -- FileSource operations (§3, collaborator boundary) ---------------

    /// Saves (or overwrites) a file source record.
    fn save_file_source(&self, source: &FileSource) -> Result<()>;

    /// Retrieves a file source by id.
    fn get_file_source(&self, id: FileSourceId) -> Result<Option<FileSource>>;

    /// Retrieves a file source by its unique absolute path.
    fn get_file_source_by_path(&self, path: &str) -> Result<Option<FileSource>>;
}

/// Opens a [`RedbStore`] at the given path. Convenience wrapper; use
/// `RedbStore::open` directly for backend-specific options.
pub fn open_store(path: impl AsRef<Path>, config: &Config) -> Result<Box<dyn MemoryStore>> {
    let store = RedbStore::open(path, config)?;
    Ok(Box::new(store))
}

/// Builds a [`NewNode`]-shaped insertion path usable by tests without
/// constructing a full [`Node`] by hand.
#[cfg(test)]
pub(crate) fn test_new_node(content: &str) -> NewNode {
    NewNode {
        content: content.to_string(),
        token_count: content.split_whitespace().count() as u32,
        ..Default::default()
    }
}
