//! Vector index abstraction for §4.2's "Strategy: vector" and the vector
//! half of hybrid recall.
//!
//! The primary implementation wraps [`hnsw_rs`] (pure Rust HNSW). The trait
//! is keyed on [`crate::types::NodeId`] directly rather than a raw index-
//! internal id: callers never see the internal-usize <-> `NodeId` mapping,
//! only the domain type, which keeps the seam swappable for a different ANN
//! backend without leaking `HnswIndex`'s bookkeeping.
//!
//! Embeddings stored in the redb-backed [`crate::storage::MemoryStore`] are
//! the source of truth. The index itself is a derived, rebuildable
//! structure: if its persisted metadata is missing or stale, it rebuilds
//! from stored embeddings (§9 "index rebuild on open").

mod hnsw;

pub use hnsw::HnswIndex;

use std::path::Path;

use crate::error::Result;
use crate::types::NodeId;

/// Vector index trait for approximate nearest neighbor search over node
/// embeddings.
///
/// Implementations must be `Send + Sync` so the memory facade can share one
/// behind an `Arc`. Mutating methods take `&self` and use interior
/// mutability, so reads and writes can proceed concurrently while the
/// implementation serializes its own internal state.
pub trait VectorIndex: Send + Sync {
    /// Inserts a node's embedding. Implementations should be idempotent:
    /// re-inserting an id already present is a no-op rather than an error,
    /// since HNSW graphs don't support in-place vector updates.
    fn insert_node(&self, node_id: NodeId, embedding: &[f32]) -> Result<()>;

    /// Marks a node as deleted. HNSW graphs don't support point removal
    /// without breaking proximity edges other nodes rely on, so this is a
    /// soft delete: the vector stays in the graph but is excluded from
    /// search results.
    fn delete_node(&self, node_id: NodeId) -> Result<()>;

    /// Searches for the `k` nearest active (non-deleted) nodes to `query`.
    /// Returns `(NodeId, distance)` pairs sorted by distance ascending
    /// (closest first). Distance is cosine distance: 0.0 = identical,
    /// 2.0 = opposite. `ef_search` trades search recall for latency.
    fn search_nodes(&self, query: &[f32], k: usize, ef_search: usize) -> Result<Vec<(NodeId, f32)>>;

    /// True if the node is present in the index and not deleted.
    fn contains(&self, node_id: NodeId) -> bool;

    /// Number of active (non-deleted) vectors.
    fn active_count(&self) -> usize;

    /// Persists index metadata to `{dir}/{name}.hnsw.meta`.
    fn save_to_dir(&self, dir: &Path, name: &str) -> Result<()>;
}
