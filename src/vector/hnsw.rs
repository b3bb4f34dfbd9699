//! HNSW vector index implementation using hnsw_rs.
//!
//! Wraps `hnsw_rs::Hnsw<f32, DistCosine>` with a bidirectional `NodeId` <->
//! internal-`usize` id mapping (the graph itself only knows `usize`),
//! soft-delete via a `HashSet` consulted during filtered search, and JSON
//! metadata persistence for the id mapping and deleted set.
//!
//! # Thread Safety
//!
//! The `hnsw_rs::Hnsw` graph uses `parking_lot::RwLock` internally, so
//! `insert()` takes `&self`. Our metadata (`IndexState`) is protected by
//! `std::sync::RwLock`.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::RwLock;

use hnsw_rs::prelude::*;

use crate::config::HnswConfig;
use crate::error::{Result, StorageError};
use crate::types::NodeId;

use super::VectorIndex;

/// HNSW vector index backed by `hnsw_rs`.
///
/// # Persistence Strategy
///
/// Metadata (ID mappings, deleted set) is persisted to a JSON `.hnsw.meta`
/// file. The graph itself is rebuilt from stored embeddings on open, since
/// `hnsw_rs::HnswIo::load_hnsw` has lifetime constraints that create
/// self-referential struct issues.
pub struct HnswIndex {
    /// The underlying HNSW graph. Uses `'static` lifetime because all
    /// data is heap-owned (not memory-mapped).
    hnsw: Hnsw<'static, f32, DistCosine>,

    /// Mutable metadata protected by RwLock.
    state: RwLock<IndexState>,

    /// Immutable configuration, kept for save/rebuild lifecycle.
    #[allow(dead_code)]
    config: HnswConfig,

    /// Embedding dimension all inserted vectors must match.
    dimension: usize,
}

/// Internal mutable state for ID mapping and soft-deletion.
#[derive(Debug)]
struct IndexState {
    /// Forward map: `NodeId` -> internal usize ID.
    id_to_internal: HashMap<NodeId, usize>,

    /// Reverse map: internal usize ID -> `NodeId`. A `Vec` gives O(1) lookup.
    internal_to_id: Vec<NodeId>,

    /// Set of soft-deleted internal IDs, excluded from search.
    deleted: HashSet<usize>,

    /// Next internal ID to assign, monotonically increasing.
    next_id: usize,
}

/// Serializable metadata for persistence.
#[derive(serde::Serialize, serde::Deserialize)]
pub(crate) struct IndexMetadata {
    pub(crate) dimension: usize,
    pub(crate) next_id: usize,
    /// `(NodeId UUID string, internal usize ID)` pairs.
    pub(crate) id_map: Vec<(String, usize)>,
    /// Deleted `NodeId` UUID strings.
    ///
    /// Stored as UUIDs rather than internal ids because internal ids are
    /// reassigned sequentially on rebuild.
    pub(crate) deleted: Vec<String>,
}

impl HnswIndex {
    /// Creates a new empty HNSW index.
    pub fn new(dimension: usize, config: &HnswConfig) -> Self {
        let hnsw = Hnsw::new(
            config.max_nb_connection,
            config.max_elements,
            config.max_layer,
            config.ef_construction,
            DistCosine,
        );

        Self {
            hnsw,
            state: RwLock::new(IndexState {
                id_to_internal: HashMap::new(),
                internal_to_id: Vec::new(),
                deleted: HashSet::new(),
                next_id: 0,
            }),
            config: config.clone(),
            dimension,
        }
    }

    /// Inserts a node embedding into the index. Idempotent: re-inserting an
    /// id already present is a no-op.
    pub fn insert_node(&self, node_id: NodeId, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(StorageError::engine(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            ))
            .into());
        }

        let mut state = self
            .state
            .write()
            .map_err(|_| StorageError::engine("vector index state lock poisoned"))?;

        if state.id_to_internal.contains_key(&node_id) {
            return Ok(());
        }

        let internal_id = state.next_id;
        state.next_id += 1;
        state.id_to_internal.insert(node_id, internal_id);
        state.internal_to_id.push(node_id);
        drop(state);

        self.hnsw.insert((embedding, internal_id));
        Ok(())
    }

    /// Marks a node as deleted in the index. Idempotent.
    pub fn delete_node(&self, node_id: NodeId) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StorageError::engine("vector index state lock poisoned"))?;
        if let Some(&internal_id) = state.id_to_internal.get(&node_id) {
            state.deleted.insert(internal_id);
        }
        Ok(())
    }

    /// Searches for the k nearest nodes, excluding deleted ones. Returns
    /// `(NodeId, distance)` pairs sorted by distance ascending (closest
    /// first). Distance is cosine distance: 0.0 = identical, 2.0 = opposite.
    pub fn search_nodes(&self, query: &[f32], k: usize, ef_search: usize) -> Result<Vec<(NodeId, f32)>> {
        if query.len() != self.dimension {
            return Err(StorageError::engine(format!(
                "query dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            ))
            .into());
        }

        let state = self
            .state
            .read()
            .map_err(|_| StorageError::engine("vector index state lock poisoned"))?;

        let deleted_ref = &state.deleted;
        let filter_fn = |id: &usize| -> bool { !deleted_ref.contains(id) };
        let results = if state.deleted.is_empty() {
            self.hnsw.search(query, k, ef_search)
        } else {
            self.hnsw.search_filter(query, k, ef_search, Some(&filter_fn))
        };

        let mapped: Vec<(NodeId, f32)> = results
            .into_iter()
            .filter_map(|n| state.internal_to_id.get(n.d_id).map(|&id| (id, n.distance)))
            .collect();

        Ok(mapped)
    }

    /// True if the node is present in the index and not deleted.
    pub fn contains(&self, node_id: NodeId) -> bool {
        let state = self.state.read().ok();
        state.is_some_and(|s| {
            s.id_to_internal
                .get(&node_id)
                .is_some_and(|id| !s.deleted.contains(id))
        })
    }

    /// Number of active (non-deleted) vectors.
    pub fn active_count(&self) -> usize {
        let state = self.state.read().ok();
        state.map_or(0, |s| s.id_to_internal.len() - s.deleted.len())
    }

    /// Total number of vectors, including deleted.
    pub fn total_count(&self) -> usize {
        self.hnsw.get_nb_point()
    }

    /// Restores the deleted set from persisted metadata, mapping UUID
    /// strings to whatever internal ids they hold after a rebuild.
    pub fn restore_deleted_set(&self, deleted_node_ids: &[String]) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StorageError::engine("vector index state lock poisoned"))?;
        for id_str in deleted_node_ids {
            let uuid = uuid::Uuid::parse_str(id_str)
                .map_err(|e| StorageError::engine(format!("invalid UUID in deleted set: {e}")))?;
            let node_id = NodeId::from_bytes(*uuid.as_bytes());
            if let Some(&internal_id) = state.id_to_internal.get(&node_id) {
                state.deleted.insert(internal_id);
            }
        }
        Ok(())
    }

    /// Saves index metadata to `{dir}/{name}.hnsw.meta` and attempts to dump
    /// the HNSW graph for future direct-load optimization (non-fatal on
    /// failure; the graph rebuilds from stored embeddings regardless).
    pub fn save_to_dir(&self, dir: &Path, name: &str) -> Result<()> {
        fs::create_dir_all(dir)
            .map_err(|e| StorageError::engine(format!("failed to create HNSW directory: {e}")))?;

        let state = self
            .state
            .read()
            .map_err(|_| StorageError::engine("vector index state lock poisoned"))?;

        let metadata = IndexMetadata {
            dimension: self.dimension,
            next_id: state.next_id,
            id_map: state
                .id_to_internal
                .iter()
                .map(|(id, &internal_id)| (id.to_string(), internal_id))
                .collect(),
            deleted: state
                .deleted
                .iter()
                .filter_map(|&internal_id| state.internal_to_id.get(internal_id).map(|id| id.to_string()))
                .collect(),
        };

        let meta_path = dir.join(format!("{name}.hnsw.meta"));
        let json = serde_json::to_string_pretty(&metadata)
            .map_err(|e| StorageError::engine(format!("failed to serialize HNSW metadata: {e}")))?;
        fs::write(&meta_path, json)
            .map_err(|e| StorageError::engine(format!("failed to write HNSW metadata: {e}")))?;

        if state.id_to_internal.is_empty() {
            return Ok(());
        }
        drop(state);

        if let Err(e) = self.hnsw.file_dump(dir, name) {
            tracing::warn!(error = %e, "failed to dump HNSW graph, will rebuild on next open");
        }

        Ok(())
    }

    /// Loads persisted index metadata, if present.
    #[allow(dead_code)]
    pub(crate) fn load_metadata(dir: &Path, name: &str) -> Result<Option<IndexMetadata>> {
        let meta_path = dir.join(format!("{name}.hnsw.meta"));
        if !meta_path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&meta_path)
            .map_err(|e| StorageError::engine(format!("failed to read HNSW metadata: {e}")))?;
        let metadata: IndexMetadata = serde_json::from_str(&json)
            .map_err(|e| StorageError::engine(format!("failed to parse HNSW metadata: {e}")))?;

        Ok(Some(metadata))
    }

    /// Rebuilds an index from a set of embeddings loaded from the store
    /// (the source of truth) on startup.
    pub fn rebuild_from_embeddings(
        dimension: usize,
        config: &HnswConfig,
        embeddings: Vec<(NodeId, Vec<f32>)>,
    ) -> Result<Self> {
        let index = Self::new(dimension, config);

        if embeddings.is_empty() {
            return Ok(index);
        }

        let mut state = index
            .state
            .write()
            .map_err(|_| StorageError::engine("vector index state lock poisoned"))?;

        let mut batch: Vec<(&Vec<f32>, usize)> = Vec::with_capacity(embeddings.len());
        for (node_id, embedding) in &embeddings {
            let internal_id = state.next_id;
            state.next_id += 1;
            state.id_to_internal.insert(*node_id, internal_id);
            state.internal_to_id.push(*node_id);
            batch.push((embedding, internal_id));
        }
        drop(state);

        index.hnsw.parallel_insert(&batch);
        Ok(index)
    }

    /// Removes persisted HNSW files for an index name from disk.
    pub fn remove_files(dir: &Path, name: &str) -> Result<()> {
        let meta_path = dir.join(format!("{name}.hnsw.meta"));
        if meta_path.exists() {
            fs::remove_file(&meta_path)
                .map_err(|e| StorageError::engine(format!("failed to remove HNSW metadata: {e}")))?;
        }

        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let file_name = entry.file_name();
                let file_str = file_name.to_string_lossy();
                if file_str.starts_with(name) && file_str.contains("hnswdump") {
                    let _ = fs::remove_file(entry.path());
                }
            }
        }

        Ok(())
    }
}

impl VectorIndex for HnswIndex {
    fn insert_node(&self, node_id: NodeId, embedding: &[f32]) -> Result<()> {
        HnswIndex::insert_node(self, node_id, embedding)
    }

    fn delete_node(&self, node_id: NodeId) -> Result<()> {
        HnswIndex::delete_node(self, node_id)
    }

    fn search_nodes(&self, query: &[f32], k: usize, ef_search: usize) -> Result<Vec<(NodeId, f32)>> {
        HnswIndex::search_nodes(self, query, k, ef_search)
    }

    fn contains(&self, node_id: NodeId) -> bool {
        HnswIndex::contains(self, node_id)
    }

    fn active_count(&self) -> usize {
        HnswIndex::active_count(self)
    }

    fn save_to_dir(&self, dir: &Path, name: &str) -> Result<()> {
        HnswIndex::save_to_dir(self, dir, name)
    }
}
