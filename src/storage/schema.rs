//! Database schema definitions and versioning.
//!
//! All table definitions are compile-time constants to ensure consistency
//! between reads and writes. Secondary indexes are modeled as redb
//! multimaps or unique single-value tables depending on cardinality.
//!
//! # Schema Versioning
//!
//! The schema version is stored in the metadata table. When opening an
//! existing database, we check the version and refuse to open on mismatch.
//! Migration support is out of scope (§1 Non-goals).
//!
//! # Table Layout
//!
//! ```text
//! metadata                     &str                -> DatabaseMetadata (bincode)
//! nodes                        NodeId bytes         -> Node (bincode, no embedding)
//! nodes_by_content_hash        &str (hash)          -> NodeId bytes          [unique]
//! nodes_by_created_at          timestamp_be+NodeId  -> ()                    [multimap]
//! embeddings                   NodeId bytes         -> raw f32 LE bytes
//! tags                         TagId bytes          -> Tag (bincode)
//! tags_by_name                 &str                 -> TagId bytes          [unique]
//! node_tags                    node_id+tag_id bytes -> NodeTag (bincode)
//! node_tags_by_node            NodeId bytes         -> TagId bytes          [multimap]
//! node_tags_by_tag             TagId bytes          -> NodeId bytes         [multimap]
//! robots                       RobotId bytes        -> Robot (bincode)
//! robots_by_name               &str                 -> RobotId bytes        [unique]
//! robot_nodes                  robot_id+node_id     -> RobotNode (bincode)
//! robot_nodes_by_robot         RobotId bytes        -> NodeId bytes         [multimap]
//! robot_nodes_by_node          NodeId bytes         -> RobotId bytes        [multimap]
//! file_sources                 FileSourceId bytes   -> FileSource (bincode)
//! file_sources_by_path         &str                 -> FileSourceId bytes   [unique]
//! ```

use redb::{MultimapTableDefinition, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingDimension;
use crate::types::Timestamp;

/// Current schema version. The store refuses to open a database whose
/// recorded version differs from this constant.
pub const SCHEMA_VERSION: u32 = 1;

// ============================================================================
// Primary tables
// ============================================================================

/// Database-wide metadata: schema version, embedding dimension, timestamps.
pub const METADATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");

/// Nodes, keyed by their 16-byte UUID. Embedding is stored separately.
pub const NODES_TABLE: TableDefinition<&[u8; 16], &[u8]> = TableDefinition::new("nodes");

/// Unique index: content hash → node id, enforcing the dedup invariant
/// across both active and soft-deleted rows.
pub const NODES_BY_CONTENT_HASH_TABLE: TableDefinition<&str, &[u8; 16]> =
    TableDefinition::new("nodes_by_content_hash");

/// Recency index: `[created_at_be: 8][node_id: 16]` → empty. Supports
/// "most recent nodes" scans without a full table walk.
pub const NODES_BY_CREATED_AT_TABLE: MultimapTableDefinition<&[u8; 24], &[u8; 0]> =
    MultimapTableDefinition::new("nodes_by_created_at");

/// Embedding vectors, stored as raw little-endian f32 bytes, keyed by node id.
pub const EMBEDDINGS_TABLE: TableDefinition<&[u8; 16], &[u8]> = TableDefinition::new("embeddings");

/// Tags, keyed by their 16-byte UUID.
pub const TAGS_TABLE: TableDefinition<&[u8; 16], &[u8]> = TableDefinition::new("tags");

/// Unique index: tag name → tag id.
pub const TAGS_BY_NAME_TABLE: TableDefinition<&str, &[u8; 16]> =
    TableDefinition::new("tags_by_name");

/// Node-tag links, keyed by `[node_id: 16][tag_id: 16]` = 32 bytes.
pub const NODE_TAGS_TABLE: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("node_tags");

/// Index: node id → tag ids linked to it.
pub const NODE_TAGS_BY_NODE_TABLE: MultimapTableDefinition<&[u8; 16], &[u8; 16]> =
    MultimapTableDefinition::new("node_tags_by_node");

/// Index: tag id → node ids linked to it. Used by tag-boost intersection
/// during hybrid recall.
pub const NODE_TAGS_BY_TAG_TABLE: MultimapTableDefinition<&[u8; 16], &[u8; 16]> =
    MultimapTableDefinition::new("node_tags_by_tag");

/// Robots, keyed by their 16-byte UUID.
pub const ROBOTS_TABLE: TableDefinition<&[u8; 16], &[u8]> = TableDefinition::new("robots");

/// Unique index: robot name → robot id.
pub const ROBOTS_BY_NAME_TABLE: TableDefinition<&str, &[u8; 16]> =
    TableDefinition::new("robots_by_name");

/// RobotNode links, keyed by `[robot_id: 16][node_id: 16]` = 32 bytes.
pub const ROBOT_NODES_TABLE: TableDefinition<&[u8; 32], &[u8]> =
    TableDefinition::new("robot_nodes");

/// Index: robot id → node ids it has remembered.
pub const ROBOT_NODES_BY_ROBOT_TABLE: MultimapTableDefinition<&[u8; 16], &[u8; 16]> =
    MultimapTableDefinition::new("robot_nodes_by_robot");

/// Index: node id → robots that have remembered it.
pub const ROBOT_NODES_BY_NODE_TABLE: MultimapTableDefinition<&[u8; 16], &[u8; 16]> =
    MultimapTableDefinition::new("robot_nodes_by_node");

/// File sources, keyed by their 16-byte UUID.
pub const FILE_SOURCES_TABLE: TableDefinition<&[u8; 16], &[u8]> =
    TableDefinition::new("file_sources");

/// Unique index: absolute file path → file source id.
pub const FILE_SOURCES_BY_PATH_TABLE: TableDefinition<&str, &[u8; 16]> =
    TableDefinition::new("file_sources_by_path");

// ============================================================================
// Database Metadata
// ============================================================================

/// Database metadata stored under the fixed key `"db_metadata"`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    /// Schema version for compatibility checking.
    pub schema_version: u32,
    /// Embedding dimension configured for this database. Immutable once set.
    pub embedding_dimension: EmbeddingDimension,
    /// Creation time of the database file.
    pub created_at: Timestamp,
    /// Last time the database was opened.
    pub last_opened_at: Timestamp,
}

/// Fixed metadata-table key under which [`DatabaseMetadata`] is stored.
pub const METADATA_KEY: &str = "db_metadata";

impl DatabaseMetadata {
    /// Creates metadata for a freshly initialized database.
    pub fn new(embedding_dimension: EmbeddingDimension) -> Self {
        let now = Timestamp::now();
        Self {
            schema_version: SCHEMA_VERSION,
            embedding_dimension,
            created_at: now,
            last_opened_at: now,
        }
    }

    /// Updates `last_opened_at` to now.
    pub fn touch(&mut self) {
        self.last_opened_at = Timestamp::now();
    }

    /// True if this metadata's schema version matches the binary's.
    pub fn is_compatible(&self) -> bool {
        self.schema_version == SCHEMA_VERSION
    }
}

// ============================================================================
// Key Encoding Helpers
// ============================================================================

/// Encodes a `(created_at, node_id)` pair as a sortable 24-byte key.
///
/// Big-endian timestamp bytes make lexicographic key order match
/// chronological order.
#[inline]
pub fn encode_created_at_key(created_at: Timestamp, node_id: &[u8; 16]) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..8].copy_from_slice(&created_at.to_be_bytes());
    key[8..24].copy_from_slice(node_id);
    key
}

/// Decodes the node id suffix of a recency-index key.
#[inline]
pub fn decode_node_id_from_created_at_key(key: &[u8; 24]) -> [u8; 16] {
    let mut id = [0u8; 16];
    id.copy_from_slice(&key[8..24]);
    id
}

/// Encodes a composite `(a, b)` 16+16-byte link-table key.
#[inline]
pub fn encode_link_key(a: &[u8; 16], b: &[u8; 16]) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..16].copy_from_slice(a);
    key[16..].copy_from_slice(b);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_version_is_one() {
        assert_eq!(SCHEMA_VERSION, 1);
    }

    #[test]
    fn database_metadata_round_trip() {
        let meta = DatabaseMetadata::new(EmbeddingDimension::D768);
        let bytes = bincode::serialize(&meta).unwrap();
        let restored: DatabaseMetadata = bincode::deserialize(&bytes).unwrap();
        assert_eq!(meta.schema_version, restored.schema_version);
        assert_eq!(meta.embedding_dimension, restored.embedding_dimension);
        assert!(restored.is_compatible());
    }

    #[test]
    fn touch_advances_last_opened_at() {
        let mut meta = DatabaseMetadata::new(EmbeddingDimension::D384);
        let original = meta.last_opened_at;
        std::thread::sleep(std::time::Duration::from_millis(1));
        meta.touch();
        assert!(meta.last_opened_at > original);
    }

    #[test]
    fn created_at_key_ordering_matches_timestamp_ordering() {
        let node_id = [7u8; 16];
        let k1 = encode_created_at_key(Timestamp::from_millis(1000), &node_id);
        let k2 = encode_created_at_key(Timestamp::from_millis(2000), &node_id);
        assert!(k1 < k2);
        assert_eq!(decode_node_id_from_created_at_key(&k1), node_id);
    }

    #[test]
    fn link_key_encoding_is_order_sensitive() {
        let a = [1u8; 16];
        let b = [2u8; 16];
        assert_ne!(encode_link_key(&a, &b), encode_link_key(&b, &a));
    }
}
