//! The Node entity: the atomic, immutable unit of memory.
//!
//! A node is created once by `Remember` and thereafter only touched by
//! enrichment writes (embedding, tags), `last_accessed` bumps on retrieval,
//! and soft delete/restore. Physical mutation of `content` never happens.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, ValidationError};
use crate::types::{FileSourceId, NodeId, Timestamp, MAX_EMBEDDING_DIMENSION};

/// Maximum content size, in bytes (§3: "≤ 1 MB").
pub const MAX_CONTENT_SIZE: usize = 1024 * 1024;

/// A reserved metadata key marking a node as a standalone proposition rather
/// than a raw excerpt.
pub const METADATA_KEY_IS_PROPOSITION: &str = "is_proposition";

/// A reserved metadata key linking a derived node back to the node it was
/// derived from.
pub const METADATA_KEY_SOURCE_NODE_ID: &str = "source_node_id";

/// The atomic unit of memory (§3).
///
/// The embedding vector itself is not a field here — it is stored separately
/// (see [`crate::storage::MemoryStore::save_embedding`]) so that the hot,
/// frequently-read node record stays compact. `embedding_dimension` records
/// whether and at what width an embedding exists.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    /// Unique, time-ordered identifier.
    pub id: NodeId,
    /// UTF-8 content, non-empty, at most [`MAX_CONTENT_SIZE`] bytes.
    pub content: String,
    /// Hex-encoded SHA-256 of the normalized content. Unique across all rows,
    /// including soft-deleted ones.
    pub content_hash: String,
    /// Token count as computed by the injected tokenizer at write time.
    pub token_count: u32,
    /// Dimension of the stored embedding, if one has been computed.
    pub embedding_dimension: Option<u32>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last time any field (other than `last_accessed`) changed.
    pub updated_at: Timestamp,
    /// Last time this node was returned by a recall.
    pub last_accessed: Timestamp,
    /// Soft-delete marker. `None` means active.
    pub deleted_at: Option<Timestamp>,
    /// Free-form key-value metadata. See [`METADATA_KEY_IS_PROPOSITION`] and
    /// [`METADATA_KEY_SOURCE_NODE_ID`] for reserved keys.
    pub metadata: HashMap<String, String>,
    /// The external file source this node was loaded from, if any.
    pub source_id: Option<FileSourceId>,
    /// Ordering position within `source_id`'s chunk sequence.
    pub chunk_position: Option<u32>,
}

impl Node {
    /// True if this node has not been soft-deleted.
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// True if an embedding has been computed for this node.
    pub fn has_embedding(&self) -> bool {
        self.embedding_dimension.is_some()
    }
}

/// Input to create a new node, prior to content-hash computation and
/// enrichment.
#[derive(Clone, Debug, Default)]
pub struct NewNode {
    /// Raw content, as supplied by the caller.
    pub content: String,
    /// Token count computed by the caller's tokenizer.
    pub token_count: u32,
    /// Initial metadata.
    pub metadata: HashMap<String, String>,
    /// External source linkage, for content loaded via `LoadExternalContent`.
    pub source_id: Option<FileSourceId>,
    /// Chunk ordering, for content loaded via `LoadExternalContent`.
    pub chunk_position: Option<u32>,
}

/// Validates a `NewNode` and computes its normalized content hash.
///
/// Returns `Validation` if content is empty or exceeds [`MAX_CONTENT_SIZE`].
pub fn validate_and_hash(new_node: &NewNode) -> Result<String> {
    if new_node.content.trim().is_empty() {
        return Err(ValidationError::required_field("content").into());
    }
    if new_node.content.len() > MAX_CONTENT_SIZE {
        return Err(ValidationError::content_too_large(new_node.content.len(), MAX_CONTENT_SIZE).into());
    }
    Ok(content_hash(&new_node.content))
}

/// Normalizes content for hashing: trims trailing whitespace, normalizes
/// line endings to `\n`, and otherwise preserves bytes verbatim (§4.1).
pub fn normalize_content(content: &str) -> String {
    let normalized_newlines = content.replace("\r\n", "\n").replace('\r', "\n");
    normalized_newlines.trim_end().to_string()
}

/// Computes the hex-encoded SHA-256 hash of the normalized content.
pub fn content_hash(content: &str) -> String {
    let normalized = normalize_content(content);
    let digest = Sha256::digest(normalized.as_bytes());
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(out, "{byte:02x}").expect("writing to a String never fails");
    }
    out
}

/// Validates an embedding vector's dimension against the `[1, 2000]` bound
/// declared in §3, independent of any particular configured dimension.
pub fn validate_embedding_dimension(dimension: usize) -> Result<()> {
    if dimension == 0 || dimension > MAX_EMBEDDING_DIMENSION {
        return Err(ValidationError::dimension_mismatch(MAX_EMBEDDING_DIMENSION, dimension).into());
    }
    Ok(())
}
