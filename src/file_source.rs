//! FileSource: the external-collaborator boundary for file loaders.
//!
//! File loaders (markdown chunking, frontmatter parsing) are explicitly out
//! of scope; this module only models the join point they write through —
//! [`crate::storage::MemoryStore::save_file_source`] and
//! [`Node::source_id`](crate::node::Node::source_id).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{FileSourceId, Timestamp};

/// An external file that has been chunked into one or more nodes (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileSource {
    /// Unique identifier.
    pub id: FileSourceId,
    /// Unique, absolute path to the source file.
    pub file_path: String,
    /// Content hash of the file as last synced.
    pub file_hash: String,
    /// Modification time as last synced, milliseconds since epoch.
    pub mtime: i64,
    /// File size in bytes as last synced.
    pub file_size: u64,
    /// Frontmatter key-value pairs extracted by the loader.
    pub frontmatter: HashMap<String, String>,
    /// Last time this source was synced into nodes.
    pub last_synced_at: Timestamp,
}

impl FileSource {
    /// True if the file has changed since it was last synced, based on the
    /// caller-supplied current hash.
    pub fn is_stale(&self, current_hash: &str) -> bool {
        self.file_hash != current_hash
    }
}
