//! The Tag entity: nodes of the shared hierarchical ontology.
//!
//! Tag names are colon-separated hierarchies (`database:postgresql:hnsw`).
//! The ancestor-closure invariant (§3) requires that every prefix of a valid
//! tag name is itself a materialized, linked tag; the helpers here compute
//! those prefixes so that callers (principally
//! [`crate::storage::MemoryStore::attach_tags`]) can maintain the invariant
//! transactionally.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::types::{NodeId, TagId, Timestamp};

/// A node of the shared tag ontology (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tag {
    /// Unique identifier.
    pub id: TagId,
    /// Lowercase, colon-separated hierarchical name. Unique.
    pub name: String,
    /// Creation time.
    pub created_at: Timestamp,
}

impl Tag {
    /// Number of colon-separated segments in this tag's name.
    pub fn depth(&self) -> usize {
        segment_count(&self.name)
    }
}

/// A link between a [`crate::node::Node`] and a [`Tag`] (§3).
///
/// Unique on `(node_id, tag_id)`. Soft-deleted in lockstep with the node it
/// links, never independently.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeTag {
    /// The linked node.
    pub node_id: NodeId,
    /// The linked tag.
    pub tag_id: TagId,
    /// When this link was created.
    pub created_at: Timestamp,
    /// Soft-delete marker, cascaded from the node.
    pub deleted_at: Option<Timestamp>,
}

impl NodeTag {
    /// Creates a new, active link.
    pub fn new(node_id: NodeId, tag_id: TagId) -> Self {
        Self {
            node_id,
            tag_id,
            created_at: Timestamp::now(),
            deleted_at: None,
        }
    }
}

/// Returns the number of colon-separated segments in a tag name.
pub fn segment_count(name: &str) -> usize {
    name.split(':').count()
}

/// Validates a tag name against the `[a-z0-9-]+(:[a-z0-9-]+)*` pattern (§3).
pub fn validate_tag_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ValidationError::InvalidTagName(name.to_string()).into());
    }
    let valid = name
        .split(':')
        .all(|segment| !segment.is_empty() && segment.chars().all(is_tag_char));
    if !valid {
        return Err(ValidationError::InvalidTagName(name.to_string()).into());
    }
    Ok(())
}

fn is_tag_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'
}

/// Returns every ancestor prefix of a hierarchical tag name, from the
/// shallowest to the name itself.
///
/// `ancestor_prefixes("a:b:c")` returns `["a", "a:b", "a:b:c"]`. The
/// ancestor-closure invariant requires every one of these to be a
/// materialized `Tag` linked to the same node.
pub fn ancestor_prefixes(name: &str) -> Vec<String> {
    let segments: Vec<&str> = name.split(':').collect();
    let mut prefixes = Vec::with_capacity(segments.len());
    for i in 1..=segments.len() {
        prefixes.push(segments[..i].join(":"));
    }
    prefixes
}

/// Singularizes the trailing segment of a tag name (`users` → `user`).
///
/// Extremely conservative: only strips a trailing `s` when the segment is
/// longer than 3 characters and does not end in `ss`. This is a guardrail
/// applied to upstream tag-extractor output (§4.4), not a general English
/// stemmer.
pub fn singularize_segment(segment: &str) -> String {
    if segment.len() > 3 && segment.ends_with('s') && !segment.ends_with("ss") {
        segment[..segment.len() - 1].to_string()
    } else {
        segment.to_string()
    }
}

/// Applies [`singularize_segment`] to every segment of a hierarchical name.
pub fn singularize(name: &str) -> String {
    name.split(':')
        .map(singularize_segment)
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_simple_and_hierarchical_names() {
        assert!(validate_tag_name("database").is_ok());
        assert!(validate_tag_name("database:postgresql").is_ok());
        assert!(validate_tag_name("database:postgresql:hnsw").is_ok());
        assert!(validate_tag_name("multi-word-tag").is_ok());
    }

    #[test]
    fn validate_rejects_uppercase_and_empty_segments() {
        assert!(validate_tag_name("Database").is_err());
        assert!(validate_tag_name("").is_err());
        assert!(validate_tag_name("a::b").is_err());
        assert!(validate_tag_name(":a").is_err());
        assert!(validate_tag_name("a:").is_err());
    }

    #[test]
    fn validate_rejects_non_alphanumeric() {
        assert!(validate_tag_name("a_b").is_err());
        assert!(validate_tag_name("a b").is_err());
    }

    #[test]
    fn ancestor_prefixes_of_leaf_tag() {
        assert_eq!(
            ancestor_prefixes("a:b:c"),
            vec!["a".to_string(), "a:b".to_string(), "a:b:c".to_string()]
        );
    }

    #[test]
    fn ancestor_prefixes_of_root_tag() {
        assert_eq!(ancestor_prefixes("database"), vec!["database".to_string()]);
    }

    #[test]
    fn depth_counts_segments() {
        let tag = Tag {
            id: TagId::new(),
            name: "database:postgresql:hnsw".to_string(),
            created_at: Timestamp::now(),
        };
        assert_eq!(tag.depth(), 3);
    }

    #[test]
    fn singularize_strips_trailing_s() {
        assert_eq!(singularize_segment("users"), "user");
        assert_eq!(singularize_segment("frameworks"), "framework");
    }

    #[test]
    fn singularize_leaves_short_or_double_s_segments() {
        assert_eq!(singularize_segment("css"), "css");
        assert_eq!(singularize_segment("bus"), "bus");
    }

    #[test]
    fn singularize_applies_per_segment() {
        assert_eq!(singularize("users:frameworks"), "user:framework");
    }
}
