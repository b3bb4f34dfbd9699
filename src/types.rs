//! Core identifier and scalar types shared across the crate.
//!
//! Follows one pattern throughout: a thin newtype around `uuid::Uuid` (v7,
//! time-ordered) for every entity, plus a millisecond-precision [`Timestamp`]
//! used for both storage keys (big-endian bytes preserve lexicographic order)
//! and in-memory comparisons.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new time-ordered identifier (UUID v7).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// The nil identifier, used as a sentinel / default placeholder.
            pub fn nil() -> Self {
                Self(Uuid::nil())
            }

            /// Returns the raw 16-byte representation, used as a storage key.
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Reconstructs an identifier from its raw 16-byte representation.
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::nil()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

uuid_id!(NodeId, "Identifies a single memory [`crate::node::Node`].");
uuid_id!(TagId, "Identifies a [`crate::tag::Tag`] in the shared ontology.");
uuid_id!(RobotId, "Identifies a robot (agent) identity.");
uuid_id!(FileSourceId, "Identifies an external file-source collaborator.");

/// Unix-epoch millisecond timestamp.
///
/// Stored big-endian in index keys so that lexicographic byte ordering
/// matches chronological ordering.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Returns the current wall-clock time.
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        Self(millis)
    }

    /// Builds a timestamp from raw milliseconds since the Unix epoch.
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the raw milliseconds since the Unix epoch.
    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Big-endian byte encoding for use in sort-ordered storage keys.
    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Returns a timestamp `duration` in the past relative to now.
    pub fn ago(duration: std::time::Duration) -> Self {
        Self(Self::now().0 - duration.as_millis() as i64)
    }

    /// Adds a duration, returning a new timestamp.
    pub fn plus(&self, duration: std::time::Duration) -> Self {
        Self(self.0 + duration.as_millis() as i64)
    }

    /// Subtracts a duration, returning a new timestamp.
    pub fn minus(&self, duration: std::time::Duration) -> Self {
        Self(self.0 - duration.as_millis() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// A dense embedding vector. Dimension is bounded to `[1, 2000]` (§3).
pub type Embedding = Vec<f32>;

/// Maximum permitted embedding dimension, per the data model invariant.
pub const MAX_EMBEDDING_DIMENSION: usize = 2000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique_and_time_ordered() {
        let a = NodeId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = NodeId::new();
        assert_ne!(a, b);
        // UUID v7 embeds a millisecond timestamp, so byte order tracks creation order.
        assert!(a.as_bytes() < b.as_bytes());
    }

    #[test]
    fn nil_is_default() {
        assert_eq!(NodeId::nil(), NodeId::default());
        assert_eq!(NodeId::nil().as_bytes(), &[0u8; 16]);
    }

    #[test]
    fn bytes_roundtrip() {
        let id = TagId::new();
        let restored = TagId::from_bytes(*id.as_bytes());
        assert_eq!(id, restored);
    }

    #[test]
    fn display_matches_uuid_string() {
        let id = RobotId::new();
        let s = id.to_string();
        assert_eq!(s.len(), 36);
    }

    #[test]
    fn bincode_roundtrip() {
        let id = FileSourceId::new();
        let bytes = bincode::serialize(&id).unwrap();
        let restored: FileSourceId = bincode::deserialize(&bytes).unwrap();
        assert_eq!(id, restored);
    }

    #[test]
    fn timestamp_ordering_and_bytes() {
        let t1 = Timestamp::from_millis(1000);
        let t2 = Timestamp::from_millis(2000);
        assert!(t1 < t2);
        assert!(t1.to_be_bytes() < t2.to_be_bytes());
    }

    #[test]
    fn timestamp_arithmetic() {
        let t = Timestamp::from_millis(10_000);
        let later = t.plus(std::time::Duration::from_secs(5));
        assert_eq!(later.as_millis(), 15_000);
        let earlier = t.minus(std::time::Duration::from_secs(5));
        assert_eq!(earlier.as_millis(), 5_000);
    }
}
