//! # htm
//!
//! Hierarchical temporal memory for coordinating AI agent "robots" over a
//! shared, persistent, searchable knowledge base.
//!
//! `htm` gives a fleet of robots one durable store of remembered content,
//! hybrid (fulltext + vector + tag-boosted) retrieval, an async enrichment
//! pipeline that backfills embeddings and tags after the fact, and a
//! per-robot working-memory window that tracks what each robot currently has
//! "in context".
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use htm::{Memory, Config, Strategy};
//!
//! let memory = Memory::open("./htm.db", Config::default())?;
//!
//! let node_id = memory.remember(
//!     "Always validate user input before processing",
//!     None,
//!     None,
//!     "planner",
//! )?;
//!
//! let results = memory.recall(
//!     "input validation", Strategy::Hybrid, 10, None, None, Some("planner"), false,
//! )?;
//! ```
//!
//! ## Key Concepts
//!
//! ### Node
//!
//! A **node** is a unit of remembered content: text, a content hash for
//! dedup, an optional embedding, and a set of tags. Nodes are soft-deleted
//! by default ([`Memory::forget`]) and can be restored.
//!
//! ### Robot and group
//!
//! A **robot** is an agent identity that remembers and recalls content.
//! [`Memory`] serves a single process; [`group::RobotGroup`] coordinates
//! several processes sharing one store over a pub/sub channel, with active
//! and passive robot roles and failover.
//!
//! ### Embedding and tag providers
//!
//! Both are pluggable (§4.4):
//!
//! - **External** (default): the caller supplies pre-computed embeddings and
//!   tags from its own models.
//! - **Builtin**: `htm` generates embeddings with a bundled ONNX model
//!   (requires the `builtin-embeddings` feature) or extracts tags with the
//!   dependency-free heuristic extractor.
//!
//! ## Features
//!
//! - `builtin-embeddings` — enable built-in ONNX embedding generation.
//! - `sync-postgres` — enable a PostgreSQL-backed cross-process channel.
//!
//! ## Thread Safety
//!
//! `Memory` is `Send + Sync` and is meant to be shared across threads behind
//! an `Arc`. The underlying store uses MVCC for concurrent reads with
//! exclusive write transactions.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============================================================================
// Module declarations
// ============================================================================

mod config;
mod error;
mod types;

mod file_source;
mod memory;
mod node;
mod robot;
mod tag;

pub mod embedding;
pub mod fulltext;
pub mod group;
pub mod jobs;
pub mod search;
pub mod storage;
pub mod tagging;
pub mod tokenizer;

/// Vector index module for HNSW-based approximate nearest neighbor search.
pub mod vector;

/// Per-robot working-memory window, budgeted in tokens (§4.5).
pub mod working_memory;

// ============================================================================
// Public API re-exports
// ============================================================================

// Main entry point
pub use memory::{HealthCheck, Memory, HARD_DELETE_CONFIRMATION};

// Configuration
pub use config::{
    CircuitBreakerConfig, Config, EmbeddingDimension, EmbeddingProvider, HnswConfig, JobBackend,
    RetrievalConfig, TagProvider, TimeoutsConfig, WeekStart,
};

// Error handling
pub use error::{
    MemoryError, NotFoundError, Result, ServiceUnavailableError, StorageError, ValidationError,
};

// Core types
pub use types::{Embedding, FileSourceId, NodeId, RobotId, TagId, Timestamp, MAX_EMBEDDING_DIMENSION};

// Domain types
pub use file_source::FileSource;
pub use node::{NewNode, Node, MAX_CONTENT_SIZE};
pub use robot::{Robot, RobotNode};
pub use tag::{NodeTag, Tag};

// Retrieval
pub use search::{
    fulltext_recall, hybrid_recall, vector_recall, reciprocal_rank_fusion, SearchResult, Strategy,
    Timeframe,
};

// Enrichment pipeline
pub use embedding::{create_embedding_service, EmbeddingService, ExternalEmbedding};
pub use jobs::{create_job_runner, BreakerState, CircuitBreaker, EnrichmentContext, Job, JobKind, JobRunner};
pub use tagging::{create_tag_service, HeuristicTagService, TagService};
pub use tokenizer::{Tokenizer, WhitespaceTokenizer};

// Storage and derived indexes (for advanced users wiring their own Memory)
pub use fulltext::{FulltextHit, FulltextIndex};
pub use storage::{open_store, DatabaseMetadata, MemoryStore, RedbStore};
pub use vector::{HnswIndex, VectorIndex};

// Working memory
pub use working_memory::{AssembleStrategy, Entry, WorkingMemory};

// Multi-process robot groups
pub use group::{Channel, FailoverOutcome, GroupStatus, InProcessChannel, RobotGroup};

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Convenient imports for common `htm` usage.
///
/// ```rust
/// use htm::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{MemoryError, Result};
    pub use crate::memory::Memory;
    pub use crate::node::{NewNode, Node};
    pub use crate::search::{SearchResult, Strategy};
    pub use crate::types::{NodeId, RobotId, Timestamp};
}
