//! The `Memory` facade (§6): the public API a single-process, unaffiliated
//! robot uses to remember and recall content.
//!
//! [`crate::group::RobotGroup`] builds on the same storage, enrichment, and
//! retrieval primitives for multi-process coordination; `Memory` is the
//! single-process case, with one [`WorkingMemory`] per robot name that has
//! called [`Memory::remember`] or [`Memory::recall`].

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::embedding::{create_embedding_service, EmbeddingService};
use crate::error::{NotFoundError, Result, ValidationError};
use crate::fulltext::FulltextIndex;
use crate::jobs::{create_job_runner, BreakerState, EnrichmentContext, Job, JobKind, JobRunner};
use crate::node::{content_hash, validate_and_hash, NewNode, Node};
use crate::search::{fulltext_recall, hybrid_recall, vector_recall, SearchResult, Strategy, Timeframe};
use crate::storage::{open_store, MemoryStore};
use crate::tagging::{create_tag_service, TagService};
use crate::tokenizer::{Tokenizer, WhitespaceTokenizer};
use crate::types::{FileSourceId, NodeId, Timestamp};
use crate::vector::HnswIndex;
use crate::working_memory::WorkingMemory;

/// The confirmation token [`Memory::forget`] requires for a permanent
/// delete (§4.1 `HardDelete`).
pub const HARD_DELETE_CONFIRMATION: &str = "permanently-delete";

/// Aggregated health report (§4.7 "Health check").
#[derive(Clone, Debug)]
pub struct HealthCheck {
    /// Whether a trivial store read succeeded.
    pub store_reachable: bool,
    /// Current state of the embedding provider's circuit breaker.
    pub embedding_breaker: BreakerState,
    /// Current state of the tag provider's circuit breaker.
    pub tagging_breaker: BreakerState,
    /// Fraction of the configured connection pool in use. Always `0.0` for
    /// the embedded `redb` backend, which has no connection pool to
    /// exhaust; kept in the report's shape for backends that do.
    pub pool_utilization: f64,
}

impl HealthCheck {
    /// True if the store answered and neither circuit breaker is open.
    pub fn is_healthy(&self) -> bool {
        self.store_reachable && self.embedding_breaker != BreakerState::Open && self.tagging_breaker != BreakerState::Open
    }
}

/// The primary entry point for a single-process robot (§6).
///
/// Owns the persistence layer, the derived fulltext/vector indexes, the
/// enrichment pipeline, and one [`WorkingMemory`] per robot name seen so
/// far. Safe to share across threads via `Arc`.
pub struct Memory {
    store: Arc<dyn MemoryStore>,
    fulltext: Arc<FulltextIndex>,
    vector_index: Arc<HnswIndex>,
    embedding_service: Arc<dyn EmbeddingService>,
    tag_service: Arc<dyn TagService>,
    tokenizer: Arc<dyn Tokenizer>,
    job_runner: Arc<dyn JobRunner>,
    enrichment: Arc<EnrichmentContext>,
    config: Config,
    working_memories: Mutex<HashMap<String, Arc<WorkingMemory>>>,
}

impl Memory {
    /// Opens (or creates) a memory service at `path`, using the providers
    /// `config` selects (§4.4 embedding/tag provider, §4.3 job backend) and
    /// a dependency-free whitespace tokenizer.
    #[instrument(skip(config), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        info!("Opening memory service");
        let embedding_service = create_embedding_service(&config)?;
        let tag_service = create_tag_service(&config);
        Self::with_providers(
            path,
            config,
            Arc::from(embedding_service),
            Arc::from(tag_service),
            Arc::new(WhitespaceTokenizer),
        )
    }

    /// Opens a memory service with explicitly injected providers, for
    /// callers wiring in a builtin-embeddings model, an external tag-LLM
    /// client, or a model-specific tokenizer (§9 "duck-typed service
    /// injection").
    #[instrument(skip(config, embedding_service, tag_service, tokenizer), fields(path = %path.as_ref().display()))]
    pub fn with_providers(
        path: impl AsRef<Path>,
        config: Config,
        embedding_service: Arc<dyn EmbeddingService>,
        tag_service: Arc<dyn TagService>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn MemoryStore> = Arc::from(open_store(&path, &config)?);

        let fulltext = Arc::new(FulltextIndex::open(&fulltext_dir(path.as_ref()))?);
        let vector_index = Arc::new(HnswIndex::new(config.dimension(), &config.hnsw));
        rebuild_derived_indexes(store.as_ref(), &fulltext, &vector_index, &config)?;

        let enrichment = Arc::new(EnrichmentContext::new(
            Arc::clone(&store),
            Arc::clone(&embedding_service),
            Arc::clone(&tag_service),
            Arc::clone(&fulltext),
            Arc::clone(&vector_index),
            &config,
        ));
        let job_runner: Arc<dyn JobRunner> = Arc::from(create_job_runner(&config));

        info!(dimension = config.dimension(), "Memory service opened");

        Ok(Self {
            store,
            fulltext,
            vector_index,
            embedding_service,
            tag_service,
            tokenizer,
            job_runner,
            enrichment,
            config,
            working_memories: Mutex::new(HashMap::new()),
        })
    }

    /// The configuration this service was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The working-memory view for `robot`, creating an empty one budgeted
    /// at `config.working_memory_max_tokens` on first use.
    pub fn working_memory(&self, robot: &str) -> Arc<WorkingMemory> {
        let mut memories = self
            .working_memories
            .lock()
            .expect("working-memory registry lock poisoned");
        memories
            .entry(robot.to_string())
            .or_insert_with(|| Arc::new(WorkingMemory::new(self.config.working_memory_max_tokens)))
            .clone()
    }

    /// Retrieves a node by id (§4.1 `GetNode`).
    pub fn get_node(&self, node_id: NodeId, include_deleted: bool) -> Result<Option<Node>> {
        self.store.get_node(node_id, include_deleted)
    }

    /// `Remember(content, tags?, metadata?) -> NodeID` (§6).
    ///
    /// Persists `content` against `robot` with content-hash dedup (§4.1),
    /// attaches any caller-supplied `tags` (ancestor-closed), enqueues
    /// embedding and tagging enrichment jobs, and adds the node to
    /// `robot`'s working memory.
    #[instrument(skip(self, content, tags, metadata), fields(robot))]
    pub fn remember(
        &self,
        content: &str,
        tags: Option<&[String]>,
        metadata: Option<HashMap<String, String>>,
        robot: &str,
    ) -> Result<NodeId> {
        let robot_id = self.store.find_or_create_robot(robot)?;
        let node_id = self.create_or_restore_node(content, metadata.unwrap_or_default(), None, None)?;
        self.store.link_robot_node(robot_id, node_id)?;

        if let Some(tag_names) = tags {
            if !tag_names.is_empty() {
                self.store.attach_tags(node_id, tag_names)?;
            }
        }

        self.enqueue_enrichment(node_id)?;

        let node = self
            .store
            .get_node(node_id, false)?
            .ok_or_else(|| NotFoundError::node(node_id))?;
        self.working_memory(robot)
            .add(node_id, node.content, u64::from(node.token_count), None, false);
        self.store.set_working_memory_flag(robot_id, node_id, true)?;

        debug!(id = %node_id, robot = robot, "Node remembered");
        Ok(node_id)
    }

    /// `LoadExternalContent(sourceID, chunks)` (§6): the join point file
    /// loaders write through. Each chunk becomes (or resolves to, under
    /// dedup) a node linked back to `source_id` at its `position`. Not
    /// associated with any robot's working memory.
    #[instrument(skip(self, chunks))]
    pub fn load_external_content(
        &self,
        source_id: FileSourceId,
        chunks: &[(String, u32)],
    ) -> Result<Vec<NodeId>> {
        let mut node_ids = Vec::with_capacity(chunks.len());
        for (content, position) in chunks {
            let node_id =
                self.create_or_restore_node(content, HashMap::new(), Some(source_id), Some(*position))?;
            self.enqueue_enrichment(node_id)?;
            node_ids.push(node_id);
        }
        Ok(node_ids)
    }

    /// `Recall(query, strategy, limit, timeframe?, tagFilter?, raw?)` (§6),
    /// the retrieval engine's public entry point (§4.2).
    ///
    /// When `robot` is supplied and `raw` is false, every returned node has
    /// `last_accessed` bumped and is promoted into that robot's working
    /// memory (§4.2 "Side effect on recall"). `raw = true` skips both side
    /// effects, for read-only inspection.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, query, timeframe, tag_filter), fields(strategy = ?strategy))]
    pub fn recall(
        &self,
        query: &str,
        strategy: Strategy,
        limit: usize,
        timeframe: Option<&Timeframe>,
        tag_filter: Option<&[String]>,
        robot: Option<&str>,
        raw: bool,
    ) -> Result<Vec<SearchResult>> {
        let mut results = match strategy {
            Strategy::Fulltext => {
                fulltext_recall(self.store.as_ref(), &self.fulltext, query, limit, timeframe)?
            }
            Strategy::Vector => vector_recall(
                self.store.as_ref(),
                &self.vector_index,
                self.embedding_service.as_ref(),
                query,
                None,
                limit,
                self.config.hnsw.ef_search,
                timeframe,
            )?,
            Strategy::Hybrid => hybrid_recall(
                self.store.as_ref(),
                &self.fulltext,
                &self.vector_index,
                self.embedding_service.as_ref(),
                self.tag_service.as_ref(),
                query,
                None,
                limit,
                self.config.hnsw.ef_search,
                timeframe,
                &self.config.retrieval,
            )?,
        };

        if let Some(filter_tags) = tag_filter {
            if !filter_tags.is_empty() {
                results = self.filter_by_tags(results, filter_tags)?;
            }
        }

        if !raw {
            self.apply_recall_side_effects(&results, robot)?;
        }

        Ok(results)
    }

    /// `Forget(nodeID, soft, confirm?)` (§6). A soft delete clears the
    /// node from both derived indexes but leaves the row recoverable via
    /// [`Memory::restore`]; a hard delete requires `confirm ==
    /// Some(HARD_DELETE_CONFIRMATION)` and is irreversible (§4.1
    /// `HardDelete`).
    #[instrument(skip(self, confirm))]
    pub fn forget(&self, node_id: NodeId, soft: bool, confirm: Option<&str>) -> Result<bool> {
        let removed = if soft {
            self.store.soft_delete_node(node_id)?
        } else {
            if confirm != Some(HARD_DELETE_CONFIRMATION) {
                return Err(ValidationError::invalid_field(
                    "confirm",
                    "hard delete requires the confirmation token",
                )
                .into());
            }
            self.store.hard_delete_node(node_id)?
        };

        if removed {
            self.vector_index.delete_node(node_id)?;
            self.fulltext.delete_node(node_id)?;
            debug!(id = %node_id, soft = soft, "Node forgotten");
        }
        Ok(removed)
    }

    /// `Restore(nodeID)` (§6): clears a soft delete and re-admits the node
    /// to the derived indexes.
    #[instrument(skip(self))]
    pub fn restore(&self, node_id: NodeId) -> Result<bool> {
        let restored = self.store.restore_node(node_id)?;
        if restored {
            if let Some(node) = self.store.get_node(node_id, false)? {
                self.fulltext.index_node(node_id, &node.content)?;
                if let Some(embedding) = self.store.get_embedding(node_id)? {
                    self.vector_index.delete_node(node_id)?;
                    self.vector_index.insert_node(node_id, &embedding)?;
                }
            }
            debug!(id = %node_id, "Node restored into derived indexes");
        }
        Ok(restored)
    }

    /// `UpdateEmbedding(id, vector)` (§4.1): writes a caller-supplied
    /// embedding directly, bypassing the enrichment job. Used in external
    /// embedding mode, where the provider call happens out of process, and
    /// for re-embedding a node after a model change. The vector index has
    /// no in-place update, so a prior entry for this node is deleted before
    /// the new one is inserted.
    #[instrument(skip(self, embedding))]
    pub fn update_embedding(&self, node_id: NodeId, embedding: &[f32]) -> Result<bool> {
        let saved = self.store.save_embedding(node_id, embedding)?;
        if saved {
            self.vector_index.delete_node(node_id)?;
            self.vector_index.insert_node(node_id, embedding)?;
            debug!(id = %node_id, "Embedding updated");
        }
        Ok(saved)
    }

    /// Aggregates store reachability and both circuit breaker states into
    /// one report (§4.7, §11 "Health check surface").
    #[instrument(skip(self))]
    pub fn health_check(&self) -> HealthCheck {
        let store_reachable = self.store.get_node(NodeId::nil(), true).is_ok();
        let check = HealthCheck {
            store_reachable,
            embedding_breaker: self.enrichment.embedding_breaker_state(),
            tagging_breaker: self.enrichment.tagging_breaker_state(),
            pool_utilization: 0.0,
        };
        if !check.is_healthy() {
            warn!(
                store_reachable,
                embedding_breaker = ?check.embedding_breaker,
                tagging_breaker = ?check.tagging_breaker,
                "Health check reports degraded service"
            );
        }
        check
    }

    fn create_or_restore_node(
        &self,
        content: &str,
        metadata: HashMap<String, String>,
        source_id: Option<FileSourceId>,
        chunk_position: Option<u32>,
    ) -> Result<NodeId> {
        let hash = content_hash(content);
        if let Some(existing) = self.store.find_by_content_hash(&hash, true)? {
            if existing.deleted_at.is_some() {
                self.store.restore_node(existing.id)?;
                self.fulltext.index_node(existing.id, &existing.content)?;
                if let Some(embedding) = self.store.get_embedding(existing.id)? {
                    self.vector_index.insert_node(existing.id, &embedding)?;
                }
            }
            return Ok(existing.id);
        }

        let new_node = NewNode {
            content: content.to_string(),
            token_count: self.tokenizer.count_tokens(content),
            metadata,
            source_id,
            chunk_position,
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
        // Fulltext indexing happens inside the tagging job once tags are
        // attached (crate::jobs::run_tagging_job), not here, so a node is
        // indexed exactly once regardless of how many times it is enqueued.
        Ok(node.id)
    }

    fn enqueue_enrichment(&self, node_id: NodeId) -> Result<()> {
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
        )
    }

    fn filter_by_tags(&self, results: Vec<SearchResult>, filter_tags: &[String]) -> Result<Vec<SearchResult>> {
        let wanted: HashSet<&str> = filter_tags.iter().map(String::as_str).collect();
        let mut filtered = Vec::with_capacity(results.len());
        for result in results {
            let node_tags = self.store.tags_for_node(result.node_id)?;
            if node_tags.iter().any(|tag| wanted.contains(tag.name.as_str())) {
                filtered.push(result);
            }
        }
        Ok(filtered)
    }

    fn apply_recall_side_effects(&self, results: &[SearchResult], robot: Option<&str>) -> Result<()> {
        for result in results {
            self.store.touch_last_accessed(result.node_id)?;
        }

        let Some(robot_name) = robot else { return Ok(()) };
        let robot_id = self.store.find_or_create_robot(robot_name)?;
        let working_memory = self.working_memory(robot_name);
        for result in results {
            let Some(node) = self.store.get_node(result.node_id, false)? else {
                continue;
            };
            let evicted =
                working_memory.promote_from_recall(result.node_id, node.content, u64::from(node.token_count));
            for entry in evicted {
                self.store.set_working_memory_flag(robot_id, entry.node_id, false)?;
            }
        }
        Ok(())
    }
}

/// Loads every active node's content and embedding from the store and
/// backfills the in-memory vector index (always, since it has no on-disk
/// persistence here) and the on-disk fulltext index (only if it is empty,
/// i.e. this is a fresh index rather than a reopen of a populated one).
fn rebuild_derived_indexes(
    store: &dyn MemoryStore,
    fulltext: &FulltextIndex,
    vector_index: &HnswIndex,
    config: &Config,
) -> Result<()> {
    let backfill_fulltext = fulltext.num_docs() == 0;
    let node_ids = store.list_active_node_ids()?;

    for node_id in node_ids {
        let Some(node) = store.get_node(node_id, false)? else {
            continue;
        };
        if backfill_fulltext {
            fulltext.index_node(node_id, &node.content)?;
        }
        if let Some(embedding) = store.get_embedding(node_id)? {
            if embedding.len() == config.dimension() {
                vector_index.insert_node(node_id, &embedding)?;
            }
        }
    }
    Ok(())
}

fn fulltext_dir(database_path: &Path) -> std::path::PathBuf {
    let mut dir = database_path.to_path_buf();
    let suffixed = match database_path.file_name() {
        Some(name) => format!("{}_fts", name.to_string_lossy()),
        None => "fts".to_string(),
    };
    dir.set_file_name(suffixed);
    dir
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagging::HeuristicTagService;

    /// A stand-in for a caller's own external embedding client (§4.4
    /// "External"): unlike [`crate::embedding::ExternalEmbedding`], which
    /// always fails because this crate carries no concrete client for it,
    /// this always succeeds, so tests exercising `remember`/`recall` aren't
    /// coupled to the enrichment pipeline's failure handling.
    #[derive(Clone, Copy, Debug, Default)]
    struct ConstantEmbedding;

    impl EmbeddingService for ConstantEmbedding {
        fn embed(&self, _text: &str) -> Result<crate::types::Embedding> {
            Ok(vec![0.25, 0.25, 0.25, 0.25])
        }

        fn dimension(&self) -> u16 {
            4
        }
    }

    fn test_config() -> Config {
        Config {
            embedding_dimension: crate::config::EmbeddingDimension::Custom(4),
            job_backend: crate::config::JobBackend::Inline,
            ..Default::default()
        }
    }

    fn open_test_memory(path: &Path, config: Config) -> Memory {
        Memory::with_providers(
            path,
            config,
            Arc::new(ConstantEmbedding),
            Arc::new(HeuristicTagService),
            Arc::new(WhitespaceTokenizer),
        )
        .unwrap()
    }

    fn test_memory() -> (tempfile::TempDir, Memory) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let memory = open_test_memory(&path, test_config());
        (dir, memory)
    }

    #[test]
    fn remember_deduplicates_across_robots() {
        let (_dir, memory) = test_memory();
        let first = memory.remember("shared fact", None, None, "r1").unwrap();
        let second = memory.remember("shared fact", None, None, "r2").unwrap();
        assert_eq!(first, second);
        assert!(memory.working_memory("r1").contains(first));
        assert!(memory.working_memory("r2").contains(first));
    }

    #[test]
    fn remember_reinforces_same_robot_remember_count() {
        let (_dir, memory) = test_memory();
        let node_id = memory.remember("dup", None, None, "r1").unwrap();
        memory.remember("dup", None, None, "r1").unwrap();
        let link = memory
            .store
            .get_robot_node(memory.store.find_or_create_robot("r1").unwrap(), node_id)
            .unwrap()
            .unwrap();
        assert_eq!(link.remember_count, 2);
    }

    #[test]
    fn remember_attaches_caller_supplied_tags_with_ancestor_closure() {
        let (_dir, memory) = test_memory();
        let node_id = memory
            .remember(
                "postgres hnsw index notes",
                Some(&["database:postgresql".to_string()]),
                None,
                "r1",
            )
            .unwrap();
        let tags = memory.store.tags_for_node(node_id).unwrap();
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"database"));
        assert!(names.contains(&"database:postgresql"));
    }

    #[test]
    fn forget_soft_then_restore_roundtrips() {
        let (_dir, memory) = test_memory();
        let node_id = memory.remember("will be deleted", None, None, "r1").unwrap();

        assert!(memory.forget(node_id, true, None).unwrap());
        assert!(memory.get_node(node_id, false).unwrap().is_none());
        assert!(memory.get_node(node_id, true).unwrap().is_some());

        assert!(memory.restore(node_id).unwrap());
        assert!(memory.get_node(node_id, false).unwrap().is_some());
    }

    #[test]
    fn forget_hard_without_confirmation_is_rejected() {
        let (_dir, memory) = test_memory();
        let node_id = memory.remember("needs confirmation", None, None, "r1").unwrap();
        let err = memory.forget(node_id, false, None).unwrap_err();
        assert!(err.is_validation());
        assert!(memory.get_node(node_id, true).unwrap().is_some());
    }

    #[test]
    fn forget_hard_with_confirmation_removes_permanently() {
        let (_dir, memory) = test_memory();
        let node_id = memory.remember("goodbye", None, None, "r1").unwrap();
        assert!(memory
            .forget(node_id, false, Some(HARD_DELETE_CONFIRMATION))
            .unwrap());
        assert!(memory.get_node(node_id, true).unwrap().is_none());
    }

    #[test]
    fn recall_fulltext_finds_remembered_content() {
        let (_dir, memory) = test_memory();
        memory.remember("caching strategies for read-heavy workloads", None, None, "r1").unwrap();
        let results = memory
            .recall("caching strategies", Strategy::Fulltext, 5, None, None, None, false)
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn recall_promotes_into_robot_working_memory() {
        let (_dir, memory) = test_memory();
        let node_id = memory.remember("promote me", None, None, "writer").unwrap();
        memory.working_memory("reader").remove(node_id);
        assert!(!memory.working_memory("reader").contains(node_id));

        memory
            .recall("promote me", Strategy::Fulltext, 5, None, None, Some("reader"), false)
            .unwrap();
        assert!(memory.working_memory("reader").contains(node_id));
    }

    #[test]
    fn recall_raw_skips_promotion_side_effect() {
        let (_dir, memory) = test_memory();
        let node_id = memory.remember("raw recall", None, None, "writer").unwrap();
        memory.working_memory("reader").remove(node_id);

        memory
            .recall("raw recall", Strategy::Fulltext, 5, None, None, Some("reader"), true)
            .unwrap();
        assert!(!memory.working_memory("reader").contains(node_id));
    }

    #[test]
    fn recall_tag_filter_excludes_nonmatching_nodes() {
        let (_dir, memory) = test_memory();
        memory
            .remember(
                "redis caching notes",
                Some(&["database:redis".to_string()]),
                None,
                "r1",
            )
            .unwrap();
        memory
            .remember(
                "postgres caching notes",
                Some(&["database:postgresql".to_string()]),
                None,
                "r1",
            )
            .unwrap();

        let results = memory
            .recall(
                "caching notes",
                Strategy::Fulltext,
                10,
                None,
                Some(&["database:redis".to_string()]),
                None,
                false,
            )
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn load_external_content_links_chunks_to_source() {
        let (_dir, memory) = test_memory();
        let source_id = FileSourceId::new();
        let chunks = vec![
            ("chunk one content".to_string(), 0u32),
            ("chunk two content".to_string(), 1u32),
        ];
        let node_ids = memory.load_external_content(source_id, &chunks).unwrap();
        assert_eq!(node_ids.len(), 2);
        let node = memory.get_node(node_ids[0], false).unwrap().unwrap();
        assert_eq!(node.source_id, Some(source_id));
        assert_eq!(node.chunk_position, Some(0));
    }

    #[test]
    fn load_external_content_dedups_against_existing_node() {
        let (_dir, memory) = test_memory();
        memory.remember("already known content", None, None, "r1").unwrap();
        let source_id = FileSourceId::new();
        let node_ids = memory
            .load_external_content(source_id, &[("already known content".to_string(), 0)])
            .unwrap();
        // Dedup resolves to the existing node, which was never linked to
        // this source.
        let node = memory.get_node(node_ids[0], false).unwrap().unwrap();
        assert_eq!(node.source_id, None);
    }

    #[test]
    fn health_check_reports_reachable_store_and_closed_breakers() {
        let (_dir, memory) = test_memory();
        memory.remember("a healthy node", None, None, "r1").unwrap();

        let health = memory.health_check();
        assert!(health.store_reachable);
        assert_eq!(health.embedding_breaker, BreakerState::Closed);
        assert_eq!(health.tagging_breaker, BreakerState::Closed);
        assert!(health.is_healthy());
    }

    #[test]
    fn update_embedding_is_idempotent_and_searchable() {
        let (_dir, memory) = test_memory();
        let node_id = memory.remember("vector target", None, None, "r1").unwrap();
        memory.update_embedding(node_id, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        memory.update_embedding(node_id, &[1.0, 0.0, 0.0, 0.0]).unwrap();

        let results = memory
            .recall("ignored", Strategy::Vector, 5, None, None, None, true)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].node_id, node_id);
    }

    #[test]
    fn reopen_rebuilds_vector_index_from_stored_embeddings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let config = test_config();
        let node_id = {
            let memory = open_test_memory(&path, config.clone());
            let node_id = memory.remember("will survive reopen", None, None, "r1").unwrap();
            memory.update_embedding(node_id, &[0.0, 1.0, 0.0, 0.0]).unwrap();
            node_id
        };

        let memory = open_test_memory(&path, config);
        let results = memory
            .recall("ignored", Strategy::Vector, 5, None, None, None, true)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].node_id, node_id);
    }
}
