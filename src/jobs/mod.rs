//! Asynchronous enrichment pipeline (§4.3): pluggable job backends that
//! compute and persist a node's embedding and tag set without blocking the
//! caller that created it.
//!
//! # Backends
//!
//! - [`inline::InlineBackend`] — synchronous, errors propagate immediately.
//! - [`thread_pool::ThreadPoolBackend`] — bounded worker pool, errors logged.
//! - [`external::ExternalQueueBackend`] — the integration seam for a durable
//!   broker or framework-native queue; this crate ships an in-process
//!   simulation of its at-least-once contract since no specific broker
//!   client is part of the dependency stack.
//!
//! Both job kinds are idempotent: [`run_embedding_job`] and
//! [`run_tagging_job`] re-read the node and no-op if enrichment is already
//! present or the node has been soft-deleted.

mod external;
mod inline;
mod thread_pool;

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use external::ExternalQueueBackend;
pub use inline::InlineBackend;
pub use thread_pool::ThreadPoolBackend;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{Config, JobBackend as JobBackendKind};
use crate::embedding::EmbeddingService;
use crate::error::Result;
use crate::fulltext::FulltextIndex;
use crate::storage::MemoryStore;
use crate::tagging::TagService;
use crate::types::NodeId;
use crate::vector::HnswIndex;

/// The two kinds of enrichment work (§4.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobKind {
    /// Compute and persist an embedding vector.
    Embedding,
    /// Extract and attach tags.
    Tagging,
}

/// One unit of enrichment work: `Enqueue(jobKind, nodeID)` (§4.3).
#[derive(Clone, Copy, Debug)]
pub struct Job {
    /// Which enrichment to run.
    pub kind: JobKind,
    /// The node to enrich.
    pub node_id: NodeId,
}

/// Shared handles every job execution needs, regardless of backend.
pub struct EnrichmentContext {
    store: Arc<dyn MemoryStore>,
    embedding_service: Arc<dyn EmbeddingService>,
    tag_service: Arc<dyn TagService>,
    fulltext: Arc<FulltextIndex>,
    vector_index: Arc<HnswIndex>,
    embedding_breaker: CircuitBreaker,
    tagging_breaker: CircuitBreaker,
}

impl EnrichmentContext {
    /// Builds a new enrichment context, with one circuit breaker per provider.
    pub fn new(
        store: Arc<dyn MemoryStore>,
        embedding_service: Arc<dyn EmbeddingService>,
        tag_service: Arc<dyn TagService>,
        fulltext: Arc<FulltextIndex>,
        vector_index: Arc<HnswIndex>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            embedding_service,
            tag_service,
            fulltext,
            vector_index,
            embedding_breaker: CircuitBreaker::new("embedding", config.circuit_breaker),
            tagging_breaker: CircuitBreaker::new("tagging", config.circuit_breaker),
        }
    }

    /// Current state of the embedding provider's circuit breaker, for
    /// health reporting (§4.7).
    pub fn embedding_breaker_state(&self) -> BreakerState {
        self.embedding_breaker.state()
    }

    /// Current state of the tag provider's circuit breaker, for health
    /// reporting (§4.7).
    pub fn tagging_breaker_state(&self) -> BreakerState {
        self.tagging_breaker.state()
    }
}

/// Trait implemented by every job backend (§4.3 "Job backend abstraction").
/// All backends expose the same submit contract.
pub trait JobRunner: Send + Sync {
    /// Submits `job` for execution per the backend's delivery semantics.
    fn enqueue(&self, ctx: Arc<EnrichmentContext>, job: Job) -> Result<()>;

    /// Blocks until every previously enqueued job has finished, for orderly
    /// shutdown and for tests that need enrichment to have settled.
    fn drain(&self);
}

/// Builds the configured job runner, following the §4.3 auto-detection
/// precedence when `config.job_backend` is [`JobBackendKind::Auto`]: explicit
/// config always wins here since this crate has no framework/broker presence
/// to probe, so `Auto` resolves to the thread-pool default.
pub fn create_job_runner(config: &Config) -> Box<dyn JobRunner> {
    match &config.job_backend {
        JobBackendKind::Inline => Box::new(InlineBackend::new()),
        JobBackendKind::ThreadPool { workers } => Box::new(ThreadPoolBackend::new(*workers)),
        JobBackendKind::ExternalQueueA | JobBackendKind::ExternalQueueB => {
            Box::new(ExternalQueueBackend::new(4))
        }
        JobBackendKind::Auto => Box::new(ThreadPoolBackend::new(4)),
    }
}

/// Executes one job to completion, including retry-on-transient-failure.
/// Used by backends (thread-pool, external queue) that own their own retry
/// loop rather than propagating the first failure to the caller.
pub fn execute_with_retry(ctx: &EnrichmentContext, job: Job) {
    let mut attempt = 1;
    loop {
        match execute_once(ctx, job) {
            Ok(()) => {
                debug!(?job.kind, node_id = %job.node_id, attempt, "enrichment job succeeded");
                return;
            }
            Err(err) if retry::is_retryable(&err) && !retry::attempts_exhausted(attempt) => {
                let delay = retry::backoff_delay(attempt, deterministic_jitter(job.node_id, attempt));
                warn!(?job.kind, node_id = %job.node_id, attempt, %err, ?delay, "retrying enrichment job");
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => {
                warn!(?job.kind, node_id = %job.node_id, attempt, %err, "enrichment job abandoned");
                return;
            }
        }
    }
}

/// A cheap deterministic stand-in for random jitter, derived from the job
/// identity so retries of the same job don't all collide on the same delay.
fn deterministic_jitter(node_id: NodeId, attempt: u32) -> f64 {
    let seed = node_id.as_bytes()[0] as u32 ^ attempt;
    (f64::from(seed % 100) / 100.0) * 2.0 - 1.0
}

/// Executes one job attempt: idempotency check, circuit-breaker-wrapped
/// provider call, and persistence of the result.
pub fn execute_once(ctx: &EnrichmentContext, job: Job) -> Result<()> {
    match job.kind {
        JobKind::Embedding => run_embedding_job(ctx, job.node_id),
        JobKind::Tagging => run_tagging_job(ctx, job.node_id),
    }
}

/// Computes and persists a node's embedding (§4.3 "Job idempotency
/// contract"). No-ops if the node is gone, soft-deleted, or already has an
/// embedding.
pub fn run_embedding_job(ctx: &EnrichmentContext, node_id: NodeId) -> Result<()> {
    let Some(node) = ctx.store.get_node(node_id, false)? else {
        return Ok(());
    };
    if node.has_embedding() {
        return Ok(());
    }

    let embedding_service = Arc::clone(&ctx.embedding_service);
    let content = node.content.clone();
    let embedding = ctx
        .embedding_breaker
        .call(|| embedding_service.embed(&content))?;

    ctx.store.save_embedding(node_id, &embedding)?;
    ctx.vector_index.insert_node(node_id, &embedding)?;
    Ok(())
}

/// Extracts and attaches tags for a node (§4.3 "Job idempotency contract").
/// No-ops if the node is gone, soft-deleted, or already tagged.
pub fn run_tagging_job(ctx: &EnrichmentContext, node_id: NodeId) -> Result<()> {
    let Some(node) = ctx.store.get_node(node_id, false)? else {
        return Ok(());
    };
    if !ctx.store.tags_for_node(node_id)?.is_empty() {
        return Ok(());
    }

    let ontology = ctx
        .store
        .recent_tag_names(crate::tagging::ONTOLOGY_SNAPSHOT_SIZE)?;
    let tag_service = Arc::clone(&ctx.tag_service);
    let content = node.content.clone();
    let raw_tags = ctx
        .tagging_breaker
        .call(|| tag_service.extract_tags(&content, &ontology))?;

    let tags = crate::tagging::finalize_tags(raw_tags, &ontology);
    if tags.is_empty() {
        return Ok(());
    }
    ctx.store.attach_tags(node_id, &tags)?;
    ctx.fulltext.index_node(node_id, &node.content)?;
    Ok(())
}
