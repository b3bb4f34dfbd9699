//! Immutable configuration for the memory service.
//!
//! A single [`Config`] value is threaded explicitly into every subsystem
//! constructor; nothing in this crate reads from a process-global. Build one
//! with [`Config::default`] plus struct-update syntax, validate it once with
//! [`Config::validate`], and pass it to [`crate::memory::Memory::open`].
//!
//! ```rust
//! use htm::Config;
//!
//! let config = Config {
//!     working_memory_max_tokens: 64_000,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Top-level, immutable service configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// How node embeddings are generated.
    pub embedding_provider: EmbeddingProvider,

    /// Embedding vector dimension (must match provider output).
    pub embedding_dimension: EmbeddingDimension,

    /// How hierarchical tags are extracted from content.
    pub tag_provider: TagProvider,

    /// Filesystem path to the embedded store.
    pub database_path: PathBuf,

    /// Bounded connection-pool size for the persistence layer (§5).
    pub pool_size: usize,

    /// Acquire timeout for a pooled connection before `ResourceUnavailable`.
    pub pool_acquire_timeout: Duration,

    /// Cache size in megabytes for the storage engine.
    pub cache_size_mb: usize,

    /// Which async job backend executes enrichment jobs (§4.3).
    pub job_backend: JobBackend,

    /// Default per-robot working-memory token budget (§4.5).
    pub working_memory_max_tokens: u64,

    /// Which day a "week" starts on, for timeframe phrases like `last week`.
    pub week_start: WeekStart,

    /// Hybrid retrieval tuning (RRF constant, tag-boost alpha).
    pub retrieval: RetrievalConfig,

    /// Circuit breaker thresholds, shared by the embedding and tagging breakers.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Provider and query deadlines (§5).
    pub timeouts: TimeoutsConfig,

    /// Interval between group reconciliation ticks (§4.6). Default 30 s.
    pub reconciliation_tick: Duration,

    /// HNSW vector index tuning parameters.
    pub hnsw: HnswConfig,

    /// Whether metrics/telemetry emission is enabled.
    pub telemetry_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding_provider: EmbeddingProvider::External,
            embedding_dimension: EmbeddingDimension::D384,
            tag_provider: TagProvider::Heuristic,
            database_path: PathBuf::from("./htm.db"),
            pool_size: 5,
            pool_acquire_timeout: Duration::from_secs(5),
            cache_size_mb: 64,
            job_backend: JobBackend::Auto,
            working_memory_max_tokens: 128_000,
            week_start: WeekStart::Sunday,
            retrieval: RetrievalConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            timeouts: TimeoutsConfig::default(),
            reconciliation_tick: Duration::from_secs(30),
            hnsw: HnswConfig::default(),
            telemetry_enabled: true,
        }
    }
}

impl Config {
    /// Creates a new `Config` with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor pointing the store at a specific path.
    pub fn with_database_path(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: path.into(),
            ..Default::default()
        }
    }

    /// Validates the configuration. Called once at service construction,
    /// never during request handling.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.pool_size == 0 {
            return Err(ValidationError::invalid_field(
                "pool_size",
                "must be greater than 0",
            ));
        }
        if self.cache_size_mb == 0 {
            return Err(ValidationError::invalid_field(
                "cache_size_mb",
                "must be greater than 0",
            ));
        }
        if self.working_memory_max_tokens == 0 {
            return Err(ValidationError::invalid_field(
                "working_memory_max_tokens",
                "must be greater than 0",
            ));
        }
        let dim = self.embedding_dimension.size();
        if dim == 0 || dim > crate::types::MAX_EMBEDDING_DIMENSION {
            return Err(ValidationError::invalid_field(
                "embedding_dimension",
                format!(
                    "must be between 1 and {}",
                    crate::types::MAX_EMBEDDING_DIMENSION
                ),
            ));
        }
        self.retrieval.validate()?;
        self.circuit_breaker.validate()?;
        if self.hnsw.max_nb_connection == 0 || self.hnsw.ef_construction == 0 || self.hnsw.ef_search == 0
        {
            return Err(ValidationError::invalid_field(
                "hnsw",
                "max_nb_connection, ef_construction, and ef_search must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Returns the configured embedding dimension as a plain integer.
    pub fn dimension(&self) -> usize {
        self.embedding_dimension.size()
    }
}

/// Embedding provider selection.
#[derive(Clone, Debug)]
pub enum EmbeddingProvider {
    /// Caller supplies pre-computed embedding vectors.
    External,
    /// A bundled model generates embeddings locally.
    Builtin {
        /// Optional override path to a model file; `None` uses the bundled default.
        model_path: Option<PathBuf>,
    },
}

impl EmbeddingProvider {
    /// True if this is the external provider.
    pub fn is_external(&self) -> bool {
        matches!(self, Self::External)
    }

    /// True if this is the builtin provider.
    pub fn is_builtin(&self) -> bool {
        matches!(self, Self::Builtin { .. })
    }
}

/// Tag-extraction provider selection.
#[derive(Clone, Debug, Default)]
pub enum TagProvider {
    /// A rule-based extractor with no external dependency (§4.4 default).
    #[default]
    Heuristic,
    /// An injected LLM-backed extractor (opaque to this crate; see
    /// [`crate::tagging::TagService`]).
    External,
}

/// Embedding vector dimensions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingDimension {
    /// 384 dimensions (e.g. all-MiniLM-L6-v2).
    #[default]
    D384,
    /// 768 dimensions (e.g. bge-base-en-v1.5).
    D768,
    /// A caller-specified dimension in `[1, 2000]`.
    Custom(usize),
}

impl EmbeddingDimension {
    /// Returns the numeric size of this dimension.
    pub const fn size(&self) -> usize {
        match self {
            Self::D384 => 384,
            Self::D768 => 768,
            Self::Custom(n) => *n,
        }
    }
}

/// Which day of the week a "week" starts on, used by timeframe phrases.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeekStart {
    /// Weeks start on Sunday.
    #[default]
    Sunday,
    /// Weeks start on Monday.
    Monday,
}

/// Pluggable async job execution backend (§4.3).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum JobBackend {
    /// Resolve the backend at startup using the auto-detection precedence:
    /// explicit config > test-environment override > framework-native queue
    /// presence > durable-broker presence > thread-pool default.
    #[default]
    Auto,
    /// Execute jobs synchronously on the caller's thread.
    Inline,
    /// Submit to a bounded worker pool.
    ThreadPool {
        /// Number of worker threads.
        workers: usize,
    },
    /// Submit to an external durable broker (at-least-once delivery).
    ExternalQueueA,
    /// Submit to a framework-native job system (at-least-once delivery).
    ExternalQueueB,
}

/// Hybrid retrieval tuning knobs (§4.2).
#[derive(Clone, Copy, Debug)]
pub struct RetrievalConfig {
    /// Reciprocal Rank Fusion constant `k`.
    pub rrf_k: u32,
    /// Tag-boost weight `alpha`.
    pub tag_boost_alpha: f32,
    /// Per-matched-tag depth multiplier increment (`0.1` in the spec).
    pub tag_depth_weight: f32,
    /// Floor for the expanded candidate limit `K' = max(2K, floor)`.
    pub expanded_limit_floor: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60,
            tag_boost_alpha: 0.3,
            tag_depth_weight: 0.1,
            expanded_limit_floor: 20,
        }
    }
}

impl RetrievalConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.rrf_k == 0 {
            return Err(ValidationError::invalid_field(
                "retrieval.rrf_k",
                "must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.tag_boost_alpha) {
            return Err(ValidationError::invalid_field(
                "retrieval.tag_boost_alpha",
                "must be in [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Circuit breaker thresholds (§4.3), shared by every upstream-service breaker.
#[derive(Clone, Copy, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker.
    pub consecutive_failure_threshold: u32,
    /// Failure rate (within the rolling window) that trips the breaker.
    pub failure_rate_threshold: f64,
    /// Minimum attempts in the window before the rate threshold applies.
    pub min_attempts_for_rate: u32,
    /// Rolling window over which failures are counted.
    pub rolling_window: Duration,
    /// Initial open duration before a half-open probe is allowed.
    pub open_duration: Duration,
    /// Maximum open duration after repeated re-opens.
    pub max_open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            consecutive_failure_threshold: 5,
            failure_rate_threshold: 0.5,
            min_attempts_for_rate: 10,
            rolling_window: Duration::from_secs(60),
            open_duration: Duration::from_secs(30),
            max_open_duration: Duration::from_secs(300),
        }
    }
}

impl CircuitBreakerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.consecutive_failure_threshold == 0 {
            return Err(ValidationError::invalid_field(
                "circuit_breaker.consecutive_failure_threshold",
                "must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.failure_rate_threshold) {
            return Err(ValidationError::invalid_field(
                "circuit_breaker.failure_rate_threshold",
                "must be in [0, 1]",
            ));
        }
        if self.open_duration > self.max_open_duration {
            return Err(ValidationError::invalid_field(
                "circuit_breaker.open_duration",
                "must not exceed max_open_duration",
            ));
        }
        Ok(())
    }
}

/// Provider and query deadlines (§5).
#[derive(Clone, Copy, Debug)]
pub struct TimeoutsConfig {
    /// Deadline for an embedding provider call.
    pub embedding: Duration,
    /// Deadline for a tag-extraction provider call.
    pub tag_extraction: Duration,
    /// Deadline for establishing a provider connection.
    pub provider_connect: Duration,
    /// Deadline for a single search (`Recall`) call.
    pub search: Duration,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            embedding: Duration::from_secs(120),
            tag_extraction: Duration::from_secs(180),
            provider_connect: Duration::from_secs(30),
            search: Duration::from_secs(5),
        }
    }
}

/// Tuning parameters for the HNSW vector index backing vector/hybrid search.
#[derive(Clone, Copy, Debug)]
pub struct HnswConfig {
    /// Maximum bidirectional connections per node (`m` in §6).
    pub max_nb_connection: usize,
    /// Candidates tracked during index construction (`ef_construction` in §6).
    pub ef_construction: usize,
    /// Candidates tracked during search.
    pub ef_search: usize,
    /// Maximum number of layers in the skip-list structure.
    pub max_layer: usize,
    /// Pre-allocated capacity, in vectors.
    pub max_elements: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            max_nb_connection: 16,
            ef_construction: 64,
            ef_search: 50,
            max_layer: 16,
            max_elements: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.embedding_provider.is_external());
        assert_eq!(config.dimension(), 384);
        assert_eq!(config.working_memory_max_tokens, 128_000);
        assert_eq!(config.pool_size, 5);
    }

    #[test]
    fn with_database_path_overrides_only_path() {
        let config = Config::with_database_path("/tmp/htm.db");
        assert_eq!(config.database_path, PathBuf::from("/tmp/htm.db"));
        assert_eq!(config.pool_size, 5);
    }

    #[test]
    fn validate_rejects_zero_pool_size() {
        let config = Config {
            pool_size: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { field, .. } if field == "pool_size"));
    }

    #[test]
    fn validate_rejects_zero_working_memory_budget() {
        let config = Config {
            working_memory_max_tokens: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_oversized_custom_dimension() {
        let config = Config {
            embedding_dimension: EmbeddingDimension::Custom(3000),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_tag_boost_alpha() {
        let config = Config {
            retrieval: RetrievalConfig {
                tag_boost_alpha: 1.5,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_circuit_breaker_durations() {
        let config = Config {
            circuit_breaker: CircuitBreakerConfig {
                open_duration: Duration::from_secs(400),
                max_open_duration: Duration::from_secs(300),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn embedding_dimension_sizes() {
        assert_eq!(EmbeddingDimension::D384.size(), 384);
        assert_eq!(EmbeddingDimension::D768.size(), 768);
        assert_eq!(EmbeddingDimension::Custom(1536).size(), 1536);
    }

    #[test]
    fn job_backend_default_is_auto() {
        assert_eq!(JobBackend::default(), JobBackend::Auto);
    }

    #[test]
    fn retrieval_config_defaults_match_spec_constants() {
        let r = RetrievalConfig::default();
        assert_eq!(r.rrf_k, 60);
        assert_eq!(r.tag_boost_alpha, 0.3);
        assert_eq!(r.tag_depth_weight, 0.1);
    }

    #[test]
    fn circuit_breaker_defaults_match_spec() {
        let cb = CircuitBreakerConfig::default();
        assert_eq!(cb.consecutive_failure_threshold, 5);
        assert_eq!(cb.open_duration, Duration::from_secs(30));
        assert_eq!(cb.max_open_duration, Duration::from_secs(300));
    }

    #[test]
    fn timeouts_default_match_spec() {
        let t = TimeoutsConfig::default();
        assert_eq!(t.embedding, Duration::from_secs(120));
        assert_eq!(t.tag_extraction, Duration::from_secs(180));
        assert_eq!(t.search, Duration::from_secs(5));
    }
}
