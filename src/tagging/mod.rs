//! Tag extraction service abstraction (§4.4 "Tag service").
//!
//! `ExtractTags(text, existingOntology) -> Set<TagName>` is injected: the
//! upstream extractor (an LLM, a classifier, a human-curated ruleset) is
//! opaque to this crate. What this module owns is the **output contract**
//! every implementation must satisfy, applied uniformly regardless of
//! provider — mirroring how [`crate::embedding::finalize_embedding`] applies
//! a shared contract to every [`crate::embedding::EmbeddingService`].

use std::collections::HashSet;

use crate::config::{Config, TagProvider};
use crate::error::{Result, ServiceUnavailableError};
use crate::tag::{ancestor_prefixes, segment_count, singularize, validate_tag_name};

/// Maximum tags returned per node (§4.4).
pub const MAX_TAGS_PER_NODE: usize = 8;
/// Maximum hierarchy depth of any single extracted tag (§4.4).
pub const MAX_TAG_DEPTH: usize = 5;
/// Size of the bounded ontology snapshot passed to the extractor (§4.4).
pub const ONTOLOGY_SNAPSHOT_SIZE: usize = 100;

/// Tag-extraction provider trait. Implementations must be `Send + Sync` so
/// the enrichment pipeline (§4.3) can share one behind an `Arc`.
pub trait TagService: Send + Sync {
    /// Extracts a candidate tag set from `text`, biased toward reusing
    /// names already present in `existing_ontology` (the most recent 100
    /// tag names by creation, per [`crate::storage::MemoryStore::recent_tag_names`]).
    ///
    /// Implementations may return tags that violate the §4.4 output
    /// contract (wrong pattern, too many, too deep); [`finalize_tags`]
    /// enforces it uniformly. This method itself never writes to storage —
    /// it is safe to call in the read-only mode hybrid recall uses for
    /// query-side tag extraction (§4.2 step 4).
    fn extract_tags(&self, text: &str, existing_ontology: &[String]) -> Result<Vec<String>>;
}

/// Applies the §4.4 output contract to a raw extractor result: validates
/// the name pattern, singularizes each segment, drops anything invalid or
/// too deep, and truncates to [`MAX_TAGS_PER_NODE`]. Tags already present in
/// `existing_ontology` are kept ahead of novel ones when truncating, to
/// prefer ontology reuse.
pub fn finalize_tags(raw: Vec<String>, existing_ontology: &[String]) -> Vec<String> {
    let ontology: HashSet<&str> = existing_ontology.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    let mut candidates: Vec<String> = Vec::new();

    for tag in raw {
        let singular = singularize(&tag.trim().to_lowercase());
        if validate_tag_name(&singular).is_err() {
            continue;
        }
        if segment_count(&singular) > MAX_TAG_DEPTH {
            continue;
        }
        if seen.insert(singular.clone()) {
            candidates.push(singular);
        }
    }

    candidates.sort_by_key(|t| !ontology.contains(t.as_str()));
    candidates.truncate(MAX_TAGS_PER_NODE);
    candidates
}

/// A dependency-free heuristic extractor: pulls lowercase alphanumeric runs
/// of at least 4 characters out of the text, preferring ones already in the
/// ontology, with no external provider call. Used as the default
/// (`TagProvider::Heuristic`) and as a deterministic stand-in for tests and
/// offline operation.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicTagService;

const STOPWORDS: &[&str] = &[
    "this", "that", "with", "from", "have", "been", "were", "will", "about",
    "into", "their", "there", "which", "what", "when", "where", "does",
];

impl TagService for HeuristicTagService {
    fn extract_tags(&self, text: &str, existing_ontology: &[String]) -> Result<Vec<String>> {
        let mut raw: Vec<String> = text
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '-')
            .map(|word| word.to_lowercase())
            .filter(|word| word.len() >= 4 && !STOPWORDS.contains(&word.as_str()))
            .collect();
        raw.dedup();
        Ok(finalize_tags(raw, existing_ontology))
    }
}

/// External tag-extraction provider: validates nothing and cannot itself
/// extract tags. Selected when `config.tag_provider` is
/// [`TagProvider::External`] and the caller's injected extractor (an LLM,
/// a classifier) is supplied out of process; this crate carries no
/// concrete client for it, so `extract_tags` always fails, mirroring
/// [`crate::embedding::ExternalEmbedding`]'s external-mode failure.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExternalTagService;

impl TagService for ExternalTagService {
    fn extract_tags(&self, _text: &str, _existing_ontology: &[String]) -> Result<Vec<String>> {
        Err(ServiceUnavailableError::Tagging(
            "external tag mode: tags must be supplied by an injected extractor".to_string(),
        )
        .into())
    }
}

/// Creates a tag service based on the configuration, mirroring
/// [`crate::embedding::create_embedding_service`].
pub fn create_tag_service(config: &Config) -> Box<dyn TagService> {
    match config.tag_provider {
        TagProvider::Heuristic => Box::new(HeuristicTagService),
        TagProvider::External => Box::new(ExternalTagService),
    }
}

/// Expands a set of candidate tag names with every ancestor prefix of each,
/// deduplicated, for the tag-boost intersection step (§4.2 step 4).
pub fn expand_with_ancestors(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut expanded = Vec::new();
    for tag in tags {
        for prefix in ancestor_prefixes(tag) {
            if seen.insert(prefix.clone()) {
                expanded.push(prefix);
            }
        }
    }
    expanded
}
