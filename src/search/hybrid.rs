//! The three recall strategies (§4.2): `fulltext`, `vector`, and the
//! primary `hybrid` strategy (RRF fusion + tag boost).

use std::collections::HashMap;

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingService;
use crate::error::Result;
use crate::fulltext::FulltextIndex;
use crate::node::Node;
use crate::search::rrf::reciprocal_rank_fusion;
use crate::search::timeframe::Timeframe;
use crate::storage::MemoryStore;
use crate::tag::ancestor_prefixes;
use crate::tagging::{expand_with_ancestors, TagService, ONTOLOGY_SNAPSHOT_SIZE};
use crate::types::{NodeId, Timestamp};
use crate::vector::HnswIndex;

/// Which of the three §4.2 strategies a `Recall` call should use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Full-text relevance search only.
    Fulltext,
    /// Vector similarity search only.
    Vector,
    /// RRF fusion of both, plus tag boosting. The primary interface.
    Hybrid,
}

/// A single scored recall result (§4.2 "each result carries...").
#[derive(Clone, Debug)]
pub struct SearchResult {
    /// The matched node's id.
    pub node_id: NodeId,
    /// The node's content, for direct display without a follow-up `GetNode`.
    pub content: String,
    /// Cosine similarity in `[0, 1]`, present for vector and hybrid results.
    pub similarity: Option<f32>,
    /// Contribution from tag-boost (§4.2 step 4); zero for pure fulltext/vector.
    pub tag_boost: f64,
    /// Final ranking score: `rrf_score + tag_boost` for hybrid, native
    /// relevance for fulltext, similarity for vector.
    pub combined_score: f64,
    /// Node creation time, for tie-breaking and display.
    pub created_at: Timestamp,
    /// The node's free-form metadata.
    pub metadata: std::collections::HashMap<String, String>,
}

fn node_passes_filters(node: &Node, timeframe: Option<&Timeframe>) -> bool {
    if !node.is_active() {
        return false;
    }
    match timeframe {
        Some(tf) => tf.contains(node.created_at),
        None => true,
    }
}

fn load_active_node(store: &dyn MemoryStore, node_id: NodeId, timeframe: Option<&Timeframe>) -> Result<Option<Node>> {
    let node = store.get_node(node_id, false)?;
    Ok(node.filter(|n| node_passes_filters(n, timeframe)))
}

fn to_result(node: &Node, similarity: Option<f32>, combined_score: f64) -> SearchResult {
    SearchResult {
        node_id: node.id,
        content: node.content.clone(),
        similarity,
        tag_boost: 0.0,
        combined_score,
        created_at: node.created_at,
        metadata: node.metadata.clone(),
    }
}

/// Strategy: fulltext (§4.2 "Strategy: fulltext").
pub fn fulltext_recall(
    store: &dyn MemoryStore,
    fulltext: &FulltextIndex,
    query: &str,
    limit: usize,
    timeframe: Option<&Timeframe>,
) -> Result<Vec<SearchResult>> {
    let hits = fulltext.search(query, limit.max(1) * 4)?;
    let mut results = Vec::with_capacity(limit);
    for hit in hits {
        if results.len() >= limit {
            break;
        }
        if let Some(node) = load_active_node(store, hit.node_id, timeframe)? {
            results.push(to_result(&node, None, hit.score as f64));
        }
    }
    Ok(results)
}

/// Strategy: vector (§4.2 "Strategy: vector").
///
/// `query_embedding` is caller-supplied when available; otherwise it is
/// computed via the embedding service.
pub fn vector_recall(
    store: &dyn MemoryStore,
    vector_index: &HnswIndex,
    embedding_service: &dyn EmbeddingService,
    query: &str,
    query_embedding: Option<&[f32]>,
    limit: usize,
    ef_search: usize,
    timeframe: Option<&Timeframe>,
) -> Result<Vec<SearchResult>> {
    let owned_embedding;
    let query_vector: &[f32] = match query_embedding {
        Some(v) => v,
        None => {
            owned_embedding = embedding_service.embed(query)?;
            &owned_embedding
        }
    };

    let hits = vector_index.search_nodes(query_vector, limit.max(1) * 4, ef_search)?;
    let mut results = Vec::with_capacity(limit);
    for (node_id, distance) in hits {
        if results.len() >= limit {
            break;
        }
        if let Some(node) = load_active_node(store, node_id, timeframe)? {
            let similarity = 1.0 - distance;
            results.push(to_result(&node, Some(similarity), similarity as f64));
        }
    }
    Ok(results)
}

/// Strategy: hybrid (§4.2 "Strategy: hybrid (RRF + tag boost)"). The
/// primary retrieval interface.
#[allow(clippy::too_many_arguments)]
pub fn hybrid_recall(
    store: &dyn MemoryStore,
    fulltext: &FulltextIndex,
    vector_index: &HnswIndex,
    embedding_service: &dyn EmbeddingService,
    tag_service: &dyn TagService,
    query: &str,
    query_embedding: Option<&[f32]>,
    limit: usize,
    ef_search: usize,
    timeframe: Option<&Timeframe>,
    config: &RetrievalConfig,
) -> Result<Vec<SearchResult>> {
    let expanded_limit = (2 * limit).max(config.expanded_limit_floor);

    let fulltext_hits = fulltext.search(query, expanded_limit)?;
    let owned_embedding;
    let query_vector: &[f32] = match query_embedding {
        Some(v) => v,
        None => {
            owned_embedding = embedding_service.embed(query)?;
            &owned_embedding
        }
    };
    let vector_hits = vector_index.search_nodes(query_vector, expanded_limit, ef_search)?;

    // Filter each candidate list to active, in-timeframe nodes while
    // preserving rank order, then fetch similarity separately so it can
    // still be reported even though only the vector list carries it.
    let mut nodes: HashMap<NodeId, Node> = HashMap::new();
    let mut fulltext_ranked: Vec<NodeId> = Vec::with_capacity(fulltext_hits.len());
    for hit in &fulltext_hits {
        if let Some(node) = load_active_node(store, hit.node_id, timeframe)? {
            fulltext_ranked.push(hit.node_id);
            nodes.insert(hit.node_id, node);
        }
    }

    let mut vector_ranked: Vec<NodeId> = Vec::with_capacity(vector_hits.len());
    let mut similarities: HashMap<NodeId, f32> = HashMap::new();
    for (node_id, distance) in &vector_hits {
        if let Some(node) = load_active_node(store, *node_id, timeframe)? {
            vector_ranked.push(*node_id);
            similarities.insert(*node_id, 1.0 - distance);
            nodes.entry(*node_id).or_insert(node);
        }
    }

    let rrf_scores = reciprocal_rank_fusion(&[fulltext_ranked, vector_ranked], config.rrf_k);

    let query_tags = resolve_query_tags(store, tag_service, query)?;

    let mut scored: Vec<SearchResult> = Vec::with_capacity(rrf_scores.len());
    for (node_id, rrf_score) in rrf_scores {
        let Some(node) = nodes.get(&node_id) else { continue };
        let tag_boost = if query_tags.is_empty() {
            0.0
        } else {
            tag_boost_for_node(store, node_id, &query_tags, config)?
        };
        let combined = rrf_score + tag_boost;
        let mut result = to_result(node, similarities.get(&node_id).copied(), combined);
        result.tag_boost = tag_boost;
        scored.push(result);
    }

    // Tie-breaking: combined desc -> similarity desc -> created_at desc -> id asc (§4.2).
    scored.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.similarity
                    .unwrap_or(0.0)
                    .partial_cmp(&a.similarity.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.node_id.cmp(&b.node_id))
    });
    scored.truncate(limit);
    Ok(scored)
}

/// Extracts candidate tags from the query in read-only mode (§4.2 step 4),
/// expands them with ancestor prefixes, and intersects with tags that
/// actually exist in the store.
fn resolve_query_tags(
    store: &dyn MemoryStore,
    tag_service: &dyn TagService,
    query: &str,
) -> Result<Vec<String>> {
    let ontology = store.recent_tag_names(ONTOLOGY_SNAPSHOT_SIZE)?;
    let candidates = tag_service.extract_tags(query, &ontology)?;
    let expanded = expand_with_ancestors(&candidates);

    let mut existing = Vec::with_capacity(expanded.len());
    for name in expanded {
        if store.get_tag_by_name(&name)?.is_some() {
            existing.push(name);
        }
    }
    Ok(existing)
}

/// Computes `tag_boost = alpha * Σ_{matched} (1 + depth_weight * depth) / |query_tags|`
/// for one candidate node (§4.2 step 4).
fn tag_boost_for_node(
    store: &dyn MemoryStore,
    node_id: NodeId,
    query_tags: &[String],
    config: &RetrievalConfig,
) -> Result<f64> {
    let node_tags = store.tags_for_node(node_id)?;
    let node_tag_names: std::collections::HashSet<&str> =
        node_tags.iter().map(|t| t.name.as_str()).collect();

    let mut weighted_matches = 0.0;
    for query_tag in query_tags {
        if node_tag_names.contains(query_tag.as_str()) {
            let depth = ancestor_prefixes(query_tag).len();
            weighted_matches += 1.0 + f64::from(config.tag_depth_weight) * depth as f64;
        }
    }

    if weighted_matches == 0.0 {
        return Ok(0.0);
    }
    Ok(f64::from(config.tag_boost_alpha) * weighted_matches / query_tags.len() as f64)
}
