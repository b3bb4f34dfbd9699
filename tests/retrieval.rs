//! End-to-end integration tests across remembering, tagging, and recall.

use std::sync::Arc;

use htm::{Config, EmbeddingDimension, EmbeddingService, Embedding, HeuristicTagService, JobBackend};
use htm::{Memory, Result, Strategy, WhitespaceTokenizer};
use tempfile::tempdir;

/// Deterministic stand-in for a real embedding model: same text always maps
/// to the same vector, and distinct texts map to distinct vectors.
struct FakeEmbedding;

impl EmbeddingService for FakeEmbedding {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let seed = text.bytes().fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
        Ok((0..8).map(|i| ((seed.wrapping_add(i)) % 1000) as f32 / 1000.0).collect())
    }

    fn dimension(&self) -> u16 {
        8
    }
}

fn open_memory(path: &std::path::Path) -> Memory {
    let config = Config {
        embedding_dimension: EmbeddingDimension::Custom(8),
        job_backend: JobBackend::Inline,
        ..Default::default()
    };
    Memory::with_providers(
        path,
        config,
        Arc::new(FakeEmbedding),
        Arc::new(HeuristicTagService),
        Arc::new(WhitespaceTokenizer),
    )
    .unwrap()
}

#[test]
fn remembering_identical_content_twice_dedups_to_one_node() {
    let dir = tempdir().unwrap();
    let memory = open_memory(&dir.path().join("htm.db"));

    let first = memory.remember("water boils at 100C at sea level", None, None, "chemist").unwrap();
    let second = memory.remember("water boils at 100C at sea level", None, None, "chemist").unwrap();

    assert_eq!(first, second);
}

#[test]
fn hybrid_recall_finds_a_remembered_node_by_keyword() {
    let dir = tempdir().unwrap();
    let memory = open_memory(&dir.path().join("htm.db"));

    let node_id = memory.remember("octopuses have three hearts", None, None, "biologist").unwrap();
    memory.remember("rust has a strong type system", None, None, "biologist").unwrap();

    let results = memory
        .recall("octopus hearts", Strategy::Hybrid, 5, None, None, None, true)
        .unwrap();

    assert!(results.iter().any(|r| r.node_id == node_id));
}

#[test]
fn recall_with_tag_filter_excludes_untagged_nodes() {
    let dir = tempdir().unwrap();
    let memory = open_memory(&dir.path().join("htm.db"));

    let tagged = memory
        .remember("deploy the service to staging", Some(&["ops/deploy".to_string()]), None, "sre")
        .unwrap();
    memory.remember("deploy the service to staging twice removed", None, None, "sre").unwrap();

    let tags = vec!["ops/deploy".to_string()];
    let results = memory
        .recall("deploy", Strategy::Fulltext, 10, None, Some(&tags), None, true)
        .unwrap();

    assert!(results.iter().all(|r| r.node_id == tagged));
}

#[test]
fn forget_then_restore_round_trips_through_recall() {
    let dir = tempdir().unwrap();
    let memory = open_memory(&dir.path().join("htm.db"));

    let node_id = memory.remember("the eiffel tower is in paris", None, None, "geographer").unwrap();
    assert!(memory.forget(node_id, true, None).unwrap());

    let results = memory
        .recall("eiffel tower", Strategy::Fulltext, 5, None, None, None, true)
        .unwrap();
    assert!(!results.iter().any(|r| r.node_id == node_id));

    assert!(memory.restore(node_id).unwrap());
    let results = memory
        .recall("eiffel tower", Strategy::Fulltext, 5, None, None, None, true)
        .unwrap();
    assert!(results.iter().any(|r| r.node_id == node_id));
}

#[test]
fn non_raw_recall_promotes_results_into_working_memory() {
    let dir = tempdir().unwrap();
    let memory = open_memory(&dir.path().join("htm.db"));

    let node_id = memory.remember("promote me into working memory", None, None, "analyst").unwrap();
    memory.forget(node_id, true, None).unwrap();
    memory.restore(node_id).unwrap();

    // Clear it from working memory so the recall-side promotion is the only source.
    memory.working_memory("analyst").remove(node_id);
    assert!(!memory.working_memory("analyst").contains(node_id));

    memory
        .recall("promote me", Strategy::Fulltext, 5, None, None, Some("analyst"), false)
        .unwrap();

    assert!(memory.working_memory("analyst").contains(node_id));
}
