//! Benchmarks for htm's retrieval engine.
//!
//! Run with: `cargo bench`
//!
//! Performance targets:
//! - `remember()` < 5ms for a small node with no dedup hit
//! - `recall()` (hybrid, 1K nodes) < 20ms at limit 10

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use htm::{Config, EmbeddingDimension, EmbeddingService, Embedding, HeuristicTagService, JobBackend};
use htm::{Memory, Result, Strategy, WhitespaceTokenizer};
use std::sync::Arc;
use tempfile::tempdir;

const DIMENSION: usize = 16;
const CORPUS_SIZE: usize = 1_000;

/// A fixed-dimension embedding service, deterministic in the input text, so
/// the vector index and fulltext index can both be populated synchronously
/// during benchmark setup without needing a real model.
struct DeterministicEmbedding;

impl EmbeddingService for DeterministicEmbedding {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let seed = text.bytes().fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
        Ok((0..DIMENSION)
            .map(|i| ((seed.wrapping_add(i as u32)) % 1000) as f32 / 1000.0)
            .collect())
    }

    fn dimension(&self) -> u16 {
        DIMENSION as u16
    }
}

fn bench_config() -> Config {
    Config {
        embedding_dimension: EmbeddingDimension::Custom(DIMENSION),
        job_backend: JobBackend::Inline,
        ..Default::default()
    }
}

fn open_memory(path: &std::path::Path) -> Memory {
    Memory::with_providers(
        path,
        bench_config(),
        Arc::new(DeterministicEmbedding),
        Arc::new(HeuristicTagService),
        Arc::new(WhitespaceTokenizer),
    )
    .unwrap()
}

/// Populates `memory` with `n` distinct nodes, each tagging and embedding
/// job run inline (`JobBackend::Inline`), so both derived indexes are fully
/// populated by the time this returns.
fn seed_corpus(memory: &Memory, n: usize) {
    for i in 0..n {
        memory
            .remember(
                &format!("note number {i} about topic {}", i % 23),
                None,
                None,
                "bench-robot",
            )
            .unwrap();
    }
}

fn bench_remember_no_dedup(c: &mut Criterion) {
    c.bench_function("remember_new_node", |b| {
        b.iter_custom(|iters| {
            let dir = tempdir().unwrap();
            let memory = open_memory(&dir.path().join("bench.db"));
            let mut total = std::time::Duration::ZERO;

            for i in 0..iters {
                let content = format!("benchmark content item {i}");
                let start = std::time::Instant::now();
                memory.remember(&content, None, None, "bench-robot").unwrap();
                total += start.elapsed();
            }

            total
        });
    });
}

fn bench_recall_strategies(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let memory = open_memory(&dir.path().join("bench.db"));
    seed_corpus(&memory, CORPUS_SIZE);

    let mut group = c.benchmark_group("recall");
    for strategy in [Strategy::Fulltext, Strategy::Vector, Strategy::Hybrid] {
        group.bench_with_input(BenchmarkId::from_parameter(format!("{strategy:?}")), &strategy, |b, strategy| {
            b.iter(|| {
                memory
                    .recall("topic 7", *strategy, 10, None, None, None, true)
                    .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_remember_no_dedup, bench_recall_strategies);
criterion_main!(benches);
