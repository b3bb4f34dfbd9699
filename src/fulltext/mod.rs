//! Full-text index for the node content (§4.2, §11).
//!
//! The spec requires "the backing store's language-aware tokenizer index"
//! without naming one, so this embeds [`tantivy`] as a dedicated index
//! alongside the primary store, following the same derived-structure
//! discipline as [`crate::vector::HnswIndex`]: the redb-backed
//! [`crate::storage::MemoryStore`] is the source of truth, and this index
//! can always be rebuilt from it.

use std::path::Path;

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};

use crate::error::{Result, StorageError};
use crate::types::NodeId;

/// A single full-text hit: a node id with the engine's native relevance
/// score (§4.2 "BM25-equivalent").
#[derive(Clone, Debug, PartialEq)]
pub struct FulltextHit {
    /// The matched node.
    pub node_id: NodeId,
    /// Native relevance score, higher is more relevant.
    pub score: f32,
}

/// Tantivy-backed full-text index over node content.
///
/// `node_id` is stored as the hex string form of the UUID (a `STRING`
/// field, indexed but not tokenized) so a hit can be mapped straight back
/// to a [`NodeId`] without a side table.
pub struct FulltextIndex {
    index: Index,
    writer: std::sync::Mutex<IndexWriter>,
    reader: IndexReader,
    field_node_id: Field,
    field_content: Field,
}

impl FulltextIndex {
    /// Opens (or creates) a full-text index on disk at `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| StorageError::fulltext(e.to_string()))?;

        let mut schema_builder = Schema::builder();
        let field_node_id = schema_builder.add_text_field("node_id", STRING | STORED);
        let field_content = schema_builder.add_text_field("content", TEXT);
        let schema = schema_builder.build();

        let directory =
            MmapDirectory::open(dir).map_err(|e| StorageError::fulltext(e.to_string()))?;
        let index = Index::open_or_create(directory, schema)
            .map_err(|e| StorageError::fulltext(e.to_string()))?;

        let writer = index
            .writer(50_000_000)
            .map_err(|e| StorageError::fulltext(e.to_string()))?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e: tantivy::TantivyError| StorageError::fulltext(e.to_string()))?;

        Ok(Self {
            index,
            writer: std::sync::Mutex::new(writer),
            reader,
            field_node_id,
            field_content,
        })
    }

    /// Opens an in-memory index, for tests and for rebuilding from scratch
    /// before a fresh on-disk build completes.
    pub fn open_in_memory() -> Result<Self> {
        let mut schema_builder = Schema::builder();
        let field_node_id = schema_builder.add_text_field("node_id", STRING | STORED);
        let field_content = schema_builder.add_text_field("content", TEXT);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        let writer = index
            .writer(15_000_000)
            .map_err(|e| StorageError::fulltext(e.to_string()))?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e: tantivy::TantivyError| StorageError::fulltext(e.to_string()))?;

        Ok(Self {
            index,
            writer: std::sync::Mutex::new(writer),
            reader,
            field_node_id,
            field_content,
        })
    }

    /// Indexes (or re-indexes) a node's content. Does not delete a prior
    /// version of the same node id — callers rebuilding from scratch should
    /// use [`FulltextIndex::delete_node`] first, or start from an empty index.
    pub fn index_node(&self, node_id: NodeId, content: &str) -> Result<()> {
        let mut writer = self.writer.lock().expect("fulltext writer mutex poisoned");
        writer
            .add_document(doc!(
                self.field_node_id => node_id.to_string(),
                self.field_content => content,
            ))
            .map_err(|e| StorageError::fulltext(e.to_string()))?;
        writer
            .commit()
            .map_err(|e| StorageError::fulltext(e.to_string()))?;
        Ok(())
    }

    /// Removes every indexed document for a node id (soft-delete / hard-delete
    /// propagation).
    pub fn delete_node(&self, node_id: NodeId) -> Result<()> {
        let term = tantivy::Term::from_field_text(self.field_node_id, &node_id.to_string());
        let mut writer = self.writer.lock().expect("fulltext writer mutex poisoned");
        writer.delete_term(term);
        writer
            .commit()
            .map_err(|e| StorageError::fulltext(e.to_string()))?;
        Ok(())
    }

    /// Searches for `query`, returning up to `limit` hits ordered by
    /// relevance descending.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<FulltextHit>> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.field_content]);
        let parsed = parser
            .parse_query(query)
            .map_err(|e| StorageError::fulltext(e.to_string()))?;
        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(limit))
            .map_err(|e| StorageError::fulltext(e.to_string()))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let retrieved: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| StorageError::fulltext(e.to_string()))?;
            if let Some(node_id) = extract_node_id(&retrieved, self.field_node_id) {
                hits.push(FulltextHit { node_id, score });
            }
        }
        Ok(hits)
    }

    /// Number of committed documents (includes soft-deleted nodes that have
    /// not yet been removed from this index).
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}

fn extract_node_id(document: &TantivyDocument, field: Field) -> Option<NodeId> {
    use tantivy::schema::document::Value;
    let value = document.get_first(field)?;
    let text = value.as_str()?;
    uuid::Uuid::parse_str(text)
        .ok()
        .map(|u| NodeId::from_bytes(*u.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_and_finds_by_keyword() {
        let index = FulltextIndex::open_in_memory().unwrap();
        let id = NodeId::new();
        index.index_node(id, "Postgres HNSW index builds fast").unwrap();

        let hits = index.search("hnsw", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node_id, id);
    }

    #[test]
    fn unmatched_query_returns_empty() {
        let index = FulltextIndex::open_in_memory().unwrap();
        index
            .index_node(NodeId::new(), "Redis uses in-memory hashing")
            .unwrap();
        let hits = index.search("postgres", 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn empty_query_returns_empty() {
        let index = FulltextIndex::open_in_memory().unwrap();
        index.index_node(NodeId::new(), "some content").unwrap();
        assert!(index.search("", 10).unwrap().is_empty());
    }

    #[test]
    fn delete_node_removes_it_from_results() {
        let index = FulltextIndex::open_in_memory().unwrap();
        let id = NodeId::new();
        index.index_node(id, "caching strategies for web apps").unwrap();
        assert_eq!(index.search("caching", 10).unwrap().len(), 1);

        index.delete_node(id).unwrap();
        assert!(index.search("caching", 10).unwrap().is_empty());
    }

    #[test]
    fn results_are_ranked_by_relevance() {
        let index = FulltextIndex::open_in_memory().unwrap();
        let relevant = NodeId::new();
        let less_relevant = NodeId::new();
        index
            .index_node(relevant, "postgres postgres postgres hnsw vector search")
            .unwrap();
        index
            .index_node(less_relevant, "a brief mention of postgres")
            .unwrap();

        let hits = index.search("postgres", 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].node_id, relevant);
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn open_on_disk_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = NodeId::new();
        {
            let index = FulltextIndex::open(dir.path()).unwrap();
            index.index_node(id, "durable full text index").unwrap();
        }
        let reopened = FulltextIndex::open(dir.path()).unwrap();
        let hits = reopened.search("durable", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node_id, id);
    }
}
