//! Integration tests for opening and configuring a [`htm::Memory`] service.

use htm::{Config, EmbeddingDimension, Memory};
use tempfile::tempdir;

#[test]
fn open_creates_a_new_database() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("htm.db");

    assert!(!path.exists());
    let memory = Memory::open(&path, Config::default()).unwrap();
    assert!(path.exists());
    assert_eq!(memory.config().dimension(), 384);
}

#[test]
fn open_with_custom_dimension_is_honored() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("htm.db");

    let config = Config {
        embedding_dimension: EmbeddingDimension::D768,
        ..Default::default()
    };
    let memory = Memory::open(&path, config).unwrap();
    assert_eq!(memory.config().dimension(), 768);
}

#[test]
fn reopen_preserves_configured_dimension() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("htm.db");

    let config = Config {
        embedding_dimension: EmbeddingDimension::Custom(64),
        ..Default::default()
    };
    {
        let memory = Memory::open(&path, config.clone()).unwrap();
        assert_eq!(memory.config().dimension(), 64);
    }
    let memory = Memory::open(&path, config).unwrap();
    assert_eq!(memory.config().dimension(), 64);
}

#[test]
fn zero_working_memory_budget_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("htm.db");

    let config = Config {
        working_memory_max_tokens: 0,
        ..Default::default()
    };
    let result = Memory::open(&path, config);
    assert!(result.is_err());
}

#[test]
fn remember_and_get_node_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("htm.db");
    let memory = Memory::open(&path, Config::default()).unwrap();

    let node_id = memory.remember("the sky is blue", None, None, "observer").unwrap();
    let node = memory.get_node(node_id, false).unwrap().expect("node should exist");
    assert_eq!(node.content, "the sky is blue");
    assert!(node.deleted_at.is_none());
}
