//! redb-backed implementation of [`MemoryStore`].
//!
//! Every public method opens and commits its own transaction unless stated
//! otherwise; multi-table writes (e.g. [`RedbStore::attach_tags`]) are
//! wrapped in a single transaction so a crash leaves no partially-applied
//! index update behind.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use redb::{Database, ReadableMultimapTable, ReadableTable};
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::{Result, StorageError};
use crate::file_source::FileSource;
use crate::node::Node;
use crate::robot::{Robot, RobotNode};
use crate::tag::{ancestor_prefixes, NodeTag, Tag};
use crate::types::{FileSourceId, NodeId, RobotId, TagId, Timestamp};

use super::schema::{
    decode_node_id_from_created_at_key, encode_created_at_key, encode_link_key,
    DatabaseMetadata, EMBEDDINGS_TABLE, FILE_SOURCES_BY_PATH_TABLE, FILE_SOURCES_TABLE,
    METADATA_KEY, METADATA_TABLE, NODES_BY_CONTENT_HASH_TABLE, NODES_BY_CREATED_AT_TABLE,
    NODES_TABLE, NODE_TAGS_BY_NODE_TABLE, NODE_TAGS_BY_TAG_TABLE, NODE_TAGS_TABLE,
    ROBOTS_BY_NAME_TABLE, ROBOTS_TABLE, ROBOT_NODES_BY_NODE_TABLE, ROBOT_NODES_BY_ROBOT_TABLE,
    ROBOT_NODES_TABLE, SCHEMA_VERSION,
};
use super::MemoryStore;

/// An embedded, file-backed [`MemoryStore`] on top of redb.
pub struct RedbStore {
    db: Database,
    metadata: DatabaseMetadata,
    path: PathBuf,
    /// Held for the lifetime of the store to detect a second writer process
    /// opening the same path (§5, §11 cross-process advisory locking).
    _lock_file: File,
}

impl RedbStore {
    /// Opens (creating if absent) a redb-backed store at `path`.
    ///
    /// Acquires an exclusive advisory lock on a `.lock` sidecar file so a
    /// second process attempting to open the same path fails fast with
    /// `StorageError::DatabaseLocked` instead of corrupting the database.
    #[instrument(skip(config), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db_exists = path.exists();
        debug!(db_exists = db_exists, "Opening storage engine");
        let lock_file = acquire_writer_lock(&path)?;
        let db = Database::create(&path).map_err(StorageError::from)?;
        ensure_tables(&db)?;
        let metadata = load_or_initialize_metadata(&db, config)?;
        info!(
            schema_version = metadata.schema_version,
            dimension = metadata.embedding_dimension.size(),
            "Storage engine opened"
        );
        Ok(Self {
            db,
            metadata,
            path,
            _lock_file: lock_file,
        })
    }
}

fn acquire_writer_lock(db_path: &Path) -> Result<File> {
    let lock_path = db_path.with_extension("lock");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(&lock_path)
        .map_err(crate::error::MemoryError::Io)?;
    file.try_lock_exclusive()
        .map_err(|_| StorageError::DatabaseLocked)?;
    Ok(file)
}

fn ensure_tables(db: &Database) -> Result<()> {
    let write_txn = db.begin_write()?;
    {
        let _ = write_txn.open_table(METADATA_TABLE)?;
        let _ = write_txn.open_table(NODES_TABLE)?;
        let _ = write_txn.open_table(NODES_BY_CONTENT_HASH_TABLE)?;
        let _ = write_txn.open_multimap_table(NODES_BY_CREATED_AT_TABLE)?;
        let _ = write_txn.open_table(EMBEDDINGS_TABLE)?;
        let _ = write_txn.open_table(super::schema::TAGS_TABLE)?;
        let _ = write_txn.open_table(super::schema::TAGS_BY_NAME_TABLE)?;
        let _ = write_txn.open_table(NODE_TAGS_TABLE)?;
        let _ = write_txn.open_multimap_table(NODE_TAGS_BY_NODE_TABLE)?;
        let _ = write_txn.open_multimap_table(NODE_TAGS_BY_TAG_TABLE)?;
        let _ = write_txn.open_table(ROBOTS_TABLE)?;
        let _ = write_txn.open_table(ROBOTS_BY_NAME_TABLE)?;
        let _ = write_txn.open_table(ROBOT_NODES_TABLE)?;
        let _ = write_txn.open_multimap_table(ROBOT_NODES_BY_ROBOT_TABLE)?;
        let _ = write_txn.open_multimap_table(ROBOT_NODES_BY_NODE_TABLE)?;
        let _ = write_txn.open_table(FILE_SOURCES_TABLE)?;
        let _ = write_txn.open_table(FILE_SOURCES_BY_PATH_TABLE)?;
    }
    write_txn.commit()?;
    Ok(())
}

fn load_or_initialize_metadata(db: &Database, config: &Config) -> Result<DatabaseMetadata> {
    let existing = {
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(METADATA_TABLE)?;
        table.get(METADATA_KEY)?.map(|v| v.value().to_vec())
    };

    if let Some(bytes) = existing {
        let mut meta: DatabaseMetadata = bincode::deserialize(&bytes).map_err(StorageError::from)?;
        if !meta.is_compatible() {
            warn!(
                expected = SCHEMA_VERSION,
                found = meta.schema_version,
                "Schema version mismatch"
            );
            return Err(StorageError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION,
                found: meta.schema_version,
            }
            .into());
        }
        if meta.embedding_dimension.size() != config.embedding_dimension.size() {
            warn!(
                expected = config.embedding_dimension.size(),
                found = meta.embedding_dimension.size(),
                "Embedding dimension mismatch"
            );
            return Err(StorageError::corrupted(format!(
                "embedding dimension mismatch: database has {}, config requests {}",
                meta.embedding_dimension.size(),
                config.embedding_dimension.size()
            ))
            .into());
        }
        meta.touch();
        write_metadata(db, &meta)?;
        debug!("Existing database metadata validated");
        Ok(meta)
    } else {
        let meta = DatabaseMetadata::new(config.embedding_dimension);
        write_metadata(db, &meta)?;
        info!(dimension = meta.embedding_dimension.size(), "Database initialized");
        Ok(meta)
    }
}

fn write_metadata(db: &Database, meta: &DatabaseMetadata) -> Result<()> {
    let bytes = bincode::serialize(meta).map_err(StorageError::from)?;
    let write_txn = db.begin_write()?;
    {
        let mut table = write_txn.open_table(METADATA_TABLE)?;
        table.insert(METADATA_KEY, bytes.as_slice())?;
    }
    write_txn.commit()?;
    Ok(())
}

fn decode_node(bytes: &[u8]) -> Result<Node> {
    bincode::deserialize(bytes)
        .map_err(|e| StorageError::from(e).into())
}

fn decode_tag(bytes: &[u8]) -> Result<Tag> {
    bincode::deserialize(bytes).map_err(|e| StorageError::from(e).into())
}

fn decode_robot(bytes: &[u8]) -> Result<Robot> {
    bincode::deserialize(bytes).map_err(|e| StorageError::from(e).into())
}

impl MemoryStore for RedbStore {
    fn metadata(&self) -> &DatabaseMetadata {
        &self.metadata
    }

    #[instrument(skip(self))]
    fn close(self: Box<Self>) -> Result<()> {
        // redb flushes on drop; nothing else to flush here.
        info!("Storage engine closed");
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    // -- Node operations --------------------------------------------------

    #[instrument(skip(self, node), fields(id = %node.id))]
    fn insert_node(&self, node: &Node) -> Result<()> {
        let bytes = bincode::serialize(node).map_err(StorageError::from)?;
        let created_key = encode_created_at_key(node.created_at, node.id.as_bytes());
        let write_txn = self.db.begin_write()?;
        {
            let mut nodes = write_txn.open_table(NODES_TABLE)?;
            nodes.insert(node.id.as_bytes(), bytes.as_slice())?;

            let mut by_hash = write_txn.open_table(NODES_BY_CONTENT_HASH_TABLE)?;
            by_hash.insert(node.content_hash.as_str(), node.id.as_bytes())?;

            let mut by_created = write_txn.open_multimap_table(NODES_BY_CREATED_AT_TABLE)?;
            by_created.insert(&created_key, &[0u8; 0])?;
        }
        write_txn.commit()?;
        info!(id = %node.id, "Node created");
        Ok(())
    }

    fn get_node(&self, id: NodeId, include_deleted: bool) -> Result<Option<Node>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(NODES_TABLE)?;
        let Some(value) = table.get(id.as_bytes())? else {
            return Ok(None);
        };
        let node = decode_node(value.value())?;
        if node.deleted_at.is_some() && !include_deleted {
            return Ok(None);
        }
        Ok(Some(node))
    }

    fn find_by_content_hash(&self, hash: &str, include_deleted: bool) -> Result<Option<Node>> {
        let read_txn = self.db.begin_read()?;
        let by_hash = read_txn.open_table(NODES_BY_CONTENT_HASH_TABLE)?;
        let Some(id_value) = by_hash.get(hash)? else {
            return Ok(None);
        };
        let nodes = read_txn.open_table(NODES_TABLE)?;
        let Some(node_value) = nodes.get(id_value.value())? else {
            return Ok(None);
        };
        let node = decode_node(node_value.value())?;
        if node.deleted_at.is_some() && !include_deleted {
            return Ok(None);
        }
        Ok(Some(node))
    }

    fn soft_delete_node(&self, id: NodeId) -> Result<bool> {
        let changed = self.set_node_deleted_at(id, Some(Timestamp::now()))?;
        if changed {
            info!(id = %id, "Node soft-deleted");
        }
        Ok(changed)
    }

    fn restore_node(&self, id: NodeId) -> Result<bool> {
        let changed = self.set_node_deleted_at(id, None)?;
        if changed {
            info!(id = %id, "Node restored");
        }
        Ok(changed)
    }

    #[instrument(skip(self))]
    fn hard_delete_node(&self, id: NodeId) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let existed;
        {
            let mut nodes = write_txn.open_table(NODES_TABLE)?;
            let Some(existing) = nodes.get(id.as_bytes())?.map(|v| v.value().to_vec()) else {
                return Ok(false);
            };
            let node = decode_node(&existing)?;
            nodes.remove(id.as_bytes())?;

            let mut by_hash = write_txn.open_table(NODES_BY_CONTENT_HASH_TABLE)?;
            by_hash.remove(node.content_hash.as_str())?;

            let mut by_created = write_txn.open_multimap_table(NODES_BY_CREATED_AT_TABLE)?;
            let key = encode_created_at_key(node.created_at, id.as_bytes());
            by_created.remove(&key, &[0u8; 0])?;

            let mut embeddings = write_txn.open_table(EMBEDDINGS_TABLE)?;
            embeddings.remove(id.as_bytes())?;

            remove_node_tag_links(&write_txn, id)?;
            remove_robot_node_links_for_node(&write_txn, id)?;
            existed = true;
        }
        write_txn.commit()?;
        info!(id = %id, "Node hard-deleted");
        Ok(existed)
    }

    fn touch_last_accessed(&self, id: NodeId) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut nodes = write_txn.open_table(NODES_TABLE)?;
            let existing = nodes.get(id.as_bytes())?.map(|v| v.value().to_vec());
            if let Some(existing) = existing {
                let mut node = decode_node(&existing)?;
                node.last_accessed = Timestamp::now();
                let bytes = bincode::serialize(&node).map_err(StorageError::from)?;
                nodes.insert(id.as_bytes(), bytes.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn save_embedding(&self, id: NodeId, embedding: &[f32]) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let saved;
        {
            let mut nodes = write_txn.open_table(NODES_TABLE)?;
            let Some(existing) = nodes.get(id.as_bytes())?.map(|v| v.value().to_vec()) else {
                return Ok(false);
            };
            let mut node = decode_node(&existing)?;
            node.embedding_dimension = Some(embedding.len() as u32);
            node.updated_at = Timestamp::now();
            let bytes = bincode::serialize(&node).map_err(StorageError::from)?;
            nodes.insert(id.as_bytes(), bytes.as_slice())?;

            let mut embeddings = write_txn.open_table(EMBEDDINGS_TABLE)?;
            let raw = embedding_to_bytes(embedding);
            embeddings.insert(id.as_bytes(), raw.as_slice())?;
            saved = true;
        }
        write_txn.commit()?;
        Ok(saved)
    }

    fn get_embedding(&self, id: NodeId) -> Result<Option<Vec<f32>>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EMBEDDINGS_TABLE)?;
        let Some(value) = table.get(id.as_bytes())? else {
            return Ok(None);
        };
        Ok(Some(bytes_to_embedding(value.value())))
    }

    fn list_active_node_ids(&self) -> Result<Vec<NodeId>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(NODES_TABLE)?;
        let mut ids = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let node = decode_node(value.value())?;
            if node.is_active() {
                ids.push(node.id);
            }
        }
        Ok(ids)
    }

    fn recent_node_ids(&self, limit: usize) -> Result<Vec<NodeId>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_multimap_table(NODES_BY_CREATED_AT_TABLE)?;
        let mut ids = Vec::with_capacity(limit);
        for entry in table.iter()?.rev() {
            let (key, _) = entry?;
            let id_bytes = decode_node_id_from_created_at_key(key.value());
            ids.push(NodeId::from_bytes(id_bytes));
            if ids.len() >= limit {
                break;
            }
        }
        Ok(ids)
    }

    // -- Tag operations -----------------------------------------------------

    fn find_or_create_tag(&self, name: &str) -> Result<TagId> {
        let write_txn = self.db.begin_write()?;
        let id;
        {
            let mut by_name = write_txn.open_table(super::schema::TAGS_BY_NAME_TABLE)?;
            let existing = by_name.get(name)?.map(|v| *v.value());
            if let Some(existing) = existing {
                id = TagId::from_bytes(existing);
            } else {
                let tag = Tag {
                    id: TagId::new(),
                    name: name.to_string(),
                    created_at: Timestamp::now(),
                };
                id = tag.id;
                drop(by_name);
                let bytes = bincode::serialize(&tag).map_err(StorageError::from)?;
                let mut tags = write_txn.open_table(super::schema::TAGS_TABLE)?;
                tags.insert(tag.id.as_bytes(), bytes.as_slice())?;
                let mut by_name = write_txn.open_table(super::schema::TAGS_BY_NAME_TABLE)?;
                by_name.insert(name, tag.id.as_bytes())?;
            }
        }
        write_txn.commit()?;
        Ok(id)
    }

    fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let read_txn = self.db.begin_read()?;
        let by_name = read_txn.open_table(super::schema::TAGS_BY_NAME_TABLE)?;
        let Some(id_value) = by_name.get(name)? else {
            return Ok(None);
        };
        let tags = read_txn.open_table(super::schema::TAGS_TABLE)?;
        let Some(tag_value) = tags.get(id_value.value())? else {
            return Ok(None);
        };
        Ok(Some(decode_tag(tag_value.value())?))
    }

    fn attach_tags(&self, node_id: NodeId, tag_names: &[String]) -> Result<()> {
        let mut all_names = Vec::new();
        for name in tag_names {
            for prefix in ancestor_prefixes(name) {
                if !all_names.contains(&prefix) {
                    all_names.push(prefix);
                }
            }
        }

        let write_txn = self.db.begin_write()?;
        {
            for name in &all_names {
                let tag_id = {
                    let mut by_name = write_txn.open_table(super::schema::TAGS_BY_NAME_TABLE)?;
                    let existing = by_name.get(name.as_str())?.map(|v| *v.value());
                    if let Some(existing) = existing {
                        TagId::from_bytes(existing)
                    } else {
                        let tag = Tag {
                            id: TagId::new(),
                            name: name.clone(),
                            created_at: Timestamp::now(),
                        };
                        drop(by_name);
                        let bytes = bincode::serialize(&tag).map_err(StorageError::from)?;
                        let mut tags = write_txn.open_table(super::schema::TAGS_TABLE)?;
                        tags.insert(tag.id.as_bytes(), bytes.as_slice())?;
                        let mut by_name = write_txn.open_table(super::schema::TAGS_BY_NAME_TABLE)?;
                        by_name.insert(name.as_str(), tag.id.as_bytes())?;
                        tag.id
                    }
                };

                let link_key = encode_link_key(node_id.as_bytes(), tag_id.as_bytes());
                let mut links = write_txn.open_table(NODE_TAGS_TABLE)?;
                if links.get(&link_key)?.is_none() {
                    let link = NodeTag::new(node_id, tag_id);
                    let bytes = bincode::serialize(&link).map_err(StorageError::from)?;
                    links.insert(&link_key, bytes.as_slice())?;
                    drop(links);

                    let mut by_node = write_txn.open_multimap_table(NODE_TAGS_BY_NODE_TABLE)?;
                    by_node.insert(node_id.as_bytes(), tag_id.as_bytes())?;
                    let mut by_tag = write_txn.open_multimap_table(NODE_TAGS_BY_TAG_TABLE)?;
                    by_tag.insert(tag_id.as_bytes(), node_id.as_bytes())?;
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn tags_for_node(&self, node_id: NodeId) -> Result<Vec<Tag>> {
        let read_txn = self.db.begin_read()?;
        let by_node = read_txn.open_multimap_table(NODE_TAGS_BY_NODE_TABLE)?;
        let tags_table = read_txn.open_table(super::schema::TAGS_TABLE)?;
        let mut tags = Vec::new();
        for entry in by_node.get(node_id.as_bytes())? {
            let tag_id_bytes = entry?.value().to_owned();
            if let Some(value) = tags_table.get(&tag_id_bytes)? {
                tags.push(decode_tag(value.value())?);
            }
        }
        Ok(tags)
    }

    fn nodes_for_tag(&self, tag_id: TagId) -> Result<Vec<NodeId>> {
        let read_txn = self.db.begin_read()?;
        let by_tag = read_txn.open_multimap_table(NODE_TAGS_BY_TAG_TABLE)?;
        let nodes_table = read_txn.open_table(NODES_TABLE)?;
        let mut ids = Vec::new();
        for entry in by_tag.get(tag_id.as_bytes())? {
            let node_id_bytes = entry?.value().to_owned();
            if let Some(value) = nodes_table.get(&node_id_bytes)? {
                let node = decode_node(value.value())?;
                if node.is_active() {
                    ids.push(node.id);
                }
            }
        }
        Ok(ids)
    }

    fn recent_tag_names(&self, limit: usize) -> Result<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let tags_table = read_txn.open_table(super::schema::TAGS_TABLE)?;
        let mut tags: Vec<Tag> = Vec::new();
        for entry in tags_table.iter()? {
            let (_, value) = entry?;
            tags.push(decode_tag(value.value())?);
        }
        tags.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tags.into_iter().take(limit).map(|t| t.name).collect())
    }

    // -- Robot operations -----------------------------------------------------

    fn find_or_create_robot(&self, name: &str) -> Result<RobotId> {
        let write_txn = self.db.begin_write()?;
        let id;
        {
            let mut by_name = write_txn.open_table(ROBOTS_BY_NAME_TABLE)?;
            let existing = by_name.get(name)?.map(|v| *v.value());
            if let Some(existing) = existing {
                id = RobotId::from_bytes(existing);
            } else {
                let robot = Robot::new(name);
                id = robot.id;
                drop(by_name);
                let bytes = bincode::serialize(&robot).map_err(StorageError::from)?;
                let mut robots = write_txn.open_table(ROBOTS_TABLE)?;
                robots.insert(robot.id.as_bytes(), bytes.as_slice())?;
                let mut by_name = write_txn.open_table(ROBOTS_BY_NAME_TABLE)?;
                by_name.insert(name, robot.id.as_bytes())?;
            }
        }
        write_txn.commit()?;
        Ok(id)
    }

    fn get_robot(&self, id: RobotId) -> Result<Option<Robot>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ROBOTS_TABLE)?;
        let Some(value) = table.get(id.as_bytes())? else {
            return Ok(None);
        };
        Ok(Some(decode_robot(value.value())?))
    }

    fn delete_robot(&self, id: RobotId) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let existed;
        {
            let mut robots = write_txn.open_table(ROBOTS_TABLE)?;
            let Some(existing) = robots.get(id.as_bytes())?.map(|v| v.value().to_vec()) else {
                return Ok(false);
            };
            let robot = decode_robot(&existing)?;
            robots.remove(id.as_bytes())?;
            let mut by_name = write_txn.open_table(ROBOTS_BY_NAME_TABLE)?;
            by_name.remove(robot.name.as_str())?;

            let node_ids: Vec<[u8; 16]> = {
                let by_robot = write_txn.open_multimap_table(ROBOT_NODES_BY_ROBOT_TABLE)?;
                let ids = by_robot
                    .get(id.as_bytes())?
                    .map(|e| e.map(|v| v.value().to_owned()))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                ids
            };
            let mut links = write_txn.open_table(ROBOT_NODES_TABLE)?;
            let mut by_robot = write_txn.open_multimap_table(ROBOT_NODES_BY_ROBOT_TABLE)?;
            let mut by_node = write_txn.open_multimap_table(ROBOT_NODES_BY_NODE_TABLE)?;
            for node_id_bytes in node_ids {
                let link_key = encode_link_key(id.as_bytes(), &node_id_bytes);
                links.remove(&link_key)?;
                by_robot.remove(id.as_bytes(), &node_id_bytes)?;
                by_node.remove(&node_id_bytes, id.as_bytes())?;
            }
            existed = true;
        }
        write_txn.commit()?;
        Ok(existed)
    }

    fn link_robot_node(&self, robot_id: RobotId, node_id: NodeId) -> Result<RobotNode> {
        let link_key = encode_link_key(robot_id.as_bytes(), node_id.as_bytes());
        let write_txn = self.db.begin_write()?;
        let link;
        {
            let mut links = write_txn.open_table(ROBOT_NODES_TABLE)?;
            link = match links.get(&link_key)?.map(|v| v.value().to_vec()) {
                Some(existing) => {
                    let mut link: RobotNode = bincode::deserialize(&existing).map_err(StorageError::from)?;
                    link.reinforce();
                    link
                }
                None => RobotNode::new(robot_id, node_id),
            };
            let bytes = bincode::serialize(&link).map_err(StorageError::from)?;
            links.insert(&link_key, bytes.as_slice())?;
            drop(links);

            let mut by_robot = write_txn.open_multimap_table(ROBOT_NODES_BY_ROBOT_TABLE)?;
            by_robot.insert(robot_id.as_bytes(), node_id.as_bytes())?;
            let mut by_node = write_txn.open_multimap_table(ROBOT_NODES_BY_NODE_TABLE)?;
            by_node.insert(node_id.as_bytes(), robot_id.as_bytes())?;
        }
        write_txn.commit()?;
        Ok(link)
    }

    fn get_robot_node(&self, robot_id: RobotId, node_id: NodeId) -> Result<Option<RobotNode>> {
        let link_key = encode_link_key(robot_id.as_bytes(), node_id.as_bytes());
        let read_txn = self.db.begin_read()?;
        let links = read_txn.open_table(ROBOT_NODES_TABLE)?;
        let Some(value) = links.get(&link_key)? else {
            return Ok(None);
        };
        Ok(Some(
            bincode::deserialize(value.value()).map_err(StorageError::from)?,
        ))
    }

    fn set_working_memory_flag(&self, robot_id: RobotId, node_id: NodeId, value: bool) -> Result<()> {
        let link_key = encode_link_key(robot_id.as_bytes(), node_id.as_bytes());
        let write_txn = self.db.begin_write()?;
        {
            let mut links = write_txn.open_table(ROBOT_NODES_TABLE)?;
            let existing = links.get(&link_key)?.map(|v| v.value().to_vec());
            if let Some(existing) = existing {
                let mut link: RobotNode = bincode::deserialize(&existing).map_err(StorageError::from)?;
                link.working_memory = value;
                let bytes = bincode::serialize(&link).map_err(StorageError::from)?;
                links.insert(&link_key, bytes.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn robots_for_node(&self, node_id: NodeId) -> Result<Vec<RobotId>> {
        let read_txn = self.db.begin_read()?;
        let by_node = read_txn.open_multimap_table(ROBOT_NODES_BY_NODE_TABLE)?;
        let mut ids = Vec::new();
        for entry in by_node.get(node_id.as_bytes())? {
            ids.push(RobotId::from_bytes(*entry?.value()));
        }
        Ok(ids)
    }

    // -- FileSource operations -------------------------------------------

    fn save_file_source(&self, source: &FileSource) -> Result<()> {
        let bytes = bincode::serialize(source).map_err(StorageError::from)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(FILE_SOURCES_TABLE)?;
            table.insert(source.id.as_bytes(), bytes.as_slice())?;
            let mut by_path = write_txn.open_table(FILE_SOURCES_BY_PATH_TABLE)?;
            by_path.insert(source.file_path.as_str(), source.id.as_bytes())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_file_source(&self, id: FileSourceId) -> Result<Option<FileSource>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(FILE_SOURCES_TABLE)?;
        let Some(value) = table.get(id.as_bytes())? else {
            return Ok(None);
        };
        Ok(Some(
            bincode::deserialize(value.value()).map_err(StorageError::from)?,
        ))
    }

    fn get_file_source_by_path(&self, path: &str) -> Result<Option<FileSource>> {
        let read_txn = self.db.begin_read()?;
        let by_path = read_txn.open_table(FILE_SOURCES_BY_PATH_TABLE)?;
        let Some(id_value) = by_path.get(path)? else {
            return Ok(None);
        };
        let table = read_txn.open_table(FILE_SOURCES_TABLE)?;
        let Some(value) = table.get(id_value.value())? else {
            return Ok(None);
        };
        Ok(Some(
            bincode::deserialize(value.value()).map_err(StorageError::from)?,
        ))
    }
}

impl RedbStore {
    fn set_node_deleted_at(&self, id: NodeId, deleted_at: Option<Timestamp>) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let changed;
        {
            let mut nodes = write_txn.open_table(NODES_TABLE)?;
            let Some(existing) = nodes.get(id.as_bytes())?.map(|v| v.value().to_vec()) else {
                return Ok(false);
            };
            let mut node = decode_node(&existing)?;
            let already_in_target_state = node.deleted_at == deleted_at;
            if already_in_target_state {
                return Ok(false);
            }
            node.deleted_at = deleted_at;
            node.updated_at = Timestamp::now();
            let bytes = bincode::serialize(&node).map_err(StorageError::from)?;
            nodes.insert(id.as_bytes(), bytes.as_slice())?;
            drop(nodes);

            cascade_link_deleted_at(&write_txn, id, deleted_at)?;
            changed = true;
        }
        write_txn.commit()?;
        Ok(changed)
    }
}

fn cascade_link_deleted_at(
    write_txn: &redb::WriteTransaction,
    node_id: NodeId,
    deleted_at: Option<Timestamp>,
) -> Result<()> {
    let tag_ids: Vec<[u8; 16]> = {
        let by_node = write_txn.open_multimap_table(NODE_TAGS_BY_NODE_TABLE)?;
        let ids = by_node
            .get(node_id.as_bytes())?
            .map(|e| e.map(|v| v.value().to_owned()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ids
    };
    {
        let mut links = write_txn.open_table(NODE_TAGS_TABLE)?;
        for tag_id_bytes in &tag_ids {
            let link_key = encode_link_key(node_id.as_bytes(), tag_id_bytes);
            let existing = links.get(&link_key)?.map(|v| v.value().to_vec());
            if let Some(existing) = existing {
                let mut link: NodeTag = bincode::deserialize(&existing).map_err(StorageError::from)?;
                link.deleted_at = deleted_at;
                let bytes = bincode::serialize(&link).map_err(StorageError::from)?;
                links.insert(&link_key, bytes.as_slice())?;
            }
        }
    }

    let robot_ids: Vec<[u8; 16]> = {
        let by_node = write_txn.open_multimap_table(ROBOT_NODES_BY_NODE_TABLE)?;
        let ids = by_node
            .get(node_id.as_bytes())?
            .map(|e| e.map(|v| v.value().to_owned()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ids
    };
    {
        let mut links = write_txn.open_table(ROBOT_NODES_TABLE)?;
        for robot_id_bytes in &robot_ids {
            let link_key = encode_link_key(robot_id_bytes, node_id.as_bytes());
            let existing = links.get(&link_key)?.map(|v| v.value().to_vec());
            if let Some(existing) = existing {
                let mut link: RobotNode = bincode::deserialize(&existing).map_err(StorageError::from)?;
                link.deleted_at = deleted_at;
                let bytes = bincode::serialize(&link).map_err(StorageError::from)?;
                links.insert(&link_key, bytes.as_slice())?;
            }
        }
    }
    Ok(())
}

fn remove_node_tag_links(write_txn: &redb::WriteTransaction, node_id: NodeId) -> Result<()> {
    let tag_ids: Vec<[u8; 16]> = {
        let by_node = write_txn.open_multimap_table(NODE_TAGS_BY_NODE_TABLE)?;
        let ids = by_node
            .get(node_id.as_bytes())?
            .map(|e| e.map(|v| v.value().to_owned()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ids
    };
    let mut links = write_txn.open_table(NODE_TAGS_TABLE)?;
    let mut by_node = write_txn.open_multimap_table(NODE_TAGS_BY_NODE_TABLE)?;
    let mut by_tag = write_txn.open_multimap_table(NODE_TAGS_BY_TAG_TABLE)?;
    for tag_id_bytes in tag_ids {
        let link_key = encode_link_key(node_id.as_bytes(), &tag_id_bytes);
        links.remove(&link_key)?;
        by_node.remove(node_id.as_bytes(), &tag_id_bytes)?;
        by_tag.remove(&tag_id_bytes, node_id.as_bytes())?;
    }
    Ok(())
}

fn remove_robot_node_links_for_node(write_txn: &redb::WriteTransaction, node_id: NodeId) -> Result<()> {
    let robot_ids: Vec<[u8; 16]> = {
        let by_node = write_txn.open_multimap_table(ROBOT_NODES_BY_NODE_TABLE)?;
        let ids = by_node
            .get(node_id.as_bytes())?
            .map(|e| e.map(|v| v.value().to_owned()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ids
    };
    let mut links = write_txn.open_table(ROBOT_NODES_TABLE)?;
    let mut by_robot = write_txn.open_multimap_table(ROBOT_NODES_BY_ROBOT_TABLE)?;
    let mut by_node = write_txn.open_multimap_table(ROBOT_NODES_BY_NODE_TABLE)?;
    for robot_id_bytes in robot_ids {
        let link_key = encode_link_key(&robot_id_bytes, node_id.as_bytes());
        links.remove(&link_key)?;
        by_robot.remove(&robot_id_bytes, node_id.as_bytes())?;
        by_node.remove(node_id.as_bytes(), &robot_id_bytes)?;
    }
    Ok(())
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{content_hash, NewNode};
    use tempfile::tempdir;

    fn open_test_store() -> RedbStore {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let config = Config::default();
        let store = RedbStore::open(&path, &config).unwrap();
        std::mem::forget(dir);
        store
    }

    fn make_node(content: &str) -> Node {
        let hash = content_hash(content);
        let now = Timestamp::now();
        Node {
            id: NodeId::new(),
            content: content.to_string(),
            content_hash: hash,
            token_count: content.split_whitespace().count() as u32,
            embedding_dimension: None,
            created_at: now,
            updated_at: now,
            last_accessed: now,
            deleted_at: None,
            metadata: Default::default(),
            source_id: None,
            chunk_position: None,
        }
    }

    #[test]
    fn insert_and_get_node() {
        let store = open_test_store();
        let node = make_node("hello world");
        store.insert_node(&node).unwrap();
        let fetched = store.get_node(node.id, false).unwrap().unwrap();
        assert_eq!(fetched.content, "hello world");
    }

    #[test]
    fn find_by_content_hash_round_trips() {
        let store = open_test_store();
        let node = make_node("dedup me");
        store.insert_node(&node).unwrap();
        let found = store
            .find_by_content_hash(&node.content_hash, false)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, node.id);
    }

    #[test]
    fn soft_delete_hides_node_by_default() {
        let store = open_test_store();
        let node = make_node("to be deleted");
        store.insert_node(&node).unwrap();
        assert!(store.soft_delete_node(node.id).unwrap());
        assert!(store.get_node(node.id, false).unwrap().is_none());
        assert!(store.get_node(node.id, true).unwrap().is_some());
    }

    #[test]
    fn restore_makes_node_visible_again() {
        let store = open_test_store();
        let node = make_node("restore me");
        store.insert_node(&node).unwrap();
        store.soft_delete_node(node.id).unwrap();
        assert!(store.restore_node(node.id).unwrap());
        assert!(store.get_node(node.id, false).unwrap().is_some());
    }

    #[test]
    fn hard_delete_removes_node_and_links() {
        let store = open_test_store();
        let node = make_node("gone forever");
        store.insert_node(&node).unwrap();
        let robot_id = store.find_or_create_robot("r1").unwrap();
        store.link_robot_node(robot_id, node.id).unwrap();
        store.attach_tags(node.id, &["a:b".to_string()]).unwrap();

        assert!(store.hard_delete_node(node.id).unwrap());
        assert!(store.get_node(node.id, true).unwrap().is_none());
        assert!(store.robots_for_node(node.id).unwrap().is_empty());
    }

    #[test]
    fn save_and_get_embedding() {
        let store = open_test_store();
        let node = make_node("embed me");
        store.insert_node(&node).unwrap();
        let vector = vec![0.1_f32, 0.2, 0.3];
        assert!(store.save_embedding(node.id, &vector).unwrap());
        let fetched = store.get_embedding(node.id).unwrap().unwrap();
        assert_eq!(fetched.len(), 3);
        assert!((fetched[0] - 0.1).abs() < 1e-6);
        let refreshed = store.get_node(node.id, false).unwrap().unwrap();
        assert_eq!(refreshed.embedding_dimension, Some(3));
    }

    #[test]
    fn attach_tags_materializes_ancestors() {
        let store = open_test_store();
        let node = make_node("tag me");
        store.insert_node(&node).unwrap();
        store
            .attach_tags(node.id, &["database:postgresql:hnsw".to_string()])
            .unwrap();
        let tags = store.tags_for_node(node.id).unwrap();
        let names: Vec<_> = tags.iter().map(|t| t.name.clone()).collect();
        assert!(names.contains(&"database".to_string()));
        assert!(names.contains(&"database:postgresql".to_string()));
        assert!(names.contains(&"database:postgresql:hnsw".to_string()));
    }

    #[test]
    fn attach_tags_is_idempotent() {
        let store = open_test_store();
        let node = make_node("tag twice");
        store.insert_node(&node).unwrap();
        store.attach_tags(node.id, &["a:b".to_string()]).unwrap();
        store.attach_tags(node.id, &["a:b".to_string()]).unwrap();
        let tags = store.tags_for_node(node.id).unwrap();
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn link_robot_node_reinforces_existing_link() {
        let store = open_test_store();
        let node = make_node("remembered twice");
        store.insert_node(&node).unwrap();
        let robot_id = store.find_or_create_robot("r1").unwrap();
        store.link_robot_node(robot_id, node.id).unwrap();
        let link = store.link_robot_node(robot_id, node.id).unwrap();
        assert_eq!(link.remember_count, 2);
    }

    #[test]
    fn find_or_create_robot_is_idempotent() {
        let store = open_test_store();
        let a = store.find_or_create_robot("scout").unwrap();
        let b = store.find_or_create_robot("scout").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn recent_node_ids_orders_newest_first() {
        let store = open_test_store();
        let n1 = make_node("first");
        store.insert_node(&n1).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let n2 = make_node("second");
        store.insert_node(&n2).unwrap();
        let recent = store.recent_node_ids(2).unwrap();
        assert_eq!(recent[0], n2.id);
        assert_eq!(recent[1], n1.id);
    }

    #[test]
    fn nodes_for_tag_excludes_soft_deleted() {
        let store = open_test_store();
        let node = make_node("will be deleted");
        store.insert_node(&node).unwrap();
        store.attach_tags(node.id, &["x".to_string()]).unwrap();
        let tag_id = store.get_tag_by_name("x").unwrap().unwrap().id;
        assert_eq!(store.nodes_for_tag(tag_id).unwrap(), vec![node.id]);
        store.soft_delete_node(node.id).unwrap();
        assert!(store.nodes_for_tag(tag_id).unwrap().is_empty());
    }

    #[test]
    fn file_source_round_trip_by_path() {
        let store = open_test_store();
        let source = FileSource {
            id: FileSourceId::new(),
            file_path: "/notes/a.md".to_string(),
            file_hash: "h1".to_string(),
            mtime: 0,
            file_size: 10,
            frontmatter: Default::default(),
            last_synced_at: Timestamp::now(),
        };
        store.save_file_source(&source).unwrap();
        let fetched = store.get_file_source_by_path("/notes/a.md").unwrap().unwrap();
        assert_eq!(fetched.id, source.id);
    }
}
