//! ============================================================================
//! Memory Store - Embedded redb persistence for memories
//! ============================================================================
//! Persists memories locally and runs retrieval as a single write
//! transaction, so the access bookkeeping of concurrent retrievals is
//! serialized by the database.
//! Default path: ~/.recall/memories.redb (override via RECALL_DB_PATH env var)
//! ============================================================================

use anyhow::{anyhow, Result};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ranker::MemoryRanker;
use super::types::{Memory, MemoryType, Retrieval, RetrievalQuery};

const MEMORIES: TableDefinition<&str, &[u8]> = TableDefinition::new("memories");

/// Environment variable overriding the database location
pub const DB_PATH_ENV: &str = "RECALL_DB_PATH";

const SECONDS_PER_DAY: i64 = 86_400;

/// Store statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_memories: usize,
    pub type_counts: HashMap<String, usize>,
    pub total_accesses: u64,
    pub never_accessed: usize,
}

/// Memory store backed by an embedded redb database
pub struct MemoryStore {
    db: Database,
    path: PathBuf,
    embedding_dim: usize,
}

fn memory_key(id: &Uuid) -> String {
    format!("memories:{}", id)
}

fn decode(bytes: &[u8]) -> Result<Memory> {
    bincode::deserialize(bytes).map_err(|e| anyhow!("Failed to deserialize memory: {}", e))
}

impl MemoryStore {
    /// Open (or create) the store at the given path.
    /// If `path` is None, uses RECALL_DB_PATH env var or ~/.recall/memories.redb
    pub fn open(path: Option<&str>, embedding_dim: usize) -> Result<Self> {
        let db_path = if let Some(p) = path {
            PathBuf::from(p)
        } else if let Ok(env_path) = std::env::var(DB_PATH_ENV) {
            PathBuf::from(env_path)
        } else {
            let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
            let recall_dir = home.join(".recall");
            std::fs::create_dir_all(&recall_dir)
                .map_err(|e| anyhow!("Failed to create .recall directory: {}", e))?;
            recall_dir.join("memories.redb")
        };

        info!("Opening memory store at: {}", db_path.display());

        let db = Database::create(&db_path)
            .map_err(|e| anyhow!("Failed to open database: {}", e))?;

        // Ensure the table exists by doing a write transaction
        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let _ = write_txn
                .open_table(MEMORIES)
                .map_err(|e| anyhow!("Failed to create memories table: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        Ok(Self {
            db,
            path: db_path,
            embedding_dim,
        })
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Insert or replace a memory; rejects records that fail validation
    pub fn store_memory(&self, memory: &Memory) -> Result<()> {
        memory
            .integrity(self.embedding_dim)
            .map_err(|w| anyhow!("Refusing to store memory: {}", w))?;

        let key = memory_key(&memory.id);
        let value = bincode::serialize(memory)
            .map_err(|e| anyhow!("Failed to serialize memory: {}", e))?;

        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let mut table = write_txn.open_table(MEMORIES)
                .map_err(|e| anyhow!("Failed to open memories table: {}", e))?;
            table.insert(key.as_str(), value.as_slice())
                .map_err(|e| anyhow!("Failed to insert memory: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;

        debug!("Stored memory {} ({})", memory.id, memory.memory_type);
        Ok(())
    }

    pub fn get_memory(&self, id: &Uuid) -> Result<Option<Memory>> {
        let key = memory_key(id);

        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn.open_table(MEMORIES)
            .map_err(|e| anyhow!("Failed to open memories table: {}", e))?;

        let value = table.get(key.as_str()).map_err(|e| anyhow!("Failed to get memory: {}", e))?;
        let memory = match value {
            Some(value) => Some(decode(value.value())?),
            None => None,
        };
        Ok(memory)
    }

    /// List stored memories, optionally restricted to one type
    pub fn list_memories(&self, type_filter: Option<MemoryType>) -> Result<Vec<Memory>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn.open_table(MEMORIES)
            .map_err(|e| anyhow!("Failed to open memories table: {}", e))?;

        let mut results = Vec::new();
        let iter = table.range::<&str>(..)
            .map_err(|e| anyhow!("Failed to iterate memories: {}", e))?;
        for entry in iter {
            let (_key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            let memory = decode(value.value())?;

            match type_filter {
                Some(filter) if memory.memory_type != filter => {}
                _ => results.push(memory),
            }
        }
        Ok(results)
    }

    /// Returns true if a memory was removed
    pub fn delete_memory(&self, id: &Uuid) -> Result<bool> {
        let key = memory_key(id);

        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        let removed = {
            let mut table = write_txn.open_table(MEMORIES)
                .map_err(|e| anyhow!("Failed to open memories table: {}", e))?;
            let removed = table.remove(key.as_str())
                .map_err(|e| anyhow!("Failed to delete memory: {}", e))?;
            removed.is_some()
        };
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;

        if removed {
            debug!("Deleted memory {}", id);
        }
        Ok(removed)
    }

    /// Revise the importance of a stored memory
    pub fn update_importance(&self, id: &Uuid, importance: f32) -> Result<()> {
        let mut memory = self
            .get_memory(id)?
            .ok_or_else(|| anyhow!("Memory not found: {}", id))?;

        memory.set_importance(importance)?;
        self.store_memory(&memory)?;
        debug!("Updated memory {} importance to {}", id, importance);
        Ok(())
    }

    // ========================================================================
    // Retrieval
    // ========================================================================

    /// Rank every stored memory against `query` and persist the access
    /// bookkeeping of the returned ones, all inside one write transaction.
    pub fn retrieve(&self, ranker: &MemoryRanker, query: &RetrievalQuery) -> Result<Retrieval> {
        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;

        let retrieval = {
            let mut table = write_txn.open_table(MEMORIES)
                .map_err(|e| anyhow!("Failed to open memories table: {}", e))?;

            let mut candidates = Vec::new();
            {
                let iter = table.range::<&str>(..)
                    .map_err(|e| anyhow!("Failed to iterate memories: {}", e))?;
                for entry in iter {
                    let (key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
                    match decode(value.value()) {
                        Ok(memory) => candidates.push(memory),
                        // one corrupt record must not block retrieval
                        Err(e) => warn!("Skipping unreadable record {}: {}", key.value(), e),
                    }
                }
            }

            let retrieval = ranker.retrieve(query, &mut candidates)?;

            for ranked in &retrieval.results {
                let key = memory_key(&ranked.memory.id);
                let value = bincode::serialize(&ranked.memory)
                    .map_err(|e| anyhow!("Failed to serialize memory: {}", e))?;
                table.insert(key.as_str(), value.as_slice())
                    .map_err(|e| anyhow!("Failed to update memory: {}", e))?;
            }

            retrieval
        };

        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;

        debug!(
            "Retrieval returned {} memories ({} integrity warnings)",
            retrieval.results.len(),
            retrieval.warnings.len()
        );
        Ok(retrieval)
    }

    // ========================================================================
    // Pruning
    // ========================================================================

    /// Memories not retrieved in the last `older_than_days` days, relative to `now`
    pub fn stale_memories(&self, older_than_days: i64, now: i64) -> Result<Vec<Memory>> {
        let cutoff = now - older_than_days.saturating_mul(SECONDS_PER_DAY);
        Ok(self
            .list_memories(None)?
            .into_iter()
            .filter(|m| m.last_accessed < cutoff)
            .collect())
    }

    /// Delete memories not retrieved in the last `older_than_days` days.
    /// Returns the number of memories deleted.
    pub fn prune_stale(&self, older_than_days: i64) -> Result<usize> {
        self.prune_stale_at(older_than_days, chrono::Utc::now().timestamp())
    }

    pub fn prune_stale_at(&self, older_than_days: i64, now: i64) -> Result<usize> {
        let stale = self.stale_memories(older_than_days, now)?;

        let mut deleted = 0;
        for memory in &stale {
            if self.delete_memory(&memory.id)? {
                deleted += 1;
            }
        }

        if deleted > 0 {
            info!("Pruned {} memories not accessed in {} days", deleted, older_than_days);
        }
        Ok(deleted)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn stats(&self) -> Result<StoreStats> {
        let memories = self.list_memories(None)?;

        let mut stats = StoreStats {
            total_memories: memories.len(),
            ..StoreStats::default()
        };
        for memory in &memories {
            *stats
                .type_counts
                .entry(memory.memory_type.to_string())
                .or_insert(0usize) += 1;
            stats.total_accesses += memory.access_count as u64;
            if memory.access_count == 0 {
                stats.never_accessed += 1;
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::config::RankerConfig;
    use crate::types::IntegrityIssue;

    const DIM: usize = 3;
    const NOW: i64 = 1_700_000_000;

    fn open_store(dir: &tempfile::TempDir) -> MemoryStore {
        let path = dir.path().join("memories.redb");
        MemoryStore::open(path.to_str(), DIM).unwrap()
    }

    fn ranker() -> MemoryRanker {
        MemoryRanker::new(RankerConfig {
            embedding_dimension: DIM,
            ..RankerConfig::default()
        })
        .unwrap()
    }

    fn memory(content: &str, memory_type: MemoryType, embedding: Vec<f32>) -> Memory {
        Memory::new_at(content.to_string(), memory_type, 0.5, embedding, DIM, NOW - 3_600).unwrap()
    }

    #[test]
    fn test_store_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let memory = memory("Sponsor is named Dana", MemoryType::UserFact, vec![1.0, 0.0, 0.0]);
        store.store_memory(&memory).unwrap();

        let loaded = store.get_memory(&memory.id).unwrap().unwrap();
        assert_eq!(loaded, memory);
        assert!(store.get_memory(&Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_store_rejects_wrong_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let mut memory = memory("bad", MemoryType::UserFact, vec![1.0, 0.0, 0.0]);
        memory.embedding.pop();
        assert!(store.store_memory(&memory).is_err());
        assert!(store.list_memories(None).unwrap().is_empty());
    }

    #[test]
    fn test_list_with_filter_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let goal = memory("Ninety meetings in ninety days", MemoryType::Goal, vec![0.0, 1.0, 0.0]);
        let trigger = memory("Stress at work", MemoryType::Trigger, vec![0.0, 0.0, 1.0]);
        store.store_memory(&goal).unwrap();
        store.store_memory(&trigger).unwrap();

        assert_eq!(store.list_memories(None).unwrap().len(), 2);
        let goals = store.list_memories(Some(MemoryType::Goal)).unwrap();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].id, goal.id);

        assert!(store.delete_memory(&goal.id).unwrap());
        assert!(!store.delete_memory(&goal.id).unwrap());
        assert_eq!(store.list_memories(None).unwrap().len(), 1);
    }

    #[test]
    fn test_update_importance() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let memory = memory("Finished step four", MemoryType::Milestone, vec![1.0, 1.0, 0.0]);
        store.store_memory(&memory).unwrap();

        store.update_importance(&memory.id, 0.95).unwrap();
        assert_eq!(store.get_memory(&memory.id).unwrap().unwrap().importance, 0.95);

        assert!(store.update_importance(&memory.id, 2.0).is_err());
        assert!(store.update_importance(&Uuid::new_v4(), 0.5).is_err());
    }

    #[test]
    fn test_retrieve_persists_access() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let close = memory("Cravings peak in the evening", MemoryType::Trigger, vec![1.0, 0.1, 0.0]);
        let far = memory("Likes hiking", MemoryType::UserFact, vec![0.0, 0.0, 1.0]);
        store.store_memory(&close).unwrap();
        store.store_memory(&far).unwrap();

        let query = RetrievalQuery::new(vec![1.0, 0.0, 0.0], 1).at(NOW);
        let retrieval = store.retrieve(&ranker(), &query).unwrap();

        assert_eq!(retrieval.len(), 1);
        assert_eq!(retrieval.results[0].memory.id, close.id);

        let persisted = store.get_memory(&close.id).unwrap().unwrap();
        assert_eq!(persisted.access_count, 1);
        assert_eq!(persisted.last_accessed, NOW);

        let untouched = store.get_memory(&far.id).unwrap().unwrap();
        assert_eq!(untouched.access_count, 0);
    }

    #[test]
    fn test_retrieve_skips_corrupt_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let good = memory("Meditation helps", MemoryType::CopingStrategy, vec![1.0, 0.0, 0.0]);
        store.store_memory(&good).unwrap();

        // written by an older deployment with a different embedding size
        let wide = MemoryStore {
            db: store.db,
            path: store.path.clone(),
            embedding_dim: 4,
        };
        let legacy = Memory::new_at(
            "legacy".to_string(),
            MemoryType::Summary,
            0.9,
            vec![1.0, 0.0, 0.0, 0.0],
            4,
            NOW,
        )
        .unwrap();
        wide.store_memory(&legacy).unwrap();
        let store = MemoryStore {
            db: wide.db,
            path: wide.path,
            embedding_dim: DIM,
        };

        let query = RetrievalQuery::new(vec![1.0, 0.0, 0.0], 5).at(NOW);
        let retrieval = store.retrieve(&ranker(), &query).unwrap();

        assert_eq!(retrieval.len(), 1);
        assert_eq!(retrieval.results[0].memory.id, good.id);
        assert_eq!(retrieval.warnings.len(), 1);
        assert_eq!(retrieval.warnings[0].memory_id, legacy.id);
        assert!(matches!(
            retrieval.warnings[0].issue,
            IntegrityIssue::DimensionMismatch { expected: 3, actual: 4 }
        ));
    }

    #[test]
    fn test_retrieve_invalid_query_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let memory = memory("Early riser", MemoryType::UserFact, vec![1.0, 0.0, 0.0]);
        store.store_memory(&memory).unwrap();

        let query = RetrievalQuery::new(vec![1.0, 0.0, 0.0], 0).at(NOW);
        assert!(store.retrieve(&ranker(), &query).is_err());
        assert_eq!(store.get_memory(&memory.id).unwrap().unwrap().access_count, 0);
    }

    #[test]
    fn test_prune_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);

        let mut old = memory("Old summary", MemoryType::Summary, vec![0.0, 1.0, 1.0]);
        old.created_at = NOW - 40 * SECONDS_PER_DAY;
        old.last_accessed = old.created_at;
        let mut fresh = memory("Recent win", MemoryType::Milestone, vec![1.0, 1.0, 1.0]);
        fresh.access_count = 3;
        store.store_memory(&old).unwrap();
        store.store_memory(&fresh).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_memories, 2);
        assert_eq!(stats.total_accesses, 3);
        assert_eq!(stats.never_accessed, 1);
        assert_eq!(stats.type_counts.get("summary"), Some(&1));

        assert_eq!(store.stale_memories(30, NOW).unwrap().len(), 1);
        assert_eq!(store.prune_stale_at(30, NOW).unwrap(), 1);
        assert!(store.get_memory(&old.id).unwrap().is_none());
        assert!(store.get_memory(&fresh.id).unwrap().is_some());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let memory = memory("Daughter's birthday is in June", MemoryType::UserFact, vec![0.5, 0.5, 0.0]);
        {
            let store = open_store(&dir);
            store.store_memory(&memory).unwrap();
        }
        let store = open_store(&dir);
        assert_eq!(store.get_memory(&memory.id).unwrap().unwrap().content, memory.content);
    }
}
