//! ============================================================================
//! Memory Manager - Orchestrates memory storage and retrieval
//! ============================================================================
//! High-level API: embed text, store memories, recall the most relevant ones
//! and assemble them into a prompt context block.
//! ============================================================================

use anyhow::{anyhow, Result};
use tracing::{debug, info};
use uuid::Uuid;

use super::config::RankerConfig;
use super::embeddings::EmbeddingService;
use super::ranker::MemoryRanker;
use super::store::MemoryStore;
use super::types::{Memory, MemoryType, RecallContext, Retrieval, RetrievalQuery};

/// Memory manager combining store, embeddings and ranker
pub struct MemoryManager {
    store: MemoryStore,
    embeddings: EmbeddingService,
    ranker: MemoryRanker,
}

impl MemoryManager {
    /// Assemble a manager from parts; store and ranker must agree on dimension
    pub fn new(store: MemoryStore, embeddings: EmbeddingService, ranker: MemoryRanker) -> Result<Self> {
        let ranker_dim = ranker.config().embedding_dimension;
        if store.embedding_dim() != ranker_dim {
            return Err(anyhow!(
                "Store expects {}-dimensional embeddings but ranker is configured for {}",
                store.embedding_dim(),
                ranker_dim
            ));
        }

        Ok(Self {
            store,
            embeddings,
            ranker,
        })
    }

    /// Open the store at `db_path` (or the default location) with `config`
    pub fn open(db_path: Option<&str>, embeddings: EmbeddingService, config: RankerConfig) -> Result<Self> {
        let ranker = MemoryRanker::new(config)?;
        let store = MemoryStore::open(db_path, ranker.config().embedding_dimension)?;
        Self::new(store, embeddings, ranker)
    }

    /// Store a new memory with auto-generated embedding
    pub async fn remember(
        &self,
        content: &str,
        memory_type: MemoryType,
        importance: f32,
    ) -> Result<Memory> {
        debug!("Storing {} memory", memory_type);

        let embedding = self.embeddings.embed_single(content).await?;
        let memory = Memory::new(
            content.to_string(),
            memory_type,
            importance,
            embedding,
            self.store.embedding_dim(),
        )?;

        self.store.store_memory(&memory)?;

        info!("Stored memory {} ({})", memory.id, memory_type);
        Ok(memory)
    }

    /// Recall the memories most relevant to `query`.
    /// `top_k` defaults to the configured `max_memories_to_retrieve`.
    pub async fn recall(&self, query: &str, top_k: Option<i64>) -> Result<Retrieval> {
        let top_k = top_k.unwrap_or(self.default_top_k());
        debug!("Recalling up to {} memories", top_k);

        let embedding = self.embeddings.embed_single(query).await?;
        self.recall_by_embedding(embedding, top_k)
    }

    /// Recall with a precomputed query embedding
    pub fn recall_by_embedding(&self, embedding: Vec<f32>, top_k: i64) -> Result<Retrieval> {
        let query = RetrievalQuery::new(embedding, top_k);
        self.store.retrieve(&self.ranker, &query)
    }

    /// Build the prompt context for the user's current message
    pub async fn build_context(&self, current_message: &str) -> Result<RecallContext> {
        if current_message.trim().is_empty() {
            return Ok(RecallContext::default());
        }

        let retrieval = self.recall(current_message, None).await?;
        Ok(RecallContext::new(retrieval.results))
    }

    /// Delete a memory; returns false if it did not exist
    pub fn forget(&self, id: &Uuid) -> Result<bool> {
        self.store.delete_memory(id)
    }

    fn default_top_k(&self) -> i64 {
        i64::try_from(self.ranker.config().max_memories_to_retrieve).unwrap_or(i64::MAX)
    }

    /// Get reference to the store (for advanced operations)
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn ranker(&self) -> &MemoryRanker {
        &self.ranker
    }
}
