//! ============================================================================
//! Memory Module - Relevance-ranked conversation memory
//! ============================================================================
//! Stores what the companion has learned about a person and recalls the
//! memories most relevant to the current message.
//!
//! ## Features
//! - Validated memory records with fixed-dimension embeddings
//! - Ranking by similarity, recency, importance and access frequency
//! - Fail-soft handling of corrupt records (skipped and reported)
//! - Embedded redb persistence with transactional access bookkeeping
//!
//! ## Architecture
//! ```text
//! User Message → Embed → MemoryStore::retrieve → MemoryRanker → Top-K Memories
//!                                                                     ↓
//!                                   [System Prompt] + <recalled_memories>
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use recall_core::memory::{EmbeddingService, MemoryManager, MemoryType, RankerConfig};
//!
//! let embeddings = EmbeddingService::new_openai(api_key);
//! let manager = MemoryManager::open(None, embeddings, RankerConfig::from_env()?)?;
//!
//! manager.remember("Walks help with evening cravings", MemoryType::CopingStrategy, 0.8).await?;
//!
//! let context = manager.build_context("rough night again").await?;
//! let prompt_block = context.format_for_prompt();
//! ```
//! ============================================================================

mod config;
mod embeddings;
mod manager;
mod ranker;
mod store;
mod types;

// Re-export public types
pub use config::{
    RankerConfig, ACCESS_WEIGHT, DECAY_RATE_PER_HOUR, IMPORTANCE_WEIGHT, MAX_MEMORIES_TO_RETRIEVE,
    RECENCY_WEIGHT, SIMILARITY_WEIGHT,
};
pub use embeddings::{
    cosine_similarity, create_embedding_service, EmbeddingService, DEFAULT_EMBEDDING_MODEL,
    EMBEDDING_DIM,
};
pub use manager::MemoryManager;
pub use ranker::{MemoryRanker, Signals};
pub use store::{MemoryStore, StoreStats, DB_PATH_ENV};
pub use types::{
    check_embedding, Memory, MemoryType, RankedMemory, RecallContext, Retrieval, RetrievalQuery,
    ScoreBreakdown,
};
