//! ============================================================================
//! RECALL-CORE: Memory for the recovery companion
//! ============================================================================
//! This crate handles long-term conversational memory:
//! - Validated memory records and retrieval queries
//! - Relevance ranking (similarity, recency, importance, access frequency)
//! - Embedding generation via an OpenAI-compatible API
//! - Local persistence in an embedded redb database
//! ============================================================================

pub mod memory;
pub mod types;

// Re-export main types for convenience
pub use memory::{
    Memory, MemoryManager, MemoryRanker, MemoryStore, MemoryType, RankerConfig, Retrieval,
    RetrievalQuery,
};
pub use types::*;
