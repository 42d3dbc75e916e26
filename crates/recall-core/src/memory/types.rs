//! ============================================================================
//! Memory Types - Data structures for conversation memory
//! ============================================================================
//! Defines memory entries, retrieval queries, ranked results and the prompt
//! context block assembled from them.
//! ============================================================================

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{IntegrityIssue, IntegrityWarning, RecallError};

/// A single memory entry.
///
/// Fields are public so store backends can rehydrate records as they were
/// persisted; `Memory::new` is the validated way to create one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier for this memory
    pub id: Uuid,
    /// The actual memory content
    pub content: String,
    /// Type of memory
    pub memory_type: MemoryType,
    /// Importance score (0.0 - 1.0)
    pub importance: f32,
    /// Vector embedding, fixed length per deployment
    pub embedding: Vec<f32>,
    /// Unix timestamp when memory was created
    pub created_at: i64,
    /// Unix timestamp when memory was last retrieved
    pub last_accessed: i64,
    /// Number of times this memory was retrieved
    pub access_count: u32,
}

impl Memory {
    /// Create a new memory stamped with the current time
    pub fn new(
        content: String,
        memory_type: MemoryType,
        importance: f32,
        embedding: Vec<f32>,
        expected_dim: usize,
    ) -> Result<Self, RecallError> {
        let now = chrono::Utc::now().timestamp();
        Self::new_at(content, memory_type, importance, embedding, expected_dim, now)
    }

    /// Create a new memory with an explicit creation time
    pub fn new_at(
        content: String,
        memory_type: MemoryType,
        importance: f32,
        embedding: Vec<f32>,
        expected_dim: usize,
        created_at: i64,
    ) -> Result<Self, RecallError> {
        check_importance(importance)?;
        check_embedding(&embedding, expected_dim).map_err(|issue| match issue {
            IntegrityIssue::DimensionMismatch { expected, actual } => {
                RecallError::DimensionMismatch { expected, actual }
            }
            IntegrityIssue::NonFiniteEmbedding => {
                RecallError::InvalidArgument("embedding contains non-finite values".into())
            }
            IntegrityIssue::ImportanceOutOfRange { importance } => {
                RecallError::InvalidImportance(importance)
            }
        })?;

        Ok(Self {
            id: Uuid::new_v4(),
            content,
            memory_type,
            importance,
            embedding,
            created_at,
            last_accessed: created_at,
            access_count: 0,
        })
    }

    /// Revise importance (e.g. after re-summarization)
    pub fn set_importance(&mut self, importance: f32) -> Result<(), RecallError> {
        check_importance(importance)?;
        self.importance = importance;
        Ok(())
    }

    /// Record one retrieval at `now`
    pub fn touch(&mut self, now: i64) {
        self.access_count = self.access_count.saturating_add(1);
        // never move last_accessed before creation
        self.last_accessed = now.max(self.created_at);
    }

    /// Check a persisted record before it is scored
    pub fn integrity(&self, expected_dim: usize) -> Result<(), IntegrityWarning> {
        let issue = match check_embedding(&self.embedding, expected_dim) {
            Err(issue) => Some(issue),
            Ok(()) if check_importance(self.importance).is_err() => {
                Some(IntegrityIssue::ImportanceOutOfRange {
                    importance: self.importance,
                })
            }
            Ok(()) => None,
        };

        match issue {
            Some(issue) => Err(IntegrityWarning {
                memory_id: self.id,
                issue,
            }),
            None => Ok(()),
        }
    }
}

fn check_importance(importance: f32) -> Result<(), RecallError> {
    if !(0.0..=1.0).contains(&importance) {
        return Err(RecallError::InvalidImportance(importance));
    }
    Ok(())
}

/// Validate that an embedding has `expected_dim` finite components
pub fn check_embedding(embedding: &[f32], expected_dim: usize) -> Result<(), IntegrityIssue> {
    if embedding.len() != expected_dim {
        return Err(IntegrityIssue::DimensionMismatch {
            expected: expected_dim,
            actual: embedding.len(),
        });
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(IntegrityIssue::NonFiniteEmbedding);
    }
    Ok(())
}

/// Types of memories that can be stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Facts about the user (name, support network, etc.)
    UserFact,
    /// Recovery goals the user is working toward
    Goal,
    /// Situations or feelings that raise the risk of relapse
    Trigger,
    /// Techniques that have helped the user before
    CopingStrategy,
    /// Sobriety dates and other milestones
    Milestone,
    /// Conversation summary
    Summary,
    /// How the user wants to be spoken to
    Preference,
}

impl MemoryType {
    pub const ALL: [MemoryType; 7] = [
        MemoryType::UserFact,
        MemoryType::Goal,
        MemoryType::Trigger,
        MemoryType::CopingStrategy,
        MemoryType::Milestone,
        MemoryType::Summary,
        MemoryType::Preference,
    ];

    /// Get the display name for this memory type
    pub fn display_name(&self) -> &'static str {
        match self {
            MemoryType::UserFact => "User Fact",
            MemoryType::Goal => "Goal",
            MemoryType::Trigger => "Trigger",
            MemoryType::CopingStrategy => "Coping Strategy",
            MemoryType::Milestone => "Milestone",
            MemoryType::Summary => "Summary",
            MemoryType::Preference => "Preference",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::UserFact => "user_fact",
            MemoryType::Goal => "goal",
            MemoryType::Trigger => "trigger",
            MemoryType::CopingStrategy => "coping_strategy",
            MemoryType::Milestone => "milestone",
            MemoryType::Summary => "summary",
            MemoryType::Preference => "preference",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "userfact" | "user_fact" | "fact" => Ok(MemoryType::UserFact),
            "goal" => Ok(MemoryType::Goal),
            "trigger" => Ok(MemoryType::Trigger),
            "copingstrategy" | "coping_strategy" | "coping" => Ok(MemoryType::CopingStrategy),
            "milestone" => Ok(MemoryType::Milestone),
            "summary" => Ok(MemoryType::Summary),
            "preference" => Ok(MemoryType::Preference),
            _ => Err(format!("Unknown memory type: {}", s)),
        }
    }
}

/// A transient retrieval request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalQuery {
    pub embedding: Vec<f32>,
    /// Maximum results; non-positive values are rejected by the ranker
    pub top_k: i64,
    /// Unix timestamp used for recency and access bookkeeping
    pub now: i64,
}

impl RetrievalQuery {
    /// Query stamped with the current time
    pub fn new(embedding: Vec<f32>, top_k: i64) -> Self {
        Self {
            embedding,
            top_k,
            now: chrono::Utc::now().timestamp(),
        }
    }

    /// Override the evaluation time
    pub fn at(mut self, now: i64) -> Self {
        self.now = now;
        self
    }
}

/// Per-signal contributions to a memory's score, already weighted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub similarity: f32,
    pub recency: f32,
    pub importance: f32,
    pub access: f32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f32 {
        self.similarity + self.recency + self.importance + self.access
    }
}

/// A memory selected by the ranker, with its access metadata already bumped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedMemory {
    pub memory: Memory,
    pub score: f32,
    pub breakdown: ScoreBreakdown,
}

/// Outcome of one retrieval call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Retrieval {
    /// Ranked best-first
    pub results: Vec<RankedMemory>,
    /// Candidates skipped for failing validation
    pub warnings: Vec<IntegrityWarning>,
}

impl Retrieval {
    /// Identifiers and scores in rank order
    pub fn ids_with_scores(&self) -> Vec<(Uuid, f32)> {
        self.results.iter().map(|r| (r.memory.id, r.score)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }
}

/// Recalled memories ready to inject into the system prompt
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecallContext {
    pub memories: Vec<RankedMemory>,
}

impl RecallContext {
    pub fn new(memories: Vec<RankedMemory>) -> Self {
        Self { memories }
    }

    /// Format memories for inclusion in the system prompt
    pub fn format_for_prompt(&self) -> String {
        if self.memories.is_empty() {
            return String::new();
        }

        let mut formatted =
            String::from("\n<recalled_memories>\nWhat you remember about this person:\n");

        for ranked in &self.memories {
            formatted.push_str(&format!(
                "- [{}] {}\n",
                ranked.memory.memory_type.display_name(),
                ranked.memory.content
            ));
        }

        formatted.push_str("</recalled_memories>\n");
        formatted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIM: usize = 4;

    fn sample(content: &str, memory_type: MemoryType) -> Memory {
        Memory::new_at(
            content.to_string(),
            memory_type,
            0.8,
            vec![0.1, 0.2, 0.3, 0.4],
            DIM,
            1_000,
        )
        .unwrap()
    }

    #[test]
    fn test_memory_creation() {
        let memory = sample("Sober since March 3rd", MemoryType::Milestone);

        assert_eq!(memory.content, "Sober since March 3rd");
        assert_eq!(memory.memory_type, MemoryType::Milestone);
        assert_eq!(memory.importance, 0.8);
        assert_eq!(memory.access_count, 0);
        assert_eq!(memory.created_at, 1_000);
        assert_eq!(memory.last_accessed, memory.created_at);
    }

    #[test]
    fn test_dimension_rejected_at_construction() {
        let err = Memory::new(
            "short".to_string(),
            MemoryType::UserFact,
            0.5,
            vec![0.1, 0.2],
            DIM,
        )
        .unwrap_err();
        assert_eq!(err, RecallError::DimensionMismatch { expected: 4, actual: 2 });
    }

    #[test]
    fn test_non_finite_embedding_rejected() {
        let err = Memory::new(
            "nan".to_string(),
            MemoryType::UserFact,
            0.5,
            vec![0.1, f32::NAN, 0.2, 0.3],
            DIM,
        )
        .unwrap_err();
        assert!(matches!(err, RecallError::InvalidArgument(_)));
    }

    #[test]
    fn test_importance_bounds() {
        assert!(matches!(
            Memory::new("x".into(), MemoryType::Goal, 1.5, vec![0.0; DIM], DIM),
            Err(RecallError::InvalidImportance(_))
        ));

        let mut memory = sample("Call sponsor on Sundays", MemoryType::CopingStrategy);
        assert!(memory.set_importance(-0.1).is_err());
        assert_eq!(memory.importance, 0.8);
        memory.set_importance(0.3).unwrap();
        assert_eq!(memory.importance, 0.3);
    }

    #[test]
    fn test_touch_keeps_invariants() {
        let mut memory = sample("Walks help with cravings", MemoryType::CopingStrategy);

        memory.touch(5_000);
        assert_eq!(memory.access_count, 1);
        assert_eq!(memory.last_accessed, 5_000);

        // clock behind creation time
        memory.touch(10);
        assert_eq!(memory.access_count, 2);
        assert_eq!(memory.last_accessed, memory.created_at);

        memory.access_count = u32::MAX;
        memory.touch(6_000);
        assert_eq!(memory.access_count, u32::MAX);
    }

    #[test]
    fn test_integrity_check() {
        let mut memory = sample("Trigger: payday", MemoryType::Trigger);
        assert!(memory.integrity(DIM).is_ok());

        memory.embedding.push(0.5);
        let warning = memory.integrity(DIM).unwrap_err();
        assert_eq!(warning.memory_id, memory.id);
        assert_eq!(
            warning.issue,
            IntegrityIssue::DimensionMismatch { expected: 4, actual: 5 }
        );
    }

    #[test]
    fn test_integrity_flags_bad_importance() {
        let mut memory = sample("Anniversary dinner", MemoryType::Milestone);
        memory.importance = f32::NAN;
        let warning = memory.integrity(DIM).unwrap_err();
        assert!(matches!(
            warning.issue,
            IntegrityIssue::ImportanceOutOfRange { .. }
        ));
    }

    #[test]
    fn test_memory_type_parsing() {
        assert_eq!("user_fact".parse::<MemoryType>().unwrap(), MemoryType::UserFact);
        assert_eq!("coping-strategy".parse::<MemoryType>().unwrap(), MemoryType::CopingStrategy);
        assert_eq!("Trigger".parse::<MemoryType>().unwrap(), MemoryType::Trigger);
        assert!("mood".parse::<MemoryType>().is_err());

        for memory_type in MemoryType::ALL {
            assert_eq!(memory_type.to_string().parse::<MemoryType>().unwrap(), memory_type);
        }
    }

    #[test]
    fn test_query_builder() {
        let query = RetrievalQuery::new(vec![1.0; DIM], 3).at(42);
        assert_eq!(query.top_k, 3);
        assert_eq!(query.now, 42);
    }

    #[test]
    fn test_context_formatting() {
        let memory = sample("Prefers gentle check-ins", MemoryType::Preference);
        let context = RecallContext::new(vec![RankedMemory {
            memory,
            score: 1.2,
            breakdown: ScoreBreakdown {
                similarity: 0.8,
                recency: 0.2,
                importance: 0.1,
                access: 0.1,
            },
        }]);

        let formatted = context.format_for_prompt();
        assert!(formatted.contains("Prefers gentle check-ins"));
        assert!(formatted.contains("[Preference]"));
        assert!(formatted.contains("<recalled_memories>"));

        assert!(RecallContext::default().format_for_prompt().is_empty());
    }
}
