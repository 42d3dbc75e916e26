//! ============================================================================
//! Shared Types - Errors and integrity reports for the recall engine
//! ============================================================================

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error types for memory ranking and validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum RecallError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Importance must be within 0.0..=1.0, got {0}")]
    InvalidImportance(f32),

    #[error("Invalid ranker configuration: {0}")]
    InvalidConfig(String),
}

/// Why a candidate memory was skipped during retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    /// Stored embedding has the wrong length
    DimensionMismatch { expected: usize, actual: usize },
    /// Stored embedding contains NaN or infinity
    NonFiniteEmbedding,
    /// Stored importance is outside 0.0..=1.0 or not a number
    ImportanceOutOfRange { importance: f32 },
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityIssue::DimensionMismatch { expected, actual } => {
                write!(f, "embedding has {} dimensions, expected {}", actual, expected)
            }
            IntegrityIssue::NonFiniteEmbedding => write!(f, "embedding contains non-finite values"),
            IntegrityIssue::ImportanceOutOfRange { importance } => {
                write!(f, "importance {} is outside 0.0..=1.0", importance)
            }
        }
    }
}

/// A candidate that failed validation and was left out of the ranking.
///
/// Reported alongside the results rather than raised, so one bad record
/// never aborts retrieval for the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityWarning {
    pub memory_id: Uuid,
    pub issue: IntegrityIssue,
}

impl std::fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "memory {} skipped: {}", self.memory_id, self.issue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RecallError::DimensionMismatch {
            expected: 1536,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "Embedding dimension mismatch: expected 1536, got 3"
        );
        assert!(RecallError::InvalidArgument("top_k must be positive".into())
            .to_string()
            .contains("top_k"));
    }

    #[test]
    fn test_warning_display() {
        let warning = IntegrityWarning {
            memory_id: Uuid::nil(),
            issue: IntegrityIssue::NonFiniteEmbedding,
        };
        let text = warning.to_string();
        assert!(text.contains("00000000-0000-0000-0000-000000000000"));
        assert!(text.contains("non-finite"));
    }
}
