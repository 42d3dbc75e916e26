//! ============================================================================
//! Ranker Configuration - Weights and limits for memory retrieval
//! ============================================================================
//! Values are fixed when the ranker is constructed. Environment overrides are
//! read once at process start via `RankerConfig::from_env`.
//! ============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::embeddings::EMBEDDING_DIM;
use crate::types::RecallError;

/// Default number of memories injected into a prompt
pub const MAX_MEMORIES_TO_RETRIEVE: usize = 5;

/// Similarity is the baseline signal; the other weights are relative to it
pub const SIMILARITY_WEIGHT: f32 = 1.0;
pub const RECENCY_WEIGHT: f32 = 0.4;
pub const IMPORTANCE_WEIGHT: f32 = 0.2;
pub const ACCESS_WEIGHT: f32 = 0.2;

/// Recency halves roughly every three days of inactivity
pub const DECAY_RATE_PER_HOUR: f64 = 0.01;

/// Configuration for `MemoryRanker`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankerConfig {
    /// top_k used when the caller does not ask for a specific count
    pub max_memories_to_retrieve: usize,
    /// Required length of every embedding
    pub embedding_dimension: usize,
    pub similarity_weight: f32,
    pub recency_weight: f32,
    pub importance_weight: f32,
    pub access_weight: f32,
    /// Lambda for exp(-lambda * hours_since_last_access)
    pub decay_rate_per_hour: f64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            max_memories_to_retrieve: MAX_MEMORIES_TO_RETRIEVE,
            embedding_dimension: EMBEDDING_DIM,
            similarity_weight: SIMILARITY_WEIGHT,
            recency_weight: RECENCY_WEIGHT,
            importance_weight: IMPORTANCE_WEIGHT,
            access_weight: ACCESS_WEIGHT,
            decay_rate_per_hour: DECAY_RATE_PER_HOUR,
        }
    }
}

impl RankerConfig {
    /// Build from defaults overridden by `RECALL_*` environment variables:
    /// `RECALL_MAX_MEMORIES`, `RECALL_EMBEDDING_DIMENSION`,
    /// `RECALL_SIMILARITY_WEIGHT`, `RECALL_RECENCY_WEIGHT`,
    /// `RECALL_IMPORTANCE_WEIGHT`, `RECALL_ACCESS_WEIGHT`, `RECALL_DECAY_RATE`.
    pub fn from_env() -> Result<Self, RecallError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` but with an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RecallError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "RECALL_MAX_MEMORIES")? {
            config.max_memories_to_retrieve = v;
        }
        if let Some(v) = parse_var(&lookup, "RECALL_EMBEDDING_DIMENSION")? {
            config.embedding_dimension = v;
        }
        if let Some(v) = parse_var(&lookup, "RECALL_SIMILARITY_WEIGHT")? {
            config.similarity_weight = v;
        }
        if let Some(v) = parse_var(&lookup, "RECALL_RECENCY_WEIGHT")? {
            config.recency_weight = v;
        }
        if let Some(v) = parse_var(&lookup, "RECALL_IMPORTANCE_WEIGHT")? {
            config.importance_weight = v;
        }
        if let Some(v) = parse_var(&lookup, "RECALL_ACCESS_WEIGHT")? {
            config.access_weight = v;
        }
        if let Some(v) = parse_var(&lookup, "RECALL_DECAY_RATE")? {
            config.decay_rate_per_hour = v;
        }

        config.validate()?;
        debug!("Ranker config loaded: {:?}", config);
        Ok(config)
    }

    /// Reject configurations that would make scores meaningless
    pub fn validate(&self) -> Result<(), RecallError> {
        if self.embedding_dimension == 0 {
            return Err(RecallError::InvalidConfig(
                "embedding_dimension must be greater than zero".into(),
            ));
        }
        if self.max_memories_to_retrieve == 0 {
            return Err(RecallError::InvalidConfig(
                "max_memories_to_retrieve must be greater than zero".into(),
            ));
        }

        let weights = [
            ("similarity_weight", self.similarity_weight),
            ("recency_weight", self.recency_weight),
            ("importance_weight", self.importance_weight),
            ("access_weight", self.access_weight),
        ];
        for (name, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(RecallError::InvalidConfig(format!(
                    "{} must be a finite non-negative number, got {}",
                    name, weight
                )));
            }
        }

        if !self.decay_rate_per_hour.is_finite() || self.decay_rate_per_hour < 0.0 {
            return Err(RecallError::InvalidConfig(format!(
                "decay_rate_per_hour must be a finite non-negative number, got {}",
                self.decay_rate_per_hour
            )));
        }

        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, RecallError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| RecallError::InvalidConfig(format!("{} has invalid value '{}'", key, raw))),
        _ => Ok(None),
    }
}
