//! ============================================================================
//! Memory Ranker - Relevance scoring for memory retrieval
//! ============================================================================
//! Blends semantic similarity with recency, importance and access frequency:
//!
//! ```text
//! score = w_sim * cos(query, memory)
//!       + w_rec * exp(-decay * hours_since_last_access)
//!       + w_imp * importance
//!       + w_acc * access_count / max_access_count
//! ```
//!
//! Invalid candidates are skipped with an `IntegrityWarning` instead of
//! failing the whole retrieval.
//! ============================================================================

use std::cmp::Ordering;

use tracing::{debug, warn};

use super::config::RankerConfig;
use super::embeddings::cosine_similarity;
use super::types::{check_embedding, Memory, RankedMemory, Retrieval, RetrievalQuery, ScoreBreakdown};
use crate::types::{IntegrityWarning, RecallError};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Raw, unweighted ranking signals for one candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signals {
    /// Cosine similarity, -1.0..=1.0
    pub similarity: f32,
    /// Exponential recency, 0.0 < r <= 1.0
    pub recency: f32,
    /// Stored importance, 0.0..=1.0
    pub importance: f32,
    /// Access count rescaled across the candidate set, 0.0..=1.0
    pub access: f32,
}

/// Scores candidate memories and selects the top-K.
///
/// Holds no mutable state, so one instance can be shared between any number
/// of concurrent callers.
#[derive(Debug, Clone)]
pub struct MemoryRanker {
    config: RankerConfig,
}

struct Scored {
    index: usize,
    breakdown: ScoreBreakdown,
    score: f32,
}

impl MemoryRanker {
    /// Create a ranker; fails if the configuration is invalid
    pub fn new(config: RankerConfig) -> Result<Self, RecallError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    /// Rank `candidates` against `query` and return the top `query.top_k`.
    ///
    /// Every memory in the result has `access_count` incremented and
    /// `last_accessed` set to `query.now` in `candidates` before returning.
    pub fn retrieve(
        &self,
        query: &RetrievalQuery,
        candidates: &mut [Memory],
    ) -> Result<Retrieval, RecallError> {
        let top_k = self.validate_query(query)?;
        let (mut scored, warnings) = self.score_all(query, candidates);

        let view: &[Memory] = candidates;
        scored.sort_by(|a, b| rank_order(a, b, view));
        scored.truncate(top_k);

        let mut results = Vec::with_capacity(scored.len());
        for entry in scored {
            let memory = &mut candidates[entry.index];
            memory.touch(query.now);
            results.push(RankedMemory {
                memory: memory.clone(),
                score: entry.score,
                breakdown: entry.breakdown,
            });
        }

        debug!(
            "Retrieved {} of {} candidates ({} skipped)",
            results.len(),
            candidates.len(),
            warnings.len()
        );

        Ok(Retrieval { results, warnings })
    }

    /// Score every valid candidate without selecting or mutating anything.
    /// Returned in rank order.
    pub fn score(
        &self,
        query: &RetrievalQuery,
        candidates: &[Memory],
    ) -> Result<Vec<(usize, ScoreBreakdown)>, RecallError> {
        self.validate_query(query)?;
        let (mut scored, _) = self.score_all(query, candidates);
        scored.sort_by(|a, b| rank_order(a, b, candidates));
        Ok(scored.into_iter().map(|s| (s.index, s.breakdown)).collect())
    }

    /// Apply the configured weights to raw signals
    pub fn weigh(&self, signals: Signals) -> ScoreBreakdown {
        ScoreBreakdown {
            similarity: self.config.similarity_weight * signals.similarity,
            recency: self.config.recency_weight * signals.recency,
            importance: self.config.importance_weight * signals.importance,
            access: self.config.access_weight * signals.access,
        }
    }

    /// exp(-decay * hours since `last_accessed`), clamped to 1.0 for future timestamps
    pub fn recency(&self, last_accessed: i64, now: i64) -> f32 {
        let elapsed_secs = now.saturating_sub(last_accessed).max(0) as f64;
        let hours = elapsed_secs / SECONDS_PER_HOUR;
        (-self.config.decay_rate_per_hour * hours).exp() as f32
    }

    fn validate_query(&self, query: &RetrievalQuery) -> Result<usize, RecallError> {
        if query.top_k <= 0 {
            return Err(RecallError::InvalidArgument(format!(
                "top_k must be positive, got {}",
                query.top_k
            )));
        }
        if query.embedding.is_empty() {
            return Err(RecallError::InvalidArgument(
                "query embedding is empty".into(),
            ));
        }
        if let Err(issue) = check_embedding(&query.embedding, self.config.embedding_dimension) {
            return Err(RecallError::InvalidArgument(format!(
                "query embedding rejected: {}",
                issue
            )));
        }

        Ok(usize::try_from(query.top_k).unwrap_or(usize::MAX))
    }

    fn score_all(
        &self,
        query: &RetrievalQuery,
        candidates: &[Memory],
    ) -> (Vec<Scored>, Vec<IntegrityWarning>) {
        let mut valid = Vec::with_capacity(candidates.len());
        let mut warnings = Vec::new();

        for (index, memory) in candidates.iter().enumerate() {
            match memory.integrity(self.config.embedding_dimension) {
                Ok(()) => valid.push(index),
                Err(warning) => {
                    warn!("Data integrity warning: {}", warning);
                    warnings.push(warning);
                }
            }
        }

        let max_access = valid
            .iter()
            .map(|&i| candidates[i].access_count)
            .max()
            .unwrap_or(0);

        let scored = valid
            .into_iter()
            .map(|index| {
                let memory = &candidates[index];
                let signals = Signals {
                    similarity: cosine_similarity(&query.embedding, &memory.embedding),
                    recency: self.recency(memory.last_accessed, query.now),
                    importance: memory.importance,
                    access: normalize_access(memory.access_count, max_access),
                };
                let breakdown = self.weigh(signals);
                Scored {
                    index,
                    score: breakdown.total(),
                    breakdown,
                }
            })
            .collect();

        (scored, warnings)
    }
}

fn normalize_access(count: u32, max: u32) -> f32 {
    if max == 0 {
        0.0
    } else {
        count as f32 / max as f32
    }
}

/// Best first: higher score, then more recent access, then lower id
fn rank_order(a: &Scored, b: &Scored, candidates: &[Memory]) -> Ordering {
    let (ma, mb) = (&candidates[a.index], &candidates[b.index]);
    b.score
        .total_cmp(&a.score)
        .then_with(|| mb.last_accessed.cmp(&ma.last_accessed))
        .then_with(|| ma.id.cmp(&mb.id))
}
