use crate::error::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Which retrieval signal put an entity into the merged result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Keyword,
    Semantic,
}

/// One entity with its per-signal relevance score in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntity {
    pub entity_id: u64,
    pub score: f32,
}

impl ScoredEntity {
    #[must_use]
    pub const fn new(entity_id: u64, score: f32) -> Self {
        Self { entity_id, score }
    }
}

/// A fused result with the combined score and the signals that contributed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedHit {
    pub entity_id: u64,
    pub score: f32,
    pub sources: BTreeSet<Signal>,
}

/// Weights for each ranking source. Additive, so they need not sum to 1;
/// the defaults do.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub keyword: f32,
    pub semantic: f32,
}

impl FusionWeights {
    #[must_use]
    pub const fn new(keyword: f32, semantic: f32) -> Self {
        Self { keyword, semantic }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, weight) in [("keyword", self.keyword), ("semantic", self.semantic)] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(SearchError::InvalidWeights(format!(
                    "{name} weight must be finite and non-negative, got {weight}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self::new(0.6, 0.4)
    }
}

/// Weighted-sum fusion for combining keyword and semantic rankings.
pub struct QueryFusionEngine {
    weights: FusionWeights,
}

impl QueryFusionEngine {
    pub fn new(weights: FusionWeights) -> Result<Self> {
        weights.validate()?;
        Ok(Self { weights })
    }

    /// Merge keyword and semantic results into one ranked list.
    ///
    /// Score formula: `keyword_weight * keyword_score + semantic_weight *
    /// semantic_score`, with a missing signal contributing `0`. Results are
    /// sorted by score descending; equal scores are ordered by ascending
    /// entity id.
    #[must_use]
    pub fn merge(&self, keyword: &[ScoredEntity], semantic: &[ScoredEntity]) -> Vec<MergedHit> {
        let mut merged: HashMap<u64, MergedHit> = HashMap::new();

        for hit in keyword {
            let entry = merged.entry(hit.entity_id).or_insert_with(|| MergedHit {
                entity_id: hit.entity_id,
                score: 0.0,
                sources: BTreeSet::new(),
            });
            entry.score += self.weights.keyword * hit.score;
            entry.sources.insert(Signal::Keyword);
        }

        for hit in semantic {
            let entry = merged.entry(hit.entity_id).or_insert_with(|| MergedHit {
                entity_id: hit.entity_id,
                score: 0.0,
                sources: BTreeSet::new(),
            });
            entry.score += self.weights.semantic * hit.score;
            entry.sources.insert(Signal::Semantic);
        }

        let mut hits: Vec<MergedHit> = merged.into_values().collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });

        log::debug!(
            "Fused {} keyword + {} semantic hits into {} results",
            keyword.len(),
            semantic.len(),
            hits.len()
        );

        hits
    }
}

impl Default for QueryFusionEngine {
    fn default() -> Self {
        Self {
            weights: FusionWeights::default(),
        }
    }
}
