use crate::cosine::cosine_similarity;
use crate::error::{Result, SimilarityError};
use std::collections::BTreeMap;

/// Brute-force similarity index over a candidate set.
///
/// A linear scan is O(n) per query, which is fine at the target scale of a
/// few thousand vectors. Candidates are kept in a `BTreeMap` so iteration is
/// always in ascending id order and ties resolve identically on every run.
pub struct SimilarityIndex {
    dimension: usize,
    vectors: BTreeMap<u64, Vec<f32>>,
}

impl SimilarityIndex {
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: BTreeMap::new(),
        }
    }

    /// Add a candidate vector to the index.
    pub fn add(&mut self, id: u64, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(SimilarityError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.vectors.insert(id, vector.to_vec());
        Ok(())
    }

    /// Top-K retrieval: at most `k` candidates with similarity ≥
    /// `min_similarity`, sorted by similarity descending. Equal scores are
    /// ordered by ascending candidate id.
    pub fn top_k(&self, query: &[f32], k: usize, min_similarity: f32) -> Result<Vec<(u64, f32)>> {
        if query.len() != self.dimension {
            return Err(SimilarityError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scores: Vec<(u64, f32)> = self
            .vectors
            .iter()
            .map(|(id, vector)| (*id, cosine_similarity(query, vector)))
            .filter(|(_, similarity)| *similarity >= min_similarity)
            .collect();

        scores.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        scores.truncate(k);

        Ok(scores)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn clear(&mut self) {
        self.vectors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn index_of(entries: &[(u64, Vec<f32>)]) -> SimilarityIndex {
        let dimension = entries.first().map_or(0, |(_, v)| v.len());
        let mut index = SimilarityIndex::new(dimension);
        for (id, vector) in entries {
            index.add(*id, vector).unwrap();
        }
        index
    }

    #[test]
    fn returns_at_most_k_sorted_descending() {
        let index = index_of(&[
            (1, vec![1.0, 0.0, 0.0]),
            (2, vec![0.9, 0.1, 0.0]),
            (3, vec![0.5, 0.5, 0.0]),
            (4, vec![0.0, 1.0, 0.0]),
        ]);

        let results = index.top_k(&[1.0, 0.0, 0.0], 2, 0.0).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 1);
        assert!((results[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(results[1].0, 2);
        assert!(results[0].1 >= results[1].1);
    }

    #[test]
    fn filters_below_min_similarity() {
        let index = index_of(&[(1, vec![1.0, 0.0]), (2, vec![0.0, 1.0])]);

        let results = index.top_k(&[1.0, 0.0], 10, 0.5).unwrap();
        assert_eq!(results, vec![(1, 1.0)]);
    }

    #[test]
    fn equal_scores_tie_break_by_ascending_id() {
        // Both candidates are the same vector, so their similarity is equal.
        let index = index_of(&[(7, vec![1.0, 0.0]), (3, vec![1.0, 0.0])]);

        let results = index.top_k(&[1.0, 0.0], 10, 0.0).unwrap();
        assert_eq!(results[0].0, 3);
        assert_eq!(results[1].0, 7);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut index = SimilarityIndex::new(3);
        assert!(index.add(0, &[1.0, 0.0]).is_err());

        index.add(0, &[1.0, 0.0, 0.0]).unwrap();
        assert!(index.top_k(&[1.0, 0.0], 1, 0.0).is_err());
    }

    #[test]
    fn empty_index_returns_no_results() {
        let index = SimilarityIndex::new(2);
        let results = index.top_k(&[1.0, 0.0], 5, 0.0).unwrap();
        assert!(results.is_empty());
    }
}
