use crate::error::{Result, SearchError};
use crate::fusion::ScoredEntity;
use lumina_catalog::{EmbeddingRepository, EmbeddingStore, VectorKind};
use lumina_similarity::SimilarityIndex;

/// Semantic retrieval over one generation of stored vectors.
///
/// Built from a repository snapshot rather than querying the repository per
/// search, so a regeneration job writing new versions concurrently cannot
/// change a ranking mid-query. Rebuild after a regeneration completes to
/// pick up the new generation.
pub struct SemanticSearch {
    index: SimilarityIndex,
    kind: VectorKind,
    version: u32,
}

impl SemanticSearch {
    /// Index every vector of `kind` at exactly `version`.
    pub fn from_snapshot(
        repository: &EmbeddingRepository,
        kind: VectorKind,
        version: u32,
    ) -> Result<Self> {
        let records = repository.snapshot(kind, version)?;
        let mut index = SimilarityIndex::new(kind.dimension());
        for record in &records {
            index.add(record.entity_id, &record.vector)?;
        }

        log::debug!(
            "Semantic index built: {} {} vectors at version {}",
            records.len(),
            kind.as_str(),
            version
        );

        Ok(Self {
            index,
            kind,
            version,
        })
    }

    /// Rank indexed entities against a query embedding. Returns at most
    /// `limit` entities with similarity ≥ `min_similarity`, best first.
    pub fn search(
        &self,
        query: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredEntity>> {
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let hits = self.index.top_k(query, limit, min_similarity)?;
        Ok(hits
            .into_iter()
            .map(|(entity_id, score)| ScoredEntity::new(entity_id, score))
            .collect())
    }

    #[must_use]
    pub const fn kind(&self) -> VectorKind {
        self.kind
    }

    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn unit_vector(axis: usize) -> Vec<f32> {
        let mut v = vec![0.0_f32; VectorKind::Semantic.dimension()];
        v[axis] = 1.0;
        v
    }

    fn put(repository: &EmbeddingRepository, entity_id: u64, axis: usize, version: u32) {
        repository
            .put(entity_id, VectorKind::Semantic, unit_vector(axis), version)
            .unwrap();
    }

    #[test]
    fn snapshot_indexes_only_the_requested_version() {
        let repository = EmbeddingRepository::new();
        put(&repository, 1, 0, 2);
        put(&repository, 2, 1, 2);
        put(&repository, 3, 0, 1); // stale generation

        let search = SemanticSearch::from_snapshot(&repository, VectorKind::Semantic, 2).unwrap();
        assert_eq!(search.len(), 2);

        let hits = search.search(&unit_vector(0), 10, 0.0).unwrap();
        let ids: Vec<u64> = hits.iter().map(|h| h.entity_id).collect();
        assert!(ids.contains(&1));
        assert!(!ids.contains(&3));
    }

    #[test]
    fn search_ranks_by_similarity() {
        let repository = EmbeddingRepository::new();
        put(&repository, 1, 0, 1);
        put(&repository, 2, 1, 1);

        let search = SemanticSearch::from_snapshot(&repository, VectorKind::Semantic, 1).unwrap();

        let mut query = vec![0.0_f32; VectorKind::Semantic.dimension()];
        query[0] = 1.0;
        query[1] = 0.2;

        let hits = search.search(&query, 10, 0.0).unwrap();
        assert_eq!(hits[0].entity_id, 1);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn min_similarity_filters_weak_matches() {
        let repository = EmbeddingRepository::new();
        put(&repository, 1, 0, 1);
        put(&repository, 2, 1, 1); // orthogonal to the query

        let search = SemanticSearch::from_snapshot(&repository, VectorKind::Semantic, 1).unwrap();
        let hits = search.search(&unit_vector(0), 10, 0.5).unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity_id, 1);
    }

    #[test]
    fn empty_query_is_rejected() {
        let repository = EmbeddingRepository::new();
        let search = SemanticSearch::from_snapshot(&repository, VectorKind::Semantic, 1).unwrap();
        assert!(matches!(
            search.search(&[], 10, 0.0),
            Err(SearchError::EmptyQuery)
        ));
    }

    #[test]
    fn wrong_dimension_query_is_rejected() {
        let repository = EmbeddingRepository::new();
        put(&repository, 1, 0, 1);

        let search = SemanticSearch::from_snapshot(&repository, VectorKind::Semantic, 1).unwrap();
        assert!(matches!(
            search.search(&[1.0, 0.0], 10, 0.0),
            Err(SearchError::Similarity(_))
        ));
    }
}
