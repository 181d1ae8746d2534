use crate::error::{CatalogError, Result};
use crate::types::{unix_ms, EmbeddingRecord, VectorKind};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{PoisonError, RwLock};

/// Storage contract the engines and the regeneration pipeline depend on.
///
/// The shipped implementation is [`EmbeddingRepository`]; tests substitute
/// failing stores to exercise unavailable-repository paths.
pub trait EmbeddingStore: Send + Sync {
    /// Upsert the vector for `(entity_id, kind)`. Rejects vectors whose
    /// length does not match the kind's fixed dimension.
    fn put(&self, entity_id: u64, kind: VectorKind, vector: Vec<f32>, version: u32) -> Result<()>;

    /// Fetch the stored vector for `(entity_id, kind)`.
    fn get(&self, entity_id: u64, kind: VectorKind) -> Result<Vec<f32>>;

    /// One page of records with `version < below_version`, in ascending
    /// entity id order, strictly after `after_id` when given.
    fn list_by_version(
        &self,
        kind: VectorKind,
        below_version: u32,
        limit: usize,
        after_id: Option<u64>,
    ) -> Result<Vec<EmbeddingRecord>>;

    /// How many records of `kind` still sit below `below_version`.
    fn count_below_version(&self, kind: VectorKind, below_version: u32) -> Result<usize>;

    /// All records of `kind` at exactly `version`, ascending by entity id.
    fn snapshot(&self, kind: VectorKind, version: u32) -> Result<Vec<EmbeddingRecord>>;
}

/// In-memory versioned vector store.
///
/// Records live in a `BTreeMap` keyed by `(kind, entity_id)`, so ascending-id
/// pagination is inherent to the structure rather than a per-call sort.
/// Writes to different entities are independent; the lock serializes them.
#[derive(Default)]
pub struct EmbeddingRepository {
    records: RwLock<BTreeMap<(VectorKind, u64), EmbeddingRecord>>,
}

impl EmbeddingRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every vector stored for an entity, across all kinds. Returns how
    /// many records were removed. Used for cascade deletes.
    pub fn remove_entity(&self, entity_id: u64) -> usize {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|(_, id), _| *id != entity_id);
        before - records.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many vectors of `kind` are stored, across all versions.
    #[must_use]
    pub fn count(&self, kind: VectorKind) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .range((Bound::Included((kind, 0)), Bound::Included((kind, u64::MAX))))
            .count()
    }

    /// Highest version present among vectors of `kind`, if any are stored.
    #[must_use]
    pub fn current_version(&self, kind: VectorKind) -> Option<u32> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .range((Bound::Included((kind, 0)), Bound::Included((kind, u64::MAX))))
            .map(|(_, record)| record.version)
            .max()
    }

    pub(crate) fn dump(&self) -> Vec<EmbeddingRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub(crate) fn restore(records: Vec<EmbeddingRecord>) -> Result<Self> {
        let repository = Self::new();
        {
            let mut map = repository
                .records
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for record in records {
                let expected = record.kind.dimension();
                if record.vector.len() != expected {
                    return Err(CatalogError::InvalidDimension {
                        expected,
                        actual: record.vector.len(),
                    });
                }
                map.insert((record.kind, record.entity_id), record);
            }
        }
        Ok(repository)
    }
}

impl EmbeddingStore for EmbeddingRepository {
    fn put(&self, entity_id: u64, kind: VectorKind, vector: Vec<f32>, version: u32) -> Result<()> {
        let expected = kind.dimension();
        if vector.len() != expected {
            return Err(CatalogError::InvalidDimension {
                expected,
                actual: vector.len(),
            });
        }

        let mut records = self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        // Identical re-puts are no-ops so reprocessing a batch after a crash
        // leaves the store byte-for-byte unchanged.
        if let Some(existing) = records.get(&(kind, entity_id)) {
            if existing.version == version && existing.vector == vector {
                return Ok(());
            }
        }

        records.insert(
            (kind, entity_id),
            EmbeddingRecord {
                entity_id,
                kind,
                vector,
                version,
                created_at: unix_ms(),
            },
        );
        Ok(())
    }

    fn get(&self, entity_id: u64, kind: VectorKind) -> Result<Vec<f32>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(kind, entity_id))
            .map(|record| record.vector.clone())
            .ok_or_else(|| {
                CatalogError::NotFound(format!("{} vector for entity {entity_id}", kind.as_str()))
            })
    }

    fn list_by_version(
        &self,
        kind: VectorKind,
        below_version: u32,
        limit: usize,
        after_id: Option<u64>,
    ) -> Result<Vec<EmbeddingRecord>> {
        let start = match after_id {
            Some(id) => Bound::Excluded((kind, id)),
            None => Bound::Included((kind, 0)),
        };
        let end = Bound::Included((kind, u64::MAX));

        let records = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .range((start, end))
            .map(|(_, record)| record)
            .filter(|record| record.version < below_version)
            .take(limit)
            .cloned()
            .collect())
    }

    fn count_below_version(&self, kind: VectorKind, below_version: u32) -> Result<usize> {
        let records = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .range((Bound::Included((kind, 0)), Bound::Included((kind, u64::MAX))))
            .filter(|(_, record)| record.version < below_version)
            .count())
    }

    fn snapshot(&self, kind: VectorKind, version: u32) -> Result<Vec<EmbeddingRecord>> {
        let records = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .range((Bound::Included((kind, 0)), Bound::Included((kind, u64::MAX))))
            .map(|(_, record)| record)
            .filter(|record| record.version == version)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn face_vector(fill: f32) -> Vec<f32> {
        vec![fill; VectorKind::Face.dimension()]
    }

    #[test]
    fn put_rejects_wrong_dimension() {
        let repo = EmbeddingRepository::new();
        let err = repo
            .put(1, VectorKind::Face, vec![0.0; 12], 1)
            .unwrap_err();
        match err {
            CatalogError::InvalidDimension { expected, actual } => {
                assert_eq!(expected, 128);
                assert_eq!(actual, 12);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let repo = EmbeddingRepository::new();
        repo.put(1, VectorKind::Face, face_vector(0.5), 1).unwrap();
        assert_eq!(repo.get(1, VectorKind::Face).unwrap(), face_vector(0.5));
    }

    #[test]
    fn get_missing_is_not_found() {
        let repo = EmbeddingRepository::new();
        let err = repo.get(42, VectorKind::Semantic).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[test]
    fn put_is_an_upsert_not_an_append() {
        let repo = EmbeddingRepository::new();
        repo.put(1, VectorKind::Face, face_vector(0.1), 1).unwrap();
        repo.put(1, VectorKind::Face, face_vector(0.2), 2).unwrap();

        assert_eq!(repo.len(), 1);
        assert_eq!(repo.get(1, VectorKind::Face).unwrap(), face_vector(0.2));
    }

    #[test]
    fn identical_re_put_preserves_created_at() {
        let repo = EmbeddingRepository::new();
        repo.put(1, VectorKind::Face, face_vector(0.1), 1).unwrap();
        let first = repo.dump();
        repo.put(1, VectorKind::Face, face_vector(0.1), 1).unwrap();
        assert_eq!(repo.dump(), first);
    }

    #[test]
    fn kinds_do_not_collide_on_entity_id() {
        let repo = EmbeddingRepository::new();
        repo.put(1, VectorKind::Face, face_vector(0.1), 1).unwrap();
        repo.put(1, VectorKind::Semantic, vec![0.2; 512], 1).unwrap();

        assert_eq!(repo.len(), 2);
        assert_eq!(repo.get(1, VectorKind::Face).unwrap().len(), 128);
        assert_eq!(repo.get(1, VectorKind::Semantic).unwrap().len(), 512);
    }

    #[test]
    fn list_by_version_pages_in_ascending_id_order() {
        let repo = EmbeddingRepository::new();
        for id in [5_u64, 3, 9, 1, 7] {
            repo.put(id, VectorKind::Face, face_vector(0.1), 1).unwrap();
        }

        let first = repo.list_by_version(VectorKind::Face, 2, 3, None).unwrap();
        let ids: Vec<u64> = first.iter().map(|r| r.entity_id).collect();
        assert_eq!(ids, vec![1, 3, 5]);

        let second = repo
            .list_by_version(VectorKind::Face, 2, 3, Some(5))
            .unwrap();
        let ids: Vec<u64> = second.iter().map(|r| r.entity_id).collect();
        assert_eq!(ids, vec![7, 9]);

        let third = repo
            .list_by_version(VectorKind::Face, 2, 3, Some(9))
            .unwrap();
        assert!(third.is_empty());
    }

    #[test]
    fn list_by_version_skips_already_upgraded_records() {
        let repo = EmbeddingRepository::new();
        repo.put(1, VectorKind::Face, face_vector(0.1), 1).unwrap();
        repo.put(2, VectorKind::Face, face_vector(0.2), 2).unwrap();
        repo.put(3, VectorKind::Face, face_vector(0.3), 1).unwrap();

        let page = repo.list_by_version(VectorKind::Face, 2, 10, None).unwrap();
        let ids: Vec<u64> = page.iter().map(|r| r.entity_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(repo.count_below_version(VectorKind::Face, 2).unwrap(), 2);
    }

    #[test]
    fn count_and_current_version_are_per_kind() {
        let repo = EmbeddingRepository::new();
        assert_eq!(repo.count(VectorKind::Face), 0);
        assert_eq!(repo.current_version(VectorKind::Face), None);

        repo.put(1, VectorKind::Face, face_vector(0.1), 1).unwrap();
        repo.put(2, VectorKind::Face, face_vector(0.2), 3).unwrap();
        repo.put(1, VectorKind::Semantic, vec![0.1; 512], 2).unwrap();

        assert_eq!(repo.count(VectorKind::Face), 2);
        assert_eq!(repo.count(VectorKind::Semantic), 1);
        assert_eq!(repo.current_version(VectorKind::Face), Some(3));
        assert_eq!(repo.current_version(VectorKind::Semantic), Some(2));
    }

    #[test]
    fn snapshot_returns_only_the_requested_version() {
        let repo = EmbeddingRepository::new();
        repo.put(1, VectorKind::Face, face_vector(0.1), 1).unwrap();
        repo.put(2, VectorKind::Face, face_vector(0.2), 2).unwrap();
        repo.put(3, VectorKind::Semantic, vec![0.1; 512], 2).unwrap();

        let snapshot = repo.snapshot(VectorKind::Face, 2).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].entity_id, 2);
    }

    #[test]
    fn remove_entity_cascades_across_kinds() {
        let repo = EmbeddingRepository::new();
        repo.put(1, VectorKind::Face, face_vector(0.1), 1).unwrap();
        repo.put(1, VectorKind::Semantic, vec![0.1; 512], 1).unwrap();
        repo.put(2, VectorKind::Face, face_vector(0.2), 1).unwrap();

        assert_eq!(repo.remove_entity(1), 2);
        assert_eq!(repo.len(), 1);
        assert!(repo.get(1, VectorKind::Face).is_err());
    }
}
