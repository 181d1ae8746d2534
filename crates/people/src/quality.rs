use crate::error::{PeopleError, Result};
use lumina_catalog::{unix_ms, Catalog, EmbeddingStore, Person, VectorKind};
use lumina_similarity::cosine_similarity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flagging thresholds for cluster quality checks.
///
/// `sample_size` caps how many vectors per person feed the pairwise
/// cross-product when comparing two persons; members are taken in ascending
/// face id order so repeated runs sample identically.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub intra_floor: f32,
    pub inter_ceiling: f32,
    pub sample_size: usize,
}

impl QualityThresholds {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("intra floor", self.intra_floor),
            ("inter ceiling", self.inter_ceiling),
        ] {
            if !value.is_finite() || !(-1.0..=1.0).contains(&value) {
                return Err(PeopleError::InvalidParams(format!(
                    "{name} must be within [-1, 1], got {value}"
                )));
            }
        }
        if self.sample_size == 0 {
            return Err(PeopleError::InvalidParams(
                "sample size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            intra_floor: 0.55,
            inter_ceiling: 0.65,
            sample_size: 8,
        }
    }
}

/// One person's internal coherence: the mean pairwise similarity across its
/// face vectors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonQuality {
    pub person_id: u64,
    pub label: String,
    pub face_count: usize,
    pub intra_similarity: f32,
}

/// Two persons whose faces look too much alike.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmbiguousPair {
    pub person_a: u64,
    pub person_b: u64,
    pub inter_similarity: f32,
}

/// Outcome of one validation run. `persons` carries the intra similarity of
/// every person checked, in ascending person id order; `low_confidence` and
/// `ambiguous` are the flagged subsets, worst offenders first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterQualityReport {
    pub generated_at: u64,
    pub persons_checked: usize,
    pub pairs_checked: usize,
    pub persons: Vec<PersonQuality>,
    pub low_confidence: Vec<PersonQuality>,
    pub ambiguous: Vec<AmbiguousPair>,
}

impl ClusterQualityReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.low_confidence.is_empty() && self.ambiguous.is_empty()
    }
}

/// Checks person groupings for coherence problems worth a manual review.
pub struct ClusterQualityValidator {
    thresholds: QualityThresholds,
}

impl ClusterQualityValidator {
    pub fn new(thresholds: QualityThresholds) -> Result<Self> {
        thresholds.validate()?;
        Ok(Self { thresholds })
    }

    /// Mean pairwise similarity across one person's face vectors at
    /// `vector_version`. A person with fewer than two vectors counts as
    /// perfectly coherent (1.0). Returns `None` for an unknown person.
    #[must_use]
    pub fn person_intra_similarity(
        &self,
        catalog: &Catalog,
        vector_version: u32,
        person_id: u64,
    ) -> Option<f32> {
        let snapshot = face_vectors(catalog, vector_version).ok()?;
        let person = catalog.people().person(person_id).ok()?;
        let vectors = member_vectors(&snapshot, &person, usize::MAX);
        Some(mean_pairwise(&vectors).unwrap_or(1.0))
    }

    /// Mean similarity across the sampled cross-product of two persons'
    /// face vectors. Returns `None` when either person is unknown or has no
    /// vectors at `vector_version`.
    #[must_use]
    pub fn person_pair_similarity(
        &self,
        catalog: &Catalog,
        vector_version: u32,
        person_a: u64,
        person_b: u64,
    ) -> Option<f32> {
        let snapshot = face_vectors(catalog, vector_version).ok()?;
        let a = catalog.people().person(person_a).ok()?;
        let b = catalog.people().person(person_b).ok()?;
        let sample = self.thresholds.sample_size;
        mean_cross(
            &member_vectors(&snapshot, &a, sample),
            &member_vectors(&snapshot, &b, sample),
        )
    }

    /// Check every person and every person pair, flagging incoherent
    /// persons and ambiguous pairs.
    pub fn validate(&self, catalog: &Catalog, vector_version: u32) -> Result<ClusterQualityReport> {
        let snapshot = face_vectors(catalog, vector_version)?;
        let persons = catalog.people().persons();

        let mut report = ClusterQualityReport {
            generated_at: unix_ms(),
            ..ClusterQualityReport::default()
        };

        for person in &persons {
            report.persons_checked += 1;
            let vectors = member_vectors(&snapshot, person, usize::MAX);
            let intra = mean_pairwise(&vectors).unwrap_or(1.0);
            let quality = PersonQuality {
                person_id: person.id,
                label: person.label.clone(),
                face_count: person.member_face_ids.len(),
                intra_similarity: intra,
            };
            if intra < self.thresholds.intra_floor {
                report.low_confidence.push(quality.clone());
            }
            report.persons.push(quality);
        }

        let sample = self.thresholds.sample_size;
        let sampled: Vec<(u64, Vec<&[f32]>)> = persons
            .iter()
            .map(|person| (person.id, member_vectors(&snapshot, person, sample)))
            .collect();

        for i in 0..sampled.len() {
            for j in (i + 1)..sampled.len() {
                let Some(inter) = mean_cross(&sampled[i].1, &sampled[j].1) else {
                    continue;
                };
                report.pairs_checked += 1;
                if inter > self.thresholds.inter_ceiling {
                    report.ambiguous.push(AmbiguousPair {
                        person_a: sampled[i].0,
                        person_b: sampled[j].0,
                        inter_similarity: inter,
                    });
                }
            }
        }

        report.low_confidence.sort_by(|a, b| {
            a.intra_similarity
                .partial_cmp(&b.intra_similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        report.ambiguous.sort_by(|a, b| {
            b.inter_similarity
                .partial_cmp(&a.inter_similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        log::info!(
            "Quality validation: {} persons, {} pairs, {} low confidence, {} ambiguous",
            report.persons_checked,
            report.pairs_checked,
            report.low_confidence.len(),
            report.ambiguous.len()
        );

        Ok(report)
    }
}

impl Default for ClusterQualityValidator {
    fn default() -> Self {
        Self {
            thresholds: QualityThresholds::default(),
        }
    }
}

fn face_vectors(catalog: &Catalog, vector_version: u32) -> Result<BTreeMap<u64, Vec<f32>>> {
    Ok(catalog
        .vectors()
        .snapshot(VectorKind::Face, vector_version)?
        .into_iter()
        .map(|r| (r.entity_id, r.vector))
        .collect())
}

/// Up to `limit` member vectors in ascending face id order. Members with no
/// vector at the snapshot version are skipped.
fn member_vectors<'a>(
    snapshot: &'a BTreeMap<u64, Vec<f32>>,
    person: &Person,
    limit: usize,
) -> Vec<&'a [f32]> {
    let mut ids = person.member_face_ids.clone();
    ids.sort_unstable();
    ids.iter()
        .filter_map(|id| snapshot.get(id).map(Vec::as_slice))
        .take(limit)
        .collect()
}

fn mean_pairwise(vectors: &[&[f32]]) -> Option<f32> {
    if vectors.len() < 2 {
        return None;
    }
    let mut total = 0.0_f32;
    let mut pairs = 0_u32;
    for i in 0..vectors.len() {
        for j in (i + 1)..vectors.len() {
            total += cosine_similarity(vectors[i], vectors[j]);
            pairs += 1;
        }
    }
    Some(total / pairs as f32)
}

fn mean_cross(a: &[&[f32]], b: &[&[f32]]) -> Option<f32> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    let mut total = 0.0_f32;
    for left in a {
        for right in b {
            total += cosine_similarity(left, right);
        }
    }
    Some(total / (a.len() * b.len()) as f32)
}
