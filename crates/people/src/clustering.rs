use crate::error::{PeopleError, Result};
use lumina_catalog::{Catalog, EmbeddingStore, VectorKind};
use lumina_similarity::cosine_similarity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// DBSCAN parameters. Similarity is used directly as the density measure:
/// two faces are neighbors when their cosine similarity is at least
/// `similarity_threshold`, and a face is a core point when it has at least
/// `min_points - 1` neighbors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringParams {
    pub similarity_threshold: f32,
    pub min_points: usize,
}

impl ClusteringParams {
    pub fn validate(&self) -> Result<()> {
        if !self.similarity_threshold.is_finite()
            || !(-1.0..=1.0).contains(&self.similarity_threshold)
        {
            return Err(PeopleError::InvalidParams(format!(
                "similarity threshold must be within [-1, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.min_points == 0 {
            return Err(PeopleError::InvalidParams(
                "min points must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
            min_points: 2,
        }
    }
}

/// Counters describing one clustering pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClusterPass {
    pub total_faces: usize,
    pub clusters: usize,
    pub noise_faces: usize,
    pub persons_created: usize,
    pub persons_reused: usize,
    pub persons_pruned: usize,
    pub faces_assigned: usize,
    pub faces_unassigned: usize,
}

/// Groups face vectors into persons with density-based clustering.
pub struct FaceClusterer {
    params: ClusteringParams,
}

impl FaceClusterer {
    pub fn new(params: ClusteringParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    #[must_use]
    pub const fn params(&self) -> ClusteringParams {
        self.params
    }

    /// Pure clustering step: group `(face id, vector)` pairs into clusters
    /// of face ids.
    ///
    /// Faces are processed in ascending id order, so identical input always
    /// produces identical clusters in identical order. Each returned cluster
    /// lists its members ascending; faces in no cluster are noise and are
    /// simply absent from the output.
    #[must_use]
    pub fn cluster(&self, faces: &[(u64, Vec<f32>)]) -> Vec<Vec<u64>> {
        let mut points: Vec<(u64, &[f32])> = faces
            .iter()
            .map(|(id, vector)| (*id, vector.as_slice()))
            .collect();
        points.sort_by_key(|(id, _)| *id);

        let n = points.len();
        let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); n];
        for i in 0..n {
            for j in (i + 1)..n {
                let similarity = cosine_similarity(points[i].1, points[j].1);
                if similarity >= self.params.similarity_threshold {
                    neighbors[i].push(j);
                    neighbors[j].push(i);
                }
            }
        }

        let required = self.params.min_points.saturating_sub(1);
        let core: Vec<bool> = neighbors.iter().map(|n| n.len() >= required).collect();

        let mut assigned = vec![false; n];
        let mut clusters: Vec<Vec<u64>> = Vec::new();

        for seed in 0..n {
            if assigned[seed] || !core[seed] {
                continue;
            }

            let mut members: Vec<u64> = Vec::new();
            let mut queue = VecDeque::from([seed]);
            while let Some(point) = queue.pop_front() {
                if assigned[point] {
                    continue;
                }
                assigned[point] = true;
                members.push(points[point].0);

                // Border points join the cluster but never expand it.
                if core[point] {
                    for &next in &neighbors[point] {
                        if !assigned[next] {
                            queue.push_back(next);
                        }
                    }
                }
            }

            members.sort_unstable();
            clusters.push(members);
        }

        clusters
    }

    /// Full clustering pass: cluster all face vectors at `vector_version`
    /// and reconcile the result with the people store.
    ///
    /// Existing persons are kept where possible: each cluster claims the
    /// unclaimed person it shares the most members with (lowest person id on
    /// a tie), clusters with no overlap get a fresh numbered person, and
    /// persons left without members are pruned. Snapshot faces that ended as
    /// noise lose their membership; faces with no vector at this version are
    /// left untouched.
    pub fn run(&self, catalog: &Catalog, vector_version: u32) -> Result<ClusterPass> {
        let records = catalog.vectors().snapshot(VectorKind::Face, vector_version)?;
        let faces: Vec<(u64, Vec<f32>)> = records
            .into_iter()
            .map(|r| (r.entity_id, r.vector))
            .collect();

        let clusters = self.cluster(&faces);
        let clustered: BTreeSet<u64> = clusters.iter().flatten().copied().collect();

        let mut stats = ClusterPass {
            total_faces: faces.len(),
            clusters: clusters.len(),
            noise_faces: faces.len() - clustered.len(),
            ..ClusterPass::default()
        };

        let people = catalog.people();

        // Membership before this pass, used for claim matching below.
        let prior: BTreeMap<u64, BTreeSet<u64>> = people
            .persons()
            .into_iter()
            .map(|p| (p.id, p.member_face_ids.into_iter().collect()))
            .collect();

        for (face_id, _) in &faces {
            if clustered.contains(face_id) {
                continue;
            }
            match people.unassign(*face_id) {
                Ok(Some(_)) => stats.faces_unassigned += 1,
                Ok(None) => {}
                Err(e) => log::warn!("Failed to unassign noise face {face_id}: {e}"),
            }
        }

        // Each cluster claims at most one existing person, greedily in
        // cluster order.
        let mut claimed: BTreeSet<u64> = BTreeSet::new();
        let targets: Vec<Option<u64>> = clusters
            .iter()
            .map(|members| {
                let member_set: BTreeSet<u64> = members.iter().copied().collect();
                let mut best_id = None;
                let mut best_overlap = 0;
                for (person_id, prior_members) in &prior {
                    if claimed.contains(person_id) {
                        continue;
                    }
                    let overlap = prior_members.intersection(&member_set).count();
                    if overlap > best_overlap {
                        best_overlap = overlap;
                        best_id = Some(*person_id);
                    }
                }
                if let Some(id) = best_id {
                    claimed.insert(id);
                }
                best_id
            })
            .collect();

        for (members, target) in clusters.iter().zip(&targets) {
            let person_id = match target {
                Some(id) => {
                    stats.persons_reused += 1;
                    *id
                }
                None => {
                    stats.persons_created += 1;
                    people.create_numbered_person().id
                }
            };

            for member in members {
                match people.face(*member) {
                    Ok(face) if face.person_id == Some(person_id) => {}
                    Ok(_) => match people.reassign(*member, person_id) {
                        Ok(()) => stats.faces_assigned += 1,
                        Err(e) => {
                            log::warn!("Failed to assign face {member} to person {person_id}: {e}");
                        }
                    },
                    Err(e) => log::warn!("Skipping face {member} with no catalog record: {e}"),
                }
            }
        }

        stats.persons_pruned = people.prune_empty_persons().len();

        log::info!(
            "Clustering pass: {} faces -> {} clusters ({} noise), {} persons created, {} reused, {} pruned",
            stats.total_faces,
            stats.clusters,
            stats.noise_faces,
            stats.persons_created,
            stats.persons_reused,
            stats.persons_pruned
        );

        Ok(stats)
    }
}

impl Default for FaceClusterer {
    fn default() -> Self {
        Self {
            params: ClusteringParams::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DIM: usize = 128;

    fn vector(components: &[(usize, f32)]) -> Vec<f32> {
        let mut v = vec![0.0_f32; DIM];
        for (axis, value) in components {
            v[*axis] = *value;
        }
        v
    }

    /// A (0.8 to B, 0.1 to C), B (0.08 to C).
    fn three_faces() -> Vec<(u64, Vec<f32>)> {
        vec![
            (1, vector(&[(0, 1.0)])),
            (2, vector(&[(0, 0.8), (1, 0.6)])),
            (3, vector(&[(0, 0.1), (2, 0.995)])),
        ]
    }

    #[test]
    fn similar_faces_cluster_and_outlier_stays_noise() {
        let clusterer = FaceClusterer::default();
        let clusters = clusterer.cluster(&three_faces());

        assert_eq!(clusters, vec![vec![1, 2]]);
    }

    #[test]
    fn chained_neighbors_merge_into_one_cluster() {
        let clusterer = FaceClusterer::default();
        // 1-2 and 2-3 are neighbors (~0.71), 1-3 are orthogonal.
        let faces = vec![
            (1, vector(&[(0, 1.0)])),
            (2, vector(&[(0, 0.7071), (1, 0.7071)])),
            (3, vector(&[(1, 1.0)])),
        ];

        let clusters = clusterer.cluster(&faces);
        assert_eq!(clusters, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn border_points_join_but_do_not_expand() {
        let clusterer = FaceClusterer::new(ClusteringParams {
            similarity_threshold: 0.6,
            min_points: 3,
        })
        .unwrap();

        // Hub 1 is a neighbor of both spokes (0.8); the spokes only share
        // similarity 0.28 with each other, so neither is core.
        let faces = vec![
            (1, vector(&[(0, 1.0)])),
            (2, vector(&[(0, 0.8), (1, 0.6)])),
            (3, vector(&[(0, 0.8), (1, -0.6)])),
        ];

        let clusters = clusterer.cluster(&faces);
        assert_eq!(clusters, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn orthogonal_faces_produce_no_clusters() {
        let clusterer = FaceClusterer::default();
        let faces = vec![
            (1, vector(&[(0, 1.0)])),
            (2, vector(&[(1, 1.0)])),
            (3, vector(&[(2, 1.0)])),
        ];

        assert!(clusterer.cluster(&faces).is_empty());
    }

    #[test]
    fn clustering_is_deterministic() {
        let clusterer = FaceClusterer::default();
        let faces = three_faces();

        let first = clusterer.cluster(&faces);
        let second = clusterer.cluster(&faces);
        assert_eq!(first, second);

        // Input order must not matter.
        let mut reversed = faces;
        reversed.reverse();
        assert_eq!(clusterer.cluster(&reversed), first);
    }

    #[test]
    fn empty_input_yields_no_clusters() {
        let clusterer = FaceClusterer::default();
        assert!(clusterer.cluster(&[]).is_empty());
    }

    #[test]
    fn invalid_params_are_rejected() {
        assert!(FaceClusterer::new(ClusteringParams {
            similarity_threshold: 1.5,
            min_points: 2,
        })
        .is_err());
        assert!(FaceClusterer::new(ClusteringParams {
            similarity_threshold: 0.6,
            min_points: 0,
        })
        .is_err());
    }
}
