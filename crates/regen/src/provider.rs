use async_trait::async_trait;
use lumina_catalog::VectorKind;
use thiserror::Error;

/// Errors from an external embedding provider. Both kinds are recoverable at
/// the job level: the pipeline counts the entity as failed and moves on.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider timed out after {timeout_ms} ms for entity {entity_id}")]
    Timeout { entity_id: u64, timeout_ms: u64 },

    #[error("Provider failure: {0}")]
    Failure(String),
}

/// External inference service that turns an entity into an embedding.
///
/// The engine never runs inference itself; implementations wrap whatever
/// face or CLIP model the host application ships.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn vector(
        &self,
        entity_id: u64,
        kind: VectorKind,
    ) -> std::result::Result<Vec<f32>, ProviderError>;
}

/// Deterministic stand-in provider. Vectors are seeded from the entity id,
/// vector kind, and generation, so the same request always yields the same
/// embedding and a new generation yields a different one.
#[derive(Debug, Clone, Copy)]
pub struct StubProvider {
    generation: u32,
}

impl StubProvider {
    #[must_use]
    pub const fn new(generation: u32) -> Self {
        Self { generation }
    }
}

#[async_trait]
impl EmbeddingProvider for StubProvider {
    async fn vector(
        &self,
        entity_id: u64,
        kind: VectorKind,
    ) -> std::result::Result<Vec<f32>, ProviderError> {
        Ok(stub_vector(entity_id, kind, self.generation))
    }
}

/// Pseudo-random unit vector for `(entity, kind, generation)`.
#[must_use]
pub fn stub_vector(entity_id: u64, kind: VectorKind, generation: u32) -> Vec<f32> {
    let dimension = kind.dimension();

    let mut seed = Vec::with_capacity(20);
    seed.extend_from_slice(&entity_id.to_le_bytes());
    seed.extend_from_slice(kind.as_str().as_bytes());
    seed.extend_from_slice(&generation.to_le_bytes());

    let mut state =
        fnv1a_64(&seed) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = splitmix64(&mut state);
        let high = (bits >> 32) as u32;
        let mantissa = high >> 9;
        let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
        vec.push(unit.mul_add(2.0, -1.0));
    }
    normalize(&mut vec);
    vec
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stub_vectors_are_deterministic() {
        assert_eq!(
            stub_vector(42, VectorKind::Face, 1),
            stub_vector(42, VectorKind::Face, 1)
        );
    }

    #[test]
    fn stub_vectors_vary_by_entity_kind_and_generation() {
        let base = stub_vector(42, VectorKind::Face, 1);
        assert_ne!(base, stub_vector(43, VectorKind::Face, 1));
        assert_ne!(base, stub_vector(42, VectorKind::Face, 2));
        assert_ne!(
            base.len(),
            stub_vector(42, VectorKind::Semantic, 1).len()
        );
    }

    #[test]
    fn stub_vectors_have_the_kind_dimension_and_unit_norm() {
        for kind in [VectorKind::Face, VectorKind::Semantic] {
            let vec = stub_vector(7, kind, 3);
            assert_eq!(vec.len(), kind.dimension());

            let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-3, "norm was {norm}");
        }
    }

    #[tokio::test]
    async fn stub_provider_serves_its_generation() {
        let provider = StubProvider::new(5);
        let vec = provider.vector(9, VectorKind::Face).await.unwrap();
        assert_eq!(vec, stub_vector(9, VectorKind::Face, 5));
    }
}
