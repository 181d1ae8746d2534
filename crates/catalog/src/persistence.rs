use crate::error::{CatalogError, Result};
use crate::people_store::{PeopleLedger, PeopleStore};
use crate::repository::EmbeddingRepository;
use crate::types::EmbeddingRecord;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Bump when the on-disk layout changes incompatibly.
const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CatalogSnapshot {
    schema_version: u32,
    vectors: Vec<EmbeddingRecord>,
    people: PeopleLedger,
}

/// Owns the embedding repository and the people store, and persists both as
/// one JSON snapshot so they can never drift apart on disk.
#[derive(Default)]
pub struct Catalog {
    vectors: EmbeddingRepository,
    people: PeopleStore,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn vectors(&self) -> &EmbeddingRepository {
        &self.vectors
    }

    #[must_use]
    pub fn people(&self) -> &PeopleStore {
        &self.people
    }

    /// Remove a face everywhere: its person membership, its face record, and
    /// any stored vectors keyed by the face id.
    pub fn remove_face(&self, face_id: u64) -> Result<usize> {
        self.people.remove_face(face_id)?;
        Ok(self.vectors.remove_entity(face_id))
    }

    /// Write the full catalog to `path` atomically. The snapshot goes to a
    /// sibling `.tmp` file first and is renamed into place, so a crash
    /// mid-write leaves the previous snapshot intact.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        let snapshot = CatalogSnapshot {
            schema_version: SCHEMA_VERSION,
            vectors: self.vectors.dump(),
            people: self.people.dump(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = tmp_sibling(path);
        tokio::fs::write(&tmp_path, &json).await?;
        tokio::fs::rename(&tmp_path, path).await?;

        log::debug!(
            "Saved catalog snapshot: {} vectors, {} faces, {} persons",
            snapshot.vectors.len(),
            snapshot.people.faces.len(),
            snapshot.people.persons.len()
        );
        Ok(())
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let json = tokio::fs::read(path).await?;
        let snapshot: CatalogSnapshot = serde_json::from_slice(&json)?;
        if snapshot.schema_version != SCHEMA_VERSION {
            return Err(CatalogError::Other(format!(
                "Unsupported catalog schema version {} (expected {})",
                snapshot.schema_version, SCHEMA_VERSION
            )));
        }
        Ok(Self {
            vectors: EmbeddingRepository::restore(snapshot.vectors)?,
            people: PeopleStore::restore(snapshot.people),
        })
    }

    /// Load the snapshot at `path`, or start empty when it is missing or
    /// unreadable. A corrupt snapshot is logged and discarded rather than
    /// taking the engine down.
    pub async fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::new();
        }
        match Self::load_from(path).await {
            Ok(catalog) => catalog,
            Err(e) => {
                log::warn!("Failed to load catalog snapshot: {e}, starting fresh");
                Self::new()
            }
        }
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
