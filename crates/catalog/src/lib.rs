//! # Lumina Catalog
//!
//! Versioned embedding storage and people records for a photo library.
//!
//! ## Features
//!
//! - **Versioned vectors** keyed by `(entity id, kind)` with upsert semantics
//! - **Cursor pagination** in ascending id order for resumable batch work
//! - **Single-membership people records** (a face belongs to one person)
//! - **Cascade deletes** so nothing dangles when entities go away
//! - **Atomic JSON snapshots** for crash-safe persistence
//!
//! ## Architecture
//!
//! ```text
//! Catalog
//!     │
//!     ├──> EmbeddingRepository
//!     │      └─> (kind, entity_id) -> EmbeddingRecord
//!     │
//!     ├──> PeopleStore
//!     │      ├─> face_id -> FaceDetection
//!     │      └─> person_id -> Person
//!     │
//!     └──> JSON Snapshot
//!            └─> tmp write + rename
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use lumina_catalog::{Catalog, EmbeddingStore, VectorKind};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> lumina_catalog::Result<()> {
//!     let catalog = Catalog::new();
//!
//!     let vector = vec![0.0; VectorKind::Face.dimension()];
//!     catalog.vectors().put(1, VectorKind::Face, vector, 1)?;
//!
//!     catalog.save_to(Path::new("catalog.json")).await?;
//!     Ok(())
//! }
//! ```

mod error;
mod people_store;
mod persistence;
mod repository;
mod types;

pub use error::{CatalogError, Result};
pub use people_store::PeopleStore;
pub use persistence::Catalog;
pub use repository::{EmbeddingRepository, EmbeddingStore};
pub use types::{
    unix_ms, BoundingBox, EmbeddingRecord, FaceDetection, JobStatus, Person, RegenerationJob,
    VectorKind,
};
