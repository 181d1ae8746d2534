//! Face grouping for the photo catalog.
//!
//! Density-based clustering (DBSCAN over cosine similarity) turns face
//! vectors into Person records, and a quality validator flags groupings
//! that deserve manual review:
//! - deterministic: identical input always yields identical membership
//! - single ownership: a face never ends up in two persons
//! - noise-tolerant: faces without dense neighborhoods stay unassigned

mod clustering;
mod error;
mod quality;

pub use clustering::{ClusterPass, ClusteringParams, FaceClusterer};
pub use error::{PeopleError, Result};
pub use quality::{
    AmbiguousPair, ClusterQualityReport, ClusterQualityValidator, PersonQuality, QualityThresholds,
};
