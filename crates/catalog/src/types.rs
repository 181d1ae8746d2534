use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch. Timestamps are plain integers so
/// records stay comparable and serializable without a datetime dependency.
#[must_use]
pub fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// Which embedding space a vector lives in. The dimension is fixed per kind;
/// every write is validated against it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum VectorKind {
    Face,
    Semantic,
}

impl VectorKind {
    #[must_use]
    pub const fn dimension(self) -> usize {
        match self {
            Self::Face => 128,
            Self::Semantic => 512,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Face => "face",
            Self::Semantic => "semantic",
        }
    }
}

/// One stored vector. At most one record exists per `(entity_id, kind)`;
/// writes overwrite in place, never append.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    pub entity_id: u64,
    pub kind: VectorKind,
    pub vector: Vec<f32>,
    pub version: u32,
    pub created_at: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A detected face in a photo. The face embedding itself lives in the
/// embedding repository keyed by `id`; `vector_version` mirrors the version
/// of that stored vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceDetection {
    pub id: u64,
    pub photo_id: u64,
    pub bounding_box: BoundingBox,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_id: Option<u64>,
    pub vector_version: u32,
}

/// A cluster of faces believed to be the same person. A face id appears in
/// the membership of at most one person at any time.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Person {
    pub id: u64,
    pub label: String,
    pub member_face_ids: Vec<u64>,
}

impl Person {
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.member_face_ids.len()
    }
}

// Serialized by hand so consumers see `face_count` without the stored record
// carrying a counter that could drift from the membership list.
impl Serialize for Person {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("Person", 4)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("label", &self.label)?;
        state.serialize_field("member_face_ids", &self.member_face_ids)?;
        state.serialize_field("face_count", &self.face_count())?;
        state.end()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Pending and running jobs block the start of another job.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Persisted state of one batch regeneration run. `last_processed_id` and
/// `heartbeat` together form the resume checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegenerationJob {
    pub id: u64,
    pub status: JobStatus,
    pub kind: VectorKind,
    pub target_version: u32,
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_processed_id: Option<u64>,
    pub started_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    pub heartbeat: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl RegenerationJob {
    #[must_use]
    pub fn new(id: u64, kind: VectorKind, target_version: u32, total: usize) -> Self {
        let now = unix_ms();
        Self {
            id,
            status: JobStatus::Pending,
            kind,
            target_version,
            total,
            processed: 0,
            failed: 0,
            last_processed_id: None,
            started_at: now,
            completed_at: None,
            heartbeat: now,
            error_message: None,
        }
    }

    #[must_use]
    pub fn percent_complete(&self) -> f32 {
        if self.total == 0 {
            return 100.0;
        }
        (self.processed as f32 / self.total as f32) * 100.0
    }
}
