use lumina_catalog::{JobStatus, RegenerationJob};
use serde::{Deserialize, Serialize};

/// Capacity of the progress broadcast channel. Slow observers that fall more
/// than this many events behind start losing the oldest ones; processing
/// never blocks on them.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 32;

/// Snapshot of job progress, emitted once per committed batch and once for
/// every status transition. An event with a terminal status (or `Paused`) is
/// the last one a job emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: u64,
    pub status: JobStatus,
    pub processed: usize,
    pub total: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_entity_id: Option<u64>,
}

impl From<&RegenerationJob> for ProgressEvent {
    fn from(job: &RegenerationJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            processed: job.processed,
            total: job.total,
            failed: job.failed,
            current_entity_id: job.last_processed_id,
        }
    }
}
