use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegenError>;

#[derive(Error, Debug)]
pub enum RegenError {
    #[error("Regeneration job {0} is already running")]
    JobAlreadyRunning(u64),

    #[error("Job {job_id} heartbeat is stale ({age_ms} ms old)")]
    StaleJob { job_id: u64, age_ms: u64 },

    #[error("No resumable job found")]
    NoResumableJob,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] lumina_catalog::CatalogError),

    #[error("Clustering error: {0}")]
    Clustering(#[from] lumina_people::PeopleError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
