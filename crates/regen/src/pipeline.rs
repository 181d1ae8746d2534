use crate::config::RegenConfig;
use crate::error::{RegenError, Result};
use crate::ledger::JobLedger;
use crate::progress::{ProgressEvent, PROGRESS_CHANNEL_CAPACITY};
use crate::provider::{EmbeddingProvider, ProviderError};
use lumina_catalog::{
    unix_ms, Catalog, EmbeddingStore, JobStatus, RegenerationJob, VectorKind,
};
use lumina_people::FaceClusterer;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// True when the job's heartbeat is recent enough to treat the job as live.
/// A heartbeat from the future (clock skew) counts as fresh.
#[must_use]
pub fn heartbeat_fresh(job: &RegenerationJob, now_ms: u64, staleness_ms: u64) -> bool {
    now_ms.saturating_sub(job.heartbeat) <= staleness_ms
}

/// Batch re-embedding of stored vectors to a new target version.
///
/// One pipeline drives at most one job at a time. A job walks entities whose
/// vector version is below the target in ascending id order, one batch per
/// loop turn, and checkpoints the job row after every committed batch so a
/// crashed run can resume where it left off. Cancellation and pause are
/// cooperative and take effect at batch boundaries only.
pub struct RegenerationPipeline {
    catalog: Arc<Catalog>,
    provider: Arc<dyn EmbeddingProvider>,
    ledger: JobLedger,
    config: RegenConfig,
    store_override: Option<Arc<dyn EmbeddingStore + Send + Sync>>,
    snapshot_path: Option<PathBuf>,
    progress: broadcast::Sender<ProgressEvent>,
    cancel_requested: AtomicBool,
    pause_requested: AtomicBool,
}

impl RegenerationPipeline {
    pub fn new(
        catalog: Arc<Catalog>,
        provider: Arc<dyn EmbeddingProvider>,
        ledger: JobLedger,
        config: RegenConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (progress, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Ok(Self {
            catalog,
            provider,
            ledger,
            config,
            store_override: None,
            snapshot_path: None,
            progress,
            cancel_requested: AtomicBool::new(false),
            pause_requested: AtomicBool::new(false),
        })
    }

    /// Route vector reads and writes through a different store. The default
    /// is the catalog's own repository.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn EmbeddingStore + Send + Sync>) -> Self {
        self.store_override = Some(store);
        self
    }

    /// Save a catalog snapshot to `path` after every committed batch, making
    /// batch commits durable across process restarts.
    #[must_use]
    pub fn with_catalog_snapshot(mut self, path: PathBuf) -> Self {
        self.snapshot_path = Some(path);
        self
    }

    /// Observe progress. Events arrive once per committed batch plus one per
    /// status transition; a terminal or paused status is the last event of a
    /// job.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    /// The persisted job row, if any.
    pub async fn status(&self) -> Option<RegenerationJob> {
        self.ledger.load().await
    }

    /// Request that the running job stop at the next batch boundary.
    pub fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
    }

    /// Request that the running job pause at the next batch boundary. A
    /// paused job keeps its checkpoint and can be continued with `resume`.
    pub fn pause(&self) {
        self.pause_requested.store(true, Ordering::Release);
    }

    /// Start a new job that brings every `kind` vector below
    /// `target_version` up to it, and drive the job until it reaches a
    /// terminal or paused state.
    ///
    /// Fails with `JobAlreadyRunning` while a live job exists. A job whose
    /// heartbeat went stale is marked failed and replaced instead.
    pub async fn start(&self, kind: VectorKind, target_version: u32) -> Result<RegenerationJob> {
        let mut next_id = 1;
        if let Some(existing) = self.ledger.load().await {
            if existing.status.is_active() {
                if heartbeat_fresh(&existing, unix_ms(), self.config.staleness_ms) {
                    return Err(RegenError::JobAlreadyRunning(existing.id));
                }
                self.mark_stale(existing.clone()).await?;
            }
            next_id = existing.id + 1;
        }

        let total = self.store().count_below_version(kind, target_version)?;
        let job = RegenerationJob::new(next_id, kind, target_version, total);
        log::info!(
            "Starting regeneration job {next_id}: {total} {} vectors below version {target_version}",
            kind.as_str()
        );

        self.run(job).await
    }

    /// Continue the persisted job. Paused jobs always resume; a pending or
    /// running job resumes only while its heartbeat is fresh, and is marked
    /// failed otherwise. Terminal jobs are not resumable.
    pub async fn resume(&self) -> Result<RegenerationJob> {
        let Some(job) = self.ledger.load().await else {
            return Err(RegenError::NoResumableJob);
        };

        match job.status {
            JobStatus::Paused => {
                log::info!(
                    "Resuming paused job {} at {}/{} entities",
                    job.id,
                    job.processed,
                    job.total
                );
                self.run(job).await
            }
            JobStatus::Pending | JobStatus::Running => {
                let now = unix_ms();
                if heartbeat_fresh(&job, now, self.config.staleness_ms) {
                    log::info!(
                        "Resuming interrupted job {} at {}/{} entities",
                        job.id,
                        job.processed,
                        job.total
                    );
                    self.run(job).await
                } else {
                    let age_ms = now.saturating_sub(job.heartbeat);
                    let job_id = job.id;
                    self.mark_stale(job).await?;
                    Err(RegenError::StaleJob { job_id, age_ms })
                }
            }
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => {
                Err(RegenError::NoResumableJob)
            }
        }
    }

    async fn run(&self, mut job: RegenerationJob) -> Result<RegenerationJob> {
        self.cancel_requested.store(false, Ordering::Release);
        self.pause_requested.store(false, Ordering::Release);

        job.status = JobStatus::Running;
        job.heartbeat = unix_ms();
        self.ledger.save(&job).await?;
        self.emit(&job);

        loop {
            if self.cancel_requested.load(Ordering::Acquire) {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(unix_ms());
                self.ledger.save(&job).await?;
                self.emit(&job);
                log::info!(
                    "Regeneration job {} cancelled after {} entities",
                    job.id,
                    job.processed
                );
                return Ok(job);
            }
            if self.pause_requested.load(Ordering::Acquire) {
                job.status = JobStatus::Paused;
                job.heartbeat = unix_ms();
                self.ledger.save(&job).await?;
                self.emit(&job);
                log::info!(
                    "Regeneration job {} paused at {}/{} entities",
                    job.id,
                    job.processed,
                    job.total
                );
                return Ok(job);
            }

            let page = match self.store().list_by_version(
                job.kind,
                job.target_version,
                self.config.batch_size,
                job.last_processed_id,
            ) {
                Ok(page) => page,
                Err(e) => return Err(self.fail(job, e.into()).await),
            };
            if page.is_empty() {
                return self.complete(job).await;
            }

            for record in &page {
                let entity_id = record.entity_id;
                match self.fetch_vector(entity_id, job.kind).await {
                    Ok(vector) => {
                        let put = self
                            .store()
                            .put(entity_id, job.kind, vector, job.target_version);
                        if let Err(e) = put {
                            return Err(self.fail(job, e.into()).await);
                        }
                        if job.kind == VectorKind::Face {
                            self.catalog
                                .people()
                                .set_face_vector_version(entity_id, job.target_version);
                        }
                    }
                    Err(e) => {
                        log::warn!("Failed to regenerate vector for entity {entity_id}: {e}");
                        job.failed += 1;
                    }
                }
                job.processed += 1;
                job.last_processed_id = Some(entity_id);
            }

            // The batch is committed; checkpoint before moving on.
            job.heartbeat = unix_ms();
            if let Some(path) = &self.snapshot_path {
                if let Err(e) = self.catalog.save_to(path).await {
                    return Err(self.fail(job, e.into()).await);
                }
            }
            if let Err(e) = self.ledger.save(&job).await {
                return Err(self.fail(job, e).await);
            }
            self.emit(&job);

            tokio::task::yield_now().await;
        }
    }

    async fn complete(&self, mut job: RegenerationJob) -> Result<RegenerationJob> {
        job.status = JobStatus::Completed;
        job.completed_at = Some(unix_ms());
        job.heartbeat = unix_ms();
        self.ledger.save(&job).await?;
        self.emit(&job);
        log::info!(
            "Regeneration job {} completed: {} processed, {} failed",
            job.id,
            job.processed,
            job.failed
        );

        // Face vectors changed generation, so the groupings derived from
        // them are recomputed once.
        if job.kind == VectorKind::Face {
            FaceClusterer::default().run(&self.catalog, job.target_version)?;
            if let Some(path) = &self.snapshot_path {
                self.catalog.save_to(path).await?;
            }
        }

        Ok(job)
    }

    async fn fail(&self, mut job: RegenerationJob, error: RegenError) -> RegenError {
        job.status = JobStatus::Failed;
        job.error_message = Some(error.to_string());
        job.completed_at = Some(unix_ms());
        if let Err(save_err) = self.ledger.save(&job).await {
            log::error!("Failed to persist failed job {}: {save_err}", job.id);
        }
        self.emit(&job);
        log::error!("Regeneration job {} failed: {error}", job.id);
        error
    }

    async fn mark_stale(&self, mut job: RegenerationJob) -> Result<()> {
        let age_ms = unix_ms().saturating_sub(job.heartbeat);
        log::warn!(
            "Job {} heartbeat is {age_ms} ms old, marking it failed",
            job.id
        );
        job.status = JobStatus::Failed;
        job.error_message = Some(format!("heartbeat went stale ({age_ms} ms old)"));
        job.completed_at = Some(unix_ms());
        self.ledger.save(&job).await
    }

    async fn fetch_vector(
        &self,
        entity_id: u64,
        kind: VectorKind,
    ) -> std::result::Result<Vec<f32>, ProviderError> {
        let timeout = Duration::from_millis(self.config.provider_timeout_ms);
        let vector = tokio::time::timeout(timeout, self.provider.vector(entity_id, kind))
            .await
            .map_err(|_| ProviderError::Timeout {
                entity_id,
                timeout_ms: self.config.provider_timeout_ms,
            })??;

        if vector.len() != kind.dimension() {
            return Err(ProviderError::Failure(format!(
                "provider returned {} components for entity {entity_id}, expected {}",
                vector.len(),
                kind.dimension()
            )));
        }
        Ok(vector)
    }

    fn store(&self) -> &(dyn EmbeddingStore + Send + Sync) {
        match &self.store_override {
            Some(store) => store.as_ref(),
            None => self.catalog.vectors(),
        }
    }

    fn emit(&self, job: &RegenerationJob) {
        let _ = self.progress.send(ProgressEvent::from(job));
    }
}
