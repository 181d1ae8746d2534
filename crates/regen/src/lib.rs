//! # Lumina Regen
//!
//! Resumable batch regeneration of stored embeddings.
//!
//! When the application ships a new embedding model, every stored vector has
//! to be recomputed. This crate drives that recomputation as a checkpointed
//! job that survives crashes, reports progress, and tolerates flaky
//! providers.
//!
//! ## Pipeline
//!
//! ```text
//! RegenerationPipeline
//!     │
//!     ├── page: vectors below target version (ascending id)
//!     │     └─ per entity: provider fetch ──ok──> repository upsert
//!     │                        └──err──> count as failed, continue
//!     │
//!     ├── checkpoint: job row + catalog snapshot after each batch
//!     │
//!     ├── ProgressEvent per batch ──> subscribers
//!     │
//!     └── on completion (face jobs): one clustering pass
//! ```
//!
//! Jobs move `pending -> running -> (paused) -> completed | failed |
//! cancelled`. Cancellation and pause land at batch boundaries; a crashed
//! run resumes from `last_processed_id` while its heartbeat is fresh and is
//! marked failed otherwise.

mod config;
mod error;
mod ledger;
mod pipeline;
mod progress;
mod provider;

pub use config::RegenConfig;
pub use error::{RegenError, Result};
pub use ledger::JobLedger;
pub use pipeline::{heartbeat_fresh, RegenerationPipeline};
pub use progress::{ProgressEvent, PROGRESS_CHANNEL_CAPACITY};
pub use provider::{stub_vector, EmbeddingProvider, ProviderError, StubProvider};
