use crate::error::{RegenError, Result};
use serde::{Deserialize, Serialize};

/// Tuning knobs for the regeneration pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RegenConfig {
    /// Entities fetched and written per batch.
    pub batch_size: usize,
    /// How old a job heartbeat may be before the job counts as abandoned.
    pub staleness_ms: u64,
    /// Per-entity provider call timeout.
    pub provider_timeout_ms: u64,
}

impl RegenConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(RegenError::InvalidConfig(
                "batch size must be at least 1".to_string(),
            ));
        }
        if self.staleness_ms == 0 {
            return Err(RegenError::InvalidConfig(
                "staleness window must be at least 1 ms".to_string(),
            ));
        }
        if self.provider_timeout_ms == 0 {
            return Err(RegenError::InvalidConfig(
                "provider timeout must be at least 1 ms".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RegenConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            staleness_ms: 5 * 60 * 1000,
            provider_timeout_ms: 10_000,
        }
    }
}
