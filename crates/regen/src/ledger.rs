use crate::error::Result;
use lumina_catalog::RegenerationJob;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Persistent single-row store for the current regeneration job.
///
/// The row is replaced wholesale on every checkpoint via a tmp write and
/// rename, so readers never observe a half-written job.
pub struct JobLedger {
    path: PathBuf,
}

impl JobLedger {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current job row. A missing or unreadable ledger counts as
    /// no job; corruption is logged, never fatal.
    pub async fn load(&self) -> Option<RegenerationJob> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Failed to read job ledger: {e}");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(job) => Some(job),
            Err(e) => {
                log::warn!("Failed to parse job ledger: {e}");
                None
            }
        }
    }

    pub async fn save(&self, job: &RegenerationJob) -> Result<()> {
        let json = serde_json::to_vec_pretty(job)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = self.path.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp_path = PathBuf::from(tmp);

        tokio::fs::write(&tmp_path, &json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}
