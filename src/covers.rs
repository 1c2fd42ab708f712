//! Cover image downloads
//!
//! Covers are stored exactly as served; there is no resizing or re-encoding.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One cover to download
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverJob {
    /// Owning source key
    pub key: String,
    /// Remote image URL
    pub src: String,
    /// Local destination
    pub dest: PathBuf,
}

/// Downloads and stores cover images
#[async_trait]
pub trait CoverStore: Send + Sync {
    /// Download `src` and store it at `dest`
    async fn download_and_store(&self, key: &str, src: &str, dest: &Path) -> Result<()>;
}

/// Plain HTTP download written atomically
#[derive(Clone, Debug)]
pub struct HttpCoverStore {
    client: reqwest::Client,
}

impl HttpCoverStore {
    /// Create a store with a per-request timeout
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CoverStore for HttpCoverStore {
    async fn download_and_store(&self, key: &str, src: &str, dest: &Path) -> Result<()> {
        let response = self.client.get(src).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Other(format!(
                "cover for {} returned HTTP {}: {}",
                key,
                status.as_u16(),
                src
            )));
        }
        let bytes = response.bytes().await?;
        crate::snapshot::write_atomic(dest, &bytes).await
    }
}

/// Download covers one after another
///
/// A failed cover is logged and skipped; the record keeps its cover path.
/// Returns the number of covers stored.
pub async fn download_covers_serially(store: &dyn CoverStore, jobs: &[CoverJob]) -> usize {
    let mut stored = 0;
    for job in jobs {
        match store.download_and_store(&job.key, &job.src, &job.dest).await {
            Ok(()) => {
                tracing::debug!(key = %job.key, dest = %job.dest.display(), "cover stored");
                stored += 1;
            }
            Err(e) => {
                tracing::warn!(key = %job.key, url = %job.src, error = %e, "cover download failed");
            }
        }
    }
    tracing::info!(stored, total = jobs.len(), "cover downloads finished");
    stored
}
