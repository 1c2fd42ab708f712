//! Durable snapshot writes and prior snapshot loading

use crate::error::Result;
use crate::types::Snapshot;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Writes the finished snapshot
#[async_trait]
pub trait SnapshotWriter: Send + Sync {
    /// Persist `snapshot` at `path`
    ///
    /// On success the file must be complete on disk; a reader never observes
    /// a partially written snapshot.
    async fn write_snapshot(&self, path: &Path, snapshot: &Snapshot) -> Result<()>;
}

/// Pretty-printed JSON written through [`write_atomic`]
#[derive(Clone, Copy, Debug, Default)]
pub struct AtomicJsonWriter;

#[async_trait]
impl SnapshotWriter for AtomicJsonWriter {
    async fn write_snapshot(&self, path: &Path, snapshot: &Snapshot) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(path, &bytes).await?;
        tracing::info!(
            path = %path.display(),
            channels = snapshot.channels.len(),
            errors = snapshot.errors.len(),
            "snapshot written"
        );
        Ok(())
    }
}

/// Write `bytes` to `path` via a synced temporary sibling and a rename
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = temp_sibling(path);
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Load the snapshot of the previous run
///
/// Returns `None` when there is none or when it cannot be read; the run then
/// behaves as if it were the first one.
pub async fn load_snapshot(path: &Path) -> Option<Snapshot> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read previous snapshot");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt previous snapshot");
            None
        }
    }
}
