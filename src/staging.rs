//! Output directory lifecycle
//!
//! A [`StagingTransaction`] brackets a run. [`begin`](StagingTransaction::begin)
//! moves a completed previous output aside (or clears an incomplete one) and
//! prepares empty working directories; the caller then either
//! [`commit`](StagingTransaction::commit)s once the new snapshot is on disk or
//! [`restore`](StagingTransaction::restore)s. A transaction dropped without
//! either restores synchronously, so the published directory always holds
//! either the previous complete snapshot or the new one.

use crate::config::OutputLayout;
use crate::error::StagingError;
use chrono::Local;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Where a transaction stands
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StagingState {
    /// No previous snapshot existed; the output directory was started empty
    Fresh,
    /// The previous snapshot was moved to `backup`
    BackedUp {
        /// Backup directory
        backup: PathBuf,
    },
    /// The new snapshot was published and any backup removed
    Committed,
    /// The backup was moved back into place
    Restored,
    /// There was no backup and the partial output was removed
    Discarded,
}

impl StagingState {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            StagingState::Committed | StagingState::Restored | StagingState::Discarded
        )
    }
}

/// Scoped ownership of the output directory for one run
#[derive(Debug)]
pub struct StagingTransaction {
    layout: OutputLayout,
    state: StagingState,
}

impl StagingTransaction {
    /// Take over the output directory
    ///
    /// A backup left behind by a run that never got to restore it is moved back
    /// first, as long as the output directory holds no completed snapshot.
    pub async fn begin(layout: OutputLayout) -> Result<Self, StagingError> {
        recover_orphaned_backup(&layout).await?;

        let state = if tokio::fs::try_exists(&layout.snapshot_path)
            .await
            .unwrap_or(false)
        {
            let backup = backup_path(&layout.output_dir).await;
            tokio::fs::rename(&layout.output_dir, &backup)
                .await
                .map_err(|source| StagingError::Backup {
                    from: layout.output_dir.clone(),
                    to: backup.clone(),
                    source,
                })?;
            tracing::info!(backup = %backup.display(), "previous output backed up");
            StagingState::BackedUp { backup }
        } else {
            remove_dir_if_exists(&layout.output_dir).await?;
            tracing::info!(output = %layout.output_dir.display(), "starting with empty output");
            StagingState::Fresh
        };

        let mut transaction = Self { layout, state };
        if let Err(e) = transaction.prepare().await {
            if let Err(restore_error) = transaction.resolve_unfinished().await {
                tracing::error!(error = %restore_error, "failed to roll back after prepare error");
            }
            return Err(e);
        }
        Ok(transaction)
    }

    async fn prepare(&self) -> Result<(), StagingError> {
        for dir in self.layout.working_dirs() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| StagingError::Prepare {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Current state
    pub fn state(&self) -> &StagingState {
        &self.state
    }

    /// Backup of the previous output, while it exists
    pub fn backup_dir(&self) -> Option<&Path> {
        match &self.state {
            StagingState::BackedUp { backup } => Some(backup),
            _ => None,
        }
    }

    /// Publish: drop the backup
    ///
    /// Call only after the new snapshot is durably written.
    pub async fn commit(mut self) -> Result<StagingState, StagingError> {
        let previous = std::mem::replace(&mut self.state, StagingState::Committed);
        if let StagingState::BackedUp { backup } = previous {
            tokio::fs::remove_dir_all(&backup)
                .await
                .map_err(|source| StagingError::Cleanup {
                    path: backup.clone(),
                    source,
                })?;
            tracing::info!(backup = %backup.display(), "backup removed");
        }
        Ok(self.state.clone())
    }

    /// Abandon the run: put the previous output back, or remove the partial one
    pub async fn restore(mut self) -> Result<StagingState, StagingError> {
        self.resolve_unfinished().await?;
        Ok(self.state.clone())
    }

    async fn resolve_unfinished(&mut self) -> Result<(), StagingError> {
        match std::mem::replace(&mut self.state, StagingState::Discarded) {
            StagingState::BackedUp { backup } => {
                remove_dir_if_exists(&self.layout.output_dir).await?;
                tokio::fs::rename(&backup, &self.layout.output_dir)
                    .await
                    .map_err(|source| StagingError::Restore {
                        backup: backup.clone(),
                        to: self.layout.output_dir.clone(),
                        source,
                    })?;
                self.state = StagingState::Restored;
                tracing::info!(output = %self.layout.output_dir.display(), "previous output restored");
            }
            StagingState::Fresh => {
                remove_dir_if_exists(&self.layout.output_dir).await?;
                tracing::info!(output = %self.layout.output_dir.display(), "partial output discarded");
            }
            terminal => self.state = terminal,
        }
        Ok(())
    }
}

impl Drop for StagingTransaction {
    fn drop(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        tracing::warn!("staging transaction dropped unresolved, rolling back");

        let output = &self.layout.output_dir;
        if output.exists()
            && let Err(e) = std::fs::remove_dir_all(output)
        {
            tracing::error!(output = %output.display(), error = %e, "failed to remove partial output");
            return;
        }
        if let StagingState::BackedUp { backup } = &self.state
            && let Err(e) = std::fs::rename(backup, output)
        {
            tracing::error!(backup = %backup.display(), error = %e, "failed to restore backup");
        }
    }
}

fn backup_prefix(output_dir: &Path) -> OsString {
    let mut prefix = output_dir
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    prefix.push("(backup ");
    prefix
}

/// `<output>(backup YYYYMMDD-HHMMSS)`, with a counter appended on collision
async fn backup_path(output_dir: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let mut attempt = 0u32;
    loop {
        let mut name = backup_prefix(output_dir);
        if attempt == 0 {
            name.push(format!("{stamp})"));
        } else {
            name.push(format!("{stamp}-{attempt})"));
        }
        let candidate = output_dir.with_file_name(name);
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        attempt += 1;
    }
}

/// Most recent backup sibling of `output_dir`, if any
async fn find_backup(output_dir: &Path) -> Result<Option<PathBuf>, StagingError> {
    let parent = match output_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let prefix = backup_prefix(output_dir);
    let prefix = prefix.to_string_lossy();

    let mut entries = match tokio::fs::read_dir(&parent).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(StagingError::Prepare { path: parent, source }),
    };

    let mut newest: Option<PathBuf> = None;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| StagingError::Prepare {
            path: parent.clone(),
            source,
        })?
    {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(prefix.as_ref())
            && newest
                .as_ref()
                .is_none_or(|current| current.file_name() < Some(name.as_os_str()))
        {
            newest = Some(entry.path());
        }
    }
    Ok(newest)
}

async fn recover_orphaned_backup(layout: &OutputLayout) -> Result<(), StagingError> {
    if tokio::fs::try_exists(&layout.snapshot_path)
        .await
        .unwrap_or(false)
    {
        return Ok(());
    }
    let Some(backup) = find_backup(&layout.output_dir).await? else {
        return Ok(());
    };

    tracing::warn!(backup = %backup.display(), "recovering backup left by an interrupted run");
    remove_dir_if_exists(&layout.output_dir).await?;
    tokio::fs::rename(&backup, &layout.output_dir)
        .await
        .map_err(|source| StagingError::Restore {
            backup,
            to: layout.output_dir.clone(),
            source,
        })
}

async fn remove_dir_if_exists(path: &Path) -> Result<(), StagingError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StagingError::Cleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}
