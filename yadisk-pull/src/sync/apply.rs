use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use filetime::FileTime;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;

use super::model::{Change, FileMetadata};
use super::paths::{PathError, local_path_for};
use super::progress::ProgressSink;
use super::remote::{RemoteError, RemoteTree};

#[cfg(unix)]
const DIR_MODE: u32 = 0o755;

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("download failed for {path}: {source}")]
    Download {
        path: String,
        #[source]
        source: RemoteError,
    },
    #[error("path error: {0}")]
    Path(#[from] PathError),
    #[error("refusing to delete the sync root {0}")]
    RefuseRoot(PathBuf),
}

trait IoContext<T> {
    fn at(self, path: &Path) -> Result<T, ApplyError>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T, ApplyError> {
        self.map_err(|source| ApplyError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Applies change lists to the local tree under `root`, one change at a time
/// and in list order. The first failure stops the run; earlier changes stay
/// applied.
pub struct ChangeApplier {
    root: PathBuf,
    remote: Arc<dyn RemoteTree>,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl ChangeApplier {
    pub fn new(root: PathBuf, remote: Arc<dyn RemoteTree>) -> Self {
        Self {
            root,
            remote,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub async fn apply(&self, changes: &[Change]) -> Result<(), ApplyError> {
        if changes.is_empty() {
            return Ok(());
        }
        tracing::info!(
            changes = changes.len(),
            root = %self.root.display(),
            "applying change list"
        );
        if let Some(progress) = &self.progress {
            progress.start(changes.len() as u64);
        }

        let mut result = Ok(());
        let mut touched_dirs = Vec::new();
        for change in changes {
            tracing::debug!(op = ?change.op(), path = change.path(), "applying change");
            let _tick = ProgressTick(self.progress.as_deref());
            result = match change {
                Change::Mod { path, src } => self.local_mod(path, src).await,
                Change::Add { path, src } => self.local_add(path, src).await,
                Change::Delete { path, dest } => self.local_delete(path, dest).await,
            };
            if let Err(err) = &result {
                tracing::warn!(op = ?change.op(), path = change.path(), "change failed: {err}");
                break;
            }
            if let Change::Add { path, src } | Change::Mod { path, src } = change
                && src.is_dir
            {
                touched_dirs.push((path.as_str(), src.mod_time));
            }
        }
        // Writing children bumps a directory's mtime, so restamp once the
        // children are in place.
        if let Err(err) = self.restamp_dirs(touched_dirs) {
            tracing::warn!("restoring directory timestamps failed: {err}");
            if result.is_ok() {
                result = Err(err);
            }
        }

        if let Some(progress) = &self.progress {
            progress.finish();
        }
        if result.is_ok() {
            tracing::info!(changes = changes.len(), "change list applied");
        }
        result
    }

    /// Deepest first, so restamping a child never disturbs its parent.
    fn restamp_dirs(&self, mut dirs: Vec<(&str, OffsetDateTime)>) -> Result<(), ApplyError> {
        dirs.sort_by_key(|(path, _)| std::cmp::Reverse(path.matches('/').count()));
        for (path, mod_time) in dirs {
            set_mod_time(&local_path_for(&self.root, path)?, mod_time)?;
        }
        Ok(())
    }

    async fn local_mod(&self, path: &str, src: &FileMetadata) -> Result<(), ApplyError> {
        let target = local_path_for(&self.root, path)?;
        if let Some(blob) = &src.blob_at {
            self.download(path, blob, &target).await?;
        }
        set_mod_time(&target, src.mod_time)
    }

    async fn local_add(&self, path: &str, src: &FileMetadata) -> Result<(), ApplyError> {
        let target = local_path_for(&self.root, path)?;
        if src.is_dir {
            create_dir(&target).await?;
        } else if let Some(blob) = &src.blob_at {
            self.download(path, blob, &target).await?;
        }
        set_mod_time(&target, src.mod_time)
    }

    async fn local_delete(&self, path: &str, dest: &FileMetadata) -> Result<(), ApplyError> {
        let target = local_path_for(&self.root, path)?;
        if target == self.root {
            return Err(ApplyError::RefuseRoot(target));
        }
        let removed = match tokio::fs::symlink_metadata(&target).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&target).await,
            Ok(_) => tokio::fs::remove_file(&target).await,
            Err(err) => Err(err),
        };
        match removed {
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path, was_dir = dest.is_dir, "delete target already absent");
                Ok(())
            }
            other => other.at(&target),
        }
    }

    /// Creates (or truncates) `target` first and only then opens the blob, so
    /// an unreachable blob leaves an empty file behind.
    async fn download(&self, path: &str, blob: &str, target: &Path) -> Result<(), ApplyError> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.at(parent)?;
        }
        let mut file = tokio::fs::File::create(target).await.at(target)?;
        let mut reader = self
            .remote
            .download(blob)
            .await
            .map_err(|source| ApplyError::Download {
                path: path.to_string(),
                source,
            })?;
        let copied = tokio::io::copy(&mut reader, &mut file).await.at(target)?;
        file.flush().await.at(target)?;
        file.sync_all().await.at(target)?;
        tracing::debug!(path, bytes = copied, "downloaded");
        Ok(())
    }
}

/// Advances the progress sink when a handler finishes, whichever way it ends.
struct ProgressTick<'a>(Option<&'a dyn ProgressSink>);

impl Drop for ProgressTick<'_> {
    fn drop(&mut self) {
        if let Some(progress) = self.0 {
            progress.increment();
        }
    }
}

async fn create_dir(target: &Path) -> Result<(), ApplyError> {
    let mut builder = tokio::fs::DirBuilder::new();
    #[cfg(unix)]
    builder.mode(DIR_MODE);
    match builder.create(target).await {
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists && target.is_dir() => Ok(()),
        other => other.at(target),
    }
}

fn set_mod_time(target: &Path, mod_time: OffsetDateTime) -> Result<(), ApplyError> {
    let stamp = FileTime::from_unix_time(mod_time.unix_timestamp(), mod_time.nanosecond());
    filetime::set_file_times(target, stamp, stamp).at(target)
}

#[cfg(test)]
#[path = "apply_tests.rs"]
mod tests;
