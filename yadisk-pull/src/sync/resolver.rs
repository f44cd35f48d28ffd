use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::model::{Change, FileMetadata};
use super::paths::{PathError, join_logical, local_path_for};
use super::remote::{RemoteError, RemoteTree};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("path error: {0}")]
    Path(#[from] PathError),
}

/// Produces the ordered list of changes that brings the local side of `path`
/// in line with the remote side. Parents always come before their children.
#[async_trait]
pub trait ChangeResolver: Send + Sync {
    async fn resolve_changes(
        &self,
        recursive: bool,
        path: &str,
        remote: Option<&FileMetadata>,
        local: Option<&FileMetadata>,
    ) -> Result<Vec<Change>, ResolveError>;
}

/// Compares the remote tree against the local directory under `root`, walking
/// both sides in pre-order.
pub struct TreeResolver {
    remote: Arc<dyn RemoteTree>,
    root: PathBuf,
    delete_extraneous: bool,
    ignored: HashSet<String>,
}

impl TreeResolver {
    pub fn new(remote: Arc<dyn RemoteTree>, root: PathBuf) -> Self {
        Self {
            remote,
            root,
            delete_extraneous: false,
            ignored: HashSet::new(),
        }
    }

    /// Emit deletions for local entries that have no remote counterpart.
    pub fn with_delete_extraneous(mut self, enabled: bool) -> Self {
        self.delete_extraneous = enabled;
        self
    }

    /// Local entry names that are never reported, at any depth.
    pub fn with_ignored(mut self, name: impl Into<String>) -> Self {
        self.ignored.insert(name.into());
        self
    }

    async fn local_children(&self, path: &str) -> Result<Vec<FileMetadata>, ResolveError> {
        let dir = local_path_for(&self.root, path)?;
        let io_err = |source| ResolveError::Io {
            path: dir.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(io_err)?;
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                tracing::warn!(
                    path = %entry.path().display(),
                    "skipping local entry with non UTF-8 name"
                );
                continue;
            };
            if self.ignored.contains(name) {
                continue;
            }
            let meta = entry.metadata().await.map_err(io_err)?;
            out.push(FileMetadata::local(join_logical(path, name), &meta));
        }
        Ok(out)
    }

    async fn local_md5(&self, path: &str) -> Result<String, ResolveError> {
        let file = local_path_for(&self.root, path)?;
        let bytes = tokio::fs::read(&file).await.map_err(|source| ResolveError::Io {
            path: file.clone(),
            source,
        })?;
        Ok(format!("{:x}", md5::compute(&bytes)))
    }

    async fn compare_files(
        &self,
        remote: &FileMetadata,
        local: &FileMetadata,
    ) -> Result<Option<Change>, ResolveError> {
        let same_time = remote.mod_time.unix_timestamp() == local.mod_time.unix_timestamp();
        if remote.size.is_some() && remote.size != local.size {
            return Ok(Some(Change::modify(remote.clone())));
        }
        let same_content = match &remote.md5 {
            Some(expected) => *expected == self.local_md5(&local.path).await?,
            // Without a checksum, only an unchanged timestamp proves equality.
            None => same_time,
        };
        Ok(match (same_content, same_time) {
            (false, _) => Some(Change::modify(remote.clone())),
            (true, false) => Some(Change::modify(remote.without_blob())),
            (true, true) => None,
        })
    }
}

#[async_trait]
impl ChangeResolver for TreeResolver {
    async fn resolve_changes(
        &self,
        recursive: bool,
        path: &str,
        remote: Option<&FileMetadata>,
        local: Option<&FileMetadata>,
    ) -> Result<Vec<Change>, ResolveError> {
        let mut changes = Vec::new();
        let mut stack = vec![(path.to_string(), remote.cloned(), local.cloned())];

        while let Some((path, remote, local)) = stack.pop() {
            let mut descend: Option<(bool, bool)> = None;
            match (remote, local) {
                (None, None) => {}
                (None, Some(local)) => {
                    if self.delete_extraneous {
                        changes.push(Change::delete(local));
                    }
                }
                (Some(remote), None) => {
                    if remote.is_dir {
                        descend = Some((true, false));
                    }
                    changes.push(Change::add(remote));
                }
                (Some(remote), Some(local)) if remote.is_dir != local.is_dir => {
                    if remote.is_dir {
                        descend = Some((true, false));
                    }
                    changes.push(Change::delete(local));
                    changes.push(Change::add(remote));
                }
                (Some(remote), Some(_)) if remote.is_dir => {
                    descend = Some((true, true));
                }
                (Some(remote), Some(local)) => {
                    if let Some(change) = self.compare_files(&remote, &local).await? {
                        changes.push(change);
                    }
                }
            }

            let Some((list_remote, list_local)) = descend.filter(|_| recursive) else {
                continue;
            };
            let mut pairs: BTreeMap<String, (Option<FileMetadata>, Option<FileMetadata>)> =
                BTreeMap::new();
            if list_remote {
                for child in self.remote.list_dir(&path).await? {
                    let key = child.path.clone();
                    pairs.entry(key).or_default().0 = Some(child);
                }
            }
            if list_local {
                for child in self.local_children(&path).await? {
                    let key = child.path.clone();
                    pairs.entry(key).or_default().1 = Some(child);
                }
            }
            // Reversed so the stack pops children in name order.
            for (child_path, (remote, local)) in pairs.into_iter().rev() {
                stack.push((child_path, remote, local));
            }
        }

        Ok(changes)
    }
}
