use std::io;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sync::paths::{PathError, local_path_for};

/// Name of the file that marks a directory as a sync root.
pub const MARKER_FILE: &str = ".yadisk-pull.json";

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid context file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0} is already a sync root")]
    AlreadyInitialized(PathBuf),
}

#[derive(Debug, Serialize, Deserialize)]
struct MarkerContents {
    remote_root: String,
}

/// A local directory bound to a remote root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncContext {
    local_root: PathBuf,
    remote_root: String,
}

impl SyncContext {
    pub fn new(local_root: impl Into<PathBuf>, remote_root: impl Into<String>) -> Self {
        Self {
            local_root: local_root.into(),
            remote_root: remote_root.into(),
        }
    }

    /// Binds `local_root` to `remote_root` by writing the marker file.
    pub fn init(local_root: &Path, remote_root: &str) -> Result<Self, ContextError> {
        let marker = local_root.join(MARKER_FILE);
        if marker.exists() {
            return Err(ContextError::AlreadyInitialized(local_root.to_path_buf()));
        }
        std::fs::create_dir_all(local_root).map_err(|source| ContextError::Io {
            path: local_root.to_path_buf(),
            source,
        })?;
        let contents = MarkerContents {
            remote_root: remote_root.to_string(),
        };
        let json = serde_json::to_vec_pretty(&contents).map_err(|source| ContextError::Parse {
            path: marker.clone(),
            source,
        })?;
        std::fs::write(&marker, json).map_err(|source| ContextError::Io {
            path: marker.clone(),
            source,
        })?;
        Ok(Self::new(local_root, remote_root))
    }

    /// Looks for a marker in `start` and each of its ancestors.
    pub fn discover(start: &Path) -> Result<Option<Self>, ContextError> {
        for dir in start.ancestors() {
            let marker = dir.join(MARKER_FILE);
            let bytes = match std::fs::read(&marker) {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => return Err(ContextError::Io { path: marker, source }),
            };
            let contents: MarkerContents = serde_json::from_slice(&bytes)
                .map_err(|source| ContextError::Parse { path: marker, source })?;
            return Ok(Some(Self::new(dir, contents.remote_root)));
        }
        Ok(None)
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    pub fn remote_root(&self) -> &str {
        &self.remote_root
    }

    pub fn abs_path_of(&self, logical: &str) -> Result<PathBuf, PathError> {
        local_path_for(&self.local_root, logical)
    }

    /// Logical path of a local path inside the root, or `None` when it lies
    /// outside of it.
    pub fn logical_path_of(&self, local: &Path) -> Option<String> {
        let rel = local.strip_prefix(&self.local_root).ok()?;
        let mut out = String::new();
        for component in rel.components() {
            match component {
                Component::Normal(part) => {
                    out.push('/');
                    out.push_str(part.to_str()?);
                }
                Component::CurDir => continue,
                _ => return None,
            }
        }
        if out.is_empty() {
            out.push('/');
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn init_then_discover_from_nested_directory() {
        let dir = tempdir().unwrap();
        let created = SyncContext::init(dir.path(), "disk:/Backup").unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let found = SyncContext::discover(&nested).unwrap().unwrap();
        assert_eq!(found, created);
        assert_eq!(found.remote_root(), "disk:/Backup");
        assert_eq!(found.logical_path_of(&nested).as_deref(), Some("/a/b"));
        assert_eq!(found.logical_path_of(dir.path()).as_deref(), Some("/"));
    }

    #[test]
    fn init_refuses_existing_root() {
        let dir = tempdir().unwrap();
        SyncContext::init(dir.path(), "disk:/").unwrap();
        assert!(matches!(
            SyncContext::init(dir.path(), "disk:/"),
            Err(ContextError::AlreadyInitialized(_))
        ));
    }

    #[test]
    fn discover_without_marker_is_none() {
        let dir = tempdir().unwrap();
        assert!(SyncContext::discover(dir.path()).unwrap().is_none());
    }

    #[test]
    fn discover_reports_corrupt_marker() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(MARKER_FILE), b"not json").unwrap();
        assert!(matches!(
            SyncContext::discover(dir.path()),
            Err(ContextError::Parse { .. })
        ));
    }

    #[test]
    fn paths_outside_root_have_no_logical_path() {
        let ctx = SyncContext::new("/sync", "disk:/");
        assert_eq!(ctx.logical_path_of(Path::new("/elsewhere")), None);
        assert_eq!(
            ctx.abs_path_of("/x/y").unwrap(),
            PathBuf::from("/sync/x/y")
        );
    }
}
