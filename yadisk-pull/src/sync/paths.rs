use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("logical path is empty")]
    Empty,
    #[error("logical path contains unsupported component: {0}")]
    UnsupportedComponent(String),
}

/// Maps a logical sync path ("/Docs/A.txt") onto the local tree under `root`.
pub fn local_path_for(root: &Path, logical: &str) -> Result<PathBuf, PathError> {
    if logical.is_empty() {
        return Err(PathError::Empty);
    }

    let mut out = root.to_path_buf();
    for component in Path::new(logical).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::RootDir | Component::CurDir => continue,
            Component::ParentDir | Component::Prefix(_) => {
                return Err(PathError::UnsupportedComponent(logical.to_string()));
            }
        }
    }
    Ok(out)
}

/// Appends `name` to a logical directory path.
pub fn join_logical(parent: &str, name: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), name)
}

/// Full remote path for a logical path, e.g. `disk:/Backup` + `/a.txt`.
pub fn remote_path_for(remote_root: &str, logical: &str) -> String {
    let root = remote_root.trim_end_matches('/');
    let rel = logical.trim_start_matches('/');
    if rel.is_empty() {
        format!("{root}/")
    } else {
        format!("{root}/{rel}")
    }
}

/// Inverse of [`remote_path_for`]. Returns `None` for paths outside the root.
pub fn logical_path_for(remote_root: &str, remote_path: &str) -> Option<String> {
    let root = remote_root.trim_end_matches('/');
    let rest = remote_path.strip_prefix(root)?;
    if rest.is_empty() {
        return Some("/".to_string());
    }
    rest.starts_with('/').then(|| rest.to_string())
}
