use std::fs::Metadata;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use yadisk_core::{Resource, ResourceType};

use super::paths::{logical_path_for, remote_path_for};

/// Snapshot of one entry on either side of a sync.
///
/// Directories never carry a content reference; the constructors below are the
/// only way the crate builds one, and each of them upholds that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Logical path relative to the sync root, always starting with `/`.
    pub path: String,
    /// Remote identifier; `None` for entries that only exist locally.
    pub id: Option<String>,
    /// Where the content can be fetched from; `None` when there is nothing to fetch.
    pub blob_at: Option<String>,
    pub is_dir: bool,
    pub mod_time: OffsetDateTime,
    pub size: Option<u64>,
    pub md5: Option<String>,
}

impl FileMetadata {
    pub fn remote_dir(
        path: impl Into<String>,
        id: Option<String>,
        mod_time: OffsetDateTime,
    ) -> Self {
        Self {
            path: path.into(),
            id,
            blob_at: None,
            is_dir: true,
            mod_time,
            size: None,
            md5: None,
        }
    }

    pub fn remote_file(
        path: impl Into<String>,
        id: Option<String>,
        blob_at: impl Into<String>,
        mod_time: OffsetDateTime,
    ) -> Self {
        Self {
            path: path.into(),
            id,
            blob_at: Some(blob_at.into()),
            is_dir: false,
            mod_time,
            size: None,
            md5: None,
        }
    }

    /// Snapshot of a local filesystem entry.
    pub fn local(path: impl Into<String>, meta: &Metadata) -> Self {
        let mod_time = meta
            .modified()
            .map(OffsetDateTime::from)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        Self {
            path: path.into(),
            id: None,
            blob_at: None,
            is_dir: meta.is_dir(),
            mod_time,
            size: (!meta.is_dir()).then(|| meta.len()),
            md5: None,
        }
    }

    /// Converts an API resource living under `remote_root`. Resources outside
    /// the root, or with an unparsable timestamp, yield `None`.
    pub fn from_resource(remote_root: &str, resource: &Resource) -> Option<Self> {
        let path = logical_path_for(remote_root, &resource.path)?;
        let mod_time = parse_modified(resource.modified.as_deref())?;
        let id = resource.resource_id.clone();
        let meta = match resource.resource_type {
            ResourceType::Dir => Self::remote_dir(path, id, mod_time),
            ResourceType::File => {
                let blob_at = remote_path_for(remote_root, &path);
                let mut meta = Self::remote_file(path, id, blob_at, mod_time);
                if let Some(size) = resource.size {
                    meta = meta.with_size(size);
                }
                if let Some(md5) = &resource.md5 {
                    meta = meta.with_md5(md5.to_ascii_lowercase());
                }
                meta
            }
        };
        Some(meta)
    }

    pub fn with_size(mut self, size: u64) -> Self {
        if !self.is_dir {
            self.size = Some(size);
        }
        self
    }

    pub fn with_md5(mut self, md5: impl Into<String>) -> Self {
        if !self.is_dir {
            self.md5 = Some(md5.into());
        }
        self
    }

    /// Copy of a remote file snapshot that only carries metadata, used for
    /// timestamp-only changes.
    pub fn without_blob(&self) -> Self {
        Self {
            blob_at: None,
            ..self.clone()
        }
    }
}

fn parse_modified(value: Option<&str>) -> Option<OffsetDateTime> {
    match value {
        Some(value) => OffsetDateTime::parse(value, &Rfc3339).ok(),
        // The API omits `modified` for the disk root.
        None => Some(OffsetDateTime::UNIX_EPOCH),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Mod,
    Delete,
}

/// One divergence between the remote and local trees.
///
/// Add and Mod carry the remote snapshot to converge toward; Delete carries
/// the local snapshot being removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Add { path: String, src: FileMetadata },
    Mod { path: String, src: FileMetadata },
    Delete { path: String, dest: FileMetadata },
}

impl Change {
    pub fn add(src: FileMetadata) -> Self {
        Change::Add {
            path: src.path.clone(),
            src,
        }
    }

    pub fn modify(src: FileMetadata) -> Self {
        Change::Mod {
            path: src.path.clone(),
            src,
        }
    }

    pub fn delete(dest: FileMetadata) -> Self {
        Change::Delete {
            path: dest.path.clone(),
            dest,
        }
    }

    pub fn op(&self) -> Op {
        match self {
            Change::Add { .. } => Op::Add,
            Change::Mod { .. } => Op::Mod,
            Change::Delete { .. } => Op::Delete,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Change::Add { path, .. } | Change::Mod { path, .. } | Change::Delete { path, .. } => {
                path
            }
        }
    }
}
