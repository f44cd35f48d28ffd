use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;

use super::model::FileMetadata;
use super::progress::ProgressSink;
use super::remote::{BlobReader, RemoteError, RemoteTree};

pub fn at(secs: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(secs).unwrap()
}

pub fn remote_dir(path: &str, secs: i64) -> FileMetadata {
    FileMetadata::remote_dir(path, Some(format!("id:{path}")), at(secs))
}

pub fn remote_file(path: &str, blob: &str, secs: i64) -> FileMetadata {
    FileMetadata::remote_file(path, Some(format!("id:{path}")), blob, at(secs))
}

/// In-memory remote tree that counts downloads.
#[derive(Default)]
pub struct FakeRemote {
    entries: HashMap<String, FileMetadata>,
    blobs: HashMap<String, Vec<u8>>,
    broken_blobs: HashSet<String>,
    failing_listing: bool,
    downloads: AtomicUsize,
    listed: Mutex<Vec<String>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, meta: FileMetadata) -> Self {
        self.entries.insert(meta.path.clone(), meta);
        self
    }

    pub fn with_file(mut self, meta: FileMetadata, content: &[u8]) -> Self {
        let blob = meta.blob_at.clone().expect("file entries need a blob");
        let meta = meta
            .with_size(content.len() as u64)
            .with_md5(format!("{:x}", md5::compute(content)));
        self.blobs.insert(blob, content.to_vec());
        self.entries.insert(meta.path.clone(), meta);
        self
    }

    pub fn with_blob(mut self, blob: &str, content: &[u8]) -> Self {
        self.blobs.insert(blob.to_string(), content.to_vec());
        self
    }

    pub fn with_broken_blob(mut self, blob: &str) -> Self {
        self.broken_blobs.insert(blob.to_string());
        self
    }

    pub fn with_failing_listing(mut self) -> Self {
        self.failing_listing = true;
        self
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn listed(&self) -> Vec<String> {
        self.listed.lock().unwrap().clone()
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "/",
    }
}

#[async_trait]
impl RemoteTree for FakeRemote {
    async fn find_by_path(&self, path: &str) -> Result<Option<FileMetadata>, RemoteError> {
        Ok(self.entries.get(path).cloned())
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<FileMetadata>, RemoteError> {
        self.listed.lock().unwrap().push(path.to_string());
        if self.failing_listing {
            return Err(RemoteError::Io(io::Error::other("listing unavailable")));
        }
        let mut children: Vec<_> = self
            .entries
            .values()
            .filter(|meta| meta.path != path && parent_of(&meta.path) == path)
            .cloned()
            .collect();
        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(children)
    }

    async fn download(&self, blob: &str) -> Result<BlobReader, RemoteError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.broken_blobs.contains(blob) {
            return Err(RemoteError::Io(io::Error::other(format!("blob {blob} unavailable"))));
        }
        let Some(content) = self.blobs.get(blob).cloned() else {
            return Err(RemoteError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                blob.to_string(),
            )));
        };
        Ok(Box::pin(io::Cursor::new(content)))
    }
}

/// Records every progress event.
#[derive(Default)]
pub struct CountingProgress {
    pub started: Mutex<Vec<u64>>,
    pub increments: AtomicUsize,
    pub finished: AtomicUsize,
}

impl ProgressSink for CountingProgress {
    fn start(&self, total: u64) {
        self.started.lock().unwrap().push(total);
    }

    fn increment(&self) {
        self.increments.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}
