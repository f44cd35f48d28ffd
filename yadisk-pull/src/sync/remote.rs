use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use yadisk_core::{YadiskClient, YadiskError};

use super::model::FileMetadata;
use super::paths::remote_path_for;

/// Readable content of one remote blob.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("api error: {0}")]
    Api(#[from] YadiskError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("remote entry {0} lies outside the sync root or has invalid metadata")]
    UnexpectedEntry(String),
}

/// The remote side of a pull: metadata lookups and content streams.
#[async_trait]
pub trait RemoteTree: Send + Sync {
    /// Looks up a logical path. A missing entry is `Ok(None)`.
    async fn find_by_path(&self, path: &str) -> Result<Option<FileMetadata>, RemoteError>;

    /// Direct children of a remote directory.
    async fn list_dir(&self, path: &str) -> Result<Vec<FileMetadata>, RemoteError>;

    /// Opens the content referenced by a `blob_at` value.
    async fn download(&self, blob: &str) -> Result<BlobReader, RemoteError>;
}

/// [`RemoteTree`] backed by the Yandex Disk REST API. Logical paths are
/// resolved below `remote_root` (for example `disk:/` or `disk:/Backup`).
pub struct YadiskRemote {
    client: YadiskClient,
    remote_root: String,
    page_size: u32,
}

impl YadiskRemote {
    pub fn new(client: YadiskClient, remote_root: impl Into<String>) -> Self {
        Self {
            client,
            remote_root: remote_root.into(),
            page_size: 100,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[async_trait]
impl RemoteTree for YadiskRemote {
    async fn find_by_path(&self, path: &str) -> Result<Option<FileMetadata>, RemoteError> {
        let remote_path = remote_path_for(&self.remote_root, path);
        let resource = match self.client.get_resource(&remote_path).await {
            Ok(resource) => resource,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        FileMetadata::from_resource(&self.remote_root, &resource)
            .map(Some)
            .ok_or(RemoteError::UnexpectedEntry(resource.path))
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<FileMetadata>, RemoteError> {
        let remote_path = remote_path_for(&self.remote_root, path);
        let items = self
            .client
            .list_directory_all(&remote_path, self.page_size)
            .await?;
        let mut out = Vec::with_capacity(items.len());
        for item in &items {
            match FileMetadata::from_resource(&self.remote_root, item) {
                Some(meta) => out.push(meta),
                None => {
                    tracing::warn!(path = %item.path, "skipping remote entry with unusable metadata")
                }
            }
        }
        Ok(out)
    }

    async fn download(&self, blob: &str) -> Result<BlobReader, RemoteError> {
        let response = self.client.open_download(blob).await?;
        let stream = response.bytes_stream().map_err(io::Error::other);
        Ok(Box::pin(StreamReader::new(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_remote(server: &MockServer) -> YadiskRemote {
        let client = YadiskClient::with_base_url(&server.uri(), "test-token").unwrap();
        YadiskRemote::new(client, "disk:/Backup")
    }

    #[tokio::test]
    async fn find_by_path_maps_not_found_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/disk/resources"))
            .and(query_param("path", "disk:/Backup/docs"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let remote = make_remote(&server);
        assert!(remote.find_by_path("/docs").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_by_path_surfaces_other_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/disk/resources"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let remote = make_remote(&server);
        let err = remote.find_by_path("/docs").await.unwrap_err();
        assert!(matches!(err, RemoteError::Api(_)));
    }

    #[tokio::test]
    async fn find_by_path_returns_logical_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/disk/resources"))
            .and(query_param("path", "disk:/Backup/docs/a.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "path": "disk:/Backup/docs/a.txt",
                "name": "a.txt",
                "type": "file",
                "size": 3,
                "modified": "2024-01-01T00:00:00+00:00",
                "resource_id": "1:a"
            })))
            .mount(&server)
            .await;

        let remote = make_remote(&server);
        let meta = remote.find_by_path("/docs/a.txt").await.unwrap().unwrap();
        assert_eq!(meta.path, "/docs/a.txt");
        assert_eq!(meta.blob_at.as_deref(), Some("disk:/Backup/docs/a.txt"));
        assert_eq!(meta.size, Some(3));
    }

    #[tokio::test]
    async fn list_dir_converts_children() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/disk/resources"))
            .and(query_param("path", "disk:/Backup/docs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "_embedded": {
                    "limit": 100,
                    "offset": 0,
                    "total": 2,
                    "items": [
                        {
                            "path": "disk:/Backup/docs/sub",
                            "name": "sub",
                            "type": "dir",
                            "modified": "2024-01-01T00:00:00+00:00"
                        },
                        {
                            "path": "disk:/Backup/docs/b.txt",
                            "name": "b.txt",
                            "type": "file",
                            "modified": "2024-01-01T00:00:00+00:00"
                        }
                    ]
                }
            })))
            .mount(&server)
            .await;

        let remote = make_remote(&server);
        let children = remote.list_dir("/docs").await.unwrap();
        assert_eq!(children.len(), 2);
        assert!(children[0].is_dir);
        assert_eq!(children[1].path, "/docs/b.txt");
    }

    #[tokio::test]
    async fn download_streams_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/disk/resources/download"))
            .and(query_param("path", "disk:/Backup/docs/a.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "href": format!("{}/content/a", server.uri()),
                "method": "GET",
                "templated": false
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/content/a"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload"))
            .mount(&server)
            .await;

        let remote = make_remote(&server);
        let mut reader = remote.download("disk:/Backup/docs/a.txt").await.unwrap();
        let mut body = Vec::new();
        reader.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"payload");
    }
}
