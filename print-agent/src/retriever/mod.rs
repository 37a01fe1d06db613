//! Retrieval of remote file assets into the staging directory.

mod drive;
mod memory;
mod progress;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::io::AsyncWriteExt;
use tracing::info;

pub use drive::{DriveConfig, DriveStore};
pub use memory::MemoryRemoteStore;
pub use progress::{DownloadProgressSnapshot, DownloadProgressUpdate, ProgressReporter};

use crate::{Error, Result};

/// Metadata about a remote asset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetInfo {
    pub id: String,
    pub name: Option<String>,
    /// Size in bytes, when the store reports it.
    pub size: Option<u64>,
}

/// Stream of content chunks for one asset.
pub type ChunkStream = BoxStream<'static, Result<Bytes>>;

/// An open download.
pub struct AssetStream {
    /// Content length, when the transport reports it.
    pub size_hint: Option<u64>,
    pub chunks: ChunkStream,
}

/// A remote file store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Look up an asset. A missing asset is [`Error::NotFound`].
    async fn probe(&self, asset_id: &str) -> Result<AssetInfo>;

    /// Open an asset's content as a stream of chunks.
    async fn open(&self, asset_id: &str) -> Result<AssetStream>;
}

/// Streams remote assets into local files.
#[derive(Clone)]
pub struct FileRetriever {
    store: Arc<dyn RemoteStore>,
}

impl FileRetriever {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Download `asset_id` to `dest`, returning the number of bytes written.
    ///
    /// `dest` should already be registered with a staging guard; a partial
    /// file is left for that guard to remove.
    pub async fn fetch(
        &self,
        asset_id: &str,
        dest: &Path,
        progress: &mut ProgressReporter,
    ) -> Result<u64> {
        if asset_id.trim().is_empty() {
            return Err(Error::validation("Missing remote file id"));
        }

        let info = self.store.probe(asset_id).await?;
        let AssetStream { size_hint, mut chunks } = self.store.open(asset_id).await?;
        let total = size_hint.or(info.size);

        let write_error = |op: &str, e: std::io::Error| {
            Error::retrieval(format!("{} '{}' failed: {}", op, dest.display(), e))
        };
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| write_error("creating", e))?;

        let mut written = 0u64;
        progress.report(0, total);
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| write_error("writing", e))?;
            written += chunk.len() as u64;
            progress.report(written, total);
        }
        file.flush().await.map_err(|e| write_error("flushing", e))?;

        info!(
            asset_id,
            store = self.store.name(),
            bytes = written,
            path = %dest.display(),
            "Downloaded file"
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_streams_to_disk() {
        let store = MemoryRemoteStore::new();
        store.insert_chunked("doc-1", "notes.pdf", vec![b"%PDF-".to_vec(), b"1.5".to_vec()]);
        let retriever = FileRetriever::new(Arc::new(store));

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("j1_0_notes.pdf");
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let mut progress = ProgressReporter::new("j1", "notes.pdf", tx);

        let bytes = retriever.fetch("doc-1", &dest, &mut progress).await.unwrap();

        assert_eq!(bytes, 8);
        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.5");
        let mut last = None;
        while let Ok(update) = rx.try_recv() {
            last = update.snapshot.percent;
        }
        assert_eq!(last, Some(100));
    }

    #[tokio::test]
    async fn test_missing_asset_is_not_found() {
        let retriever = FileRetriever::new(Arc::new(MemoryRemoteStore::new()));
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("x.pdf");
        let mut progress = ProgressReporter::logging("j1", "x.pdf");

        let err = retriever.fetch("nope", &dest, &mut progress).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_blank_asset_id_is_validation_error() {
        let retriever = FileRetriever::new(Arc::new(MemoryRemoteStore::new()));
        let mut progress = ProgressReporter::logging("j1", "x.pdf");
        let err = retriever
            .fetch("  ", Path::new("/tmp/unused"), &mut progress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_unwritable_destination_is_retrieval_error() {
        let store = MemoryRemoteStore::new();
        store.insert("doc-1", "a.pdf", b"data".to_vec());
        let retriever = FileRetriever::new(Arc::new(store));
        let mut progress = ProgressReporter::logging("j1", "a.pdf");

        let err = retriever
            .fetch("doc-1", Path::new("/nonexistent-dir/a.pdf"), &mut progress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Retrieval(_)));
    }
}
