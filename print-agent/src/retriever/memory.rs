use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;

use super::{AssetInfo, AssetStream, RemoteStore};
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct StoredAsset {
    name: String,
    chunks: Vec<Bytes>,
    /// Yield an error after the stored chunks instead of ending cleanly.
    interrupted: bool,
}

/// In-memory [`RemoteStore`] for local runs and tests.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    assets: DashMap<String, StoredAsset>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<String>, name: impl Into<String>, content: Vec<u8>) {
        self.insert_chunked(id, name, vec![content]);
    }

    pub fn insert_chunked(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        chunks: Vec<Vec<u8>>,
    ) {
        self.assets.insert(
            id.into(),
            StoredAsset {
                name: name.into(),
                chunks: chunks.into_iter().map(Bytes::from).collect(),
                interrupted: false,
            },
        );
    }

    /// An asset whose download breaks off after `partial` has been sent.
    pub fn insert_interrupted(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        partial: Vec<u8>,
    ) {
        self.assets.insert(
            id.into(),
            StoredAsset {
                name: name.into(),
                chunks: vec![Bytes::from(partial)],
                interrupted: true,
            },
        );
    }

    fn get(&self, asset_id: &str) -> Result<StoredAsset> {
        self.assets
            .get(asset_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::not_found("Remote file", asset_id))
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn probe(&self, asset_id: &str) -> Result<AssetInfo> {
        let asset = self.get(asset_id)?;
        Ok(AssetInfo {
            id: asset_id.to_string(),
            name: Some(asset.name),
            size: Some(asset.chunks.iter().map(|c| c.len() as u64).sum()),
        })
    }

    async fn open(&self, asset_id: &str) -> Result<AssetStream> {
        let asset = self.get(asset_id)?;
        let size_hint = Some(asset.chunks.iter().map(|c| c.len() as u64).sum());
        let mut items: Vec<Result<Bytes>> = asset.chunks.into_iter().map(Ok).collect();
        if asset.interrupted {
            items.push(Err(Error::retrieval("connection reset during download")));
        }
        Ok(AssetStream {
            size_hint,
            chunks: futures::stream::iter(items).boxed(),
        })
    }
}
