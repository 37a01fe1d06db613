//! Google Drive v3 file store.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use super::{AssetInfo, AssetStream, RemoteStore};
use crate::{Error, Result};

pub const DEFAULT_DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub api_base: String,
    /// OAuth bearer token with read access to the uploaded files.
    pub access_token: String,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_DRIVE_API_BASE.to_string(),
            access_token: String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: Option<String>,
    /// Drive reports sizes as decimal strings.
    #[serde(default)]
    size: Option<String>,
}

/// Reads files from Google Drive, including shared drives.
pub struct DriveStore {
    client: reqwest::Client,
    config: DriveConfig,
}

impl DriveStore {
    pub fn new(client: reqwest::Client, config: DriveConfig) -> Self {
        Self { client, config }
    }

    fn file_url(&self, asset_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.config.api_base)
            .map_err(|e| Error::config(format!("invalid Drive API base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::config("Drive API base URL cannot have path segments"))?
            .pop_if_empty()
            .push("files")
            .push(asset_id);
        url.query_pairs_mut().append_pair("supportsAllDrives", "true");
        Ok(url)
    }

    async fn get(&self, url: Url, asset_id: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(|e| Error::retrieval(format!("Google Drive request failed: {}", e)))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(Error::not_found("Google Drive file", asset_id)),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::retrieval(format!(
                    "Google Drive returned {} for '{}': {}",
                    status,
                    asset_id,
                    body.trim()
                )))
            }
        }
    }
}

#[async_trait]
impl RemoteStore for DriveStore {
    fn name(&self) -> &'static str {
        "google-drive"
    }

    async fn probe(&self, asset_id: &str) -> Result<AssetInfo> {
        let mut url = self.file_url(asset_id)?;
        url.query_pairs_mut().append_pair("fields", "id,name,size");

        let file: DriveFile = self
            .get(url, asset_id)
            .await?
            .json()
            .await
            .map_err(|e| Error::retrieval(format!("unreadable Drive metadata: {}", e)))?;

        Ok(AssetInfo {
            size: file.size.as_deref().and_then(|s| s.parse().ok()),
            id: file.id,
            name: file.name,
        })
    }

    async fn open(&self, asset_id: &str) -> Result<AssetStream> {
        let mut url = self.file_url(asset_id)?;
        url.query_pairs_mut().append_pair("alt", "media");

        let response = self.get(url, asset_id).await?;
        let size_hint = response.content_length();
        let chunks = response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| Error::retrieval(format!("Failed during file download: {}", e)))
            })
            .boxed();
        Ok(AssetStream { size_hint, chunks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http_client::build_client;
    use std::time::Duration;

    fn store(base: &str) -> DriveStore {
        DriveStore::new(
            build_client(Duration::ZERO).unwrap(),
            DriveConfig {
                api_base: base.to_string(),
                access_token: "token".to_string(),
            },
        )
    }

    #[test]
    fn test_file_url_supports_shared_drives() {
        let url = store(DEFAULT_DRIVE_API_BASE).file_url("abc 123").unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/drive/v3/files/abc%20123?supportsAllDrives=true"
        );
    }

    #[test]
    fn test_file_url_tolerates_trailing_slash() {
        let url = store("http://localhost:9000/drive/v3/").file_url("x").unwrap();
        assert_eq!(url.path(), "/drive/v3/files/x");
    }

    #[test]
    fn test_invalid_base_is_configuration_error() {
        assert!(matches!(
            store("not a url").file_url("x"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_drive_size_is_a_string() {
        let file: DriveFile =
            serde_json::from_str(r#"{"id": "a", "name": "n.pdf", "size": "1024"}"#).unwrap();
        assert_eq!(file.size.as_deref().and_then(|s| s.parse::<u64>().ok()), Some(1024));
    }
}
