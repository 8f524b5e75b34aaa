use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::{AssetStore, AssetStoreError, RemoteAsset, UploadChunk, UploadPlan, VersionStack};

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct MediaLinksResponse {
    media_links: MediaLinks,
}

#[derive(Deserialize)]
struct MediaLinks {
    original: Option<MediaLink>,
}

#[derive(Deserialize)]
struct MediaLink {
    download_url: Option<String>,
}

#[derive(Deserialize)]
struct LocalUploadResponse {
    id: String,
    media_type: Option<String>,
    upload_urls: Vec<UploadChunk>,
}

/// REST client for the asset store, authenticated with a bearer token.
#[derive(Clone)]
pub struct HttpAssetStore {
    client: Client,
    base_url: Url,
    token: String,
}

impl HttpAssetStore {
    pub fn new(base_url: &str, token: &str) -> Result<Self, AssetStoreError> {
        Self::with_client(Client::new(), base_url, token)
    }

    pub fn with_client(client: Client, base_url: &str, token: &str) -> Result<Self, AssetStoreError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AssetStoreError::InvalidBaseUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AssetStoreError::InvalidBaseUrl(base_url.to_string()));
        }
        Ok(Self {
            client,
            base_url,
            token: token.to_string(),
        })
    }

    /// Appends `segments` to the base path, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, AssetStoreError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| AssetStoreError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssetStoreError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, AssetStoreError> {
        let envelope: Envelope<T> = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| AssetStoreError::Decode(e.to_string()))?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl AssetStore for HttpAssetStore {
    async fn get_asset(&self, account_id: &str, asset_id: &str) -> Result<RemoteAsset, AssetStoreError> {
        let url = self.url(&["accounts", account_id, "files", asset_id]);
        self.fetch(self.client.get(url)).await
    }

    async fn original_media_url(&self, account_id: &str, asset_id: &str) -> Result<String, AssetStoreError> {
        let url = self.url(&["accounts", account_id, "files", asset_id]);
        let links: MediaLinksResponse = self
            .fetch(self.client.get(url).query(&[("include", "media_links.original")]))
            .await?;

        links
            .media_links
            .original
            .and_then(|link| link.download_url)
            .ok_or_else(|| AssetStoreError::Decode(format!("asset {} has no original media link", asset_id)))
    }

    async fn create_upload(
        &self,
        account_id: &str,
        folder_id: &str,
        name: &str,
        size: u64,
    ) -> Result<UploadPlan, AssetStoreError> {
        let url = self.url(&["accounts", account_id, "folders", folder_id, "files", "local_upload"]);
        let body = json!({ "data": { "name": name, "file_size": size } });
        let created: LocalUploadResponse = self.fetch(self.client.post(url).json(&body)).await?;

        debug!(file_id = %created.id, chunks = created.upload_urls.len(), "Created upload plan");
        Ok(UploadPlan {
            file_id: created.id,
            media_type: created.media_type,
            chunks: created.upload_urls,
        })
    }

    async fn create_version_stack(
        &self,
        account_id: &str,
        folder_id: &str,
        file_ids: &[String],
    ) -> Result<VersionStack, AssetStoreError> {
        let url = self.url(&["accounts", account_id, "folders", folder_id, "version_stacks"]);
        let body = json!({ "data": { "file_ids": file_ids } });
        self.fetch(self.client.post(url).json(&body)).await
    }

    async fn post_comment(&self, account_id: &str, file_id: &str, text: &str) -> Result<(), AssetStoreError> {
        let url = self.url(&["accounts", account_id, "files", file_id, "comments"]);
        let body = json!({ "data": { "text": text } });
        self.send(self.client.post(url).json(&body)).await?;
        Ok(())
    }
}
