//! HTTP transport implementing `Uploader` and `Downloader` over the wire
//! protocol: multipart shard/catalog upload, JSON restore requests,
//! gzip-tar restore responses.
//!
//! A bare `reqwest::Client`, bearer auth on the request builder,
//! `.send().await` then branch on the response.

use async_trait::async_trait;
use cvault_core::error::{CoreError, CoreResult};
use cvault_core::packer::Uploader;
use cvault_core::restore::{Downloader, RestoreItem};
use cvault_core::session::SessionId;
use serde::{Deserialize, Serialize};
use url::Url;

pub struct HttpTransport {
    http_client: reqwest::Client,
    base_url: Url,
    device_id: String,
    bearer_token: String,
}

impl HttpTransport {
    pub fn new(base_url: Url, device_id: String, bearer_token: String) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url,
            device_id,
            bearer_token,
        }
    }

    fn devices_path(&self, suffix: &str) -> CoreResult<Url> {
        self.base_url
            .join(&format!("api/v1/devices/{}/{suffix}", self.device_id))
            .map_err(|e| CoreError::Network(format!("invalid device URL: {e}")))
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("device_id", &self.device_id)
            .field("bearer_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct CatalogListResponse {
    #[allow(dead_code)]
    success: bool,
    data: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RestoreRequest {
    files: Vec<RestoreFileRequest>,
}

#[derive(Debug, Serialize)]
struct RestoreFileRequest {
    hashed_name: String,
    target_date: String,
}

#[async_trait]
impl Uploader for HttpTransport {
    async fn upload_shard(
        &self,
        bytes: Vec<u8>,
        session_id: &SessionId,
        shard_index: u32,
    ) -> CoreResult<()> {
        let url = self.devices_path("backups")?;
        let part = reqwest::multipart::Part::bytes(bytes).file_name(session_id.shard_name(shard_index));
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("session_id", session_id.as_str().to_string());

        let res = self
            .http_client
            .post(url)
            .bearer_auth(&self.bearer_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("shard upload failed: {e}")))?;

        check_status(res).await.map(|_| ())
    }

    async fn upload_catalog_snapshot(
        &self,
        bytes: Vec<u8>,
        session_id: &SessionId,
    ) -> CoreResult<()> {
        let url = self.devices_path("catalogs")?;
        let part = reqwest::multipart::Part::bytes(bytes).file_name(session_id.catalog_name());
        let form = reqwest::multipart::Form::new()
            .part("catalog", part)
            .text("session_id", session_id.as_str().to_string());

        let res = self
            .http_client
            .post(url)
            .bearer_auth(&self.bearer_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("catalog snapshot upload failed: {e}")))?;

        check_status(res).await.map(|_| ())
    }
}

#[async_trait]
impl Downloader for HttpTransport {
    async fn request_restore(&self, items: &[RestoreItem]) -> CoreResult<Vec<u8>> {
        let url = self.devices_path("restore-files")?;
        let body = RestoreRequest {
            files: items
                .iter()
                .map(|i| RestoreFileRequest {
                    hashed_name: i.path_hash.as_str().to_string(),
                    target_date: i.effective_timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
                })
                .collect(),
        };

        let res = self
            .http_client
            .post(url)
            .bearer_auth(&self.bearer_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("restore request failed: {e}")))?;

        let res = check_status(res).await?;
        res.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| CoreError::Network(format!("failed to read restore archive: {e}")))
    }

    async fn list_catalog_snapshots(&self) -> CoreResult<Vec<String>> {
        let url = self.devices_path("catalogs")?;
        let res = self
            .http_client
            .get(url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("catalog list request failed: {e}")))?;

        let res = check_status(res).await?;
        let parsed: CatalogListResponse = res
            .json()
            .await
            .map_err(|e| CoreError::Network(format!("malformed catalog list response: {e}")))?;
        Ok(parsed.data)
    }

    async fn download_url(&self, url: &str) -> CoreResult<Vec<u8>> {
        let res = self
            .http_client
            .get(url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(|e| CoreError::Network(format!("download failed: {e}")))?;

        let res = check_status(res).await?;
        res.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| CoreError::Network(format!("failed to read downloaded body: {e}")))
    }
}

/// Maps quota/rate-limit statuses to `CoreError::Quota` (fatal, surfaced
/// verbatim) and every other non-2xx to `CoreError::Network`.
async fn check_status(res: reqwest::Response) -> CoreResult<reqwest::Response> {
    let status = res.status();
    if status == reqwest::StatusCode::PAYLOAD_TOO_LARGE || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let body = res.text().await.unwrap_or_default();
        return Err(CoreError::Quota(format!("{status}: {body}")));
    }
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(CoreError::Network(format!("{status}: {body}")));
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn devices_path_joins_device_id_and_suffix() {
        let t = HttpTransport::new(
            Url::parse("https://vault.example.com/").unwrap(),
            "dev-1".to_string(),
            "token".to_string(),
        );
        let url = t.devices_path("backups").unwrap();
        assert_eq!(url.as_str(), "https://vault.example.com/api/v1/devices/dev-1/backups");
    }
}
