//! HTTP client for the bundler node.

use crate::error::{UploadError, UploadResult};
use crate::receipt::UploadReceipt;
use crate::retry::http_error;
use crate::transport::{BundlerTransport, ItemPostOutcome, SessionInfo};
use async_trait::async_trait;
use bundler_core::ClientConfig;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Chunk protocol version sent with every chunk request.
pub const CHUNKING_VERSION: &str = "2";

const CHUNKING_VERSION_HEADER: &str = "x-chunking-version";
const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Clone)]
pub struct NodeApi {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    finalize_timeout: Duration,
}

impl NodeApi {
    pub fn new(base_url: &str) -> UploadResult<Self> {
        Self::from_config(&ClientConfig {
            url: base_url.to_string(),
            ..ClientConfig::default()
        })
    }

    pub fn from_config(config: &ClientConfig) -> UploadResult<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| UploadError::Validation(format!("invalid node URL {}: {e}", config.url)))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            timeout: config.timeout(),
            finalize_timeout: config.finalize_timeout(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> UploadResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| UploadError::Validation(format!("failed to build node URL: {e}")))
    }

    fn chunk_url(&self, token: &str, upload_id: &str, offset: &str) -> UploadResult<Url> {
        self.url(&format!("/chunks/{token}/{upload_id}/{offset}"))
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> UploadResult<(StatusCode, String)> {
        let response = req.timeout(self.timeout).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Ok((status, body))
    }

    fn parse<T: DeserializeOwned>(body: &str) -> UploadResult<T> {
        serde_json::from_str(body).map_err(|e| UploadError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl BundlerTransport for NodeApi {
    async fn create_session(&self, token: &str) -> UploadResult<SessionInfo> {
        let url = self.chunk_url(token, "-1", "-1")?;
        let (status, body) = self
            .send(self.http.get(url).header(CHUNKING_VERSION_HEADER, CHUNKING_VERSION))
            .await?;
        if !status.is_success() {
            return Err(http_error(status.as_u16(), None, None, body));
        }
        Self::parse(&body)
    }

    async fn session_info(&self, token: &str, upload_id: &str) -> UploadResult<SessionInfo> {
        let url = self.chunk_url(token, upload_id, "-1")?;
        let (status, body) = self
            .send(self.http.get(url).header(CHUNKING_VERSION_HEADER, CHUNKING_VERSION))
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Err(UploadError::SessionExpired {
                upload_id: upload_id.to_string(),
            });
        }
        if !status.is_success() {
            return Err(http_error(status.as_u16(), Some(upload_id), None, body));
        }
        Self::parse(&body)
    }

    async fn post_chunk(
        &self,
        token: &str,
        upload_id: &str,
        offset: u64,
        chunk: Bytes,
    ) -> UploadResult<()> {
        let url = self.chunk_url(token, upload_id, &offset.to_string())?;
        let req = self
            .http
            .post(url)
            .header(CHUNKING_VERSION_HEADER, CHUNKING_VERSION)
            .header(CONTENT_TYPE, OCTET_STREAM)
            .body(chunk);
        let (status, body) = self.send(req).await?;
        if !status.is_success() {
            return Err(http_error(status.as_u16(), Some(upload_id), Some(offset), body));
        }
        Ok(())
    }

    async fn finalize(&self, token: &str, upload_id: &str) -> UploadResult<UploadReceipt> {
        let url = self.chunk_url(token, upload_id, "-1")?;
        let response = self
            .http
            .post(url)
            .header(CHUNKING_VERSION_HEADER, CHUNKING_VERSION)
            .header(CONTENT_TYPE, OCTET_STREAM)
            .timeout(self.finalize_timeout)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        let reconstruction = |body: String| UploadError::Reconstruction {
            upload_id: upload_id.to_string(),
            status: status.as_u16(),
            body,
        };
        match status {
            StatusCode::PAYMENT_REQUIRED => Err(UploadError::InsufficientFunds {
                upload_id: Some(upload_id.to_string()),
                offset: None,
            }),
            StatusCode::OK | StatusCode::CREATED => {
                match serde_json::from_str::<UploadReceipt>(&body) {
                    Ok(receipt) if !receipt.id.is_empty() => Ok(receipt),
                    _ => Err(reconstruction(body)),
                }
            }
            _ => Err(reconstruction(body)),
        }
    }

    async fn post_item(&self, token: &str, item: Bytes) -> UploadResult<ItemPostOutcome> {
        let url = self.url(&format!("/tx/{token}"))?;
        let req = self
            .http
            .post(url)
            .header(CONTENT_TYPE, OCTET_STREAM)
            .body(item);
        let (status, body) = self.send(req).await?;
        match status {
            StatusCode::OK => Ok(ItemPostOutcome::Accepted(Self::parse(&body)?)),
            StatusCode::CREATED => Ok(ItemPostOutcome::AlreadyReceived),
            _ => Err(http_error(status.as_u16(), None, None, body)),
        }
    }
}
