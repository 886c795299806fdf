//! Upload and summarisation collaborators.
//!
//! Media is stored by an external service that hands back a URL; the case
//! only keeps the reference. Audio notes can be summarised to text by the
//! same service. All failures collapse into [`UploadError::UploadFailed`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ReconcilerConfig;
use crate::guard::{self, Rejection};
use crate::models::{AttachmentKind, CaseRecord};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),
}

#[async_trait]
pub trait UploadService: Send + Sync {
    /// Store `bytes` and return the public URL.
    async fn upload(
        &self,
        kind: AttachmentKind,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, UploadError>;

    /// Summarise a previously uploaded audio note.
    async fn summarize(&self, audio_url: &str) -> Result<String, UploadError>;
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryRequest<'a> {
    audio_url: &'a str,
}

#[derive(Deserialize)]
struct SummaryResponse {
    summary: String,
}

/// Upload service over HTTP.
///
/// - `POST {base}/uploads/{kind}?fileName=` with the raw bytes → `{ url }`
/// - `POST {base}/summaries` `{ audioUrl }` → `{ summary }`
pub struct HttpUploadService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpUploadService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::UploadFailed(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &ReconcilerConfig) -> Result<Self, UploadError> {
        Self::new(&config.api_base_url, config.request_timeout)
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, UploadError> {
        let response = request
            .send()
            .await
            .map_err(|e| UploadError::UploadFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::UploadFailed(format!("HTTP {status}: {body}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| UploadError::UploadFailed(format!("Invalid response: {e}")))
    }
}

#[async_trait]
impl UploadService for HttpUploadService {
    async fn upload(
        &self,
        kind: AttachmentKind,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::UploadFailed(format!("{file_name} is empty")));
        }
        let size = bytes.len();
        let request = self
            .client
            .post(format!("{}/uploads/{kind}", self.base_url))
            .query(&[("fileName", file_name)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes);
        let response: UploadResponse = self.post(request).await?;
        tracing::info!(%kind, size, "Attachment uploaded");
        Ok(response.url)
    }

    async fn summarize(&self, audio_url: &str) -> Result<String, UploadError> {
        let request = self
            .client
            .post(format!("{}/summaries", self.base_url))
            .json(&SummaryRequest { audio_url });
        let response: SummaryResponse = self.post(request).await?;
        Ok(response.summary)
    }
}

/// Record an uploaded file on the case. Closed cases are immutable.
pub fn attach(case: &mut CaseRecord, kind: AttachmentKind, url: String) -> Result<(), Rejection> {
    guard::check_amendment(case)?;
    match kind {
        AttachmentKind::Image => case.attachments.image_url = Some(url),
        AttachmentKind::Audio => case.attachments.audio_url = Some(url),
    }
    Ok(())
}
