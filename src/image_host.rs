use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::config::ImageHostConfig;

/// Largest upload forwarded to the image host.
pub const MAX_IMAGE_BYTES: usize = 16 * 1024 * 1024;

const UPLOAD_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum ImageHostError {
    #[error("image host is not configured")]
    NotConfigured,
    #[error("image host unreachable: {0}")]
    Request(String),
    #[error("image host rejected the upload: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HostedImage {
    pub url: String,
    pub display_url: String,
    pub size: u64,
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<HostedImage, ImageHostError>;
}

/// Accept only payloads that sniff as an image and fit the size cap.
/// Returns the detected mime type.
pub fn check_image(bytes: &[u8]) -> Result<&'static str, ImageCheck> {
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ImageCheck::TooLarge);
    }
    match infer::get(bytes) {
        Some(t) if t.mime_type().starts_with("image/") => Ok(t.mime_type()),
        _ => Err(ImageCheck::NotAnImage),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ImageCheck {
    TooLarge,
    NotAnImage,
}

// ---------------- freeimage.host style API ----------------

#[derive(Deserialize)]
struct UploadReply {
    status_code: Option<u16>,
    image: Option<HostedImage>,
    error: Option<UploadReplyError>,
}

#[derive(Deserialize)]
struct UploadReplyError {
    message: String,
}

pub struct FreeImageHost {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl FreeImageHost {
    pub fn new(cfg: &ImageHostConfig) -> Result<Self, ImageHostError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ImageHostError::Request(e.to_string()))?;
        Ok(Self { client, url: cfg.url.clone(), api_key: cfg.api_key.clone() })
    }
}

#[async_trait]
impl ImageHost for FreeImageHost {
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<HostedImage, ImageHostError> {
        let size = bytes.len();
        let source = STANDARD.encode(&bytes);

        // Connection failures are retried; replies from the host are not.
        let mut attempt = 0u32;
        let resp = loop {
            attempt += 1;
            let form = reqwest::multipart::Form::new()
                .text("key", self.api_key.clone())
                .text("action", "upload")
                .text("format", "json")
                .text("source", source.clone());
            match self.client.post(&self.url).multipart(form).send().await {
                Ok(resp) => break resp,
                Err(e) if attempt < UPLOAD_ATTEMPTS => {
                    let backoff_ms = 200 * u64::from(attempt.pow(2));
                    warn!(attempt, error = %e, "image host request failed (retrying in {backoff_ms}ms)");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "image host request failed");
                    return Err(ImageHostError::Request(e.to_string()));
                }
            }
        };

        let status = resp.status();
        let reply: UploadReply = resp.json().await.map_err(|e| {
            warn!(%status, error = %e, "image host sent an unreadable reply");
            ImageHostError::Rejected(format!("unexpected reply ({status})"))
        })?;

        let upstream_code = reply.status_code.unwrap_or(status.as_u16());
        match reply.image {
            Some(image) if status.is_success() && upstream_code == 200 => {
                info!(filename, size, url = %image.url, "image uploaded");
                Ok(image)
            }
            _ => {
                let message = reply
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| format!("upload failed ({upstream_code})"));
                warn!(filename, %status, %message, "image host rejected upload");
                Err(ImageHostError::Rejected(message))
            }
        }
    }
}

/// Used when no image host is configured; every upload fails.
pub struct DisabledImageHost;

#[async_trait]
impl ImageHost for DisabledImageHost {
    async fn upload(&self, _bytes: Vec<u8>, _filename: &str) -> Result<HostedImage, ImageHostError> {
        Err(ImageHostError::NotConfigured)
    }
}

// Factory helper used in main.
pub fn build_image_host(cfg: Option<&ImageHostConfig>) -> Result<Arc<dyn ImageHost>, ImageHostError> {
    match cfg {
        Some(c) => Ok(Arc::new(FreeImageHost::new(c)?)),
        None => {
            warn!("UPLOAD_FREE_HOST_URL/UPLOAD_FREE_HOST_API_KEY not set; uploads disabled");
            Ok(Arc::new(DisabledImageHost))
        }
    }
}
