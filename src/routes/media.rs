use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt as _;
use serde::Serialize;
use tracing::{error, info};
use utoipa::ToSchema;

use super::AppState;
use crate::error::ApiError;
use crate::image_host::{check_image, HostedImage, ImageCheck, MAX_IMAGE_BYTES};

/// Multipart body of an image upload.
#[derive(ToSchema)]
pub struct ImageUpload {
    /// The image; a part named `file` is accepted too.
    #[schema(value_type = String, format = Binary)]
    pub source: Vec<u8>,
}

/// An image read from a multipart body and checked for size and type.
pub struct Upload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime: &'static str,
}

/// Read the first `source` or `file` part of a multipart body.
pub async fn read_image(mut payload: Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = payload.try_next().await.map_err(|e| {
        error!("multipart error: {e}");
        ApiError::bad_request("malformed multipart body")
    })? {
        let (name, filename) = {
            let cd = field.content_disposition();
            (cd.get_name().map(str::to_owned), cd.get_filename().map(str::to_owned))
        };
        if !matches!(name.as_deref(), Some("source") | Some("file")) {
            continue;
        }
        let mut field_stream = field;
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field_stream.try_next().await.map_err(|e| {
            error!("stream read error: {e}");
            ApiError::bad_request("malformed multipart body")
        })? {
            if bytes.len() + chunk.len() > MAX_IMAGE_BYTES {
                return Err(ApiError::PayloadTooLarge);
            }
            bytes.extend_from_slice(&chunk);
        }
        let mime = match check_image(&bytes) {
            Ok(m) => m,
            Err(ImageCheck::TooLarge) => return Err(ApiError::PayloadTooLarge),
            Err(ImageCheck::NotAnImage) => return Err(ApiError::UnsupportedMediaType),
        };
        return Ok(Upload { bytes, filename: filename.unwrap_or_else(|| "upload".into()), mime });
    }
    Err(ApiError::bad_request("no file uploaded"))
}

#[derive(Serialize, ToSchema)]
pub struct UploadedFile {
    #[serde(flatten)]
    pub image: HostedImage,
    pub filename: String,
    pub mimetype: String,
}

#[derive(Serialize, ToSchema)]
pub struct GetUrlResponse {
    pub success: bool,
    pub message: String,
    pub data: UploadedFile,
}

#[utoipa::path(
    post,
    path = "/api/getUrl",
    request_body(content = ImageUpload, content_type = "multipart/form-data", description = "Image in a `source` or `file` part"),
    responses(
        (status = 200, description = "Hosted image", body = GetUrlResponse),
        (status = 400, description = "No file"),
        (status = 413, description = "File too large"),
        (status = 415, description = "Not an image"),
        (status = 502, description = "Image host failure")
    )
)]
pub async fn get_url(data: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, ApiError> {
    let upload = read_image(payload).await?;
    let image = data.image_host.upload(upload.bytes, &upload.filename).await?;
    info!(filename = %upload.filename, "image forwarded to host");
    Ok(HttpResponse::Ok().json(GetUrlResponse {
        success: true,
        message: "file uploaded".into(),
        data: UploadedFile { image, filename: upload.filename, mimetype: upload.mime.to_string() },
    }))
}
