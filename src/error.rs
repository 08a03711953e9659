use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use serde::Serialize;
use tracing::error;

use crate::crypto::CryptoError;
use crate::google::GoogleAuthError;
use crate::image_host::ImageHostError;
use crate::mailer::MailError;
use crate::repo::RepoError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub message: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] InvalidArgument(String),
    #[error("{0}")] Unauthenticated(String),
    #[error("{0}")] Forbidden(String),
    #[error("{0}")] NotFound(String),
    #[error("{0}")] Conflict(String),
    #[error("{0}")] TooManyRequests(String),
    #[error("file too large")] PayloadTooLarge,
    #[error("unsupported media type")] UnsupportedMediaType,
    #[error("{0}")] Upstream(String),
    #[error("internal error")] Internal,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::InvalidArgument(msg.into())
    }

    pub fn forbidden() -> Self {
        ApiError::Forbidden("you are not allowed to do this".into())
    }

    pub fn unauthenticated() -> Self {
        ApiError::Unauthenticated("authentication required".into())
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound("not found".into()),
            RepoError::Conflict => ApiError::Conflict("already exists".into()),
            RepoError::Invalid(m) => ApiError::InvalidArgument(m),
            RepoError::Internal(m) => {
                error!(error = %m, "repository failure");
                ApiError::Internal
            }
        }
    }
}

impl From<ImageHostError> for ApiError {
    fn from(e: ImageHostError) -> Self {
        match e {
            ImageHostError::NotConfigured => {
                error!("image upload attempted without an image host");
                ApiError::Internal
            }
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<GoogleAuthError> for ApiError {
    fn from(e: GoogleAuthError) -> Self {
        match e {
            GoogleAuthError::Rejected(m) => ApiError::Unauthenticated(m),
            GoogleAuthError::NotConfigured => {
                error!("google sign-in attempted without GOOGLE_CLIENT_ID");
                ApiError::Internal
            }
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<MailError> for ApiError {
    fn from(e: MailError) -> Self {
        error!(error = %e, "mail delivery failed");
        ApiError::Upstream("could not deliver email".into())
    }
}

impl From<CryptoError> for ApiError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::WrongKey | CryptoError::Malformed => ApiError::InvalidArgument(e.to_string()),
            CryptoError::Internal => {
                error!("cipher failure");
                ApiError::Internal
            }
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        ApiError::InvalidArgument(e.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        error!(error = %e, "token signing failed");
        ApiError::Internal
    }
}

impl From<actix_web::error::BlockingError> for ApiError {
    fn from(_: actix_web::error::BlockingError) -> Self {
        error!("blocking pool task was cancelled");
        ApiError::Internal
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiErrorBody { message: self.to_string() })
    }
}

/// Extractor error handlers so malformed JSON, paths and queries get the
/// same `{message}` body as every other failure.
pub fn json_error(err: actix_web::error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::InvalidArgument(err.to_string()).into()
}

pub fn path_error(err: actix_web::error::PathError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::InvalidArgument(err.to_string()).into()
}

pub fn query_error(err: actix_web::error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::InvalidArgument(err.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_errors_map_to_statuses() {
        assert_eq!(ApiError::from(RepoError::NotFound).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(RepoError::Conflict).status_code(), StatusCode::CONFLICT);
        assert_eq!(ApiError::from(RepoError::Invalid("x".into())).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(RepoError::Internal("boom".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let e = ApiError::from(RepoError::Internal("password=hunter2".into()));
        assert_eq!(e.to_string(), "internal error");
    }
}
