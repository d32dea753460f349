use crate::{auth::AuthError, db::RepositoryError, ffmpeg::MediaError, models::ErrorResponse, storage::StorageError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Request failure, rendered as `(status, {"error": message})`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    /// Client-facing message plus the underlying cause, which is only logged.
    #[error("{message}: {cause}")]
    Internal { message: String, cause: String },
}

impl ApiError {
    pub fn internal(message: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        ApiError::Internal {
            message: message.into(),
            cause: cause.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Internal { message, cause } => {
                error!("{}: {}", message, cause);
                message
            }
            ApiError::BadRequest(message)
            | ApiError::Unauthorized(message)
            | ApiError::NotFound(message)
            | ApiError::PayloadTooLarge(message) => {
                warn!("{} {}", status.as_u16(), message);
                message
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        debug!("authentication failed: {}", err);
        ApiError::Unauthorized("Couldn't validate JWT".to_string())
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(_) => ApiError::NotFound("Video not found".to_string()),
        }
    }
}

impl From<MediaError> for ApiError {
    fn from(err: MediaError) -> Self {
        let message = match err {
            MediaError::NoStreamData | MediaError::Parse(_) => "cannot get video aspect ratio",
            MediaError::Timeout { .. } => "video processing timed out",
            MediaError::Spawn { .. } | MediaError::Failed { .. } => "unable to process video",
        };
        ApiError::internal(message, err)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::internal("unable to write to object storage", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::BadRequest("only video/mp4 mimetype accepted".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.error, "only video/mp4 mimetype accepted");
    }

    #[tokio::test]
    async fn test_internal_hides_cause() {
        let response = ApiError::internal("unable to copy file", "disk full").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.error, "unable to copy file");
    }

    #[test]
    fn test_media_error_mapping() {
        let err: ApiError = MediaError::NoStreamData.into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().starts_with("cannot get video aspect ratio"));
    }

    #[test]
    fn test_auth_error_mapping() {
        let err: ApiError = AuthError::MissingHeader.into();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_auth_rejection_warns_once() {
        let logs = crate::test_support::CapturedLogs::default();
        let response = logs.capture(|| {
            let err: ApiError = AuthError::MissingHeader.into();
            err.into_response()
        });
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(logs.warn_lines(), 1);
        assert!(logs.contents().contains("Couldn't validate JWT"));
    }
}
