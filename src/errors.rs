use crate::services::{
    range::ByteRange,
    video_file_service::{ValidationError, VideoFileError},
};
use axum::{
    Json,
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    /// Set for `416` responses: the file size for `Content-Range: bytes */{size}`
    /// and the video's MIME type.
    pub unsatisfied: Option<(u64, String)>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            unsatisfied: None,
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 416 Range Not Satisfiable against a file of `size` bytes.
    pub fn range_not_satisfiable(size: u64, mime_type: impl Into<String>) -> Self {
        Self {
            unsatisfied: Some((size, mime_type.into())),
            ..Self::new(
                StatusCode::RANGE_NOT_SATISFIABLE,
                "requested range not satisfiable",
            )
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // 416 carries the stream headers plus Content-Range, never a body.
        if let Some((size, mime_type)) = self.unsatisfied {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = self.status;
            let headers = response.headers_mut();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_str(&mime_type)
                    .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
            );
            headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
            if let Ok(value) = HeaderValue::from_str(&ByteRange::unsatisfied_content_range(size)) {
                headers.insert(header::CONTENT_RANGE, value);
            }
            return response;
        }

        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<VideoFileError> for AppError {
    fn from(err: VideoFileError) -> Self {
        match err {
            VideoFileError::Validation(reason) => {
                let status = match reason {
                    ValidationError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    ValidationError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    ValidationError::EmptyUpload | ValidationError::LengthMismatch { .. } => {
                        StatusCode::BAD_REQUEST
                    }
                };
                AppError::new(status, reason.to_string())
            }
            VideoFileError::NotFound(name) => {
                AppError::not_found(format!("video `{}` not found", name))
            }
            VideoFileError::RangeNotSatisfiable { size, mime_type } => {
                AppError::range_not_satisfiable(size, mime_type)
            }
            VideoFileError::Storage(err) => {
                tracing::error!("video storage failure: {}", err);
                AppError::internal("video storage failure")
            }
        }
    }
}
