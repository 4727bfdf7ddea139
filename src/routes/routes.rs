//! Defines routes for video file operations.
//!
//! ## Structure
//! - **Collection endpoint**
//!   - `POST   /videos?filename=`: upload a video (raw body)
//!
//! - **File endpoints**
//!   - `GET    /videos/{file_name}`: stream, honoring a single `Range`
//!   - `HEAD   /videos/{file_name}`: headers only
//!   - `PUT    /videos/{file_name}`: replace with a new upload
//!   - `DELETE /videos/{file_name}`: delete (idempotent)

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        video_handlers::{delete_video, head_video, replace_video, stream_video, upload_video},
    },
    services::video_file_service::VideoFileService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build and return the router for all video routes.
///
/// The router carries shared state (`VideoFileService`) to all handlers.
/// Upload size is enforced by the service, so axum's body limit is lifted.
pub fn routes() -> Router<VideoFileService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/videos", post(upload_video))
        .route(
            "/videos/{file_name}",
            get(stream_video)
                .head(head_video)
                .put(replace_video)
                .delete(delete_video),
        )
        .layer(DefaultBodyLimit::disable())
}
