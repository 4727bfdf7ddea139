//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks disk I/O in the video directory

use crate::services::video_file_service::VideoFileService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`
///
/// Very small liveness check; always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Performs a best-effort write/read/delete of a hidden scratch file under the
/// service `base_path`. Hidden names can never be addressed as videos.
///
/// HTTP 200 when the check passes, HTTP 503 otherwise.
pub async fn readyz(State(service): State<VideoFileService>) -> impl IntoResponse {
    let disk_check = check_disk(&service).await;
    let disk_ok = disk_check.is_ok();

    let mut checks = HashMap::new();
    checks.insert(
        "disk",
        CheckStatus {
            ok: disk_ok,
            error: disk_check.err(),
        },
    );

    let body = ReadyResponse {
        status: if disk_ok { "ok".into() } else { "error".into() },
        checks,
    };

    let status = if disk_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

async fn check_disk(service: &VideoFileService) -> Result<(), String> {
    fs::create_dir_all(&service.base_path)
        .await
        .map_err(|e| format!("could not create video directory: {}", e))?;

    let tmp_path = service
        .base_path
        .join(format!(".readyz-{}", Uuid::new_v4()));
    fs::write(&tmp_path, b"readyz")
        .await
        .map_err(|e| format!("could not write tmp file: {}", e))?;

    let read = fs::read(&tmp_path).await;
    // best-effort cleanup
    let removed = fs::remove_file(&tmp_path).await;

    match read {
        Ok(bytes) if bytes == b"readyz" => {}
        Ok(_) => return Err("file content mismatch".to_string()),
        Err(e) => return Err(format!("could not read tmp file: {}", e)),
    }
    removed.map_err(|e| format!("could not remove tmp file: {}", e))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
