//! HTTP handlers for video upload, replacement, streaming and deletion.
//! Bodies are streamed in both directions; all file handling is delegated to
//! `VideoFileService`.

use crate::{
    errors::AppError,
    models::video::{StoredVideoFile, UploadCandidate},
    services::video_file_service::{VideoFileService, VideoStream},
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use std::io;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// Query params accepted by upload and replace.
#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Client-side file name; only its extension is used.
    pub filename: Option<String>,
}

/// Turn a raw request body plus its headers into an upload candidate.
///
/// `Content-Length` is the declared size and `Content-Type` the declared
/// type; both are re-checked by the service.
fn upload_candidate(headers: &HeaderMap, query: UploadQuery, body: Body) -> UploadCandidate {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let declared_len = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    let stream = body.into_data_stream().map(|chunk| chunk.map_err(io::Error::other));

    UploadCandidate::new(stream, declared_len, content_type, query.filename)
}

/// `POST /videos?filename=clip.mp4`: store a new video.
pub async fn upload_video(
    State(service): State<VideoFileService>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<(StatusCode, Json<StoredVideoFile>), AppError> {
    let file_name = service
        .save(upload_candidate(&headers, query, body))
        .await?;
    let stored = service.stat(&file_name).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// `PUT /videos/{file_name}`: store a new video, then drop the old one.
pub async fn replace_video(
    State(service): State<VideoFileService>,
    Path(file_name): Path<String>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<StoredVideoFile>, AppError> {
    let new_file_name = service
        .replace(&file_name, upload_candidate(&headers, query, body))
        .await?;
    let stored = service.stat(&new_file_name).await?;
    Ok(Json(stored))
}

/// Pipe `stream` into a response body through an in-memory duplex bounded by
/// the chunk size.
///
/// If the client goes away the body (and with it the reader) is dropped, the
/// writer's next write fails with `BrokenPipe`, the task ends and the file
/// handle is released.
fn spawn_body_writer(
    stream: VideoStream,
    chunk_size: usize,
) -> (Body, JoinHandle<io::Result<u64>>) {
    let (mut writer, reader) = tokio::io::duplex(chunk_size);
    let file_name = stream.file.file_name.clone();
    let task = tokio::spawn(async move {
        let result = stream.write_body(&mut writer).await;
        match &result {
            Ok(written) => debug!("streamed {} bytes of {}", written, file_name),
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                debug!("client stopped reading {}", file_name);
            }
            Err(err) => warn!("streaming {} failed: {}", file_name, err),
        }
        result
    });

    let body = Body::from_stream(ReaderStream::with_capacity(reader, chunk_size));
    (body, task)
}

/// `GET /videos/{file_name}`: stream a video, honoring a single `Range`.
pub async fn stream_video(
    State(service): State<VideoFileService>,
    Path(file_name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let stream = service.prepare_stream(&file_name, range).await?;

    let status = stream.status();
    let response_headers = stream.headers();
    let chunk_size = service.settings().chunk_size.max(1);

    let (body, _writer) = spawn_body_writer(stream, chunk_size);
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

/// `HEAD /videos/{file_name}`: same status and headers as GET, no body.
pub async fn head_video(
    State(service): State<VideoFileService>,
    Path(file_name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let stream = service.prepare_stream(&file_name, range).await?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = stream.status();
    *response.headers_mut() = stream.headers();
    Ok(response)
}

/// `DELETE /videos/{file_name}`: idempotent removal.
pub async fn delete_video(
    State(service): State<VideoFileService>,
    Path(file_name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    service.delete(&file_name).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::spawn_body_writer;
    use crate::{
        models::video::UploadCandidate,
        routes::routes::routes,
        services::video_file_service::{StoreSettings, VideoFileService},
    };
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header},
        response::Response,
    };
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::{io, time::Duration};
    use tempfile::{TempDir, tempdir};
    use tower::ServiceExt;

    fn app_with(settings: StoreSettings) -> (TempDir, Router) {
        let dir = tempdir().unwrap();
        let service = VideoFileService::new(dir.path().join("videos"), settings);
        (dir, routes().with_state(service))
    }

    fn app() -> (TempDir, Router) {
        app_with(StoreSettings::default())
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    async fn body_bytes(res: Response) -> Vec<u8> {
        res.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    async fn upload(app: &Router, uri: &str, method: &str, data: Vec<u8>) -> Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "video/mp4")
                    .header(header::CONTENT_LENGTH, data.len())
                    .body(Body::from(data))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn upload_name(app: &Router, data: Vec<u8>) -> String {
        let res = upload(app, "/videos?filename=clip.mp4", "POST", data).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = serde_json::from_slice(&body_bytes(res).await).unwrap();
        body["file_name"].as_str().unwrap().to_string()
    }

    async fn get(app: &Router, uri: &str, range: Option<&str>) -> Response {
        let mut req = Request::builder().method("GET").uri(uri);
        if let Some(range) = range {
            req = req.header(header::RANGE, range);
        }
        app.clone()
            .oneshot(req.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn upload_then_stream_full_file() {
        let (_dir, app) = app();
        let data = payload(150_000);

        let res = upload(&app, "/videos?filename=clip.mp4", "POST", data.clone()).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = serde_json::from_slice(&body_bytes(res).await).unwrap();
        assert_eq!(body["size_bytes"], 150_000);
        assert_eq!(body["mime_type"], "video/mp4");
        let name = body["file_name"].as_str().unwrap();

        let res = get(&app, &format!("/videos/{}", name), None).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_LENGTH], "150000");
        assert_eq!(res.headers()[header::CONTENT_TYPE], "video/mp4");
        assert_eq!(res.headers()[header::ACCEPT_RANGES], "bytes");
        assert_eq!(body_bytes(res).await, data);
    }

    #[tokio::test]
    async fn range_request_returns_partial_content() {
        let (_dir, app) = app();
        let data = payload(1000);
        let name = upload_name(&app, data.clone()).await;

        let res = get(&app, &format!("/videos/{}", name), Some("bytes=100-199")).await;
        assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(res.headers()[header::CONTENT_RANGE], "bytes 100-199/1000");
        assert_eq!(res.headers()[header::CONTENT_LENGTH], "100");
        assert_eq!(body_bytes(res).await, &data[100..200]);
    }

    #[tokio::test]
    async fn out_of_bounds_range_is_416() {
        let (_dir, app) = app();
        let name = upload_name(&app, payload(1000)).await;

        for range in ["bytes=1000-1005", "bytes=990-1999"] {
            let res = get(&app, &format!("/videos/{}", name), Some(range)).await;
            assert_eq!(res.status(), StatusCode::RANGE_NOT_SATISFIABLE);
            assert_eq!(res.headers()[header::CONTENT_RANGE], "bytes */1000");
            assert_eq!(res.headers()[header::CONTENT_TYPE], "video/mp4");
            assert!(body_bytes(res).await.is_empty());
        }
    }

    #[tokio::test]
    async fn missing_video_is_404() {
        let (_dir, app) = app();
        let res = get(&app, "/videos/missing.mp4", None).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = get(&app, "/videos/..%2Fsecret.mp4", None).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn head_reports_headers_without_body() {
        let (_dir, app) = app();
        let name = upload_name(&app, payload(1000)).await;

        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("HEAD")
                    .uri(format!("/videos/{}", name))
                    .header(header::RANGE, "bytes=0-9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(res.headers()[header::CONTENT_LENGTH], "10");
        assert!(body_bytes(res).await.is_empty());
    }

    #[tokio::test]
    async fn upload_validation_maps_to_client_errors() {
        let (_dir, app) = app_with(StoreSettings {
            max_upload_bytes: 100,
            ..StoreSettings::default()
        });

        let res = upload(&app, "/videos?filename=big.mp4", "POST", payload(101)).await;
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/videos?filename=pic.png")
                    .header(header::CONTENT_TYPE, "image/png")
                    .header(header::CONTENT_LENGTH, 10)
                    .body(Body::from(payload(10)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/videos")
                    .header(header::CONTENT_TYPE, "video/mp4")
                    .body(Body::from(payload(10)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn dropped_body_stops_the_writer() {
        let dir = tempdir().unwrap();
        let service = VideoFileService::new(
            dir.path(),
            StoreSettings {
                chunk_size: 16,
                ..StoreSettings::default()
            },
        );
        let name = service
            .save(UploadCandidate::from_bytes(payload(64 * 1024), "video/mp4", "a.mp4"))
            .await
            .unwrap();

        let stream = service.prepare_stream(&name, None).await.unwrap();
        let (mut body, writer) = spawn_body_writer(stream, 16);
        let first = body.frame().await.unwrap().unwrap();
        assert!(!first.into_data().unwrap().is_empty());
        drop(body);

        let result = tokio::time::timeout(Duration::from_secs(5), writer)
            .await
            .expect("writer kept running after the body was dropped")
            .unwrap();
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn replace_and_delete() {
        let (_dir, app) = app_with(StoreSettings {
            max_upload_bytes: 100,
            ..StoreSettings::default()
        });
        let old = upload_name(&app, payload(50)).await;

        // An oversized replacement leaves the original in place.
        let res = upload(&app, &format!("/videos/{}", old), "PUT", payload(101)).await;
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(get(&app, &format!("/videos/{}", old), None).await.status(), StatusCode::OK);

        let uri = format!("/videos/{}?filename=new.mp4", old);
        let res = upload(&app, &uri, "PUT", payload(60)).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(&body_bytes(res).await).unwrap();
        let new = body["file_name"].as_str().unwrap().to_string();
        assert_ne!(new, old);
        assert_eq!(
            get(&app, &format!("/videos/{}", old), None).await.status(),
            StatusCode::NOT_FOUND
        );

        for _ in 0..2 {
            let res = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("DELETE")
                        .uri(format!("/videos/{}", new))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::NO_CONTENT);
        }
        assert_eq!(
            get(&app, &format!("/videos/{}", new), None).await.status(),
            StatusCode::NOT_FOUND
        );
    }
}
