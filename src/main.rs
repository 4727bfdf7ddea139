use anyhow::{Context, Result};
use axum::Router;
use std::io::ErrorKind;
use tokio::{fs, net::TcpListener};
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting video-file-service with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    fs::create_dir_all(&cfg.storage_dir)
        .await
        .with_context(|| format!("creating storage directory {}", cfg.storage_dir))?;
    tracing::info!("Serving videos from {}", cfg.storage_dir);

    // --- Initialize core service ---
    let videos = services::video_file_service::VideoFileService::new(
        cfg.storage_dir.clone(),
        cfg.store_settings(),
    );

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(videos);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
