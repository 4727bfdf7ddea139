use crate::services::video_file_service::{
    DEFAULT_ALLOWED_TYPES, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_UPLOAD_BYTES, StoreSettings,
};
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub max_upload_bytes: u64,
    pub allowed_types: Vec<String>,
    pub chunk_size: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Video file storage and range streaming API")]
pub struct Args {
    /// Host to bind to (overrides VIDEO_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides VIDEO_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where videos are stored (overrides VIDEO_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Largest accepted upload in bytes (overrides VIDEO_STORE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<u64>,

    /// Comma-separated MIME types accepted for upload (overrides VIDEO_STORE_ALLOWED_TYPES)
    #[arg(long)]
    pub allowed_types: Option<String>,

    /// Bytes read and flushed per streamed chunk (overrides VIDEO_STORE_CHUNK_SIZE)
    #[arg(long)]
    pub chunk_size: Option<usize>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_parts(Args::parse(), |key| env::var(key))
    }

    /// Merge parsed CLI args over values read through `lookup`.
    fn from_parts<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        // --- Environment fallback ---
        let env_host = lookup("VIDEO_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_var(&lookup, "VIDEO_STORE_PORT", 3000u16)?;
        let env_storage =
            lookup("VIDEO_STORE_STORAGE_DIR").unwrap_or_else(|_| "./data/videos".into());
        let env_max_upload =
            parse_var(&lookup, "VIDEO_STORE_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;
        let env_allowed = lookup("VIDEO_STORE_ALLOWED_TYPES").ok();
        let env_chunk = parse_var(&lookup, "VIDEO_STORE_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;

        // --- Merge ---
        let allowed_types = match args.allowed_types.or(env_allowed) {
            Some(list) => split_types(&list),
            None => DEFAULT_ALLOWED_TYPES.iter().map(|t| t.to_string()).collect(),
        };
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
            allowed_types,
            chunk_size: args.chunk_size.unwrap_or(env_chunk),
        };

        if cfg.max_upload_bytes == 0 {
            bail!("max upload size must be greater than zero");
        }
        if cfg.chunk_size == 0 {
            bail!("stream chunk size must be greater than zero");
        }
        if cfg.allowed_types.is_empty() {
            bail!("at least one allowed MIME type is required");
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            max_upload_bytes: self.max_upload_bytes,
            allowed_types: self.allowed_types.clone(),
            chunk_size: self.chunk_size,
        }
    }
}

/// Read and parse an optional numeric variable, falling back to `default`.
fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Result<String, env::VarError>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

fn split_types(list: &str) -> Vec<String> {
    list.split(',')
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}
