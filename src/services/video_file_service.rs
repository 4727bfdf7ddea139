//! src/services/video_file_service.rs
//!
//! VideoFileService owns the managed video directory. Uploads are validated
//! and copied under a random `{uuid}.{ext}` name, stored files are streamed
//! back with single-range support, and replaced or deleted on request.
//! Callers only ever see opaque file names; every name they hand back is
//! reduced to its final path component before touching the filesystem.

use crate::{
    models::video::{StoredVideoFile, UploadCandidate, UploadStream},
    services::range::ByteRange,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use futures::StreamExt;
use std::{
    fs::Metadata,
    io::{self, ErrorKind, SeekFrom},
    path::{Component, Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
pub const DEFAULT_ALLOWED_TYPES: [&str; 3] = ["video/mp4", "video/webm", "video/quicktime"];

/// Reasons an upload is refused before (or while) it is copied.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("upload is empty")]
    EmptyUpload,
    #[error("upload of {declared} bytes exceeds the {max} byte limit")]
    TooLarge { declared: u64, max: u64 },
    #[error("content type `{0}` is not allowed")]
    UnsupportedType(String),
    #[error("upload declared {declared} bytes but sent {received}")]
    LengthMismatch { declared: u64, received: u64 },
}

#[derive(Debug, Error)]
pub enum VideoFileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("video `{0}` not found")]
    NotFound(String),
    #[error("requested range not satisfiable for {size} byte video")]
    RangeNotSatisfiable { size: u64, mime_type: String },
    #[error(transparent)]
    Storage(#[from] io::Error),
}

pub type VideoResult<T> = Result<T, VideoFileError>;

/// Upload limits and streaming parameters.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub max_upload_bytes: u64,
    pub allowed_types: Vec<String>,
    pub chunk_size: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_types: DEFAULT_ALLOWED_TYPES.iter().map(|t| t.to_string()).collect(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// VideoFileService provides the file side of video records:
/// - Save an upload (validate, copy to a temp file, rename into place)
/// - Prepare a stream for a stored file, honoring a single `Range`
/// - Delete a stored file (idempotent)
/// - Replace a stored file (save the new one, then delete the old one)
///
/// The service holds no mutable state; clones share the same settings and
/// can be used concurrently from any number of requests.
#[derive(Clone, Debug)]
pub struct VideoFileService {
    /// Managed root directory; all payloads live directly beneath it.
    pub base_path: PathBuf,

    settings: Arc<StoreSettings>,
}

impl VideoFileService {
    pub fn new(base_path: impl Into<PathBuf>, settings: StoreSettings) -> Self {
        Self {
            base_path: base_path.into(),
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Map a caller-supplied name to a path directly under `base_path`.
    ///
    /// Any directory part (either separator) is dropped, and names that
    /// are empty, hidden or not a single normal component are refused.
    /// Hidden names include the `.tmp-*` files of uploads in flight.
    fn resolve_path(&self, file_name: &str) -> Option<PathBuf> {
        let name = file_name.rsplit(['/', '\\']).next()?;
        if name.is_empty() || name.starts_with('.') || name.contains('\0') {
            return None;
        }
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Some(self.base_path.join(name)),
            _ => None,
        }
    }

    fn is_allowed_type(&self, content_type: &str) -> bool {
        self.settings
            .allowed_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(content_type))
    }

    /// True if files with this extension are served as an allowed type.
    fn is_allowed_extension(&self, extension: &str) -> bool {
        mime_guess::from_ext(extension)
            .first()
            .is_some_and(|mime| self.is_allowed_type(mime.essence_str()))
    }

    /// Check an upload's declared metadata and pick the stored extension.
    ///
    /// Runs before any I/O. Returns the declared length and the extension.
    fn validate(&self, candidate: &UploadCandidate) -> Result<(u64, String), ValidationError> {
        let declared = match candidate.declared_len {
            None | Some(0) => return Err(ValidationError::EmptyUpload),
            Some(len) => len,
        };
        if declared > self.settings.max_upload_bytes {
            return Err(ValidationError::TooLarge {
                declared,
                max: self.settings.max_upload_bytes,
            });
        }

        let content_type = candidate
            .content_type
            .as_deref()
            .map(mime_essence)
            .unwrap_or_default();
        if content_type.is_empty() || !self.is_allowed_type(&content_type) {
            return Err(ValidationError::UnsupportedType(content_type));
        }

        let extension =
            self.stored_extension(candidate.original_file_name.as_deref(), &content_type)?;
        Ok((declared, extension))
    }

    /// Keep the original extension when it maps to an allowed type, else
    /// use an extension registered for the declared type.
    fn stored_extension(
        &self,
        original_file_name: Option<&str>,
        content_type: &str,
    ) -> Result<String, ValidationError> {
        let original = original_file_name
            .and_then(|name| name.rsplit(['/', '\\']).next())
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|ext| !ext.is_empty() && ext.bytes().all(|b| b.is_ascii_alphanumeric()))
            .filter(|ext| self.is_allowed_extension(ext));
        if let Some(ext) = original {
            return Ok(ext);
        }

        mime_guess::get_mime_extensions_str(content_type)
            .and_then(|exts| exts.iter().find(|ext| self.is_allowed_extension(ext)))
            .map(|ext| ext.to_string())
            .ok_or_else(|| ValidationError::UnsupportedType(content_type.to_string()))
    }

    /// Validate an upload and copy it under a freshly generated name.
    ///
    /// - Rejects empty, oversized and disallowed uploads before any I/O.
    /// - Streams bytes into a hidden temp file, checking the running total
    ///   against the declared length.
    /// - Flushes, fsyncs and renames into the final name.
    ///
    /// The temp file is owned by a `TempPath` until it is persisted, so it
    /// is removed on every failure path and also when the returned future is
    /// dropped mid-copy (client disconnect, timeout, shutdown).
    pub async fn save(&self, candidate: UploadCandidate) -> VideoResult<String> {
        let (declared, extension) = self.validate(&candidate)?;
        let file_name = format!("{}.{}", Uuid::new_v4(), extension);
        let file_path = self.resolve_path(&file_name).ok_or_else(|| {
            VideoFileError::Storage(io::Error::new(
                ErrorKind::InvalidInput,
                "generated file name is not a plain file name",
            ))
        })?;

        fs::create_dir_all(&self.base_path).await?;
        let (std_file, tmp_path) = tempfile::Builder::new()
            .prefix(".tmp-")
            .tempfile_in(&self.base_path)?
            .into_parts();
        let mut file = File::from_std(std_file);

        copy_upload(&mut file, candidate.bytes, declared).await?;
        drop(file);

        // On failure the returned `TempPath` is dropped, which unlinks it.
        tmp_path
            .persist(&file_path)
            .map_err(|err| VideoFileError::Storage(err.error))?;

        info!("saved video {} ({} bytes)", file_name, declared);
        Ok(file_name)
    }

    /// Save `candidate`, then delete `old_file_name`.
    ///
    /// The old file is only touched once the new one is in place. A failure
    /// to delete the old file is logged and does not fail the replacement,
    /// since the caller must still learn the new name.
    pub async fn replace(
        &self,
        old_file_name: &str,
        candidate: UploadCandidate,
    ) -> VideoResult<String> {
        let new_file_name = self.save(candidate).await?;

        if let Err(err) = self.delete(old_file_name).await {
            warn!(
                "replaced {} with {} but could not delete the old file: {}",
                old_file_name, new_file_name, err
            );
        }

        Ok(new_file_name)
    }

    /// Remove a stored file.
    ///
    /// Idempotent: empty names, unresolvable names and files that are
    /// already gone are all treated as success.
    pub async fn delete(&self, file_name: &str) -> VideoResult<()> {
        if file_name.is_empty() {
            return Ok(());
        }
        let Some(file_path) = self.resolve_path(file_name) else {
            debug!("ignoring delete of unresolvable name {:?}", file_name);
            return Ok(());
        };

        match fs::remove_file(&file_path).await {
            Ok(()) => {
                info!("deleted video {}", file_path.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("video {} already missing", file_path.display());
                Ok(())
            }
            Err(err) => Err(VideoFileError::Storage(err)),
        }
    }

    /// Describe a stored file without opening it for reading.
    pub async fn stat(&self, file_name: &str) -> VideoResult<StoredVideoFile> {
        let (file_path, metadata) = self.existing_file(file_name).await?;
        Ok(stored_file(file_name, &file_path, metadata.len()))
    }

    /// Open a stored file for streaming, honoring an optional raw `Range`
    /// header value.
    ///
    /// Returns `NotFound` when the name does not resolve to a regular file
    /// and `RangeNotSatisfiable` when the range falls outside it.
    pub async fn prepare_stream(
        &self,
        file_name: &str,
        range_header: Option<&str>,
    ) -> VideoResult<VideoStream> {
        let (file_path, checked) = self.existing_file(file_name).await?;
        let mut reader = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                VideoFileError::NotFound(file_name.to_string())
            } else {
                VideoFileError::Storage(err)
            }
        })?;
        let opened = reader.metadata().await?;
        // The entry may have been swapped (e.g. for a symlink) since it was checked.
        if !same_file(&checked, &opened) {
            return Err(VideoFileError::NotFound(file_name.to_string()));
        }
        let file = stored_file(file_name, &file_path, opened.len());
        let size = file.size_bytes;

        let range = match range_header {
            Some(value) => ByteRange::parse(value, size).map_err(|_| {
                VideoFileError::RangeNotSatisfiable {
                    size,
                    mime_type: file.mime_type.clone(),
                }
            })?,
            None => None,
        };
        if let Some(range) = range {
            reader.seek(SeekFrom::Start(range.start)).await?;
            debug!("streaming {} bytes {}", file_name, range);
        }

        Ok(VideoStream {
            file,
            range,
            reader,
            chunk_size: self.settings.chunk_size.max(1),
        })
    }

    /// Resolve a name and confirm it is a regular file (symlinks excluded).
    async fn existing_file(&self, file_name: &str) -> VideoResult<(PathBuf, Metadata)> {
        let not_found = || VideoFileError::NotFound(file_name.to_string());
        let file_path = self.resolve_path(file_name).ok_or_else(not_found)?;
        match fs::symlink_metadata(&file_path).await {
            Ok(meta) if meta.is_file() => Ok((file_path, meta)),
            Ok(_) => Err(not_found()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(not_found()),
            Err(err) => Err(VideoFileError::Storage(err)),
        }
    }
}

/// An opened stored file plus the response metadata for serving it.
#[derive(Debug)]
pub struct VideoStream {
    pub file: StoredVideoFile,
    pub range: Option<ByteRange>,
    reader: File,
    chunk_size: usize,
}

impl VideoStream {
    pub fn status(&self) -> StatusCode {
        if self.range.is_some() {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        }
    }

    /// Number of body bytes `write_body` will produce.
    pub fn content_length(&self) -> u64 {
        self.range.map_or(self.file.size_bytes, |range| range.len())
    }

    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(&self.file.mime_type)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
        );
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(self.content_length()));
        if let Some(range) = self.range {
            if let Ok(value) = HeaderValue::from_str(&range.content_range(self.file.size_bytes)) {
                headers.insert(header::CONTENT_RANGE, value);
            }
        }
        headers
    }

    /// Copy the selected bytes into `sink`, one chunk at a time, flushing
    /// after every chunk so players receive data as soon as it is read.
    ///
    /// Stops at the first I/O error; nothing is retried because the
    /// response headers have already gone out.
    pub async fn write_body<W>(mut self, sink: &mut W) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut remaining = self.content_length();
        let mut buf = vec![0u8; self.chunk_size];
        let mut written = 0u64;

        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let read = self.reader.read(&mut buf[..want]).await?;
            if read == 0 {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!(
                        "video {} ended {} bytes early",
                        self.file.file_name, remaining
                    ),
                ));
            }
            sink.write_all(&buf[..read]).await?;
            sink.flush().await?;
            remaining -= read as u64;
            written += read as u64;
        }

        Ok(written)
    }
}

fn stored_file(file_name: &str, file_path: &Path, size_bytes: u64) -> StoredVideoFile {
    StoredVideoFile {
        file_name: file_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(file_name)
            .to_string(),
        size_bytes,
        mime_type: mime_guess::from_path(file_path)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

/// True if `opened` is the same regular file that `checked` described.
#[cfg(unix)]
fn same_file(checked: &Metadata, opened: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    opened.is_file() && checked.dev() == opened.dev() && checked.ino() == opened.ino()
}

#[cfg(not(unix))]
fn same_file(_checked: &Metadata, opened: &Metadata) -> bool {
    opened.is_file()
}

/// Lower-cased MIME type without parameters (`video/mp4; codecs=...`).
fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Stream upload chunks into `file`, enforcing the declared length.
async fn copy_upload(file: &mut File, mut stream: UploadStream, declared: u64) -> VideoResult<()> {
    let mut received: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        received += chunk.len() as u64;
        if received > declared {
            return Err(ValidationError::LengthMismatch { declared, received }.into());
        }
        file.write_all(&chunk).await?;
    }
    if received != declared {
        return Err(ValidationError::LengthMismatch { declared, received }.into());
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}
