//! Represents video payloads stored under the managed root and the uploads
//! that produce them.

use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use std::{fmt, io, pin::Pin};

/// A video file that currently exists under the managed root.
///
/// Only the file name is ever handed out to callers; the on-disk location is
/// private to `VideoFileService`.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredVideoFile {
    /// Generated name (`{uuid}.{ext}`), unique within the managed root.
    pub file_name: String,

    /// Size in bytes, read from filesystem metadata.
    pub size_bytes: u64,

    /// MIME type derived from the file extension at read time.
    pub mime_type: String,
}

/// Boxed byte stream carried by an upload.
pub type UploadStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// An inbound upload waiting to be validated and copied into the store.
///
/// The declared length and content type come from the client and are not
/// trusted; the byte count is checked again while copying.
pub struct UploadCandidate {
    pub bytes: UploadStream,
    pub declared_len: Option<u64>,
    pub content_type: Option<String>,
    pub original_file_name: Option<String>,
}

impl UploadCandidate {
    pub fn new<S>(
        bytes: S,
        declared_len: Option<u64>,
        content_type: Option<String>,
        original_file_name: Option<String>,
    ) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            bytes: Box::pin(bytes),
            declared_len,
            content_type,
            original_file_name,
        }
    }

    /// Build a candidate from an in-memory buffer whose declared length
    /// matches its contents.
    #[cfg(test)]
    pub fn from_bytes(
        data: impl Into<Bytes>,
        content_type: &str,
        original_file_name: &str,
    ) -> Self {
        let data: Bytes = data.into();
        let len = data.len() as u64;
        Self::new(
            futures::stream::iter([Ok(data)]),
            Some(len),
            Some(content_type.to_string()),
            Some(original_file_name.to_string()),
        )
    }
}

impl fmt::Debug for UploadCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadCandidate")
            .field("declared_len", &self.declared_len)
            .field("content_type", &self.content_type)
            .field("original_file_name", &self.original_file_name)
            .finish_non_exhaustive()
    }
}
