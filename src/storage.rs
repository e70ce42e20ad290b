use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncRead;

/// Result type for storage put operations.
#[derive(Debug, Clone)]
pub enum StorageResult {
    /// Blob with the given hash already exists.
    AlreadyExists(Vec<u8>),
    /// A new blob was successfully stored.
    NewFile { id: Vec<u8>, size: u64 },
}

impl StorageResult {
    pub fn id(&self) -> &[u8] {
        match self {
            StorageResult::AlreadyExists(id) => id,
            StorageResult::NewFile { id, .. } => id,
        }
    }
}

/// Metadata associated with a stored blob.
#[derive(Debug, Clone)]
pub struct BlobMetadata {
    pub size: u64,
}

/// A validated byte range for HTTP Range requests, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpRange {
    pub start: u64,
    pub end: u64,
}

impl HttpRange {
    pub fn size(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }
}

/// Kind of media a post may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            Some(MediaKind::Image)
        } else if mime.starts_with("video/") {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

/// Public name of a stored file: `<sha256 hex>[.<ext>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaName {
    pub id: Vec<u8>,
    pub extension: Option<String>,
}

impl MediaName {
    pub fn new(id: &[u8], mime_type: &str) -> Self {
        Self {
            id: id.to_vec(),
            extension: mime2ext::mime2ext(mime_type).map(|e| e.to_string()),
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let (hash_part, extension) = match name.split_once('.') {
            Some((h, e)) => (h, Some(e)),
            None => (name, None),
        };
        if hash_part.len() != 64 {
            return None;
        }
        let id = hex::decode(hash_part).ok()?;
        let extension = match extension {
            Some(e) if !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()) => {
                Some(e.to_ascii_lowercase())
            }
            Some(_) => return None,
            None => None,
        };
        Some(Self { id, extension })
    }
}

impl fmt::Display for MediaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.id))?;
        if let Some(ext) = &self.extension {
            write!(f, ".{}", ext)?;
        }
        Ok(())
    }
}

/// Defines the interface for a storage backend capable of storing and retrieving blobs by hash.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Stores the file at `source` under its sha256 hash.
    ///
    /// The source file is left in place; callers own its cleanup. If a blob
    /// with the same hash already exists it is not written again.
    async fn put(&self, source: &Path) -> Result<StorageResult>;

    /// Retrieves metadata for a blob identified by its hash.
    async fn head(&self, id: &[u8]) -> Result<BlobMetadata>;

    /// Reader over the blob content, optionally limited to `range`.
    async fn stream_reader(
        &self,
        id: &[u8],
        range: Option<HttpRange>,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>>;

    /// Deletes a blob. Deleting a missing blob is not an error.
    async fn delete(&self, id: &[u8]) -> Result<()>;

    /// Fresh location where an upload can be staged before [`put`](Self::put).
    fn temp_path(&self) -> PathBuf;
}
