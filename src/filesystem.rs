use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncSeekExt};
use uuid::Uuid;

use crate::settings::FileSystemStorageSettings;
use crate::storage::{BlobMetadata, HttpRange, StorageBackend, StorageResult};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, error};
use sha2::{Digest, Sha256};

#[derive(Clone)]
pub struct FileStore {
    pub storage_dir: PathBuf,
    pub temp_dir: PathBuf,
}

impl FileStore {
    pub fn new(settings: &FileSystemStorageSettings) -> Result<Self> {
        let storage_dir = PathBuf::from(&settings.storage_dir);
        let temp_dir = std::env::temp_dir().join("yummly_uploads");
        Self::with_dirs(storage_dir, temp_dir)
    }

    pub fn with_dirs(storage_dir: PathBuf, temp_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&storage_dir)
            .with_context(|| format!("Failed to create storage dir {:?}", storage_dir))?;
        std::fs::create_dir_all(&temp_dir)
            .with_context(|| format!("Failed to create temp dir {:?}", temp_dir))?;
        Ok(Self {
            storage_dir,
            temp_dir,
        })
    }

    // Two-level directory structure based on the first 4 hex chars
    pub fn get_path(&self, id: &[u8]) -> PathBuf {
        let filename = hex::encode(id);
        let dir1 = &filename[0..2];
        let dir2 = &filename[2..4];
        self.storage_dir.join(dir1).join(dir2).join(filename)
    }

    /// Fresh path inside the temp dir for staging an upload.
    pub fn temp_path(&self) -> PathBuf {
        self.temp_dir.join(Uuid::new_v4().to_string())
    }

    pub async fn hash_file(path: &Path) -> Result<Vec<u8>> {
        let mut file = File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buf = [0; 8192];

        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(hasher.finalize().to_vec())
    }
}

#[async_trait]
impl StorageBackend for FileStore {
    async fn put(&self, source: &Path) -> Result<StorageResult> {
        let hash = Self::hash_file(source)
            .await
            .with_context(|| format!("Failed to hash {:?}", source))?;

        let final_path = self.get_path(&hash);
        if final_path.exists() {
            debug!("Media {} already stored", hex::encode(&hash));
            return Ok(StorageResult::AlreadyExists(hash));
        }

        let parent = final_path
            .parent()
            .ok_or_else(|| anyhow!("Could not determine parent directory for {:?}", final_path))?;
        fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create directory structure for {:?}", final_path)
        })?;

        let size = match fs::copy(source, &final_path).await {
            Ok(n) => n,
            Err(e) => {
                error!(
                    "fs::copy from {:?} to {:?} failed with error: {}",
                    source, final_path, e
                );
                return Err(anyhow!(e)).context(format!(
                    "Failed to copy temp file {:?} to final path {:?}",
                    source, final_path
                ));
            }
        };

        Ok(StorageResult::NewFile { id: hash, size })
    }

    async fn head(&self, id: &[u8]) -> Result<BlobMetadata> {
        let path = self.get_path(id);
        let metadata = fs::metadata(&path).await.map_err(|e| anyhow!(e))?;
        if !metadata.is_file() {
            return Err(anyhow!("Not a file"));
        }
        Ok(BlobMetadata {
            size: metadata.len(),
        })
    }

    async fn stream_reader(
        &self,
        id: &[u8],
        range: Option<HttpRange>,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let file_path = self.get_path(id);
        let mut file = File::open(&file_path)
            .await
            .context(format!("File not found for id: {:?}", file_path))?;

        match range {
            Some(range) => {
                file.seek(io::SeekFrom::Start(range.start))
                    .await
                    .context("Failed to seek")?;
                Ok(Box::new(file.take(range.size())))
            }
            None => Ok(Box::new(file)),
        }
    }

    async fn delete(&self, id: &[u8]) -> Result<()> {
        let path = self.get_path(id);
        if path.exists() {
            fs::remove_file(&path)
                .await
                .with_context(|| format!("Failed to delete file: {:?}", path))?;
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        FileStore::temp_path(self)
    }
}

/// Removes the staged file when dropped.
pub struct TempFileCleanup(pub PathBuf);

impl Drop for TempFileCleanup {
    fn drop(&mut self) {
        let path = &self.0;
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                error!("Failed to clean up temporary file {:?}: {}", path, e);
            }
        }
    }
}
