use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::formats;

pub const MAX_UPLOAD_SIZE: u64 = 500 * 1024 * 1024;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub file_name: String,
    pub original_name: String,
    pub size: u64,
    pub content_type: String,
}

/// Validates inbound files and stores them under random names in one directory.
#[derive(Debug, Clone)]
pub struct UploadGate {
    dir: PathBuf,
    size_limit: u64,
}

impl UploadGate {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        UploadGate {
            dir: dir.into(),
            size_limit: MAX_UPLOAD_SIZE,
        }
    }

    pub fn with_size_limit(mut self, size_limit: u64) -> Self {
        self.size_limit = size_limit;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn size_limit(&self) -> u64 {
        self.size_limit
    }

    /// Checks the declared metadata, then copies `stream` into the upload
    /// directory.
    ///
    /// The data is written to a temporary file next to the destination and
    /// only renamed into place once fully written and synced, so a failed
    /// upload never shows up under a stored name.
    pub async fn accept<R>(
        &self,
        mut stream: R,
        declared_name: &str,
        declared_size: u64,
        declared_content_type: Option<&str>,
    ) -> Result<StoredUpload>
    where
        R: AsyncRead + Unpin,
    {
        info!(name = declared_name, size = declared_size, "upload started");

        if declared_size == 0 {
            warn!(name = declared_name, "rejected empty upload");
            return Err(Error::EmptyFile);
        }
        if declared_size > self.size_limit {
            warn!(name = declared_name, size = declared_size, "rejected oversized upload");
            return Err(Error::TooLarge {
                size: declared_size,
                limit: self.size_limit,
            });
        }
        let extension = Path::new(declared_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        if !formats::is_allowed_upload_extension(extension) {
            warn!(name = declared_name, "rejected upload extension");
            return Err(Error::InvalidExtension {
                extension: extension.to_string(),
            });
        }

        fs::create_dir_all(&self.dir).await.map_err(storage_failure)?;
        let temp = tempfile::Builder::new()
            .prefix(".upload-")
            .suffix(".part")
            .tempfile_in(&self.dir)
            .map_err(storage_failure)?;
        let mut file = fs::File::from_std(temp.reopen().map_err(storage_failure)?);

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;
        let mut sniffed = None;
        loop {
            let n = stream.read(&mut buf).await.map_err(storage_failure)?;
            if n == 0 {
                break;
            }
            if written == 0 {
                sniffed = infer::get(&buf[..n]).map(|kind| kind.mime_type());
            }
            written += n as u64;
            if written > self.size_limit {
                warn!(name = declared_name, "upload stream exceeds the size limit");
                return Err(Error::TooLarge {
                    size: written,
                    limit: self.size_limit,
                });
            }
            file.write_all(&buf[..n]).await.map_err(storage_failure)?;
        }
        if written == 0 {
            warn!(name = declared_name, "upload stream was empty");
            return Err(Error::EmptyFile);
        }
        file.flush().await.map_err(storage_failure)?;
        file.sync_all().await.map_err(storage_failure)?;
        drop(file);

        let file_name = format!("{}.{}", Uuid::new_v4(), extension);
        temp.persist_noclobber(self.dir.join(&file_name))
            .map_err(|err| storage_failure(err.error))?;

        let content_type = match declared_content_type {
            Some(declared) if !declared.is_empty() && declared != DEFAULT_CONTENT_TYPE => {
                declared.to_string()
            }
            _ => sniffed.unwrap_or(DEFAULT_CONTENT_TYPE).to_string(),
        };

        info!(
            name = declared_name,
            stored = %file_name,
            size = written,
            "upload stored"
        );
        Ok(StoredUpload {
            file_name,
            original_name: declared_name.to_string(),
            size: written,
            content_type,
        })
    }

    /// Maps a stored file name back to its path. Anything that is not a bare
    /// file name, and hidden names such as in-progress uploads, are treated
    /// as missing.
    pub fn resolve(&self, file_name: &str) -> Result<PathBuf> {
        let mut components = Path::new(file_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) if !is_hidden(file_name) => {
                Ok(self.dir.join(file_name))
            }
            _ => Err(Error::InputNotFound(PathBuf::from(file_name))),
        }
    }
}

/// Stored names never start with a dot; staging files always do.
pub(crate) fn is_hidden(file_name: &str) -> bool {
    file_name.starts_with('.')
}

fn storage_failure(err: std::io::Error) -> Error {
    error!("could not store upload: {}", err);
    Error::StorageFailure(err)
}
