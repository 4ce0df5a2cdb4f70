//! Disk-backed media library.
//!
//! Stands in for the external media host: uploads stream into a sharded
//! directory tree beneath `base_path/{shard}/{shard}/{name}` and come back
//! as a durable URL plus an opaque deletion handle. Deletion is best-effort;
//! failures are logged and never escalated to the caller.

use bytes::Bytes;
use futures::StreamExt;
use md5::Context;
use std::io::{self, ErrorKind};
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("invalid media handle")]
    InvalidHandle,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type MediaResult<T> = Result<T, MediaError>;

/// What an upload hands back: the durable URL stored on entities, the
/// handle used to delete the object later, and bookkeeping about the bytes.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    pub url: String,
    pub deletion_handle: String,
    pub size_bytes: i64,
    pub etag: String,
    /// Playback length in seconds, when the host can report it. The local
    /// library does not probe container formats and always returns `None`.
    pub duration_seconds: Option<i64>,
}

/// A multipart upload spooled to the scratch directory. Removes itself from
/// disk when dropped, so abandoned uploads never accumulate.
#[derive(Debug)]
pub struct ScratchFile {
    pub field: String,
    pub file_name: String,
    pub path: PathBuf,
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// The media collaborator: upload, delete-by-handle, and read-back for the
/// serving route.
#[derive(Clone)]
pub struct MediaLibrary {
    base_path: PathBuf,
    public_base_url: String,
}

impl MediaLibrary {
    pub fn new(base_path: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        let public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        Self {
            base_path: base_path.into(),
            public_base_url,
        }
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    /// Directory where multipart uploads are spooled before ingestion.
    pub fn scratch_dir(&self) -> PathBuf {
        self.base_path.join(".scratch")
    }

    /// Create the on-disk layout. Called once at startup.
    pub async fn ensure_layout(&self) -> MediaResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        fs::create_dir_all(self.scratch_dir()).await?;
        Ok(())
    }

    /// Ingest a spooled upload.
    ///
    /// Streams the scratch file into a temporary path while computing size
    /// and MD5 etag, fsyncs, then renames into the final sharded location.
    /// The scratch file itself is cleaned up by its `Drop`.
    pub async fn upload(&self, file: &ScratchFile) -> MediaResult<MediaAsset> {
        let id = Uuid::new_v4().simple().to_string();
        let rel = format!(
            "{}/{}/{}{}",
            &id[..2],
            &id[2..4],
            id,
            extension_of(&file.file_name)
        );
        let dest = self.base_path.join(&rel);
        let parent = dest
            .parent()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| MediaError::Io(io::Error::other("media path missing parent")))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{id}"));

        let source = File::open(&file.path).await?;
        let mut stream = ReaderStream::new(source);
        let mut out = File::create(&tmp_path).await?;
        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        while let Some(chunk_res) = stream.next().await {
            let chunk: Bytes = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(MediaError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = out.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(MediaError::Io(err));
            }
        }
        if let Err(err) = out.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(MediaError::Io(err));
        }
        if let Err(err) = out.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(MediaError::Io(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &dest).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(MediaError::Io(err));
        }

        let etag = format!("{:x}", digest.compute());
        debug!(
            "ingested {} ({} bytes, etag {}) as {}",
            file.file_name, size_bytes, etag, rel
        );

        Ok(MediaAsset {
            url: format!("{}/media/{}", self.public_base_url, rel),
            deletion_handle: rel,
            size_bytes,
            etag,
            duration_seconds: None,
        })
    }

    /// Best-effort delete by handle. Failures are logged, never returned.
    pub async fn delete(&self, handle: &str) {
        let path = match self.resolve(handle) {
            Ok(path) => path,
            Err(_) => {
                warn!("refusing to delete malformed media handle `{handle}`");
                return;
            }
        };
        match fs::remove_file(&path).await {
            Ok(()) => debug!("deleted media object {handle}"),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("media object {handle} already missing");
            }
            Err(err) => warn!("failed to delete media object {handle}: {err}"),
        }
    }

    /// Open a stored object for streaming out. `Ok(None)` when absent.
    pub async fn open(&self, handle: &str) -> MediaResult<Option<(File, u64)>> {
        let path = self.resolve(handle)?;
        match File::open(&path).await {
            Ok(file) => {
                let len = file.metadata().await?.len();
                Ok(Some((file, len)))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(MediaError::Io(err)),
        }
    }

    /// Validate a handle and map it to its on-disk path. Rejects anything
    /// that could escape the library root.
    fn resolve(&self, handle: &str) -> MediaResult<PathBuf> {
        if handle.is_empty() || handle.starts_with('/') || handle.contains("..") {
            return Err(MediaError::InvalidHandle);
        }
        if handle
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(MediaError::InvalidHandle);
        }
        Ok(self.base_path.join(handle))
    }
}

/// Lowercased extension of an uploaded filename, dot included, or empty.
fn extension_of(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=8).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => String::new(),
    }
}
