//! Multipart form spooling.
//!
//! File parts are streamed to the media library's scratch directory before
//! any validation runs, mirroring how the upstream media host expects a
//! local file path. The resulting [`ScratchFile`]s unlink themselves on
//! drop, so early validation failures leave nothing behind.

use crate::errors::ApiError;
use crate::services::media_library::{MediaLibrary, ScratchFile};
use axum::extract::Multipart;
use std::collections::HashMap;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Text fields and spooled file parts of one multipart request.
pub struct FormData {
    pub fields: HashMap<String, String>,
    pub files: Vec<ScratchFile>,
}

impl FormData {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn file(&self, name: &str) -> Option<&ScratchFile> {
        self.files.iter().find(|f| f.field == name)
    }
}

/// Drain a multipart body, spooling every file part to scratch.
pub async fn collect(multipart: &mut Multipart, media: &MediaLibrary) -> Result<FormData, ApiError> {
    let mut fields = HashMap::new();
    let mut files = Vec::new();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(format!("Malformed multipart body: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let path = media
                    .scratch_dir()
                    .join(format!("spool-{}", Uuid::new_v4().simple()));
                // Construct the guard first so a failed write still cleans up.
                let scratch = ScratchFile {
                    field: name,
                    file_name,
                    path,
                };
                let mut out = File::create(&scratch.path).await.map_err(spool_error)?;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|err| ApiError::bad_request(format!("Malformed multipart body: {err}")))?
                {
                    out.write_all(&chunk).await.map_err(spool_error)?;
                }
                out.flush().await.map_err(spool_error)?;
                files.push(scratch);
            }
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| ApiError::bad_request(format!("Malformed multipart body: {err}")))?;
                fields.insert(name, value);
            }
        }
    }

    Ok(FormData { fields, files })
}

fn spool_error(err: std::io::Error) -> ApiError {
    tracing::error!("failed to spool upload: {err}");
    ApiError::internal("Failed to accept upload")
}
