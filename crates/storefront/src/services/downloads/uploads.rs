//! Admin uploads into the downloads directory.
//!
//! An upload lands at `<folder>/<filename>` under the downloads root and its
//! relative path is the reference a product's `formats` map points at.

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use super::{DownloadService, content_type_for, resolve_reference};

/// Extensions accepted for upload: the formats downloads are served in.
pub const UPLOAD_EXTENSIONS: &[&str] = &["pdf", "docx", "xlsx", "csv", "md", "markdown", "html", "txt"];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid file name: {0}")]
    InvalidFilename(String),

    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("invalid upload path: {0}")]
    InvalidPath(String),

    #[error("file not found")]
    NotFound,

    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

/// A file written into the downloads directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredUpload {
    /// Path relative to the downloads root, for product `formats`.
    pub reference: String,
    pub filename: String,
    pub content_type: &'static str,
    pub size: usize,
}

impl DownloadService {
    /// Write an uploaded file, replacing any file already at that reference.
    ///
    /// # Errors
    ///
    /// `UploadError::InvalidFilename` or `UnsupportedType` for names that
    /// cannot be stored, `InvalidPath` for folders outside the downloads
    /// directory.
    pub async fn store_upload(
        &self,
        folder: Option<&str>,
        filename: &str,
        body: &[u8],
    ) -> Result<StoredUpload, UploadError> {
        let filename = sanitize_filename(filename)?;
        let reference = match folder.map(|f| f.trim().trim_matches('/')).filter(|f| !f.is_empty()) {
            Some(folder) => format!("{folder}/{filename}"),
            None => filename.clone(),
        };

        let path = resolve_reference(&self.inner.root, &reference)
            .map_err(|_| UploadError::InvalidPath(folder.unwrap_or_default().to_owned()))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, body).await?;

        tracing::info!(%reference, size = body.len(), "Stored upload");
        Ok(StoredUpload {
            content_type: content_type_for(&filename),
            reference,
            filename,
            size: body.len(),
        })
    }

    /// Delete a previously uploaded file.
    ///
    /// # Errors
    ///
    /// `UploadError::NotFound` when nothing is stored at `reference`,
    /// `InvalidPath` when it points outside the downloads directory.
    pub async fn delete_upload(&self, reference: &str) -> Result<(), UploadError> {
        let path = resolve_reference(&self.inner.root, reference)
            .map_err(|_| UploadError::InvalidPath(reference.to_owned()))?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(%reference, "Deleted upload");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(UploadError::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}

/// Final path component of a client-supplied name, with anything outside
/// `[A-Za-z0-9._-]` replaced by `_`.
fn sanitize_filename(raw: &str) -> Result<String, UploadError> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        return Err(UploadError::InvalidFilename(raw.to_owned()));
    }

    let extension = Path::new(&cleaned)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !UPLOAD_EXTENSIONS.contains(&extension.as_str()) {
        return Err(UploadError::UnsupportedType(extension));
    }
    Ok(cleaned)
}
