//! Admin file uploads for product downloads.

use axum::{body::Bytes, extract::State, http::StatusCode};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiMultipart, ApiPath};
use crate::middleware::RequireAdmin;
use crate::services::downloads::StoredUpload;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadsResponse {
    pub files: Vec<StoredUpload>,
}

/// Files and the optional `folder` field of an upload form.
struct UploadForm {
    folder: Option<String>,
    files: Vec<(String, Bytes)>,
}

async fn read_form(ApiMultipart(mut multipart): ApiMultipart) -> Result<UploadForm> {
    let mut form = UploadForm {
        folder: None,
        files: Vec::new(),
    };

    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("folder") {
            form.folder = Some(field.text().await?);
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_owned) else {
            continue;
        };
        form.files.push((filename, field.bytes().await?));
    }

    if form.files.is_empty() {
        return Err(AppError::BadRequest("No file uploaded".to_string()));
    }
    Ok(form)
}

async fn store_all(state: &AppState, form: UploadForm) -> Result<Vec<StoredUpload>> {
    let mut stored = Vec::with_capacity(form.files.len());
    for (filename, body) in &form.files {
        stored.push(
            state
                .downloads()
                .store_upload(form.folder.as_deref(), filename, body)
                .await?,
        );
    }
    Ok(stored)
}

/// `POST /api/uploads` - one file (`file`) and an optional `folder`.
pub async fn upload(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    multipart: ApiMultipart,
) -> Result<(StatusCode, ApiJson<StoredUpload>)> {
    let form = read_form(multipart).await?;
    if form.files.len() > 1 {
        return Err(AppError::BadRequest(
            "Use /api/uploads/multiple for more than one file".to_string(),
        ));
    }

    let stored = store_all(&state, form).await?;
    let file = stored
        .into_iter()
        .next()
        .ok_or_else(|| AppError::BadRequest("No file uploaded".to_string()))?;
    tracing::info!(admin_id = %admin.id, reference = %file.reference, "Admin uploaded file");
    Ok((StatusCode::CREATED, ApiJson(file)))
}

/// `POST /api/uploads/multiple` - several files (`files`) and an optional
/// `folder`.
pub async fn upload_many(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    multipart: ApiMultipart,
) -> Result<(StatusCode, ApiJson<UploadsResponse>)> {
    let form = read_form(multipart).await?;
    let files = store_all(&state, form).await?;
    tracing::info!(admin_id = %admin.id, count = files.len(), "Admin uploaded files");
    Ok((StatusCode::CREATED, ApiJson(UploadsResponse { files })))
}

/// `DELETE /api/uploads/{*reference}`
pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(reference): ApiPath<String>,
) -> Result<StatusCode> {
    state.downloads().delete_upload(&reference).await?;
    tracing::info!(admin_id = %admin.id, %reference, "Admin deleted upload");
    Ok(StatusCode::NO_CONTENT)
}
