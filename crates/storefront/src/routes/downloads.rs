//! Library of purchased downloads.

use axum::extract::State;

use crate::error::Result;
use crate::extract::ApiJson;
use crate::middleware::RequireAuth;
use crate::routes::orders::DownloadsResponse;
use crate::state::AppState;

/// `GET /api/downloads` - everything the caller has paid for.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<ApiJson<DownloadsResponse>> {
    let downloads = state.downloads().list_downloads(user.id).await?;
    Ok(ApiJson(DownloadsResponse { downloads }))
}
