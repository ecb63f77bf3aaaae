//! Admin user management.

use axum::extract::State;
use serde::{Deserialize, Serialize};

use checklistpro_core::{UserId, UserRole};

use crate::error::Result;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::RequireAdmin;
use crate::models::{Pagination, User};
use crate::routes::products::PaginationInfo;
use crate::services::AuthService;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
    pub pagination: PaginationInfo,
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

/// `GET /api/users`
pub async fn index(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiQuery(query): ApiQuery<ListUsersQuery>,
) -> Result<ApiJson<UserListResponse>> {
    let auth = AuthService::new(state.repos().users.as_ref());
    let page = auth
        .list_users(Pagination::new(query.page, query.limit))
        .await?;

    let pagination = PaginationInfo::from(&page);
    Ok(ApiJson(UserListResponse {
        users: page.items,
        pagination,
    }))
}

/// `PUT /api/users/{id}/role`
pub async fn set_role(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(body): ApiJson<SetRoleRequest>,
) -> Result<ApiJson<User>> {
    let auth = AuthService::new(state.repos().users.as_ref());
    Ok(ApiJson(auth.set_role(admin.id, id, body.role).await?))
}

/// `PUT /api/users/{id}/active`
pub async fn set_active(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(body): ApiJson<SetActiveRequest>,
) -> Result<ApiJson<User>> {
    let auth = AuthService::new(state.repos().users.as_ref());
    Ok(ApiJson(auth.set_active(admin.id, id, body.active).await?))
}
