//! Category route handlers.

use axum::{extract::State, http::StatusCode};
use serde::Deserialize;

use checklistpro_core::{CategoryId, Slug};

use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::RequireAdmin;
use crate::models::{Category, CategoryUpdate, NewCategory};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
}

fn slug_field(slug: &str) -> Result<Slug> {
    Slug::parse(slug.trim()).map_err(|e| AppError::validation(vec![format!("slug: {e}")]))
}

/// `GET /api/categories`
pub async fn index(State(state): State<AppState>) -> Result<ApiJson<Vec<Category>>> {
    Ok(ApiJson(state.catalog().list_categories().await?))
}

/// `GET /api/categories/{slug}`
pub async fn show(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> Result<ApiJson<Category>> {
    Ok(ApiJson(state.catalog().get_category(&slug).await?))
}

/// `POST /api/categories`
pub async fn create(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiJson(body): ApiJson<CreateCategoryRequest>,
) -> Result<(StatusCode, ApiJson<Category>)> {
    let slug = match body.slug.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(slug) => slug_field(slug)?,
        None => Slug::from_name(&body.name),
    };

    let category = state
        .catalog()
        .create_category(NewCategory {
            name: body.name.trim().to_owned(),
            slug,
            description: body.description,
            icon: body.icon,
        })
        .await?;
    Ok((StatusCode::CREATED, ApiJson(category)))
}

/// `PUT /api/categories/{id}`
pub async fn update(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<CategoryId>,
    ApiJson(body): ApiJson<UpdateCategoryRequest>,
) -> Result<ApiJson<Category>> {
    let slug = body.slug.as_deref().map(slug_field).transpose()?;
    let category = state
        .catalog()
        .update_category(
            id,
            CategoryUpdate {
                name: body.name.map(|n| n.trim().to_owned()),
                slug,
                description: body.description,
                icon: body.icon,
            },
        )
        .await?;
    Ok(ApiJson(category))
}

/// `DELETE /api/categories/{id}`
///
/// 409 while products still belong to the category.
pub async fn delete(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<CategoryId>,
) -> Result<StatusCode> {
    state.catalog().delete_category(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
