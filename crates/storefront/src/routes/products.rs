//! Product route handlers.

use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use checklistpro_core::{CategoryId, Money, ProductId, Slug};

use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath, ApiQuery, nullable};
use crate::middleware::RequireAdmin;
use crate::models::{NewProduct, Page, Pagination, Product, ProductSort, ProductUpdate};
use crate::services::ProductQuery;
use crate::state::AppState;

// =============================================================================
// Request / Response Types
// =============================================================================

/// Listing query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// Category id or slug.
    pub category: Option<String>,
    pub search: Option<String>,
    pub sort: Option<ProductSort>,
    /// Shorthand for `sort=popular`.
    #[serde(default)]
    pub featured: bool,
}

/// Pagination block of a listing response.
#[derive(Debug, Serialize)]
pub struct PaginationInfo {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

impl<T> From<&Page<T>> for PaginationInfo {
    fn from(page: &Page<T>) -> Self {
        Self {
            page: page.page,
            limit: page.limit,
            total: page.total,
            pages: page.pages(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    pub products: Vec<Product>,
    pub pagination: PaginationInfo,
}

impl From<Page<Product>> for ProductListResponse {
    fn from(page: Page<Product>) -> Self {
        let pagination = PaginationInfo::from(&page);
        Self {
            products: page.items,
            pagination,
        }
    }
}

/// Admin product creation body.
#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    /// Derived from the name when omitted.
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub price: Money,
    #[serde(alias = "originalPrice")]
    pub original_price: Option<Money>,
    #[serde(alias = "categoryId")]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub formats: BTreeMap<String, String>,
}

/// Admin product update body. Absent fields are left unchanged; `null`
/// clears the nullable ones.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    #[serde(default, alias = "originalPrice", deserialize_with = "nullable")]
    pub original_price: Option<Option<Money>>,
    #[serde(default, alias = "categoryId", deserialize_with = "nullable")]
    pub category_id: Option<Option<CategoryId>>,
    pub features: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub formats: Option<BTreeMap<String, String>>,
    pub enabled: Option<bool>,
}

fn parse_slug(slug: Option<&str>, name: &str) -> Result<Slug> {
    match slug.map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => {
            Slug::parse(slug).map_err(|e| AppError::validation(vec![format!("slug: {e}")]))
        }
        None => Ok(Slug::from_name(name)),
    }
}

fn product_query(query: ListQuery, include_disabled: bool) -> ProductQuery {
    let sort = if query.featured {
        ProductSort::Popular
    } else {
        query.sort.unwrap_or_default()
    };
    ProductQuery {
        category: query.category,
        search: query.search,
        sort,
        include_disabled,
        page: Pagination::new(query.page, query.limit),
    }
}

// =============================================================================
// Public Handlers
// =============================================================================

/// `GET /api/products`
pub async fn index(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<ApiJson<ProductListResponse>> {
    let page = state
        .catalog()
        .list_products(product_query(query, false))
        .await?;
    Ok(ApiJson(page.into()))
}

/// `GET /api/products/{slug}`
pub async fn show(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> Result<ApiJson<Product>> {
    let product = state.catalog().get_product(&slug).await?;
    Ok(ApiJson(product))
}

/// `POST /api/products/{id}/view`
///
/// Always 204; a failed counter update is only logged.
pub async fn track_view(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProductId>,
) -> StatusCode {
    state.catalog().track_view(id);
    StatusCode::NO_CONTENT
}

// =============================================================================
// Admin Handlers
// =============================================================================

/// `GET /api/admin/products` - every product, disabled ones included.
pub async fn admin_index(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<ApiJson<ProductListResponse>> {
    let page = state
        .catalog()
        .list_products(product_query(query, true))
        .await?;
    Ok(ApiJson(page.into()))
}

/// `POST /api/products`
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiJson(body): ApiJson<CreateProductRequest>,
) -> Result<(StatusCode, ApiJson<Product>)> {
    let slug = parse_slug(body.slug.as_deref(), &body.name)?;
    let product = state
        .catalog()
        .create_product(NewProduct {
            name: body.name.trim().to_owned(),
            slug,
            description: body.description,
            price: body.price,
            original_price: body.original_price,
            category_id: body.category_id,
            features: body.features,
            tags: body.tags,
            formats: normalize_formats(body.formats),
        })
        .await?;

    tracing::info!(admin_id = %admin.id, product_id = %product.id, "Admin created product");
    Ok((StatusCode::CREATED, ApiJson(product)))
}

/// `PUT /api/products/{id}`
pub async fn update(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(body): ApiJson<UpdateProductRequest>,
) -> Result<ApiJson<Product>> {
    let slug = body
        .slug
        .as_deref()
        .map(|s| Slug::parse(s.trim()).map_err(|e| AppError::validation(vec![format!("slug: {e}")])))
        .transpose()?;

    let product = state
        .catalog()
        .update_product(
            id,
            ProductUpdate {
                name: body.name.map(|n| n.trim().to_owned()),
                slug,
                description: body.description,
                price: body.price,
                original_price: body.original_price,
                category_id: body.category_id,
                features: body.features,
                tags: body.tags,
                formats: body.formats.map(normalize_formats),
                enabled: body.enabled,
            },
        )
        .await?;
    Ok(ApiJson(product))
}

/// `DELETE /api/products/{id}` - soft delete.
pub async fn delete(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<ApiJson<Product>> {
    let product = state.catalog().disable_product(id).await?;
    Ok(ApiJson(product))
}

/// Format names are matched case-insensitively at download time.
fn normalize_formats(formats: BTreeMap<String, String>) -> BTreeMap<String, String> {
    formats
        .into_iter()
        .map(|(name, reference)| (name.trim().to_lowercase(), reference))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_featured_forces_popular_sort() {
        let query = ListQuery {
            featured: true,
            sort: Some(ProductSort::Name),
            ..ListQuery::default()
        };
        assert_eq!(product_query(query, false).sort, ProductSort::Popular);
    }

    #[test]
    fn test_slug_derived_from_name() {
        let slug = parse_slug(None, "Restaurant Opening Checklist").unwrap();
        assert_eq!(slug.as_str(), "restaurant-opening-checklist");
        assert!(parse_slug(Some("Bad Slug!"), "x").is_err());
    }

    #[test]
    fn test_format_names_lowercased() {
        let formats = normalize_formats(BTreeMap::from([(" PDF ".to_owned(), "a.pdf".to_owned())]));
        assert_eq!(formats.get("pdf").map(String::as_str), Some("a.pdf"));
    }
}
