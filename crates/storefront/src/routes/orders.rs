//! Order route handlers, including the per-order download endpoints.

use axum::{
    extract::State,
    http::{
        HeaderMap, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use checklistpro_core::{CartSnapshot, CartSnapshotItem, OrderId, OrderStatus, ProductId};

use crate::error::Result;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::{Order, Pagination, StatusEvent};
use crate::routes::products::PaginationInfo;
use crate::services::{Checkout, Entitlement, OrderListing};
use crate::state::AppState;

/// Header carrying the client's idempotency token.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

// =============================================================================
// Request / Response Types
// =============================================================================

/// Order creation body. Client prices in `items` are ignored.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<CartSnapshotItem>,
    #[serde(alias = "paymentMethod")]
    pub payment_method: String,
    /// May also be sent as the `Idempotency-Key` header; the body wins.
    #[serde(default, alias = "idempotencyKey")]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<OrderStatus>,
    /// Admins only.
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<Order>,
    pub pagination: PaginationInfo,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DownloadsResponse {
    pub downloads: Vec<Entitlement>,
}

fn idempotency_key(body: Option<String>, headers: &HeaderMap) -> Option<String> {
    body.or_else(|| {
        headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    })
    .map(|k| k.trim().to_owned())
    .filter(|k| !k.is_empty())
}

// =============================================================================
// Handlers
// =============================================================================

/// `POST /api/orders`
///
/// 201 with the order. A replay with a known idempotency key returns the
/// original order without charging again.
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    headers: HeaderMap,
    ApiJson(body): ApiJson<CreateOrderRequest>,
) -> Result<(StatusCode, ApiJson<Order>)> {
    let checkout = Checkout {
        cart: CartSnapshot { items: body.items },
        payment_method: body.payment_method,
        idempotency_key: idempotency_key(body.idempotency_key, &headers),
    };

    let order = state.orders().create_order(user.id, checkout).await?;
    Ok((StatusCode::CREATED, ApiJson(order)))
}

/// `GET /api/orders`
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiQuery(query): ApiQuery<ListOrdersQuery>,
) -> Result<ApiJson<OrderListResponse>> {
    let page = state
        .orders()
        .list_orders(
            &user,
            OrderListing {
                status: query.status,
                all_users: query.all,
                page: Pagination::new(query.page, query.limit),
            },
        )
        .await?;

    let pagination = PaginationInfo::from(&page);
    Ok(ApiJson(OrderListResponse {
        orders: page.items,
        pagination,
    }))
}

/// `GET /api/orders/{id}`
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<ApiJson<Order>> {
    Ok(ApiJson(state.orders().get_order(&user, id).await?))
}

/// `GET /api/orders/{id}/history`
pub async fn history(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<ApiJson<Vec<StatusEvent>>> {
    Ok(ApiJson(state.orders().history(&user, id).await?))
}

/// `PUT /api/orders/{id}/cancel`
pub async fn cancel(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<ApiJson<Order>> {
    Ok(ApiJson(state.orders().cancel_order(&user, id).await?))
}

/// `PUT /api/orders/{id}/status`
pub async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(body): ApiJson<UpdateStatusRequest>,
) -> Result<ApiJson<Order>> {
    let order = state
        .orders()
        .admin_update_status(admin.id, id, body.status, body.note)
        .await?;
    Ok(ApiJson(order))
}

/// `GET /api/orders/{id}/downloads`
pub async fn downloads(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<ApiJson<DownloadsResponse>> {
    let downloads = state.downloads().order_downloads(user.id, id).await?;
    Ok(ApiJson(DownloadsResponse { downloads }))
}

/// `GET /api/orders/{id}/downloads/{product_id}/{format}`
pub async fn download(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath((order_id, product_id, format)): ApiPath<(OrderId, ProductId, String)>,
) -> Result<impl IntoResponse> {
    let file = state
        .downloads()
        .download(user.id, order_id, product_id, &format)
        .await?;

    let headers = [
        (CONTENT_TYPE, file.content_type.to_owned()),
        (CONTENT_DISPOSITION, file.content_disposition()),
    ];
    Ok((headers, file.body))
}
