//! HTTP route handlers for the storefront API.
//!
//! # Route Structure
//!
//! Everything is mounted under `/api`.
//!
//! ```text
//! GET  /health                 - Liveness (status, uptime, database)
//! GET  /health/ready           - Readiness (503 without a database)
//! GET  /metrics                - Uptime, database and cache state
//! GET  /docs                   - Endpoint index
//!
//! # Auth (strict rate limit)
//! POST /auth/register          - Create a customer account and log in
//! POST /auth/login             - Password login
//! POST /auth/logout            - End the session
//! GET  /auth/me                - Current account
//! PUT  /auth/me                - Update own profile
//! POST /auth/change-password   - Change own password
//!
//! # Catalog
//! GET  /products               - Listing (category, search, sort, featured, page, limit)
//! GET  /products/:slug         - Product detail
//! POST /products/:id/view      - Record a view (fire and forget)
//! POST /products               - Create (admin)
//! PUT  /products/:id           - Update (admin)
//! DELETE /products/:id         - Disable (admin)
//! GET  /admin/products         - Listing including disabled products (admin)
//! GET  /categories             - Category list
//! GET  /categories/:slug       - Category detail
//! POST /categories             - Create (admin)
//! PUT  /categories/:id         - Update (admin)
//! DELETE /categories/:id       - Delete (admin)
//!
//! # Orders (requires auth)
//! POST /orders                 - Checkout
//! GET  /orders                 - Own orders (admins: ?all=true)
//! GET  /orders/:id             - Order detail
//! GET  /orders/:id/history     - Status audit trail
//! PUT  /orders/:id/cancel      - Cancel own order
//! PUT  /orders/:id/status      - Status change (admin)
//! GET  /orders/:id/downloads   - Entitlements of one order
//! GET  /orders/:id/downloads/:product_id/:format - File download
//! GET  /downloads              - All entitlements
//!
//! # Payments
//! GET  /payments/methods       - Provider and accepted methods
//! POST /payments/create-intent - Client-side payment intent (requires auth)
//! POST /payments/webhook       - Provider webhook (signed)
//!
//! # Admin
//! GET  /users                  - Accounts
//! PUT  /users/:id/role         - Change role
//! PUT  /users/:id/active       - Activate or deactivate
//! GET  /analytics              - Dashboard
//! GET  /analytics/revenue      - Daily revenue (?days=)
//! GET  /analytics/products     - Top products (?limit=)
//! GET  /analytics/users        - User counts (?days=)
//! POST /analytics/events       - Client event log (public, always 204)
//! POST /uploads                - Store one download file (multipart)
//! POST /uploads/multiple       - Store several download files (multipart)
//! DELETE /uploads/*reference   - Delete a stored file
//! ```

pub mod analytics;
pub mod auth;
pub mod categories;
pub mod downloads;
pub mod health;
pub mod orders;
pub mod payments;
pub mod products;
pub mod uploads;
pub mod users;

use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::middleware::{RateLimitKind, RateLimits};
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me).put(auth::update_me))
        .route("/change-password", post(auth::change_password))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index).post(products::create))
        .route(
            "/{id}",
            get(products::show)
                .put(products::update)
                .delete(products::delete),
        )
        .route("/{id}/view", post(products::track_view))
}

/// Create the category routes router.
pub fn category_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(categories::index).post(categories::create))
        .route(
            "/{id}",
            get(categories::show)
                .put(categories::update)
                .delete(categories::delete),
        )
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index).post(orders::create))
        .route("/{id}", get(orders::show))
        .route("/{id}/history", get(orders::history))
        .route("/{id}/cancel", put(orders::cancel))
        .route("/{id}/status", put(orders::update_status))
        .route("/{id}/downloads", get(orders::downloads))
        .route(
            "/{id}/downloads/{product_id}/{format}",
            get(orders::download),
        )
}

/// Create the admin user management router.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(users::index))
        .route("/{id}/role", put(users::set_role))
        .route("/{id}/active", put(users::set_active))
}

/// Create the analytics router.
pub fn analytics_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(analytics::dashboard))
        .route("/revenue", get(analytics::revenue))
        .route("/products", get(analytics::products))
        .route("/users", get(analytics::users))
        .route("/events", post(analytics::track_event))
}

/// Create the admin upload router.
pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(uploads::upload))
        .route("/multiple", post(uploads::upload_many))
        .route("/{*reference}", delete(uploads::delete))
}

/// Create all API routes, to be nested under `/api`.
///
/// Auth endpoints get the strict limiter, everything else except health
/// checks and the webhook gets the general one.
pub fn api_routes(limits: RateLimits) -> Router<AppState> {
    let api = Router::new()
        .nest("/products", product_routes())
        .route("/admin/products", get(products::admin_index))
        .nest("/categories", category_routes())
        .nest("/orders", order_routes())
        .route("/downloads", get(downloads::index))
        .route("/payments/methods", get(payments::methods))
        .route("/payments/create-intent", post(payments::create_intent))
        .nest("/users", user_routes())
        .nest("/analytics", analytics_routes())
        .nest("/uploads", upload_routes());

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/metrics", get(health::metrics))
        .route("/docs", get(health::docs))
        .route("/payments/webhook", post(payments::webhook))
        .nest("/auth", limits.apply(auth_routes(), RateLimitKind::Auth))
        .merge(limits.apply(api, RateLimitKind::Api))
        .fallback(health::not_found)
}
