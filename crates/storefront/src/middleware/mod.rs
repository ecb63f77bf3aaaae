//! HTTP middleware stack for the storefront API.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request span with status and latency)
//! 3. Request ID (`x-request-id` in, out and on the span)
//! 4. Security headers
//! 5. CORS (frontend origin plus `CORS_ALLOWED_ORIGINS`, credentials allowed)
//! 6. Compression (gzip)
//! 7. Body limit (10 MB)
//! 8. Session layer (tower-sessions, signed cookie)
//! 9. Rate limiting (governor, per route group)

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{RequireAdmin, RequireAuth, clear_current_user, set_current_user};
pub use rate_limit::{
    RateLimitKind, RateLimits, api_rate_limiter, auth_rate_limiter, rate_limit_envelope,
};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
pub use session::{SESSION_COOKIE_NAME, create_session_layer, postgres_session_store};
