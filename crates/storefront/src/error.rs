//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Every error renders as the JSON envelope
//! `{"error": "<message>", "details": ["..."]}`; `details` is omitted when
//! empty.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::catalog::CatalogError;
use crate::services::downloads::{EntitlementError, UploadError};
use crate::services::orders::OrderError;
use crate::services::payments::PaymentError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Download error: {0}")]
    Entitlement(#[from] EntitlementError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// Payment provider failed outside of checkout.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Request failed validation.
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        details: Vec<String>,
    },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// A validation error with one message per failing field.
    #[must_use]
    pub fn validation(details: Vec<String>) -> Self {
        Self::Validation {
            message: "Validation failed".to_string(),
            details,
        }
    }
}

/// JSON error envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

const INTERNAL: &str = "Internal server error";

impl AppError {
    /// Status code, user-safe message and details.
    fn parts(&self) -> (StatusCode, String, Vec<String>) {
        use StatusCode as S;

        match self {
            Self::Database(_) | Self::Internal(_) | Self::Payment(_) => {
                (S::INTERNAL_SERVER_ERROR, INTERNAL.to_string(), vec![])
            }
            Self::Auth(err) => auth_parts(err),
            Self::Catalog(err) => match err {
                CatalogError::NotFound(what) => (S::NOT_FOUND, format!("{what} not found"), vec![]),
                CatalogError::Validation(msg) => (S::BAD_REQUEST, msg.clone(), vec![]),
                CatalogError::Conflict(msg) => (S::CONFLICT, msg.clone(), vec![]),
                CatalogError::Repository(_) => (S::INTERNAL_SERVER_ERROR, INTERNAL.to_string(), vec![]),
            },
            Self::Order(err) => order_parts(err),
            Self::Entitlement(err) => match err {
                EntitlementError::Forbidden => (
                    S::FORBIDDEN,
                    "You have not purchased this product".to_string(),
                    vec![],
                ),
                EntitlementError::ProductNotFound => {
                    (S::NOT_FOUND, "Product not found".to_string(), vec![])
                }
                EntitlementError::FormatNotAvailable => {
                    (S::NOT_FOUND, "Format not available".to_string(), vec![])
                }
                EntitlementError::InvalidReference(_) => {
                    (S::NOT_FOUND, "File not available".to_string(), vec![])
                }
                EntitlementError::Io(_) | EntitlementError::Repository(_) => {
                    (S::INTERNAL_SERVER_ERROR, INTERNAL.to_string(), vec![])
                }
            },
            Self::Upload(err) => match err {
                UploadError::InvalidFilename(_)
                | UploadError::UnsupportedType(_)
                | UploadError::InvalidPath(_) => (S::BAD_REQUEST, err.to_string(), vec![]),
                UploadError::NotFound => (S::NOT_FOUND, "File not found".to_string(), vec![]),
                UploadError::Io(_) => (S::INTERNAL_SERVER_ERROR, INTERNAL.to_string(), vec![]),
            },
            Self::Validation { message, details } => (S::BAD_REQUEST, message.clone(), details.clone()),
            Self::NotFound(msg) => (S::NOT_FOUND, msg.clone(), vec![]),
            Self::Unauthorized(msg) => (S::UNAUTHORIZED, msg.clone(), vec![]),
            Self::Forbidden(msg) => (S::FORBIDDEN, msg.clone(), vec![]),
            Self::BadRequest(msg) => (S::BAD_REQUEST, msg.clone(), vec![]),
            Self::RateLimited => (
                S::TOO_MANY_REQUESTS,
                "Too many requests, please try again later".to_string(),
                vec![],
            ),
        }
    }
}

fn auth_parts(err: &AuthError) -> (StatusCode, String, Vec<String>) {
    use StatusCode as S;

    match err {
        AuthError::InvalidCredentials => (S::UNAUTHORIZED, "Invalid credentials".to_string(), vec![]),
        AuthError::AccountDisabled => (S::FORBIDDEN, "Account is disabled".to_string(), vec![]),
        AuthError::UserNotFound => (S::NOT_FOUND, "User not found".to_string(), vec![]),
        AuthError::UserAlreadyExists => (
            S::CONFLICT,
            "An account with this email already exists".to_string(),
            vec![],
        ),
        AuthError::WeakPassword(msg) | AuthError::InvalidProfile(msg) => {
            (S::BAD_REQUEST, "Validation failed".to_string(), vec![msg.clone()])
        }
        AuthError::InvalidEmail(_) => (
            S::BAD_REQUEST,
            "Validation failed".to_string(),
            vec!["Invalid email address".to_string()],
        ),
        AuthError::SelfModification(_) => (S::FORBIDDEN, err.to_string(), vec![]),
        AuthError::Repository(_) | AuthError::PasswordHash => {
            (S::INTERNAL_SERVER_ERROR, INTERNAL.to_string(), vec![])
        }
    }
}

fn order_parts(err: &OrderError) -> (StatusCode, String, Vec<String>) {
    use StatusCode as S;

    match err {
        OrderError::InvalidCart(problems) => (
            S::BAD_REQUEST,
            "Cart contains unavailable products".to_string(),
            problems.clone(),
        ),
        OrderError::Cart(e) => (S::BAD_REQUEST, "Validation failed".to_string(), vec![e.to_string()]),
        OrderError::Validation(msg) => (S::BAD_REQUEST, "Validation failed".to_string(), vec![msg.clone()]),
        OrderError::NotFound => (S::NOT_FOUND, "Order not found".to_string(), vec![]),
        OrderError::Forbidden => (S::FORBIDDEN, "Access denied".to_string(), vec![]),
        OrderError::InvalidTransition(e) => (S::CONFLICT, e.to_string(), vec![]),
        OrderError::Conflict(msg) => (S::CONFLICT, msg.clone(), vec![]),
        OrderError::PaymentFailed { order_id, reason } => (
            S::PAYMENT_REQUIRED,
            format!("Payment failed for order {order_id}"),
            vec![reason.clone()],
        ),
        OrderError::CreationFailed { order_id } => (
            S::INTERNAL_SERVER_ERROR,
            format!("Order {order_id} could not be completed, payment is being verified"),
            vec![],
        ),
        OrderError::Payment(_) | OrderError::Repository(_) => {
            (S::INTERNAL_SERVER_ERROR, INTERNAL.to_string(), vec![])
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, details) = self.parts();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (
            status,
            Json(ErrorBody {
                error: message,
                details,
            }),
        )
            .into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}
