//! Authentication extractors.
//!
//! The session only identifies the account. Both extractors re-read it on
//! every request, so role changes and deactivation apply to sessions that
//! are already open.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::error::AppError;
use crate::models::{CurrentUser, User, session_keys};
use crate::services::auth::AuthError;
use crate::state::AppState;

/// Extractor that requires a logged-in, active user.
///
/// Rejects with 401 when logged out and 403 when the account has been
/// deactivated. The returned user carries the account's current role.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.email)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = active_user(parts, state).await?;
        Ok(Self(CurrentUser::from(&user)))
    }
}

/// Extractor that requires an active administrator.
///
/// 401 when logged out, 403 when the account is not (or no longer) an
/// active admin.
pub struct RequireAdmin(pub CurrentUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = active_user(parts, state).await.map_err(|e| match e {
            AppError::Auth(AuthError::AccountDisabled) => {
                AppError::Forbidden("Admin access required".to_string())
            }
            other => other,
        })?;

        if !user.role.is_admin() {
            tracing::warn!(user_id = %user.id, "Admin route denied");
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }

        Ok(Self(CurrentUser::from(&user)))
    }
}

/// The session's account as currently stored.
async fn active_user(parts: &Parts, state: &AppState) -> Result<User, AppError> {
    let session_user = current_user(parts)
        .await
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;

    let user = state
        .repos()
        .users
        .get_by_id(session_user.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;

    if !user.active {
        tracing::warn!(user_id = %user.id, "Request from deactivated account");
        return Err(AuthError::AccountDisabled.into());
    }
    Ok(user)
}

async fn current_user(parts: &Parts) -> Option<CurrentUser> {
    // Set by SessionManagerLayer
    let session = parts.extensions.get::<Session>()?;
    session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()
}

/// Store the logged-in user in the session.
///
/// Cycles the session id first to prevent fixation.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Clear the whole session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}
