//! Authentication route handlers.
//!
//! Password login backed by the session cookie. Successful login and
//! registration both start a fresh session.

use axum::{extract::State, http::StatusCode};
use serde::Deserialize;
use tower_sessions::Session;

use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::extract::ApiJson;
use crate::middleware::{RequireAuth, clear_current_user, set_current_user};
use crate::models::{Address, CurrentUser, ProfileUpdate, User};
use crate::services::{AuthService, Registration};
use crate::state::AppState;

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(alias = "firstName")]
    pub first_name: String,
    #[serde(alias = "lastName")]
    pub last_name: String,
    pub email: String,
    pub password: String,
    /// Checked against `password` when sent.
    #[serde(default, alias = "passwordConfirm", alias = "confirmPassword")]
    pub password_confirm: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(alias = "firstName")]
    pub first_name: Option<String>,
    #[serde(alias = "lastName")]
    pub last_name: Option<String>,
    pub address: Option<Address>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(alias = "currentPassword")]
    pub current_password: String,
    #[serde(alias = "newPassword")]
    pub new_password: String,
    #[serde(default, alias = "confirmPassword")]
    pub confirm_password: Option<String>,
}

fn check_confirmation(password: &str, confirmation: Option<&str>) -> Result<()> {
    match confirmation {
        Some(confirm) if confirm != password => Err(AppError::validation(vec![
            "Passwords do not match".to_string(),
        ])),
        _ => Ok(()),
    }
}

fn session_error(e: &tower_sessions::session::Error) -> AppError {
    AppError::Internal(format!("session error: {e}"))
}

async fn start_session(session: &Session, user: &User) -> Result<()> {
    set_current_user(session, &CurrentUser::from(user))
        .await
        .map_err(|e| session_error(&e))?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

/// `POST /api/auth/register`
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, ApiJson<User>)> {
    check_confirmation(&body.password, body.password_confirm.as_deref())?;

    let auth = AuthService::new(state.repos().users.as_ref());
    let user = auth
        .register(Registration {
            first_name: body.first_name,
            last_name: body.last_name,
            email: body.email,
            password: body.password,
        })
        .await?;

    start_session(&session, &user).await?;
    Ok((StatusCode::CREATED, ApiJson(user)))
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<ApiJson<User>> {
    let auth = AuthService::new(state.repos().users.as_ref());
    let user = auth.login(&body.email, &body.password).await?;

    start_session(&session, &user).await?;
    tracing::info!(user_id = %user.id, "User logged in");
    Ok(ApiJson(user))
}

/// `POST /api/auth/logout`
pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_user(&session)
        .await
        .map_err(|e| session_error(&e))?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/auth/me`
pub async fn me(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<ApiJson<User>> {
    let auth = AuthService::new(state.repos().users.as_ref());
    Ok(ApiJson(auth.get_user(current.id).await?))
}

/// `PUT /api/auth/me`
pub async fn update_me(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiJson(body): ApiJson<UpdateProfileRequest>,
) -> Result<ApiJson<User>> {
    let auth = AuthService::new(state.repos().users.as_ref());
    let user = auth
        .update_profile(
            current.id,
            ProfileUpdate {
                first_name: body.first_name,
                last_name: body.last_name,
                address: body.address,
            },
        )
        .await?;
    Ok(ApiJson(user))
}

/// `POST /api/auth/change-password`
pub async fn change_password(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiJson(body): ApiJson<ChangePasswordRequest>,
) -> Result<StatusCode> {
    check_confirmation(&body.new_password, body.confirm_password.as_deref())?;

    let auth = AuthService::new(state.repos().users.as_ref());
    auth.change_password(current.id, &body.current_password, &body.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_optional_but_checked() {
        assert!(check_confirmation("hunter22!", None).is_ok());
        assert!(check_confirmation("hunter22!", Some("hunter22!")).is_ok());
        assert!(check_confirmation("hunter22!", Some("hunter23!")).is_err());
    }

    #[test]
    fn test_register_accepts_camel_case() {
        let body: RegisterRequest = serde_json::from_str(
            r#"{"firstName":"Ada","lastName":"Lovelace","email":"ada@example.com","password":"p4ssword!"}"#,
        )
        .unwrap();
        assert_eq!(body.first_name, "Ada");
        assert!(body.password_confirm.is_none());
    }
}
