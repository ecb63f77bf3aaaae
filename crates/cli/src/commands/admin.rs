//! Admin user management commands.
//!
//! # Usage
//!
//! ```bash
//! # Create a new admin user
//! cp-cli admin create -e admin@example.com -f Ada -l Lovelace -p 'a-long-password'
//!
//! # Change a role
//! cp-cli admin role -e someone@example.com -r customer
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (fallback `DATABASE_URL`)

use thiserror::Error;

use checklistpro_core::{Email, UserId, UserRole};
use checklistpro_storefront::db::{PgUserRepository, RepositoryError, UserRepository};
use checklistpro_storefront::services::{AuthError, AuthService, Registration};

use super::{ConnectError, connect};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Invalid role.
    #[error("Invalid role: {0}. Valid roles: customer, admin")]
    InvalidRole(String),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// No account with that email.
    #[error("No user with email: {0}")]
    UserNotFound(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Create a new admin user.
///
/// # Returns
///
/// The ID of the created admin user.
///
/// # Errors
///
/// Returns `AdminError::Auth` for an invalid email, weak password or an
/// email that is already registered.
pub async fn create_user(
    email: &str,
    first_name: &str,
    last_name: &str,
    password: &str,
) -> Result<UserId, AdminError> {
    let pool = connect().await?;
    let users = PgUserRepository::new(pool);

    tracing::info!("Creating admin user: {}", email);

    let user = AuthService::new(&users)
        .create_user(
            Registration {
                first_name: first_name.to_owned(),
                last_name: last_name.to_owned(),
                email: email.to_owned(),
                password: password.to_owned(),
            },
            UserRole::Admin,
        )
        .await?;

    tracing::info!(
        "Admin user created successfully! ID: {}, Name: {}, Email: {}",
        user.id,
        user.full_name(),
        user.email
    );
    Ok(user.id)
}

/// Change the role of an existing account.
///
/// # Errors
///
/// Returns `AdminError::InvalidRole`, `AdminError::InvalidEmail` or
/// `AdminError::UserNotFound`.
pub async fn set_role(email: &str, role: &str) -> Result<(), AdminError> {
    let role: UserRole = role
        .parse()
        .map_err(|_| AdminError::InvalidRole(role.to_owned()))?;
    let email = Email::parse(email).map_err(|_| AdminError::InvalidEmail(email.to_owned()))?;

    let pool = connect().await?;
    let users = PgUserRepository::new(pool);

    let user = users
        .get_by_email(&email)
        .await?
        .ok_or_else(|| AdminError::UserNotFound(email.to_string()))?;

    let updated = users.set_role(user.id, role).await?;
    tracing::info!("Role of {} is now {}", updated.email, updated.role);
    Ok(())
}
