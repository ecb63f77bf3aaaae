//! Authentication service.
//!
//! Password registration and login, profile edits and password changes.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tracing::instrument;

use checklistpro_core::{Email, UserId, UserRole};

use crate::db::{RepositoryError, UserRepository};
use crate::models::{NewUser, Page, Pagination, ProfileUpdate, User};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Longest accepted first or last name.
const MAX_NAME_LENGTH: usize = 50;

/// Input for [`AuthService::register`].
#[derive(Debug, Clone)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// Authentication service.
///
/// Handles user registration, login and account self-service.
pub struct AuthService<'a> {
    users: &'a dyn UserRepository,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(users: &'a dyn UserRepository) -> Self {
        Self { users }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Register a new customer account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::InvalidProfile` if a name is empty or too long.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    #[instrument(skip(self, registration), fields(email = %registration.email))]
    pub async fn register(&self, registration: Registration) -> Result<User, AuthError> {
        self.create_user(registration, UserRole::Customer).await
    }

    /// Create an account with an explicit role. Used by the CLI to bootstrap
    /// administrators.
    ///
    /// # Errors
    ///
    /// Same as [`AuthService::register`].
    pub async fn create_user(
        &self,
        registration: Registration,
        role: UserRole,
    ) -> Result<User, AuthError> {
        let email = Email::parse(&registration.email)?;
        let first_name = validate_name("first name", &registration.first_name)?;
        let last_name = validate_name("last name", &registration.last_name)?;
        validate_password(&registration.password)?;

        let password_hash = hash_password(&registration.password)?;

        let user = self
            .users
            .create(NewUser {
                first_name,
                last_name,
                email,
                password_hash,
                role,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, role = %user.role, "User registered");
        Ok(user)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    /// Returns `AuthError::AccountDisabled` if the password is right but the
    /// account has been deactivated.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .users
            .get_with_password_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        if !user.active {
            return Err(AuthError::AccountDisabled);
        }

        Ok(user)
    }

    // =========================================================================
    // Account Self-Service
    // =========================================================================

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Update the caller's own profile.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidProfile` if a provided name is empty or too long.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        mut update: ProfileUpdate,
    ) -> Result<User, AuthError> {
        if let Some(first_name) = update.first_name.take() {
            update.first_name = Some(validate_name("first name", &first_name)?);
        }
        if let Some(last_name) = update.last_name.take() {
            update.last_name = Some(validate_name("last name", &last_name)?);
        }

        self.users
            .update_profile(user_id, update)
            .await
            .map_err(not_found)
    }

    /// Change a password after re-checking the current one.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if `current` is wrong.
    /// Returns `AuthError::WeakPassword` if `new` doesn't meet requirements.
    #[instrument(skip(self, current, new))]
    pub async fn change_password(
        &self,
        user_id: UserId,
        current: &str,
        new: &str,
    ) -> Result<(), AuthError> {
        let hash = self
            .users
            .get_password_hash(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        verify_password(current, &hash)?;
        validate_password(new)?;

        let new_hash = hash_password(new)?;
        self.users.update_password(user_id, &new_hash).await?;

        tracing::info!(%user_id, "Password changed");
        Ok(())
    }

    // =========================================================================
    // User Administration
    // =========================================================================

    /// All accounts, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` on storage failures.
    pub async fn list_users(&self, page: Pagination) -> Result<Page<User>, AuthError> {
        Ok(self.users.list(page).await?)
    }

    /// Change another user's role.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SelfModification` when an admin demotes themselves
    /// and `AuthError::UserNotFound` for an unknown target.
    #[instrument(skip(self))]
    pub async fn set_role(
        &self,
        admin_id: UserId,
        target: UserId,
        role: UserRole,
    ) -> Result<User, AuthError> {
        if admin_id == target && !role.is_admin() {
            return Err(AuthError::SelfModification("demote"));
        }
        let user = self.users.set_role(target, role).await.map_err(not_found)?;
        tracing::info!(%admin_id, user_id = %target, %role, "User role changed");
        Ok(user)
    }

    /// Activate or deactivate another user's account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SelfModification` when an admin deactivates
    /// themselves and `AuthError::UserNotFound` for an unknown target.
    #[instrument(skip(self))]
    pub async fn set_active(
        &self,
        admin_id: UserId,
        target: UserId,
        active: bool,
    ) -> Result<User, AuthError> {
        if admin_id == target && !active {
            return Err(AuthError::SelfModification("deactivate"));
        }
        let user = self
            .users
            .set_active(target, active)
            .await
            .map_err(not_found)?;
        tracing::info!(%admin_id, user_id = %target, active, "User activation changed");
        Ok(user)
    }
}

fn not_found(err: RepositoryError) -> AuthError {
    match err {
        RepositoryError::NotFound => AuthError::UserNotFound,
        other => AuthError::Repository(other),
    }
}

fn validate_name(field: &str, value: &str) -> Result<String, AuthError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AuthError::InvalidProfile(format!("{field} is required")));
    }
    if value.chars().count() > MAX_NAME_LENGTH {
        return Err(AuthError::InvalidProfile(format!(
            "{field} must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(value.to_owned())
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}
