//! Seed a fresh database with the first admin account and the starter
//! categories.
//!
//! Safe to re-run: the admin is only created while no account exists, and
//! categories are matched by slug.
//!
//! # Environment Variables
//!
//! - `ADMIN_EMAIL` - Admin email (default `admin@checklistpro.com`)
//! - `ADMIN_PASSWORD` - Admin password (default `Admin123!`, change it)

use checklistpro_core::{Slug, UserRole};
use checklistpro_storefront::db::{
    CatalogRepository, PgCatalogRepository, PgUserRepository, UserRepository,
};
use checklistpro_storefront::models::{NewCategory, Pagination};
use checklistpro_storefront::services::{AuthService, Registration};

use super::connect;

const DEFAULT_ADMIN_EMAIL: &str = "admin@checklistpro.com";
const DEFAULT_ADMIN_PASSWORD: &str = "Admin123!";

/// `(name, slug, description, icon)`
const CATEGORIES: &[(&str, &str, &str, &str)] = &[
    (
        "Food Service",
        "food-service",
        "Restaurant and food business checklists",
        "🍽️",
    ),
    (
        "Healthcare",
        "healthcare",
        "Medical and therapy practice checklists",
        "🏥",
    ),
    (
        "Media & Content",
        "media-content",
        "Content creation and media production",
        "📺",
    ),
    (
        "Retail",
        "retail",
        "Retail and e-commerce business setup",
        "🛍️",
    ),
    (
        "Consulting",
        "consulting",
        "Professional services and consulting",
        "💼",
    ),
];

/// Seed the admin account and categories.
///
/// # Errors
///
/// Returns an error if the database is unreachable, a slug is invalid or the
/// admin credentials fail validation.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let pool = connect().await?;
    let users = PgUserRepository::new(pool.clone());
    let catalog = PgCatalogRepository::new(pool);

    let existing = users.list(Pagination::new(Some(1), Some(1))).await?;
    if existing.total == 0 {
        let email =
            std::env::var("ADMIN_EMAIL").unwrap_or_else(|_| DEFAULT_ADMIN_EMAIL.to_owned());
        let password =
            std::env::var("ADMIN_PASSWORD").unwrap_or_else(|_| DEFAULT_ADMIN_PASSWORD.to_owned());
        if password == DEFAULT_ADMIN_PASSWORD {
            tracing::warn!("Seeding the admin with the default password, change it after login");
        }

        let admin = AuthService::new(&users)
            .create_user(
                Registration {
                    first_name: "Admin".to_owned(),
                    last_name: "User".to_owned(),
                    email,
                    password,
                },
                UserRole::Admin,
            )
            .await?;
        tracing::info!(user_id = %admin.id, email = %admin.email, "Admin user seeded");
    } else {
        tracing::info!(users = existing.total, "Users exist, skipping admin seed");
    }

    let mut created = 0;
    for (name, slug, description, icon) in CATEGORIES {
        if catalog.get_category_by_slug(slug).await?.is_some() {
            continue;
        }
        catalog
            .create_category(NewCategory {
                name: (*name).to_owned(),
                slug: Slug::parse(slug)?,
                description: (*description).to_owned(),
                icon: (*icon).to_owned(),
            })
            .await?;
        created += 1;
    }
    tracing::info!(created, "Categories seeded");

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_slugs_are_valid() {
        for (name, slug, _, _) in CATEGORIES {
            assert!(Slug::parse(slug).is_ok(), "{slug}");
            assert_eq!(Slug::from_name(name).as_str(), *slug);
        }
    }
}
