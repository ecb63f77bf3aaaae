//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Registration, login, profile and user administration
//! - `catalog` - Products and categories with a read cache
//! - `orders` - Checkout, the order state machine and payment webhooks
//! - `downloads` - Entitlement checks and download generation
//! - `payments` - Payment gateway abstraction (Stripe, sandbox)
//! - `analytics` - Admin dashboard aggregates
//!
//! Services depend on the repository traits in [`crate::db`], never on a
//! concrete database.

pub mod analytics;
pub mod auth;
pub mod catalog;
pub mod downloads;
pub mod orders;
pub mod payments;

pub use analytics::AnalyticsService;
pub use auth::{AuthError, AuthService, Registration};
pub use catalog::{CatalogError, CatalogService, ProductQuery};
pub use downloads::{DownloadFile, DownloadService, Entitlement, EntitlementError};
pub use orders::{Checkout, CheckoutSettings, OrderError, OrderListing, OrderService};
pub use payments::{PaymentError, PaymentGateway, SandboxGateway, StripeGateway};
