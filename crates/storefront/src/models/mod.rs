//! Domain models for the storefront.
//!
//! These are validated domain types, separate from the database row types
//! in [`crate::db`] and the request/response types in [`crate::routes`].

pub mod analytics;
pub mod catalog;
pub mod order;
pub mod session;
pub mod user;

pub use analytics::{DailyRevenue, DashboardSummary, ProductStats, StatusCounts, UserStats};
pub use catalog::{
    Category, CategoryUpdate, NewCategory, NewProduct, Page, Pagination, Product, ProductFilter,
    ProductSort, ProductUpdate, Rating,
};
pub use order::{LineItem, NewOrder, Order, OrderFilter, StatusChange, StatusEvent};
pub use session::{CurrentUser, keys as session_keys};
pub use user::{Address, NewUser, ProfileUpdate, User};
