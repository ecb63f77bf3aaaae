//! Core types for ChecklistPro.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod slug;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{Money, MoneyError, OrderTotals, TaxRate};
pub use slug::{Slug, SlugError};
pub use status::*;
