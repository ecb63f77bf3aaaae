//! ChecklistPro Core - Shared types and pure domain logic.
//!
//! This crate provides the types used across all ChecklistPro components:
//! - `storefront` - The JSON API (catalog, checkout, downloads, analytics)
//! - `cli` - Command-line tools for migrations, seeding and user management
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be
//! used anywhere, including by clients that hold a [`Cart`].
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, money, emails, slugs and statuses
//! - [`cart`] - The client-held cart and the snapshot sent to checkout

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod types;

pub use cart::{Cart, CartError, CartLine, CartSnapshot, CartSnapshotItem, MAX_LINE_QUANTITY};
pub use types::*;
