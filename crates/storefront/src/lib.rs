//! ChecklistPro storefront library.
//!
//! The JSON API behind the ChecklistPro checklist store: catalog, checkout,
//! entitlement-checked downloads, accounts and admin analytics. Exposed as a
//! library so the binary, the CLI and router tests share one build of it.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
