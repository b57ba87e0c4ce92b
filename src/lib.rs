//! Docket - case management core for compliance applications
//!
//! Applications move through completeness review, hearings and resolution.
//! This crate holds the parts of the system that need real invariants:
//!
//! ## Modules
//!
//! - **Migration**: idempotent field renames, empty-value cleanup and index
//!   reconciliation, run as an ordered plan by `docket-migrate`
//! - **Lifecycle**: the application state machine, with atomic hearing swaps
//!   and optimistic concurrency
//! - **Cache**: TTL cache for reference data, invalidated explicitly
//! - **Routes**: REST contract helpers for the lifecycle actions
//! - **DB**: MongoDB access plus an in-memory store for tests

pub mod cache;
pub mod config;
pub mod db;
pub mod lifecycle;
pub mod logging;
pub mod migration;
pub mod routes;
pub mod types;

pub use config::Args;
pub use types::{DocketError, Result};
