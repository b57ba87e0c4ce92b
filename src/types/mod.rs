//! Shared types for Docket

pub mod error;

pub use error::{is_duplicate_key, DocketError, Result};
