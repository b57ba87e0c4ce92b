//! Database layer for Docket
//!
//! MongoDB access, the store-agnostic collection seam used by migrations, and
//! an in-memory store implementing the same seam.

pub mod catalog;
pub mod handle;
pub mod memory;
pub mod mongo;
pub mod schemas;

pub use catalog::IndexSpec;
pub use handle::{CollectionHandle, Database, FieldUpdate, UpdateCounts};
pub use memory::{MemoryCollection, MemoryDatabase};
pub use mongo::{IntoIndexes, MongoClient, MongoCollection, MongoCollectionHandle, Timestamped};
pub use schemas::{ApplicationDoc, ApplicationStatus, HearingDateDoc, Role, UserDoc};
