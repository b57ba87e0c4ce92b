//! Application lifecycle
//!
//! `machine` holds the pure transition rules, `store` the atomic commit of a
//! transition, and `service` ties them together with retry and side effects.

pub mod machine;
pub mod notify;
pub mod service;
pub mod store;

pub use machine::{allowed_actions, Actor, LifecycleAction, NewApplication, Transition};
pub use notify::{MemoryNotificationSink, MongoNotificationSink, NotificationSink};
pub use service::ApplicationService;
pub use store::{
    ApplicationStore, Commit, CommitOutcome, MemoryApplicationStore, MongoApplicationStore,
};
