//! Database schemas for Docket
//!
//! Defines MongoDB document structures for applications, hearings, users,
//! reference data, notifications and audit logs. Each indexed schema declares
//! its target indexes through `IntoIndexes`.

mod application;
mod audit_log;
mod hearing;
mod notification;
mod reference;
mod user;

pub use application::{
    ApplicationDescription, ApplicationDoc, ApplicationStatus, ViolationFinding,
    APPLICATION_COLLECTION,
};
pub use audit_log::{AuditLogEntry, AUDIT_LOG_COLLECTION};
pub use hearing::{HearingDateDoc, HEARING_COLLECTION};
pub use notification::{NotificationDoc, NOTIFICATION_COLLECTION};
pub use reference::{
    CategoryDoc, SubViolation, ViolationTypeDoc, CATEGORY_COLLECTION, VIOLATION_TYPE_COLLECTION,
};
pub use user::{Role, UserDoc, USER_COLLECTION};
