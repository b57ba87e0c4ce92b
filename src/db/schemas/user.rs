//! User document schema
//!
//! Staff and applicant accounts. Credentials are owned by the auth service and
//! are not modelled here.

use bson::{doc, oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::catalog::IndexSpec;
use crate::db::mongo::{IntoIndexes, Timestamped};

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// Role an actor acts under
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Applicant,
    Registrar,
    HearingOfficer,
    Admin,
    /// Scheduled jobs inside the service
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applicant => "applicant",
            Self::Registrar => "registrar",
            Self::HearingOfficer => "hearing_officer",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct UserDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    pub name: String,

    /// Left unset rather than empty so the sparse unique index ignores it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// National identity card number, same rule as `email`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnic: Option<String>,

    #[serde(default)]
    pub role: Role,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

fn default_true() -> bool {
    true
}

impl IntoIndexes for UserDoc {
    const COLLECTION: &'static str = USER_COLLECTION;

    fn into_indices() -> Vec<IndexSpec> {
        vec![
            IndexSpec::new(doc! { "email": 1 }).unique().sparse(),
            IndexSpec::new(doc! { "cnic": 1 }).unique().sparse(),
        ]
    }
}

impl Timestamped for UserDoc {
    fn stamp(&mut self, now: DateTime) {
        self.created_at.get_or_insert(now);
        self.updated_at = Some(now);
    }
}
