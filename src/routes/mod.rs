//! REST contract helpers for Docket

pub mod applications;

pub use applications::{
    application_json, handle, match_application_route, parse_action, ActionKind, ApplicationRoute,
};
