//! Application lifecycle routes
//!
//! Transport-agnostic: the HTTP server that owns the socket matches a
//! request with `match_application_route`, then hands the decoded actor and
//! raw body to `handle`.
//!
//! ## Routes
//! - POST /applications → submit
//! - GET /applications/{id} → application with its allowed actions
//! - GET /applications/{id}/hearings → hearing rows
//! - PUT /applications/{id} → resubmit (owning applicant)
//! - POST /applications/{id}/{mark-incomplete|mark-complete|schedule|start-hearing|adjourn|violation|approve|reject}

use bson::oid::ObjectId;
use hyper::{Method, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::db::schemas::{ApplicationDoc, HearingDateDoc};
use crate::lifecycle::{allowed_actions, Actor, ApplicationService, LifecycleAction, NewApplication};
use crate::types::{DocketError, Result};

/// Base path for application routes
pub const APPLICATIONS_PATH: &str = "/applications";

/// Action sub-resources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Resubmit,
    MarkIncomplete,
    MarkComplete,
    Schedule,
    StartHearing,
    Adjourn,
    Violation,
    Approve,
    Reject,
}

impl ActionKind {
    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "mark-incomplete" => Some(Self::MarkIncomplete),
            "mark-complete" => Some(Self::MarkComplete),
            "schedule" => Some(Self::Schedule),
            "start-hearing" => Some(Self::StartHearing),
            "adjourn" => Some(Self::Adjourn),
            "violation" => Some(Self::Violation),
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }

    /// `action` tag of the matching `LifecycleAction`
    fn action_tag(&self) -> &'static str {
        match self {
            Self::Resubmit => "resubmit",
            Self::MarkIncomplete => "mark_incomplete",
            Self::MarkComplete => "mark_complete",
            Self::Schedule => "schedule_hearing",
            Self::StartHearing => "start_hearing",
            Self::Adjourn => "adjourn",
            Self::Violation => "set_violation",
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

/// A matched application route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationRoute {
    Create,
    Get(ObjectId),
    Hearings(ObjectId),
    Action { id: ObjectId, kind: ActionKind },
}

/// Match a method and path; `None` means not an application route
pub fn match_application_route(method: &Method, path: &str) -> Option<ApplicationRoute> {
    let rest = path.strip_prefix(APPLICATIONS_PATH)?;
    let rest = rest.trim_end_matches('/');

    if rest.is_empty() {
        return (*method == Method::POST).then_some(ApplicationRoute::Create);
    }

    let rest = rest.strip_prefix('/')?;
    let mut parts = rest.splitn(2, '/');
    let id = ObjectId::parse_str(parts.next()?).ok()?;

    match (method, parts.next()) {
        (&Method::GET, None) => Some(ApplicationRoute::Get(id)),
        (&Method::PUT, None) => Some(ApplicationRoute::Action {
            id,
            kind: ActionKind::Resubmit,
        }),
        (&Method::GET, Some("hearings")) => Some(ApplicationRoute::Hearings(id)),
        (&Method::POST, Some(segment)) => {
            ActionKind::from_segment(segment).map(|kind| ApplicationRoute::Action { id, kind })
        }
        _ => None,
    }
}

/// Decode a request body into the action for `kind`
///
/// An empty body is accepted for actions without a payload.
pub fn parse_action(kind: ActionKind, body: &[u8]) -> Result<LifecycleAction> {
    let mut payload = if body.iter().all(u8::is_ascii_whitespace) {
        json!({})
    } else {
        serde_json::from_slice::<Value>(body)?
    };

    let Some(object) = payload.as_object_mut() else {
        return Err(DocketError::BadRequest("request body must be a JSON object".into()));
    };
    object.insert("action".into(), Value::from(kind.action_tag()));

    Ok(serde_json::from_value(payload)?)
}

/// Dispatch a matched route and render the response body
pub async fn handle(
    service: &ApplicationService,
    route: ApplicationRoute,
    actor: &Actor,
    body: &[u8],
) -> (StatusCode, Value) {
    debug!(route = ?route, actor = %actor.user_id, "Application request");

    match dispatch(service, route, actor, body).await {
        Ok(response) => response,
        Err(e) => {
            if e.status_code().is_server_error() {
                warn!(error = %e, "Application request failed");
            }
            let (status, message) = e.into_status_code_and_body();
            (status, json!({ "error": message }))
        }
    }
}

async fn dispatch(
    service: &ApplicationService,
    route: ApplicationRoute,
    actor: &Actor,
    body: &[u8],
) -> Result<(StatusCode, Value)> {
    match route {
        ApplicationRoute::Create => {
            let new: NewApplication = if body.is_empty() {
                NewApplication::default()
            } else {
                serde_json::from_slice(body)?
            };
            let app = service.submit(actor, new).await?;
            Ok((StatusCode::CREATED, application_json(&app)?))
        }
        ApplicationRoute::Get(id) => {
            let app = service.get(&id).await?;
            Ok((StatusCode::OK, application_json(&app)?))
        }
        ApplicationRoute::Hearings(id) => {
            service.get(&id).await?;
            let hearings = service.hearings(&id).await?;
            Ok((StatusCode::OK, hearings_json(&hearings)?))
        }
        ApplicationRoute::Action { id, kind } => {
            let action = parse_action(kind, body)?;
            let app = service.apply(&id, actor, action).await?;
            Ok((StatusCode::OK, application_json(&app)?))
        }
    }
}

/// Application as relaxed extended JSON plus the actions its status accepts
pub fn application_json(app: &ApplicationDoc) -> Result<Value> {
    let mut value = bson::to_bson(app)?.into_relaxed_extjson();
    if let Some(object) = value.as_object_mut() {
        object.insert(
            "allowed_actions".into(),
            json!(allowed_actions(app.status)),
        );
    }
    Ok(value)
}

fn hearings_json(hearings: &[HearingDateDoc]) -> Result<Value> {
    let rows = hearings
        .iter()
        .map(|h| Ok(bson::to_bson(h)?.into_relaxed_extjson()))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::Array(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{ApplicationStatus, Role};
    use crate::lifecycle::{MemoryApplicationStore, MemoryNotificationSink};
    use crate::logging::{AuditLogger, MemoryAuditSink};
    use std::sync::Arc;

    fn service() -> ApplicationService {
        ApplicationService::new(
            Arc::new(MemoryApplicationStore::new()),
            Arc::new(MemoryNotificationSink::new()),
            AuditLogger::new(Arc::new(MemoryAuditSink::new())),
        )
    }

    #[test]
    fn test_match_routes() {
        let id = ObjectId::new();
        let hex = id.to_hex();

        assert_eq!(
            match_application_route(&Method::POST, "/applications"),
            Some(ApplicationRoute::Create)
        );
        assert_eq!(
            match_application_route(&Method::GET, &format!("/applications/{hex}")),
            Some(ApplicationRoute::Get(id))
        );
        assert_eq!(
            match_application_route(&Method::PUT, &format!("/applications/{hex}")),
            Some(ApplicationRoute::Action {
                id,
                kind: ActionKind::Resubmit
            })
        );
        assert_eq!(
            match_application_route(&Method::POST, &format!("/applications/{hex}/mark-incomplete")),
            Some(ApplicationRoute::Action {
                id,
                kind: ActionKind::MarkIncomplete
            })
        );
        assert_eq!(
            match_application_route(&Method::GET, &format!("/applications/{hex}/hearings")),
            Some(ApplicationRoute::Hearings(id))
        );
    }

    #[test]
    fn test_unmatched_routes() {
        let hex = ObjectId::new().to_hex();
        assert!(match_application_route(&Method::GET, "/applications").is_none());
        assert!(match_application_route(&Method::POST, "/applications/not-an-id/approve").is_none());
        assert!(match_application_route(&Method::POST, &format!("/applications/{hex}/archive")).is_none());
        assert!(match_application_route(&Method::DELETE, &format!("/applications/{hex}")).is_none());
        assert!(match_application_route(&Method::GET, "/users").is_none());
    }

    #[test]
    fn test_parse_action_payloads() {
        assert_eq!(
            parse_action(ActionKind::MarkComplete, b"").unwrap(),
            LifecycleAction::MarkComplete
        );
        assert_eq!(
            parse_action(ActionKind::MarkIncomplete, br#"{"remarks":"Missing NOC"}"#).unwrap(),
            LifecycleAction::MarkIncomplete {
                remarks: "Missing NOC".into()
            }
        );

        let schedule = parse_action(
            ActionKind::Schedule,
            br#"{"hearing_date":"2030-05-01T09:00:00Z","hearing_officer_id":"officer-1"}"#,
        )
        .unwrap();
        assert!(matches!(schedule, LifecycleAction::ScheduleHearing { .. }));

        // The route decides the action, not the body
        assert_eq!(
            parse_action(ActionKind::Approve, br#"{"action":"reject"}"#).unwrap(),
            LifecycleAction::Approve { remarks: None }
        );
    }

    #[test]
    fn test_parse_action_rejects_bad_bodies() {
        assert!(matches!(
            parse_action(ActionKind::Approve, b"[1,2]"),
            Err(DocketError::BadRequest(_))
        ));
        assert!(matches!(
            parse_action(ActionKind::Schedule, br#"{"hearing_date":"tomorrow"}"#),
            Err(DocketError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_handle_create_then_guarded_action() {
        let service = service();
        let applicant = Actor::new("applicant-1", Role::Applicant);

        let (status, body) = handle(
            &service,
            ApplicationRoute::Create,
            &applicant,
            br#"{"description":{"district":"Lahore"}}"#,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "submitted");
        assert_eq!(body["description"]["district"], "Lahore");
        assert_eq!(body["allowed_actions"], json!(["mark_incomplete", "mark_complete"]));

        let id = ObjectId::parse_str(body["_id"]["$oid"].as_str().unwrap()).unwrap();
        let registrar = Actor::new("registrar-1", Role::Registrar);

        let (status, body) = handle(
            &service,
            ApplicationRoute::Action {
                id,
                kind: ActionKind::MarkIncomplete,
            },
            &registrar,
            b"{}",
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("remarks"));

        let (status, body) = handle(
            &service,
            ApplicationRoute::Action {
                id,
                kind: ActionKind::Approve,
            },
            &registrar,
            b"",
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("submitted"));

        assert_eq!(
            service.get(&id).await.unwrap().status,
            ApplicationStatus::Submitted
        );
    }

    #[tokio::test]
    async fn test_handle_unknown_application() {
        let service = service();
        let (status, _) = handle(
            &service,
            ApplicationRoute::Get(ObjectId::new()),
            &Actor::new("registrar-1", Role::Registrar),
            b"",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
