//! Application lifecycle state machine
//!
//! Pure functions from (application, actor, action, clock) to a `Transition`:
//! the next application state plus the side effects a store commits with it.
//! Nothing here touches a database.
//!
//! ```text
//! submitted ──mark_incomplete──▶ incomplete ──resubmit──▶ submitted
//! submitted ──mark_complete────▶ complete ──schedule_hearing──▶ hearing_scheduled
//! hearing_scheduled ──start_hearing──▶ under_hearing ──adjourn──▶ hearing_scheduled
//! under_hearing ──set_violation──▶ under_hearing
//! under_hearing ──approve──▶ approved_resolved   (terminal)
//! under_hearing ──reject───▶ rejected_closed     (terminal)
//! ```

use bson::{doc, oid::ObjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::schemas::{
    ApplicationDescription, ApplicationDoc, ApplicationStatus, AuditLogEntry, HearingDateDoc,
    NotificationDoc, Role, ViolationFinding,
};
use crate::types::{DocketError, Result};

/// Entity type written to audit entries
pub const AUDIT_ENTITY: &str = "application";

// ============================================================================
// Actors and actions
// ============================================================================

/// Who is acting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    /// Scheduled jobs inside the service
    pub fn system() -> Self {
        Self::new("system", Role::System)
    }

    fn is_any(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }
}

/// A lifecycle action with its payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LifecycleAction {
    /// Applicant edits and resubmits an incomplete application
    Resubmit { description: ApplicationDescription },
    MarkIncomplete {
        /// Missing remarks are a validation failure, not a decode failure
        #[serde(default)]
        remarks: String,
    },
    MarkComplete,
    ScheduleHearing {
        hearing_date: DateTime<Utc>,
        #[serde(default)]
        hearing_officer_id: Option<String>,
    },
    /// Explicit officer action, or implicit on hearing date arrival
    StartHearing,
    Adjourn {
        hearing_date: DateTime<Utc>,
        #[serde(default)]
        reason: Option<String>,
    },
    SetViolation {
        violation_type_ids: Vec<String>,
        #[serde(default)]
        remarks: Option<String>,
    },
    Approve {
        #[serde(default)]
        remarks: Option<String>,
    },
    Reject {
        #[serde(default)]
        remarks: Option<String>,
    },
}

impl LifecycleAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Resubmit { .. } => "resubmit",
            Self::MarkIncomplete { .. } => "mark_incomplete",
            Self::MarkComplete => "mark_complete",
            Self::ScheduleHearing { .. } => "schedule_hearing",
            Self::StartHearing => "start_hearing",
            Self::Adjourn { .. } => "adjourn",
            Self::SetViolation { .. } => "set_violation",
            Self::Approve { .. } => "approve",
            Self::Reject { .. } => "reject",
        }
    }

    /// Status the application must be in
    fn required_status(&self) -> ApplicationStatus {
        match self {
            Self::Resubmit { .. } => ApplicationStatus::Incomplete,
            Self::MarkIncomplete { .. } | Self::MarkComplete => ApplicationStatus::Submitted,
            Self::ScheduleHearing { .. } => ApplicationStatus::Complete,
            Self::StartHearing => ApplicationStatus::HearingScheduled,
            Self::Adjourn { .. }
            | Self::SetViolation { .. }
            | Self::Approve { .. }
            | Self::Reject { .. } => ApplicationStatus::UnderHearing,
        }
    }

    /// Roles allowed to perform the action (resubmit is ownership-gated instead)
    fn permitted_roles(&self) -> &'static [Role] {
        match self {
            Self::Resubmit { .. } => &[Role::Applicant],
            Self::MarkIncomplete { .. } | Self::MarkComplete | Self::ScheduleHearing { .. } => {
                &[Role::Registrar, Role::Admin]
            }
            Self::StartHearing => &[Role::HearingOfficer, Role::Admin, Role::System],
            Self::Adjourn { .. }
            | Self::SetViolation { .. }
            | Self::Approve { .. }
            | Self::Reject { .. } => &[Role::HearingOfficer, Role::Admin],
        }
    }
}

/// Action names accepted in a status
pub fn allowed_actions(status: ApplicationStatus) -> &'static [&'static str] {
    match status {
        ApplicationStatus::Submitted => &["mark_incomplete", "mark_complete"],
        ApplicationStatus::Incomplete => &["resubmit"],
        ApplicationStatus::Complete => &["schedule_hearing"],
        ApplicationStatus::HearingScheduled => &["start_hearing"],
        ApplicationStatus::UnderHearing => &["adjourn", "set_violation", "approve", "reject"],
        ApplicationStatus::ApprovedResolved | ApplicationStatus::RejectedClosed => &[],
    }
}

// ============================================================================
// Transitions
// ============================================================================

/// Payload of a new submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewApplication {
    pub description: ApplicationDescription,
}

/// Result of a successful transition
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Status before the action
    pub from: ApplicationStatus,
    /// Next application state, `revision` still at the value it was read with
    pub application: ApplicationDoc,
    /// Hearing row to activate; every other active row for the application
    /// is deactivated in the same commit
    pub hearing: Option<HearingDateDoc>,
    pub notifications: Vec<NotificationDoc>,
    pub audit: AuditLogEntry,
}

/// Create a fresh `submitted` application
pub fn submit(actor: &Actor, new: NewApplication, now: DateTime<Utc>) -> Result<Transition> {
    if actor.role != Role::Applicant {
        return Err(DocketError::Forbidden(format!(
            "role '{}' cannot submit applications",
            actor.role
        )));
    }

    let id = ObjectId::new();
    let stamp = bson::DateTime::from_chrono(now);
    let tracking_id = generate_tracking_id(now);

    let application = ApplicationDoc {
        _id: Some(id),
        tracking_id: tracking_id.clone(),
        applicant_id: actor.user_id.clone(),
        status: ApplicationStatus::Submitted,
        description: new.description,
        created_at: Some(stamp),
        updated_at: Some(stamp),
        ..Default::default()
    };

    let notifications = vec![NotificationDoc::new(
        actor.user_id.clone(),
        Some(id),
        "Application submitted",
        format!("Your application {} has been received", tracking_id),
    )];

    let audit = AuditLogEntry::new(actor.user_id.clone(), AUDIT_ENTITY, id.to_hex(), "submit")
        .with_details(doc! { "tracking_id": tracking_id.as_str() })
        .at(stamp);

    Ok(Transition {
        from: ApplicationStatus::Submitted,
        application,
        hearing: None,
        notifications,
        audit,
    })
}

/// Apply `action` to `app` on behalf of `actor`
///
/// Guard failures are returned without any change: terminal statuses reject
/// everything, the status must match the action, the actor's role (or
/// ownership, for resubmission) must permit it, and the payload must be valid.
pub fn apply(
    app: &ApplicationDoc,
    actor: &Actor,
    action: LifecycleAction,
    now: DateTime<Utc>,
) -> Result<Transition> {
    let name = action.name();

    if app.status.is_terminal() || app.is_closed() {
        return Err(DocketError::invalid_transition(
            app.status,
            name,
            "the application is closed",
        ));
    }

    let required = action.required_status();
    if app.status != required {
        return Err(DocketError::invalid_transition(
            app.status,
            name,
            format!("only allowed from '{}'", required),
        ));
    }

    check_actor(app, actor, &action)?;

    let id = app
        ._id
        .ok_or_else(|| DocketError::Internal("application has no id".into()))?;
    let stamp = bson::DateTime::from_chrono(now);

    let mut next = app.clone();
    next.updated_at = Some(stamp);
    let mut hearing = None;
    let mut notifications = Vec::new();
    let mut details = doc! {};

    match action {
        LifecycleAction::Resubmit { description } => {
            next.status = ApplicationStatus::Submitted;
            next.description = description;
            next.incomplete_reason = None;
            if let Some(registrar) = &app.registrar_id {
                notifications.push(notice(
                    registrar,
                    id,
                    "Application resubmitted",
                    format!("Application {} was resubmitted", app.tracking_id),
                ));
            }
        }
        LifecycleAction::MarkIncomplete { remarks } => {
            let remarks = required_text(&remarks, "remarks are required")?;
            next.status = ApplicationStatus::Incomplete;
            next.incomplete_reason = Some(remarks.clone());
            next.registrar_id = Some(actor.user_id.clone());
            details.insert("remarks", remarks.as_str());
            notifications.push(notice(
                &app.applicant_id,
                id,
                "Application incomplete",
                format!("Application {} needs changes: {}", app.tracking_id, remarks),
            ));
        }
        LifecycleAction::MarkComplete => {
            next.status = ApplicationStatus::Complete;
            next.incomplete_reason = None;
            next.registrar_id = Some(actor.user_id.clone());
            notifications.push(notice(
                &app.applicant_id,
                id,
                "Application complete",
                format!("Application {} passed completeness review", app.tracking_id),
            ));
        }
        LifecycleAction::ScheduleHearing {
            hearing_date,
            hearing_officer_id,
        } => {
            future_date(hearing_date, now)?;
            next.status = ApplicationStatus::HearingScheduled;
            if hearing_officer_id.is_some() {
                next.hearing_officer_id = hearing_officer_id;
            }
            let date = bson::DateTime::from_chrono(hearing_date);
            hearing = Some(HearingDateDoc::active(id, date, actor.user_id.clone(), None));
            details.insert("hearing_date", date);

            let message = format!(
                "Hearing for application {} scheduled on {}",
                app.tracking_id,
                hearing_date.format("%Y-%m-%d %H:%M UTC")
            );
            notifications.push(notice(&app.applicant_id, id, "Hearing scheduled", message.clone()));
            if let Some(officer) = &next.hearing_officer_id {
                notifications.push(notice(officer, id, "Hearing assigned", message));
            }
        }
        LifecycleAction::StartHearing => {
            next.status = ApplicationStatus::UnderHearing;
        }
        LifecycleAction::Adjourn {
            hearing_date,
            reason,
        } => {
            future_date(hearing_date, now)?;
            next.status = ApplicationStatus::HearingScheduled;
            let date = bson::DateTime::from_chrono(hearing_date);
            if let Some(reason) = &reason {
                details.insert("reason", reason.as_str());
            }
            details.insert("hearing_date", date);
            hearing = Some(HearingDateDoc::active(id, date, actor.user_id.clone(), reason));
            notifications.push(notice(
                &app.applicant_id,
                id,
                "Hearing adjourned",
                format!(
                    "Hearing for application {} adjourned to {}",
                    app.tracking_id,
                    hearing_date.format("%Y-%m-%d %H:%M UTC")
                ),
            ));
        }
        LifecycleAction::SetViolation {
            violation_type_ids,
            remarks,
        } => {
            let ids: Vec<String> = violation_type_ids
                .into_iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect();
            if ids.is_empty() {
                return Err(DocketError::Validation(
                    "at least one violation type is required".into(),
                ));
            }
            details.insert("violation_type_ids", ids.clone());
            next.violation = Some(ViolationFinding {
                violation_type_ids: ids,
                remarks,
                recorded_by: actor.user_id.clone(),
                recorded_at: stamp,
            });
        }
        LifecycleAction::Approve { remarks } => {
            if app.violation.is_none() {
                return Err(DocketError::invalid_transition(
                    app.status,
                    name,
                    "no violation finding has been recorded",
                ));
            }
            close(&mut next, ApplicationStatus::ApprovedResolved, actor, remarks, stamp);
            notifications.push(notice(
                &app.applicant_id,
                id,
                "Application resolved",
                format!("Application {} was approved", app.tracking_id),
            ));
        }
        LifecycleAction::Reject { remarks } => {
            close(&mut next, ApplicationStatus::RejectedClosed, actor, remarks, stamp);
            notifications.push(notice(
                &app.applicant_id,
                id,
                "Application rejected",
                format!("Application {} was rejected", app.tracking_id),
            ));
        }
    }

    details.insert("from", app.status.as_str());
    details.insert("to", next.status.as_str());
    let audit = AuditLogEntry::new(actor.user_id.clone(), AUDIT_ENTITY, id.to_hex(), name)
        .with_details(details)
        .at(stamp);

    Ok(Transition {
        from: app.status,
        application: next,
        hearing,
        notifications,
        audit,
    })
}

fn check_actor(app: &ApplicationDoc, actor: &Actor, action: &LifecycleAction) -> Result<()> {
    if matches!(action, LifecycleAction::Resubmit { .. }) {
        if actor.role == Role::Applicant && actor.user_id == app.applicant_id {
            return Ok(());
        }
        return Err(DocketError::Forbidden(
            "only the owning applicant may resubmit".into(),
        ));
    }

    if actor.is_any(action.permitted_roles()) {
        Ok(())
    } else {
        Err(DocketError::Forbidden(format!(
            "role '{}' cannot {}",
            actor.role,
            action.name()
        )))
    }
}

fn close(
    next: &mut ApplicationDoc,
    status: ApplicationStatus,
    actor: &Actor,
    remarks: Option<String>,
    stamp: bson::DateTime,
) {
    next.status = status;
    next.resolution_remarks = remarks;
    next.closed_at = Some(stamp);
    next.closed_by = Some(actor.user_id.clone());
}

fn required_text(value: &str, message: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DocketError::Validation(message.to_string()));
    }
    Ok(trimmed.to_string())
}

fn future_date(hearing_date: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
    if hearing_date < now {
        return Err(DocketError::Validation(format!(
            "hearing date {} is in the past",
            hearing_date.to_rfc3339()
        )));
    }
    Ok(())
}

fn notice(recipient: &str, application_id: ObjectId, title: &str, message: String) -> NotificationDoc {
    NotificationDoc::new(recipient.to_string(), Some(application_id), title, message)
}

/// `APP-YYYYMMDD-XXXXXXXX`, unique via the random suffix
pub fn generate_tracking_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "APP-{}-{}",
        now.format("%Y%m%d"),
        suffix[..8].to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn applicant() -> Actor {
        Actor::new("applicant-1", Role::Applicant)
    }

    fn registrar() -> Actor {
        Actor::new("registrar-1", Role::Registrar)
    }

    fn officer() -> Actor {
        Actor::new("officer-1", Role::HearingOfficer)
    }

    fn submitted(now: DateTime<Utc>) -> ApplicationDoc {
        submit(&applicant(), NewApplication::default(), now)
            .unwrap()
            .application
    }

    fn step(app: &ApplicationDoc, actor: &Actor, action: LifecycleAction, now: DateTime<Utc>) -> ApplicationDoc {
        apply(app, actor, action, now).unwrap().application
    }

    fn under_hearing(now: DateTime<Utc>) -> ApplicationDoc {
        let app = submitted(now);
        let app = step(&app, &registrar(), LifecycleAction::MarkComplete, now);
        let app = step(
            &app,
            &registrar(),
            LifecycleAction::ScheduleHearing {
                hearing_date: now + Duration::days(7),
                hearing_officer_id: Some("officer-1".into()),
            },
            now,
        );
        step(&app, &officer(), LifecycleAction::StartHearing, now)
    }

    #[test]
    fn test_submit_creates_submitted_application() {
        let now = Utc::now();
        let transition = submit(&applicant(), NewApplication::default(), now).unwrap();
        let app = &transition.application;

        assert_eq!(app.status, ApplicationStatus::Submitted);
        assert_eq!(app.applicant_id, "applicant-1");
        assert!(app.tracking_id.starts_with("APP-"));
        assert_eq!(app.revision, 0);
        assert_eq!(transition.notifications.len(), 1);
        assert_eq!(transition.audit.action, "submit");
    }

    #[test]
    fn test_tracking_id_format() {
        let now = chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 3, 9, 12, 0, 0).unwrap();
        let a = generate_tracking_id(now);
        let b = generate_tracking_id(now);

        assert!(a.starts_with("APP-20260309-"));
        assert_eq!(a.len(), "APP-20260309-".len() + 8);
        assert!(a[13..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_staff_cannot_submit() {
        assert!(matches!(
            submit(&registrar(), NewApplication::default(), Utc::now()),
            Err(DocketError::Forbidden(_))
        ));
    }

    #[test]
    fn test_mark_incomplete_requires_remarks() {
        let now = Utc::now();
        let app = submitted(now);

        let err = apply(
            &app,
            &registrar(),
            LifecycleAction::MarkIncomplete { remarks: "   ".into() },
            now,
        )
        .unwrap_err();
        assert!(matches!(err, DocketError::Validation(_)));

        let next = step(
            &app,
            &registrar(),
            LifecycleAction::MarkIncomplete {
                remarks: "Missing site plan".into(),
            },
            now,
        );
        assert_eq!(next.status, ApplicationStatus::Incomplete);
        assert_eq!(next.incomplete_reason.as_deref(), Some("Missing site plan"));
    }

    #[test]
    fn test_resubmit_only_by_owner_and_clears_reason() {
        let now = Utc::now();
        let app = step(
            &submitted(now),
            &registrar(),
            LifecycleAction::MarkIncomplete {
                remarks: "Missing site plan".into(),
            },
            now,
        );

        let resubmit = LifecycleAction::Resubmit {
            description: ApplicationDescription {
                district: Some("Lahore".into()),
                ..Default::default()
            },
        };

        let stranger = Actor::new("applicant-2", Role::Applicant);
        assert!(matches!(
            apply(&app, &stranger, resubmit.clone(), now),
            Err(DocketError::Forbidden(_))
        ));
        assert!(matches!(
            apply(&app, &registrar(), resubmit.clone(), now),
            Err(DocketError::Forbidden(_))
        ));

        let next = step(&app, &applicant(), resubmit, now);
        assert_eq!(next.status, ApplicationStatus::Submitted);
        assert_eq!(next.incomplete_reason, None);
        assert_eq!(next.description.district.as_deref(), Some("Lahore"));
    }

    #[test]
    fn test_wrong_status_is_invalid_transition() {
        let now = Utc::now();
        let app = submitted(now);

        let err = apply(&app, &officer(), LifecycleAction::Approve { remarks: None }, now).unwrap_err();
        match err {
            DocketError::InvalidTransition { status, action, .. } => {
                assert_eq!(status, "submitted");
                assert_eq!(action, "approve");
            }
            other => panic!("Expected InvalidTransition, got {other:?}"),
        }
    }

    #[test]
    fn test_registrar_actions_are_role_gated() {
        let now = Utc::now();
        let app = submitted(now);
        assert!(matches!(
            apply(&app, &officer(), LifecycleAction::MarkComplete, now),
            Err(DocketError::Forbidden(_))
        ));
        let admin = Actor::new("admin-1", Role::Admin);
        assert!(apply(&app, &admin, LifecycleAction::MarkComplete, now).is_ok());
    }

    #[test]
    fn test_schedule_produces_active_hearing_row() {
        let now = Utc::now();
        let app = step(&submitted(now), &registrar(), LifecycleAction::MarkComplete, now);

        let past = apply(
            &app,
            &registrar(),
            LifecycleAction::ScheduleHearing {
                hearing_date: now - Duration::days(1),
                hearing_officer_id: None,
            },
            now,
        );
        assert!(matches!(past, Err(DocketError::Validation(_))));

        let transition = apply(
            &app,
            &registrar(),
            LifecycleAction::ScheduleHearing {
                hearing_date: now + Duration::days(3),
                hearing_officer_id: Some("officer-1".into()),
            },
            now,
        )
        .unwrap();

        assert_eq!(transition.application.status, ApplicationStatus::HearingScheduled);
        assert_eq!(transition.application.hearing_officer_id.as_deref(), Some("officer-1"));
        let hearing = transition.hearing.unwrap();
        assert!(hearing.is_active);
        assert_eq!(Some(hearing.application_id), app._id);
        assert_eq!(transition.notifications.len(), 2);
    }

    #[test]
    fn test_system_may_start_hearing_but_not_adjourn() {
        let now = Utc::now();
        let app = under_hearing(now);
        assert_eq!(app.status, ApplicationStatus::UnderHearing);

        let adjourn = LifecycleAction::Adjourn {
            hearing_date: now + Duration::days(14),
            reason: Some("Applicant unwell".into()),
        };
        assert!(matches!(
            apply(&app, &Actor::system(), adjourn.clone(), now),
            Err(DocketError::Forbidden(_))
        ));

        let transition = apply(&app, &officer(), adjourn, now).unwrap();
        assert_eq!(transition.application.status, ApplicationStatus::HearingScheduled);
        assert_eq!(
            transition.hearing.unwrap().reason.as_deref(),
            Some("Applicant unwell")
        );
    }

    #[test]
    fn test_approve_requires_violation_finding() {
        let now = Utc::now();
        let app = under_hearing(now);

        let err = apply(&app, &officer(), LifecycleAction::Approve { remarks: None }, now).unwrap_err();
        assert!(matches!(err, DocketError::InvalidTransition { .. }));

        let empty = apply(
            &app,
            &officer(),
            LifecycleAction::SetViolation {
                violation_type_ids: vec![" ".into()],
                remarks: None,
            },
            now,
        );
        assert!(matches!(empty, Err(DocketError::Validation(_))));

        let app = step(
            &app,
            &officer(),
            LifecycleAction::SetViolation {
                violation_type_ids: vec!["vt-1".into()],
                remarks: Some("Setback breach".into()),
            },
            now,
        );
        assert_eq!(app.status, ApplicationStatus::UnderHearing);

        let closed = step(
            &app,
            &officer(),
            LifecycleAction::Approve {
                remarks: Some("Fine paid".into()),
            },
            now,
        );
        assert_eq!(closed.status, ApplicationStatus::ApprovedResolved);
        assert_eq!(closed.closed_by.as_deref(), Some("officer-1"));
        assert!(closed.closed_at.is_some());
    }

    #[test]
    fn test_terminal_status_rejects_everything() {
        let now = Utc::now();
        let closed = step(
            &under_hearing(now),
            &officer(),
            LifecycleAction::Reject { remarks: None },
            now,
        );
        assert_eq!(closed.status, ApplicationStatus::RejectedClosed);
        assert!(allowed_actions(closed.status).is_empty());

        let attempts = vec![
            LifecycleAction::Approve { remarks: None },
            LifecycleAction::Reject { remarks: None },
            LifecycleAction::MarkComplete,
            LifecycleAction::StartHearing,
        ];
        for action in attempts {
            let admin = Actor::new("admin-1", Role::Admin);
            assert!(matches!(
                apply(&closed, &admin, action, now),
                Err(DocketError::InvalidTransition { .. })
            ));
        }
    }

    #[test]
    fn test_allowed_actions_match_required_status() {
        for status in ApplicationStatus::ALL {
            for name in allowed_actions(status) {
                assert!(!name.is_empty(), "{status} lists an empty action");
            }
        }
        assert_eq!(
            allowed_actions(ApplicationStatus::UnderHearing),
            &["adjourn", "set_violation", "approve", "reject"]
        );
    }

    #[test]
    fn test_action_payload_wire_format() {
        let action: LifecycleAction = serde_json::from_value(serde_json::json!({
            "action": "mark_incomplete",
            "remarks": "Missing NOC"
        }))
        .unwrap();
        assert_eq!(
            action,
            LifecycleAction::MarkIncomplete {
                remarks: "Missing NOC".into()
            }
        );
    }
}
