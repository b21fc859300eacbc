use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::enrollment::EnrollmentRequestId;
use crate::domain::student::StudentId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Enrollment,
    Flow,
    Pricing,
    Notification,
    Persistence,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub request_id: Option<EnrollmentRequestId>,
    pub student_id: Option<StudentId>,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        request_id: Option<EnrollmentRequestId>,
        student_id: Option<StudentId>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            request_id,
            student_id,
            correlation_id: correlation_id.into(),
            actor: actor.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub request_id: Option<EnrollmentRequestId>,
    pub student_id: Option<StudentId>,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        request_id: Option<EnrollmentRequestId>,
        student_id: Option<StudentId>,
        correlation_id: impl Into<String>,
        event_type: impl Into<String>,
        category: AuditCategory,
        actor: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            request_id,
            student_id,
            correlation_id: correlation_id.into(),
            event_type: event_type.into(),
            category,
            actor: actor.into(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn from_context(
        context: &AuditContext,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> Self {
        Self::new(
            context.request_id.clone(),
            context.student_id.clone(),
            context.correlation_id.clone(),
            event_type,
            category,
            context.actor.clone(),
            outcome,
        )
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Forwards audit events to the structured log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let request_id = event.request_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown");
        let student_id = event.student_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown");
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();

        tracing::info!(
            event_name = %event.event_type,
            correlation_id = %event.correlation_id,
            request_id = %request_id,
            student_id = %student_id,
            actor = %event.actor,
            category = ?event.category,
            outcome = ?event.outcome,
            metadata = %metadata,
            "audit event recorded"
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        audit::{
            AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
        },
        domain::{enrollment::EnrollmentRequestId, student::StudentId},
    };

    #[test]
    fn in_memory_sink_records_events_with_correlation_fields() {
        let sink = InMemoryAuditSink::default();
        sink.emit(
            AuditEvent::new(
                Some(EnrollmentRequestId("DEM-2026-0042".to_owned())),
                Some(StudentId("stu-7".to_owned())),
                "req-123",
                "enrollment.created",
                AuditCategory::Enrollment,
                "stu-7",
                AuditOutcome::Success,
            )
            .with_metadata("total_price", "250"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "req-123");
        assert_eq!(events[0].student_id.as_ref().map(|id| id.0.as_str()), Some("stu-7"));
        assert_eq!(
            events[0].request_id.as_ref().map(|id| id.0.as_str()),
            Some("DEM-2026-0042")
        );
        assert!(events[0].metadata.contains_key("total_price"));
    }

    #[test]
    fn events_built_from_context_copy_identifiers() {
        let context = AuditContext::new(
            Some(EnrollmentRequestId("DEM-1".to_owned())),
            None,
            "req-9",
            "admin-1",
        );
        let event = AuditEvent::from_context(
            &context,
            "enrollment.approved",
            AuditCategory::Enrollment,
            AuditOutcome::Success,
        );

        assert_eq!(event.request_id, context.request_id);
        assert_eq!(event.actor, "admin-1");
        assert_eq!(event.correlation_id, "req-9");
        assert!(event.student_id.is_none());
    }
}
