//! Enrollment request workflow: create, read, re-select, cancel, approve, reject.
//!
//! Every call receives an explicit [`ActorContext`]; nothing here reads ambient
//! session state. Status changes go through the [`FlowEngine`] first and are then
//! committed with a compare-and-swap in the store, so a lost race surfaces as
//! `InvalidState` instead of a double transition.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::enrollment::{EnrollmentRequest, EnrollmentRequestId, EnrollmentStatus};
use crate::domain::grade::GradeId;
use crate::domain::student::{StudentId, StudentProgress};
use crate::errors::{ApplicationError, EnrollmentError};
use crate::flows::{EnrollmentFlow, FlowAction, FlowContext, FlowEngine, FlowEvent};
use crate::notify::{Notification, NotificationOutbox};
use crate::ports::{EnrollmentStore, GradeCatalog, Resolution, StoreError};
use crate::pricing::{dedup_selection, price_selection, PricedSelection};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Student,
    Administrator,
}

impl std::str::FromStr for ActorRole {
    type Err = EnrollmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "admin" | "administrator" => Ok(Self::Administrator),
            other => Err(EnrollmentError::Forbidden(format!("unknown actor role `{other}`"))),
        }
    }
}

/// Who is calling and under which correlation id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub actor_id: String,
    pub role: ActorRole,
    pub correlation_id: String,
}

impl ActorContext {
    pub fn new(
        actor_id: impl Into<String>,
        role: ActorRole,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self { actor_id: actor_id.into(), role, correlation_id: correlation_id.into() }
    }

    pub fn student(student_id: &StudentId, correlation_id: impl Into<String>) -> Self {
        Self::new(student_id.0.clone(), ActorRole::Student, correlation_id)
    }

    pub fn administrator(actor_id: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::new(actor_id, ActorRole::Administrator, correlation_id)
    }

    pub fn is_administrator(&self) -> bool {
        self.role == ActorRole::Administrator
    }

    pub fn can_act_for(&self, student_id: &StudentId) -> bool {
        self.is_administrator() || self.actor_id == student_id.0
    }

    fn require_administrator(&self, operation: &str) -> Result<(), EnrollmentError> {
        if self.is_administrator() {
            return Ok(());
        }
        Err(EnrollmentError::Forbidden(format!("{operation} requires an administrator")))
    }

    fn require_student_scope(&self, student_id: &StudentId) -> Result<(), EnrollmentError> {
        if self.can_act_for(student_id) {
            return Ok(());
        }
        Err(EnrollmentError::Forbidden(format!(
            "actor `{}` cannot act for student `{student_id}`",
            self.actor_id
        )))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub admin_email: String,
    pub grant_on_approval: bool,
    pub pending_list_limit: u32,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            admin_email: "admin@localhost".to_owned(),
            grant_on_approval: false,
            pending_list_limit: 50,
        }
    }
}

#[derive(Clone)]
pub struct EnrollmentWorkflow {
    catalog: Arc<dyn GradeCatalog>,
    store: Arc<dyn EnrollmentStore>,
    outbox: Arc<dyn NotificationOutbox>,
    audit: Arc<dyn AuditSink>,
    engine: FlowEngine<EnrollmentFlow>,
    settings: WorkflowSettings,
}

impl EnrollmentWorkflow {
    pub fn new(
        catalog: Arc<dyn GradeCatalog>,
        store: Arc<dyn EnrollmentStore>,
        outbox: Arc<dyn NotificationOutbox>,
        audit: Arc<dyn AuditSink>,
        settings: WorkflowSettings,
    ) -> Self {
        Self { catalog, store, outbox, audit, engine: FlowEngine::default(), settings }
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub async fn create(
        &self,
        ctx: &ActorContext,
        student_id: &StudentId,
        selected: &[GradeId],
    ) -> Result<EnrollmentRequest, ApplicationError> {
        ctx.require_student_scope(student_id)?;

        let selection = dedup_selection(selected);
        if selection.is_empty() {
            return Err(EnrollmentError::InvalidInput("no grade selected".to_owned()).into());
        }

        if self.store.find_pending_for_student(student_id).await?.is_some() {
            return Err(EnrollmentError::Conflict { student_id: student_id.clone() }.into());
        }
        self.ensure_not_owned(student_id, &selection).await?;

        let priced = self.price(ctx, &selection).await?;
        let request = EnrollmentRequest::pending(
            EnrollmentRequestId(format!("DEM-{}", Uuid::new_v4().simple())),
            student_id.clone(),
            priced.lines,
            Utc::now(),
        )?;

        match self.store.insert_pending(&request).await {
            Ok(()) => {}
            Err(StoreError::PendingRequestExists(student_id)) => {
                return Err(EnrollmentError::Conflict { student_id }.into());
            }
            Err(error) => return Err(error.into()),
        }
        self.store.set_student_progress(student_id, StudentProgress::AwaitingApproval).await?;

        self.audit.emit(
            AuditEvent::from_context(
                &audit_context(ctx, &request),
                "enrollment.created",
                AuditCategory::Enrollment,
                AuditOutcome::Success,
            )
            .with_metadata("total_price", request.total_price.to_string())
            .with_metadata("line_count", request.lines.len().to_string()),
        );
        info!(
            event_name = "enrollment.created",
            correlation_id = %ctx.correlation_id,
            request_id = %request.id,
            student_id = %student_id,
            total_price = %request.total_price,
            line_count = request.lines.len(),
            "enrollment request created"
        );

        self.notify(
            ctx,
            Notification::EnrollmentSubmitted {
                request_id: request.id.clone(),
                student_id: student_id.clone(),
                recipient: self.settings.admin_email.clone(),
                lines: request.lines.clone(),
                total_price: request.total_price,
            },
        );

        Ok(request)
    }

    pub async fn get(
        &self,
        ctx: &ActorContext,
        id: &EnrollmentRequestId,
    ) -> Result<EnrollmentRequest, ApplicationError> {
        let request = self.load(id).await?;
        ctx.require_student_scope(&request.student_id)?;
        Ok(request)
    }

    pub async fn list_for_student(
        &self,
        ctx: &ActorContext,
        student_id: &StudentId,
    ) -> Result<Vec<EnrollmentRequest>, ApplicationError> {
        ctx.require_student_scope(student_id)?;
        Ok(self.store.list_for_student(student_id).await?)
    }

    pub async fn list_pending(
        &self,
        ctx: &ActorContext,
        limit: Option<u32>,
    ) -> Result<Vec<EnrollmentRequest>, ApplicationError> {
        ctx.require_administrator("listing pending requests")?;
        let limit = limit.unwrap_or(self.settings.pending_list_limit).clamp(1, 500);
        Ok(self.store.list_by_status(EnrollmentStatus::Pending, limit).await?)
    }

    pub async fn update_selection(
        &self,
        ctx: &ActorContext,
        id: &EnrollmentRequestId,
        selected: &[GradeId],
    ) -> Result<EnrollmentRequest, ApplicationError> {
        let request = self.load(id).await?;
        ctx.require_student_scope(&request.student_id)?;

        self.engine
            .apply_with_audit(
                &request.status,
                &FlowEvent::SelectionChanged,
                &self.flow_context(),
                self.audit.as_ref(),
                &audit_context(ctx, &request),
            )
            .map_err(|_| EnrollmentError::InvalidState { id: id.clone(), status: request.status })?;

        let selection = dedup_selection(selected);
        if selection.is_empty() {
            return Err(EnrollmentError::InvalidInput("no grade selected".to_owned()).into());
        }
        self.ensure_not_owned(&request.student_id, &selection).await?;

        let priced = self.price(ctx, &selection).await?;
        let now = Utc::now();
        let mut updated = request;
        updated.replace_lines(priced.lines, now)?;

        if !self.store.replace_lines(id, &updated.lines, now).await? {
            return Err(self.stale(id).await);
        }

        info!(
            event_name = "enrollment.selection_updated",
            correlation_id = %ctx.correlation_id,
            request_id = %id,
            student_id = %updated.student_id,
            total_price = %updated.total_price,
            line_count = updated.lines.len(),
            "enrollment selection updated"
        );
        Ok(updated)
    }

    /// Withdraws a pending request on behalf of its student or an administrator.
    ///
    /// A request that does not exist is `NotFound`, not `InvalidState`; only a
    /// request that exists and is no longer pending reports `InvalidState`.
    pub async fn cancel(
        &self,
        ctx: &ActorContext,
        id: &EnrollmentRequestId,
    ) -> Result<EnrollmentRequest, ApplicationError> {
        let request = self.load(id).await?;
        ctx.require_student_scope(&request.student_id)?;
        self.transition(ctx, request, FlowEvent::CancelRequested, None).await
    }

    pub async fn approve(
        &self,
        ctx: &ActorContext,
        id: &EnrollmentRequestId,
    ) -> Result<EnrollmentRequest, ApplicationError> {
        ctx.require_administrator("approving an enrollment request")?;
        let request = self.load(id).await?;
        self.transition(ctx, request, FlowEvent::ApprovalGranted, None).await
    }

    pub async fn reject(
        &self,
        ctx: &ActorContext,
        id: &EnrollmentRequestId,
        note: Option<String>,
    ) -> Result<EnrollmentRequest, ApplicationError> {
        ctx.require_administrator("rejecting an enrollment request")?;
        let request = self.load(id).await?;
        let note = note.map(|note| note.trim().to_owned()).filter(|note| !note.is_empty());
        self.transition(ctx, request, FlowEvent::ApprovalDenied, note).await
    }

    async fn transition(
        &self,
        ctx: &ActorContext,
        request: EnrollmentRequest,
        event: FlowEvent,
        note: Option<String>,
    ) -> Result<EnrollmentRequest, ApplicationError> {
        let audit = audit_context(ctx, &request);
        let outcome = self
            .engine
            .apply_with_audit(
                &request.status,
                &event,
                &self.flow_context(),
                self.audit.as_ref(),
                &audit,
            )
            .map_err(|_| EnrollmentError::InvalidState {
                id: request.id.clone(),
                status: request.status,
            })?;

        let now = Utc::now();
        let mut resolved = request;
        resolved.resolve(outcome.to, ctx.actor_id.clone(), note.clone(), now)?;

        let resolution = Resolution {
            status: outcome.to,
            resolved_by: ctx.actor_id.clone(),
            review_note: note,
            resolved_at: now,
            grant_grades: outcome.requires(&FlowAction::GrantGrades),
        };
        if !self.store.resolve(&resolved.id, &resolution).await? {
            return Err(self.stale(&resolved.id).await);
        }

        for action in &outcome.actions {
            match action {
                FlowAction::MarkStudentEnrolled => {
                    self.store
                        .set_student_progress(&resolved.student_id, StudentProgress::Enrolled)
                        .await?;
                }
                // Approved requests count as owned even when approval granted nothing.
                FlowAction::RestoreStudentProgress => {
                    let owned = self.store.owned_grades(&resolved.student_id).await?;
                    self.store
                        .set_student_progress(
                            &resolved.student_id,
                            StudentProgress::settled(!owned.is_empty()),
                        )
                        .await?;
                }
                FlowAction::NotifyStudent => self.notify_student(ctx, &resolved).await,
                FlowAction::GrantGrades | FlowAction::RepriceLines => {}
            }
        }

        let event_type = format!("enrollment.{}", resolved.status.as_str());
        self.audit.emit(
            AuditEvent::from_context(
                &audit,
                event_type.clone(),
                AuditCategory::Enrollment,
                AuditOutcome::Success,
            )
            .with_metadata("granted", resolution.grant_grades.to_string()),
        );
        info!(
            event_name = %event_type,
            correlation_id = %ctx.correlation_id,
            request_id = %resolved.id,
            student_id = %resolved.student_id,
            actor = %ctx.actor_id,
            granted = resolution.grant_grades,
            "enrollment request resolved"
        );

        Ok(resolved)
    }

    async fn load(&self, id: &EnrollmentRequestId) -> Result<EnrollmentRequest, ApplicationError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| EnrollmentError::NotFound(id.clone()).into())
    }

    /// Explains why a compare-and-swap write matched nothing.
    async fn stale(&self, id: &EnrollmentRequestId) -> ApplicationError {
        match self.store.find_by_id(id).await {
            Ok(Some(current)) => {
                EnrollmentError::InvalidState { id: id.clone(), status: current.status }.into()
            }
            Ok(None) => EnrollmentError::NotFound(id.clone()).into(),
            Err(error) => error.into(),
        }
    }

    async fn ensure_not_owned(
        &self,
        student_id: &StudentId,
        selection: &[GradeId],
    ) -> Result<(), ApplicationError> {
        let owned = self.store.owned_grades(student_id).await?;
        let clashing: Vec<GradeId> =
            selection.iter().filter(|grade| owned.contains(grade)).cloned().collect();
        if clashing.is_empty() {
            return Ok(());
        }
        Err(EnrollmentError::AlreadyOwned { grades: clashing }.into())
    }

    async fn price(
        &self,
        ctx: &ActorContext,
        selection: &[GradeId],
    ) -> Result<PricedSelection, ApplicationError> {
        let grades = self.catalog.prices_for(selection).await?;
        let priced = price_selection(selection, &grades);

        if !priced.dropped.is_empty() {
            let dropped =
                priced.dropped.iter().map(|id| id.0.as_str()).collect::<Vec<_>>().join(",");
            debug!(
                event_name = "enrollment.pricing.unknown_grades_dropped",
                correlation_id = %ctx.correlation_id,
                dropped = %dropped,
                "selected grades missing from catalog were dropped"
            );
        }
        if priced.is_empty() {
            return Err(EnrollmentError::InvalidInput(
                "none of the selected grades exist in the catalog".to_owned(),
            )
            .into());
        }
        Ok(priced)
    }

    fn flow_context(&self) -> FlowContext {
        FlowContext { grant_on_approval: self.settings.grant_on_approval }
    }

    fn notify(&self, ctx: &ActorContext, notification: Notification) {
        if let Err(error) = self.outbox.enqueue(notification) {
            warn!(
                event_name = "enrollment.notification.enqueue_failed",
                correlation_id = %ctx.correlation_id,
                error = %error,
                "could not enqueue enrollment notification"
            );
        }
    }

    async fn notify_student(&self, ctx: &ActorContext, request: &EnrollmentRequest) {
        let recipient = match self.store.student_contact(&request.student_id).await {
            Ok(Some(recipient)) => recipient,
            Ok(None) => return,
            Err(error) => {
                warn!(
                    event_name = "enrollment.notification.contact_lookup_failed",
                    correlation_id = %ctx.correlation_id,
                    request_id = %request.id,
                    error = %error,
                    "could not look up student contact"
                );
                return;
            }
        };

        self.notify(
            ctx,
            Notification::EnrollmentDecided {
                request_id: request.id.clone(),
                student_id: request.student_id.clone(),
                recipient,
                status: request.status,
                review_note: request.review_note.clone(),
            },
        );
    }
}

fn audit_context(ctx: &ActorContext, request: &EnrollmentRequest) -> AuditContext {
    AuditContext::new(
        Some(request.id.clone()),
        Some(request.student_id.clone()),
        ctx.correlation_id.clone(),
        ctx.actor_id.clone(),
    )
}
