use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::enrollment::EnrollmentStatus;
use crate::flows::states::{FlowAction, FlowContext, FlowEvent, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_state(&self) -> EnrollmentStatus;
    fn transition(
        &self,
        current: &EnrollmentStatus,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Lifecycle of an enrollment request: everything leaves `Pending` exactly once.
#[derive(Clone, Debug, Default)]
pub struct EnrollmentFlow;

impl FlowDefinition for EnrollmentFlow {
    fn initial_state(&self) -> EnrollmentStatus {
        EnrollmentStatus::Pending
    }

    fn transition(
        &self,
        current: &EnrollmentStatus,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_enrollment(current, event, context)
    }
}

#[derive(Clone, Debug)]
pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> EnrollmentStatus {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &EnrollmentStatus,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &EnrollmentStatus,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<EnrollmentFlow> {
    fn default() -> Self {
        Self::new(EnrollmentFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: EnrollmentStatus, event: FlowEvent },
}

fn transition_enrollment(
    current: &EnrollmentStatus,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use EnrollmentStatus::{Approved, Cancelled, Pending, Rejected};
    use FlowAction::{
        GrantGrades, MarkStudentEnrolled, NotifyStudent, RepriceLines, RestoreStudentProgress,
    };
    use FlowEvent::{ApprovalDenied, ApprovalGranted, CancelRequested, SelectionChanged};

    let (to, actions) = match (current, event) {
        (Pending, SelectionChanged) => (Pending, vec![RepriceLines]),
        (Pending, CancelRequested) => (Cancelled, vec![RestoreStudentProgress]),
        (Pending, ApprovalGranted) => {
            if context.grant_on_approval {
                (Approved, vec![GrantGrades, MarkStudentEnrolled, NotifyStudent])
            } else {
                (Approved, vec![MarkStudentEnrolled, NotifyStudent])
            }
        }
        (Pending, ApprovalDenied) => (Rejected, vec![RestoreStudentProgress, NotifyStudent]),
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}
