use serde::{Deserialize, Serialize};

use crate::domain::enrollment::EnrollmentStatus;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    SelectionChanged,
    CancelRequested,
    ApprovalGranted,
    ApprovalDenied,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub grant_on_approval: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    RepriceLines,
    GrantGrades,
    MarkStudentEnrolled,
    RestoreStudentProgress,
    NotifyStudent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: EnrollmentStatus,
    pub to: EnrollmentStatus,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}

impl TransitionOutcome {
    pub fn requires(&self, action: &FlowAction) -> bool {
        self.actions.contains(action)
    }
}
