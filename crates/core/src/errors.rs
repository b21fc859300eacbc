use thiserror::Error;

use crate::domain::enrollment::{EnrollmentRequestId, EnrollmentStatus};
use crate::domain::grade::GradeId;
use crate::domain::student::StudentId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EnrollmentError {
    #[error("enrollment request {0} was not found")]
    NotFound(EnrollmentRequestId),
    #[error("enrollment request {id} is {status:?}; only pending requests can change")]
    InvalidState { id: EnrollmentRequestId, status: EnrollmentStatus },
    #[error("invalid enrollment input: {0}")]
    InvalidInput(String),
    #[error("grades already granted to the student: {grades:?}")]
    AlreadyOwned { grades: Vec<GradeId> },
    #[error("student {student_id} already has a pending enrollment request")]
    Conflict { student_id: StudentId },
    #[error("operation not permitted: {0}")]
    Forbidden(String),
}

impl EnrollmentError {
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound(_) => "This enrollment request does not exist.".to_owned(),
            Self::InvalidState { status, .. } => format!(
                "This enrollment request is already {} and can no longer be changed.",
                status.as_str()
            ),
            Self::InvalidInput(_) => "Select at least one available grade.".to_owned(),
            Self::AlreadyOwned { .. } => {
                "You are already enrolled in one of the selected grades.".to_owned()
            }
            Self::Conflict { .. } => {
                "You already have an enrollment request awaiting review.".to_owned()
            }
            Self::Forbidden(_) => "You are not allowed to perform this action.".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Enrollment(#[from] EnrollmentError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::Forbidden { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested resource does not exist.",
            Self::Conflict { .. } => "The request conflicts with the current state.",
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }

    /// Message safe to show the end user; domain errors keep their specific wording.
    pub fn user_message(&self) -> String {
        match self {
            Self::Enrollment(error) => error.user_message(),
            Self::Persistence(_) | Self::Integration(_) => {
                "The service is temporarily unavailable. Please retry shortly.".to_owned()
            }
            Self::Configuration(_) => "An unexpected internal error occurred.".to_owned(),
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Enrollment(error) => {
                let message = error.user_message();
                match error {
                    EnrollmentError::NotFound(_) => {
                        Self::NotFound { message, correlation_id: unassigned() }
                    }
                    EnrollmentError::InvalidState { .. }
                    | EnrollmentError::Conflict { .. }
                    | EnrollmentError::AlreadyOwned { .. } => {
                        Self::Conflict { message, correlation_id: unassigned() }
                    }
                    EnrollmentError::InvalidInput(_) => {
                        Self::BadRequest { message, correlation_id: unassigned() }
                    }
                    EnrollmentError::Forbidden(_) => {
                        Self::Forbidden { message, correlation_id: unassigned() }
                    }
                }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}
