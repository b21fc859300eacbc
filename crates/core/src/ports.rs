//! Storage and catalog boundaries the enrollment workflow runs against.
//!
//! Adapters live in `demande-db` (SQLite and in-memory). Both adapters close the
//! "one pending request per student" rule and every status change at the
//! storage layer, so the workflow never relies on a read-then-write check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::enrollment::{
    EnrollmentLine, EnrollmentRequest, EnrollmentRequestId, EnrollmentStatus,
};
use crate::domain::grade::{Grade, GradeId};
use crate::domain::student::{StudentId, StudentProgress};
use crate::errors::ApplicationError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("student {0} already has a pending enrollment request")]
    PendingRequestExists(StudentId),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        Self::Persistence(value.to_string())
    }
}

#[async_trait]
pub trait GradeCatalog: Send + Sync {
    /// Returns the active grades among `ids`; unknown ids are omitted, not errors.
    async fn prices_for(&self, ids: &[GradeId]) -> Result<Vec<Grade>, StoreError>;
    async fn list_grades(&self) -> Result<Vec<Grade>, StoreError>;
}

/// Terminal decision applied to a pending request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub status: EnrollmentStatus,
    pub resolved_by: String,
    pub review_note: Option<String>,
    pub resolved_at: DateTime<Utc>,
    /// Grant the request's grades to the student in the same unit of work.
    pub grant_grades: bool,
}

#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// Inserts a pending request; fails with `PendingRequestExists` when the
    /// student already holds one.
    async fn insert_pending(&self, request: &EnrollmentRequest) -> Result<(), StoreError>;

    async fn find_by_id(
        &self,
        id: &EnrollmentRequestId,
    ) -> Result<Option<EnrollmentRequest>, StoreError>;

    async fn find_pending_for_student(
        &self,
        student_id: &StudentId,
    ) -> Result<Option<EnrollmentRequest>, StoreError>;

    /// Newest first.
    async fn list_for_student(
        &self,
        student_id: &StudentId,
    ) -> Result<Vec<EnrollmentRequest>, StoreError>;

    /// Oldest first.
    async fn list_by_status(
        &self,
        status: EnrollmentStatus,
        limit: u32,
    ) -> Result<Vec<EnrollmentRequest>, StoreError>;

    /// Swaps the line set of a request that is still pending. Returns `false`
    /// when the request is missing or no longer pending.
    async fn replace_lines(
        &self,
        id: &EnrollmentRequestId,
        lines: &[EnrollmentLine],
        updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Moves a pending request to a terminal status. Returns `false` when the
    /// request is missing or no longer pending.
    async fn resolve(
        &self,
        id: &EnrollmentRequestId,
        resolution: &Resolution,
    ) -> Result<bool, StoreError>;

    /// Grades the student holds: explicit grants plus every grade on an
    /// approved request, whether or not approval granted them.
    async fn owned_grades(&self, student_id: &StudentId) -> Result<Vec<GradeId>, StoreError>;

    async fn grant_grades(
        &self,
        student_id: &StudentId,
        grades: &[GradeId],
    ) -> Result<(), StoreError>;

    async fn student_progress(
        &self,
        student_id: &StudentId,
    ) -> Result<Option<StudentProgress>, StoreError>;

    async fn set_student_progress(
        &self,
        student_id: &StudentId,
        progress: StudentProgress,
    ) -> Result<(), StoreError>;

    /// Email address on file for the student, if any.
    async fn student_contact(&self, student_id: &StudentId) -> Result<Option<String>, StoreError>;
}
