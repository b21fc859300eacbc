use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::grade::GradeId;
use crate::domain::student::StudentId;
use crate::errors::EnrollmentError;
use crate::pricing::total_of;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnrollmentRequestId(pub String);

impl std::fmt::Display for EnrollmentRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One selected grade with the price captured when the line was written.
///
/// Later catalog price changes never reach an existing line; only an explicit
/// selection update re-prices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentLine {
    pub grade_id: GradeId,
    pub grade_name: String,
    pub grade_price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    pub id: EnrollmentRequestId,
    pub student_id: StudentId,
    pub status: EnrollmentStatus,
    pub total_price: Decimal,
    pub lines: Vec<EnrollmentLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub review_note: Option<String>,
}

impl EnrollmentRequest {
    pub fn pending(
        id: EnrollmentRequestId,
        student_id: StudentId,
        lines: Vec<EnrollmentLine>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, EnrollmentError> {
        if lines.is_empty() {
            return Err(EnrollmentError::InvalidInput(
                "an enrollment request needs at least one grade".to_owned(),
            ));
        }

        Ok(Self {
            id,
            student_id,
            status: EnrollmentStatus::Pending,
            total_price: total_of(&lines),
            lines,
            created_at,
            updated_at: created_at,
            resolved_at: None,
            resolved_by: None,
            review_note: None,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == EnrollmentStatus::Pending
    }

    pub fn grade_ids(&self) -> Vec<GradeId> {
        self.lines.iter().map(|line| line.grade_id.clone()).collect()
    }

    pub fn replace_lines(
        &mut self,
        lines: Vec<EnrollmentLine>,
        at: DateTime<Utc>,
    ) -> Result<(), EnrollmentError> {
        if !self.is_pending() {
            return Err(EnrollmentError::InvalidState { id: self.id.clone(), status: self.status });
        }
        if lines.is_empty() {
            return Err(EnrollmentError::InvalidInput(
                "an enrollment request needs at least one grade".to_owned(),
            ));
        }

        self.total_price = total_of(&lines);
        self.lines = lines;
        self.updated_at = at;
        Ok(())
    }

    pub fn can_transition_to(&self, next: EnrollmentStatus) -> bool {
        self.is_pending() && next.is_terminal()
    }

    pub fn resolve(
        &mut self,
        next: EnrollmentStatus,
        resolved_by: impl Into<String>,
        review_note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), EnrollmentError> {
        if !self.can_transition_to(next) {
            return Err(EnrollmentError::InvalidState { id: self.id.clone(), status: self.status });
        }

        self.status = next;
        self.resolved_by = Some(resolved_by.into());
        self.review_note = review_note;
        self.resolved_at = Some(at);
        self.updated_at = at;
        Ok(())
    }
}
