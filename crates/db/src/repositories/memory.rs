use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use demande_core::domain::enrollment::{
    EnrollmentLine, EnrollmentRequest, EnrollmentRequestId, EnrollmentStatus,
};
use demande_core::domain::grade::{Grade, GradeId};
use demande_core::domain::student::{StudentId, StudentProgress};
use demande_core::ports::{EnrollmentStore, GradeCatalog, Resolution, StoreError};
use demande_core::pricing::total_of;

#[derive(Default)]
pub struct InMemoryGradeCatalog {
    grades: RwLock<HashMap<GradeId, Grade>>,
}

impl InMemoryGradeCatalog {
    pub fn with_grades(grades: impl IntoIterator<Item = Grade>) -> Self {
        let grades = grades.into_iter().map(|grade| (grade.id.clone(), grade)).collect();
        Self { grades: RwLock::new(grades) }
    }

    pub async fn save(&self, grade: Grade) {
        self.grades.write().await.insert(grade.id.clone(), grade);
    }
}

#[async_trait]
impl GradeCatalog for InMemoryGradeCatalog {
    async fn prices_for(&self, ids: &[GradeId]) -> Result<Vec<Grade>, StoreError> {
        let grades = self.grades.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| grades.get(id))
            .filter(|grade| grade.active)
            .cloned()
            .collect())
    }

    async fn list_grades(&self) -> Result<Vec<Grade>, StoreError> {
        let grades = self.grades.read().await;
        let mut listed: Vec<Grade> = grades.values().cloned().collect();
        listed.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(listed)
    }
}

#[derive(Default)]
struct StudentState {
    progress: Option<StudentProgress>,
    email: Option<String>,
    owned: BTreeSet<GradeId>,
}

#[derive(Default)]
struct StoreState {
    requests: HashMap<EnrollmentRequestId, EnrollmentRequest>,
    students: HashMap<StudentId, StudentState>,
}

impl StoreState {
    fn pending_for(&self, student_id: &StudentId) -> Option<&EnrollmentRequest> {
        self.requests
            .values()
            .find(|request| &request.student_id == student_id && request.is_pending())
    }
}

/// Single-lock store: every check-then-write runs under one write guard.
#[derive(Default)]
pub struct InMemoryEnrollmentStore {
    state: RwLock<StoreState>,
}

impl InMemoryEnrollmentStore {
    pub async fn register_student(&self, student_id: StudentId, email: Option<String>) {
        let mut state = self.state.write().await;
        let student = state.students.entry(student_id).or_default();
        student.email = email;
        student.progress.get_or_insert(StudentProgress::Onboarding);
    }
}

#[async_trait]
impl EnrollmentStore for InMemoryEnrollmentStore {
    async fn insert_pending(&self, request: &EnrollmentRequest) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.pending_for(&request.student_id).is_some() {
            return Err(StoreError::PendingRequestExists(request.student_id.clone()));
        }
        if state.requests.contains_key(&request.id) {
            return Err(StoreError::Backend(format!("duplicate request id {}", request.id)));
        }
        state.requests.insert(request.id.clone(), request.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &EnrollmentRequestId,
    ) -> Result<Option<EnrollmentRequest>, StoreError> {
        Ok(self.state.read().await.requests.get(id).cloned())
    }

    async fn find_pending_for_student(
        &self,
        student_id: &StudentId,
    ) -> Result<Option<EnrollmentRequest>, StoreError> {
        Ok(self.state.read().await.pending_for(student_id).cloned())
    }

    async fn list_for_student(
        &self,
        student_id: &StudentId,
    ) -> Result<Vec<EnrollmentRequest>, StoreError> {
        let state = self.state.read().await;
        let mut requests: Vec<EnrollmentRequest> = state
            .requests
            .values()
            .filter(|request| &request.student_id == student_id)
            .cloned()
            .collect();
        requests.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| right.id.0.cmp(&left.id.0))
        });
        Ok(requests)
    }

    async fn list_by_status(
        &self,
        status: EnrollmentStatus,
        limit: u32,
    ) -> Result<Vec<EnrollmentRequest>, StoreError> {
        let state = self.state.read().await;
        let mut requests: Vec<EnrollmentRequest> =
            state.requests.values().filter(|request| request.status == status).cloned().collect();
        requests.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
        });
        requests.truncate(limit as usize);
        Ok(requests)
    }

    async fn replace_lines(
        &self,
        id: &EnrollmentRequestId,
        lines: &[EnrollmentLine],
        updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let Some(request) = state.requests.get_mut(id).filter(|request| request.is_pending())
        else {
            return Ok(false);
        };

        request.lines = lines.to_vec();
        request.total_price = total_of(lines);
        request.updated_at = updated_at;
        Ok(true)
    }

    async fn resolve(
        &self,
        id: &EnrollmentRequestId,
        resolution: &Resolution,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let Some(request) = state.requests.get_mut(id).filter(|request| request.is_pending())
        else {
            return Ok(false);
        };

        request.status = resolution.status;
        request.resolved_at = Some(resolution.resolved_at);
        request.resolved_by = Some(resolution.resolved_by.clone());
        request.review_note = resolution.review_note.clone();
        request.updated_at = resolution.resolved_at;

        if resolution.grant_grades {
            let student_id = request.student_id.clone();
            let grades = request.grade_ids();
            state.students.entry(student_id).or_default().owned.extend(grades);
        }
        Ok(true)
    }

    async fn owned_grades(&self, student_id: &StudentId) -> Result<Vec<GradeId>, StoreError> {
        let state = self.state.read().await;
        let mut owned: BTreeSet<GradeId> =
            state.students.get(student_id).map(|student| student.owned.clone()).unwrap_or_default();
        owned.extend(
            state
                .requests
                .values()
                .filter(|request| {
                    &request.student_id == student_id
                        && request.status == EnrollmentStatus::Approved
                })
                .flat_map(|request| request.lines.iter().map(|line| line.grade_id.clone())),
        );
        Ok(owned.into_iter().collect())
    }

    async fn grant_grades(
        &self,
        student_id: &StudentId,
        grades: &[GradeId],
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.students.entry(student_id.clone()).or_default().owned.extend(grades.iter().cloned());
        Ok(())
    }

    async fn student_progress(
        &self,
        student_id: &StudentId,
    ) -> Result<Option<StudentProgress>, StoreError> {
        let state = self.state.read().await;
        Ok(state.students.get(student_id).and_then(|student| student.progress))
    }

    async fn set_student_progress(
        &self,
        student_id: &StudentId,
        progress: StudentProgress,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.students.entry(student_id.clone()).or_default().progress = Some(progress);
        Ok(())
    }

    async fn student_contact(&self, student_id: &StudentId) -> Result<Option<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state.students.get(student_id).and_then(|student| student.email.clone()))
    }
}
