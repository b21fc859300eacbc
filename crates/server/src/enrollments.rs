//! JSON routes for the enrollment request lifecycle.
//!
//! - `POST /api/v1/enrollments`                      create a pending request
//! - `GET  /api/v1/enrollments/{id}`                 read one request
//! - `PUT  /api/v1/enrollments/{id}/selection`       replace the selected grades
//! - `POST /api/v1/enrollments/{id}/cancel`          student withdraws
//! - `POST /api/v1/enrollments/{id}/approve`         administrator approves
//! - `POST /api/v1/enrollments/{id}/reject`          administrator rejects
//! - `GET  /api/v1/students/{id}/enrollments`        history for a student
//! - `GET  /api/v1/admin/enrollments/pending`        review queue
//!
//! The caller is identified by the `x-actor-id` and `x-actor-role` headers set
//! by the fronting gateway.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use demande_core::domain::enrollment::{EnrollmentRequest, EnrollmentRequestId};
use demande_core::domain::grade::GradeId;
use demande_core::domain::student::StudentId;
use demande_core::errors::{ApplicationError, EnrollmentError, InterfaceError};
use demande_core::workflow::{ActorContext, ActorRole, EnrollmentWorkflow};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct EnrollmentState {
    workflow: EnrollmentWorkflow,
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateEnrollmentRequest {
    /// Defaults to the calling student.
    pub student_id: Option<String>,
    pub grade_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSelectionRequest {
    pub grade_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectEnrollmentRequest {
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentResponse {
    pub success: bool,
    pub message: String,
    pub request: EnrollmentRequest,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentListResponse {
    pub success: bool,
    pub count: usize,
    pub requests: Vec<EnrollmentRequest>,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentApiError {
    pub success: bool,
    pub error: &'static str,
    pub message: String,
    pub correlation_id: String,
}

type ApiFailure = (StatusCode, Json<EnrollmentApiError>);

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(workflow: EnrollmentWorkflow) -> Router {
    Router::new()
        .route("/api/v1/enrollments", post(create_enrollment))
        .route("/api/v1/enrollments/{id}", get(get_enrollment))
        .route("/api/v1/enrollments/{id}/selection", put(update_selection))
        .route("/api/v1/enrollments/{id}/cancel", post(cancel_enrollment))
        .route("/api/v1/enrollments/{id}/approve", post(approve_enrollment))
        .route("/api/v1/enrollments/{id}/reject", post(reject_enrollment))
        .route("/api/v1/students/{id}/enrollments", get(list_student_enrollments))
        .route("/api/v1/admin/enrollments/pending", get(list_pending_enrollments))
        .with_state(EnrollmentState { workflow })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn create_enrollment(
    State(state): State<EnrollmentState>,
    headers: HeaderMap,
    Json(body): Json<CreateEnrollmentRequest>,
) -> Result<(StatusCode, Json<EnrollmentResponse>), ApiFailure> {
    let ctx = actor_context(&headers)?;
    let student_id = StudentId(body.student_id.unwrap_or_else(|| ctx.actor_id.clone()));
    let selection = grade_ids(body.grade_ids);

    let request = state
        .workflow
        .create(&ctx, &student_id, &selection)
        .await
        .map_err(|error| failure(error, &ctx.correlation_id))?;

    Ok((StatusCode::CREATED, respond("Enrollment request submitted for review.", request)))
}

pub async fn get_enrollment(
    State(state): State<EnrollmentState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<EnrollmentResponse>, ApiFailure> {
    let ctx = actor_context(&headers)?;
    let request = state
        .workflow
        .get(&ctx, &EnrollmentRequestId(id))
        .await
        .map_err(|error| failure(error, &ctx.correlation_id))?;

    Ok(respond("Enrollment request loaded.", request))
}

pub async fn update_selection(
    State(state): State<EnrollmentState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateSelectionRequest>,
) -> Result<Json<EnrollmentResponse>, ApiFailure> {
    let ctx = actor_context(&headers)?;
    let request = state
        .workflow
        .update_selection(&ctx, &EnrollmentRequestId(id), &grade_ids(body.grade_ids))
        .await
        .map_err(|error| failure(error, &ctx.correlation_id))?;

    Ok(respond("Enrollment selection updated.", request))
}

pub async fn cancel_enrollment(
    State(state): State<EnrollmentState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<EnrollmentResponse>, ApiFailure> {
    let ctx = actor_context(&headers)?;
    let request = state
        .workflow
        .cancel(&ctx, &EnrollmentRequestId(id))
        .await
        .map_err(|error| failure(error, &ctx.correlation_id))?;

    Ok(respond("Enrollment request cancelled.", request))
}

pub async fn approve_enrollment(
    State(state): State<EnrollmentState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<EnrollmentResponse>, ApiFailure> {
    let ctx = actor_context(&headers)?;
    let request = state
        .workflow
        .approve(&ctx, &EnrollmentRequestId(id))
        .await
        .map_err(|error| failure(error, &ctx.correlation_id))?;

    Ok(respond("Enrollment request approved.", request))
}

pub async fn reject_enrollment(
    State(state): State<EnrollmentState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RejectEnrollmentRequest>,
) -> Result<Json<EnrollmentResponse>, ApiFailure> {
    let ctx = actor_context(&headers)?;
    let request = state
        .workflow
        .reject(&ctx, &EnrollmentRequestId(id), body.note)
        .await
        .map_err(|error| failure(error, &ctx.correlation_id))?;

    Ok(respond("Enrollment request rejected.", request))
}

pub async fn list_student_enrollments(
    State(state): State<EnrollmentState>,
    Path(student_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<EnrollmentListResponse>, ApiFailure> {
    let ctx = actor_context(&headers)?;
    let requests = state
        .workflow
        .list_for_student(&ctx, &StudentId(student_id))
        .await
        .map_err(|error| failure(error, &ctx.correlation_id))?;

    Ok(list(requests))
}

pub async fn list_pending_enrollments(
    State(state): State<EnrollmentState>,
    Query(query): Query<PendingQuery>,
    headers: HeaderMap,
) -> Result<Json<EnrollmentListResponse>, ApiFailure> {
    let ctx = actor_context(&headers)?;
    let requests = state
        .workflow
        .list_pending(&ctx, query.limit)
        .await
        .map_err(|error| failure(error, &ctx.correlation_id))?;

    Ok(list(requests))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn actor_context(headers: &HeaderMap) -> Result<ActorContext, ApiFailure> {
    let correlation_id = header_value(headers, CORRELATION_ID_HEADER)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let Some(actor_id) = header_value(headers, ACTOR_ID_HEADER) else {
        let error = EnrollmentError::Forbidden(format!("missing `{ACTOR_ID_HEADER}` header"));
        return Err(failure(error.into(), &correlation_id));
    };
    let role = header_value(headers, ACTOR_ROLE_HEADER)
        .map(|role| role.parse::<ActorRole>())
        .transpose()
        .map_err(|error| failure(error.into(), &correlation_id))?
        .unwrap_or(ActorRole::Student);

    Ok(ActorContext::new(actor_id, role, correlation_id))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

fn grade_ids(raw: Vec<String>) -> Vec<GradeId> {
    raw.into_iter().map(GradeId).collect()
}

fn respond(message: &str, request: EnrollmentRequest) -> Json<EnrollmentResponse> {
    Json(EnrollmentResponse { success: true, message: message.to_owned(), request })
}

fn list(requests: Vec<EnrollmentRequest>) -> Json<EnrollmentListResponse> {
    Json(EnrollmentListResponse { success: true, count: requests.len(), requests })
}

fn failure(error: ApplicationError, correlation_id: &str) -> ApiFailure {
    let message = error.user_message();
    let detail = error.to_string();
    let interface = error.into_interface(correlation_id);

    let (status, code) = match &interface {
        InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "invalid_input"),
        InterfaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        InterfaceError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
        InterfaceError::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden"),
        InterfaceError::ServiceUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
        }
        InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };

    if status.is_server_error() {
        error!(
            event_name = "enrollment.api.failed",
            correlation_id = %correlation_id,
            error = %detail,
            "enrollment request failed"
        );
    } else {
        warn!(
            event_name = "enrollment.api.rejected",
            correlation_id = %correlation_id,
            error = %detail,
            status = status.as_u16(),
            "enrollment request rejected"
        );
    }

    (
        status,
        Json(EnrollmentApiError {
            success: false,
            error: code,
            message,
            correlation_id: interface.correlation_id().to_owned(),
        }),
    )
}
