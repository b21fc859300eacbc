use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use demande_db::{migrations, DbPool, SqlEnrollmentStore};
use serde::Serialize;

#[derive(Clone)]
pub struct ReadinessState {
    db_pool: DbPool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReadinessCheck {
    pub status: Readiness,
    pub detail: String,
}

impl ReadinessCheck {
    fn ready(detail: impl Into<String>) -> Self {
        Self { status: Readiness::Ready, detail: detail.into() }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self { status: Readiness::Degraded, detail: detail.into() }
    }

    fn skipped(detail: impl Into<String>) -> Self {
        Self { status: Readiness::Skipped, detail: detail.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReadinessReport {
    pub status: Readiness,
    pub schema: ReadinessCheck,
    pub review_queue: ReadinessCheck,
    pub pending_requests: Option<u64>,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(ReadinessState { db_pool })
}

/// Ready once every enrollment table exists and the review queue can be counted.
pub async fn health(State(state): State<ReadinessState>) -> (StatusCode, Json<ReadinessReport>) {
    let schema = match migrations::missing_tables(&state.db_pool).await {
        Ok(missing) if missing.is_empty() => ReadinessCheck::ready("enrollment tables present"),
        Ok(missing) => ReadinessCheck::degraded(format!("missing tables: {}", missing.join(", "))),
        Err(error) => ReadinessCheck::degraded(format!("schema inspection failed: {error}")),
    };

    let (review_queue, pending_requests) = if schema.status == Readiness::Ready {
        match SqlEnrollmentStore::new(state.db_pool.clone()).pending_count().await {
            Ok(count) => {
                (ReadinessCheck::ready(format!("{count} request(s) awaiting review")), Some(count))
            }
            Err(error) => {
                (ReadinessCheck::degraded(format!("review queue unreachable: {error}")), None)
            }
        }
    } else {
        (ReadinessCheck::skipped("schema not ready"), None)
    };

    let ready = schema.status == Readiness::Ready && review_queue.status == Readiness::Ready;
    let report = ReadinessReport {
        status: if ready { Readiness::Ready } else { Readiness::Degraded },
        schema,
        review_queue,
        pending_requests,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(report))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::{extract::State, Json};
    use chrono::Utc;
    use demande_core::domain::enrollment::{EnrollmentLine, EnrollmentRequest, EnrollmentRequestId};
    use demande_core::domain::grade::GradeId;
    use demande_core::domain::student::StudentId;
    use demande_core::ports::EnrollmentStore;
    use demande_db::{connect_in_memory, migrations, SqlEnrollmentStore};
    use rust_decimal::Decimal;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::{health, router, Readiness, ReadinessState};

    #[tokio::test]
    async fn unmigrated_database_reports_missing_tables() {
        let pool = connect_in_memory().await.expect("pool should connect");

        let (status, Json(report)) = health(State(ReadinessState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.status, Readiness::Degraded);
        assert!(report.schema.detail.contains("enrollment_request"), "{}", report.schema.detail);
        assert_eq!(report.review_queue.status, Readiness::Skipped);
        assert_eq!(report.pending_requests, None);

        pool.close().await;
    }

    #[tokio::test]
    async fn closed_pool_is_degraded() {
        let pool = connect_in_memory().await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool.close().await;

        let (status, Json(report)) = health(State(ReadinessState { db_pool: pool })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.schema.status, Readiness::Degraded);
        assert!(report.schema.detail.starts_with("schema inspection failed"));
    }

    #[tokio::test]
    async fn ready_route_counts_the_review_queue() {
        let pool = connect_in_memory().await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let request = EnrollmentRequest::pending(
            EnrollmentRequestId("DEM-1".to_owned()),
            StudentId("stu-1".to_owned()),
            vec![EnrollmentLine {
                grade_id: GradeId("G2".to_owned()),
                grade_name: "Intermediate".to_owned(),
                grade_price: Decimal::new(150, 0),
            }],
            Utc::now(),
        )
        .expect("pending request");
        SqlEnrollmentStore::new(pool.clone()).insert_pending(&request).await.expect("insert");

        let response = router(pool.clone())
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("health response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let report: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(report["status"], "ready");
        assert_eq!(report["pending_requests"], 1);
        assert_eq!(report["review_queue"]["detail"], "1 request(s) awaiting review");

        pool.close().await;
    }
}
