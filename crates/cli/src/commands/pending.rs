use std::sync::Arc;

use demande_core::audit::TracingAuditSink;
use demande_core::domain::enrollment::EnrollmentRequest;
use demande_core::notify::InMemoryOutbox;
use demande_core::workflow::{ActorContext, EnrollmentWorkflow};
use demande_db::{SqlEnrollmentStore, SqlGradeCatalog};

use crate::commands::{run_with_database, CommandResult};

pub fn run(limit: Option<u32>, actor: &str) -> CommandResult {
    let actor = actor.to_owned();
    let result = run_with_database("pending", |config, pool| async move {
        let workflow = EnrollmentWorkflow::new(
            Arc::new(SqlGradeCatalog::new(pool.clone())),
            Arc::new(SqlEnrollmentStore::new(pool)),
            Arc::new(InMemoryOutbox::default()),
            Arc::new(TracingAuditSink),
            config.workflow_settings(),
        );
        let ctx = ActorContext::administrator(actor, "cli-pending");

        workflow
            .list_pending(&ctx, limit)
            .await
            .map_err(|error| ("pending_query", error.to_string(), 4u8))
    });

    match result {
        Ok(requests) => CommandResult::success("pending", render(&requests)),
        Err(failure) => failure,
    }
}

fn render(requests: &[EnrollmentRequest]) -> String {
    if requests.is_empty() {
        return "no pending enrollment requests".to_string();
    }

    let mut lines =
        vec![format!("{} pending enrollment request(s), oldest first:", requests.len())];
    lines.extend(requests.iter().map(|request| {
        let grades = request
            .lines
            .iter()
            .map(|line| line.grade_id.0.as_str())
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "  - {} student={} grades={} total={} submitted={}",
            request.id,
            request.student_id,
            grades,
            request.total_price,
            request.created_at.to_rfc3339()
        )
    }));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use demande_core::domain::enrollment::{
        EnrollmentLine, EnrollmentRequest, EnrollmentRequestId,
    };
    use demande_core::domain::grade::GradeId;
    use demande_core::domain::student::StudentId;
    use rust_decimal::Decimal;

    use super::render;

    #[test]
    fn render_lists_requests_with_grades_and_totals() {
        let created_at = Utc.with_ymd_and_hms(2026, 9, 1, 8, 30, 0).single().expect("timestamp");
        let request = EnrollmentRequest::pending(
            EnrollmentRequestId("DEM-1".to_owned()),
            StudentId("stu-alice".to_owned()),
            vec![
                EnrollmentLine {
                    grade_id: GradeId("G1".to_owned()),
                    grade_name: "Beginner".to_owned(),
                    grade_price: Decimal::new(100, 0),
                },
                EnrollmentLine {
                    grade_id: GradeId("G2".to_owned()),
                    grade_name: "Intermediate".to_owned(),
                    grade_price: Decimal::new(150, 0),
                },
            ],
            created_at,
        )
        .expect("pending request");

        let rendered = render(&[request]);
        assert!(rendered.starts_with("1 pending enrollment request(s)"));
        assert!(rendered.contains("DEM-1 student=stu-alice grades=G1,G2 total=250"));
    }

    #[test]
    fn render_reports_empty_queue() {
        assert_eq!(render(&[]), "no pending enrollment requests");
    }
}
