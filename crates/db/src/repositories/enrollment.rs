use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};

use demande_core::domain::enrollment::{
    EnrollmentLine, EnrollmentRequest, EnrollmentRequestId, EnrollmentStatus,
};
use demande_core::domain::grade::GradeId;
use demande_core::domain::student::{StudentId, StudentProgress};
use demande_core::ports::{EnrollmentStore, Resolution, StoreError};
use tracing::debug;

use super::{is_unique_violation, parse_decimal, parse_timestamp, RepositoryError};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id, student_id, status, total_price, created_at, updated_at,
     resolved_at, resolved_by, review_note";

pub struct SqlEnrollmentStore {
    pool: DbPool,
}

impl SqlEnrollmentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Size of the review queue, without loading any request.
    pub async fn pending_count(&self) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM enrollment_request WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn hydrate(&self, row: &SqliteRow) -> Result<EnrollmentRequest, RepositoryError> {
        let mut request = row_to_request(row)?;
        let lines = sqlx::query(
            "SELECT grade_id, grade_name, grade_price
             FROM enrollment_line WHERE request_id = ? ORDER BY position",
        )
        .bind(&request.id.0)
        .fetch_all(&self.pool)
        .await?;
        request.lines = lines.iter().map(row_to_line).collect::<Result<Vec<_>, _>>()?;
        Ok(request)
    }

    async fn hydrate_all(
        &self,
        rows: &[SqliteRow],
    ) -> Result<Vec<EnrollmentRequest>, RepositoryError> {
        let mut requests = Vec::with_capacity(rows.len());
        for row in rows {
            requests.push(self.hydrate(row).await?);
        }
        Ok(requests)
    }

    async fn fetch_one_where(
        &self,
        predicate: &str,
        value: &str,
    ) -> Result<Option<EnrollmentRequest>, RepositoryError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM enrollment_request WHERE {predicate}");
        let row = sqlx::query(&sql).bind(value).fetch_optional(&self.pool).await?;
        match row {
            Some(ref row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn try_insert_pending(&self, request: &EnrollmentRequest) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO enrollment_request
                 (id, student_id, status, total_price, created_at, updated_at,
                  resolved_at, resolved_by, review_note)
             VALUES (?, ?, ?, ?, ?, ?, NULL, NULL, NULL)",
        )
        .bind(&request.id.0)
        .bind(&request.student_id.0)
        .bind(EnrollmentStatus::Pending.as_str())
        .bind(request.total_price.to_string())
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        insert_lines(&mut tx, &request.id, &request.lines).await?;
        tx.commit().await
    }

    async fn swap_lines(
        &self,
        id: &EnrollmentRequestId,
        lines: &[EnrollmentLine],
        updated_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let total: rust_decimal::Decimal = lines.iter().map(|line| line.grade_price).sum();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE enrollment_request SET total_price = ?, updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(total.to_string())
        .bind(updated_at.to_rfc3339())
        .bind(&id.0)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM enrollment_line WHERE request_id = ?")
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;
        insert_lines(&mut tx, id, lines).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn apply_resolution(
        &self,
        id: &EnrollmentRequestId,
        resolution: &Resolution,
    ) -> Result<bool, RepositoryError> {
        let at = resolution.resolved_at.to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE enrollment_request
             SET status = ?, resolved_at = ?, resolved_by = ?, review_note = ?, updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(resolution.status.as_str())
        .bind(&at)
        .bind(&resolution.resolved_by)
        .bind(&resolution.review_note)
        .bind(&at)
        .bind(&id.0)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        if resolution.grant_grades {
            let student_id: String =
                sqlx::query_scalar("SELECT student_id FROM enrollment_request WHERE id = ?")
                    .bind(&id.0)
                    .fetch_one(&mut *tx)
                    .await?;
            ensure_student(&mut tx, &student_id, &at).await?;

            let granted = sqlx::query(
                "INSERT OR IGNORE INTO student_grade (student_id, grade_id, granted_at)
                 SELECT ?, grade_id, ? FROM enrollment_line WHERE request_id = ?",
            )
            .bind(&student_id)
            .bind(&at)
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;
            debug!(
                event_name = "db.enrollment.grades_granted",
                request_id = %id,
                student_id = %student_id,
                granted = granted.rows_affected(),
                "granted requested grades with approval"
            );
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn insert_grants(
        &self,
        student_id: &StudentId,
        grades: &[GradeId],
    ) -> Result<(), RepositoryError> {
        let at = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        ensure_student(&mut tx, &student_id.0, &at).await?;

        for grade in grades {
            sqlx::query(
                "INSERT OR IGNORE INTO student_grade (student_id, grade_id, granted_at)
                 VALUES (?, ?, ?)",
            )
            .bind(&student_id.0)
            .bind(&grade.0)
            .bind(&at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn insert_lines(
    tx: &mut Transaction<'_, Sqlite>,
    id: &EnrollmentRequestId,
    lines: &[EnrollmentLine],
) -> Result<(), sqlx::Error> {
    for (position, line) in lines.iter().enumerate() {
        sqlx::query(
            "INSERT INTO enrollment_line (request_id, position, grade_id, grade_name, grade_price)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id.0)
        .bind(position as i64)
        .bind(&line.grade_id.0)
        .bind(&line.grade_name)
        .bind(line.grade_price.to_string())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Students may be known only through their requests; grants need a parent row.
async fn ensure_student(
    tx: &mut Transaction<'_, Sqlite>,
    student_id: &str,
    at: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT OR IGNORE INTO student (id, display_name, email, progress, updated_at)
         VALUES (?, ?, NULL, 'onboarding', ?)",
    )
    .bind(student_id)
    .bind(student_id)
    .bind(at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn row_to_request(row: &SqliteRow) -> Result<EnrollmentRequest, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let student_id: String =
        row.try_get("student_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let total_price: String =
        row.try_get("total_price").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let resolved_at: Option<String> =
        row.try_get("resolved_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let resolved_by: Option<String> =
        row.try_get("resolved_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let review_note: Option<String> =
        row.try_get("review_note").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let status = EnrollmentStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown enrollment status `{status}`")))?;
    let resolved_at = match resolved_at {
        Some(value) => Some(parse_timestamp("enrollment_request.resolved_at", &value)?),
        None => None,
    };

    Ok(EnrollmentRequest {
        id: EnrollmentRequestId(id),
        student_id: StudentId(student_id),
        status,
        total_price: parse_decimal("enrollment_request.total_price", &total_price)?,
        lines: Vec::new(),
        created_at: parse_timestamp("enrollment_request.created_at", &created_at)?,
        updated_at: parse_timestamp("enrollment_request.updated_at", &updated_at)?,
        resolved_at,
        resolved_by,
        review_note,
    })
}

fn row_to_line(row: &SqliteRow) -> Result<EnrollmentLine, RepositoryError> {
    let grade_id: String =
        row.try_get("grade_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let grade_name: String =
        row.try_get("grade_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let grade_price: String =
        row.try_get("grade_price").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(EnrollmentLine {
        grade_id: GradeId(grade_id),
        grade_name,
        grade_price: parse_decimal("enrollment_line.grade_price", &grade_price)?,
    })
}

#[async_trait]
impl EnrollmentStore for SqlEnrollmentStore {
    async fn insert_pending(&self, request: &EnrollmentRequest) -> Result<(), StoreError> {
        match self.try_insert_pending(request).await {
            Ok(()) => Ok(()),
            Err(error) if is_unique_violation(&error) => {
                debug!(
                    event_name = "db.enrollment.pending_conflict",
                    request_id = %request.id,
                    student_id = %request.student_id,
                    "pending request index rejected insert"
                );
                Err(StoreError::PendingRequestExists(request.student_id.clone()))
            }
            Err(error) => Err(RepositoryError::from(error).into()),
        }
    }

    async fn find_by_id(
        &self,
        id: &EnrollmentRequestId,
    ) -> Result<Option<EnrollmentRequest>, StoreError> {
        Ok(self.fetch_one_where("id = ?", &id.0).await?)
    }

    async fn find_pending_for_student(
        &self,
        student_id: &StudentId,
    ) -> Result<Option<EnrollmentRequest>, StoreError> {
        Ok(self.fetch_one_where("student_id = ? AND status = 'pending'", &student_id.0).await?)
    }

    async fn list_for_student(
        &self,
        student_id: &StudentId,
    ) -> Result<Vec<EnrollmentRequest>, StoreError> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM enrollment_request
             WHERE student_id = ? ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(&student_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(self.hydrate_all(&rows).await?)
    }

    async fn list_by_status(
        &self,
        status: EnrollmentStatus,
        limit: u32,
    ) -> Result<Vec<EnrollmentRequest>, StoreError> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM enrollment_request
             WHERE status = ? ORDER BY created_at ASC, id ASC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(self.hydrate_all(&rows).await?)
    }

    async fn replace_lines(
        &self,
        id: &EnrollmentRequestId,
        lines: &[EnrollmentLine],
        updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.swap_lines(id, lines, updated_at).await?)
    }

    async fn resolve(
        &self,
        id: &EnrollmentRequestId,
        resolution: &Resolution,
    ) -> Result<bool, StoreError> {
        Ok(self.apply_resolution(id, resolution).await?)
    }

    async fn owned_grades(&self, student_id: &StudentId) -> Result<Vec<GradeId>, StoreError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT grade_id FROM student_grade WHERE student_id = ? \
             UNION \
             SELECT l.grade_id FROM enrollment_line l \
             JOIN enrollment_request r ON r.id = l.request_id \
             WHERE r.student_id = ? AND r.status = 'approved' \
             ORDER BY grade_id",
        )
        .bind(&student_id.0)
        .bind(&student_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(ids.into_iter().map(GradeId).collect())
    }

    async fn grant_grades(
        &self,
        student_id: &StudentId,
        grades: &[GradeId],
    ) -> Result<(), StoreError> {
        Ok(self.insert_grants(student_id, grades).await?)
    }

    async fn student_progress(
        &self,
        student_id: &StudentId,
    ) -> Result<Option<StudentProgress>, StoreError> {
        let progress: Option<String> =
            sqlx::query_scalar("SELECT progress FROM student WHERE id = ?")
                .bind(&student_id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(RepositoryError::from)?;

        match progress {
            Some(value) => StudentProgress::parse(&value).map(Some).ok_or_else(|| {
                RepositoryError::Decode(format!("unknown student progress `{value}`")).into()
            }),
            None => Ok(None),
        }
    }

    async fn set_student_progress(
        &self,
        student_id: &StudentId,
        progress: StudentProgress,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO student (id, display_name, email, progress, updated_at)
             VALUES (?, ?, NULL, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 progress = excluded.progress,
                 updated_at = excluded.updated_at",
        )
        .bind(&student_id.0)
        .bind(&student_id.0)
        .bind(progress.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn student_contact(&self, student_id: &StudentId) -> Result<Option<String>, StoreError> {
        let email: Option<Option<String>> =
            sqlx::query_scalar("SELECT email FROM student WHERE id = ?")
                .bind(&student_id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(RepositoryError::from)?;
        Ok(email.flatten().filter(|email| !email.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use demande_core::domain::enrollment::{
        EnrollmentLine, EnrollmentRequest, EnrollmentRequestId, EnrollmentStatus,
    };
    use demande_core::domain::grade::GradeId;
    use demande_core::domain::student::{StudentId, StudentProgress};
    use demande_core::ports::{EnrollmentStore, Resolution, StoreError};

    use super::SqlEnrollmentStore;
    use crate::{connect_in_memory, migrations};

    async fn setup() -> SqlEnrollmentStore {
        let pool = connect_in_memory().await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlEnrollmentStore::new(pool)
    }

    fn line(id: &str, price: i64) -> EnrollmentLine {
        EnrollmentLine {
            grade_id: GradeId(id.to_owned()),
            grade_name: format!("Grade {id}"),
            grade_price: Decimal::new(price, 0),
        }
    }

    fn pending(id: &str, student: &str) -> EnrollmentRequest {
        EnrollmentRequest::pending(
            EnrollmentRequestId(id.to_owned()),
            StudentId(student.to_owned()),
            vec![line("G2", 150), line("G1", 100)],
            Utc::now(),
        )
        .expect("pending request")
    }

    fn resolution(status: EnrollmentStatus, grant_grades: bool) -> Resolution {
        Resolution {
            status,
            resolved_by: "admin-1".to_owned(),
            review_note: None,
            resolved_at: Utc::now(),
            grant_grades,
        }
    }

    #[tokio::test]
    async fn insert_then_find_keeps_lines_in_selection_order() {
        let store = setup().await;
        let request = pending("DEM-1", "stu-1");
        store.insert_pending(&request).await.expect("insert");

        let loaded =
            store.find_by_id(&request.id).await.expect("find").expect("request should exist");
        assert_eq!(loaded.lines, request.lines);
        assert_eq!(loaded.total_price, Decimal::new(250, 0));
        assert_eq!(loaded.status, EnrollmentStatus::Pending);
    }

    #[tokio::test]
    async fn second_pending_insert_maps_to_pending_request_exists() {
        let store = setup().await;
        store.insert_pending(&pending("DEM-1", "stu-1")).await.expect("first insert");

        let error = store
            .insert_pending(&pending("DEM-2", "stu-1"))
            .await
            .expect_err("second pending must fail");
        assert!(matches!(error, StoreError::PendingRequestExists(ref id) if id.0 == "stu-1"));
        assert!(store
            .find_by_id(&EnrollmentRequestId("DEM-2".to_owned()))
            .await
            .expect("find")
            .is_none());
    }

    #[tokio::test]
    async fn resolve_is_a_compare_and_swap() {
        let store = setup().await;
        let request = pending("DEM-1", "stu-1");
        store.insert_pending(&request).await.expect("insert");

        let first =
            store.resolve(&request.id, &resolution(EnrollmentStatus::Approved, true)).await;
        let second =
            store.resolve(&request.id, &resolution(EnrollmentStatus::Rejected, false)).await;

        assert!(first.expect("first resolve"));
        assert!(!second.expect("second resolve"));

        let owned = store.owned_grades(&request.student_id).await.expect("owned");
        assert_eq!(owned.len(), 2);
        let loaded = store.find_by_id(&request.id).await.expect("find").expect("exists");
        assert_eq!(loaded.status, EnrollmentStatus::Approved);
        assert_eq!(loaded.resolved_by.as_deref(), Some("admin-1"));
    }

    #[tokio::test]
    async fn approved_lines_count_as_owned_without_a_grant() {
        let store = setup().await;
        let approved = pending("DEM-1", "stu-1");
        let cancelled = pending("DEM-2", "stu-2");
        store.insert_pending(&approved).await.expect("insert approved");
        store.insert_pending(&cancelled).await.expect("insert cancelled");

        assert!(store
            .resolve(&approved.id, &resolution(EnrollmentStatus::Approved, false))
            .await
            .expect("approve"));
        assert!(store
            .resolve(&cancelled.id, &resolution(EnrollmentStatus::Cancelled, false))
            .await
            .expect("cancel"));

        let owned = store.owned_grades(&approved.student_id).await.expect("owned");
        assert_eq!(owned, vec![GradeId("G1".to_owned()), GradeId("G2".to_owned())]);
        assert!(store.owned_grades(&cancelled.student_id).await.expect("owned").is_empty());
    }

    #[tokio::test]
    async fn pending_count_tracks_the_review_queue() {
        let store = setup().await;
        assert_eq!(store.pending_count().await.expect("count"), 0);

        let first = pending("DEM-1", "stu-1");
        store.insert_pending(&first).await.expect("insert first");
        store.insert_pending(&pending("DEM-2", "stu-2")).await.expect("insert second");
        assert_eq!(store.pending_count().await.expect("count"), 2);

        store
            .resolve(&first.id, &resolution(EnrollmentStatus::Rejected, false))
            .await
            .expect("reject");
        assert_eq!(store.pending_count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn replace_lines_only_touches_pending_requests() {
        let store = setup().await;
        let request = pending("DEM-1", "stu-1");
        store.insert_pending(&request).await.expect("insert");

        let replaced =
            store.replace_lines(&request.id, &[line("G3", 80)], Utc::now()).await.expect("swap");
        assert!(replaced);
        let loaded = store.find_by_id(&request.id).await.expect("find").expect("exists");
        assert_eq!(loaded.total_price, Decimal::new(80, 0));
        assert_eq!(loaded.lines.len(), 1);

        store
            .resolve(&request.id, &resolution(EnrollmentStatus::Cancelled, false))
            .await
            .expect("cancel");
        let replaced =
            store.replace_lines(&request.id, &[line("G1", 100)], Utc::now()).await.expect("swap");
        assert!(!replaced);
    }

    #[tokio::test]
    async fn listings_are_ordered_by_creation() {
        let store = setup().await;
        let mut older = pending("DEM-1", "stu-1");
        older.created_at = Utc::now() - chrono::Duration::minutes(5);
        older.updated_at = older.created_at;
        store.insert_pending(&older).await.expect("insert older");
        store
            .resolve(&older.id, &resolution(EnrollmentStatus::Cancelled, false))
            .await
            .expect("cancel older");
        store.insert_pending(&pending("DEM-2", "stu-1")).await.expect("insert newer");
        store.insert_pending(&pending("DEM-3", "stu-2")).await.expect("insert other");

        let history =
            store.list_for_student(&StudentId("stu-1".to_owned())).await.expect("history");
        let ids: Vec<&str> = history.iter().map(|request| request.id.0.as_str()).collect();
        assert_eq!(ids, vec!["DEM-2", "DEM-1"]);

        let queue = store.list_by_status(EnrollmentStatus::Pending, 1).await.expect("queue");
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn student_progress_and_contact_round_trip() {
        let store = setup().await;
        let student = StudentId("stu-9".to_owned());

        assert_eq!(store.student_progress(&student).await.expect("progress"), None);
        store
            .set_student_progress(&student, StudentProgress::AwaitingApproval)
            .await
            .expect("set progress");
        assert_eq!(
            store.student_progress(&student).await.expect("progress"),
            Some(StudentProgress::AwaitingApproval)
        );
        assert_eq!(store.student_contact(&student).await.expect("contact"), None);
    }
}
