use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub const ENROLLMENT_TABLES: [&str; 5] =
    ["grade", "student", "student_grade", "enrollment_request", "enrollment_line"];

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Enrollment tables absent from the connected database, without migrating it.
pub async fn missing_tables(pool: &DbPool) -> Result<Vec<&'static str>, sqlx::Error> {
    let mut missing = Vec::new();
    for table in ENROLLMENT_TABLES {
        let present: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(pool)
        .await?;
        if present == 0 {
            missing.push(table);
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{missing_tables, run_pending};
    use crate::{connect_in_memory, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "grade",
        "student",
        "student_grade",
        "enrollment_request",
        "enrollment_line",
        "idx_enrollment_request_one_pending",
        "idx_enrollment_request_student_id",
        "idx_enrollment_request_status",
        "idx_student_grade_student_id",
    ];

    async fn table_count(pool: &sqlx::SqlitePool, name: &str) -> i64 {
        sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .expect("check table")
        .get::<i64, _>("count")
    }

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = connect_in_memory().await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in ["grade", "student", "student_grade", "enrollment_request", "enrollment_line"]
        {
            assert_eq!(table_count(&pool, table).await, 1, "missing table {table}");
        }
    }

    #[tokio::test]
    async fn second_pending_request_for_a_student_is_rejected_by_schema() {
        let pool = connect_in_memory().await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let insert = "INSERT INTO enrollment_request
             (id, student_id, status, total_price, created_at, updated_at)
             VALUES (?, 'stu-1', ?, '100', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')";

        sqlx::query(insert).bind("DEM-1").bind("pending").execute(&pool).await.expect("first");
        sqlx::query(insert).bind("DEM-2").bind("cancelled").execute(&pool).await.expect("closed");

        let duplicate = sqlx::query(insert).bind("DEM-3").bind("pending").execute(&pool).await;
        assert!(duplicate.is_err(), "partial unique index should reject a second pending row");
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_in_memory().await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        assert_eq!(table_count(&pool, "enrollment_request").await, 0);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_in_memory().await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_SCHEMA_OBJECTS.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let after_down_signature = managed_schema_signature(&pool).await;
        assert!(
            after_down_signature.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");

        let after_second_up_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            after_second_up_signature, initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }

    #[tokio::test]
    async fn missing_tables_reports_unmigrated_schema() {
        let pool = connect_in_memory().await.expect("connect");
        assert_eq!(missing_tables(&pool).await.expect("inspect").len(), 5);

        run_pending(&pool).await.expect("migrations");
        assert!(missing_tables(&pool).await.expect("inspect").is_empty());
    }
}
