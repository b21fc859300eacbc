use demande_core::domain::student::{StudentId, StudentProgress};
use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlStudentDirectory};

/// Expected catalog rows: (id, price as stored, active).
const SEED_GRADES: &[(&str, &str, bool)] =
    &[("G1", "100", true), ("G2", "150", true), ("G3", "80.50", true), ("G4", "120", false)];

/// Expected students: (id, has contact email, progress).
const SEED_STUDENTS: &[(&str, bool, StudentProgress)] = &[
    ("stu-alice", true, StudentProgress::Onboarding),
    ("stu-bruno", false, StudentProgress::Onboarding),
    ("stu-chloe", true, StudentProgress::Enrolled),
];

const SEED_GRANTS: &[(&str, &str)] = &[("stu-chloe", "G1")];

/// Deterministic grade catalog and student roster.
///
/// Loading is idempotent: catalog and student rows are upserted and grants are
/// inserted only once.
pub struct EnrollmentSeedDataset;

impl EnrollmentSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/enrollment_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            grades_seeded: SEED_GRADES.len(),
            students_seeded: SEED_STUDENTS.len(),
            grants_seeded: SEED_GRANTS.len(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for (id, price, active) in SEED_GRADES {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM grade WHERE id = ?1 AND price = ?2 AND active = ?3)",
            )
            .bind(*id)
            .bind(*price)
            .bind(*active)
            .fetch_one(pool)
            .await?;
            checks.push((*id, present == 1));
        }

        let directory = SqlStudentDirectory::new(pool.clone());
        for (id, has_email, progress) in SEED_STUDENTS {
            let student = directory.find_by_id(&StudentId((*id).to_owned())).await?;
            let present = student.is_some_and(|student| {
                student.progress == *progress && student.email.is_some() == *has_email
            });
            checks.push((*id, present));
        }

        for (student_id, grade_id) in SEED_GRANTS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM student_grade \
                 WHERE student_id = ?1 AND grade_id = ?2)",
            )
            .bind(*student_id)
            .bind(*grade_id)
            .fetch_one(pool)
            .await?;
            checks.push(("student-grade-grants", present == 1));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes seeded rows and any requests the seeded students made.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let students = sql_array_from_ids(SEED_STUDENTS.iter().map(|(id, _, _)| *id));
        let grades = sql_array_from_ids(SEED_GRADES.iter().map(|(id, _, _)| *id));

        sqlx::query(&format!(
            "DELETE FROM enrollment_line WHERE request_id IN
                 (SELECT id FROM enrollment_request WHERE student_id IN {students})"
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!("DELETE FROM enrollment_request WHERE student_id IN {students}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM student_grade WHERE student_id IN {students}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM student WHERE id IN {students}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM grade WHERE id IN {grades}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn sql_array_from_ids<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    let quoted = ids.map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub grades_seeded: usize,
    pub students_seeded: usize,
    pub grants_seeded: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_in_memory, migrations};

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!EnrollmentSeedDataset::SQL.is_empty());
    }

    #[tokio::test]
    async fn verify_seed_contract_and_idempotency() {
        let pool = connect_in_memory().await.expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");

        let first = EnrollmentSeedDataset::load(&pool).await.expect("load seed fixtures");
        let first_verification =
            EnrollmentSeedDataset::verify(&pool).await.expect("verify seed fixtures");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first.grades_seeded, 4);

        EnrollmentSeedDataset::load(&pool).await.expect("reload seed fixtures");
        let second_verification =
            EnrollmentSeedDataset::verify(&pool).await.expect("re-verify seed fixtures");
        assert!(second_verification.all_present);
        assert_eq!(first_verification.checks, second_verification.checks);
    }

    #[tokio::test]
    async fn clean_removes_seeded_rows() {
        let pool = connect_in_memory().await.expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");

        EnrollmentSeedDataset::load(&pool).await.expect("load");
        EnrollmentSeedDataset::clean(&pool).await.expect("clean");

        let verification = EnrollmentSeedDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        let grades: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM grade").fetch_one(&pool).await.expect("count");
        assert_eq!(grades, 0);
    }

    #[tokio::test]
    async fn verify_flags_students_whose_progress_drifted() {
        let pool = connect_in_memory().await.expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");
        EnrollmentSeedDataset::load(&pool).await.expect("load");

        let directory = SqlStudentDirectory::new(pool.clone());
        let bruno = StudentId("stu-bruno".to_owned());
        let mut record = directory.find_by_id(&bruno).await.expect("find").expect("seeded");
        record.progress = StudentProgress::AwaitingApproval;
        directory.save(&record).await.expect("save");

        let verification = EnrollmentSeedDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        let failing: Vec<&str> =
            verification.checks.iter().filter(|(_, ok)| !ok).map(|(name, _)| *name).collect();
        assert_eq!(failing, vec!["stu-bruno"]);
    }
}
