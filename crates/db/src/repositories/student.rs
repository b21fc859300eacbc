use chrono::Utc;
use sqlx::Row;

use demande_core::domain::student::{StudentId, StudentProgress};

use super::RepositoryError;
use crate::DbPool;

/// Registration data kept for a student; the workflow only reads progress and email.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StudentRecord {
    pub id: StudentId,
    pub display_name: String,
    pub email: Option<String>,
    pub progress: StudentProgress,
}

pub struct SqlStudentDirectory {
    pool: DbPool,
}

impl SqlStudentDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, student: &StudentRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO student (id, display_name, email, progress, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name,
                 email = excluded.email,
                 progress = excluded.progress,
                 updated_at = excluded.updated_at",
        )
        .bind(&student.id.0)
        .bind(&student.display_name)
        .bind(&student.email)
        .bind(student.progress.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(
        &self,
        id: &StudentId,
    ) -> Result<Option<StudentRecord>, RepositoryError> {
        let row =
            sqlx::query("SELECT id, display_name, email, progress FROM student WHERE id = ?")
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let progress: String =
            row.try_get("progress").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        Ok(Some(StudentRecord {
            id: StudentId(row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?),
            display_name: row
                .try_get("display_name")
                .map_err(|e| RepositoryError::Decode(e.to_string()))?,
            email: row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?,
            progress: StudentProgress::parse(&progress).ok_or_else(|| {
                RepositoryError::Decode(format!("unknown student progress `{progress}`"))
            })?,
        }))
    }
}
