use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use demande_core::domain::grade::{Grade, GradeId};
use demande_core::ports::{GradeCatalog, StoreError};

use super::{parse_decimal, RepositoryError};
use crate::DbPool;

pub struct SqlGradeCatalog {
    pool: DbPool,
}

impl SqlGradeCatalog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, grade: &Grade) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO grade (id, name, price, active, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 price = excluded.price,
                 active = excluded.active",
        )
        .bind(&grade.id.0)
        .bind(&grade.name)
        .bind(grade.price.to_string())
        .bind(grade.active)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_by_ids(&self, ids: &[GradeId]) -> Result<Vec<Grade>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, name, price, active FROM grade WHERE active = 1 AND id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(&id.0);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_grade).collect()
    }

    async fn fetch_all(&self) -> Result<Vec<Grade>, RepositoryError> {
        let rows = sqlx::query("SELECT id, name, price, active FROM grade ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_grade).collect()
    }
}

fn row_to_grade(row: &SqliteRow) -> Result<Grade, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let price: String =
        row.try_get("price").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let active: bool = row.try_get("active").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Grade { id: GradeId(id), name, price: parse_decimal("grade.price", &price)?, active })
}

#[async_trait]
impl GradeCatalog for SqlGradeCatalog {
    async fn prices_for(&self, ids: &[GradeId]) -> Result<Vec<Grade>, StoreError> {
        Ok(self.fetch_by_ids(ids).await?)
    }

    async fn list_grades(&self) -> Result<Vec<Grade>, StoreError> {
        Ok(self.fetch_all().await?)
    }
}
