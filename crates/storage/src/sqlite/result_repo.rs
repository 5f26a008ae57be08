use assess_core::report::AssessmentReport;
use sqlx::Row;
use tracing::debug;

use super::SqliteRepository;
use crate::repository::{ResultRepository, ResultRow, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn map_write_error(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        _ => StorageError::Connection(e.to_string()),
    }
}

fn map_report(row: &sqlx::sqlite::SqliteRow) -> Result<AssessmentReport, StorageError> {
    let raw: String = row.try_get("report_json").map_err(ser)?;
    serde_json::from_str(&raw).map_err(ser)
}

#[async_trait::async_trait]
impl ResultRepository for SqliteRepository {
    async fn append_result(&self, report: &AssessmentReport) -> Result<i64, StorageError> {
        let report_json = serde_json::to_string(report).map_err(ser)?;
        let total_questions = i64::try_from(report.total_questions())
            .map_err(|_| StorageError::Serialization("total_questions overflow".into()))?;

        let res = sqlx::query(
            r"
                INSERT INTO assessment_results (
                    session_id, audience, policy, placement,
                    total_correct, total_questions,
                    started_at, completed_at, report_json
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(report.session_id.to_string())
        .bind(report.audience.as_str())
        .bind(report.policy.to_string())
        .bind(report.placement.to_string())
        .bind(i64::from(report.total_correct()))
        .bind(total_questions)
        .bind(report.started_at)
        .bind(report.completed_at)
        .bind(report_json)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        let id = res.last_insert_rowid();
        debug!(id, placement = %report.placement, "assessment result archived");
        Ok(id)
    }

    async fn get_result(&self, id: i64) -> Result<AssessmentReport, StorageError> {
        let row = sqlx::query("SELECT report_json FROM assessment_results WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .ok_or(StorageError::NotFound)?;

        map_report(&row)
    }

    async fn list_results(&self, limit: u32) -> Result<Vec<ResultRow>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, report_json
                FROM assessment_results
                ORDER BY completed_at DESC, id DESC
                LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let id: i64 = row.try_get("id").map_err(ser)?;
                Ok(ResultRow {
                    id,
                    report: map_report(row)?,
                })
            })
            .collect()
    }
}
