use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use tracing::debug;

use super::SqliteRepository;
use crate::repository::{SessionStore, StorageError};

const SLOT_ID: i64 = 1;

#[async_trait]
impl SessionStore for SqliteRepository {
    async fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        let row = sqlx::query("SELECT payload FROM session_snapshots WHERE id = ?1")
            .bind(SLOT_ID)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let payload: Vec<u8> = row
            .try_get("payload")
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(Some(payload))
    }

    async fn save(&self, snapshot: &[u8]) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO session_snapshots (id, payload, saved_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(id) DO UPDATE SET
                    payload = excluded.payload,
                    saved_at = excluded.saved_at
            ",
        )
        .bind(SLOT_ID)
        .bind(snapshot)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        debug!(bytes = snapshot.len(), "session snapshot saved");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM session_snapshots WHERE id = ?1")
            .bind(SLOT_ID)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        debug!("session snapshot cleared");
        Ok(())
    }
}
