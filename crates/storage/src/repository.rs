use assess_core::report::AssessmentReport;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Opaque single-slot storage for the in-progress session snapshot.
///
/// Exactly one snapshot exists at a time; `save` overwrites it.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read the stored snapshot, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn load(&self) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace the stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be written.
    async fn save(&self, snapshot: &[u8]) -> Result<(), StorageError>;

    /// Remove the stored snapshot. Clearing an empty store is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn clear(&self) -> Result<(), StorageError>;
}

/// Archived result with its storage id.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub id: i64,
    pub report: AssessmentReport,
}

/// Archive of completed assessments.
#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// Append a completed report, returning its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the session is already archived,
    /// or another `StorageError` if the report cannot be stored.
    async fn append_result(&self, report: &AssessmentReport) -> Result<i64, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if there is no result with this id.
    async fn get_result(&self, id: i64) -> Result<AssessmentReport, StorageError>;

    /// Most recent results first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn list_results(&self, limit: u32) -> Result<Vec<ResultRow>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    snapshot: Arc<Mutex<Option<Vec<u8>>>>,
    results: Arc<Mutex<Vec<AssessmentReport>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl SessionStore for InMemoryRepository {
    async fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        let guard = self.snapshot.lock().map_err(poisoned)?;
        Ok(guard.clone())
    }

    async fn save(&self, snapshot: &[u8]) -> Result<(), StorageError> {
        let mut guard = self.snapshot.lock().map_err(poisoned)?;
        *guard = Some(snapshot.to_vec());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut guard = self.snapshot.lock().map_err(poisoned)?;
        *guard = None;
        Ok(())
    }
}

#[async_trait]
impl ResultRepository for InMemoryRepository {
    async fn append_result(&self, report: &AssessmentReport) -> Result<i64, StorageError> {
        let mut guard = self.results.lock().map_err(poisoned)?;
        if guard.iter().any(|r| r.session_id == report.session_id) {
            return Err(StorageError::Conflict);
        }
        guard.push(report.clone());
        i64::try_from(guard.len()).map_err(|_| StorageError::Conflict)
    }

    async fn get_result(&self, id: i64) -> Result<AssessmentReport, StorageError> {
        let guard = self.results.lock().map_err(poisoned)?;
        usize::try_from(id)
            .ok()
            .and_then(|id| id.checked_sub(1))
            .and_then(|index| guard.get(index))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn list_results(&self, limit: u32) -> Result<Vec<ResultRow>, StorageError> {
        let guard = self.results.lock().map_err(poisoned)?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let rows = guard
            .iter()
            .enumerate()
            .rev()
            .take(limit)
            .map(|(index, report)| ResultRow {
                id: i64::try_from(index + 1).unwrap_or(i64::MAX),
                report: report.clone(),
            })
            .collect();
        Ok(rows)
    }
}

/// Aggregates the persistence boundaries behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionStore>,
    pub results: Arc<dyn ResultRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let sessions: Arc<dyn SessionStore> = Arc::new(repo.clone());
        let results: Arc<dyn ResultRepository> = Arc::new(repo);
        Self { sessions, results }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assess_core::model::{Audience, LevelId, Placement, SessionId};
    use assess_core::ledger::ScoringLedger;
    use assess_core::routing::RoutingPolicy;
    use assess_core::time::fixed_now;

    fn report(placement: LevelId) -> AssessmentReport {
        AssessmentReport::from_ledger(
            SessionId::generate(),
            Audience::Adult,
            &RoutingPolicy::adaptive(),
            Placement::Level(placement),
            &ScoringLedger::default(),
            &[],
            fixed_now(),
            fixed_now(),
            None,
        )
    }

    #[tokio::test]
    async fn session_slot_overwrites_and_clears() {
        let repo = InMemoryRepository::new();
        assert_eq!(repo.load().await.unwrap(), None);

        repo.save(b"first").await.unwrap();
        repo.save(b"second").await.unwrap();
        assert_eq!(repo.load().await.unwrap().as_deref(), Some(&b"second"[..]));

        repo.clear().await.unwrap();
        assert_eq!(repo.load().await.unwrap(), None);
        repo.clear().await.unwrap();
    }

    #[tokio::test]
    async fn results_list_newest_first() {
        let repo = InMemoryRepository::new();
        let first = repo.append_result(&report(LevelId::A2)).await.unwrap();
        let second = repo.append_result(&report(LevelId::C1)).await.unwrap();

        assert_eq!(
            repo.get_result(first).await.unwrap().placement,
            Placement::Level(LevelId::A2)
        );
        let rows = repo.list_results(10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, second);
        assert!(matches!(
            repo.get_result(99).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn same_session_cannot_be_archived_twice() {
        let repo = InMemoryRepository::new();
        let report = report(LevelId::B1);
        repo.append_result(&report).await.unwrap();
        assert!(matches!(
            repo.append_result(&report).await,
            Err(StorageError::Conflict)
        ));
        assert_eq!(repo.list_results(10).await.unwrap().len(), 1);
    }
}
