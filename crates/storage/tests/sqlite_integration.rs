use assess_core::ledger::{AnswerTiming, Response, ScoringLedger};
use assess_core::model::{
    Audience, AudioTrack, LevelId, OptionId, Placement, Question, SessionId, TrackId,
};
use assess_core::report::AssessmentReport;
use assess_core::routing::RoutingPolicy;
use assess_core::time::fixed_now;
use storage::repository::{ResultRepository, SessionStore, StorageError};
use storage::sqlite::SqliteRepository;

fn report_with_one_answer(placement: Placement) -> AssessmentReport {
    let q = || {
        Question::new(
            "Q",
            ["A".into(), "B".into(), "C".into(), "D".into()],
            OptionId::B,
        )
    };
    let track = AudioTrack::new(TrackId::new("b2_1"), "T", "S", [q(), q(), q(), q()]);
    let mut ledger = ScoringLedger::with_levels([LevelId::B2]);
    ledger
        .record_response(
            LevelId::B2,
            &track,
            0,
            Response::Selected(OptionId::B),
            AnswerTiming {
                listens: 2,
                elapsed_seconds: 7.25,
                answered_at: fixed_now(),
            },
        )
        .unwrap();

    AssessmentReport::from_ledger(
        SessionId::generate(),
        Audience::Adult,
        &RoutingPolicy::adaptive(),
        placement,
        &ledger,
        &[LevelId::B2],
        fixed_now(),
        fixed_now(),
        None,
    )
}

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn snapshot_slot_is_overwritten_and_cleared() {
    let repo = connect("memdb_snapshot_slot").await;

    assert_eq!(repo.load().await.unwrap(), None);
    repo.save(br#"{"v":1}"#).await.unwrap();
    repo.save(br#"{"v":2}"#).await.unwrap();
    assert_eq!(
        repo.load().await.unwrap().as_deref(),
        Some(&br#"{"v":2}"#[..])
    );

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM session_snapshots")
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);

    repo.clear().await.unwrap();
    assert_eq!(repo.load().await.unwrap(), None);
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let repo = connect("memdb_migrate_twice").await;
    repo.migrate().await.expect("second migrate");
    repo.save(b"x").await.unwrap();
    assert!(repo.load().await.unwrap().is_some());
}

#[tokio::test]
async fn result_archive_round_trips_report() {
    let repo = connect("memdb_results").await;
    let report = report_with_one_answer(Placement::Level(LevelId::B2));

    let id = repo.append_result(&report).await.unwrap();
    let fetched = repo.get_result(id).await.unwrap();
    assert_eq!(fetched, report);
    assert_eq!(fetched.responses[0].replays(), 1);

    let rows = repo.list_results(5).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, id);
}

#[tokio::test]
async fn same_session_cannot_be_archived_twice() {
    let repo = connect("memdb_results_conflict").await;
    let report = report_with_one_answer(Placement::Error);

    repo.append_result(&report).await.unwrap();
    let err = repo.append_result(&report).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));
}

#[tokio::test]
async fn missing_result_is_not_found() {
    let repo = connect("memdb_results_missing").await;
    assert!(matches!(
        repo.get_result(42).await,
        Err(StorageError::NotFound)
    ));
}
