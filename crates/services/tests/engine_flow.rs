mod common;

use std::sync::Arc;

use assess_core::gate::{GateError, GateEvent};
use assess_core::model::{LevelId, Placement, TrackId};
use assess_core::placement::{PlacementRule, RuleTable};
use assess_core::routing::{Edge, JumpTable, RoutingError};
use assess_core::time::fixed_clock;
use chrono::Duration;
use services::{Answer, AnswerOutcome, AssessmentEngine, EngineConfig, EngineError, EngineStatus};
use storage::repository::{InMemoryRepository, SessionStore};

use common::{SIX_LEVELS, answer_level, catalogue, listen};

async fn adaptive_engine(levels: &[LevelId]) -> (AssessmentEngine, InMemoryRepository) {
    let repo = InMemoryRepository::new();
    let engine = AssessmentEngine::start(
        catalogue(levels),
        EngineConfig::adaptive(),
        fixed_clock(),
        Arc::new(repo.clone()),
    )
    .await
    .unwrap();
    (engine, repo)
}

#[tokio::test]
async fn b2_pass_then_c1_fail_places_b2() {
    let (mut engine, repo) = adaptive_engine(&SIX_LEVELS).await;
    assert_eq!(engine.status(), EngineStatus::Testing(LevelId::B2));
    assert_eq!(engine.status().to_string(), "Testing B2");
    assert!(repo.load().await.unwrap().is_some());

    let result = answer_level(&mut engine, 6).await.unwrap();
    assert_eq!(
        result.outcome,
        AnswerOutcome::NextLevel {
            completed: LevelId::B2,
            passed: Some(true),
            next: LevelId::C1,
        }
    );

    let result = answer_level(&mut engine, 5).await.unwrap();
    assert_eq!(
        result.outcome,
        AnswerOutcome::Finished(Placement::Level(LevelId::B2))
    );

    let report = engine.report().unwrap();
    assert_eq!(report.administered(), vec![LevelId::B2, LevelId::C1]);
    assert_eq!(report.total_questions(), 16);
    assert_eq!(report.total_correct(), 11);
    assert_eq!(report.levels[1].passed, Some(false));
    assert_eq!(report.feedback, LevelId::B2.feedback());
    assert_eq!(engine.status().to_string(), "Complete");
    assert_eq!(repo.load().await.unwrap(), None);
}

#[tokio::test]
async fn b2_fail_a2_fail_a1_pass_places_a1() {
    let (mut engine, _repo) = adaptive_engine(&SIX_LEVELS).await;

    let result = answer_level(&mut engine, 5).await.unwrap();
    assert!(matches!(
        result.outcome,
        AnswerOutcome::NextLevel {
            next: LevelId::A2,
            ..
        }
    ));
    let result = answer_level(&mut engine, 3).await.unwrap();
    assert!(matches!(
        result.outcome,
        AnswerOutcome::NextLevel {
            next: LevelId::A1,
            ..
        }
    ));
    let result = answer_level(&mut engine, 7).await.unwrap();
    assert_eq!(
        result.outcome,
        AnswerOutcome::Finished(Placement::Level(LevelId::A1))
    );
    assert_eq!(engine.ledger().log().len(), 24);
    assert!(matches!(
        engine.submit_answer(Some(Answer::Pass)).await,
        Err(EngineError::Completed)
    ));
}

#[tokio::test]
async fn sweep_administers_every_level_and_resolves_b1() {
    let rules = RuleTable::new(
        SIX_LEVELS
            .into_iter()
            .zip([4, 5, 5, 6, 6, 7])
            .map(|(level, min_score)| PlacementRule { level, min_score })
            .collect(),
    )
    .unwrap();
    let mut engine = AssessmentEngine::start(
        catalogue(&SIX_LEVELS),
        EngineConfig::sweep(rules),
        fixed_clock(),
        Arc::new(InMemoryRepository::new()),
    )
    .await
    .unwrap();
    assert_eq!(engine.status(), EngineStatus::Testing(LevelId::A1));

    let mut last = None;
    for correct in [8, 7, 6, 4, 2, 0] {
        last = Some(answer_level(&mut engine, correct).await.unwrap().outcome);
    }
    assert_eq!(last, Some(AnswerOutcome::Finished(Placement::Level(LevelId::B1))));
    assert_eq!(engine.administered(), &SIX_LEVELS);

    let report = engine.report().unwrap();
    let passed: Vec<_> = report.levels.iter().map(|l| l.passed).collect();
    assert_eq!(
        passed,
        vec![Some(true), Some(true), Some(true), Some(false), Some(false), Some(false)]
    );
}

#[tokio::test]
async fn sweep_level_without_a_rule_ends_the_session_when_it_completes() {
    let rules = RuleTable::new(
        SIX_LEVELS[1..]
            .iter()
            .map(|&level| PlacementRule { level, min_score: 5 })
            .collect(),
    )
    .unwrap();
    let mut engine = AssessmentEngine::start(
        catalogue(&SIX_LEVELS),
        EngineConfig::sweep(rules),
        fixed_clock(),
        Arc::new(InMemoryRepository::new()),
    )
    .await
    .unwrap();

    let err = answer_level(&mut engine, 8).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Routing(RoutingError::MissingRule(LevelId::A1))
    ));
    assert_eq!(engine.placement(), Some(Placement::Error));
    assert_eq!(engine.administered(), &[LevelId::A1]);
    assert_eq!(engine.ledger().log().len(), 8);
}

#[tokio::test]
async fn answering_is_locked_until_the_first_full_listen() {
    let (mut engine, _repo) = adaptive_engine(&SIX_LEVELS).await;
    let view = engine.current_question().unwrap();
    assert!(!view.answering_allowed);
    assert_eq!(view.play_label(), "PLAY AUDIO");
    assert_eq!(view.options.len(), 4);

    assert!(matches!(
        engine.submit_answer(Some(Answer::Option(0))).await,
        Err(EngineError::Gate(GateError::AnsweringLocked(_)))
    ));
    assert!(engine.ledger().log().is_empty());

    let track = engine.begin_playback().unwrap();
    assert!(matches!(
        engine.submit_answer(Some(Answer::Option(0))).await,
        Err(EngineError::Gate(GateError::AnsweringLocked(_)))
    ));
    assert_eq!(
        engine.playback_completed(&track).await.unwrap(),
        GateEvent::Unlocked
    );
    let view = engine.current_question().unwrap();
    assert!(view.answering_allowed);
    assert_eq!(view.play_label(), "PLAY AGAIN");
}

#[tokio::test]
async fn rejected_input_leaves_the_ledger_untouched() {
    let (mut engine, _repo) = adaptive_engine(&SIX_LEVELS).await;
    listen(&mut engine).await;

    assert!(matches!(
        engine.submit_answer(None).await,
        Err(EngineError::NoSelection)
    ));
    assert!(matches!(
        engine.submit_answer(Some(Answer::Option(4))).await,
        Err(EngineError::InvalidOption(4))
    ));
    assert!(engine.ledger().log().is_empty());
    assert_eq!(engine.current_question().unwrap().question_number, 1);

    let result = engine.submit_answer(Some(Answer::Pass)).await.unwrap();
    assert!(result.record.skipped);
    assert!(!result.record.correct);
    assert_eq!(result.record.selected_option, None);
    assert_eq!(result.outcome, AnswerOutcome::NextQuestion);
}

#[tokio::test]
async fn pause_and_seek_are_refused_while_playing() {
    let (mut engine, _repo) = adaptive_engine(&SIX_LEVELS).await;

    let track = engine.begin_playback().unwrap();
    assert!(matches!(
        engine.request_pause(),
        Err(EngineError::Gate(GateError::PlaybackLocked(_)))
    ));
    assert!(engine.request_seek(12.0).is_err());
    assert!(matches!(
        engine.begin_playback(),
        Err(EngineError::Gate(GateError::AlreadyPlaying(_)))
    ));
    assert!(matches!(
        engine.playback_completed(&TrackId::new("a1_1")).await,
        Err(EngineError::Gate(GateError::TrackMismatch { .. }))
    ));

    engine.playback_failed("decode error");
    assert!(!engine.gate().is_playing());
    assert!(!engine.is_answering_allowed());
    assert!(engine.request_pause().is_ok());

    assert_eq!(engine.begin_playback().unwrap(), track);
    engine.playback_completed(&track).await.unwrap();
    assert!(engine.is_answering_allowed());
}

#[tokio::test]
async fn elapsed_time_runs_from_reveal_to_submission() {
    let (mut engine, _repo) = adaptive_engine(&SIX_LEVELS).await;

    engine.clock_mut().advance(Duration::seconds(30));
    listen(&mut engine).await;
    engine.clock_mut().advance(Duration::milliseconds(5_250));
    let first = engine.submit_answer(Some(Answer::Option(0))).await.unwrap();
    assert!((first.record.elapsed_seconds - 5.25).abs() < 1e-9);

    engine.clock_mut().advance(Duration::seconds(2));
    let second = engine.submit_answer(Some(Answer::Option(0))).await.unwrap();
    assert!((second.record.elapsed_seconds - 2.0).abs() < 1e-9);

    let entry = engine.ledger().entry(LevelId::B2).unwrap();
    assert!((entry.total_time - 7.25).abs() < 1e-9);
}

#[tokio::test]
async fn replays_are_counted_per_track_and_mirrored_into_the_ledger() {
    let (mut engine, _repo) = adaptive_engine(&SIX_LEVELS).await;
    listen(&mut engine).await;
    let track = engine.begin_playback().unwrap();
    assert_eq!(
        engine.playback_completed(&track).await.unwrap(),
        GateEvent::Replayed
    );

    let mut last = None;
    for _ in 0..4 {
        last = Some(engine.submit_answer(Some(Answer::Option(0))).await.unwrap());
    }
    let last = last.unwrap();
    assert_eq!(last.record.listens, 2);
    assert_eq!(last.record.replays(), 1);
    assert_eq!(last.outcome, AnswerOutcome::NextTrack(TrackId::new("b2_2")));

    // new track: gate closed, counter reset
    assert!(!engine.is_answering_allowed());
    assert_eq!(engine.gate().listen_count(), 0);
    assert!(matches!(
        engine.submit_answer(Some(Answer::Option(0))).await,
        Err(EngineError::Gate(GateError::AnsweringLocked(_)))
    ));
    assert_eq!(engine.ledger().log().len(), 4);

    listen(&mut engine).await;
    assert_eq!(engine.ledger().entry(LevelId::B2).unwrap().total_listens, 3);
}

#[tokio::test]
async fn missing_jump_target_terminates_with_error_placement() {
    let (mut engine, repo) = adaptive_engine(&[LevelId::B2, LevelId::C1]).await;

    let err = answer_level(&mut engine, 0).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Routing(RoutingError::TargetMissing(LevelId::A2))
    ));
    assert!(!err.is_recoverable());

    assert!(engine.is_complete());
    assert_eq!(engine.placement(), Some(Placement::Error));
    assert_eq!(engine.status(), EngineStatus::Complete(Placement::Error));
    let report = engine.report().unwrap();
    assert!(report.failure.is_some());
    assert_eq!(report.feedback, "Thank you for participating.");
    assert_eq!(report.total_questions(), 8);
    assert_eq!(repo.load().await.unwrap(), None);
    assert!(engine.current_question().is_none());
}

#[tokio::test]
async fn cyclic_jump_table_is_stopped_on_revisit() {
    let table = JumpTable::new(LevelId::B2)
        .with_node(LevelId::B2, Edge::Goto(LevelId::C1), Edge::Goto(LevelId::C1))
        .with_node(LevelId::C1, Edge::Goto(LevelId::B2), Edge::Goto(LevelId::B2));
    let mut engine = AssessmentEngine::start(
        catalogue(&SIX_LEVELS),
        EngineConfig::adaptive().with_jump_table(table),
        fixed_clock(),
        Arc::new(InMemoryRepository::new()),
    )
    .await
    .unwrap();

    answer_level(&mut engine, 8).await.unwrap();
    let err = answer_level(&mut engine, 8).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Routing(RoutingError::Revisit(LevelId::B2))
    ));
    assert_eq!(engine.placement(), Some(Placement::Error));
}

#[tokio::test]
async fn missing_start_level_fails_before_the_first_question() {
    let err = AssessmentEngine::start(
        catalogue(&[LevelId::A1, LevelId::A2]),
        EngineConfig::adaptive(),
        fixed_clock(),
        Arc::new(InMemoryRepository::new()),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Routing(RoutingError::StartLevelMissing(LevelId::B2))
    ));
}

#[tokio::test]
async fn lower_pass_mark_changes_the_route() {
    let mut engine = AssessmentEngine::start(
        catalogue(&SIX_LEVELS),
        EngineConfig::adaptive().with_pass_mark(4),
        fixed_clock(),
        Arc::new(InMemoryRepository::new()),
    )
    .await
    .unwrap();

    let result = answer_level(&mut engine, 4).await.unwrap();
    assert!(matches!(
        result.outcome,
        AnswerOutcome::NextLevel {
            next: LevelId::C1,
            passed: Some(true),
            ..
        }
    ));
}

#[tokio::test]
async fn bundled_content_runs_under_both_policies() {
    use assess_core::model::{Audience, ContentFile};

    let file = ContentFile::from_json_str(include_str!("../../../data/questions.json")).unwrap();
    let rules = RuleTable::from_json_str(include_str!("../../../data/rules.json")).unwrap();
    assert_eq!(file.audiences(), vec![Audience::Adult, Audience::YoungPeople]);

    for audience in file.audiences() {
        let catalogue = Arc::new(file.select(audience).unwrap());
        assert_eq!(catalogue.level_ids(), SIX_LEVELS.to_vec());

        for config in [EngineConfig::adaptive(), EngineConfig::sweep(rules.clone())] {
            let engine = AssessmentEngine::start(
                Arc::clone(&catalogue),
                config,
                fixed_clock(),
                Arc::new(InMemoryRepository::new()),
            )
            .await
            .unwrap();
            assert!(engine.current_question().is_some());
        }
    }
}
