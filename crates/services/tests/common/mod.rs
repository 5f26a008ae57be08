#![allow(dead_code)]

use std::sync::Arc;

use assess_core::model::{Audience, Catalogue, ContentFile, LevelId};
use serde_json::{Value, json};
use services::{Answer, AnswerResult, AssessmentEngine, EngineError};

pub const SIX_LEVELS: [LevelId; 6] = [
    LevelId::A1,
    LevelId::A2,
    LevelId::B1,
    LevelId::B2,
    LevelId::C1,
    LevelId::C2,
];

fn level_json(level: LevelId, tracks: usize) -> Value {
    let audios: Vec<Value> = (1..=tracks)
        .map(|n| {
            let questions: Vec<Value> = (1..=4)
                .map(|q| {
                    json!({
                        "text": format!("{level} track {n} question {q}"),
                        "options": ["right", "wrong 1", "wrong 2", "wrong 3"],
                        "answer": "A",
                    })
                })
                .collect();
            json!({
                "track_id": format!("{}_{n}", level.as_str().to_lowercase()),
                "title": format!("{level} scenario {n}"),
                "scenario": "At the station",
                "questions": questions,
            })
        })
        .collect();
    json!({ "level_id": level.as_str(), "audios": audios })
}

/// Content file with an adult and a young-people version over the same levels.
pub fn content_json(levels: &[LevelId]) -> String {
    let levels: Vec<Value> = levels.iter().map(|&l| level_json(l, 2)).collect();
    json!({
        "versions": [
            { "audience": "adult", "levels": levels },
            { "audience": "young_people", "levels": levels },
        ]
    })
    .to_string()
}

pub fn catalogue(levels: &[LevelId]) -> Arc<Catalogue> {
    catalogue_for(levels, Audience::Adult)
}

pub fn catalogue_for(levels: &[LevelId], audience: Audience) -> Arc<Catalogue> {
    let file = ContentFile::from_json_str(&content_json(levels)).unwrap();
    Arc::new(file.select(audience).unwrap())
}

/// Play the current track once, start to finish.
pub async fn listen(engine: &mut AssessmentEngine) {
    let track = engine.begin_playback().unwrap();
    engine.playback_completed(&track).await.unwrap();
}

/// Answer every remaining question of the current level, the first `correct`
/// of them right, listening to each track once. Returns the last result.
pub async fn answer_level(
    engine: &mut AssessmentEngine,
    correct: usize,
) -> Result<AnswerResult, EngineError> {
    let progress = engine.progress();
    let level = progress.level;
    let answered = engine.ledger().entry(level).map_or(0, |e| e.total as usize);
    let remaining = progress.tracks_in_level * 4 - answered;

    let mut last = None;
    for n in 0..remaining {
        if !engine.is_answering_allowed() {
            listen(engine).await;
        }
        let answer = if n < correct {
            Answer::Option(0)
        } else {
            Answer::Option(1)
        };
        last = Some(engine.submit_answer(Some(answer)).await);
    }
    last.unwrap()
}
