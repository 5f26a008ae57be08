//! Line-oriented driver for one assessment over stdin/stdout.
//!
//! There is no audio device here: Enter starts a playback and a second Enter
//! reports it as played to the end. `x` reports a playback failure instead.

use std::sync::Arc;

use assess_core::model::{Catalogue, OptionId};
use assess_core::report::AssessmentReport;
use services::{
    Answer, AnswerOutcome, AssessmentEngine, Clock, EngineConfig, EngineError, QuestionView,
};
use storage::repository::SessionStore;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

type Input = Lines<BufReader<Stdin>>;

/// Run (or resume) a session until it completes or stdin closes.
///
/// Returns the report when the session reached its terminal state.
pub async fn run_session(
    catalogue: Arc<Catalogue>,
    config: EngineConfig,
    clock: Clock,
    store: Arc<dyn SessionStore>,
) -> Result<Option<AssessmentReport>, Box<dyn std::error::Error>> {
    let mut engine = AssessmentEngine::resume_or_start(catalogue, config, clock, store).await?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    println!("{} listening assessment", engine.audience().label());
    if engine.was_resumed() {
        println!("Resuming your previous session.");
    }

    while !engine.is_complete() {
        let Some(view) = engine.current_question() else {
            break;
        };
        let step = if view.answering_allowed {
            answer_step(&mut engine, &view, &mut input).await?
        } else {
            listen_step(&mut engine, &view, &mut input).await?
        };
        if step == Step::Quit {
            if engine.has_unsaved_changes() {
                engine.persist().await?;
            }
            println!("Progress saved. Run again to continue.");
            return Ok(None);
        }
    }

    let Some(report) = engine.report().cloned() else {
        return Ok(None);
    };
    println!();
    println!("Your level: {}", report.placement);
    println!("{}", report.feedback);
    if let Some(failure) = &report.failure {
        println!("The assessment could not be completed: {failure}");
    }
    Ok(Some(report))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Quit,
}

fn print_header(engine: &AssessmentEngine, view: &QuestionView) {
    let progress = engine.progress();
    println!();
    println!(
        "[{}]  track {}/{}  question {}/4",
        engine.status(),
        progress.track_number,
        progress.tracks_in_level,
        view.question_number
    );
    println!("{}", view.title);
    if !view.scenario.is_empty() {
        println!("{}", view.scenario);
    }
}

async fn listen_step(
    engine: &mut AssessmentEngine,
    view: &QuestionView,
    input: &mut Input,
) -> Result<Step, Box<dyn std::error::Error>> {
    print_header(engine, view);
    println!("Press Enter to {} (q to quit).", view.play_label().to_lowercase());
    let Some(line) = input.next_line().await? else {
        return Ok(Step::Quit);
    };
    if line.trim().eq_ignore_ascii_case("q") {
        return Ok(Step::Quit);
    }
    play_through(engine, input).await
}

async fn play_through(
    engine: &mut AssessmentEngine,
    input: &mut Input,
) -> Result<Step, Box<dyn std::error::Error>> {
    let track = engine.begin_playback()?;
    println!("Playing {track}. Press Enter when it has finished, or x if it failed.");
    let Some(line) = input.next_line().await? else {
        engine.playback_failed("input closed");
        return Ok(Step::Quit);
    };
    if line.trim().eq_ignore_ascii_case("x") {
        engine.playback_failed("reported by user");
        println!("Playback failed. You can try again.");
        return Ok(Step::Continue);
    }
    engine.playback_completed(&track).await?;
    Ok(Step::Continue)
}

fn parse_answer(line: &str) -> Option<Answer> {
    let trimmed = line.trim();
    if trimmed.eq_ignore_ascii_case("p") {
        return Some(Answer::Pass);
    }
    trimmed
        .parse::<OptionId>()
        .ok()
        .map(|id| Answer::Option(id.index()))
}

async fn answer_step(
    engine: &mut AssessmentEngine,
    view: &QuestionView,
    input: &mut Input,
) -> Result<Step, Box<dyn std::error::Error>> {
    if view.question_number == 1 {
        print_header(engine, view);
    }
    println!();
    println!("{}. {}", view.question_number, view.prompt);
    for (id, text) in &view.options {
        println!("   {id}) {text}");
    }
    println!("Answer A-D, p to pass, r to replay, q to quit.");

    let Some(line) = input.next_line().await? else {
        return Ok(Step::Quit);
    };
    match line.trim().to_ascii_lowercase().as_str() {
        "q" => return Ok(Step::Quit),
        "r" => return play_through(engine, input).await,
        _ => {}
    }

    match engine.submit_answer(parse_answer(&line)).await {
        Ok(result) => {
            match result.outcome {
                AnswerOutcome::NextLevel { completed, next, .. } => {
                    println!("{completed} finished. Moving on to {next}.");
                }
                AnswerOutcome::NextTrack(_) => println!("Next recording."),
                AnswerOutcome::NextQuestion | AnswerOutcome::Finished(_) => {}
            }
            Ok(Step::Continue)
        }
        Err(EngineError::NoSelection) => {
            println!("Please choose an answer first.");
            Ok(Step::Continue)
        }
        // Routing failures leave the engine terminal; the caller prints the result.
        Err(EngineError::Routing(_)) => Ok(Step::Continue),
        Err(err) if err.is_recoverable() => {
            println!("{err}");
            Ok(Step::Continue)
        }
        Err(err) => Err(err.into()),
    }
}
