use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::{LedgerEntry, ResponseRecord, ScoringLedger};
use crate::model::{Audience, LevelId, Placement, SessionId};
use crate::routing::{PolicyKind, RoutingPolicy};

/// Aggregates for one administered level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelResult {
    pub level: LevelId,
    /// `None` when the policy has no verdict for this level (sweep without a rule).
    pub passed: Option<bool>,
    #[serde(flatten)]
    pub entry: LedgerEntry,
}

/// Final outcome of a session, as handed to export collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentReport {
    pub session_id: SessionId,
    pub audience: Audience,
    pub policy: PolicyKind,
    pub placement: Placement,
    pub feedback: String,
    pub levels: Vec<LevelResult>,
    pub responses: Vec<ResponseRecord>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Set when the session ended on a routing configuration error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl AssessmentReport {
    /// Build the report from the session's ledger.
    ///
    /// `administered` gives the order levels were entered; only those appear
    /// in `levels`.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_ledger(
        session_id: SessionId,
        audience: Audience,
        policy: &RoutingPolicy,
        placement: Placement,
        ledger: &ScoringLedger,
        administered: &[LevelId],
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        failure: Option<String>,
    ) -> Self {
        let levels = administered
            .iter()
            .map(|&level| LevelResult {
                level,
                passed: policy.level_passed(level, ledger),
                entry: ledger.entry(level).copied().unwrap_or_default(),
            })
            .collect();

        Self {
            session_id,
            audience,
            policy: policy.kind(),
            placement,
            feedback: placement.feedback().to_string(),
            levels,
            responses: ledger.log().to_vec(),
            started_at,
            completed_at,
            failure,
        }
    }

    #[must_use]
    pub fn total_correct(&self) -> u32 {
        self.levels.iter().map(|l| l.entry.correct).sum()
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.responses.len()
    }

    #[must_use]
    pub fn administered(&self) -> Vec<LevelId> {
        self.levels.iter().map(|l| l.level).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{AnswerTiming, Response};
    use crate::model::{AudioTrack, OptionId, Question, TrackId};
    use crate::time::fixed_now;

    #[test]
    fn report_lists_only_administered_levels() {
        let q = || {
            Question::new(
                "Q",
                ["A".into(), "B".into(), "C".into(), "D".into()],
                OptionId::C,
            )
        };
        let track = AudioTrack::new(TrackId::new("b2_1"), "T", "S", [q(), q(), q(), q()]);
        let mut ledger = ScoringLedger::with_levels(LevelId::ALL);
        for index in 0..4 {
            ledger
                .record_response(
                    LevelId::B2,
                    &track,
                    index,
                    Response::Selected(OptionId::C),
                    AnswerTiming {
                        listens: 1,
                        elapsed_seconds: 1.0,
                        answered_at: fixed_now(),
                    },
                )
                .unwrap();
        }

        let report = AssessmentReport::from_ledger(
            SessionId::generate(),
            Audience::Adult,
            &RoutingPolicy::adaptive(),
            Placement::Level(LevelId::B2),
            &ledger,
            &[LevelId::B2],
            fixed_now(),
            fixed_now(),
            None,
        );

        assert_eq!(report.administered(), vec![LevelId::B2]);
        assert_eq!(report.total_correct(), 4);
        assert_eq!(report.total_questions(), 4);
        assert_eq!(report.levels[0].passed, Some(false));
        assert!(report.feedback.starts_with("Understands main ideas"));
    }
}
