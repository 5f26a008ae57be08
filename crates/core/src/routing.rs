use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::ledger::ScoringLedger;
use crate::model::{Catalogue, LevelId, Placement};
use crate::placement::RuleTable;

/// Default adaptive pass mark: 6 correct of 8 (75%).
pub const DEFAULT_PASS_MARK: u32 = 6;

/// Default anchor level for the adaptive policy.
pub const DEFAULT_START_LEVEL: LevelId = LevelId::B2;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Routing configuration failures. Fatal for the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RoutingError {
    #[error("start level {0} is not in the catalogue")]
    StartLevelMissing(LevelId),

    #[error("jump table has no node for level {0}")]
    UnknownLevel(LevelId),

    #[error("routing target {0} is not in the catalogue")]
    TargetMissing(LevelId),

    #[error("no placement rule for administered level {0}")]
    MissingRule(LevelId),

    #[error("routing would administer level {0} a second time")]
    Revisit(LevelId),

    #[error("level {level} evaluated after {answered} of {expected} questions")]
    LevelIncomplete {
        level: LevelId,
        answered: u32,
        expected: usize,
    },
}

//
// ─── JUMP TABLE ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Fail,
}

impl Outcome {
    #[must_use]
    pub fn from_passed(passed: bool) -> Self {
        if passed { Outcome::Pass } else { Outcome::Fail }
    }
}

/// Where an edge of the jump table leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Goto(LevelId),
    Finish(Placement),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub on_pass: Edge,
    pub on_fail: Edge,
}

/// Directed pass/fail graph over level ids, anchored at a start level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JumpTable {
    start: LevelId,
    nodes: BTreeMap<LevelId, Node>,
}

impl JumpTable {
    #[must_use]
    pub fn new(start: LevelId) -> Self {
        Self {
            start,
            nodes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_node(mut self, level: LevelId, on_pass: Edge, on_fail: Edge) -> Self {
        self.nodes.insert(level, Node { on_pass, on_fail });
        self
    }

    /// The B2-anchored table:
    ///
    /// ```text
    /// B2: pass→C1, fail→A2
    /// C1: pass→C2, fail→=B2
    /// C2: pass→=C2, fail→=C1
    /// A2: pass→B1, fail→A1
    /// B1: pass→=B1, fail→=A2
    /// A1: pass→=A1, fail→=Pre-A1
    /// ```
    #[must_use]
    pub fn standard() -> Self {
        use Edge::{Finish, Goto};
        let at = |level| Finish(Placement::Level(level));

        Self::new(DEFAULT_START_LEVEL)
            .with_node(LevelId::B2, Goto(LevelId::C1), Goto(LevelId::A2))
            .with_node(LevelId::C1, Goto(LevelId::C2), at(LevelId::B2))
            .with_node(LevelId::C2, at(LevelId::C2), at(LevelId::C1))
            .with_node(LevelId::A2, Goto(LevelId::B1), Goto(LevelId::A1))
            .with_node(LevelId::B1, at(LevelId::B1), at(LevelId::A2))
            .with_node(LevelId::A1, at(LevelId::A1), at(LevelId::PreA1))
    }

    #[must_use]
    pub fn start(&self) -> LevelId {
        self.start
    }

    #[must_use]
    pub fn nodes(&self) -> &BTreeMap<LevelId, Node> {
        &self.nodes
    }

    /// # Errors
    ///
    /// Returns `RoutingError::UnknownLevel` if `level` has no node.
    pub fn next(&self, level: LevelId, outcome: Outcome) -> Result<Edge, RoutingError> {
        let node = self
            .nodes
            .get(&level)
            .ok_or(RoutingError::UnknownLevel(level))?;
        Ok(match outcome {
            Outcome::Pass => node.on_pass,
            Outcome::Fail => node.on_fail,
        })
    }
}

impl Default for JumpTable {
    fn default() -> Self {
        Self::standard()
    }
}

//
// ─── POLICY ────────────────────────────────────────────────────────────────────
//

/// Decision taken once every question of a level has been answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    Advance(LevelId),
    Terminate(Placement),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Adaptive,
    Sweep,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            PolicyKind::Adaptive => "adaptive",
            PolicyKind::Sweep => "sweep",
        })
    }
}

/// Level-routing strategy, chosen when the session is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingPolicy {
    /// Early-exit pass/fail traversal of a jump table.
    Adaptive { table: JumpTable, pass_mark: u32 },
    /// Every catalogue level in canonical order, then the rule table.
    Sweep { rules: RuleTable },
}

impl RoutingPolicy {
    /// Standard B2-anchored jump table with a pass mark of 6.
    #[must_use]
    pub fn adaptive() -> Self {
        RoutingPolicy::Adaptive {
            table: JumpTable::standard(),
            pass_mark: DEFAULT_PASS_MARK,
        }
    }

    #[must_use]
    pub fn sweep(rules: RuleTable) -> Self {
        RoutingPolicy::Sweep { rules }
    }

    #[must_use]
    pub fn kind(&self) -> PolicyKind {
        match self {
            RoutingPolicy::Adaptive { .. } => PolicyKind::Adaptive,
            RoutingPolicy::Sweep { .. } => PolicyKind::Sweep,
        }
    }

    /// # Errors
    ///
    /// Returns `RoutingError::StartLevelMissing` if the adaptive anchor is absent.
    pub fn start_level(&self, catalogue: &Catalogue) -> Result<LevelId, RoutingError> {
        match self {
            RoutingPolicy::Adaptive { table, .. } => {
                let start = table.start();
                if catalogue.contains(start) {
                    Ok(start)
                } else {
                    Err(RoutingError::StartLevelMissing(start))
                }
            }
            RoutingPolicy::Sweep { .. } => catalogue
                .levels()
                .first()
                .map(|l| l.id())
                .ok_or(RoutingError::StartLevelMissing(LevelId::PreA1)),
        }
    }

    /// Pass/fail verdict for a level under this policy, if one is defined.
    #[must_use]
    pub fn level_passed(&self, level: LevelId, ledger: &ScoringLedger) -> Option<bool> {
        match self {
            RoutingPolicy::Adaptive { pass_mark, .. } => {
                Some(ledger.evaluate_level(level, *pass_mark))
            }
            RoutingPolicy::Sweep { rules } => rules
                .min_score(level)
                .map(|min| ledger.evaluate_level(level, min)),
        }
    }

    /// Decide what follows a completed level.
    ///
    /// `administered` lists every level entered so far, including `level`.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError` if the level is not complete, the table has no
    /// edge for it, its target is not in the catalogue, or (sweep) a rule is
    /// missing.
    pub fn next_action(
        &self,
        level: LevelId,
        ledger: &ScoringLedger,
        catalogue: &Catalogue,
        administered: &[LevelId],
    ) -> Result<NextAction, RoutingError> {
        ensure_complete(level, ledger, catalogue)?;

        match self {
            RoutingPolicy::Adaptive { table, pass_mark } => {
                let outcome = Outcome::from_passed(ledger.evaluate_level(level, *pass_mark));
                match table.next(level, outcome)? {
                    Edge::Goto(target) if catalogue.contains(target) => {
                        Ok(NextAction::Advance(target))
                    }
                    Edge::Goto(target) => Err(RoutingError::TargetMissing(target)),
                    Edge::Finish(placement) => Ok(NextAction::Terminate(placement)),
                }
            }
            RoutingPolicy::Sweep { rules } => {
                if rules.min_score(level).is_none() {
                    return Err(RoutingError::MissingRule(level));
                }
                let index = catalogue
                    .index_of(level)
                    .ok_or(RoutingError::TargetMissing(level))?;
                match catalogue.level(index + 1) {
                    Some(next) => Ok(NextAction::Advance(next.id())),
                    None => rules
                        .resolve(ledger, administered)
                        .map(|placed| NextAction::Terminate(Placement::Level(placed))),
                }
            }
        }
    }
}

fn ensure_complete(
    level: LevelId,
    ledger: &ScoringLedger,
    catalogue: &Catalogue,
) -> Result<(), RoutingError> {
    let expected = catalogue
        .index_of(level)
        .and_then(|i| catalogue.level(i))
        .map_or(0, |l| l.question_count());
    let answered = ledger.entry(level).map_or(0, |e| e.questions_answered);
    let answered_usize = usize::try_from(answered).unwrap_or(usize::MAX);

    if expected == 0 || answered_usize < expected {
        return Err(RoutingError::LevelIncomplete {
            level,
            answered,
            expected,
        });
    }
    Ok(())
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{AnswerTiming, Response};
    use crate::model::{Audience, AudioTrack, Level, OptionId, Question, TrackId};
    use crate::placement::PlacementRule;
    use crate::time::fixed_now;

    fn track(id: String) -> AudioTrack {
        let q = || {
            Question::new(
                "Q",
                ["A".into(), "B".into(), "C".into(), "D".into()],
                OptionId::A,
            )
        };
        AudioTrack::new(TrackId::new(id), "T", "S", [q(), q(), q(), q()])
    }

    fn catalogue(levels: &[LevelId]) -> Catalogue {
        let levels = levels
            .iter()
            .map(|&id| {
                Level::new(
                    id,
                    vec![track(format!("{id}_1")), track(format!("{id}_2"))],
                )
                .unwrap()
            })
            .collect();
        Catalogue::new(Audience::Adult, levels).unwrap()
    }

    fn six_levels() -> Catalogue {
        catalogue(&[
            LevelId::A1,
            LevelId::A2,
            LevelId::B1,
            LevelId::B2,
            LevelId::C1,
            LevelId::C2,
        ])
    }

    fn score(ledger: &mut ScoringLedger, catalogue: &Catalogue, level: LevelId, correct: u32) {
        let lvl = &catalogue.levels()[catalogue.index_of(level).unwrap()];
        let mut n = 0;
        for track in lvl.tracks() {
            for index in 0..4 {
                let response = if n < correct {
                    Response::Selected(OptionId::A)
                } else {
                    Response::Selected(OptionId::B)
                };
                n += 1;
                let timing = AnswerTiming {
                    listens: 1,
                    elapsed_seconds: 2.0,
                    answered_at: fixed_now(),
                };
                ledger
                    .record_response(level, track, index, response, timing)
                    .unwrap();
            }
        }
    }

    #[test]
    fn b2_pass_then_c1_fail_places_b2() {
        let cat = six_levels();
        let policy = RoutingPolicy::adaptive();
        let mut ledger = ScoringLedger::with_levels(cat.level_ids());

        assert_eq!(policy.start_level(&cat).unwrap(), LevelId::B2);
        score(&mut ledger, &cat, LevelId::B2, 6);
        assert_eq!(
            policy
                .next_action(LevelId::B2, &ledger, &cat, &[LevelId::B2])
                .unwrap(),
            NextAction::Advance(LevelId::C1)
        );

        score(&mut ledger, &cat, LevelId::C1, 5);
        assert_eq!(
            policy
                .next_action(LevelId::C1, &ledger, &cat, &[LevelId::B2, LevelId::C1])
                .unwrap(),
            NextAction::Terminate(Placement::Level(LevelId::B2))
        );
    }

    #[test]
    fn b2_fail_a2_fail_a1_pass_places_a1() {
        let cat = six_levels();
        let policy = RoutingPolicy::adaptive();
        let mut ledger = ScoringLedger::with_levels(cat.level_ids());

        score(&mut ledger, &cat, LevelId::B2, 5);
        assert_eq!(
            policy.next_action(LevelId::B2, &ledger, &cat, &[]).unwrap(),
            NextAction::Advance(LevelId::A2)
        );
        score(&mut ledger, &cat, LevelId::A2, 3);
        assert_eq!(
            policy.next_action(LevelId::A2, &ledger, &cat, &[]).unwrap(),
            NextAction::Advance(LevelId::A1)
        );
        score(&mut ledger, &cat, LevelId::A1, 7);
        assert_eq!(
            policy.next_action(LevelId::A1, &ledger, &cat, &[]).unwrap(),
            NextAction::Terminate(Placement::Level(LevelId::A1))
        );
    }

    #[test]
    fn every_terminal_edge_is_a_known_placement() {
        let table = JumpTable::standard();
        for node in table.nodes().values() {
            for edge in [node.on_pass, node.on_fail] {
                match edge {
                    Edge::Goto(target) => assert!(table.nodes().contains_key(&target)),
                    Edge::Finish(p) => assert!(p.level().is_some()),
                }
            }
        }
        assert!(!table.nodes().contains_key(&LevelId::PreA1));
    }

    #[test]
    fn evaluating_an_incomplete_level_is_rejected() {
        let cat = six_levels();
        let ledger = ScoringLedger::with_levels(cat.level_ids());
        let err = RoutingPolicy::adaptive()
            .next_action(LevelId::B2, &ledger, &cat, &[LevelId::B2])
            .unwrap_err();
        assert!(matches!(
            err,
            RoutingError::LevelIncomplete {
                answered: 0,
                expected: 8,
                ..
            }
        ));
    }

    #[test]
    fn missing_target_level_is_a_routing_error() {
        let cat = catalogue(&[LevelId::B2, LevelId::C1]);
        let mut ledger = ScoringLedger::with_levels(cat.level_ids());
        score(&mut ledger, &cat, LevelId::B2, 0);
        let err = RoutingPolicy::adaptive()
            .next_action(LevelId::B2, &ledger, &cat, &[LevelId::B2])
            .unwrap_err();
        assert_eq!(err, RoutingError::TargetMissing(LevelId::A2));
    }

    #[test]
    fn level_without_node_is_a_routing_error() {
        let cat = catalogue(&[LevelId::PreA1, LevelId::B2]);
        let mut ledger = ScoringLedger::with_levels(cat.level_ids());
        score(&mut ledger, &cat, LevelId::PreA1, 8);
        let err = RoutingPolicy::adaptive()
            .next_action(LevelId::PreA1, &ledger, &cat, &[LevelId::PreA1])
            .unwrap_err();
        assert_eq!(err, RoutingError::UnknownLevel(LevelId::PreA1));
    }

    #[test]
    fn adaptive_start_must_exist() {
        let cat = catalogue(&[LevelId::A1]);
        assert_eq!(
            RoutingPolicy::adaptive().start_level(&cat).unwrap_err(),
            RoutingError::StartLevelMissing(LevelId::B2)
        );
    }

    #[test]
    fn sweep_stops_at_a_level_without_a_rule() {
        let cat = catalogue(&[LevelId::A1, LevelId::A2]);
        let rules = RuleTable::new(vec![PlacementRule {
            level: LevelId::A2,
            min_score: 5,
        }])
        .unwrap();
        let mut ledger = ScoringLedger::with_levels(cat.level_ids());
        score(&mut ledger, &cat, LevelId::A1, 8);
        assert_eq!(
            RoutingPolicy::sweep(rules)
                .next_action(LevelId::A1, &ledger, &cat, &[LevelId::A1])
                .unwrap_err(),
            RoutingError::MissingRule(LevelId::A1)
        );
    }

    #[test]
    fn sweep_walks_every_level_then_resolves() {
        let cat = catalogue(&[LevelId::A1, LevelId::A2]);
        let rules = RuleTable::new(vec![
            PlacementRule {
                level: LevelId::A1,
                min_score: 4,
            },
            PlacementRule {
                level: LevelId::A2,
                min_score: 5,
            },
        ])
        .unwrap();
        let policy = RoutingPolicy::sweep(rules);
        let mut ledger = ScoringLedger::with_levels(cat.level_ids());

        assert_eq!(policy.start_level(&cat).unwrap(), LevelId::A1);
        // a failed level still advances
        score(&mut ledger, &cat, LevelId::A1, 0);
        assert_eq!(
            policy
                .next_action(LevelId::A1, &ledger, &cat, &[LevelId::A1])
                .unwrap(),
            NextAction::Advance(LevelId::A2)
        );
        score(&mut ledger, &cat, LevelId::A2, 5);
        assert_eq!(
            policy
                .next_action(LevelId::A2, &ledger, &cat, &[LevelId::A1, LevelId::A2])
                .unwrap(),
            NextAction::Terminate(Placement::Level(LevelId::A2))
        );
        assert_eq!(policy.level_passed(LevelId::A1, &ledger), Some(false));
        assert_eq!(policy.level_passed(LevelId::B1, &ledger), None);
    }
}
