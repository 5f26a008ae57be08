//! Threshold rule table used by the sweep policy to derive a final level.

use serde::{Deserialize, Serialize};

use crate::ledger::ScoringLedger;
use crate::model::{ContentError, LevelId};
use crate::routing::RoutingError;

/// Placement given when no administered level meets its rule.
pub const BELOW_MINIMUM: LevelId = LevelId::PreA1;

/// Minimum correct answers needed to be placed at `level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementRule {
    pub level: LevelId,
    pub min_score: u32,
}

/// Ordered rules, one per level, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable {
    rules: Vec<PlacementRule>,
}

impl RuleTable {
    /// # Errors
    ///
    /// Returns `ContentError` if the table is empty, repeats a level, or is
    /// not in ascending level order.
    pub fn new(rules: Vec<PlacementRule>) -> Result<Self, ContentError> {
        if rules.is_empty() {
            return Err(ContentError::NoRules);
        }
        for pair in rules.windows(2) {
            if pair[0].level == pair[1].level {
                return Err(ContentError::DuplicateRule(pair[1].level));
            }
            if pair[0].level > pair[1].level {
                return Err(ContentError::RulesOutOfOrder(pair[1].level));
            }
        }
        Ok(Self { rules })
    }

    /// Parse a JSON array of `{ "level": "A1", "min_score": 4 }` objects.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::Parse` for malformed JSON, or the errors of [`RuleTable::new`].
    pub fn from_json_str(raw: &str) -> Result<Self, ContentError> {
        let rules: Vec<PlacementRule> =
            serde_json::from_str(raw).map_err(|e| ContentError::Parse(e.to_string()))?;
        Self::new(rules)
    }

    #[must_use]
    pub fn rules(&self) -> &[PlacementRule] {
        &self.rules
    }

    #[must_use]
    pub fn min_score(&self, level: LevelId) -> Option<u32> {
        self.rules
            .iter()
            .find(|rule| rule.level == level)
            .map(|rule| rule.min_score)
    }

    /// Highest administered level whose correct count meets its rule.
    ///
    /// Levels are scanned in ascending order and each qualifying level
    /// overwrites the tentative placement, so a qualifying higher level wins
    /// even when a lower one failed.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::MissingRule` if an administered level has no rule.
    pub fn resolve(
        &self,
        ledger: &ScoringLedger,
        administered: &[LevelId],
    ) -> Result<LevelId, RoutingError> {
        let mut levels = administered.to_vec();
        levels.sort();
        levels.dedup();

        let mut placement = BELOW_MINIMUM;
        for level in levels {
            let min_score = self
                .min_score(level)
                .ok_or(RoutingError::MissingRule(level))?;
            if ledger.evaluate_level(level, min_score) {
                placement = level;
            }
        }
        Ok(placement)
    }
}
