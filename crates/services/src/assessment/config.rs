use assess_core::model::LevelId;
use assess_core::placement::RuleTable;
use assess_core::routing::{JumpTable, RoutingPolicy};

/// Session-level engine configuration, fixed before the first question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub policy: RoutingPolicy,
}

impl EngineConfig {
    /// Standard adaptive routing: B2 anchor, pass mark 6.
    #[must_use]
    pub fn adaptive() -> Self {
        Self {
            policy: RoutingPolicy::adaptive(),
        }
    }

    #[must_use]
    pub fn sweep(rules: RuleTable) -> Self {
        Self {
            policy: RoutingPolicy::sweep(rules),
        }
    }

    /// Override the adaptive pass mark. No effect on the sweep policy.
    #[must_use]
    pub fn with_pass_mark(mut self, mark: u32) -> Self {
        if let RoutingPolicy::Adaptive { pass_mark, .. } = &mut self.policy {
            *pass_mark = mark;
        }
        self
    }

    /// Replace the adaptive jump table. No effect on the sweep policy.
    #[must_use]
    pub fn with_jump_table(mut self, jump_table: JumpTable) -> Self {
        if let RoutingPolicy::Adaptive { table, .. } = &mut self.policy {
            *table = jump_table;
        }
        self
    }

    /// Level the adaptive policy starts from, if adaptive.
    #[must_use]
    pub fn adaptive_start(&self) -> Option<LevelId> {
        match &self.policy {
            RoutingPolicy::Adaptive { table, .. } => Some(table.start()),
            RoutingPolicy::Sweep { .. } => None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::adaptive()
    }
}
