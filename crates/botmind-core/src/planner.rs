//! Action planning.
//!
//! A plan is the behavior kind's fixed action template, instantiated
//! through the action catalog (kinds without a registered body are
//! dropped) and then optimized with one pass that collapses adjacent
//! duplicates. Planning never looks ahead.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use botmind_types::{ActionKind, AgentContext, AgentId, BehaviorKind};
use serde::Serialize;
use tracing::debug;

use crate::catalog::{Behavior, Catalog};
use crate::priority::{UNKNOWN_PRIORITY, default_action_base};

/// Errors raised while planning.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// None of the template's actions has a registered body.
    #[error("no executable actions for behavior {behavior}")]
    Empty {
        /// The behavior being planned.
        behavior: BehaviorKind,
    },
}

/// Estimated wall-clock cost of one action, in milliseconds.
pub const fn action_cost_ms(kind: ActionKind) -> u64 {
    match kind {
        ActionKind::Move => 2000,
        ActionKind::Attack => 1500,
        ActionKind::CastSkill => 3000,
        ActionKind::Pickup => 1000,
        ActionKind::Idle
        | ActionKind::Turn
        | ActionKind::Stop
        | ActionKind::UseItem
        | ActionKind::Defend
        | ActionKind::Escape
        | ActionKind::Drop
        | ActionKind::Use
        | ActionKind::Equip
        | ActionKind::Unequip
        | ActionKind::Talk
        | ActionKind::Trade
        | ActionKind::JoinParty
        | ActionKind::LeaveParty
        | ActionKind::Rest
        | ActionKind::Heal
        | ActionKind::Meditate
        | ActionKind::Search
        | ActionKind::Scan
        | ActionKind::Investigate
        | ActionKind::Follow
        | ActionKind::Guard
        | ActionKind::Patrol
        | ActionKind::Wait => 0,
    }
}

/// Collapse runs of identical adjacent actions into one.
pub fn optimize(mut sequence: Vec<ActionKind>) -> Vec<ActionKind> {
    sequence.dedup();
    sequence
}

/// Sum of per-action cost estimates.
pub fn estimate_execution_time(sequence: &[ActionKind]) -> Duration {
    let total = sequence
        .iter()
        .fold(0_u64, |acc, &kind| acc.saturating_add(action_cost_ms(kind)));
    Duration::from_millis(total)
}

/// Planning counters for one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanningStats {
    /// Plans produced (non-empty).
    pub plans: u64,
    /// Planning attempts that produced nothing.
    pub failures: u64,
    /// Plans produced per behavior kind.
    pub by_behavior: BTreeMap<BehaviorKind, u64>,
    /// Total actions across all produced plans.
    pub total_actions: u64,
}

impl PlanningStats {
    /// Mean number of actions per produced plan.
    pub fn average_actions(&self) -> f64 {
        if self.plans == 0 {
            return 0.0;
        }
        let actions = u32::try_from(self.total_actions).map_or(f64::from(u32::MAX), f64::from);
        let plans = u32::try_from(self.plans).map_or(f64::from(u32::MAX), f64::from);
        actions / plans
    }
}

/// Turns behaviors into executable action sequences.
pub struct ActionPlanner {
    catalog: Arc<dyn Catalog>,
    stats: Mutex<HashMap<AgentId, PlanningStats>>,
}

impl core::fmt::Debug for ActionPlanner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ActionPlanner").finish_non_exhaustive()
    }
}

impl ActionPlanner {
    /// Create a planner over a catalog.
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            catalog,
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Plan a behavior kind, reporting why nothing could be planned.
    pub fn try_plan(
        &self,
        agent: AgentId,
        behavior: BehaviorKind,
    ) -> Result<Vec<ActionKind>, PlanError> {
        let instantiated: Vec<ActionKind> = behavior
            .action_template()
            .iter()
            .copied()
            .filter(|&kind| self.catalog.action(kind).is_some())
            .collect();
        let plan = optimize(instantiated);
        self.record(agent, behavior, plan.len());
        if plan.is_empty() {
            return Err(PlanError::Empty { behavior });
        }
        debug!(%agent, %behavior, actions = plan.len(), "Actions planned");
        Ok(plan)
    }

    /// Plan a behavior kind. Planning failures yield an empty sequence.
    pub fn plan_by_kind(&self, agent: AgentId, behavior: BehaviorKind) -> Vec<ActionKind> {
        self.try_plan(agent, behavior).unwrap_or_else(|e| {
            debug!(%agent, error = %e, "Planning produced nothing");
            Vec::new()
        })
    }

    /// Plan for a behavior body.
    pub fn plan_actions(&self, agent: AgentId, behavior: &dyn Behavior) -> Vec<ActionKind> {
        self.plan_by_kind(agent, behavior.kind())
    }

    /// Whether the agent can run every action of the sequence now.
    ///
    /// Requires a living agent and a registered body whose precondition
    /// holds for each action; stops at the first failure. An empty
    /// sequence has nothing to execute and is rejected.
    pub fn can_execute(&self, context: &AgentContext, sequence: &[ActionKind]) -> bool {
        context.alive
            && !sequence.is_empty()
            && sequence.iter().all(|&kind| {
                self.catalog
                    .action(kind)
                    .is_some_and(|body| body.can_execute(context))
            })
    }

    /// Priority of an action within a behavior, from the action's base
    /// value with behavior-specific overrides.
    pub fn evaluate_action_priority(&self, behavior: BehaviorKind, action: ActionKind) -> f64 {
        match (behavior, action) {
            (BehaviorKind::Farming, ActionKind::Attack) => 1.0,
            (BehaviorKind::Pvp, ActionKind::CastSkill) => 0.9,
            _ if self.catalog.action(action).is_some() => default_action_base(action),
            _ => UNKNOWN_PRIORITY,
        }
    }

    /// Planning counters for one agent.
    pub fn stats(&self, agent: AgentId) -> Option<PlanningStats> {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.get(&agent).cloned()
    }

    /// Reset one agent's counters.
    pub fn reset_stats(&self, agent: AgentId) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.remove(&agent);
    }

    fn record(&self, agent: AgentId, behavior: BehaviorKind, actions: usize) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = stats.entry(agent).or_default();
        if actions == 0 {
            entry.failures = entry.failures.saturating_add(1);
            return;
        }
        entry.plans = entry.plans.saturating_add(1);
        let count = entry.by_behavior.entry(behavior).or_insert(0);
        *count = count.saturating_add(1);
        entry.total_actions = entry
            .total_actions
            .saturating_add(u64::try_from(actions).unwrap_or(u64::MAX));
    }
}

#[cfg(test)]
mod tests {
    use botmind_types::{Position, Surroundings, Vitals};

    use super::*;
    use crate::catalog::{RuleAction, RuleBehavior, StaticCatalog};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn planner() -> ActionPlanner {
        let catalog = StaticCatalog::new()
            .with_open_actions(&[
                ActionKind::Move,
                ActionKind::Attack,
                ActionKind::Pickup,
                ActionKind::CastSkill,
                ActionKind::Wait,
            ])
            .with_action(Arc::new(RuleAction::new(ActionKind::Rest, |ctx| {
                ctx.health_ratio() < 1.0
            })));
        ActionPlanner::new(Arc::new(catalog))
    }

    fn context(alive: bool) -> AgentContext {
        AgentContext {
            agent: AgentId::new(1),
            vitals: Vitals::full(100.0, 100.0),
            alive,
            in_combat: false,
            position: Position::default(),
            surroundings: Surroundings::default(),
        }
    }

    #[test]
    fn farming_plans_move_attack_pickup() {
        let p = planner();
        assert_eq!(
            p.plan_by_kind(AgentId::new(1), BehaviorKind::Farming),
            vec![ActionKind::Move, ActionKind::Attack, ActionKind::Pickup]
        );
    }

    #[test]
    fn optimizer_collapses_adjacent_duplicates_only() {
        assert_eq!(
            optimize(vec![ActionKind::Move, ActionKind::Move, ActionKind::Attack]),
            vec![ActionKind::Move, ActionKind::Attack]
        );
        assert_eq!(
            optimize(vec![ActionKind::Move, ActionKind::Attack, ActionKind::Move]),
            vec![ActionKind::Move, ActionKind::Attack, ActionKind::Move]
        );
        assert!(optimize(Vec::new()).is_empty());
    }

    #[test]
    fn unregistered_actions_are_dropped() {
        let p = planner();
        // Trading is [move, trade]; trade has no body.
        assert_eq!(
            p.plan_by_kind(AgentId::new(1), BehaviorKind::Trading),
            vec![ActionKind::Move]
        );
    }

    #[test]
    fn nothing_registered_is_an_empty_plan() {
        let p = planner();
        let agent = AgentId::new(2);
        assert_eq!(
            p.try_plan(agent, BehaviorKind::Healing),
            Err(PlanError::Empty {
                behavior: BehaviorKind::Healing
            })
        );
        assert!(p.plan_by_kind(agent, BehaviorKind::Healing).is_empty());
        assert_eq!(p.stats(agent).map(|s| s.failures), Some(2));
    }

    #[test]
    fn plan_actions_uses_the_body_kind() {
        let p = planner();
        let body = RuleBehavior::always(BehaviorKind::Questing);
        assert_eq!(
            p.plan_actions(AgentId::new(1), &body),
            vec![ActionKind::Move, ActionKind::CastSkill]
        );
    }

    #[test]
    fn execution_time_sums_known_costs() {
        let sequence = [
            ActionKind::Move,
            ActionKind::Attack,
            ActionKind::CastSkill,
            ActionKind::Pickup,
            ActionKind::Talk,
        ];
        assert_eq!(estimate_execution_time(&sequence), Duration::from_millis(7500));
        assert_eq!(estimate_execution_time(&[]), Duration::ZERO);
    }

    #[test]
    fn feasibility_needs_life_and_every_precondition() {
        let p = planner();
        assert!(p.can_execute(&context(true), &[ActionKind::Move, ActionKind::Attack]));
        assert!(!p.can_execute(&context(false), &[ActionKind::Move]));
        // Rest requires missing health; the agent is at full health.
        assert!(!p.can_execute(&context(true), &[ActionKind::Move, ActionKind::Rest]));
        assert!(!p.can_execute(&context(true), &[ActionKind::Trade]));
        assert!(!p.can_execute(&context(true), &[]));
        assert!(!p.can_execute(&context(false), &[]));
    }

    #[test]
    fn action_priority_overrides() {
        let p = planner();
        assert!(approx(
            p.evaluate_action_priority(BehaviorKind::Farming, ActionKind::Attack),
            1.0
        ));
        assert!(approx(
            p.evaluate_action_priority(BehaviorKind::Pvp, ActionKind::CastSkill),
            0.9
        ));
        assert!(approx(
            p.evaluate_action_priority(BehaviorKind::Idle, ActionKind::Move),
            0.7
        ));
        assert!(approx(
            p.evaluate_action_priority(BehaviorKind::Idle, ActionKind::Trade),
            UNKNOWN_PRIORITY
        ));
    }

    #[test]
    fn stats_track_average_plan_length() {
        let p = planner();
        let agent = AgentId::new(3);
        let _ = p.plan_by_kind(agent, BehaviorKind::Farming);
        let _ = p.plan_by_kind(agent, BehaviorKind::Moving);
        let stats = p.stats(agent).unwrap_or_default();
        assert_eq!(stats.plans, 2);
        assert_eq!(stats.by_behavior.get(&BehaviorKind::Farming), Some(&1));
        assert!(approx(stats.average_actions(), 2.0));
        p.reset_stats(agent);
        assert!(p.stats(agent).is_none());
    }
}
