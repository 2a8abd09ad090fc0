//! Behavior selection.
//!
//! Picks the highest-priority candidate that is actually available for
//! the agent. A behavior is available when the agent is alive, the
//! catalog has a body for it, and the body's precondition holds.
//!
//! Fallback order when the best candidate is missing or unavailable:
//! the configured default behavior, then the first available behavior in
//! catalog enumeration order, then nothing.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use botmind_types::{AgentContext, AgentId, BehaviorKind};
use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::priority::highest_priority;

/// Health fraction below which behavior priorities are halved.
const WOUNDED_THRESHOLD: f64 = 0.3;

/// How a selection was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionSource {
    /// The highest-priority candidate was available.
    Candidate,
    /// The configured default was used.
    Default,
    /// The first available catalog behavior was used.
    FirstAvailable,
}

/// Selection counters for one agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionStats {
    /// Selections that produced a behavior.
    pub selections: u64,
    /// Selections that produced nothing.
    pub misses: u64,
    /// Selections resolved through a fallback.
    pub fallbacks: u64,
    /// Times each behavior was selected.
    pub by_behavior: BTreeMap<BehaviorKind, u64>,
    /// Most recent selection.
    pub last: Option<BehaviorKind>,
}

/// Chooses a behavior per agent from a set of scored candidates.
pub struct BehaviorSelector {
    catalog: Arc<dyn Catalog>,
    default_behavior: RwLock<BehaviorKind>,
    stats: Mutex<HashMap<AgentId, SelectionStats>>,
}

impl core::fmt::Debug for BehaviorSelector {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BehaviorSelector")
            .field("default_behavior", &self.default_behavior())
            .finish_non_exhaustive()
    }
}

impl BehaviorSelector {
    /// Create a selector falling back to `default_behavior`.
    pub fn new(catalog: Arc<dyn Catalog>, default_behavior: BehaviorKind) -> Self {
        Self {
            catalog,
            default_behavior: RwLock::new(default_behavior),
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Select a behavior for the agent described by `context`.
    pub fn select_behavior(
        &self,
        context: &AgentContext,
        candidates: &BTreeMap<BehaviorKind, f64>,
    ) -> Option<BehaviorKind> {
        let resolved = self.resolve(context, candidates);
        self.record(context.agent, resolved);
        match resolved {
            Some((kind, source)) => {
                debug!(agent = %context.agent, behavior = %kind, ?source, "Behavior selected");
                Some(kind)
            }
            None => {
                debug!(agent = %context.agent, "No behavior available");
                None
            }
        }
    }

    /// Select a specific behavior kind if it is available.
    pub fn select_by_kind(&self, context: &AgentContext, kind: BehaviorKind) -> Option<BehaviorKind> {
        self.is_available(context, kind).then_some(kind)
    }

    /// Every available behavior, in catalog enumeration order.
    pub fn available_behaviors(&self, context: &AgentContext) -> Vec<BehaviorKind> {
        self.catalog
            .behaviors()
            .into_iter()
            .filter(|&kind| self.is_available(context, kind))
            .collect()
    }

    /// Context-only priority of a behavior: its kind's base value, zero
    /// for a dead agent, halved when the agent is badly wounded.
    pub fn evaluate_behavior_priority(&self, context: &AgentContext, kind: BehaviorKind) -> f64 {
        if !context.alive {
            return 0.0;
        }
        let base = kind_priority(kind);
        if context.health_ratio() < WOUNDED_THRESHOLD {
            base * 0.5
        } else {
            base
        }
    }

    /// The behavior used when no candidate is selectable.
    pub fn default_behavior(&self) -> BehaviorKind {
        *self
            .default_behavior
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the fallback behavior.
    pub fn set_default_behavior(&self, kind: BehaviorKind) {
        let mut guard = self
            .default_behavior
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = kind;
        info!(behavior = %kind, "Default behavior changed");
    }

    /// Selection counters for one agent.
    pub fn stats(&self, agent: AgentId) -> Option<SelectionStats> {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.get(&agent).cloned()
    }

    /// Reset one agent's counters.
    pub fn reset_stats(&self, agent: AgentId) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.remove(&agent);
    }

    fn is_available(&self, context: &AgentContext, kind: BehaviorKind) -> bool {
        context.alive
            && self
                .catalog
                .behavior(kind)
                .is_some_and(|body| body.can_execute(context))
    }

    fn resolve(
        &self,
        context: &AgentContext,
        candidates: &BTreeMap<BehaviorKind, f64>,
    ) -> Option<(BehaviorKind, SelectionSource)> {
        if !context.alive {
            return None;
        }
        if let Some((kind, _)) = highest_priority(candidates) {
            if self.is_available(context, kind) {
                return Some((kind, SelectionSource::Candidate));
            }
        }
        let fallback = self.default_behavior();
        if self.is_available(context, fallback) {
            return Some((fallback, SelectionSource::Default));
        }
        self.available_behaviors(context)
            .first()
            .map(|&kind| (kind, SelectionSource::FirstAvailable))
    }

    fn record(&self, agent: AgentId, resolved: Option<(BehaviorKind, SelectionSource)>) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = stats.entry(agent).or_default();
        match resolved {
            Some((kind, source)) => {
                entry.selections = entry.selections.saturating_add(1);
                if source != SelectionSource::Candidate {
                    entry.fallbacks = entry.fallbacks.saturating_add(1);
                }
                let count = entry.by_behavior.entry(kind).or_insert(0);
                *count = count.saturating_add(1);
                entry.last = Some(kind);
            }
            None => entry.misses = entry.misses.saturating_add(1),
        }
    }
}

/// Situation-independent priority per behavior kind.
#[allow(clippy::match_same_arms)]
const fn kind_priority(kind: BehaviorKind) -> f64 {
    match kind {
        BehaviorKind::Idle => 0.3,
        BehaviorKind::Farming => 0.7,
        BehaviorKind::Questing => 0.6,
        BehaviorKind::Pvp => 0.8,
        BehaviorKind::Supporting => 0.5,
        BehaviorKind::Crafting => 0.4,
        BehaviorKind::Trading => 0.4,
        BehaviorKind::Patrolling => 0.5,
        BehaviorKind::Guarding => 0.6,
        BehaviorKind::Following => 0.5,
        BehaviorKind::Attacking => 0.8,
        BehaviorKind::Defending => 0.9,
        BehaviorKind::Healing => 0.9,
        BehaviorKind::Looting => 0.5,
        BehaviorKind::Moving => 0.4,
        BehaviorKind::Resting => 0.5,
        BehaviorKind::Social => 0.3,
    }
}

#[cfg(test)]
mod tests {
    use botmind_types::{Position, Surroundings, Vitals};

    use super::*;
    use crate::catalog::{RuleBehavior, StaticCatalog};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn context(hp: f64, enemies: u32) -> AgentContext {
        AgentContext {
            agent: AgentId::new(1),
            vitals: Vitals {
                current_hp: hp,
                max_hp: 100.0,
                current_mp: 100.0,
                max_mp: 100.0,
            },
            alive: true,
            in_combat: enemies > 0,
            position: Position::default(),
            surroundings: Surroundings {
                nearby_enemies: enemies,
                nearby_allies: 0,
            },
        }
    }

    fn selector() -> BehaviorSelector {
        let catalog = StaticCatalog::new()
            .with_open_behaviors(&[BehaviorKind::Idle, BehaviorKind::Questing])
            .with_behavior(Arc::new(RuleBehavior::new(BehaviorKind::Farming, |ctx| {
                ctx.surroundings.nearby_enemies > 0
            })));
        BehaviorSelector::new(Arc::new(catalog), BehaviorKind::Idle)
    }

    #[test]
    fn best_available_candidate_wins() {
        let s = selector();
        let candidates =
            BTreeMap::from([(BehaviorKind::Farming, 0.7), (BehaviorKind::Idle, 0.5)]);
        assert_eq!(
            s.select_behavior(&context(100.0, 2), &candidates),
            Some(BehaviorKind::Farming)
        );
    }

    #[test]
    fn unavailable_best_falls_back_to_default() {
        let s = selector();
        let candidates = BTreeMap::from([(BehaviorKind::Farming, 0.7)]);
        let ctx = context(100.0, 0);
        assert_eq!(s.select_behavior(&ctx, &candidates), Some(BehaviorKind::Idle));
        let stats = s.stats(ctx.agent).unwrap_or_default();
        assert_eq!(stats.fallbacks, 1);
        assert_eq!(stats.last, Some(BehaviorKind::Idle));
    }

    #[test]
    fn zero_priority_candidates_are_ignored() {
        let s = selector();
        let candidates = BTreeMap::from([(BehaviorKind::Questing, 0.0)]);
        assert_eq!(
            s.select_behavior(&context(100.0, 0), &candidates),
            Some(BehaviorKind::Idle)
        );
    }

    #[test]
    fn unavailable_default_uses_first_available() {
        let s = selector();
        s.set_default_behavior(BehaviorKind::Resting);
        assert_eq!(s.default_behavior(), BehaviorKind::Resting);
        assert_eq!(
            s.select_behavior(&context(100.0, 0), &BTreeMap::new()),
            Some(BehaviorKind::Idle)
        );
    }

    #[test]
    fn dead_agent_gets_nothing() {
        let s = selector();
        let mut ctx = context(0.0, 0);
        ctx.alive = false;
        let candidates = BTreeMap::from([(BehaviorKind::Idle, 0.9)]);
        assert_eq!(s.select_behavior(&ctx, &candidates), None);
        assert!(s.available_behaviors(&ctx).is_empty());
        assert_eq!(s.stats(ctx.agent).map(|st| st.misses), Some(1));
    }

    #[test]
    fn select_by_kind_checks_availability() {
        let s = selector();
        assert_eq!(
            s.select_by_kind(&context(100.0, 0), BehaviorKind::Questing),
            Some(BehaviorKind::Questing)
        );
        assert_eq!(s.select_by_kind(&context(100.0, 0), BehaviorKind::Farming), None);
        assert_eq!(s.select_by_kind(&context(100.0, 0), BehaviorKind::Pvp), None);
    }

    #[test]
    fn available_behaviors_in_enumeration_order() {
        let s = selector();
        assert_eq!(
            s.available_behaviors(&context(100.0, 1)),
            vec![BehaviorKind::Idle, BehaviorKind::Farming, BehaviorKind::Questing]
        );
    }

    #[test]
    fn wounded_agents_halve_behavior_priority() {
        let s = selector();
        assert!(approx(
            s.evaluate_behavior_priority(&context(100.0, 0), BehaviorKind::Pvp),
            0.8
        ));
        assert!(approx(
            s.evaluate_behavior_priority(&context(20.0, 0), BehaviorKind::Pvp),
            0.4
        ));
        let mut dead = context(0.0, 0);
        dead.alive = false;
        assert!(approx(s.evaluate_behavior_priority(&dead, BehaviorKind::Pvp), 0.0));
    }

    #[test]
    fn reset_stats_forgets_agent() {
        let s = selector();
        let ctx = context(100.0, 0);
        let _ = s.select_behavior(&ctx, &BTreeMap::new());
        assert!(s.stats(ctx.agent).is_some());
        s.reset_stats(ctx.agent);
        assert!(s.stats(ctx.agent).is_none());
    }
}
