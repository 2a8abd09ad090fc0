//! Priority model: `(kind, behavior?, situation?) -> [0, 1]`.
//!
//! Action priority is a base value per action kind, multiplied by a
//! per-(behavior, action) modifier when a behavior is given and by a
//! per-(situation, action) modifier when a situation tag is given, then
//! clamped into `[0, 1]`. Behavior priority follows the same shape with
//! a base value per behavior kind and a per-(situation, behavior)
//! modifier.
//!
//! Missing base values read as `0.5`; missing modifiers read as `1.0`.
//! Lookups never fail.
//!
//! # Hot replacement
//!
//! Tables live behind `RwLock<Arc<PriorityTables>>`. Writers clone the
//! current tables, apply their change, and swap the `Arc` in one step, so
//! a reader holds either the old or the new tables and never a mix.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use botmind_types::{ActionKind, AgentId, BehaviorKind, SituationTag, clamp_unit};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::PriorityConfig;

/// Base priority used when a kind is missing from the tables.
pub const UNKNOWN_PRIORITY: f64 = 0.5;

/// Modifier used when a table has no entry.
pub const NEUTRAL_MODIFIER: f64 = 1.0;

/// Smallest accepted modifier.
pub const MIN_MODIFIER: f64 = 0.1;

/// Largest accepted modifier.
pub const MAX_MODIFIER: f64 = 2.0;

/// Clamp a modifier into `[MIN_MODIFIER, MAX_MODIFIER]`. `NaN` is neutral.
pub fn clamp_modifier(value: f64) -> f64 {
    if value.is_nan() {
        NEUTRAL_MODIFIER
    } else {
        value.clamp(MIN_MODIFIER, MAX_MODIFIER)
    }
}

/// Built-in base priority for an action kind.
#[allow(clippy::match_same_arms)]
pub const fn default_action_base(kind: ActionKind) -> f64 {
    match kind {
        ActionKind::Idle => 0.1,
        ActionKind::Move => 0.7,
        ActionKind::Turn => 0.5,
        ActionKind::Stop => 0.2,
        ActionKind::Attack => 0.9,
        ActionKind::CastSkill => 0.8,
        ActionKind::UseItem => 0.6,
        ActionKind::Defend => 0.7,
        ActionKind::Escape => 0.8,
        ActionKind::Pickup => 0.5,
        ActionKind::Drop => 0.3,
        ActionKind::Use => 0.4,
        ActionKind::Equip => 0.6,
        ActionKind::Unequip => 0.4,
        ActionKind::Talk => 0.3,
        ActionKind::Trade => 0.4,
        ActionKind::JoinParty => 0.5,
        ActionKind::LeaveParty => 0.3,
        ActionKind::Rest => 0.2,
        ActionKind::Heal => 0.8,
        ActionKind::Meditate => 0.3,
        ActionKind::Search => 0.4,
        ActionKind::Scan => 0.3,
        ActionKind::Investigate => 0.2,
        ActionKind::Follow => 0.6,
        ActionKind::Guard => 0.7,
        ActionKind::Patrol => 0.5,
        ActionKind::Wait => 0.1,
    }
}

/// Built-in base priority for a behavior kind.
#[allow(clippy::match_same_arms)]
pub const fn default_behavior_base(kind: BehaviorKind) -> f64 {
    match kind {
        BehaviorKind::Idle => 0.5,
        BehaviorKind::Farming => 0.7,
        BehaviorKind::Questing => 0.6,
        BehaviorKind::Pvp => 0.3,
        BehaviorKind::Supporting => 0.4,
        BehaviorKind::Crafting => 0.4,
        BehaviorKind::Trading => 0.4,
        BehaviorKind::Patrolling => 0.4,
        BehaviorKind::Guarding => 0.4,
        BehaviorKind::Following => 0.3,
        BehaviorKind::Attacking => 0.3,
        BehaviorKind::Defending => 0.4,
        BehaviorKind::Healing => 0.3,
        BehaviorKind::Looting => 0.4,
        BehaviorKind::Moving => 0.3,
        BehaviorKind::Resting => 0.3,
        BehaviorKind::Social => 0.2,
    }
}

/// Built-in (behavior, action) modifiers.
fn default_behavior_action() -> BTreeMap<BehaviorKind, BTreeMap<ActionKind, f64>> {
    BTreeMap::from([
        (
            BehaviorKind::Farming,
            BTreeMap::from([
                (ActionKind::Attack, 1.2),
                (ActionKind::Pickup, 1.1),
                (ActionKind::Move, 1.0),
                (ActionKind::CastSkill, 0.9),
                (ActionKind::Rest, 0.8),
            ]),
        ),
        (
            BehaviorKind::Questing,
            BTreeMap::from([
                (ActionKind::Move, 1.1),
                (ActionKind::Talk, 1.2),
                (ActionKind::CastSkill, 1.0),
                (ActionKind::Attack, 0.8),
                (ActionKind::Investigate, 1.1),
            ]),
        ),
        (
            BehaviorKind::Pvp,
            BTreeMap::from([
                (ActionKind::Attack, 1.3),
                (ActionKind::CastSkill, 1.2),
                (ActionKind::Defend, 1.1),
                (ActionKind::Escape, 1.0),
                (ActionKind::Heal, 1.2),
                (ActionKind::Move, 1.1),
            ]),
        ),
        (
            BehaviorKind::Idle,
            BTreeMap::from([
                (ActionKind::Idle, 1.0),
                (ActionKind::Wait, 1.0),
                (ActionKind::Rest, 1.0),
            ]),
        ),
    ])
}

/// Built-in (situation, action) modifiers.
fn default_situation_action() -> BTreeMap<SituationTag, BTreeMap<ActionKind, f64>> {
    BTreeMap::from([
        (
            SituationTag::Danger,
            BTreeMap::from([
                (ActionKind::Attack, 1.2),
                (ActionKind::Defend, 1.3),
                (ActionKind::Escape, 1.4),
                (ActionKind::Heal, 1.2),
                (ActionKind::CastSkill, 1.1),
            ]),
        ),
        (
            SituationTag::Safe,
            BTreeMap::from([
                (ActionKind::Rest, 1.2),
                (ActionKind::Meditate, 1.1),
                (ActionKind::Pickup, 1.1),
                (ActionKind::Talk, 1.0),
            ]),
        ),
        (
            SituationTag::LowHealth,
            BTreeMap::from([
                (ActionKind::Heal, 1.5),
                (ActionKind::UseItem, 1.3),
                (ActionKind::Escape, 1.2),
                (ActionKind::Rest, 1.1),
            ]),
        ),
        (
            SituationTag::LowMana,
            BTreeMap::from([
                (ActionKind::Meditate, 1.4),
                (ActionKind::Rest, 1.2),
                (ActionKind::UseItem, 1.1),
            ]),
        ),
    ])
}

/// Built-in (situation, behavior) modifiers.
fn default_situation_behavior() -> BTreeMap<SituationTag, BTreeMap<BehaviorKind, f64>> {
    BTreeMap::from([
        (
            SituationTag::Danger,
            BTreeMap::from([
                (BehaviorKind::Idle, 0.4),
                (BehaviorKind::Farming, 0.5),
                (BehaviorKind::Questing, 0.5),
                (BehaviorKind::Pvp, 1.5),
                (BehaviorKind::Crafting, 0.5),
                (BehaviorKind::Trading, 0.5),
                (BehaviorKind::Attacking, 1.5),
                (BehaviorKind::Defending, 2.0),
                (BehaviorKind::Healing, 1.5),
                (BehaviorKind::Social, 0.5),
            ]),
        ),
        (
            SituationTag::LowHealth,
            BTreeMap::from([
                (BehaviorKind::Farming, 0.5),
                (BehaviorKind::Pvp, 0.5),
                (BehaviorKind::Healing, 2.0),
                (BehaviorKind::Resting, 2.0),
            ]),
        ),
        (
            SituationTag::LowMana,
            BTreeMap::from([(BehaviorKind::Resting, 1.5)]),
        ),
    ])
}

/// The full set of priority tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriorityTables {
    /// Base priority per action kind.
    pub action_base: BTreeMap<ActionKind, f64>,
    /// Base priority per behavior kind.
    pub behavior_base: BTreeMap<BehaviorKind, f64>,
    /// Per-(behavior, action) multipliers.
    pub behavior_action: BTreeMap<BehaviorKind, BTreeMap<ActionKind, f64>>,
    /// Per-(situation, action) multipliers.
    pub situation_action: BTreeMap<SituationTag, BTreeMap<ActionKind, f64>>,
    /// Per-(situation, behavior) multipliers.
    pub situation_behavior: BTreeMap<SituationTag, BTreeMap<BehaviorKind, f64>>,
}

impl Default for PriorityTables {
    fn default() -> Self {
        Self {
            action_base: ActionKind::ALL
                .iter()
                .map(|&kind| (kind, default_action_base(kind)))
                .collect(),
            behavior_base: BehaviorKind::ALL
                .iter()
                .map(|&kind| (kind, default_behavior_base(kind)))
                .collect(),
            behavior_action: default_behavior_action(),
            situation_action: default_situation_action(),
            situation_behavior: default_situation_behavior(),
        }
    }
}

impl PriorityTables {
    /// Built-in tables with configured overrides applied on top.
    pub fn with_overrides(overrides: &PriorityConfig) -> Self {
        let mut tables = Self::default();
        for (&kind, &value) in &overrides.action_base {
            tables.action_base.insert(kind, clamp_unit(value));
        }
        for (&kind, &value) in &overrides.behavior_base {
            tables.behavior_base.insert(kind, clamp_unit(value));
        }
        for (&behavior, row) in &overrides.behavior_action {
            let target = tables.behavior_action.entry(behavior).or_default();
            for (&action, &value) in row {
                target.insert(action, clamp_modifier(value));
            }
        }
        for (&tag, row) in &overrides.situation_action {
            let target = tables.situation_action.entry(tag).or_default();
            for (&action, &value) in row {
                target.insert(action, clamp_modifier(value));
            }
        }
        for (&tag, row) in &overrides.situation_behavior {
            let target = tables.situation_behavior.entry(tag).or_default();
            for (&behavior, &value) in row {
                target.insert(behavior, clamp_modifier(value));
            }
        }
        tables
    }

    /// Priority of an action, optionally within a behavior and a situation.
    pub fn action_priority(
        &self,
        action: ActionKind,
        behavior: Option<BehaviorKind>,
        tag: Option<SituationTag>,
    ) -> f64 {
        let base = self
            .action_base
            .get(&action)
            .copied()
            .unwrap_or(UNKNOWN_PRIORITY);
        let behavior_mod = behavior.map_or(NEUTRAL_MODIFIER, |b| {
            lookup_modifier(&self.behavior_action, b, action)
        });
        let situation_mod =
            tag.map_or(NEUTRAL_MODIFIER, |t| lookup_modifier(&self.situation_action, t, action));
        clamp_unit(base * behavior_mod * situation_mod)
    }

    /// Priority of a behavior, optionally within a situation.
    pub fn behavior_priority(&self, behavior: BehaviorKind, tag: Option<SituationTag>) -> f64 {
        let base = self
            .behavior_base
            .get(&behavior)
            .copied()
            .unwrap_or(UNKNOWN_PRIORITY);
        let situation_mod = tag.map_or(NEUTRAL_MODIFIER, |t| {
            lookup_modifier(&self.situation_behavior, t, behavior)
        });
        clamp_unit(base * situation_mod)
    }
}

fn lookup_modifier<R: Ord, K: Ord>(table: &BTreeMap<R, BTreeMap<K, f64>>, row: R, key: K) -> f64 {
    table
        .get(&row)
        .and_then(|entries| entries.get(&key))
        .copied()
        .unwrap_or(NEUTRAL_MODIFIER)
}

/// Pick the highest-priority entry of a candidate map.
///
/// Only entries with priority strictly above zero qualify. Ties go to the
/// entry that comes first in key order, which for kind enums is
/// declaration order.
pub fn highest_priority<K: Copy + Ord>(candidates: &BTreeMap<K, f64>) -> Option<(K, f64)> {
    candidates
        .iter()
        .filter(|&(_, &priority)| priority > 0.0)
        .fold(None, |best: Option<(K, f64)>, (&kind, &priority)| match best {
            Some((_, best_priority)) if priority <= best_priority => best,
            _ => Some((kind, priority)),
        })
}

/// Running priority statistics for one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgentPriorityStats {
    /// Number of priority evaluations recorded.
    pub total_updates: u64,
    /// Mean evaluated priority per action kind.
    pub average_by_action: BTreeMap<ActionKind, f64>,
    /// Evaluations per action kind.
    pub samples_by_action: BTreeMap<ActionKind, u64>,
}

impl AgentPriorityStats {
    fn record(&mut self, action: ActionKind, priority: f64) {
        self.total_updates = self.total_updates.saturating_add(1);
        let samples = self.samples_by_action.entry(action).or_insert(0);
        *samples = samples.saturating_add(1);
        let count = u32::try_from(*samples).map_or(f64::from(u32::MAX), f64::from);
        let mean = self.average_by_action.entry(action).or_insert(0.0);
        *mean += (priority - *mean) / count;
    }
}

/// Thread-safe, hot-replaceable priority model.
#[derive(Debug)]
pub struct PriorityModel {
    tables: RwLock<Arc<PriorityTables>>,
    stats: Mutex<HashMap<AgentId, AgentPriorityStats>>,
}

impl Default for PriorityModel {
    fn default() -> Self {
        Self::new(PriorityTables::default())
    }
}

impl PriorityModel {
    /// Create a model over the given tables.
    pub fn new(tables: PriorityTables) -> Self {
        Self {
            tables: RwLock::new(Arc::new(tables)),
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Create a model from configuration overrides.
    pub fn from_config(config: &PriorityConfig) -> Self {
        Self::new(PriorityTables::with_overrides(config))
    }

    /// The current tables. The returned `Arc` stays valid (and unchanged)
    /// even if the tables are replaced afterwards.
    pub fn tables(&self) -> Arc<PriorityTables> {
        Arc::clone(&self.tables.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace all tables at once.
    pub fn replace_tables(&self, tables: PriorityTables) {
        let mut guard = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(tables);
        info!("Priority tables replaced");
    }

    /// Copy-on-write update of the current tables.
    pub fn update<F>(&self, change: F)
    where
        F: FnOnce(&mut PriorityTables),
    {
        let mut guard = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = PriorityTables::clone(&guard);
        change(&mut next);
        *guard = Arc::new(next);
    }

    /// Priority of an action, optionally within a behavior and situation.
    pub fn action_priority(
        &self,
        action: ActionKind,
        behavior: Option<BehaviorKind>,
        tag: Option<SituationTag>,
    ) -> f64 {
        self.tables().action_priority(action, behavior, tag)
    }

    /// Priority of a behavior, optionally within a situation.
    pub fn behavior_priority(&self, behavior: BehaviorKind, tag: Option<SituationTag>) -> f64 {
        self.tables().behavior_priority(behavior, tag)
    }

    /// Evaluate an action's priority for an agent and record it in that
    /// agent's statistics.
    pub fn evaluate_for(
        &self,
        agent: AgentId,
        action: ActionKind,
        behavior: Option<BehaviorKind>,
        tag: Option<SituationTag>,
    ) -> f64 {
        let priority = self.action_priority(action, behavior, tag);
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(agent)
            .or_default()
            .record(action, priority);
        priority
    }

    /// Set the base priority of an action kind, clamped into `[0, 1]`.
    pub fn set_action_base(&self, action: ActionKind, value: f64) {
        let value = clamp_unit(value);
        self.update(|tables| {
            tables.action_base.insert(action, value);
        });
        debug!(%action, value, "Action base priority updated");
    }

    /// Set the base priority of a behavior kind, clamped into `[0, 1]`.
    pub fn set_behavior_base(&self, behavior: BehaviorKind, value: f64) {
        let value = clamp_unit(value);
        self.update(|tables| {
            tables.behavior_base.insert(behavior, value);
        });
        debug!(%behavior, value, "Behavior base priority updated");
    }

    /// Set a (behavior, action) modifier, clamped into `[0.1, 2.0]`.
    pub fn set_behavior_modifier(&self, behavior: BehaviorKind, action: ActionKind, value: f64) {
        let value = clamp_modifier(value);
        self.update(|tables| {
            tables
                .behavior_action
                .entry(behavior)
                .or_default()
                .insert(action, value);
        });
        debug!(%behavior, %action, value, "Behavior modifier updated");
    }

    /// Set a (situation, action) modifier, clamped into `[0.1, 2.0]`.
    pub fn set_situation_modifier(&self, tag: SituationTag, action: ActionKind, value: f64) {
        let value = clamp_modifier(value);
        self.update(|tables| {
            tables
                .situation_action
                .entry(tag)
                .or_default()
                .insert(action, value);
        });
        debug!(?tag, %action, value, "Situation modifier updated");
    }

    /// Priority statistics for one agent.
    pub fn agent_stats(&self, agent: AgentId) -> Option<AgentPriorityStats> {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&agent)
            .cloned()
    }

    /// Drop an agent's statistics.
    pub fn clear_agent(&self, agent: AgentId) {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&agent);
    }

    /// Total evaluations recorded across all agents.
    pub fn total_updates(&self) -> u64 {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .fold(0_u64, |acc, s| acc.saturating_add(s.total_updates))
    }
}
