//! Core records exchanged between the world adapter, the decision
//! pipeline, and callers.
//!
//! [`SituationSnapshot`] and [`Decision`] keep their fields private so
//! every write goes through a clamping setter: no reader can observe a
//! level, priority, or confidence outside `[0, 1]`.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{ActionKind, ActivityState, BehaviorKind, SituationTag};
use crate::ids::AgentId;

/// Clamp a value into `[0, 1]`. `NaN` maps to `0`.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

// ---------------------------------------------------------------------------
// Collaborator data
// ---------------------------------------------------------------------------

/// Raw vitals as reported by the game world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    /// Current hit points.
    pub current_hp: f64,
    /// Maximum hit points.
    pub max_hp: f64,
    /// Current mana points.
    pub current_mp: f64,
    /// Maximum mana points.
    pub max_mp: f64,
}

impl Vitals {
    /// Vitals at full health and mana.
    pub const fn full(max_hp: f64, max_mp: f64) -> Self {
        Self {
            current_hp: max_hp,
            max_hp,
            current_mp: max_mp,
            max_mp,
        }
    }

    /// Health as a fraction of maximum. An agent without a positive
    /// maximum reads as fully healthy.
    pub fn health_ratio(&self) -> f64 {
        if self.max_hp > 0.0 {
            clamp_unit(self.current_hp / self.max_hp)
        } else {
            1.0
        }
    }

    /// Mana as a fraction of maximum. An agent without a positive
    /// maximum reads as full.
    pub fn mana_ratio(&self) -> f64 {
        if self.max_mp > 0.0 {
            clamp_unit(self.current_mp / self.max_mp)
        } else {
            1.0
        }
    }
}

/// World coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

/// Counts of nearby hostile and friendly entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surroundings {
    /// Hostile entities in range.
    pub nearby_enemies: u32,
    /// Friendly entities in range, not counting the agent itself.
    pub nearby_allies: u32,
}

impl Surroundings {
    /// Threat level in `[0, 1]`: enemies per ally (or per one, when alone),
    /// scaled so that three-to-one odds saturate.
    pub fn danger_level(&self) -> f64 {
        let allies = f64::from(self.nearby_allies.max(1));
        clamp_unit(f64::from(self.nearby_enemies) / allies / 3.0)
    }
}

/// Typed view of one agent, assembled from world queries and handed to
/// behavior and action preconditions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    /// The agent this context describes.
    pub agent: AgentId,
    /// Current vitals.
    pub vitals: Vitals,
    /// Whether the agent is alive.
    pub alive: bool,
    /// Whether the agent is engaged in combat.
    pub in_combat: bool,
    /// Current position.
    pub position: Position,
    /// Nearby entity counts.
    pub surroundings: Surroundings,
}

impl AgentContext {
    /// Health as a fraction of maximum.
    pub fn health_ratio(&self) -> f64 {
        self.vitals.health_ratio()
    }

    /// Mana as a fraction of maximum.
    pub fn mana_ratio(&self) -> f64 {
        self.vitals.mana_ratio()
    }
}

// ---------------------------------------------------------------------------
// Situation snapshot
// ---------------------------------------------------------------------------

/// Per-tick summary of one agent's situation.
///
/// Immutable once published by the decision engine. Freshness is judged
/// by the consumer via [`SituationSnapshot::is_fresh`]. Deserialized
/// snapshots go through the same clamping as the setters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SnapshotFields")]
pub struct SituationSnapshot {
    danger_level: f64,
    health_level: f64,
    mana_level: f64,
    nearby_enemies: u32,
    nearby_allies: u32,
    available_behaviors: BTreeMap<BehaviorKind, f64>,
    available_actions: BTreeMap<ActionKind, f64>,
    recommended_priority: f64,
    captured_at: DateTime<Utc>,
}

impl SituationSnapshot {
    /// Empty snapshot captured at `captured_at`: no threat, full health
    /// and mana, nothing available.
    pub const fn new(captured_at: DateTime<Utc>) -> Self {
        Self {
            danger_level: 0.0,
            health_level: 1.0,
            mana_level: 1.0,
            nearby_enemies: 0,
            nearby_allies: 0,
            available_behaviors: BTreeMap::new(),
            available_actions: BTreeMap::new(),
            recommended_priority: 0.0,
            captured_at,
        }
    }

    /// Threat level in `[0, 1]`.
    pub const fn danger_level(&self) -> f64 {
        self.danger_level
    }

    /// Health fraction in `[0, 1]`.
    pub const fn health_level(&self) -> f64 {
        self.health_level
    }

    /// Mana fraction in `[0, 1]`.
    pub const fn mana_level(&self) -> f64 {
        self.mana_level
    }

    /// Hostile entities in range.
    pub const fn nearby_enemies(&self) -> u32 {
        self.nearby_enemies
    }

    /// Friendly entities in range.
    pub const fn nearby_allies(&self) -> u32 {
        self.nearby_allies
    }

    /// Viable behaviors with their priorities.
    pub const fn available_behaviors(&self) -> &BTreeMap<BehaviorKind, f64> {
        &self.available_behaviors
    }

    /// Viable actions with their priorities.
    pub const fn available_actions(&self) -> &BTreeMap<ActionKind, f64> {
        &self.available_actions
    }

    /// Overall urgency in `[0, 1]`.
    pub const fn recommended_priority(&self) -> f64 {
        self.recommended_priority
    }

    /// When the snapshot was taken.
    pub const fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Situation tag derived from the current levels.
    pub fn tag(&self) -> SituationTag {
        SituationTag::classify(self.danger_level, self.health_level, self.mana_level)
    }

    /// Whether the snapshot is still usable at `now`: its age is at most
    /// `max_age`. A snapshot from the future counts as fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: TimeDelta) -> bool {
        now.signed_duration_since(self.captured_at) <= max_age
    }

    /// Set the threat level, clamped into `[0, 1]`.
    pub fn set_danger_level(&mut self, value: f64) {
        self.danger_level = clamp_unit(value);
    }

    /// Set the health fraction, clamped into `[0, 1]`.
    pub fn set_health_level(&mut self, value: f64) {
        self.health_level = clamp_unit(value);
    }

    /// Set the mana fraction, clamped into `[0, 1]`.
    pub fn set_mana_level(&mut self, value: f64) {
        self.mana_level = clamp_unit(value);
    }

    /// Record nearby entity counts.
    pub const fn set_surroundings(&mut self, surroundings: Surroundings) {
        self.nearby_enemies = surroundings.nearby_enemies;
        self.nearby_allies = surroundings.nearby_allies;
    }

    /// Set the overall urgency, clamped into `[0, 1]`.
    pub fn set_recommended_priority(&mut self, value: f64) {
        self.recommended_priority = clamp_unit(value);
    }

    /// Add or replace a viable behavior, clamping its priority.
    pub fn insert_behavior(&mut self, kind: BehaviorKind, priority: f64) {
        self.available_behaviors.insert(kind, clamp_unit(priority));
    }

    /// Add or replace a viable action, clamping its priority.
    pub fn insert_action(&mut self, kind: ActionKind, priority: f64) {
        self.available_actions.insert(kind, clamp_unit(priority));
    }
}

/// Wire form of [`SituationSnapshot`], clamped on conversion.
#[derive(Deserialize)]
struct SnapshotFields {
    danger_level: f64,
    health_level: f64,
    mana_level: f64,
    nearby_enemies: u32,
    nearby_allies: u32,
    available_behaviors: BTreeMap<BehaviorKind, f64>,
    available_actions: BTreeMap<ActionKind, f64>,
    recommended_priority: f64,
    captured_at: DateTime<Utc>,
}

impl From<SnapshotFields> for SituationSnapshot {
    fn from(fields: SnapshotFields) -> Self {
        let mut snapshot = Self::new(fields.captured_at);
        snapshot.set_danger_level(fields.danger_level);
        snapshot.set_health_level(fields.health_level);
        snapshot.set_mana_level(fields.mana_level);
        snapshot.set_surroundings(Surroundings {
            nearby_enemies: fields.nearby_enemies,
            nearby_allies: fields.nearby_allies,
        });
        snapshot.set_recommended_priority(fields.recommended_priority);
        for (kind, priority) in fields.available_behaviors {
            snapshot.insert_behavior(kind, priority);
        }
        for (kind, priority) in fields.available_actions {
            snapshot.insert_action(kind, priority);
        }
        snapshot
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// The outcome of decision synthesis for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "DecisionFields")]
pub struct Decision {
    selected_behavior: Option<BehaviorKind>,
    action_sequence: Vec<ActionKind>,
    priority: f64,
    confidence: f64,
    decided_at: DateTime<Utc>,
}

impl Decision {
    /// Empty decision stamped at `decided_at`.
    pub const fn new(decided_at: DateTime<Utc>) -> Self {
        Self {
            selected_behavior: None,
            action_sequence: Vec::new(),
            priority: 0.0,
            confidence: 0.0,
            decided_at,
        }
    }

    /// The chosen behavior, if any.
    pub const fn selected_behavior(&self) -> Option<BehaviorKind> {
        self.selected_behavior
    }

    /// Ordered actions implementing the behavior.
    pub fn action_sequence(&self) -> &[ActionKind] {
        &self.action_sequence
    }

    /// Urgency in `[0, 1]`.
    pub const fn priority(&self) -> f64 {
        self.priority
    }

    /// Confidence in `[0, 1]`.
    pub const fn confidence(&self) -> f64 {
        self.confidence
    }

    /// When the decision was made.
    pub const fn decided_at(&self) -> DateTime<Utc> {
        self.decided_at
    }

    /// Set the chosen behavior.
    pub const fn set_behavior(&mut self, kind: BehaviorKind) {
        self.selected_behavior = Some(kind);
    }

    /// Replace the action sequence.
    pub fn set_actions(&mut self, actions: Vec<ActionKind>) {
        self.action_sequence = actions;
    }

    /// Set the urgency, clamped into `[0, 1]`.
    pub fn set_priority(&mut self, value: f64) {
        self.priority = clamp_unit(value);
    }

    /// Set the confidence, clamped into `[0, 1]`.
    pub fn set_confidence(&mut self, value: f64) {
        self.confidence = clamp_unit(value);
    }

    /// A decision is actionable when it names a behavior, carries at
    /// least one action, and has positive confidence.
    pub fn is_valid(&self) -> bool {
        self.selected_behavior.is_some() && !self.action_sequence.is_empty() && self.confidence > 0.0
    }
}

/// Wire form of [`Decision`], clamped on conversion.
#[derive(Deserialize)]
struct DecisionFields {
    selected_behavior: Option<BehaviorKind>,
    action_sequence: Vec<ActionKind>,
    priority: f64,
    confidence: f64,
    decided_at: DateTime<Utc>,
}

impl From<DecisionFields> for Decision {
    fn from(fields: DecisionFields) -> Self {
        let mut decision = Self::new(fields.decided_at);
        decision.selected_behavior = fields.selected_behavior;
        decision.set_actions(fields.action_sequence);
        decision.set_priority(fields.priority);
        decision.set_confidence(fields.confidence);
        decision
    }
}

// ---------------------------------------------------------------------------
// Activity tracking
// ---------------------------------------------------------------------------

/// One accepted state-machine transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// State before the transition.
    pub from: ActivityState,
    /// State after the transition.
    pub to: ActivityState,
    /// Free-form reason supplied by the caller.
    pub reason: String,
    /// When the transition was accepted.
    pub at: DateTime<Utc>,
}

/// Current activity state of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityInfo {
    /// Current state.
    pub state: ActivityState,
    /// Time of the last accepted transition.
    pub last_change: DateTime<Utc>,
    /// Reason given for the last accepted transition.
    pub reason: String,
}
