//! Enumeration types shared across the decision core.
//!
//! Every kind-to-something mapping in the workspace (templates, costs,
//! activity states, priority tables) matches exhaustively on these enums,
//! so adding a variant is a compile error everywhere it needs a decision.
//!
//! Declaration order is significant: derived [`Ord`] follows it, and the
//! decision core breaks priority ties by taking the earliest-declared kind.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Behaviors
// ---------------------------------------------------------------------------

/// A high-level goal an agent can pursue for several ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorKind {
    /// Do nothing in particular.
    Idle,
    /// Hunt monsters and gather their drops.
    Farming,
    /// Work through quest objectives.
    Questing,
    /// Fight other players.
    Pvp,
    /// Assist allied agents.
    Supporting,
    /// Produce items.
    Crafting,
    /// Buy and sell with other parties.
    Trading,
    /// Walk a patrol route.
    Patrolling,
    /// Hold a position against intruders.
    Guarding,
    /// Stay close to a leader.
    Following,
    /// Engage a specific target.
    Attacking,
    /// Protect self and allies.
    Defending,
    /// Restore allied health.
    Healing,
    /// Collect dropped items.
    Looting,
    /// Travel to a destination.
    Moving,
    /// Recover health and mana.
    Resting,
    /// Interact with other players.
    Social,
}

impl BehaviorKind {
    /// Every behavior kind, in declaration order.
    pub const ALL: [Self; 17] = [
        Self::Idle,
        Self::Farming,
        Self::Questing,
        Self::Pvp,
        Self::Supporting,
        Self::Crafting,
        Self::Trading,
        Self::Patrolling,
        Self::Guarding,
        Self::Following,
        Self::Attacking,
        Self::Defending,
        Self::Healing,
        Self::Looting,
        Self::Moving,
        Self::Resting,
        Self::Social,
    ];

    /// Stable lowercase name, matching the serialized form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Farming => "farming",
            Self::Questing => "questing",
            Self::Pvp => "pvp",
            Self::Supporting => "supporting",
            Self::Crafting => "crafting",
            Self::Trading => "trading",
            Self::Patrolling => "patrolling",
            Self::Guarding => "guarding",
            Self::Following => "following",
            Self::Attacking => "attacking",
            Self::Defending => "defending",
            Self::Healing => "healing",
            Self::Looting => "looting",
            Self::Moving => "moving",
            Self::Resting => "resting",
            Self::Social => "social",
        }
    }

    /// The fixed action template that implements this behavior.
    ///
    /// Shared by the decision engine (for the decision's action sequence)
    /// and the action planner (before instantiation and optimization).
    pub const fn action_template(self) -> &'static [ActionKind] {
        match self {
            Self::Idle => &[ActionKind::Wait],
            Self::Farming => &[ActionKind::Move, ActionKind::Attack, ActionKind::Pickup],
            Self::Questing => &[ActionKind::Move, ActionKind::CastSkill],
            Self::Pvp => &[ActionKind::Move, ActionKind::Attack, ActionKind::CastSkill],
            Self::Supporting => &[ActionKind::Follow, ActionKind::Heal],
            Self::Crafting => &[ActionKind::Move, ActionKind::Use],
            Self::Trading => &[ActionKind::Move, ActionKind::Trade],
            Self::Patrolling => &[ActionKind::Patrol, ActionKind::Scan],
            Self::Guarding => &[ActionKind::Guard, ActionKind::Scan],
            Self::Following => &[ActionKind::Follow],
            Self::Attacking => &[ActionKind::Move, ActionKind::Attack],
            Self::Defending => &[ActionKind::Defend, ActionKind::Attack],
            Self::Healing => &[ActionKind::Heal],
            Self::Looting => &[ActionKind::Move, ActionKind::Pickup],
            Self::Moving => &[ActionKind::Move],
            Self::Resting => &[ActionKind::Rest, ActionKind::Meditate],
            Self::Social => &[ActionKind::Move, ActionKind::Talk],
        }
    }

    /// The coarse activity state an agent enters while running this behavior.
    #[allow(clippy::match_same_arms)] // One arm per behavior keeps the mapping reviewable.
    pub const fn activity_state(self) -> ActivityState {
        match self {
            Self::Farming | Self::Questing | Self::Looting => ActivityState::Farming,
            Self::Pvp | Self::Attacking | Self::Defending => ActivityState::Fighting,
            Self::Trading => ActivityState::Trading,
            Self::Patrolling => ActivityState::Patrolling,
            Self::Guarding => ActivityState::Guarding,
            Self::Following | Self::Moving => ActivityState::Moving,
            Self::Healing | Self::Resting => ActivityState::Resting,
            Self::Idle | Self::Supporting | Self::Crafting | Self::Social => ActivityState::Idle,
        }
    }

    /// Interrupt rank; a behavior may interrupt any behavior of lower rank.
    pub const fn rank(self) -> u8 {
        self as u8
    }

    /// Whether this behavior may interrupt `other`.
    pub const fn can_interrupt(self, other: Self) -> bool {
        self.rank() > other.rank()
    }

    /// Behaviors that involve direct combat.
    pub const fn is_combat(self) -> bool {
        matches!(self, Self::Pvp | Self::Attacking | Self::Defending | Self::Healing)
    }

    /// Behaviors that progress the agent without fighting players.
    pub const fn is_peaceful(self) -> bool {
        matches!(
            self,
            Self::Farming | Self::Questing | Self::Crafting | Self::Trading | Self::Looting
        )
    }

    /// Behaviors centered on other agents.
    pub const fn is_social(self) -> bool {
        matches!(self, Self::Supporting | Self::Following | Self::Trading)
    }
}

impl core::fmt::Display for BehaviorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// A discrete step an agent performs in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    // --- Basic ---
    /// Do nothing.
    Idle,
    /// Walk toward a destination.
    Move,
    /// Face a target.
    Turn,
    /// Halt movement.
    Stop,

    // --- Combat ---
    /// Melee or ranged attack on a target.
    Attack,
    /// Cast a skill.
    CastSkill,
    /// Consume an item from the inventory.
    UseItem,
    /// Block or parry.
    Defend,
    /// Retreat from danger.
    Escape,

    // --- Items ---
    /// Pick an item up from the ground.
    Pickup,
    /// Drop an item.
    Drop,
    /// Use a world object or item.
    Use,
    /// Equip an item.
    Equip,
    /// Unequip an item.
    Unequip,

    // --- Social ---
    /// Talk to an NPC or player.
    Talk,
    /// Trade with another party.
    Trade,
    /// Join a party.
    JoinParty,
    /// Leave the current party.
    LeaveParty,

    // --- Recovery ---
    /// Sit down to regenerate.
    Rest,
    /// Heal self or a target.
    Heal,
    /// Regenerate mana.
    Meditate,

    // --- Search ---
    /// Look for a target.
    Search,
    /// Scan the surrounding area.
    Scan,
    /// Inspect an object.
    Investigate,

    // --- Special ---
    /// Follow a target.
    Follow,
    /// Guard a position.
    Guard,
    /// Walk a patrol route.
    Patrol,
    /// Wait in place.
    Wait,
}

impl ActionKind {
    /// Every action kind, in declaration order.
    pub const ALL: [Self; 28] = [
        Self::Idle,
        Self::Move,
        Self::Turn,
        Self::Stop,
        Self::Attack,
        Self::CastSkill,
        Self::UseItem,
        Self::Defend,
        Self::Escape,
        Self::Pickup,
        Self::Drop,
        Self::Use,
        Self::Equip,
        Self::Unequip,
        Self::Talk,
        Self::Trade,
        Self::JoinParty,
        Self::LeaveParty,
        Self::Rest,
        Self::Heal,
        Self::Meditate,
        Self::Search,
        Self::Scan,
        Self::Investigate,
        Self::Follow,
        Self::Guard,
        Self::Patrol,
        Self::Wait,
    ];

    /// Stable lowercase name, matching the serialized form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Move => "move",
            Self::Turn => "turn",
            Self::Stop => "stop",
            Self::Attack => "attack",
            Self::CastSkill => "cast_skill",
            Self::UseItem => "use_item",
            Self::Defend => "defend",
            Self::Escape => "escape",
            Self::Pickup => "pickup",
            Self::Drop => "drop",
            Self::Use => "use",
            Self::Equip => "equip",
            Self::Unequip => "unequip",
            Self::Talk => "talk",
            Self::Trade => "trade",
            Self::JoinParty => "join_party",
            Self::LeaveParty => "leave_party",
            Self::Rest => "rest",
            Self::Heal => "heal",
            Self::Meditate => "meditate",
            Self::Search => "search",
            Self::Scan => "scan",
            Self::Investigate => "investigate",
            Self::Follow => "follow",
            Self::Guard => "guard",
            Self::Patrol => "patrol",
            Self::Wait => "wait",
        }
    }

    /// Category rank used for interruption and category predicates.
    ///
    /// Basic actions rank 0-3, combat 10-14, items 20-24, social 30-33,
    /// recovery 40-42, search 50-52, special 60-63.
    #[allow(clippy::match_same_arms)]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Move => 1,
            Self::Turn => 2,
            Self::Stop => 3,
            Self::Attack => 10,
            Self::CastSkill => 11,
            Self::UseItem => 12,
            Self::Defend => 13,
            Self::Escape => 14,
            Self::Pickup => 20,
            Self::Drop => 21,
            Self::Use => 22,
            Self::Equip => 23,
            Self::Unequip => 24,
            Self::Talk => 30,
            Self::Trade => 31,
            Self::JoinParty => 32,
            Self::LeaveParty => 33,
            Self::Rest => 40,
            Self::Heal => 41,
            Self::Meditate => 42,
            Self::Search => 50,
            Self::Scan => 51,
            Self::Investigate => 52,
            Self::Follow => 60,
            Self::Guard => 61,
            Self::Patrol => 62,
            Self::Wait => 63,
        }
    }

    /// Whether this action may interrupt `other`.
    pub const fn can_interrupt(self, other: Self) -> bool {
        self.rank() > other.rank()
    }

    /// Combat actions (rank 10-19).
    pub const fn is_combat(self) -> bool {
        matches!(self.rank(), 10..=19)
    }

    /// Peaceful actions: basic and item handling.
    pub const fn is_peaceful(self) -> bool {
        matches!(self.rank(), 0..=9 | 20..=29)
    }

    /// Social actions (rank 30-39).
    pub const fn is_social(self) -> bool {
        matches!(self.rank(), 30..=39)
    }

    /// Recovery actions (rank 40-49).
    pub const fn is_recovery(self) -> bool {
        matches!(self.rank(), 40..=49)
    }

    /// Search actions (rank 50-59).
    pub const fn is_search(self) -> bool {
        matches!(self.rank(), 50..=59)
    }

    /// Special actions (rank 60 and above).
    pub const fn is_special(self) -> bool {
        self.rank() >= 60
    }

    /// Actions that need a target entity.
    pub const fn requires_target(self) -> bool {
        matches!(
            self,
            Self::Attack | Self::CastSkill | Self::Talk | Self::Trade | Self::Follow | Self::Guard
        )
    }

    /// Actions that need an inventory item.
    pub const fn requires_item(self) -> bool {
        matches!(
            self,
            Self::UseItem | Self::Equip | Self::Unequip | Self::Pickup | Self::Drop | Self::Use
        )
    }

    /// Actions that need a destination or facing position.
    pub const fn requires_position(self) -> bool {
        matches!(
            self,
            Self::Move | Self::Turn | Self::Guard | Self::Patrol | Self::Escape
        )
    }

    /// The coarse activity state an agent enters while performing this action.
    #[allow(clippy::match_same_arms)]
    pub const fn activity_state(self) -> ActivityState {
        match self {
            Self::Move | Self::Turn => ActivityState::Moving,
            Self::Attack | Self::CastSkill => ActivityState::Fighting,
            Self::Pickup | Self::UseItem => ActivityState::Farming,
            Self::Rest | Self::Heal | Self::Meditate => ActivityState::Resting,
            Self::Guard => ActivityState::Guarding,
            Self::Patrol => ActivityState::Patrolling,
            Self::Trade => ActivityState::Trading,
            Self::Idle
            | Self::Stop
            | Self::Defend
            | Self::Escape
            | Self::Drop
            | Self::Use
            | Self::Equip
            | Self::Unequip
            | Self::Talk
            | Self::JoinParty
            | Self::LeaveParty
            | Self::Search
            | Self::Scan
            | Self::Investigate
            | Self::Follow
            | Self::Wait => ActivityState::Idle,
        }
    }
}

impl core::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Activity state
// ---------------------------------------------------------------------------

/// Coarse activity state tracked per agent by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    /// Not doing anything.
    Idle,
    /// Travelling.
    Moving,
    /// In combat.
    Fighting,
    /// Farming monsters or resources.
    Farming,
    /// Guarding a position.
    Guarding,
    /// Patrolling an area.
    Patrolling,
    /// Trading.
    Trading,
    /// Recovering health or mana.
    Resting,
    /// Dead; may only become disconnected.
    Dead,
    /// Disconnected; may only become idle.
    Disconnected,
}

impl ActivityState {
    /// Every state, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::Idle,
        Self::Moving,
        Self::Fighting,
        Self::Farming,
        Self::Guarding,
        Self::Patrolling,
        Self::Trading,
        Self::Resting,
        Self::Dead,
        Self::Disconnected,
    ];

    /// Whether the transition `self -> to` is legal.
    ///
    /// From `Dead` the only legal target is `Disconnected`; from
    /// `Disconnected` the only legal target is `Idle`. Every other
    /// transition is accepted.
    pub const fn can_transition_to(self, to: Self) -> bool {
        match self {
            Self::Dead => matches!(to, Self::Disconnected),
            Self::Disconnected => matches!(to, Self::Idle),
            _ => true,
        }
    }

    /// Stable lowercase name, matching the serialized form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Moving => "moving",
            Self::Fighting => "fighting",
            Self::Farming => "farming",
            Self::Guarding => "guarding",
            Self::Patrolling => "patrolling",
            Self::Trading => "trading",
            Self::Resting => "resting",
            Self::Dead => "dead",
            Self::Disconnected => "disconnected",
        }
    }
}

impl core::fmt::Display for ActivityState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Situation tags
// ---------------------------------------------------------------------------

/// Coarse classification of a situation, selecting a modifier table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SituationTag {
    /// Outnumbered or under heavy threat.
    Danger,
    /// No meaningful threat.
    Safe,
    /// Health is running out.
    LowHealth,
    /// Mana is running out.
    LowMana,
}

impl SituationTag {
    /// Danger level at or above which a situation counts as dangerous.
    pub const DANGER_THRESHOLD: f64 = 0.5;
    /// Health fraction below which a situation counts as low-health.
    pub const LOW_HEALTH_THRESHOLD: f64 = 0.3;
    /// Mana fraction below which a situation counts as low-mana.
    pub const LOW_MANA_THRESHOLD: f64 = 0.2;

    /// Classify normalized levels. Danger outranks low health, which
    /// outranks low mana.
    pub fn classify(danger: f64, health: f64, mana: f64) -> Self {
        if danger >= Self::DANGER_THRESHOLD {
            Self::Danger
        } else if health < Self::LOW_HEALTH_THRESHOLD {
            Self::LowHealth
        } else if mana < Self::LOW_MANA_THRESHOLD {
            Self::LowMana
        } else {
            Self::Safe
        }
    }
}
