//! In-memory world and catalog for running the core without a game server.
//!
//! [`SandboxWorld`] implements [`WorldAdapter`] over a map of agent
//! records. [`SandboxWorld::drift`] perturbs vitals and surroundings with
//! a seeded RNG, so repeated runs with the same seed see the same worlds.
//! [`standard_catalog`] registers every behavior and action kind with
//! simple vitals-based preconditions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use botmind_types::{ActionKind, AgentContext, AgentId, BehaviorKind, Position, Surroundings, Vitals};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::catalog::{Precondition, RuleAction, RuleBehavior, StaticCatalog};
use crate::world::{CollaboratorError, WorldAdapter};

/// Largest number of enemies or allies the sandbox places near an agent.
const MAX_NEARBY: u32 = 6;

/// One agent as the sandbox sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SandboxAgent {
    /// Current vitals.
    pub vitals: Vitals,
    /// Whether the agent is alive.
    pub alive: bool,
    /// Whether the agent is fighting.
    pub in_combat: bool,
    /// Current position.
    pub position: Position,
    /// Nearby entity counts.
    pub surroundings: Surroundings,
}

/// A scripted, seeded world.
#[derive(Debug)]
pub struct SandboxWorld {
    agents: Mutex<HashMap<AgentId, SandboxAgent>>,
    rng: Mutex<StdRng>,
}

impl SandboxWorld {
    /// Create an empty world with a deterministic RNG.
    pub fn new(seed: u64) -> Self {
        Self {
            agents: Mutex::new(HashMap::new()),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Add (or replace) a living agent.
    pub fn spawn(
        &self,
        agent: AgentId,
        vitals: Vitals,
        position: Position,
        surroundings: Surroundings,
    ) {
        let mut agents = self.agents.lock().unwrap_or_else(PoisonError::into_inner);
        agents.insert(
            agent,
            SandboxAgent {
                vitals,
                alive: true,
                in_combat: surroundings.nearby_enemies > 0,
                position,
                surroundings,
            },
        );
    }

    /// Add a living agent with randomized vitals and surroundings.
    pub fn spawn_random(&self, agent: AgentId) {
        let record = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            let hp: f64 = rng.random_range(0.2..=1.0);
            let mp: f64 = rng.random_range(0.1..=1.0);
            let surroundings = Surroundings {
                nearby_enemies: rng.random_range(0..=MAX_NEARBY),
                nearby_allies: rng.random_range(0..=MAX_NEARBY),
            };
            let position = Position {
                x: rng.random_range(-1000.0..1000.0),
                y: rng.random_range(-1000.0..1000.0),
                z: 0.0,
            };
            (
                Vitals {
                    current_hp: hp * 100.0,
                    max_hp: 100.0,
                    current_mp: mp * 100.0,
                    max_mp: 100.0,
                },
                position,
                surroundings,
            )
        };
        self.spawn(agent, record.0, record.1, record.2);
    }

    /// Remove an agent. Subsequent queries for it fail.
    pub fn despawn(&self, agent: AgentId) -> bool {
        let mut agents = self.agents.lock().unwrap_or_else(PoisonError::into_inner);
        agents.remove(&agent).is_some()
    }

    /// Mark an agent dead.
    pub fn kill(&self, agent: AgentId) {
        self.modify(agent, |record| {
            record.alive = false;
            record.in_combat = false;
            record.vitals.current_hp = 0.0;
        });
    }

    /// Replace an agent's vitals.
    pub fn set_vitals(&self, agent: AgentId, vitals: Vitals) {
        self.modify(agent, |record| record.vitals = vitals);
    }

    /// Replace an agent's surroundings; combat follows enemy presence.
    pub fn set_surroundings(&self, agent: AgentId, surroundings: Surroundings) {
        self.modify(agent, |record| {
            record.surroundings = surroundings;
            record.in_combat = surroundings.nearby_enemies > 0;
        });
    }

    /// Current record of an agent.
    pub fn agent(&self, agent: AgentId) -> Option<SandboxAgent> {
        let agents = self.agents.lock().unwrap_or_else(PoisonError::into_inner);
        agents.get(&agent).copied()
    }

    /// Perturb every living agent: vitals wander by up to ten percent and
    /// enemies and allies come and go one at a time.
    pub fn drift(&self) {
        let mut agents = self.agents.lock().unwrap_or_else(PoisonError::into_inner);
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        for record in agents.values_mut().filter(|r| r.alive) {
            let hp_step: f64 = rng.random_range(-0.1..=0.1) * record.vitals.max_hp;
            let mp_step: f64 = rng.random_range(-0.1..=0.1) * record.vitals.max_mp;
            // Drift never kills: hp stays at or above one point.
            record.vitals.current_hp = (record.vitals.current_hp + hp_step)
                .min(record.vitals.max_hp)
                .max(record.vitals.max_hp.min(1.0));
            record.vitals.current_mp = (record.vitals.current_mp + mp_step)
                .min(record.vitals.max_mp)
                .max(0.0);
            record.surroundings.nearby_enemies =
                wander(&mut *rng, record.surroundings.nearby_enemies);
            record.surroundings.nearby_allies =
                wander(&mut *rng, record.surroundings.nearby_allies);
            record.in_combat = record.surroundings.nearby_enemies > 0;
            record.position.x += rng.random_range(-5.0..=5.0);
            record.position.y += rng.random_range(-5.0..=5.0);
        }
        debug!(agents = agents.len(), "Sandbox drifted");
    }

    fn modify<F: FnOnce(&mut SandboxAgent)>(&self, agent: AgentId, change: F) {
        let mut agents = self.agents.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = agents.get_mut(&agent) {
            change(record);
        }
    }

    fn lookup(&self, agent: AgentId) -> Result<SandboxAgent, CollaboratorError> {
        self.agent(agent)
            .ok_or(CollaboratorError::UnknownAgent { agent })
    }
}

fn wander(rng: &mut impl Rng, count: u32) -> u32 {
    match rng.random_range(0..3_u8) {
        0 => count.saturating_sub(1),
        1 => count.saturating_add(1).min(MAX_NEARBY),
        _ => count,
    }
}

impl WorldAdapter for SandboxWorld {
    fn vitals(&self, agent: AgentId) -> Result<Vitals, CollaboratorError> {
        self.lookup(agent).map(|r| r.vitals)
    }

    fn is_alive(&self, agent: AgentId) -> Result<bool, CollaboratorError> {
        self.lookup(agent).map(|r| r.alive)
    }

    fn is_in_combat(&self, agent: AgentId) -> Result<bool, CollaboratorError> {
        self.lookup(agent).map(|r| r.in_combat)
    }

    fn position(&self, agent: AgentId) -> Result<Position, CollaboratorError> {
        self.lookup(agent).map(|r| r.position)
    }

    fn surroundings(&self, agent: AgentId) -> Result<Surroundings, CollaboratorError> {
        self.lookup(agent).map(|r| r.surroundings)
    }

    fn context(&self, agent: AgentId) -> Result<AgentContext, CollaboratorError> {
        let record = self.lookup(agent)?;
        Ok(AgentContext {
            agent,
            vitals: record.vitals,
            alive: record.alive,
            in_combat: record.in_combat,
            position: record.position,
            surroundings: record.surroundings,
        })
    }
}

/// Precondition for each behavior kind in the standard catalog.
fn behavior_rule(kind: BehaviorKind) -> Precondition {
    match kind {
        BehaviorKind::Idle
        | BehaviorKind::Patrolling
        | BehaviorKind::Guarding
        | BehaviorKind::Moving
        | BehaviorKind::Resting => |_| true,
        BehaviorKind::Farming | BehaviorKind::Attacking => |ctx| ctx.surroundings.nearby_enemies > 0,
        BehaviorKind::Pvp => |ctx| {
            ctx.surroundings.nearby_enemies > 0
                && ctx.health_ratio() >= botmind_types::SituationTag::LOW_HEALTH_THRESHOLD
        },
        BehaviorKind::Defending => |ctx| ctx.in_combat || ctx.surroundings.nearby_enemies > 0,
        BehaviorKind::Healing => |ctx| ctx.health_ratio() < 0.5 || ctx.surroundings.nearby_allies > 0,
        BehaviorKind::Supporting | BehaviorKind::Following | BehaviorKind::Social => {
            |ctx| ctx.surroundings.nearby_allies > 0
        }
        BehaviorKind::Questing
        | BehaviorKind::Crafting
        | BehaviorKind::Trading
        | BehaviorKind::Looting => |ctx| !ctx.in_combat,
    }
}

/// Precondition for each action kind in the standard catalog.
fn action_rule(kind: ActionKind) -> Precondition {
    match kind {
        ActionKind::Attack => |ctx| ctx.surroundings.nearby_enemies > 0,
        ActionKind::CastSkill => |ctx| ctx.surroundings.nearby_enemies > 0 && ctx.mana_ratio() >= 0.1,
        ActionKind::Pickup | ActionKind::Talk | ActionKind::Trade => |ctx| !ctx.in_combat,
        ActionKind::Idle
        | ActionKind::Move
        | ActionKind::Turn
        | ActionKind::Stop
        | ActionKind::UseItem
        | ActionKind::Defend
        | ActionKind::Escape
        | ActionKind::Drop
        | ActionKind::Use
        | ActionKind::Equip
        | ActionKind::Unequip
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
        | ActionKind::Wait => |_| true,
    }
}

/// A catalog with every behavior and action kind registered.
pub fn standard_catalog() -> StaticCatalog {
    let catalog = BehaviorKind::ALL.iter().fold(StaticCatalog::new(), |catalog, &kind| {
        catalog.with_behavior(Arc::new(RuleBehavior::new(kind, behavior_rule(kind))))
    });
    ActionKind::ALL.iter().fold(catalog, |catalog, &kind| {
        catalog.with_action(Arc::new(RuleAction::new(kind, action_rule(kind))))
    })
}
