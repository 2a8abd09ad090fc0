//! Sandbox agent spawning.
//!
//! Agents get sequential ids starting at 1, randomized vitals and
//! surroundings from the sandbox RNG, and are initialized in the
//! decision core.

use botmind_core::orchestrator::DecisionCore;
use botmind_core::sandbox::SandboxWorld;
use botmind_types::AgentId;
use tracing::{info, warn};

/// Spawn `count` agents into the sandbox and initialize them.
///
/// Returns the ids of agents the core accepted.
pub fn spawn_agents(world: &SandboxWorld, core: &DecisionCore, count: u32) -> Vec<AgentId> {
    let mut spawned = Vec::new();
    for raw in 1..=count {
        let agent = AgentId::new(u64::from(raw));
        world.spawn_random(agent);
        if core.initialize(agent) {
            spawned.push(agent);
        } else {
            warn!(%agent, "Agent was already initialized");
        }
    }
    info!(agents = spawned.len(), "Sandbox agents spawned");
    spawned
}
