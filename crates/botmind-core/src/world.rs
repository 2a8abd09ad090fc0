//! The game-world adapter consumed by the decision pipeline.
//!
//! The core never touches game objects directly. It asks a
//! [`WorldAdapter`] for vitals, liveness, combat status, position, and
//! nearby entity counts, and treats every answer as possibly failing.

use std::any::Any;

use botmind_types::{AgentContext, AgentId, Position, Surroundings, Vitals};

/// Errors raised by collaborators (world adapter, catalog entries).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// The world has no record of the agent.
    #[error("agent {agent} is not known to the world")]
    UnknownAgent {
        /// The agent that was queried.
        agent: AgentId,
    },

    /// A world query failed.
    #[error("world query for agent {agent} failed: {message}")]
    QueryFailed {
        /// The agent that was queried.
        agent: AgentId,
        /// Description of the failure.
        message: String,
    },

    /// A behavior or action body failed while executing.
    #[error("execution for agent {agent} failed: {message}")]
    ExecutionFailed {
        /// The agent the body ran for.
        agent: AgentId,
        /// Description of the failure.
        message: String,
    },
}

/// Read-only access to the game world.
pub trait WorldAdapter: Send + Sync {
    /// Raw vitals of the agent.
    fn vitals(&self, agent: AgentId) -> Result<Vitals, CollaboratorError>;

    /// Whether the agent is alive.
    fn is_alive(&self, agent: AgentId) -> Result<bool, CollaboratorError>;

    /// Whether the agent is engaged in combat.
    fn is_in_combat(&self, agent: AgentId) -> Result<bool, CollaboratorError>;

    /// Current position of the agent.
    fn position(&self, agent: AgentId) -> Result<Position, CollaboratorError>;

    /// Nearby enemy and ally counts.
    fn surroundings(&self, agent: AgentId) -> Result<Surroundings, CollaboratorError>;

    /// Assemble a full [`AgentContext`] from the individual queries.
    fn context(&self, agent: AgentId) -> Result<AgentContext, CollaboratorError> {
        Ok(AgentContext {
            agent,
            vitals: self.vitals(agent)?,
            alive: self.is_alive(agent)?,
            in_combat: self.is_in_combat(agent)?,
            position: self.position(agent)?,
            surroundings: self.surroundings(agent)?,
        })
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}
