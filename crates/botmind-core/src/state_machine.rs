//! Per-agent activity state machine.
//!
//! Tracks the coarse activity state of every registered agent and
//! validates transitions against [`ActivityState::can_transition_to`]:
//! a dead agent may only disconnect, a disconnected agent may only return
//! to idle, and anything else is accepted.
//!
//! Rejected transitions change nothing (state, reason, and last-change
//! time stay as they were) and are reported through the return value and
//! a warning log. Accepted transitions are appended to a bounded
//! per-agent history; when it is full the oldest record is evicted.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use botmind_types::{
    ActionKind, ActivityInfo, ActivityState, AgentId, BehaviorKind, TransitionRecord,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::TimeSource;

/// Errors reported by state machine operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The agent is not registered.
    #[error("agent {agent} is not registered with the state machine")]
    UnknownAgent {
        /// The agent.
        agent: AgentId,
    },

    /// The agent is already registered.
    #[error("agent {agent} is already registered with the state machine")]
    AlreadyRegistered {
        /// The agent.
        agent: AgentId,
    },

    /// The requested transition is not allowed from the current state.
    #[error("illegal transition for agent {agent}: {from} -> {to}")]
    Illegal {
        /// The agent.
        agent: AgentId,
        /// Current state.
        from: ActivityState,
        /// Requested state.
        to: ActivityState,
    },
}

/// Aggregate state machine counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateMachineStats {
    /// Registered agents.
    pub agents: usize,
    /// Accepted transitions since construction.
    pub transitions: u64,
    /// Rejected transitions since construction.
    pub errors: u64,
}

/// Mutable per-agent record.
#[derive(Debug)]
struct AgentActivity {
    info: ActivityInfo,
    history: VecDeque<TransitionRecord>,
}

/// Registry of agent activity states.
pub struct StateMachine {
    agents: Mutex<HashMap<AgentId, AgentActivity>>,
    history_limit: usize,
    clock: Arc<dyn TimeSource>,
    transitions: AtomicU64,
    errors: AtomicU64,
}

impl core::fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StateMachine")
            .field("history_limit", &self.history_limit)
            .field("transitions", &self.transitions.load(Ordering::Relaxed))
            .field("errors", &self.errors.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl StateMachine {
    /// Create an empty registry keeping at most `history_limit`
    /// transitions per agent.
    pub fn new(clock: Arc<dyn TimeSource>, history_limit: usize) -> Self {
        Self {
            agents: Mutex::new(HashMap::new()),
            history_limit,
            clock,
            transitions: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Register an agent in the `Idle` state.
    pub fn register(&self, agent: AgentId) -> Result<(), TransitionError> {
        let mut agents = self.agents.lock().unwrap_or_else(PoisonError::into_inner);
        if agents.contains_key(&agent) {
            return Err(TransitionError::AlreadyRegistered { agent });
        }
        agents.insert(
            agent,
            AgentActivity {
                info: ActivityInfo {
                    state: ActivityState::Idle,
                    last_change: self.clock.now(),
                    reason: String::from("Initialized"),
                },
                history: VecDeque::new(),
            },
        );
        info!(%agent, "Agent registered with state machine");
        Ok(())
    }

    /// Remove an agent. Returns whether it was registered.
    pub fn unregister(&self, agent: AgentId) -> bool {
        let mut agents = self.agents.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = agents.remove(&agent).is_some();
        if removed {
            info!(%agent, "Agent removed from state machine");
        }
        removed
    }

    /// Attempt a transition, reporting why it was refused.
    pub fn try_transition(
        &self,
        agent: AgentId,
        to: ActivityState,
        reason: &str,
    ) -> Result<(), TransitionError> {
        let mut agents = self.agents.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = agents.get_mut(&agent) else {
            self.errors.fetch_add(1, Ordering::Relaxed);
            return Err(TransitionError::UnknownAgent { agent });
        };

        let from = entry.info.state;
        if !from.can_transition_to(to) {
            self.errors.fetch_add(1, Ordering::Relaxed);
            return Err(TransitionError::Illegal { agent, from, to });
        }

        let now = self.clock.now();
        entry.info = ActivityInfo {
            state: to,
            last_change: now,
            reason: reason.to_owned(),
        };
        if self.history_limit > 0 {
            while entry.history.len() >= self.history_limit {
                entry.history.pop_front();
            }
            entry.history.push_back(TransitionRecord {
                from,
                to,
                reason: reason.to_owned(),
                at: now,
            });
        }
        self.transitions.fetch_add(1, Ordering::Relaxed);
        debug!(%agent, %from, %to, reason, "State transition");
        Ok(())
    }

    /// Attempt a transition. Refusals are logged and reported as `false`.
    pub fn transition(&self, agent: AgentId, to: ActivityState, reason: &str) -> bool {
        match self.try_transition(agent, to, reason) {
            Ok(()) => true,
            Err(e) => {
                warn!(%agent, error = %e, "State transition refused");
                false
            }
        }
    }

    /// Move the agent into the state associated with a behavior.
    pub fn update_state_from_behavior(&self, agent: AgentId, behavior: BehaviorKind) -> bool {
        let reason = format!("Behavior: {behavior}");
        self.transition(agent, behavior.activity_state(), &reason)
    }

    /// Move the agent into the state associated with an action.
    pub fn update_state_from_action(&self, agent: AgentId, action: ActionKind) -> bool {
        let reason = format!("Action: {action}");
        self.transition(agent, action.activity_state(), &reason)
    }

    /// Current state of an agent.
    pub fn state(&self, agent: AgentId) -> Option<ActivityState> {
        let agents = self.agents.lock().unwrap_or_else(PoisonError::into_inner);
        agents.get(&agent).map(|entry| entry.info.state)
    }

    /// Current state, reason, and last-change time of an agent.
    pub fn info(&self, agent: AgentId) -> Option<ActivityInfo> {
        let agents = self.agents.lock().unwrap_or_else(PoisonError::into_inner);
        agents.get(&agent).map(|entry| entry.info.clone())
    }

    /// Accepted transitions of an agent, oldest first.
    pub fn history(&self, agent: AgentId) -> Vec<TransitionRecord> {
        let agents = self.agents.lock().unwrap_or_else(PoisonError::into_inner);
        agents
            .get(&agent)
            .map(|entry| entry.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Registered agents, in ascending id order.
    pub fn active_agents(&self) -> Vec<AgentId> {
        let agents = self.agents.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<AgentId> = agents.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Aggregate counters.
    pub fn statistics(&self) -> StateMachineStats {
        let agents = self.agents.lock().unwrap_or_else(PoisonError::into_inner).len();
        StateMachineStats {
            agents,
            transitions: self.transitions.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::clock::ManualClock;

    fn machine(limit: usize) -> (Arc<ManualClock>, StateMachine) {
        let clock = Arc::new(ManualClock::at_epoch());
        let sm = StateMachine::new(Arc::clone(&clock) as Arc<dyn TimeSource>, limit);
        (clock, sm)
    }

    #[test]
    fn register_starts_idle_and_rejects_duplicates() {
        let (_clock, sm) = machine(10);
        let agent = AgentId::new(1);
        assert_eq!(sm.register(agent), Ok(()));
        assert_eq!(sm.state(agent), Some(ActivityState::Idle));
        assert_eq!(
            sm.register(agent),
            Err(TransitionError::AlreadyRegistered { agent })
        );
        assert_eq!(sm.info(agent).map(|i| i.reason), Some(String::from("Initialized")));
    }

    #[test]
    fn illegal_transition_mutates_nothing() {
        let (clock, sm) = machine(10);
        let agent = AgentId::new(1);
        assert!(sm.register(agent).is_ok());
        assert!(sm.transition(agent, ActivityState::Dead, "killed"));
        let before = sm.info(agent);

        clock.advance_ms(1000);
        assert_eq!(
            sm.try_transition(agent, ActivityState::Moving, "walk"),
            Err(TransitionError::Illegal {
                agent,
                from: ActivityState::Dead,
                to: ActivityState::Moving,
            })
        );
        assert_eq!(sm.info(agent), before);
        assert_eq!(sm.history(agent).len(), 1);
        assert_eq!(sm.statistics().errors, 1);
    }

    #[test]
    fn legality_table_is_enforced() {
        let (_clock, sm) = machine(10);
        let agent = AgentId::new(2);
        assert!(sm.register(agent).is_ok());

        assert!(sm.transition(agent, ActivityState::Dead, "killed"));
        assert!(!sm.transition(agent, ActivityState::Idle, "revive"));
        assert!(sm.transition(agent, ActivityState::Disconnected, "logout"));
        assert!(!sm.transition(agent, ActivityState::Moving, "walk"));
        assert!(sm.transition(agent, ActivityState::Idle, "login"));
        assert!(sm.transition(agent, ActivityState::Fighting, "aggro"));
    }

    #[test]
    #[allow(clippy::arithmetic_side_effects)]
    fn every_pair_follows_the_legality_rule() {
        let (clock, sm) = machine(100);
        let mut raw = 0;
        for from in ActivityState::ALL {
            for to in ActivityState::ALL {
                raw += 1;
                let agent = AgentId::new(raw);
                assert!(sm.register(agent).is_ok());
                // Every state is reachable from idle in one step.
                assert!(sm.transition(agent, from, "setup"));
                clock.advance_ms(10);

                let before = sm.info(agent);
                let history_len = sm.history(agent).len();
                let legal = !matches!(from, ActivityState::Dead | ActivityState::Disconnected)
                    || (from == ActivityState::Dead && to == ActivityState::Disconnected)
                    || (from == ActivityState::Disconnected && to == ActivityState::Idle);

                assert_eq!(sm.transition(agent, to, "attempt"), legal, "{from} -> {to}");
                if legal {
                    assert_eq!(sm.state(agent), Some(to), "{from} -> {to}");
                    assert_eq!(sm.history(agent).len(), history_len + 1);
                } else {
                    assert_eq!(sm.info(agent), before, "{from} -> {to}");
                    assert_eq!(sm.history(agent).len(), history_len, "{from} -> {to}");
                }
            }
        }
        assert_eq!(sm.statistics().errors, 18);
    }

    #[test]
    fn history_is_bounded_and_keeps_newest() {
        let (clock, sm) = machine(3);
        let agent = AgentId::new(3);
        assert!(sm.register(agent).is_ok());
        let states = [
            ActivityState::Moving,
            ActivityState::Fighting,
            ActivityState::Farming,
            ActivityState::Resting,
            ActivityState::Trading,
        ];
        for state in states {
            clock.advance_ms(10);
            assert!(sm.transition(agent, state, "step"));
        }

        let history = sm.history(agent);
        assert_eq!(history.len(), 3);
        let targets: Vec<ActivityState> = history.iter().map(|r| r.to).collect();
        assert_eq!(
            targets,
            vec![
                ActivityState::Farming,
                ActivityState::Resting,
                ActivityState::Trading
            ]
        );
        assert_eq!(
            history.last().map(|r| r.at),
            DateTime::from_timestamp_millis(50)
        );
        assert_eq!(sm.statistics().transitions, 5);
    }

    #[test]
    fn unknown_agent_is_an_error() {
        let (_clock, sm) = machine(3);
        let agent = AgentId::new(99);
        assert_eq!(
            sm.try_transition(agent, ActivityState::Moving, "walk"),
            Err(TransitionError::UnknownAgent { agent })
        );
        assert!(sm.history(agent).is_empty());
        assert!(!sm.unregister(agent));
    }

    #[test]
    fn behavior_and_action_mappings_drive_transitions() {
        let (_clock, sm) = machine(10);
        let agent = AgentId::new(4);
        assert!(sm.register(agent).is_ok());

        assert!(sm.update_state_from_behavior(agent, BehaviorKind::Pvp));
        assert_eq!(sm.state(agent), Some(ActivityState::Fighting));

        assert!(sm.update_state_from_behavior(agent, BehaviorKind::Questing));
        assert_eq!(sm.state(agent), Some(ActivityState::Farming));

        assert!(sm.update_state_from_action(agent, ActionKind::Meditate));
        assert_eq!(sm.state(agent), Some(ActivityState::Resting));
        assert_eq!(
            sm.info(agent).map(|i| i.reason),
            Some(String::from("Action: meditate"))
        );
    }

    #[test]
    fn active_agents_sorted() {
        let (_clock, sm) = machine(1);
        for raw in [5, 1, 3] {
            assert!(sm.register(AgentId::new(raw)).is_ok());
        }
        assert_eq!(
            sm.active_agents(),
            vec![AgentId::new(1), AgentId::new(3), AgentId::new(5)]
        );
        assert!(sm.unregister(AgentId::new(3)));
        assert_eq!(sm.statistics().agents, 2);
    }
}
