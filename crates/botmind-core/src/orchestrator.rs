//! The decision core: per-agent lifecycle and the decision pipeline.
//!
//! [`DecisionCore`] owns one [`DecisionEngine`], [`BehaviorSelector`],
//! [`ActionPlanner`], and (optionally) [`DecisionCache`], and shares the
//! [`StateMachine`] with the scheduler. One instance serves every agent of
//! a process or shard; it is constructed explicitly from [`CoreParts`]
//! and passed around by reference.
//!
//! # Pipeline
//!
//! `process_decision(agent)`:
//!
//! 1. Reject agents that are unknown or inactive.
//! 2. Consult the decision cache (agent, activity state, time bucket);
//!    a hit succeeds immediately.
//! 3. Analyze the situation and synthesize a decision; stop unless valid.
//! 4. Select a behavior from the snapshot's candidates; stop if none.
//! 5. Plan actions for it; stop if the plan is empty.
//! 6. Cache the result, bump counters, stamp the agent, and move it into
//!    the behavior's activity state.
//!
//! Every failure becomes `false` plus a log line; only aggregate
//! statistics leave the core. A collaborator that panics mid-pipeline is
//! contained to its agent and counted as a fault.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use botmind_types::{
    ActionKind, ActivityState, AgentId, BehaviorKind, Decision, clamp_unit,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{CachedDecision, DecisionCache};
use crate::catalog::Catalog;
use crate::clock::TimeSource;
use crate::config::BotmindConfig;
use crate::decision::{Analysis, AnalysisError, DecisionEngine, EngineStats};
use crate::planner::{ActionPlanner, PlanError, PlanningStats};
use crate::priority::{AgentPriorityStats, PriorityModel};
use crate::selector::{BehaviorSelector, SelectionStats};
use crate::state_machine::{StateMachine, StateMachineStats};
use crate::world::{CollaboratorError, WorldAdapter, panic_message};

/// Priority assigned to a freshly initialized agent.
pub const INITIAL_PRIORITY: f64 = 0.5;

/// Sentinel for "no decision yet" in [`AgentDecisionState`].
const NEVER: i64 = i64::MIN;

/// Why a decision attempt produced nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// The agent is unknown or inactive.
    #[error("agent {agent} is not active")]
    NotActive {
        /// The agent.
        agent: AgentId,
    },

    /// The decision engine produced no valid decision.
    #[error("no valid decision for agent {agent}")]
    InvalidDecision {
        /// The agent.
        agent: AgentId,
    },

    /// The world could not describe the agent.
    #[error("world query for agent {agent} failed: {source}")]
    World {
        /// The agent.
        agent: AgentId,
        /// The underlying collaborator error.
        source: CollaboratorError,
    },

    /// No behavior was selectable.
    #[error("no behavior available for agent {agent}")]
    NoBehavior {
        /// The agent.
        agent: AgentId,
    },

    /// The selected behavior could not be planned.
    #[error("planning failed for agent {agent}: {source}")]
    Plan {
        /// The agent.
        agent: AgentId,
        /// The underlying planning error.
        source: PlanError,
    },

    /// A collaborator panicked while the pipeline ran.
    #[error("decision pipeline for agent {agent} panicked: {message}")]
    Panicked {
        /// The agent.
        agent: AgentId,
        /// The panic payload, when it was a string.
        message: String,
    },
}

impl CoreError {
    /// Whether the error stems from a misbehaving collaborator rather
    /// than from the agent's situation.
    pub const fn is_fault(&self) -> bool {
        matches!(self, Self::World { .. } | Self::Panicked { .. })
    }
}

/// A successful pass through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionOutcome {
    /// The synthesized decision.
    pub decision: Decision,
    /// The behavior the selector chose.
    pub behavior: BehaviorKind,
    /// The planned actions, never empty.
    pub actions: Vec<ActionKind>,
    /// Whether the outcome came from the decision cache.
    pub cached: bool,
}

impl From<CachedDecision> for DecisionOutcome {
    fn from(cached: CachedDecision) -> Self {
        Self {
            decision: cached.decision,
            behavior: cached.behavior,
            actions: cached.actions,
            cached: true,
        }
    }
}

/// Collaborators the core is built from.
pub struct CoreParts {
    /// Game-world adapter.
    pub world: Arc<dyn WorldAdapter>,
    /// Behavior and action catalog.
    pub catalog: Arc<dyn Catalog>,
    /// Time source.
    pub clock: Arc<dyn TimeSource>,
    /// Priority model.
    pub priorities: Arc<PriorityModel>,
    /// Activity state machine, shared with the scheduler.
    pub states: Arc<StateMachine>,
}

/// Lock-free per-agent decision state.
#[derive(Debug)]
struct AgentDecisionState {
    active: AtomicBool,
    priority_bits: AtomicU64,
    last_decision_ms: AtomicI64,
}

impl AgentDecisionState {
    const fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            priority_bits: AtomicU64::new(INITIAL_PRIORITY.to_bits()),
            last_decision_ms: AtomicI64::new(NEVER),
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn priority(&self) -> f64 {
        f64::from_bits(self.priority_bits.load(Ordering::Acquire))
    }

    fn set_priority(&self, value: f64) {
        self.priority_bits
            .store(clamp_unit(value).to_bits(), Ordering::Release);
    }

    fn touch(&self, now: DateTime<Utc>) {
        self.last_decision_ms
            .store(now.timestamp_millis(), Ordering::Release);
    }

    fn last_decision(&self) -> Option<DateTime<Utc>> {
        match self.last_decision_ms.load(Ordering::Acquire) {
            NEVER => None,
            ms => DateTime::<Utc>::from_timestamp_millis(ms),
        }
    }
}

/// Aggregate counters of the decision core.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoreStatistics {
    /// Agents currently initialized and active.
    pub active_agents: usize,
    /// Non-cached decision attempts on active agents.
    pub decisions: u64,
    /// Attempts that produced a plan.
    pub successful_decisions: u64,
    /// Requests answered from the decision cache.
    pub cached_decisions: u64,
    /// Attempts that ended without a plan.
    pub failed_decisions: u64,
    /// Attempts aborted by a collaborator fault or panic.
    pub faults: u64,
    /// `successful_decisions / decisions`, zero before any attempt.
    pub success_rate: f64,
    /// `cached_decisions / (cached_decisions + decisions)`.
    pub cache_hit_rate: f64,
    /// Entries in the decision cache.
    pub cache_entries: usize,
    /// Decision engine counters.
    pub engine: EngineStats,
    /// State machine counters.
    pub state_machine: StateMachineStats,
}

impl core::fmt::Display for CoreStatistics {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "DecisionCore[agents={}, decisions={}, successful={}, cached={}, failed={}, \
             faults={}, success_rate={:.1}%, cache_hit_rate={:.1}%, cache_entries={}]",
            self.active_agents,
            self.decisions,
            self.successful_decisions,
            self.cached_decisions,
            self.failed_decisions,
            self.faults,
            self.success_rate * 100.0,
            self.cache_hit_rate * 100.0,
            self.cache_entries,
        )
    }
}

/// Everything the core knows about one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStatistics {
    /// The agent.
    pub agent: AgentId,
    /// Whether the agent is active.
    pub active: bool,
    /// Current priority.
    pub priority: f64,
    /// Time of the last successful decision.
    pub last_decision_at: Option<DateTime<Utc>>,
    /// Current activity state.
    pub state: Option<ActivityState>,
    /// Behavior selection counters.
    pub selection: Option<SelectionStats>,
    /// Planning counters.
    pub planning: Option<PlanningStats>,
    /// Action priority statistics.
    pub priorities: Option<AgentPriorityStats>,
}

/// The decision core.
pub struct DecisionCore {
    clock: Arc<dyn TimeSource>,
    priorities: Arc<PriorityModel>,
    states: Arc<StateMachine>,
    engine: DecisionEngine,
    selector: BehaviorSelector,
    planner: ActionPlanner,
    cache: Option<DecisionCache>,
    agents: RwLock<HashMap<AgentId, Arc<AgentDecisionState>>>,
    decisions: AtomicU64,
    successes: AtomicU64,
    cache_hits: AtomicU64,
    failures: AtomicU64,
    faults: AtomicU64,
}

impl core::fmt::Debug for DecisionCore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DecisionCore")
            .field("statistics", &self.statistics())
            .finish_non_exhaustive()
    }
}

impl DecisionCore {
    /// Build a core from its collaborators and configuration.
    pub fn new(parts: CoreParts, config: &BotmindConfig) -> Self {
        let decision = &config.decision;
        let engine = DecisionEngine::new(
            parts.world,
            Arc::clone(&parts.catalog),
            Arc::clone(&parts.priorities),
            Arc::clone(&parts.clock),
            decision.snapshot_max_age_ms,
        );
        let cache = decision.cache_enabled.then(|| {
            DecisionCache::new(
                decision.cache_ttl_ms,
                decision.cache_max_entries,
                decision.cache_bucket_ms,
            )
        });
        Self {
            selector: BehaviorSelector::new(Arc::clone(&parts.catalog), decision.default_behavior),
            planner: ActionPlanner::new(parts.catalog),
            clock: parts.clock,
            priorities: parts.priorities,
            states: parts.states,
            engine,
            cache,
            agents: RwLock::new(HashMap::new()),
            decisions: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            faults: AtomicU64::new(0),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start managing an agent: active, priority 0.5, idle.
    ///
    /// Initializing an agent twice is a no-op that logs a warning and
    /// returns `false`.
    pub fn initialize(&self, agent: AgentId) -> bool {
        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        if agents.contains_key(&agent) {
            warn!(%agent, "Decision core already initialized for agent");
            return false;
        }
        agents.insert(agent, Arc::new(AgentDecisionState::new()));
        drop(agents);

        if let Err(e) = self.states.register(agent) {
            debug!(%agent, error = %e, "Agent already tracked by state machine");
        }
        info!(%agent, "Decision core initialized for agent");
        true
    }

    /// Stop managing an agent and forget its cached data. Returns whether
    /// the agent was initialized.
    pub fn shutdown(&self, agent: AgentId) -> bool {
        let removed = self
            .agents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&agent)
            .is_some();
        if !removed {
            return false;
        }
        self.states.unregister(agent);
        self.engine.update_context(agent);
        if let Some(cache) = &self.cache {
            cache.remove_agent(agent);
        }
        self.selector.reset_stats(agent);
        self.planner.reset_stats(agent);
        self.priorities.clear_agent(agent);
        info!(%agent, "Decision core shut down for agent");
        true
    }

    /// Whether the agent is initialized and active.
    pub fn is_active(&self, agent: AgentId) -> bool {
        self.agent_state(agent).is_some_and(|s| s.is_active())
    }

    /// Pause or resume an initialized agent. Returns whether the agent exists.
    pub fn set_active(&self, agent: AgentId, active: bool) -> bool {
        let Some(state) = self.agent_state(agent) else {
            return false;
        };
        state.active.store(active, Ordering::Release);
        debug!(%agent, active, "Agent activity flag changed");
        true
    }

    /// Active agents, in ascending id order.
    pub fn active_agents(&self) -> Vec<AgentId> {
        let agents = self.agents.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<AgentId> = agents
            .iter()
            .filter(|(_, state)| state.is_active())
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    // -----------------------------------------------------------------------
    // Pipeline
    // -----------------------------------------------------------------------

    /// Run the decision pipeline for one agent, reporting why it stopped.
    pub fn try_process_decision(&self, agent: AgentId) -> Result<DecisionOutcome, CoreError> {
        let state = self
            .agent_state(agent)
            .filter(|s| s.is_active())
            .ok_or(CoreError::NotActive { agent })?;

        let now = self.clock.now();
        let activity = self.states.state(agent).unwrap_or(ActivityState::Idle);
        let key = self.cache.as_ref().map(|cache| cache.key(agent, activity, now));

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache.get(key, now) {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                state.touch(now);
                debug!(%agent, behavior = %hit.behavior, "Decision served from cache");
                return Ok(hit.into());
            }
        }

        self.decisions.fetch_add(1, Ordering::Relaxed);
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run_pipeline(agent)))
            .unwrap_or_else(|payload| {
                Err(CoreError::Panicked {
                    agent,
                    message: panic_message(payload.as_ref()),
                })
            });
        match result {
            Ok(outcome) => {
                if let (Some(cache), Some(key)) = (&self.cache, key) {
                    cache.insert(
                        key,
                        CachedDecision {
                            decision: outcome.decision.clone(),
                            behavior: outcome.behavior,
                            actions: outcome.actions.clone(),
                            cached_at: now,
                        },
                        now,
                    );
                }
                self.successes.fetch_add(1, Ordering::Relaxed);
                state.touch(now);
                let target = outcome.behavior.activity_state();
                if target != activity {
                    self.states.update_state_from_behavior(agent, outcome.behavior);
                }
                debug!(
                    %agent,
                    behavior = %outcome.behavior,
                    actions = outcome.actions.len(),
                    priority = outcome.decision.priority(),
                    "Decision processed"
                );
                Ok(outcome)
            }
            Err(e) => {
                if e.is_fault() {
                    self.faults.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                }
                Err(e)
            }
        }
    }

    /// Run the decision pipeline for one agent. Returns whether a plan
    /// was produced (or served from cache).
    pub fn process_decision(&self, agent: AgentId) -> bool {
        match self.try_process_decision(agent) {
            Ok(_) => true,
            Err(e @ CoreError::NotActive { .. }) => {
                warn!(%agent, error = %e, "Decision processing failed");
                false
            }
            Err(e) if e.is_fault() => {
                warn!(%agent, error = %e, "Decision processing failed");
                false
            }
            Err(e) => {
                debug!(%agent, error = %e, "No decision produced");
                false
            }
        }
    }

    /// Select a behavior for an active agent from a fresh analysis.
    pub fn select_behavior(&self, agent: AgentId) -> Option<BehaviorKind> {
        if !self.is_active(agent) {
            return None;
        }
        let analysis = self.engine.analyze(agent).ok()?;
        self.selector
            .select_behavior(&analysis.context, analysis.snapshot.available_behaviors())
    }

    /// Plan actions for a behavior kind. Empty when the agent is inactive
    /// or nothing can be planned.
    pub fn plan_actions(&self, agent: AgentId, behavior: BehaviorKind) -> Vec<ActionKind> {
        if !self.is_active(agent) {
            return Vec::new();
        }
        self.planner.plan_by_kind(agent, behavior)
    }

    /// Urgency of the agent's current situation in `[0, 1]`: the
    /// recommended priority of its snapshot (cached while fresh). Zero for
    /// agents that are unknown or inactive.
    pub fn evaluate_situation(&self, agent: AgentId) -> f64 {
        if !self.is_active(agent) {
            return 0.0;
        }
        self.engine.analyze_situation(agent).recommended_priority()
    }

    /// The agent's priority, if it is initialized.
    pub fn get_priority(&self, agent: AgentId) -> Option<f64> {
        self.agent_state(agent).map(|s| s.priority())
    }

    /// Set the agent's priority, clamped into `[0, 1]`. Returns whether
    /// the agent is initialized.
    pub fn set_priority(&self, agent: AgentId, priority: f64) -> bool {
        let Some(state) = self.agent_state(agent) else {
            return false;
        };
        state.set_priority(priority);
        true
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Aggregate counters.
    pub fn statistics(&self) -> CoreStatistics {
        let decisions = self.decisions.load(Ordering::Relaxed);
        let successful_decisions = self.successes.load(Ordering::Relaxed);
        let cached_decisions = self.cache_hits.load(Ordering::Relaxed);
        CoreStatistics {
            active_agents: self.active_agents().len(),
            decisions,
            successful_decisions,
            cached_decisions,
            failed_decisions: self.failures.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            success_rate: ratio(successful_decisions, decisions),
            cache_hit_rate: ratio(
                cached_decisions,
                cached_decisions.saturating_add(decisions),
            ),
            cache_entries: self.cache.as_ref().map_or(0, DecisionCache::len),
            engine: self.engine.statistics(),
            state_machine: self.states.statistics(),
        }
    }

    /// Per-agent view, if the agent is initialized.
    pub fn agent_statistics(&self, agent: AgentId) -> Option<AgentStatistics> {
        let state = self.agent_state(agent)?;
        Some(AgentStatistics {
            agent,
            active: state.is_active(),
            priority: state.priority(),
            last_decision_at: state.last_decision(),
            state: self.states.state(agent),
            selection: self.selector.stats(agent),
            planning: self.planner.stats(agent),
            priorities: self.priorities.agent_stats(agent),
        })
    }

    /// The decision engine.
    pub const fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// The behavior selector.
    pub const fn selector(&self) -> &BehaviorSelector {
        &self.selector
    }

    /// The action planner.
    pub const fn planner(&self) -> &ActionPlanner {
        &self.planner
    }

    /// The shared activity state machine.
    pub const fn state_machine(&self) -> &Arc<StateMachine> {
        &self.states
    }

    /// The shared priority model.
    pub const fn priorities(&self) -> &Arc<PriorityModel> {
        &self.priorities
    }

    fn agent_state(&self, agent: AgentId) -> Option<Arc<AgentDecisionState>> {
        let agents = self.agents.read().unwrap_or_else(PoisonError::into_inner);
        agents.get(&agent).cloned()
    }

    fn run_pipeline(&self, agent: AgentId) -> Result<DecisionOutcome, CoreError> {
        let Analysis { snapshot, context } =
            self.engine.analyze(agent).map_err(|e| match e {
                AnalysisError::World { source } => CoreError::World { agent, source },
            })?;
        let decision = self
            .engine
            .make_decision(agent, Some(&snapshot))
            .filter(Decision::is_valid)
            .ok_or(CoreError::InvalidDecision { agent })?;

        let behavior = self
            .selector
            .select_behavior(&context, snapshot.available_behaviors())
            .ok_or(CoreError::NoBehavior { agent })?;

        let actions = self
            .planner
            .try_plan(agent, behavior)
            .map_err(|source| CoreError::Plan { agent, source })?;

        Ok(DecisionOutcome {
            decision,
            behavior,
            actions,
            cached: false,
        })
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let part = u32::try_from(part).map_or(f64::from(u32::MAX), f64::from);
    let whole = u32::try_from(whole).map_or(f64::from(u32::MAX), f64::from);
    (part / whole).min(1.0)
}
