//! Situation analysis and decision synthesis.
//!
//! The [`DecisionEngine`] turns world queries into a [`SituationSnapshot`]
//! and a snapshot into a [`Decision`]:
//!
//! - **Danger** is enemies per ally (per one when alone) divided by three,
//!   capped at one.
//! - **Viable behaviors and actions** are the catalog entries whose
//!   preconditions hold, each scored by the [`PriorityModel`] under the
//!   snapshot's situation tag.
//! - **Recommended priority** is `min(1, danger + (1 - health) * 0.5)`.
//! - **Confidence** is `(behaviors + actions) / 8`, clamped into `[0.1, 1]`.
//!
//! Snapshots are cached per agent and reused while fresh. A failed world
//! query yields a conservative snapshot (no threat, full health and mana,
//! nothing available) that is never cached.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use botmind_types::{
    ActionKind, AgentContext, AgentId, BehaviorKind, Decision, SituationSnapshot,
};
use chrono::TimeDelta;
use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::clock::TimeSource;
use crate::priority::{PriorityModel, highest_priority};
use crate::world::{CollaboratorError, WorldAdapter};

/// Weight of missing health in the recommended priority.
const HEALTH_URGENCY_WEIGHT: f64 = 0.5;

/// Number of viable options at which confidence saturates.
const CONFIDENCE_SATURATION: f64 = 8.0;

/// Lowest confidence assigned to any decision.
const MIN_CONFIDENCE: f64 = 0.1;

/// Errors raised while analyzing a situation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    /// A world query failed.
    #[error("world query failed: {source}")]
    World {
        /// The underlying collaborator error.
        #[from]
        source: CollaboratorError,
    },
}

/// Counters exposed by [`DecisionEngine::statistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Snapshots built from fresh world queries.
    pub analyses: u64,
    /// Analyses answered from the snapshot cache.
    pub snapshot_hits: u64,
    /// Analyses that fell back to the conservative snapshot.
    pub analysis_faults: u64,
    /// Decisions synthesized.
    pub decisions: u64,
    /// Snapshots currently cached.
    pub cached_snapshots: usize,
}

/// A snapshot together with the world context it was built from.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// The situation snapshot.
    pub snapshot: Arc<SituationSnapshot>,
    /// The context the snapshot was derived from.
    pub context: AgentContext,
}

/// Builds situation snapshots and synthesizes decisions.
pub struct DecisionEngine {
    world: Arc<dyn WorldAdapter>,
    catalog: Arc<dyn Catalog>,
    priorities: Arc<PriorityModel>,
    clock: Arc<dyn TimeSource>,
    snapshot_max_age: TimeDelta,
    snapshots: Mutex<HashMap<AgentId, Analysis>>,
    analyses: AtomicU64,
    snapshot_hits: AtomicU64,
    analysis_faults: AtomicU64,
    decisions: AtomicU64,
}

impl core::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DecisionEngine")
            .field("snapshot_max_age", &self.snapshot_max_age)
            .field("stats", &self.statistics())
            .finish_non_exhaustive()
    }
}

impl DecisionEngine {
    /// Create an engine. Snapshots older than `snapshot_max_age_ms` are
    /// rebuilt on the next analysis.
    pub fn new(
        world: Arc<dyn WorldAdapter>,
        catalog: Arc<dyn Catalog>,
        priorities: Arc<PriorityModel>,
        clock: Arc<dyn TimeSource>,
        snapshot_max_age_ms: u64,
    ) -> Self {
        let max_age_ms = i64::try_from(snapshot_max_age_ms).unwrap_or(i64::MAX);
        Self {
            world,
            catalog,
            priorities,
            clock,
            snapshot_max_age: TimeDelta::try_milliseconds(max_age_ms).unwrap_or(TimeDelta::MAX),
            snapshots: Mutex::new(HashMap::new()),
            analyses: AtomicU64::new(0),
            snapshot_hits: AtomicU64::new(0),
            analysis_faults: AtomicU64::new(0),
            decisions: AtomicU64::new(0),
        }
    }

    /// Analyze an agent's situation, keeping the context it came from.
    ///
    /// Returns the cached analysis while its snapshot is fresh; otherwise
    /// queries the world once, builds, caches, and returns a new one.
    pub fn try_analyze(&self, agent: AgentId) -> Result<Analysis, AnalysisError> {
        let now = self.clock.now();
        if let Some(cached) = self.cached_analysis(agent) {
            if cached.snapshot.is_fresh(now, self.snapshot_max_age) {
                self.snapshot_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(cached);
            }
        }

        let context = self.world.context(agent)?;
        let analysis = Analysis {
            snapshot: Arc::new(self.build_snapshot(&context)),
            context,
        };
        self.analyses.fetch_add(1, Ordering::Relaxed);

        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots.insert(agent, analysis.clone());
        drop(snapshots);

        let snapshot = &analysis.snapshot;
        debug!(
            %agent,
            danger = snapshot.danger_level(),
            health = snapshot.health_level(),
            behaviors = snapshot.available_behaviors().len(),
            actions = snapshot.available_actions().len(),
            "Situation analyzed"
        );
        Ok(analysis)
    }

    /// Like [`try_analyze`](Self::try_analyze), but a world failure is
    /// logged and counted as an analysis fault.
    pub fn analyze(&self, agent: AgentId) -> Result<Analysis, AnalysisError> {
        self.try_analyze(agent).inspect_err(|e| {
            self.analysis_faults.fetch_add(1, Ordering::Relaxed);
            warn!(%agent, error = %e, "Situation analysis failed");
        })
    }

    /// Analyze an agent's situation, reporting world failures.
    pub fn try_analyze_situation(
        &self,
        agent: AgentId,
    ) -> Result<Arc<SituationSnapshot>, AnalysisError> {
        self.try_analyze(agent).map(|analysis| analysis.snapshot)
    }

    /// Analyze an agent's situation, falling back to a conservative
    /// snapshot when the world cannot be queried.
    pub fn analyze_situation(&self, agent: AgentId) -> Arc<SituationSnapshot> {
        self.analyze(agent).map_or_else(
            |_| Arc::new(SituationSnapshot::new(self.clock.now())),
            |analysis| analysis.snapshot,
        )
    }

    /// Synthesize a decision from a snapshot. No snapshot, no decision.
    ///
    /// The decision names the highest-priority viable behavior (earliest
    /// declared on ties), that behavior's action template, the snapshot's
    /// recommended priority, and a confidence proportional to the number
    /// of viable options. A snapshot without viable behaviors yields a
    /// decision without a behavior, which is not valid.
    pub fn make_decision(
        &self,
        agent: AgentId,
        snapshot: Option<&SituationSnapshot>,
    ) -> Option<Decision> {
        let snapshot = snapshot?;
        let mut decision = Decision::new(self.clock.now());

        if let Some((behavior, _)) = highest_priority(snapshot.available_behaviors()) {
            decision.set_behavior(behavior);
            decision.set_actions(behavior.action_template().to_vec());
        }
        decision.set_priority(snapshot.recommended_priority());

        let options = snapshot
            .available_behaviors()
            .len()
            .saturating_add(snapshot.available_actions().len());
        let options = u32::try_from(options).map_or(f64::from(u32::MAX), f64::from);
        decision.set_confidence((options / CONFIDENCE_SATURATION).clamp(MIN_CONFIDENCE, 1.0));

        self.decisions.fetch_add(1, Ordering::Relaxed);
        debug!(
            %agent,
            behavior = ?decision.selected_behavior(),
            priority = decision.priority(),
            confidence = decision.confidence(),
            "Decision made"
        );
        Some(decision)
    }

    /// Priority of a behavior in the agent's current fresh snapshot, or
    /// zero if the behavior is not viable or no fresh snapshot exists.
    pub fn evaluate_behavior_priority(&self, agent: AgentId, behavior: BehaviorKind) -> f64 {
        self.fresh_snapshot(agent)
            .and_then(|s| s.available_behaviors().get(&behavior).copied())
            .unwrap_or(0.0)
    }

    /// Priority of an action in the agent's current fresh snapshot, or
    /// zero if the action is not viable or no fresh snapshot exists.
    pub fn evaluate_action_priority(&self, agent: AgentId, action: ActionKind) -> f64 {
        self.fresh_snapshot(agent)
            .and_then(|s| s.available_actions().get(&action).copied())
            .unwrap_or(0.0)
    }

    /// Whether an action is registered and its preconditions hold for the
    /// agent right now. World failures read as `false`.
    pub fn can_execute_action(&self, agent: AgentId, action: ActionKind) -> bool {
        let Some(body) = self.catalog.action(action) else {
            return false;
        };
        match self.world.context(agent) {
            Ok(context) => context.alive && body.can_execute(&context),
            Err(e) => {
                debug!(%agent, %action, error = %e, "Feasibility check failed");
                false
            }
        }
    }

    /// Forget the agent's cached snapshot so the next analysis re-queries
    /// the world.
    pub fn update_context(&self, agent: AgentId) {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots.remove(&agent);
    }

    /// Counters and cache size.
    pub fn statistics(&self) -> EngineStats {
        let cached_snapshots = self
            .snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        EngineStats {
            analyses: self.analyses.load(Ordering::Relaxed),
            snapshot_hits: self.snapshot_hits.load(Ordering::Relaxed),
            analysis_faults: self.analysis_faults.load(Ordering::Relaxed),
            decisions: self.decisions.load(Ordering::Relaxed),
            cached_snapshots,
        }
    }

    fn cached_analysis(&self, agent: AgentId) -> Option<Analysis> {
        let snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots.get(&agent).cloned()
    }

    fn fresh_snapshot(&self, agent: AgentId) -> Option<Arc<SituationSnapshot>> {
        let now = self.clock.now();
        self.cached_analysis(agent)
            .map(|analysis| analysis.snapshot)
            .filter(|s| s.is_fresh(now, self.snapshot_max_age))
    }

    fn build_snapshot(&self, context: &AgentContext) -> SituationSnapshot {
        let mut snapshot = SituationSnapshot::new(self.clock.now());
        let danger = context.surroundings.danger_level();
        let health = context.health_ratio();
        snapshot.set_danger_level(danger);
        snapshot.set_health_level(health);
        snapshot.set_mana_level(context.mana_ratio());
        snapshot.set_surroundings(context.surroundings);
        snapshot.set_recommended_priority((1.0 - health).mul_add(HEALTH_URGENCY_WEIGHT, danger));

        let tag = Some(snapshot.tag());
        if context.alive {
            for kind in self.catalog.behaviors() {
                let viable = self
                    .catalog
                    .behavior(kind)
                    .is_some_and(|body| body.can_execute(context));
                if viable {
                    snapshot.insert_behavior(kind, self.priorities.behavior_priority(kind, tag));
                }
            }
            for kind in self.catalog.actions() {
                let viable = self
                    .catalog
                    .action(kind)
                    .is_some_and(|body| body.can_execute(context));
                if viable {
                    let priority = self.priorities.evaluate_for(context.agent, kind, None, tag);
                    snapshot.insert_action(kind, priority);
                }
            }
        }
        snapshot
    }
}
