//! Tick driver: batch decision processing plus plan execution.
//!
//! Each tick of the [`DecisionDriver`]:
//!
//! 1. Runs the decision pipeline for every active agent, concurrently on
//!    the blocking pool, at most `max_concurrent_agents` at a time.
//! 2. Queues one [`PlanExecution`] task per successful decision, at the
//!    decision's priority.
//! 3. Runs one scheduler cycle, which executes those plans through the
//!    catalog and moves agents through the activity states of their
//!    actions.
//!
//! [`DecisionDriver::run`] repeats ticks until the tick limit is reached
//! or a stop is requested, sleeping `tick_interval_ms` between ticks.
//!
//! A worker that dies while deciding for one agent counts as a failure
//! for that agent only; the rest of the batch is unaffected.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use botmind_types::{ActionKind, AgentId};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::DriverConfig;
use crate::orchestrator::{CoreError, DecisionCore, DecisionOutcome};
use crate::scheduler::{Task, TaskError, TaskScheduler};
use crate::state_machine::StateMachine;

/// Errors that can occur while driving ticks.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// A blocking worker panicked or was cancelled.
    #[error("worker join failed: {source}")]
    Join {
        /// The underlying join error.
        #[from]
        source: tokio::task::JoinError,
    },
}

/// Summary of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Active agents processed.
    pub agents: usize,
    /// Agents whose pipeline produced a plan.
    pub decisions: usize,
    /// Of those, plans served from the decision cache.
    pub cached: usize,
    /// Agents whose pipeline produced nothing, including lost workers.
    pub failures: usize,
    /// Plan executions queued.
    pub tasks_scheduled: usize,
    /// Tasks executed by the scheduler cycle.
    pub tasks_executed: usize,
    /// Wall-clock duration of the tick, in milliseconds.
    pub elapsed_ms: u64,
}

/// Why a driver run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverEndReason {
    /// The configured tick limit was reached.
    MaxTicksReached,
    /// A stop was requested.
    StopRequested,
}

/// Result of a driver run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverResult {
    /// Why the run ended.
    pub end_reason: DriverEndReason,
    /// The last tick report, if any tick ran.
    pub final_report: Option<TickReport>,
    /// Ticks executed during this run.
    pub total_ticks: u64,
}

/// Callback invoked after each tick completes.
pub trait TickCallback: Send {
    /// Called after a tick completes successfully.
    fn on_tick(&mut self, report: &TickReport);
}

/// A no-op tick callback.
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _report: &TickReport) {}
}

impl<F> TickCallback for F
where
    F: FnMut(&TickReport) + Send,
{
    fn on_tick(&mut self, report: &TickReport) {
        self(report);
    }
}

/// Executes a planned action sequence through the catalog.
///
/// Each executed action moves the agent into that action's activity
/// state. Execution stops at the first action that reports failure.
pub struct PlanExecution {
    catalog: Arc<dyn Catalog>,
    states: Arc<StateMachine>,
    actions: Vec<ActionKind>,
}

impl PlanExecution {
    /// Create an execution of `actions`.
    pub const fn new(
        catalog: Arc<dyn Catalog>,
        states: Arc<StateMachine>,
        actions: Vec<ActionKind>,
    ) -> Self {
        Self {
            catalog,
            states,
            actions,
        }
    }
}

impl Task for PlanExecution {
    fn run(&self, agent: AgentId) -> Result<bool, TaskError> {
        for &kind in &self.actions {
            let body = self.catalog.action(kind).ok_or_else(|| TaskError::Failed {
                message: format!("action {kind} is not registered"),
            })?;
            if !body.execute(agent)? {
                debug!(%agent, action = %kind, "Action reported failure");
                return Ok(false);
            }
            self.states.update_state_from_action(agent, kind);
        }
        Ok(true)
    }
}

/// Drives the decision core and scheduler tick by tick.
pub struct DecisionDriver {
    core: Arc<DecisionCore>,
    scheduler: Arc<TaskScheduler>,
    catalog: Arc<dyn Catalog>,
    config: DriverConfig,
    stop: Arc<AtomicBool>,
    ticks: AtomicU64,
}

impl core::fmt::Debug for DecisionDriver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DecisionDriver")
            .field("config", &self.config)
            .field("ticks", &self.ticks.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl DecisionDriver {
    /// Create a driver.
    pub fn new(
        core: Arc<DecisionCore>,
        scheduler: Arc<TaskScheduler>,
        catalog: Arc<dyn Catalog>,
        config: DriverConfig,
    ) -> Self {
        Self {
            core,
            scheduler,
            catalog,
            config,
            stop: Arc::new(AtomicBool::new(false)),
            ticks: AtomicU64::new(0),
        }
    }

    /// Shared flag that stops [`run`](Self::run) before its next tick.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Ask [`run`](Self::run) to stop before its next tick.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Ticks executed since construction.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Execute one tick.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Join`] if the scheduler cycle's worker is
    /// lost.
    pub async fn run_tick(&self) -> Result<TickReport, DriverError> {
        let started = Instant::now();
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        let agents = self.core.active_agents();

        let (mut outcomes, lost) = self.process_agents(&agents).await;
        outcomes.sort_by_key(|(agent, _)| *agent);

        let mut report = TickReport {
            tick,
            agents: agents.len(),
            decisions: 0,
            cached: 0,
            failures: lost,
            tasks_scheduled: 0,
            tasks_executed: 0,
            elapsed_ms: 0,
        };

        for (agent, outcome) in outcomes {
            match outcome {
                Ok(outcome) => {
                    report.decisions = report.decisions.saturating_add(1);
                    if outcome.cached {
                        report.cached = report.cached.saturating_add(1);
                    }
                    if self.schedule_plan(agent, outcome) {
                        report.tasks_scheduled = report.tasks_scheduled.saturating_add(1);
                    }
                }
                Err(e) => {
                    report.failures = report.failures.saturating_add(1);
                    debug!(%agent, error = %e, "Agent produced no plan this tick");
                }
            }
        }

        let scheduler = Arc::clone(&self.scheduler);
        report.tasks_executed = tokio::task::spawn_blocking(move || scheduler.process_cycle()).await?;
        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        debug!(
            tick,
            agents = report.agents,
            decisions = report.decisions,
            cached = report.cached,
            failures = report.failures,
            tasks_executed = report.tasks_executed,
            elapsed_ms = report.elapsed_ms,
            "Tick complete"
        );
        Ok(report)
    }

    /// Run ticks until the tick limit is reached or a stop is requested.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] if a tick fails unrecoverably.
    pub async fn run(&self, callback: &mut dyn TickCallback) -> Result<DriverResult, DriverError> {
        let mut final_report: Option<TickReport> = None;
        let mut total_ticks: u64 = 0;

        info!(
            max_ticks = self.config.max_ticks,
            tick_interval_ms = self.config.tick_interval_ms,
            max_concurrent_agents = self.config.max_concurrent_agents,
            "Decision driver starting"
        );

        loop {
            if self.stop.load(Ordering::Acquire) {
                info!("Driver stop requested");
                return Ok(DriverResult {
                    end_reason: DriverEndReason::StopRequested,
                    final_report,
                    total_ticks,
                });
            }

            let report = self.run_tick().await?;
            total_ticks = total_ticks.saturating_add(1);
            callback.on_tick(&report);
            final_report = Some(report);

            if self.config.max_ticks > 0 && total_ticks >= self.config.max_ticks {
                info!(total_ticks, max_ticks = self.config.max_ticks, "Tick limit reached");
                return Ok(DriverResult {
                    end_reason: DriverEndReason::MaxTicksReached,
                    final_report,
                    total_ticks,
                });
            }

            if self.config.tick_interval_ms > 0 {
                tokio::time::sleep(tokio::time::Duration::from_millis(self.config.tick_interval_ms))
                    .await;
            }
        }
    }

    /// Stop managing an agent: shut it down in the core and drop its
    /// queued tasks and counters from the scheduler. Returns whether the
    /// core knew the agent.
    pub fn retire_agent(&self, agent: AgentId) -> bool {
        let known = self.core.shutdown(agent);
        let cancelled = self.scheduler.forget_agent(agent);
        if known {
            info!(%agent, cancelled_tasks = cancelled, "Agent retired");
        }
        known
    }

    /// Decide for every agent. Returns the outcomes and the number of
    /// workers that were lost before reporting.
    async fn process_agents(
        &self,
        agents: &[AgentId],
    ) -> (Vec<(AgentId, Result<DecisionOutcome, CoreError>)>, usize) {
        let mut outcomes = Vec::with_capacity(agents.len());
        let mut lost = 0_usize;
        for chunk in agents.chunks(self.config.max_concurrent_agents.max(1)) {
            let mut workers = JoinSet::new();
            for &agent in chunk {
                let core = Arc::clone(&self.core);
                workers.spawn_blocking(move || (agent, core.try_process_decision(agent)));
            }
            while let Some(joined) = workers.join_next().await {
                match joined {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => {
                        lost = lost.saturating_add(1);
                        warn!(error = %e, "Decision worker lost");
                    }
                }
            }
        }
        (outcomes, lost)
    }

    fn schedule_plan(&self, agent: AgentId, outcome: DecisionOutcome) -> bool {
        let execution = PlanExecution::new(
            Arc::clone(&self.catalog),
            Arc::clone(self.core.state_machine()),
            outcome.actions,
        );
        match self
            .scheduler
            .add_task(agent, execution, outcome.decision.priority())
        {
            Ok(_) => true,
            Err(e) => {
                warn!(%agent, error = %e, "Plan execution not scheduled");
                false
            }
        }
    }
}

/// Log the end of a driver run.
pub fn log_run_end(result: &DriverResult) {
    info!(
        reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        final_tick = result.final_report.as_ref().map(|r| r.tick),
        "Decision driver finished"
    );
    if let Some(ref report) = result.final_report {
        info!(
            tick = report.tick,
            agents = report.agents,
            decisions = report.decisions,
            failures = report.failures,
            tasks_executed = report.tasks_executed,
            "Final tick report"
        );
    } else {
        warn!("Decision driver ended with no ticks executed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use botmind_types::{ActivityState, Position, Surroundings, Vitals};

    use super::*;
    use crate::clock::{ManualClock, TimeSource};
    use crate::config::BotmindConfig;
    use crate::orchestrator::CoreParts;
    use crate::priority::PriorityModel;
    use crate::sandbox::{SandboxWorld, standard_catalog};
    use crate::world::WorldAdapter;

    struct Fixture {
        world: Arc<SandboxWorld>,
        core: Arc<DecisionCore>,
        scheduler: Arc<TaskScheduler>,
        driver: DecisionDriver,
    }

    fn fixture(driver_config: DriverConfig) -> Fixture {
        let clock: Arc<dyn TimeSource> = Arc::new(ManualClock::at_epoch());
        let world = Arc::new(SandboxWorld::new(3));
        let catalog: Arc<dyn Catalog> = Arc::new(standard_catalog());
        let states = Arc::new(StateMachine::new(Arc::clone(&clock), 100));
        let core = Arc::new(DecisionCore::new(
            CoreParts {
                world: Arc::clone(&world) as Arc<dyn WorldAdapter>,
                catalog: Arc::clone(&catalog),
                clock: Arc::clone(&clock),
                priorities: Arc::new(PriorityModel::default()),
                states: Arc::clone(&states),
            },
            &BotmindConfig::default(),
        ));
        let scheduler = Arc::new(TaskScheduler::new(states, clock, 64));
        let driver = DecisionDriver::new(
            Arc::clone(&core),
            Arc::clone(&scheduler),
            catalog,
            driver_config,
        );
        Fixture {
            world,
            core,
            scheduler,
            driver,
        }
    }

    const fn quick_config(max_ticks: u64) -> DriverConfig {
        DriverConfig {
            tick_interval_ms: 0,
            max_ticks,
            max_concurrent_agents: 2,
        }
    }

    fn spawn_safe(f: &Fixture, raw: u64) -> AgentId {
        let agent = AgentId::new(raw);
        f.world.spawn(
            agent,
            Vitals::full(100.0, 100.0),
            Position::default(),
            Surroundings::default(),
        );
        assert!(f.core.initialize(agent));
        agent
    }

    #[tokio::test]
    async fn tick_decides_and_executes_plans() {
        let f = fixture(quick_config(1));
        let agents: Vec<AgentId> = (1..=5).map(|raw| spawn_safe(&f, raw)).collect();

        let report = f.driver.run_tick().await.unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(report.agents, 5);
        assert_eq!(report.decisions, 5);
        assert_eq!(report.tasks_scheduled, 5);
        assert_eq!(report.tasks_executed, 5);
        assert_eq!(f.scheduler.statistics().completed, 5);

        // Safe, healthy agents with nobody around pick questing (0.6) and
        // end in the state of its last action.
        for agent in agents {
            assert_eq!(f.core.state_machine().state(agent), Some(ActivityState::Fighting));
        }
    }

    #[tokio::test]
    async fn inactive_agents_are_not_processed() {
        let f = fixture(quick_config(1));
        let active = spawn_safe(&f, 1);
        let paused = spawn_safe(&f, 2);
        assert!(f.core.set_active(paused, false));

        let report = f.driver.run_tick().await.unwrap();
        assert_eq!(report.agents, 1);
        assert_eq!(f.scheduler.agent_stats(active).map(|s| s.completed), Some(1));
        assert!(f.scheduler.agent_stats(paused).is_none());
    }

    #[tokio::test]
    async fn vanished_agents_count_as_failures() {
        let f = fixture(quick_config(1));
        spawn_safe(&f, 1);
        let gone = spawn_safe(&f, 2);
        assert!(f.world.despawn(gone));

        let report = f.driver.run_tick().await.unwrap();
        assert_eq!(report.decisions, 1);
        assert_eq!(report.failures, 1);
        assert_eq!(report.tasks_executed, 1);
    }

    /// Sandbox wrapper whose vitals query panics for one agent.
    struct CrashingWorld {
        inner: Arc<SandboxWorld>,
        broken: AgentId,
    }

    impl WorldAdapter for CrashingWorld {
        #[allow(clippy::panic)]
        fn vitals(&self, agent: AgentId) -> Result<Vitals, crate::world::CollaboratorError> {
            if agent == self.broken {
                panic!("adapter bug for one agent");
            }
            self.inner.vitals(agent)
        }

        fn is_alive(&self, agent: AgentId) -> Result<bool, crate::world::CollaboratorError> {
            self.inner.is_alive(agent)
        }

        fn is_in_combat(&self, agent: AgentId) -> Result<bool, crate::world::CollaboratorError> {
            self.inner.is_in_combat(agent)
        }

        fn position(&self, agent: AgentId) -> Result<Position, crate::world::CollaboratorError> {
            self.inner.position(agent)
        }

        fn surroundings(
            &self,
            agent: AgentId,
        ) -> Result<Surroundings, crate::world::CollaboratorError> {
            self.inner.surroundings(agent)
        }
    }

    #[tokio::test]
    async fn panicking_adapter_fails_only_its_agent() {
        let broken = AgentId::new(2);
        let clock: Arc<dyn TimeSource> = Arc::new(ManualClock::at_epoch());
        let sandbox = Arc::new(SandboxWorld::new(3));
        let catalog: Arc<dyn Catalog> = Arc::new(standard_catalog());
        let states = Arc::new(StateMachine::new(Arc::clone(&clock), 100));
        let core = Arc::new(DecisionCore::new(
            CoreParts {
                world: Arc::new(CrashingWorld {
                    inner: Arc::clone(&sandbox),
                    broken,
                }),
                catalog: Arc::clone(&catalog),
                clock: Arc::clone(&clock),
                priorities: Arc::new(PriorityModel::default()),
                states: Arc::clone(&states),
            },
            &BotmindConfig::default(),
        ));
        let scheduler = Arc::new(TaskScheduler::new(states, clock, 64));
        let driver = DecisionDriver::new(
            Arc::clone(&core),
            Arc::clone(&scheduler),
            catalog,
            quick_config(2),
        );
        for raw in 1..=4 {
            let agent = AgentId::new(raw);
            sandbox.spawn(
                agent,
                Vitals::full(100.0, 100.0),
                Position::default(),
                Surroundings::default(),
            );
            assert!(core.initialize(agent));
        }

        let report = driver.run_tick().await.unwrap();
        assert_eq!(report.agents, 4);
        assert_eq!(report.decisions, 3);
        assert_eq!(report.failures, 1);
        assert_eq!(report.tasks_executed, 3);
        assert_eq!(core.statistics().faults, 1);
        assert!(scheduler.agent_stats(broken).is_none());

        let result = driver.run(&mut NoOpCallback).await.unwrap();
        assert_eq!(result.end_reason, DriverEndReason::MaxTicksReached);
    }

    #[tokio::test]
    async fn retired_agents_leave_no_scheduler_state() {
        let f = fixture(quick_config(1));
        let agent = spawn_safe(&f, 1);
        f.driver.run_tick().await.unwrap();
        assert!(f.scheduler.agent_stats(agent).is_some());

        assert!(f.driver.retire_agent(agent));
        assert!(f.scheduler.agent_stats(agent).is_none());
        assert!(!f.core.is_active(agent));
        assert!(!f.driver.retire_agent(agent));
    }

    #[tokio::test]
    async fn run_stops_at_max_ticks() {
        let f = fixture(quick_config(3));
        spawn_safe(&f, 1);
        let mut seen = Vec::new();
        let mut callback = |report: &TickReport| seen.push(report.tick);

        let result = f.driver.run(&mut callback).await.unwrap();
        assert_eq!(result.end_reason, DriverEndReason::MaxTicksReached);
        assert_eq!(result.total_ticks, 3);
        assert_eq!(result.final_report.map(|r| r.tick), Some(3));
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn stop_request_ends_run_before_next_tick() {
        let f = fixture(quick_config(0));
        spawn_safe(&f, 1);
        let stop = f.driver.stop_handle();
        let mut callback = move |report: &TickReport| {
            if report.tick == 2 {
                stop.store(true, Ordering::Release);
            }
        };

        let result = f.driver.run(&mut callback).await.unwrap();
        assert_eq!(result.end_reason, DriverEndReason::StopRequested);
        assert_eq!(result.total_ticks, 2);
        assert_eq!(f.driver.ticks(), 2);
    }

    #[tokio::test]
    async fn stopped_scheduler_leaves_plans_unscheduled() {
        let f = fixture(quick_config(1));
        spawn_safe(&f, 1);
        f.scheduler.shutdown();

        let report = f.driver.run_tick().await.unwrap();
        assert_eq!(report.decisions, 1);
        assert_eq!(report.tasks_scheduled, 0);
        assert_eq!(report.tasks_executed, 0);
    }

    #[test]
    fn plan_execution_walks_action_states() {
        let clock: Arc<dyn TimeSource> = Arc::new(ManualClock::at_epoch());
        let states = Arc::new(StateMachine::new(clock, 100));
        let agent = AgentId::new(1);
        assert!(states.register(agent).is_ok());

        let execution = PlanExecution::new(
            Arc::new(standard_catalog()),
            Arc::clone(&states),
            vec![ActionKind::Move, ActionKind::Attack, ActionKind::Pickup],
        );
        assert_eq!(execution.run(agent), Ok(true));
        assert_eq!(states.state(agent), Some(ActivityState::Farming));
        let reasons: Vec<String> = states.history(agent).into_iter().map(|r| r.reason).collect();
        assert_eq!(reasons.last().map(String::as_str), Some("Action: pickup"));
    }

    #[test]
    fn plan_execution_rejects_unregistered_actions() {
        let clock: Arc<dyn TimeSource> = Arc::new(ManualClock::at_epoch());
        let states = Arc::new(StateMachine::new(clock, 100));
        let execution = PlanExecution::new(
            Arc::new(crate::catalog::StaticCatalog::new()),
            states,
            vec![ActionKind::Wait],
        );
        assert!(matches!(
            execution.run(AgentId::new(1)),
            Err(TaskError::Failed { .. })
        ));
    }
}
