//! Tick callback that evolves the sandbox and reports statistics.
//!
//! After each tick the sandbox world drifts (vitals wander, enemies and
//! allies come and go) so the next tick sees a new situation. Every
//! `report_every` ticks the decision core and scheduler statistics are
//! logged as JSON.

use std::sync::Arc;

use botmind_core::orchestrator::DecisionCore;
use botmind_core::runner::{TickCallback, TickReport};
use botmind_core::sandbox::SandboxWorld;
use botmind_core::scheduler::TaskScheduler;
use tracing::{info, warn};

/// Callback bridging the tick loop to the sandbox and the log.
pub struct ReportCallback {
    world: Arc<SandboxWorld>,
    core: Arc<DecisionCore>,
    scheduler: Arc<TaskScheduler>,
    report_every: u64,
}

impl ReportCallback {
    /// Create a callback reporting every `report_every` ticks (0 = never).
    pub const fn new(
        world: Arc<SandboxWorld>,
        core: Arc<DecisionCore>,
        scheduler: Arc<TaskScheduler>,
        report_every: u64,
    ) -> Self {
        Self {
            world,
            core,
            scheduler,
            report_every,
        }
    }

    fn report(&self, tick: u64) {
        let core = self.core.statistics();
        let scheduler = self.scheduler.statistics();
        match (serde_json::to_string(&core), serde_json::to_string(&scheduler)) {
            (Ok(core_json), Ok(scheduler_json)) => {
                info!(tick, core = %core_json, scheduler = %scheduler_json, "Statistics");
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(tick, error = %e, "Failed to serialize statistics");
            }
        }
    }
}

impl TickCallback for ReportCallback {
    fn on_tick(&mut self, report: &TickReport) {
        self.world.drift();
        info!(
            tick = report.tick,
            agents = report.agents,
            decisions = report.decisions,
            cached = report.cached,
            failures = report.failures,
            tasks_executed = report.tasks_executed,
            elapsed_ms = report.elapsed_ms,
            "Tick complete"
        );
        if report.tick.checked_rem(self.report_every) == Some(0) {
            self.report(report.tick);
        }
    }
}
