//! Sandbox engine binary for the botmind decision core.
//!
//! Wires the decision core, task scheduler, and tick driver to an
//! in-memory sandbox world so the whole pipeline can run without a game
//! server.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `botmind.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Build the sandbox world, catalog, priority model, and state machine
//! 4. Build the decision core and task scheduler
//! 5. Spawn and initialize sandbox agents
//! 6. Run the tick driver until the tick limit or Ctrl-C
//! 7. Shut agents down and log final statistics

mod error;
mod report_callback;
mod spawner;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use botmind_core::catalog::Catalog;
use botmind_core::clock::{SystemClock, TimeSource};
use botmind_core::config::BotmindConfig;
use botmind_core::orchestrator::{CoreParts, DecisionCore};
use botmind_core::priority::PriorityModel;
use botmind_core::runner::{self, DecisionDriver};
use botmind_core::sandbox::{SandboxWorld, standard_catalog};
use botmind_core::scheduler::TaskScheduler;
use botmind_core::state_machine::StateMachine;
use botmind_core::world::WorldAdapter;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::report_callback::ReportCallback;

/// Config file looked up relative to the working directory.
const CONFIG_PATH: &str = "botmind.yaml";

/// Ticks between statistics reports.
const REPORT_EVERY: u64 = 10;

/// Application entry point for the sandbox engine.
///
/// # Errors
///
/// Returns an error if configuration loading, the tick loop, or the
/// final report fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("botmind-engine starting");
    if !from_file {
        info!(path = CONFIG_PATH, "Config file not found, using defaults");
    }
    info!(
        agents = config.sandbox.agents,
        seed = config.sandbox.seed,
        tick_interval_ms = config.driver.tick_interval_ms,
        max_ticks = config.driver.max_ticks,
        cache_enabled = config.decision.cache_enabled,
        "Configuration loaded"
    );

    // 3. Collaborators.
    let clock: Arc<dyn TimeSource> = Arc::new(SystemClock);
    let world = Arc::new(SandboxWorld::new(config.sandbox.seed));
    let catalog: Arc<dyn Catalog> = Arc::new(standard_catalog());
    let priorities = Arc::new(PriorityModel::from_config(&config.priorities));
    if !config.priorities.is_empty() {
        info!("Priority overrides applied");
    }
    let states = Arc::new(StateMachine::new(
        Arc::clone(&clock),
        config.state_machine.history_limit,
    ));

    // 4. Core and scheduler.
    let core = Arc::new(DecisionCore::new(
        CoreParts {
            world: Arc::clone(&world) as Arc<dyn WorldAdapter>,
            catalog: Arc::clone(&catalog),
            clock: Arc::clone(&clock),
            priorities,
            states: Arc::clone(&states),
        },
        &config,
    ));
    let scheduler = Arc::new(TaskScheduler::new(
        states,
        clock,
        config.scheduler.history_limit,
    ));

    // 5. Agents.
    let agents = spawner::spawn_agents(&world, &core, config.sandbox.agents);

    // 6. Tick loop, stoppable with Ctrl-C.
    let driver = DecisionDriver::new(
        Arc::clone(&core),
        Arc::clone(&scheduler),
        catalog,
        config.driver.clone(),
    );
    let stop = driver.stop_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping after the current tick");
                stop.store(true, Ordering::Release);
            }
            Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C"),
        }
    });

    let mut callback = ReportCallback::new(
        Arc::clone(&world),
        Arc::clone(&core),
        Arc::clone(&scheduler),
        REPORT_EVERY,
    );
    let result = driver
        .run(&mut callback)
        .await
        .map_err(EngineError::from)?;
    runner::log_run_end(&result);

    // 7. Shutdown and final report.
    let statistics = core.statistics();
    let scheduler_stats = scheduler.statistics();
    info!(%statistics, "Decision core statistics");
    info!(
        statistics = %serde_json::to_string(&statistics).map_err(EngineError::from)?,
        scheduler = %serde_json::to_string(&scheduler_stats).map_err(EngineError::from)?,
        "Final statistics"
    );

    let stopped = agents
        .iter()
        .filter(|&&agent| driver.retire_agent(agent))
        .count();
    let cancelled = scheduler.shutdown();
    info!(
        agents = stopped,
        cancelled_tasks = cancelled,
        total_ticks = result.total_ticks,
        "botmind-engine shutdown complete"
    );

    Ok(())
}

/// Load configuration from `botmind.yaml` in the working directory.
///
/// Returns the configuration and whether it came from the file.
fn load_config() -> Result<(BotmindConfig, bool), EngineError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        Ok((BotmindConfig::from_file(config_path)?, true))
    } else {
        Ok((BotmindConfig::parse("")?, false))
    }
}
