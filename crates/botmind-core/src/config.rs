//! Configuration loading and typed config structures.
//!
//! The canonical configuration lives in `botmind.yaml`. This module
//! defines strongly-typed structs that mirror the YAML structure and a
//! loader that reads the file. Every field has a default, so an empty
//! document (or a missing file, at the binary's discretion) yields a
//! working configuration.

use std::collections::BTreeMap;
use std::path::Path;

use botmind_types::{ActionKind, BehaviorKind, SituationTag};
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BotmindConfig {
    /// Situation analysis and decision caching.
    #[serde(default)]
    pub decision: DecisionConfig,

    /// Activity state machine.
    #[serde(default)]
    pub state_machine: StateMachineConfig,

    /// Task scheduler.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Tick driver.
    #[serde(default)]
    pub driver: DriverConfig,

    /// Priority table overrides.
    #[serde(default)]
    pub priorities: PriorityConfig,

    /// In-memory sandbox world used by the engine binary.
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BotmindConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `BOTMIND_LOG_LEVEL` overrides `logging.level`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to an empty mapping.
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.logging.apply_env_overrides();
        Ok(config)
    }
}

/// Situation analysis and decision cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DecisionConfig {
    /// Maximum age of a cached situation snapshot, in milliseconds.
    #[serde(default = "default_snapshot_max_age_ms")]
    pub snapshot_max_age_ms: u64,

    /// Whether decisions are cached per agent, activity state, and time bucket.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Lifetime of a cached decision, in milliseconds.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Maximum number of cached decisions.
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Width of the time bucket in the cache key, in milliseconds.
    #[serde(default = "default_cache_bucket_ms")]
    pub cache_bucket_ms: u64,

    /// Behavior used when no candidate is selectable.
    #[serde(default = "default_behavior")]
    pub default_behavior: BehaviorKind,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            snapshot_max_age_ms: default_snapshot_max_age_ms(),
            cache_enabled: true,
            cache_ttl_ms: default_cache_ttl_ms(),
            cache_max_entries: default_cache_max_entries(),
            cache_bucket_ms: default_cache_bucket_ms(),
            default_behavior: default_behavior(),
        }
    }
}

/// Activity state machine settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StateMachineConfig {
    /// Transitions retained per agent; the oldest is evicted first.
    #[serde(default = "default_state_history_limit")]
    pub history_limit: usize,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            history_limit: default_state_history_limit(),
        }
    }
}

/// Task scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Finished-task records retained; the oldest is evicted first.
    #[serde(default = "default_scheduler_history_limit")]
    pub history_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            history_limit: default_scheduler_history_limit(),
        }
    }
}

/// Tick driver settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DriverConfig {
    /// Real-time milliseconds between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Stop after this many ticks (0 = unlimited).
    #[serde(default)]
    pub max_ticks: u64,

    /// Agents processed concurrently within one tick.
    #[serde(default = "default_max_concurrent_agents")]
    pub max_concurrent_agents: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_ticks: 0,
            max_concurrent_agents: default_max_concurrent_agents(),
        }
    }
}

/// Overrides applied on top of the built-in priority tables.
///
/// Priorities are clamped into `[0, 1]` and modifiers into `[0.1, 2.0]`
/// when applied.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PriorityConfig {
    /// Base priority per action kind.
    #[serde(default)]
    pub action_base: BTreeMap<ActionKind, f64>,

    /// Base priority per behavior kind.
    #[serde(default)]
    pub behavior_base: BTreeMap<BehaviorKind, f64>,

    /// Multipliers applied to an action while running a behavior.
    #[serde(default)]
    pub behavior_action: BTreeMap<BehaviorKind, BTreeMap<ActionKind, f64>>,

    /// Multipliers applied to an action in a situation.
    #[serde(default)]
    pub situation_action: BTreeMap<SituationTag, BTreeMap<ActionKind, f64>>,

    /// Multipliers applied to a behavior in a situation.
    #[serde(default)]
    pub situation_behavior: BTreeMap<SituationTag, BTreeMap<BehaviorKind, f64>>,
}

impl PriorityConfig {
    /// Whether no override is configured.
    pub fn is_empty(&self) -> bool {
        self.action_base.is_empty()
            && self.behavior_base.is_empty()
            && self.behavior_action.is_empty()
            && self.situation_action.is_empty()
            && self.situation_behavior.is_empty()
    }
}

/// Sandbox world settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SandboxConfig {
    /// Number of agents to spawn.
    #[serde(default = "default_sandbox_agents")]
    pub agents: u32,

    /// Random seed for reproducible runs.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            agents: default_sandbox_agents(),
            seed: default_seed(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) used when `RUST_LOG`
    /// is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl LoggingConfig {
    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("BOTMIND_LOG_LEVEL") {
            self.level = val;
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_snapshot_max_age_ms() -> u64 {
    5000
}

const fn default_cache_ttl_ms() -> u64 {
    30_000
}

const fn default_cache_max_entries() -> usize {
    1000
}

const fn default_cache_bucket_ms() -> u64 {
    1000
}

const fn default_behavior() -> BehaviorKind {
    BehaviorKind::Idle
}

const fn default_state_history_limit() -> usize {
    100
}

const fn default_scheduler_history_limit() -> usize {
    256
}

const fn default_tick_interval_ms() -> u64 {
    1000
}

const fn default_max_concurrent_agents() -> usize {
    32
}

const fn default_sandbox_agents() -> u32 {
    8
}

const fn default_seed() -> u64 {
    42
}

fn default_log_level() -> String {
    String::from("info")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = BotmindConfig::default();
        assert_eq!(config.decision.snapshot_max_age_ms, 5000);
        assert_eq!(config.decision.cache_ttl_ms, 30_000);
        assert_eq!(config.decision.cache_max_entries, 1000);
        assert_eq!(config.decision.cache_bucket_ms, 1000);
        assert_eq!(config.decision.default_behavior, BehaviorKind::Idle);
        assert!(config.decision.cache_enabled);
        assert_eq!(config.state_machine.history_limit, 100);
        assert_eq!(config.driver.max_ticks, 0);
        assert!(config.priorities.is_empty());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
decision:
  snapshot_max_age_ms: 2500
  cache_enabled: false
  cache_ttl_ms: 10000
  cache_max_entries: 50
  cache_bucket_ms: 500
  default_behavior: resting

state_machine:
  history_limit: 10

scheduler:
  history_limit: 64

driver:
  tick_interval_ms: 250
  max_ticks: 20
  max_concurrent_agents: 4

priorities:
  action_base:
    attack: 0.95
  behavior_base:
    farming: 0.9
  behavior_action:
    farming:
      pickup: 1.5
  situation_action:
    danger:
      escape: 1.8
  situation_behavior:
    low_health:
      resting: 2.0

sandbox:
  agents: 3
  seed: 7
";
        let config = BotmindConfig::parse(yaml);
        assert!(config.is_ok(), "parse failed: {config:?}");
        let Ok(config) = config else { return };

        assert_eq!(config.decision.snapshot_max_age_ms, 2500);
        assert!(!config.decision.cache_enabled);
        assert_eq!(config.decision.default_behavior, BehaviorKind::Resting);
        assert_eq!(config.state_machine.history_limit, 10);
        assert_eq!(config.scheduler.history_limit, 64);
        assert_eq!(config.driver.max_ticks, 20);
        assert_eq!(config.driver.max_concurrent_agents, 4);
        assert_eq!(
            config.priorities.action_base.get(&ActionKind::Attack).copied(),
            Some(0.95)
        );
        assert!(
            config
                .priorities
                .situation_behavior
                .get(&SituationTag::LowHealth)
                .is_some_and(|m| m.contains_key(&BehaviorKind::Resting))
        );
        assert_eq!(config.sandbox.agents, 3);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "driver:\n  max_ticks: 5\n";
        let config = BotmindConfig::parse(yaml).unwrap_or_default();
        assert_eq!(config.driver.max_ticks, 5);
        assert_eq!(config.driver.tick_interval_ms, 1000);
        assert_eq!(config.decision.snapshot_max_age_ms, 5000);
    }

    #[test]
    fn empty_document_is_default() {
        let config = BotmindConfig::parse("  \n").unwrap_or_default();
        assert_eq!(config.decision, DecisionConfig::default());
    }

    #[test]
    fn unknown_behavior_is_rejected() {
        let yaml = "decision:\n  default_behavior: dancing\n";
        assert!(matches!(
            BotmindConfig::parse(yaml),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = BotmindConfig::from_file(Path::new("/nonexistent/botmind.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
