//! Decision and scheduling core for autonomous game bots.
//!
//! This crate turns world observations into situation snapshots, picks a
//! behavior, plans its actions, tracks each agent's coarse activity
//! state, and runs planned work through a cross-agent priority scheduler.
//!
//! # Modules
//!
//! - [`cache`] -- Short-lived decision cache keyed by agent, activity
//!   state, and time bucket.
//! - [`catalog`] -- [`Behavior`], [`Action`], and [`Catalog`] traits plus
//!   a map-backed [`StaticCatalog`].
//! - [`clock`] -- [`TimeSource`] trait with system and manual clocks.
//! - [`config`] -- Configuration loading from `botmind.yaml` into
//!   strongly-typed structs.
//! - [`decision`] -- Situation analysis and decision synthesis.
//! - [`orchestrator`] -- [`DecisionCore`]: per-agent lifecycle and the
//!   decision pipeline.
//! - [`planner`] -- Behavior to action-sequence planning and cost estimates.
//! - [`priority`] -- Priority tables and the hot-replaceable
//!   [`PriorityModel`].
//! - [`runner`] -- [`DecisionDriver`]: the async tick loop.
//! - [`sandbox`] -- In-memory world and standard catalog.
//! - [`scheduler`] -- [`TaskScheduler`]: global priority queue of agent
//!   tasks.
//! - [`selector`] -- Behavior selection with fallbacks.
//! - [`state_machine`] -- Activity state transitions and history.
//! - [`world`] -- [`WorldAdapter`] trait and collaborator errors.
//!
//! [`Behavior`]: catalog::Behavior
//! [`Action`]: catalog::Action
//! [`Catalog`]: catalog::Catalog
//! [`StaticCatalog`]: catalog::StaticCatalog
//! [`TimeSource`]: clock::TimeSource
//! [`DecisionCore`]: orchestrator::DecisionCore
//! [`PriorityModel`]: priority::PriorityModel
//! [`DecisionDriver`]: runner::DecisionDriver
//! [`TaskScheduler`]: scheduler::TaskScheduler
//! [`WorldAdapter`]: world::WorldAdapter

pub mod cache;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod decision;
pub mod orchestrator;
pub mod planner;
pub mod priority;
pub mod runner;
pub mod sandbox;
pub mod scheduler;
pub mod selector;
pub mod state_machine;
pub mod world;
