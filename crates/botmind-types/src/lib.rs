//! Shared type definitions for the botmind decision and scheduling core.
//!
//! # Modules
//!
//! - [`ids`] -- Numeric handles for agents and scheduled tasks
//! - [`enums`] -- Behavior, action, activity-state, and situation kinds
//! - [`structs`] -- Snapshots, decisions, vitals, and activity records

pub mod enums;
pub mod ids;
pub mod structs;

pub use enums::{ActionKind, ActivityState, BehaviorKind, SituationTag};
pub use ids::{AgentId, TaskId};
pub use structs::{
    ActivityInfo, AgentContext, Decision, Position, SituationSnapshot, Surroundings,
    TransitionRecord, Vitals, clamp_unit,
};
