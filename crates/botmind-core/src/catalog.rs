//! Behavior and action catalog.
//!
//! Concrete behavior and action bodies belong to the game integration.
//! The core only needs to look them up by kind, ask whether they can run
//! in a given [`AgentContext`], and (from scheduled work) execute them.
//!
//! [`StaticCatalog`] is a map-backed catalog; [`RuleBehavior`] and
//! [`RuleAction`] wrap a plain precondition function for integrations
//! whose bodies live elsewhere.

use std::collections::BTreeMap;
use std::sync::Arc;

use botmind_types::{ActionKind, AgentContext, AgentId, BehaviorKind};

use crate::world::CollaboratorError;

/// A high-level behavior body.
pub trait Behavior: Send + Sync {
    /// The kind this body implements.
    fn kind(&self) -> BehaviorKind;

    /// Whether the behavior's preconditions hold.
    fn can_execute(&self, context: &AgentContext) -> bool;

    /// Run the behavior for one step. Returns whether it made progress.
    fn execute(&self, agent: AgentId) -> Result<bool, CollaboratorError>;
}

/// A discrete action body.
pub trait Action: Send + Sync {
    /// The kind this body implements.
    fn kind(&self) -> ActionKind;

    /// Whether the action's preconditions hold.
    fn can_execute(&self, context: &AgentContext) -> bool;

    /// Perform the action. Returns whether it succeeded.
    fn execute(&self, agent: AgentId) -> Result<bool, CollaboratorError>;
}

/// Lookup of behavior and action bodies by kind.
pub trait Catalog: Send + Sync {
    /// The body for a behavior kind, if registered.
    fn behavior(&self, kind: BehaviorKind) -> Option<Arc<dyn Behavior>>;

    /// The body for an action kind, if registered.
    fn action(&self, kind: ActionKind) -> Option<Arc<dyn Action>>;

    /// Registered behavior kinds, in enumeration order.
    fn behaviors(&self) -> Vec<BehaviorKind>;

    /// Registered action kinds, in enumeration order.
    fn actions(&self) -> Vec<ActionKind>;
}

/// Precondition function shared by [`RuleBehavior`] and [`RuleAction`].
pub type Precondition = fn(&AgentContext) -> bool;

const fn always_true(_: &AgentContext) -> bool {
    true
}

/// A behavior whose precondition is a plain function and whose body
/// always reports progress.
#[derive(Debug, Clone, Copy)]
pub struct RuleBehavior {
    kind: BehaviorKind,
    rule: Precondition,
}

impl RuleBehavior {
    /// Create a behavior of `kind` gated by `rule`.
    pub const fn new(kind: BehaviorKind, rule: Precondition) -> Self {
        Self { kind, rule }
    }

    /// Create a behavior of `kind` that is always available.
    pub const fn always(kind: BehaviorKind) -> Self {
        Self::new(kind, always_true)
    }
}

impl Behavior for RuleBehavior {
    fn kind(&self) -> BehaviorKind {
        self.kind
    }

    fn can_execute(&self, context: &AgentContext) -> bool {
        (self.rule)(context)
    }

    fn execute(&self, _agent: AgentId) -> Result<bool, CollaboratorError> {
        Ok(true)
    }
}

/// An action whose precondition is a plain function and whose body
/// always succeeds.
#[derive(Debug, Clone, Copy)]
pub struct RuleAction {
    kind: ActionKind,
    rule: Precondition,
}

impl RuleAction {
    /// Create an action of `kind` gated by `rule`.
    pub const fn new(kind: ActionKind, rule: Precondition) -> Self {
        Self { kind, rule }
    }

    /// Create an action of `kind` that is always available.
    pub const fn always(kind: ActionKind) -> Self {
        Self::new(kind, always_true)
    }
}

impl Action for RuleAction {
    fn kind(&self) -> ActionKind {
        self.kind
    }

    fn can_execute(&self, context: &AgentContext) -> bool {
        (self.rule)(context)
    }

    fn execute(&self, _agent: AgentId) -> Result<bool, CollaboratorError> {
        Ok(true)
    }
}

/// A catalog backed by ordered maps.
///
/// Enumeration follows kind declaration order regardless of
/// registration order.
#[derive(Default, Clone)]
pub struct StaticCatalog {
    behaviors: BTreeMap<BehaviorKind, Arc<dyn Behavior>>,
    actions: BTreeMap<ActionKind, Arc<dyn Action>>,
}

impl StaticCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a behavior body under its own kind.
    #[must_use]
    pub fn with_behavior(mut self, behavior: Arc<dyn Behavior>) -> Self {
        self.behaviors.insert(behavior.kind(), behavior);
        self
    }

    /// Register (or replace) an action body under its own kind.
    #[must_use]
    pub fn with_action(mut self, action: Arc<dyn Action>) -> Self {
        self.actions.insert(action.kind(), action);
        self
    }

    /// Register always-available behaviors for each kind.
    #[must_use]
    pub fn with_open_behaviors(self, kinds: &[BehaviorKind]) -> Self {
        kinds.iter().fold(self, |catalog, &kind| {
            catalog.with_behavior(Arc::new(RuleBehavior::always(kind)))
        })
    }

    /// Register always-available actions for each kind.
    #[must_use]
    pub fn with_open_actions(self, kinds: &[ActionKind]) -> Self {
        kinds.iter().fold(self, |catalog, &kind| {
            catalog.with_action(Arc::new(RuleAction::always(kind)))
        })
    }
}

impl core::fmt::Debug for StaticCatalog {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StaticCatalog")
            .field("behaviors", &self.behaviors.keys().collect::<Vec<_>>())
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Catalog for StaticCatalog {
    fn behavior(&self, kind: BehaviorKind) -> Option<Arc<dyn Behavior>> {
        self.behaviors.get(&kind).cloned()
    }

    fn action(&self, kind: ActionKind) -> Option<Arc<dyn Action>> {
        self.actions.get(&kind).cloned()
    }

    fn behaviors(&self) -> Vec<BehaviorKind> {
        self.behaviors.keys().copied().collect()
    }

    fn actions(&self) -> Vec<ActionKind> {
        self.actions.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumeration_follows_declaration_order() {
        let catalog = StaticCatalog::new()
            .with_open_behaviors(&[BehaviorKind::Pvp, BehaviorKind::Idle, BehaviorKind::Farming])
            .with_open_actions(&[ActionKind::Wait, ActionKind::Move]);

        assert_eq!(
            catalog.behaviors(),
            vec![BehaviorKind::Idle, BehaviorKind::Farming, BehaviorKind::Pvp]
        );
        assert_eq!(catalog.actions(), vec![ActionKind::Move, ActionKind::Wait]);
    }

    #[test]
    fn lookup_misses_unregistered_kinds() {
        let catalog = StaticCatalog::new().with_open_actions(&[ActionKind::Move]);
        assert!(catalog.action(ActionKind::Move).is_some());
        assert!(catalog.action(ActionKind::Attack).is_none());
        assert!(catalog.behavior(BehaviorKind::Idle).is_none());
    }

    #[test]
    fn rule_behavior_uses_its_precondition() {
        let behavior = RuleBehavior::new(BehaviorKind::Farming, |ctx| {
            ctx.surroundings.nearby_enemies > 0
        });
        let mut context = AgentContext {
            agent: AgentId::new(1),
            vitals: botmind_types::Vitals::full(100.0, 100.0),
            alive: true,
            in_combat: false,
            position: botmind_types::Position::default(),
            surroundings: botmind_types::Surroundings::default(),
        };
        assert!(!behavior.can_execute(&context));
        context.surroundings.nearby_enemies = 2;
        assert!(behavior.can_execute(&context));
        assert_eq!(behavior.execute(context.agent), Ok(true));
    }
}
