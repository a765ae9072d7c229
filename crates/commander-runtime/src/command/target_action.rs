#![forbid(unsafe_code)]

//! Commands that apply named actions to a weakly referenced target.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::command::Command;
use crate::invokeable::{Description, InvocationId, Invokeable};
use crate::state::{Lifecycle, State};

/// A named mutation of a `T`.
pub struct Action<T> {
    name: &'static str,
    apply: fn(&mut T),
}

impl<T> Action<T> {
    #[must_use]
    pub const fn new(name: &'static str, apply: fn(&mut T)) -> Self {
        Self { name, apply }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    fn run(&self, target: &mut T) {
        (self.apply)(target);
    }
}

impl<T> Clone for Action<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Action<T> {}

impl<T> fmt::Debug for Action<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Action").field(&self.name).finish()
    }
}

/// Applies `action` to the target on invoke; the inverse applies
/// `inverse_action`.
///
/// The target is held weakly. If it has been dropped by the time the command
/// runs, the command still finishes, with no effect.
pub struct TargetActionCommand<T> {
    target: Weak<Mutex<T>>,
    action: Action<T>,
    inverse_action: Action<T>,
    mutating: bool,
    id: InvocationId,
    lifecycle: Lifecycle,
}

impl<T> TargetActionCommand<T> {
    pub fn new(target: &Arc<Mutex<T>>, action: Action<T>, inverse_action: Action<T>) -> Self {
        Self::from_weak(Arc::downgrade(target), action, inverse_action)
    }

    fn from_weak(target: Weak<Mutex<T>>, action: Action<T>, inverse_action: Action<T>) -> Self {
        Self {
            target,
            action,
            inverse_action,
            mutating: true,
            id: InvocationId::next(),
            lifecycle: Lifecycle::new(),
        }
    }

    #[must_use]
    pub fn with_mutating(mut self, mutating: bool) -> Self {
        self.mutating = mutating;
        self
    }

    /// Whether the target is still alive.
    #[must_use]
    pub fn has_target(&self) -> bool {
        self.target.strong_count() > 0
    }
}

impl<T: Send + 'static> Invokeable for TargetActionCommand<T> {
    fn invoke(&self) {
        if !self.lifecycle.start(self.type_name()) {
            return;
        }
        match self.target.upgrade() {
            Some(target) => {
                let mut guard = target.lock().unwrap_or_else(PoisonError::into_inner);
                self.action.run(&mut guard);
            }
            None => tracing::debug!(
                target: "commander.dispatch",
                action = self.action.name,
                "target dropped; finishing without effect"
            ),
        }
        self.lifecycle.finish();
    }

    fn state(&self) -> State {
        self.lifecycle.get()
    }

    fn forbid(&self) -> bool {
        self.lifecycle.forbid()
    }

    fn describe(&self) -> Description {
        Description::new(self.type_name(), self.state())
            .with_id(Some(self.id))
            .field("action", self.action.name)
            .field("inverse", self.inverse_action.name)
    }

    fn id(&self) -> Option<InvocationId> {
        Some(self.id)
    }

    fn is_mutating(&self) -> bool {
        self.mutating
    }

    fn type_name(&self) -> &'static str {
        "TargetActionCommand"
    }
}

impl<T: Send + 'static> Command for TargetActionCommand<T> {
    fn inversed(&self) -> Arc<dyn Command> {
        Arc::new(
            Self::from_weak(self.target.clone(), self.inverse_action, self.action)
                .with_mutating(self.mutating),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Switch {
        on: bool,
        flips: u32,
    }

    fn turn_on(s: &mut Switch) {
        s.on = true;
        s.flips += 1;
    }

    fn turn_off(s: &mut Switch) {
        s.on = false;
        s.flips += 1;
    }

    const TURN_ON: Action<Switch> = Action::new("turn_on", turn_on);
    const TURN_OFF: Action<Switch> = Action::new("turn_off", turn_off);

    #[test]
    fn applies_action_to_live_target() {
        let switch = Arc::new(Mutex::new(Switch::default()));
        let command = TargetActionCommand::new(&switch, TURN_ON, TURN_OFF);
        command.invoke();

        let guard = switch.lock().unwrap();
        assert!(guard.on);
        assert_eq!(guard.flips, 1);
        assert!(command.state().is_finished());
    }

    #[test]
    fn inverse_swaps_actions() {
        let switch = Arc::new(Mutex::new(Switch::default()));
        let command = TargetActionCommand::new(&switch, TURN_ON, TURN_OFF);
        command.invoke();
        let inverse = command.inversed();
        assert_eq!(inverse.describe().field_value("action"), Some("turn_off"));
        inverse.invoke();
        assert!(!switch.lock().unwrap().on);
    }

    #[test]
    fn dropped_target_finishes_without_effect() {
        let switch = Arc::new(Mutex::new(Switch::default()));
        let command = TargetActionCommand::new(&switch, TURN_ON, TURN_OFF);
        drop(switch);
        assert!(!command.has_target());

        command.invoke();
        assert!(command.state().is_finished());
    }

    #[test]
    fn mutating_is_configurable() {
        let switch = Arc::new(Mutex::new(Switch::default()));
        let command = TargetActionCommand::new(&switch, TURN_ON, TURN_OFF);
        assert!(command.is_mutating());
        let passive = TargetActionCommand::new(&switch, TURN_ON, TURN_OFF).with_mutating(false);
        assert!(!passive.is_mutating());
        assert!(!passive.inversed().is_mutating());
    }
}
