#![forbid(unsafe_code)]

//! Decorator that runs the inverse of another command.

use std::sync::{Arc, OnceLock};

use crate::command::{Cancelable, Command};
use crate::invokeable::{Description, InvocationId, Invokeable};
use crate::state::{Lifecycle, State};

/// Runs `wrapped.inversed()` when invoked.
///
/// The inverse instance is created on invoke and becomes the *active*
/// command: once it exists, the decorator reports its state. Before invoke
/// the decorator tracks its own ready/forbidden state.
pub struct InverseCommand {
    wrapped: Arc<dyn Command>,
    active: OnceLock<Arc<dyn Command>>,
    id: InvocationId,
    lifecycle: Lifecycle,
}

impl InverseCommand {
    #[must_use]
    pub fn new(wrapped: Arc<dyn Command>) -> Self {
        Self {
            wrapped,
            active: OnceLock::new(),
            id: InvocationId::next(),
            lifecycle: Lifecycle::new(),
        }
    }

    /// The command whose effect is being reversed.
    #[must_use]
    pub fn wrapped(&self) -> &Arc<dyn Command> {
        &self.wrapped
    }
}

impl Invokeable for InverseCommand {
    fn invoke(&self) {
        if !self.lifecycle.start(self.type_name()) {
            return;
        }
        let active = self.active.get_or_init(|| self.wrapped.inversed());
        active.invoke();
    }

    fn state(&self) -> State {
        match self.active.get() {
            Some(active) => active.state(),
            None => self.lifecycle.get(),
        }
    }

    fn forbid(&self) -> bool {
        self.lifecycle.forbid()
    }

    fn describe(&self) -> Description {
        Description::new(self.type_name(), self.state())
            .with_id(Some(self.id))
            .member(self.wrapped.describe())
    }

    fn id(&self) -> Option<InvocationId> {
        Some(self.id)
    }

    fn is_mutating(&self) -> bool {
        self.wrapped.is_mutating()
    }

    fn type_name(&self) -> &'static str {
        "InverseCommand"
    }
}

impl Command for InverseCommand {
    /// The wrapped command's effect again, as a fresh instance.
    fn inversed(&self) -> Arc<dyn Command> {
        self.wrapped.inversed().inversed()
    }

    fn as_cancelable(&self) -> Option<&dyn Cancelable> {
        self.active.get().and_then(|active| active.as_cancelable())
    }

    fn cancel_pending(&self) -> bool {
        self.active
            .get()
            .is_some_and(|active| active.cancel_pending())
    }
}
