#![forbid(unsafe_code)]

//! Closure-backed command.

use std::fmt;
use std::sync::Arc;

use crate::command::Command;
use crate::invokeable::{Description, InvocationId, Invokeable};
use crate::state::{Lifecycle, State};

/// A shareable side effect.
pub type Effect = Arc<dyn Fn() + Send + Sync>;

/// A command built from a forward and a reverse closure.
///
/// Inverting swaps the closures, so `forward` and `reverse` must be exact
/// opposites for the round-trip guarantee to hold.
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicI64, Ordering};
/// use commander_runtime::{BlockCommand, Command, Invokeable};
///
/// let counter = Arc::new(AtomicI64::new(0));
/// let (up, down) = (Arc::clone(&counter), Arc::clone(&counter));
/// let increment = BlockCommand::new(
///     move || { up.fetch_add(1, Ordering::SeqCst); },
///     move || { down.fetch_sub(1, Ordering::SeqCst); },
/// );
///
/// increment.invoke();
/// increment.inversed().invoke();
/// assert_eq!(counter.load(Ordering::SeqCst), 0);
/// ```
pub struct BlockCommand {
    forward: Effect,
    reverse: Effect,
    label: Option<String>,
    mutating: bool,
    id: InvocationId,
    lifecycle: Lifecycle,
}

impl BlockCommand {
    pub fn new(
        forward: impl Fn() + Send + Sync + 'static,
        reverse: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self::from_effects(Arc::new(forward), Arc::new(reverse))
    }

    /// Build from already shared effects.
    #[must_use]
    pub fn from_effects(forward: Effect, reverse: Effect) -> Self {
        Self {
            forward,
            reverse,
            label: None,
            mutating: true,
            id: InvocationId::next(),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Label shown in descriptions.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Override the capability tag seen by permission validators.
    #[must_use]
    pub fn with_mutating(mut self, mutating: bool) -> Self {
        self.mutating = mutating;
        self
    }

    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl Invokeable for BlockCommand {
    fn invoke(&self) {
        if !self.lifecycle.start(self.type_name()) {
            return;
        }
        (self.forward)();
        self.lifecycle.finish();
    }

    fn state(&self) -> State {
        self.lifecycle.get()
    }

    fn forbid(&self) -> bool {
        self.lifecycle.forbid()
    }

    fn describe(&self) -> Description {
        let description = Description::new(self.type_name(), self.state()).with_id(Some(self.id));
        match &self.label {
            Some(label) => description.field("label", label),
            None => description,
        }
    }

    fn id(&self) -> Option<InvocationId> {
        Some(self.id)
    }

    fn is_mutating(&self) -> bool {
        self.mutating
    }

    fn type_name(&self) -> &'static str {
        "BlockCommand"
    }
}

impl Command for BlockCommand {
    fn inversed(&self) -> Arc<dyn Command> {
        let mut inverse = Self::from_effects(Arc::clone(&self.reverse), Arc::clone(&self.forward))
            .with_mutating(self.mutating);
        inverse.label = self.label.clone();
        Arc::new(inverse)
    }
}

impl fmt::Debug for BlockCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockCommand")
            .field("label", &self.label)
            .field("mutating", &self.mutating)
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
