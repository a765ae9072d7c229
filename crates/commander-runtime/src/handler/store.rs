#![forbid(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::Arc;

use crate::command::Command;
use crate::handler::InvokeableHandler;
use crate::invokeable::Invocation;

/// Records commands without executing them.
///
/// Used as the transaction buffer and as the scratchpad behind
/// [`Dispatcher::make_scratchpad`](crate::Dispatcher::make_scratchpad).
/// Queries are ignored.
pub struct CommandStore {
    commands: RefCell<Vec<Arc<dyn Command>>>,
    enabled: Cell<bool>,
}

impl CommandStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            commands: RefCell::new(Vec::new()),
            enabled: Cell::new(true),
        }
    }

    /// Append a command directly.
    pub fn record(&self, command: Arc<dyn Command>) {
        self.commands.borrow_mut().push(command);
    }

    /// The recorded commands, oldest first.
    #[must_use]
    pub fn commands(&self) -> Vec<Arc<dyn Command>> {
        self.commands.borrow().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.borrow().is_empty()
    }

    /// Forget every recorded command.
    pub fn reset(&self) {
        self.commands.borrow_mut().clear();
    }

    /// Remove and return every recorded command.
    pub fn take(&self) -> Vec<Arc<dyn Command>> {
        std::mem::take(&mut *self.commands.borrow_mut())
    }
}

impl Default for CommandStore {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Arc<dyn Command>>> for CommandStore {
    fn from(commands: Vec<Arc<dyn Command>>) -> Self {
        Self {
            commands: RefCell::new(commands),
            enabled: Cell::new(true),
        }
    }
}

impl InvokeableHandler for CommandStore {
    fn name(&self) -> &'static str {
        "store"
    }

    fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    fn handle_invokeable(&self, invocation: &Invocation) {
        if let Some(command) = invocation.as_command() {
            self.record(Arc::clone(command));
        }
    }
}

impl fmt::Debug for CommandStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandStore")
            .field("len", &self.len())
            .field("enabled", &self.enabled.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::BlockCommand;
    use crate::invokeable::Invokeable;
    use crate::query::BlockQuery;

    #[test]
    fn records_commands_without_invoking() {
        let store = CommandStore::new();
        let command = Arc::new(BlockCommand::new(|| {}, || {}));
        store.handle_invokeable(&Invocation::from(Arc::clone(&command)));

        assert_eq!(store.len(), 1);
        assert!(command.state().is_ready());
    }

    #[test]
    fn ignores_queries() {
        let store = CommandStore::new();
        store.handle_invokeable(&Invocation::query(Arc::new(BlockQuery::new(|| {}))));
        assert!(store.is_empty());
    }

    #[test]
    fn take_and_reset_empty_the_store() {
        let store = CommandStore::default();
        store.record(Arc::new(BlockCommand::new(|| {}, || {})));
        store.record(Arc::new(BlockCommand::new(|| {}, || {})));
        assert_eq!(store.commands().len(), 2);

        let taken = store.take();
        assert_eq!(taken.len(), 2);
        assert!(store.is_empty());

        store.record(Arc::new(BlockCommand::new(|| {}, || {})));
        store.reset();
        assert!(store.is_empty());
    }
}
