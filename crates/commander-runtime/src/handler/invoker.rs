#![forbid(unsafe_code)]

use std::cell::Cell;

use crate::handler::InvokeableHandler;
use crate::invokeable::Invocation;

/// Executes every invocation it receives.
#[derive(Debug)]
pub struct Invoker {
    enabled: Cell<bool>,
}

impl Invoker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: Cell::new(true),
        }
    }
}

impl Default for Invoker {
    fn default() -> Self {
        Self::new()
    }
}

impl InvokeableHandler for Invoker {
    fn name(&self) -> &'static str {
        "invoker"
    }

    fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    fn handle_invokeable(&self, invocation: &Invocation) {
        invocation.invoke();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::BlockCommand;
    use crate::invokeable::Invokeable;
    use std::sync::Arc;

    #[test]
    fn invokes_the_item() {
        let invoker = Invoker::new();
        let command = Arc::new(BlockCommand::new(|| {}, || {}));
        invoker.handle_invokeable(&Invocation::from(Arc::clone(&command)));
        assert!(command.state().is_finished());
    }

    #[test]
    fn enabled_flag_toggles() {
        let invoker = Invoker::default();
        assert!(invoker.is_enabled());
        invoker.set_enabled(false);
        assert!(!invoker.is_enabled());
        assert_eq!(invoker.name(), "invoker");
    }
}
