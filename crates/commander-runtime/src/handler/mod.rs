#![forbid(unsafe_code)]

//! Observers and executors notified of every accepted dispatch.
//!
//! Handlers run in registration order. A typical chain is
//! `[Invoker, UndoManager, InvokeableLogger]`: execute, record, log.
//! Handlers hold their mutable state behind `Cell`/`RefCell` and are shared
//! with the dispatcher as `Rc<dyn InvokeableHandler>`, which keeps the whole
//! chain on one thread.

mod invoker;
mod logger;
mod store;

pub use invoker::Invoker;
pub use logger::InvokeableLogger;
pub use store::CommandStore;

use crate::invokeable::Invocation;

/// A participant in the dispatch fan-out.
pub trait InvokeableHandler {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Disabled handlers are skipped by the dispatcher.
    fn is_enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);

    /// Observe or execute an accepted invocation. Must not panic.
    fn handle_invokeable(&self, invocation: &Invocation);
}
