#![forbid(unsafe_code)]

//! Routes invocations through a validator to a chain of handlers.
//!
//! # How it works
//!
//! 1. [`Dispatcher::invoke`] receives a ready [`Invocation`]
//! 2. Inside [`with_transaction`](Dispatcher::with_transaction), commands
//!    are buffered instead of dispatched; queries dispatch immediately
//! 3. The validator, if any, decides. A rejected item becomes `forbidden`
//!    and only the delegate's `did_forbid` hears about it
//! 4. An accepted item is handed to every enabled handler, in registration
//!    order, between `will_dispatch` and `did_dispatch`
//!
//! The dispatcher never fails: outcomes are visible through the item's
//! state and the delegate callbacks.
//!
//! Handlers are shared as `Rc`, so a dispatcher stays on the thread that
//! created it.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;

use crate::command::GroupCommand;
use crate::handler::{CommandStore, InvokeableHandler, Invoker};
use crate::invokeable::{Invocation, InvocationId};
use crate::metrics;
use crate::validator::Validator;

/// Observer of dispatch outcomes. Every method defaults to a no-op.
pub trait DispatcherDelegate {
    fn will_dispatch(&self, _invocation: &Invocation) {}

    fn did_dispatch(&self, _invocation: &Invocation) {}

    fn did_forbid(&self, _invocation: &Invocation) {}
}

/// Validates invocations and fans them out to handlers.
pub struct Dispatcher {
    handlers: Vec<Rc<dyn InvokeableHandler>>,
    validator: Option<Box<dyn Validator>>,
    delegate: Option<Rc<dyn DispatcherDelegate>>,
    is_dispatching: bool,
    is_in_transaction: bool,
    transaction_store: CommandStore,
}

impl Dispatcher {
    /// A dispatcher with a single [`Invoker`] and no validator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_handlers(vec![Rc::new(Invoker::new()) as Rc<dyn InvokeableHandler>])
    }

    #[must_use]
    pub fn with_handlers(handlers: Vec<Rc<dyn InvokeableHandler>>) -> Self {
        Self {
            handlers,
            validator: None,
            delegate: None,
            is_dispatching: false,
            is_in_transaction: false,
            transaction_store: CommandStore::new(),
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.set_validator(Some(Box::new(validator)));
        self
    }

    pub fn set_validator(&mut self, validator: Option<Box<dyn Validator>>) {
        self.validator = validator;
    }

    pub fn set_delegate(&mut self, delegate: Option<Rc<dyn DispatcherDelegate>>) {
        self.delegate = delegate;
    }

    /// Append a handler to the end of the chain.
    pub fn add_handler(&mut self, handler: Rc<dyn InvokeableHandler>) {
        self.handlers.push(handler);
    }

    #[must_use]
    pub fn handlers(&self) -> &[Rc<dyn InvokeableHandler>] {
        &self.handlers
    }

    /// Whether handlers are being notified right now.
    #[must_use]
    pub fn is_dispatching(&self) -> bool {
        self.is_dispatching
    }

    #[must_use]
    pub fn is_in_transaction(&self) -> bool {
        self.is_in_transaction
    }

    /// The validator's decision, without side effects.
    #[must_use]
    pub fn can_invoke(&self, invocation: &Invocation) -> bool {
        self.validator
            .as_ref()
            .is_none_or(|validator| validator.validate(invocation))
    }

    /// Dispatch a ready command or query.
    pub fn invoke(&mut self, item: impl Into<Invocation>) {
        let invocation = item.into();

        let state = invocation.state();
        if !state.is_ready() {
            tracing::warn!(
                target: "commander.dispatch",
                item = invocation.type_name(),
                %state,
                "dispatch of an item that is not ready; ignoring"
            );
            debug_assert!(
                false,
                "{} dispatched in state {state}; invokeables are single-use",
                invocation.type_name()
            );
            return;
        }

        if self.is_in_transaction {
            if let Invocation::Command(command) = &invocation {
                tracing::trace!(
                    target: "commander.dispatch",
                    item = command.type_name(),
                    buffered = self.transaction_store.len() + 1,
                    "buffered in transaction"
                );
                self.transaction_store.record(Arc::clone(command));
                return;
            }
        }

        self.dispatch(&invocation);
    }

    fn dispatch(&mut self, invocation: &Invocation) {
        let _span = tracing::debug_span!(
            "commander.dispatch",
            kind = invocation.kind(),
            item = invocation.type_name(),
            id = invocation.id().map(InvocationId::raw),
        )
        .entered();

        if !self.can_invoke(invocation) {
            invocation.forbid();
            metrics::record_forbidden();
            tracing::debug!(target: "commander.dispatch", "forbidden by validator");
            if let Some(delegate) = self.delegate.clone() {
                delegate.did_forbid(invocation);
            }
            return;
        }

        self.is_dispatching = true;
        let delegate = self.delegate.clone();
        if let Some(delegate) = &delegate {
            delegate.will_dispatch(invocation);
        }

        let handlers: Vec<Rc<dyn InvokeableHandler>> = self
            .handlers
            .iter()
            .filter(|handler| handler.is_enabled())
            .cloned()
            .collect();
        for handler in &handlers {
            handler.handle_invokeable(invocation);
        }
        metrics::record_dispatched();
        tracing::debug!(
            target: "commander.dispatch",
            handlers = handlers.len(),
            state = %invocation.state(),
            "dispatched"
        );

        if let Some(delegate) = &delegate {
            delegate.did_dispatch(invocation);
        }
        self.is_dispatching = false;
    }

    /// Collapse every command invoked during `work` into one group.
    ///
    /// The group is dispatched, and validated, once `work` returns. An empty
    /// transaction dispatches nothing. Transactions do not nest. If `work`
    /// panics, the buffered commands are dropped and the dispatcher leaves
    /// the transaction before the panic continues.
    pub fn with_transaction(&mut self, work: impl FnOnce(&mut Self)) {
        if self.is_in_transaction {
            tracing::warn!(target: "commander.dispatch", "nested transaction; ignoring");
            debug_assert!(false, "with_transaction called inside a transaction");
            return;
        }

        self.is_in_transaction = true;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(self)));
        self.is_in_transaction = false;
        if let Err(payload) = outcome {
            let discarded = self.transaction_store.take().len();
            tracing::warn!(
                target: "commander.dispatch",
                discarded,
                "transaction aborted by a panic; buffered commands dropped"
            );
            panic::resume_unwind(payload);
        }

        let commands = self.transaction_store.take();
        if commands.is_empty() {
            tracing::trace!(target: "commander.dispatch", "empty transaction");
            return;
        }
        tracing::debug!(
            target: "commander.dispatch",
            commands = commands.len(),
            "committing transaction"
        );
        self.invoke(Invocation::Command(Arc::new(GroupCommand::new(commands))));
    }

    /// Run `work` as a transaction with `handlers` disabled.
    ///
    /// Each handler's enabled flag is restored afterwards, also when `work`
    /// panics.
    pub fn with_disabled_handlers(
        &mut self,
        handlers: &[&dyn InvokeableHandler],
        work: impl FnOnce(&mut Self),
    ) {
        let _restore = EnabledSnapshot::disable(handlers);
        self.with_transaction(work);
    }

    /// Single-handler form of [`with_disabled_handlers`](Self::with_disabled_handlers).
    pub fn with_disabled_handler(
        &mut self,
        handler: &dyn InvokeableHandler,
        work: impl FnOnce(&mut Self),
    ) {
        self.with_disabled_handlers(&[handler], work);
    }

    /// Dispatch the commands recorded in `store`, then empty it.
    ///
    /// With `as_transaction`, the commands are dispatched as one group.
    pub fn apply_store(&mut self, store: &CommandStore, as_transaction: bool) {
        let commands = store.take();
        if as_transaction {
            if !commands.is_empty() {
                self.invoke(Invocation::Command(Arc::new(GroupCommand::new(commands))));
            }
        } else {
            for command in commands {
                self.invoke(Invocation::Command(command));
            }
        }
    }

    /// Record, without invoking, every command `work` dispatches.
    ///
    /// `work` runs against a throwaway dispatcher whose only handler is a
    /// store. Replay the result later with [`apply_store`](Self::apply_store).
    pub fn make_scratchpad(work: impl FnOnce(&mut Dispatcher)) -> CommandStore {
        let store = Rc::new(CommandStore::new());
        let mut scratch =
            Dispatcher::with_handlers(vec![Rc::clone(&store) as Rc<dyn InvokeableHandler>]);
        work(&mut scratch);
        CommandStore::from(store.take())
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.handlers.iter().map(|h| h.name()).collect();
        f.debug_struct("Dispatcher")
            .field("handlers", &names)
            .field("has_validator", &self.validator.is_some())
            .field("is_dispatching", &self.is_dispatching)
            .field("is_in_transaction", &self.is_in_transaction)
            .finish()
    }
}

/// Restores handler enabled flags on drop.
struct EnabledSnapshot<'a> {
    saved: Vec<(&'a dyn InvokeableHandler, bool)>,
}

impl<'a> EnabledSnapshot<'a> {
    fn disable(handlers: &[&'a dyn InvokeableHandler]) -> Self {
        let saved = handlers
            .iter()
            .map(|handler| (*handler, handler.is_enabled()))
            .collect();
        for handler in handlers {
            handler.set_enabled(false);
        }
        Self { saved }
    }
}

impl Drop for EnabledSnapshot<'_> {
    fn drop(&mut self) {
        for (handler, enabled) in self.saved.iter().rev() {
            handler.set_enabled(*enabled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{BlockCommand, Command};
    use crate::handler::InvokeableLogger;
    use crate::invokeable::Invokeable;
    use crate::log_sink::TextSink;
    use crate::query::BlockQuery;
    use crate::state::State;
    use crate::undo::UndoManager;
    use crate::validator::{EditMode, PermissionValidator};
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn adder(counter: &Arc<AtomicI64>, step: i64) -> Arc<BlockCommand> {
        let (up, down) = (Arc::clone(counter), Arc::clone(counter));
        Arc::new(BlockCommand::new(
            move || {
                up.fetch_add(step, Ordering::SeqCst);
            },
            move || {
                down.fetch_sub(step, Ordering::SeqCst);
            },
        ))
    }

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<String>>,
    }

    impl DispatcherDelegate for Recorder {
        fn will_dispatch(&self, invocation: &Invocation) {
            self.events.borrow_mut().push(format!("will {}", invocation.kind()));
        }

        fn did_dispatch(&self, invocation: &Invocation) {
            self.events.borrow_mut().push(format!("did {}", invocation.kind()));
        }

        fn did_forbid(&self, invocation: &Invocation) {
            self.events.borrow_mut().push(format!("forbid {}", invocation.kind()));
        }
    }

    /// Handler that remembers the order it saw items in.
    struct Tap {
        name: &'static str,
        seen: Rc<RefCell<Vec<&'static str>>>,
        enabled: std::cell::Cell<bool>,
    }

    impl InvokeableHandler for Tap {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_enabled(&self) -> bool {
            self.enabled.get()
        }

        fn set_enabled(&self, enabled: bool) {
            self.enabled.set(enabled);
        }

        fn handle_invokeable(&self, _invocation: &Invocation) {
            self.seen.borrow_mut().push(self.name);
        }
    }

    #[test]
    fn default_dispatcher_invokes() {
        let counter = Arc::new(AtomicI64::new(0));
        let mut dispatcher = Dispatcher::new();
        let command = adder(&counter, 3);
        dispatcher.invoke(Arc::clone(&command));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(command.state().is_finished());
        assert!(!dispatcher.is_dispatching());
    }

    #[test]
    fn handlers_run_in_registration_order_and_skip_disabled() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let tap = |name| {
            Rc::new(Tap {
                name,
                seen: Rc::clone(&seen),
                enabled: std::cell::Cell::new(true),
            })
        };
        let b = tap("b");
        b.set_enabled(false);
        let handlers: Vec<Rc<dyn InvokeableHandler>> = vec![
            tap("a") as Rc<dyn InvokeableHandler>,
            b as Rc<dyn InvokeableHandler>,
            tap("c") as Rc<dyn InvokeableHandler>,
        ];
        let mut dispatcher = Dispatcher::with_handlers(handlers);

        dispatcher.invoke(Arc::new(BlockCommand::new(|| {}, || {})));
        assert_eq!(*seen.borrow(), vec!["a", "c"]);
    }

    #[test]
    fn rejected_item_is_forbidden_and_reaches_no_handler() {
        let counter = Arc::new(AtomicI64::new(0));
        let undo = Rc::new(UndoManager::default());
        let recorder = Rc::new(Recorder::default());
        let mut dispatcher =
            Dispatcher::new().with_validator(PermissionValidator::new(EditMode::ReadOnly));
        dispatcher.add_handler(undo.clone());
        dispatcher.set_delegate(Some(recorder.clone()));

        let command = adder(&counter, 1);
        assert!(!dispatcher.can_invoke(&Invocation::from(Arc::clone(&command))));
        dispatcher.invoke(Arc::clone(&command));

        assert_eq!(command.state(), State::Forbidden);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(undo.undo_depth(), 0);
        assert_eq!(*recorder.events.borrow(), vec!["forbid command"]);
    }

    #[test]
    fn queries_pass_read_only_validation() {
        let recorder = Rc::new(Recorder::default());
        let mut dispatcher =
            Dispatcher::new().with_validator(PermissionValidator::new(EditMode::ReadOnly));
        dispatcher.set_delegate(Some(recorder.clone()));

        let query = Arc::new(BlockQuery::new(|| {}));
        dispatcher.invoke(Invocation::query(Arc::clone(&query)));
        assert!(query.state().is_finished());
        assert_eq!(*recorder.events.borrow(), vec!["will query", "did query"]);
    }

    #[test]
    fn transaction_produces_one_history_entry() {
        let counter = Arc::new(AtomicI64::new(0));
        let undo = Rc::new(UndoManager::default());
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_handler(undo.clone());

        dispatcher.with_transaction(|d| {
            assert!(d.is_in_transaction());
            d.invoke(adder(&counter, 1));
            d.invoke(adder(&counter, 2));
            d.invoke(adder(&counter, 3));
            assert_eq!(counter.load(Ordering::SeqCst), 0, "buffered, not run");
        });

        assert!(!dispatcher.is_in_transaction());
        assert_eq!(counter.load(Ordering::SeqCst), 6);
        assert_eq!(undo.undo_depth(), 1);
        undo.undo(1).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn queries_inside_transaction_run_immediately() {
        let ran = Arc::new(AtomicI64::new(0));
        let flag = Arc::clone(&ran);
        let mut dispatcher = Dispatcher::new();
        dispatcher.with_transaction(|d| {
            d.invoke(Invocation::query(Arc::new(BlockQuery::new(move || {
                flag.store(1, Ordering::SeqCst);
            }))));
            assert_eq!(ran.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn empty_transaction_dispatches_nothing() {
        let recorder = Rc::new(Recorder::default());
        let mut dispatcher = Dispatcher::new();
        dispatcher.set_delegate(Some(recorder.clone()));
        dispatcher.with_transaction(|_| {});
        assert!(recorder.events.borrow().is_empty());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "inside a transaction")]
    fn nested_transaction_asserts_in_debug() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.with_transaction(|d| d.with_transaction(|_| {}));
    }

    #[test]
    fn panicking_transaction_is_closed_and_discarded() {
        let counter = Arc::new(AtomicI64::new(0));
        let undo = Rc::new(UndoManager::default());
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_handler(undo.clone());

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            dispatcher.with_transaction(|d| {
                d.invoke(adder(&counter, 1));
                panic!("work failed");
            });
        }));
        assert!(result.is_err());
        assert!(!dispatcher.is_in_transaction());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(undo.undo_depth(), 0);

        dispatcher.invoke(adder(&counter, 2));
        assert_eq!(counter.load(Ordering::SeqCst), 2, "dispatched, not buffered");
        assert_eq!(undo.undo_depth(), 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "single-use")]
    fn dispatching_a_finished_item_asserts_in_debug() {
        let counter = Arc::new(AtomicI64::new(0));
        let mut dispatcher = Dispatcher::new();
        let command = adder(&counter, 1);
        dispatcher.invoke(Arc::clone(&command));
        dispatcher.invoke(command);
    }

    #[test]
    fn disabled_handlers_are_restored() {
        let counter = Arc::new(AtomicI64::new(0));
        let sink = TextSink::new();
        let logger = Rc::new(InvokeableLogger::with_sink(sink.clone()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_handler(logger.clone());

        dispatcher.with_disabled_handler(&*logger, |d| {
            d.invoke(adder(&counter, 4));
        });
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert!(sink.is_empty());
        assert!(logger.is_enabled());

        dispatcher.invoke(adder(&counter, 1));
        assert_eq!(sink.lines().len(), 1);
    }

    #[test]
    fn disabled_flag_snapshot_keeps_already_disabled_handlers_off() {
        let logger = Rc::new(InvokeableLogger::new());
        logger.set_enabled(false);
        let undo = Rc::new(UndoManager::default());
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_handler(logger.clone());
        dispatcher.add_handler(undo.clone());

        dispatcher.with_disabled_handlers(&[&*logger, &*undo], |d| {
            d.invoke(Arc::new(BlockCommand::new(|| {}, || {})));
        });
        assert!(!logger.is_enabled());
        assert!(undo.is_enabled());
        assert_eq!(undo.undo_depth(), 0);
    }

    #[test]
    fn scratchpad_records_without_invoking() {
        let counter = Arc::new(AtomicI64::new(0));
        let store = Dispatcher::make_scratchpad(|d| {
            d.invoke(adder(&counter, 10));
            d.invoke(adder(&counter, 10));
        });
        assert_eq!(store.len(), 2);
        assert!(store.commands().iter().all(|c| c.state().is_ready()));
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        let undo = Rc::new(UndoManager::default());
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_handler(undo.clone());
        dispatcher.apply_store(&store, false);
        assert!(store.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 20);
        assert_eq!(undo.undo_depth(), 2);
    }

    #[test]
    fn apply_store_as_transaction_is_one_entry() {
        let counter = Arc::new(AtomicI64::new(0));
        let store = CommandStore::new();
        store.record(adder(&counter, 1));
        store.record(adder(&counter, 1));

        let undo = Rc::new(UndoManager::default());
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_handler(undo.clone());
        dispatcher.apply_store(&store, true);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(undo.undo_depth(), 1);
        assert!(undo
            .next_undo_description()
            .is_some_and(|d| d.starts_with("<GroupCommand")));
    }

    #[test]
    fn rejected_transaction_forbids_every_member() {
        let counter = Arc::new(AtomicI64::new(0));
        let mut dispatcher =
            Dispatcher::new().with_validator(PermissionValidator::new(EditMode::ReadOnly));
        let (a, b) = (adder(&counter, 1), adder(&counter, 2));
        dispatcher.with_transaction(|d| {
            d.invoke(Arc::clone(&a));
            d.invoke(Arc::clone(&b));
        });
        assert_eq!(a.state(), State::Forbidden);
        assert_eq!(b.state(), State::Forbidden);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn closure_validator_sees_the_envelope() {
        let mut dispatcher = Dispatcher::new()
            .with_validator(|invocation: &Invocation| invocation.kind() == "query");
        let command: Arc<dyn Command> = Arc::new(BlockCommand::new(|| {}, || {}));
        dispatcher.invoke(Invocation::Command(Arc::clone(&command)));
        assert_eq!(command.state(), State::Forbidden);
    }
}
