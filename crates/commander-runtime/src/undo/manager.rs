#![forbid(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use super::HistoryError;
use crate::command::Command;
use crate::config::HistoryConfig;
use crate::handler::InvokeableHandler;
use crate::invokeable::{Invocation, Invokeable};

/// Notified after each step of a batch undo or redo.
pub trait UndoManagerDelegate {
    /// `inverse` has just been invoked to undo a command.
    fn did_undo(&self, _inverse: &Arc<dyn Command>) {}

    /// `command` has just been invoked to redo an undone command.
    fn did_redo(&self, _command: &Arc<dyn Command>) {}
}

/// Two ordered histories with batched undo and redo.
///
/// `done` holds applied commands, oldest first. `undone` holds the inverses
/// invoked by undo; its back is the next redo.
pub struct UndoManager {
    done: RefCell<VecDeque<Arc<dyn Command>>>,
    undone: RefCell<Vec<Arc<dyn Command>>>,
    config: HistoryConfig,
    delegate: RefCell<Option<Rc<dyn UndoManagerDelegate>>>,
    enabled: Cell<bool>,
}

impl UndoManager {
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            done: RefCell::new(VecDeque::new()),
            undone: RefCell::new(Vec::new()),
            config,
            delegate: RefCell::new(None),
            enabled: Cell::new(true),
        }
    }

    pub fn set_delegate(&self, delegate: Option<Rc<dyn UndoManagerDelegate>>) {
        *self.delegate.borrow_mut() = delegate;
    }

    #[must_use]
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Record a newly applied command. Clears the redo history.
    pub fn record(&self, command: Arc<dyn Command>) {
        let mut done = self.done.borrow_mut();
        done.push_back(command);
        while done.len() > self.config.max_depth {
            done.pop_front();
        }
        let depth = done.len();
        drop(done);

        let cleared = std::mem::take(&mut *self.undone.borrow_mut()).len();
        tracing::trace!(
            target: "commander.undo",
            undo_depth = depth,
            redo_cleared = cleared,
            "command recorded"
        );
    }

    /// Undo the last `n` commands, most recent first.
    ///
    /// In-flight asynchronous effects are canceled before their inverse
    /// runs. Fails without touching the history if fewer than `n` commands
    /// are recorded.
    pub fn undo(&self, n: usize) -> Result<(), HistoryError> {
        let available = self.undo_depth();
        if n > available {
            return Err(HistoryError::UndoUnavailable {
                requested: n,
                available,
            });
        }

        for _ in 0..n {
            let Some(command) = self.done.borrow_mut().pop_back() else {
                break;
            };
            let canceled = command.cancel_pending();
            let inverse = command.inversed();
            inverse.invoke();
            self.undone.borrow_mut().push(Arc::clone(&inverse));

            tracing::debug!(
                target: "commander.undo",
                item = command.type_name(),
                canceled_in_flight = canceled,
                "undo"
            );
            if let Some(delegate) = self.delegate() {
                delegate.did_undo(&inverse);
            }
        }
        Ok(())
    }

    /// Redo the last `n` undone commands, replaying the original order.
    ///
    /// Fails without touching the history if fewer than `n` commands were
    /// undone.
    pub fn redo(&self, n: usize) -> Result<(), HistoryError> {
        let available = self.redo_depth();
        if n > available {
            return Err(HistoryError::RedoUnavailable {
                requested: n,
                available,
            });
        }

        for _ in 0..n {
            let Some(inverse) = self.undone.borrow_mut().pop() else {
                break;
            };
            let command = inverse.inversed();
            command.invoke();
            {
                let mut done = self.done.borrow_mut();
                done.push_back(Arc::clone(&command));
                while done.len() > self.config.max_depth {
                    done.pop_front();
                }
            }

            tracing::debug!(target: "commander.undo", item = command.type_name(), "redo");
            if let Some(delegate) = self.delegate() {
                delegate.did_redo(&command);
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn can_undo(&self, n: usize) -> bool {
        n <= self.undo_depth()
    }

    #[must_use]
    pub fn can_redo(&self, n: usize) -> bool {
        n <= self.redo_depth()
    }

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.done.borrow().len()
    }

    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.undone.borrow().len()
    }

    /// Descriptions of the next commands to undo, most recent first.
    #[must_use]
    pub fn undo_descriptions(&self, limit: usize) -> Vec<String> {
        self.done
            .borrow()
            .iter()
            .rev()
            .take(limit)
            .map(|command| command.describe().without_id().to_string())
            .collect()
    }

    /// Descriptions of the next commands to redo, next first.
    ///
    /// Each entry describes the command redo would invoke.
    #[must_use]
    pub fn redo_descriptions(&self, limit: usize) -> Vec<String> {
        self.undone
            .borrow()
            .iter()
            .rev()
            .take(limit)
            .map(|inverse| inverse.inversed().describe().without_id().to_string())
            .collect()
    }

    #[must_use]
    pub fn next_undo_description(&self) -> Option<String> {
        self.undo_descriptions(1).pop()
    }

    #[must_use]
    pub fn next_redo_description(&self) -> Option<String> {
        self.redo_descriptions(1).pop()
    }

    /// Forget both histories.
    pub fn reset(&self) {
        self.done.borrow_mut().clear();
        self.undone.borrow_mut().clear();
        tracing::debug!(target: "commander.undo", "history reset");
    }

    fn delegate(&self) -> Option<Rc<dyn UndoManagerDelegate>> {
        self.delegate.borrow().clone()
    }
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl InvokeableHandler for UndoManager {
    fn name(&self) -> &'static str {
        "undo"
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

impl fmt::Debug for UndoManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoManager")
            .field("undo_depth", &self.undo_depth())
            .field("redo_depth", &self.redo_depth())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{BlockCommand, GroupCommand};
    use crate::query::BlockQuery;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn adder(counter: &Arc<AtomicI64>, step: i64) -> Arc<BlockCommand> {
        let (up, down) = (Arc::clone(counter), Arc::clone(counter));
        Arc::new(
            BlockCommand::new(
                move || {
                    up.fetch_add(step, Ordering::SeqCst);
                },
                move || {
                    down.fetch_sub(step, Ordering::SeqCst);
                },
            )
            .with_label(format!("add {step}")),
        )
    }

    /// Invoke and record, as a dispatcher with `[Invoker, UndoManager]` would.
    fn apply(manager: &UndoManager, command: Arc<BlockCommand>) {
        let invocation = Invocation::from(command);
        invocation.invoke();
        manager.handle_invokeable(&invocation);
    }

    fn value(counter: &Arc<AtomicI64>) -> i64 {
        counter.load(Ordering::SeqCst)
    }

    #[test]
    fn undo_and_redo_single_steps() {
        let counter = Arc::new(AtomicI64::new(0));
        let manager = UndoManager::default();
        apply(&manager, adder(&counter, 1));
        apply(&manager, adder(&counter, 10));
        assert_eq!(value(&counter), 11);

        manager.undo(1).unwrap();
        assert_eq!(value(&counter), 1);
        assert_eq!((manager.undo_depth(), manager.redo_depth()), (1, 1));

        manager.redo(1).unwrap();
        assert_eq!(value(&counter), 11);
        assert_eq!((manager.undo_depth(), manager.redo_depth()), (2, 0));
    }

    #[test]
    fn batch_undo_then_redo_replays_forward_order() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let manager = UndoManager::default();
        for name in ["a", "b", "c"] {
            let (fwd, rev) = (Arc::clone(&log), Arc::clone(&log));
            let command = Arc::new(BlockCommand::new(
                move || fwd.lock().unwrap().push(format!("+{name}")),
                move || rev.lock().unwrap().push(format!("-{name}")),
            ));
            apply(&manager, command);
        }
        log.lock().unwrap().clear();

        manager.undo(3).unwrap();
        manager.redo(3).unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["-c", "-b", "-a", "+a", "+b", "+c"]
        );
    }

    #[test]
    fn failed_undo_leaves_history_untouched() {
        let counter = Arc::new(AtomicI64::new(0));
        let manager = UndoManager::default();
        apply(&manager, adder(&counter, 5));

        let err = manager.undo(2).unwrap_err();
        assert_eq!(
            err,
            HistoryError::UndoUnavailable {
                requested: 2,
                available: 1
            }
        );
        assert_eq!(value(&counter), 5);
        assert_eq!(manager.undo_depth(), 1);
        assert!(!manager.can_undo(2));
        assert!(manager.can_undo(1));
    }

    #[test]
    fn new_command_clears_redo() {
        let counter = Arc::new(AtomicI64::new(0));
        let manager = UndoManager::default();
        apply(&manager, adder(&counter, 1));
        manager.undo(1).unwrap();
        assert!(manager.can_redo(1));

        apply(&manager, adder(&counter, 2));
        assert_eq!(
            manager.redo(1),
            Err(HistoryError::RedoUnavailable {
                requested: 1,
                available: 0
            })
        );
        assert_eq!(value(&counter), 2);
    }

    #[test]
    fn depth_limit_evicts_oldest() {
        let counter = Arc::new(AtomicI64::new(0));
        let manager = UndoManager::new(HistoryConfig::with_max_depth(2));
        for step in 1..=3 {
            apply(&manager, adder(&counter, step));
        }
        assert_eq!(manager.undo_depth(), 2);
        assert_eq!(
            manager.undo_descriptions(10),
            vec![
                "<BlockCommand state:finished> { label: add 3 }",
                "<BlockCommand state:finished> { label: add 2 }",
            ]
        );
    }

    #[test]
    fn queries_are_not_recorded() {
        let manager = UndoManager::default();
        manager.handle_invokeable(&Invocation::query(Arc::new(BlockQuery::new(|| {}))));
        assert_eq!(manager.undo_depth(), 0);
    }

    #[test]
    fn descriptions_survive_undo_redo() {
        let counter = Arc::new(AtomicI64::new(0));
        let manager = UndoManager::default();
        apply(&manager, adder(&counter, 1));
        apply(&manager, adder(&counter, 2));
        let before = manager.undo_descriptions(usize::MAX);

        manager.undo(2).unwrap();
        assert_eq!(
            manager.next_redo_description().as_deref(),
            Some("<BlockCommand state:ready> { label: add 1 }")
        );
        manager.redo(2).unwrap();
        assert_eq!(manager.undo_descriptions(usize::MAX), before);
        assert_eq!(manager.next_redo_description(), None);
    }

    #[test]
    fn reset_clears_everything() {
        let counter = Arc::new(AtomicI64::new(0));
        let manager = UndoManager::default();
        apply(&manager, adder(&counter, 1));
        apply(&manager, adder(&counter, 1));
        manager.undo(1).unwrap();
        manager.reset();
        assert_eq!((manager.undo_depth(), manager.redo_depth()), (0, 0));
        assert_eq!(manager.next_undo_description(), None);
    }

    #[test]
    fn group_is_one_history_entry() {
        let counter = Arc::new(AtomicI64::new(0));
        let manager = UndoManager::default();
        let members: Vec<Arc<dyn Command>> = vec![
            adder(&counter, 1) as Arc<dyn Command>,
            adder(&counter, 2) as Arc<dyn Command>,
        ];
        let group = Arc::new(GroupCommand::new(members));
        let invocation = Invocation::from(group);
        invocation.invoke();
        manager.handle_invokeable(&invocation);

        assert_eq!(manager.undo_depth(), 1);
        manager.undo(1).unwrap();
        assert_eq!(value(&counter), 0);
    }

    #[derive(Default)]
    struct Counting {
        undos: Cell<usize>,
        redos: Cell<usize>,
    }

    impl UndoManagerDelegate for Counting {
        fn did_undo(&self, _inverse: &Arc<dyn Command>) {
            self.undos.set(self.undos.get() + 1);
        }

        fn did_redo(&self, _command: &Arc<dyn Command>) {
            self.redos.set(self.redos.get() + 1);
        }
    }

    #[test]
    fn delegate_is_notified_per_step() {
        let counter = Arc::new(AtomicI64::new(0));
        let manager = UndoManager::default();
        let delegate = Rc::new(Counting::default());
        manager.set_delegate(Some(delegate.clone()));
        for _ in 0..3 {
            apply(&manager, adder(&counter, 1));
        }

        manager.undo(3).unwrap();
        manager.redo(2).unwrap();
        assert_eq!(delegate.undos.get(), 3);
        assert_eq!(delegate.redos.get(), 2);
    }
}
