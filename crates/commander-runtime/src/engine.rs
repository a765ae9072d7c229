#![forbid(unsafe_code)]

//! Pre-wired engine: dispatcher, history, logger and work queue.

use std::rc::Rc;

use crate::config::{ConfigError, EngineConfig};
use crate::dispatcher::Dispatcher;
use crate::handler::{InvokeableHandler, InvokeableLogger, Invoker};
use crate::invokeable::Invocation;
use crate::undo::{HistoryError, UndoManager};
use crate::validator::Validator;
use crate::work_queue::{WorkQueue, WorkQueueHandle};

/// The usual assembly of the engine's parts.
///
/// The dispatcher's chain is `[Invoker, UndoManager, InvokeableLogger]`.
/// Deferred commands built by the application should be scheduled on
/// [`Engine::queue_handle`].
#[derive(Debug)]
pub struct Engine {
    dispatcher: Dispatcher,
    undo: Rc<UndoManager>,
    logger: Rc<InvokeableLogger>,
    queue: WorkQueue,
    config: EngineConfig,
}

impl Engine {
    /// Validate `config` and spawn the work queue's worker.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let queue = WorkQueue::new(&config.deferred).map_err(ConfigError::Io)?;
        let undo = Rc::new(UndoManager::new(config.history.clone()));
        let logger = Rc::new(InvokeableLogger::from_config(&config.logging));
        let handlers: Vec<Rc<dyn InvokeableHandler>> = vec![
            Rc::new(Invoker::new()) as Rc<dyn InvokeableHandler>,
            Rc::clone(&undo) as Rc<dyn InvokeableHandler>,
            Rc::clone(&logger) as Rc<dyn InvokeableHandler>,
        ];

        tracing::info!(
            target: "commander.engine",
            max_depth = config.history.max_depth,
            worker = %config.deferred.worker_name,
            "engine ready"
        );

        Ok(Self {
            dispatcher: Dispatcher::with_handlers(handlers),
            undo,
            logger,
            queue,
            config,
        })
    }

    /// Install a validator on the dispatcher.
    #[must_use]
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.dispatcher.set_validator(Some(Box::new(validator)));
        self
    }

    pub fn invoke(&mut self, item: impl Into<Invocation>) {
        self.dispatcher.invoke(item);
    }

    pub fn undo(&self, n: usize) -> Result<(), HistoryError> {
        self.undo.undo(n)
    }

    pub fn redo(&self, n: usize) -> Result<(), HistoryError> {
        self.undo.redo(n)
    }

    pub fn dispatcher(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    #[must_use]
    pub fn undo_manager(&self) -> &Rc<UndoManager> {
        &self.undo
    }

    #[must_use]
    pub fn logger(&self) -> &Rc<InvokeableLogger> {
        &self.logger
    }

    #[must_use]
    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    #[must_use]
    pub fn queue_handle(&self) -> WorkQueueHandle {
        self.queue.handle()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::BlockCommand;
    use crate::config::{DeferredConfig, HistoryConfig};
    use crate::log_sink::TextSink;
    use crate::validator::{EditMode, PermissionValidator};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn config(worker: &str) -> EngineConfig {
        EngineConfig {
            deferred: DeferredConfig {
                worker_name: worker.into(),
                ..DeferredConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    fn adder(counter: &Arc<AtomicI64>) -> Arc<BlockCommand> {
        let (up, down) = (Arc::clone(counter), Arc::clone(counter));
        Arc::new(BlockCommand::new(
            move || {
                up.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                down.fetch_sub(1, Ordering::SeqCst);
            },
        ))
    }

    #[test]
    fn wires_invoker_history_and_logger() {
        let counter = Arc::new(AtomicI64::new(0));
        let mut engine = Engine::new(config("commander-engine-test")).unwrap();
        let sink = TextSink::new();
        engine.logger().set_sink(sink.clone());

        engine.invoke(adder(&counter));
        engine.invoke(adder(&counter));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(engine.undo_manager().undo_depth(), 2);
        assert_eq!(sink.lines().len(), 2);

        engine.undo(2).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        engine.redo(1).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let names: Vec<&str> = engine.dispatcher().handlers().iter().map(|h| h.name()).collect();
        assert_eq!(names, ["invoker", "undo", "logger"]);
        assert_eq!(engine.queue().thread_name(), Some("commander-engine-test"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            history: HistoryConfig { max_depth: 0 },
            ..EngineConfig::default()
        };
        assert!(matches!(Engine::new(config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn read_only_engine_forbids_commands() {
        let counter = Arc::new(AtomicI64::new(0));
        let mut engine = Engine::new(config("commander-engine-ro"))
            .unwrap()
            .with_validator(PermissionValidator::new(EditMode::ReadOnly));
        let command = adder(&counter);
        engine.invoke(Arc::clone(&command));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(!engine.undo_manager().can_undo(1));
    }
}
