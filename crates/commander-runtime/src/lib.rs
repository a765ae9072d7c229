#![forbid(unsafe_code)]

//! Commander Runtime
//!
//! Command dispatch with validation, pluggable handlers and undo/redo.
//!
//! # Key Components
//!
//! - [`Invokeable`] - Base contract: invoke, lifecycle [`State`], description
//! - [`Command`] - Reversible invokeable; [`Query`] - read-only invokeable
//! - [`Dispatcher`] - Validates and fans invocations out to handlers
//! - [`UndoManager`] - History handler with bounded undo/redo
//! - [`InvokeableLogger`] - Handler writing one description per dispatch
//! - [`DeferredCommand`] - Effect scheduled on a [`WorkQueue`], cancelable
//! - [`Engine`] - Pre-wired dispatcher, history, logger and queue
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicI64, Ordering};
//!
//! use commander_runtime::{BlockCommand, Dispatcher, UndoManager};
//!
//! let counter = Arc::new(AtomicI64::new(0));
//! let (up, down) = (Arc::clone(&counter), Arc::clone(&counter));
//! let command = BlockCommand::new(
//!     move || {
//!         up.fetch_add(5, Ordering::SeqCst);
//!     },
//!     move || {
//!         down.fetch_sub(5, Ordering::SeqCst);
//!     },
//! );
//!
//! let undo = Rc::new(UndoManager::default());
//! let mut dispatcher = Dispatcher::new();
//! dispatcher.add_handler(undo.clone());
//!
//! dispatcher.invoke(Arc::new(command));
//! assert_eq!(counter.load(Ordering::SeqCst), 5);
//!
//! undo.undo(1).unwrap();
//! assert_eq!(counter.load(Ordering::SeqCst), 0);
//! ```
//!
//! # Threading
//!
//! The dispatcher and its handlers live on one thread (`Rc`, `RefCell`).
//! Commands are `Send + Sync` so deferred effects can run on the work
//! queue's worker thread.

pub mod cancellation;
mod command;
pub mod config;
mod dispatcher;
mod engine;
mod handler;
mod invokeable;
pub mod log_sink;
pub mod metrics;
mod query;
mod state;
pub mod undo;
mod validator;
pub mod work_queue;

pub use command::{
    Action, BlockCommand, Cancelable, Command, DeferredCommand, DeferredEffect, DeferredRestore,
    Effect, GroupCommand, InverseCommand, ProduceCommand, TargetActionCommand,
};
pub use config::{ConfigError, DeferredConfig, EngineConfig, HistoryConfig, LoggingConfig};
pub use dispatcher::{Dispatcher, DispatcherDelegate};
pub use engine::Engine;
pub use handler::{CommandStore, InvokeableHandler, InvokeableLogger, Invoker};
pub use invokeable::{Description, Invocation, InvocationId, Invokeable};
pub use log_sink::TextSink;
pub use query::{BlockQuery, Query};
pub use state::{Lifecycle, State, StateKind};
pub use undo::{HistoryError, UndoManager, UndoManagerDelegate};
pub use validator::{
    AllowAll, EditMode, EditPermission, PermissionValidator, SharedEditMode, Validator,
};
pub use work_queue::{TaskHandle, WorkQueue, WorkQueueHandle};
