#![forbid(unsafe_code)]

//! Undo/redo history.
//!
//! The [`UndoManager`] is a handler: registered with a
//! [`Dispatcher`](crate::Dispatcher), it records every accepted command.
//! Undo and redo then walk the history directly, without going back through
//! the dispatcher.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         UndoManager                           │
//! │  ┌──────────────────┐           ┌──────────────────┐         │
//! │  │       done       │  undo(n)  │      undone      │         │
//! │  │  c1 c2 ... cN    │ ────────► │  ¬cN ... ¬c(N-n) │         │
//! │  │                  │ ◄──────── │                  │         │
//! │  └──────────────────┘  redo(n)  └──────────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Commands are single-use, so the history never re-invokes a stored
//! instance. Undo invokes `command.inversed()` and keeps that inverse in
//! `undone`; redo invokes `inverse.inversed()` and keeps that fresh forward
//! instance in `done`.
//!
//! # Invariants
//!
//! 1. A history slot lives in exactly one of `done` and `undone`
//! 2. `done.len() <= config.max_depth` after every operation
//! 3. Recording a new command clears `undone`
//! 4. A failed `undo`/`redo` leaves both sequences untouched

mod error;
mod manager;

pub use error::HistoryError;
pub use manager::{UndoManager, UndoManagerDelegate};

pub use crate::config::HistoryConfig;
