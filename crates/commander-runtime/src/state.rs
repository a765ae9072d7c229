#![forbid(unsafe_code)]

//! Lifecycle state shared by every invokeable.
//!
//! ```text
//!            invoke            finish
//!   Ready ───────────► Executing ───────► Finished(at)
//!     │                    │
//!     │ validator reject   │ cancel
//!     ▼                    ▼
//!  Forbidden            Canceled
//! ```
//!
//! # Invariants
//!
//! - `Finished`, `Forbidden` and `Canceled` are terminal: no transition
//!   leaves them.
//! - Every transition is a compare-and-set on the current state. A refused
//!   transition leaves the state untouched and reports `false`.
//!
//! Invokeables are single-use. Retrying means constructing a fresh instance
//! (for commands, usually via [`Command::inversed`](crate::Command::inversed)).

use std::fmt;
use std::sync::{Mutex, PoisonError};

use web_time::Instant;

/// The lifecycle state of an invokeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Constructed and not yet dispatched.
    Ready,
    /// Invoked; the effect is running or scheduled.
    Executing,
    /// The effect completed.
    Finished {
        /// When the effect completed.
        at: Instant,
    },
    /// An in-flight deferred effect was aborted before it began.
    Canceled,
    /// The validator refused to dispatch the item.
    Forbidden,
}

/// Discriminant of [`State`] without the finish timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Ready,
    Executing,
    Finished,
    Canceled,
    Forbidden,
}

impl State {
    /// The state's discriminant.
    #[must_use]
    pub const fn kind(self) -> StateKind {
        match self {
            Self::Ready => StateKind::Ready,
            Self::Executing => StateKind::Executing,
            Self::Finished { .. } => StateKind::Finished,
            Self::Canceled => StateKind::Canceled,
            Self::Forbidden => StateKind::Forbidden,
        }
    }

    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    #[must_use]
    pub const fn is_executing(self) -> bool {
        matches!(self, Self::Executing)
    }

    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Finished { .. })
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Finished { .. } | Self::Canceled | Self::Forbidden
        )
    }

    /// The completion time, if finished.
    #[must_use]
    pub const fn finished_at(self) -> Option<Instant> {
        match self {
            Self::Finished { at } => Some(at),
            _ => None,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ready => "ready",
            Self::Executing => "executing",
            Self::Finished { .. } => "finished",
            Self::Canceled => "canceled",
            Self::Forbidden => "forbidden",
        };
        f.write_str(name)
    }
}

/// Thread-safe holder of a [`State`] enforcing the lifecycle transitions.
///
/// Concrete commands embed one of these instead of inheriting lifecycle
/// behavior from a base type. Deferred commands share theirs with the work
/// queue task that eventually calls [`finish`](Self::finish).
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<State>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// A lifecycle in [`State::Ready`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(State::Ready),
        }
    }

    /// Current state.
    #[must_use]
    pub fn get(&self) -> State {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `Ready → Executing`.
    pub fn begin(&self) -> bool {
        self.transition(StateKind::Ready, State::Executing)
    }

    /// `Executing → Finished(now)`.
    pub fn finish(&self) -> bool {
        self.transition(StateKind::Executing, State::Finished { at: Instant::now() })
    }

    /// `Executing → Canceled`.
    pub fn cancel(&self) -> bool {
        self.transition(StateKind::Executing, State::Canceled)
    }

    /// `Ready → Forbidden`.
    pub fn forbid(&self) -> bool {
        self.transition(StateKind::Ready, State::Forbidden)
    }

    /// Like [`begin`](Self::begin), but treats a refused start as a
    /// programmer error: asserts in debug builds, logs and returns `false`
    /// in release builds.
    pub fn start(&self, type_name: &'static str) -> bool {
        if self.begin() {
            return true;
        }
        let state = self.get();
        tracing::warn!(
            target: "commander.lifecycle",
            item = type_name,
            %state,
            "invoke on an item that is not ready; ignoring"
        );
        debug_assert!(false, "{type_name} invoked in state {state}; invokeables are single-use");
        false
    }

    fn transition(&self, from: StateKind, to: State) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.kind() != from {
            return false;
        }
        *state = to;
        true
    }
}
