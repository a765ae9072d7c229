#![forbid(unsafe_code)]

//! Reversible commands and the built-in command combinators.
//!
//! A [`Command`] is an [`Invokeable`] that can produce its own inverse. The
//! inverse is always a *fresh* object in [`State::Ready`](crate::State::Ready):
//! commands are single-use, so undoing a finished command means invoking a
//! new instance rather than rewinding the old one.
//!
//! # Invariants
//!
//! - `c.invoke()` followed by `c.inversed().invoke()` restores every
//!   externally observable value, except for deferred effects that have not
//!   settled yet (see [`DeferredCommand`]).
//! - `c.inversed().inversed()` has the same effect and description as `c`.
//! - Groups reverse both the operation and the order of their members.
//!
//! # Building blocks
//!
//! | Type | Effect |
//! |------|--------|
//! | [`BlockCommand`] | forward / reverse closures |
//! | [`TargetActionCommand`] | named actions on a weakly held target |
//! | [`ProduceCommand`] | builds the real command on first use |
//! | [`GroupCommand`] | ordered members, reversed back to front |
//! | [`InverseCommand`] | runs the inverse of the wrapped command |
//! | [`DeferredCommand`] | effect scheduled on a [`WorkQueue`](crate::WorkQueue) |

mod block;
mod deferred;
mod group;
mod inverse;
mod produce;
mod target_action;

use std::sync::Arc;

pub use block::{BlockCommand, Effect};
pub use deferred::{DeferredCommand, DeferredEffect, DeferredRestore};
pub use group::GroupCommand;
pub use inverse::InverseCommand;
pub use produce::ProduceCommand;
pub use target_action::{Action, TargetActionCommand};

use crate::invokeable::Invokeable;

/// A reversible invokeable.
pub trait Command: Invokeable {
    /// A fresh, ready command whose `invoke` performs the opposite effect.
    fn inversed(&self) -> Arc<dyn Command>;

    /// The cancellation capability, for commands whose effect completes
    /// after `invoke` returns.
    fn as_cancelable(&self) -> Option<&dyn Cancelable> {
        None
    }

    /// Cancel any effect of this command that is still in flight.
    ///
    /// Returns `true` if something was canceled. Composite commands forward
    /// to their members.
    fn cancel_pending(&self) -> bool {
        self.as_cancelable()
            .is_some_and(|cancelable| cancelable.is_pending() && cancelable.cancel())
    }
}

/// Extension contract for commands with an asynchronous effect.
pub trait Cancelable: Send + Sync {
    /// `executing → canceled`. A not-yet-started effect will not run.
    fn cancel(&self) -> bool;

    /// `executing → finished`. Called once the effect has completed.
    fn finish(&self) -> bool;

    /// Whether the command was invoked and has neither finished nor been
    /// canceled.
    fn is_pending(&self) -> bool;

    /// Whether completion happens off the calling thread.
    fn is_asynchronous(&self) -> bool {
        true
    }
}
