#![forbid(unsafe_code)]

//! Ordered composite command.

use std::fmt;
use std::sync::Arc;

use crate::command::Command;
use crate::invokeable::{Description, Invokeable};
use crate::state::{State, StateKind};

/// An ordered list of commands treated as one unit.
///
/// `invoke` runs the members front to back; the inverse runs the members'
/// inverses back to front, so the last applied effect is undone first.
///
/// A group has no lifecycle of its own: its state is derived from its
/// members, in this order of precedence:
///
/// 1. no members: `ready`
/// 2. any member `executing`: `executing`
/// 3. any member `forbidden`: `forbidden`
/// 4. all members in the same state: that state (all `finished`: finished
///    at the latest member timestamp)
/// 5. otherwise: `ready`
pub struct GroupCommand {
    commands: Vec<Arc<dyn Command>>,
}

impl GroupCommand {
    #[must_use]
    pub fn new(commands: Vec<Arc<dyn Command>>) -> Self {
        Self { commands }
    }

    /// A group with no members. Invoking it does nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    #[must_use]
    pub fn commands(&self) -> &[Arc<dyn Command>] {
        &self.commands
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Invokeable for GroupCommand {
    fn invoke(&self) {
        for command in &self.commands {
            command.invoke();
        }
    }

    fn state(&self) -> State {
        if self.commands.is_empty() {
            return State::Ready;
        }
        let states: Vec<State> = self.commands.iter().map(|c| c.state()).collect();

        if states.iter().any(|s| s.is_executing()) {
            return State::Executing;
        }
        if states.iter().any(|s| s.kind() == StateKind::Forbidden) {
            return State::Forbidden;
        }

        let kind = states[0].kind();
        if !states.iter().all(|s| s.kind() == kind) {
            return State::Ready;
        }
        match kind {
            StateKind::Finished => states
                .iter()
                .filter_map(|s| s.finished_at())
                .max()
                .map_or(State::Ready, |at| State::Finished { at }),
            _ => states[0],
        }
    }

    /// Forbids every member that is still ready.
    fn forbid(&self) -> bool {
        let mut forbidden = false;
        for command in &self.commands {
            forbidden |= command.forbid();
        }
        forbidden
    }

    fn describe(&self) -> Description {
        self.commands.iter().fold(
            Description::new(self.type_name(), self.state()).field("count", self.commands.len()),
            |description, command| description.member(command.describe()),
        )
    }

    fn is_mutating(&self) -> bool {
        self.commands.iter().any(|c| c.is_mutating())
    }

    fn type_name(&self) -> &'static str {
        "GroupCommand"
    }
}

impl Command for GroupCommand {
    fn inversed(&self) -> Arc<dyn Command> {
        Arc::new(Self::new(
            self.commands.iter().rev().map(|c| c.inversed()).collect(),
        ))
    }

    fn cancel_pending(&self) -> bool {
        let mut canceled = false;
        for command in self.commands.iter().rev() {
            canceled |= command.cancel_pending();
        }
        canceled
    }
}

impl fmt::Debug for GroupCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupCommand")
            .field("len", &self.commands.len())
            .field("state", &self.state())
            .finish()
    }
}
