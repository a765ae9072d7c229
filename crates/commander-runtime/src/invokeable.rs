#![forbid(unsafe_code)]

//! The base capability contract: things a [`Dispatcher`](crate::Dispatcher)
//! can route.
//!
//! [`Invokeable`] is deliberately small. Reversibility lives in
//! [`Command`], the read-only marker in [`Query`], and cancellation in
//! [`Cancelable`](crate::Cancelable). The dispatcher never sees a bare
//! invokeable: it receives an [`Invocation`], which keeps the
//! command/query distinction visible to validators and handlers without
//! downcasting.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::command::Command;
use crate::query::Query;
use crate::state::State;

static NEXT_INVOCATION_ID: AtomicU64 = AtomicU64::new(1);

/// Correlation identifier attached to an invokeable at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InvocationId(u64);

impl InvocationId {
    /// Allocate the next process-unique identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_INVOCATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Anything that can be dispatched and has a lifecycle state.
pub trait Invokeable: Send + Sync {
    /// Run the effect. Only valid in [`State::Ready`].
    fn invoke(&self);

    /// Current lifecycle state.
    fn state(&self) -> State;

    /// Move a ready item to [`State::Forbidden`]. Called by the dispatcher
    /// when the validator rejects the item.
    fn forbid(&self) -> bool;

    /// Structured, human-readable summary used by loggers and history views.
    fn describe(&self) -> Description;

    /// Correlation identifier, if the item carries one.
    fn id(&self) -> Option<InvocationId> {
        None
    }

    /// Capability tag consulted by permission validators.
    fn is_mutating(&self) -> bool {
        true
    }

    /// Short type name for logs.
    fn type_name(&self) -> &'static str;
}

/// A structured description of an invokeable.
///
/// Renders as `<TypeName state:ready> { field: value, ... }`. Composite
/// commands list their members on indented lines below the header.
#[derive(Debug, Clone, PartialEq)]
pub struct Description {
    type_name: &'static str,
    state: State,
    id: Option<InvocationId>,
    fields: Vec<(&'static str, String)>,
    members: Vec<Description>,
}

impl Description {
    #[must_use]
    pub fn new(type_name: &'static str, state: State) -> Self {
        Self {
            type_name,
            state,
            id: None,
            fields: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Attach the correlation identifier.
    #[must_use]
    pub fn with_id(mut self, id: Option<InvocationId>) -> Self {
        self.id = id;
        self
    }

    /// The same description with the identifier removed here and in every
    /// member. Fresh instances of the same command compare equal this way.
    #[must_use]
    pub fn without_id(mut self) -> Self {
        self.id = None;
        self.members = self.members.into_iter().map(Self::without_id).collect();
        self
    }

    /// Append a `name: value` field.
    #[must_use]
    pub fn field(mut self, name: &'static str, value: impl fmt::Display) -> Self {
        self.fields.push((name, value.to_string()));
        self
    }

    /// Append a nested member description.
    #[must_use]
    pub fn member(mut self, member: Description) -> Self {
        self.members.push(member);
        self
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub fn id(&self) -> Option<InvocationId> {
        self.id
    }

    #[must_use]
    pub fn fields(&self) -> &[(&'static str, String)] {
        &self.fields
    }

    /// Value of the first field called `name`.
    #[must_use]
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn members(&self) -> &[Description] {
        &self.members
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        write!(f, "{indent}<{} state:{}>", self.type_name, self.state)?;

        let mut fields = Vec::with_capacity(self.fields.len() + 1);
        if let Some(id) = self.id {
            fields.push(format!("id: {id}"));
        }
        fields.extend(self.fields.iter().map(|(name, value)| format!("{name}: {value}")));
        if fields.is_empty() {
            f.write_str(" {}")?;
        } else {
            write!(f, " {{ {} }}", fields.join(", "))?;
        }

        for member in &self.members {
            f.write_str("\n")?;
            member.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

/// The dispatch envelope handed to validators and handlers.
#[derive(Clone)]
pub enum Invocation {
    /// A reversible, usually mutating, command.
    Command(Arc<dyn Command>),
    /// A side-effect-free query.
    Query(Arc<dyn Query>),
}

impl<T: Command + 'static> From<Arc<T>> for Invocation {
    fn from(command: Arc<T>) -> Self {
        Self::Command(command)
    }
}

impl Invocation {
    /// Wrap a query that is shared elsewhere.
    #[must_use]
    pub fn query<Q: Query + 'static>(query: Arc<Q>) -> Self {
        Self::Query(query)
    }

    /// `"command"` or `"query"`, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Query(_) => "query",
        }
    }

    /// The command, if this invocation carries one.
    #[must_use]
    pub fn as_command(&self) -> Option<&Arc<dyn Command>> {
        match self {
            Self::Command(command) => Some(command),
            Self::Query(_) => None,
        }
    }

    pub fn invoke(&self) {
        match self {
            Self::Command(command) => command.invoke(),
            Self::Query(query) => query.invoke(),
        }
    }

    #[must_use]
    pub fn state(&self) -> State {
        match self {
            Self::Command(command) => command.state(),
            Self::Query(query) => query.state(),
        }
    }

    pub fn forbid(&self) -> bool {
        match self {
            Self::Command(command) => command.forbid(),
            Self::Query(query) => query.forbid(),
        }
    }

    #[must_use]
    pub fn describe(&self) -> Description {
        match self {
            Self::Command(command) => command.describe(),
            Self::Query(query) => query.describe(),
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<InvocationId> {
        match self {
            Self::Command(command) => command.id(),
            Self::Query(query) => query.id(),
        }
    }

    /// Queries are never mutating, whatever they report.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        match self {
            Self::Command(command) => command.is_mutating(),
            Self::Query(_) => false,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Command(command) => command.type_name(),
            Self::Query(query) => query.type_name(),
        }
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("kind", &self.kind())
            .field("type_name", &self.type_name())
            .field("state", &self.state())
            .field("id", &self.id())
            .finish()
    }
}
