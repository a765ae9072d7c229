#![forbid(unsafe_code)]

//! Read-only invokeables.

use std::fmt;
use std::sync::Arc;

use crate::invokeable::{Description, InvocationId, Invokeable};
use crate::state::{Lifecycle, State};

/// An invokeable without side effects on the edited state.
///
/// Queries carry no reverse logic, are never recorded in undo history and
/// always pass permission validators that only guard mutation.
pub trait Query: Invokeable {}

/// A query backed by a closure.
pub struct BlockQuery {
    body: Arc<dyn Fn() + Send + Sync>,
    label: Option<String>,
    id: InvocationId,
    lifecycle: Lifecycle,
}

impl BlockQuery {
    pub fn new(body: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            body: Arc::new(body),
            label: None,
            id: InvocationId::next(),
            lifecycle: Lifecycle::new(),
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl Invokeable for BlockQuery {
    fn invoke(&self) {
        if !self.lifecycle.start(self.type_name()) {
            return;
        }
        (self.body)();
        self.lifecycle.finish();
    }

    fn state(&self) -> State {
        self.lifecycle.get()
    }

    fn forbid(&self) -> bool {
        self.lifecycle.forbid()
    }

    fn describe(&self) -> Description {
        let description = Description::new(self.type_name(), self.state()).with_id(Some(self.id));
        match &self.label {
            Some(label) => description.field("label", label),
            None => description,
        }
    }

    fn id(&self) -> Option<InvocationId> {
        Some(self.id)
    }

    fn is_mutating(&self) -> bool {
        false
    }

    fn type_name(&self) -> &'static str {
        "BlockQuery"
    }
}

impl Query for BlockQuery {}

impl fmt::Debug for BlockQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockQuery")
            .field("label", &self.label)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_body_once_and_finishes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let query = BlockQuery::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .with_label("count");

        query.invoke();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(query.state().is_finished());
        assert!(!query.is_mutating());
        assert_eq!(query.describe().field_value("label"), Some("count"));
    }

    #[test]
    fn forbidden_query_does_not_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let query = BlockQuery::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(query.forbid());
        assert_eq!(query.state(), State::Forbidden);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
