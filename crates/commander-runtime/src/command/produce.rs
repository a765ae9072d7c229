#![forbid(unsafe_code)]

//! Lazily constructed command.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::command::{Cancelable, Command, GroupCommand};
use crate::invokeable::{Description, InvocationId, Invokeable};
use crate::state::{Lifecycle, State};

type Producer = Box<dyn FnOnce() -> Arc<dyn Command> + Send>;

/// Builds the real command on first `invoke` or `inversed`.
///
/// Useful when the command's parameters are only known at dispatch time,
/// e.g. a layout computed from the targets' positions when it runs. Before
/// production the command tracks its own ready/forbidden state; afterwards
/// it mirrors the produced command.
pub struct ProduceCommand {
    producer: Mutex<Option<Producer>>,
    produced: OnceLock<Arc<dyn Command>>,
    label: Option<String>,
    mutating: bool,
    id: InvocationId,
    lifecycle: Lifecycle,
}

impl ProduceCommand {
    pub fn new(producer: impl FnOnce() -> Arc<dyn Command> + Send + 'static) -> Self {
        Self {
            producer: Mutex::new(Some(Box::new(producer))),
            produced: OnceLock::new(),
            label: None,
            mutating: true,
            id: InvocationId::next(),
            lifecycle: Lifecycle::new(),
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Capability tag reported before production.
    #[must_use]
    pub fn with_mutating(mut self, mutating: bool) -> Self {
        self.mutating = mutating;
        self
    }

    /// Whether the real command has been built.
    #[must_use]
    pub fn is_produced(&self) -> bool {
        self.produced.get().is_some()
    }

    fn produce(&self) -> &Arc<dyn Command> {
        self.produced.get_or_init(|| {
            let producer = self
                .producer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            match producer {
                Some(producer) => producer(),
                None => {
                    tracing::warn!(
                        target: "commander.lifecycle",
                        id = self.id.raw(),
                        "producer already consumed; substituting an empty group"
                    );
                    Arc::new(GroupCommand::empty())
                }
            }
        })
    }
}

impl Invokeable for ProduceCommand {
    fn invoke(&self) {
        if !self.lifecycle.start(self.type_name()) {
            return;
        }
        self.produce().invoke();
    }

    fn state(&self) -> State {
        match self.produced.get() {
            Some(command) => command.state(),
            None => self.lifecycle.get(),
        }
    }

    fn forbid(&self) -> bool {
        let forbidden = self.lifecycle.forbid();
        match self.produced.get() {
            Some(command) => command.forbid(),
            None => forbidden,
        }
    }

    fn describe(&self) -> Description {
        let mut description = Description::new(self.type_name(), self.state()).with_id(Some(self.id));
        if let Some(label) = &self.label {
            description = description.field("label", label);
        }
        match self.produced.get() {
            Some(command) => description.member(command.describe()),
            None => description.field("produced", false),
        }
    }

    fn id(&self) -> Option<InvocationId> {
        Some(self.id)
    }

    fn is_mutating(&self) -> bool {
        self.produced
            .get()
            .map_or(self.mutating, |command| command.is_mutating())
    }

    fn type_name(&self) -> &'static str {
        "ProduceCommand"
    }
}

impl Command for ProduceCommand {
    fn inversed(&self) -> Arc<dyn Command> {
        self.produce().inversed()
    }

    fn as_cancelable(&self) -> Option<&dyn Cancelable> {
        self.produced.get().and_then(|command| command.as_cancelable())
    }

    fn cancel_pending(&self) -> bool {
        self.produced
            .get()
            .is_some_and(|command| command.cancel_pending())
    }
}
