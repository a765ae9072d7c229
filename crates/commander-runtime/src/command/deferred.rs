#![forbid(unsafe_code)]

//! Commands whose effect runs later on a [`WorkQueue`](crate::WorkQueue).
//!
//! A [`DeferredCommand`] captures a snapshot of the state it is about to
//! change synchronously in `invoke`, then schedules its effect. It stays
//! `executing` until the scheduled task has run, at which point it becomes
//! `finished`.
//!
//! # Cancellation
//!
//! The scheduled task checks its cancellation token exactly once, when it
//! begins. [`Cancelable::cancel`] before that moment suppresses the effect
//! and moves the command to `canceled`. Once the task has begun, `cancel`
//! is refused and returns `false`.
//!
//! [`Cancelable::finish`] settles the command as `finished`. Called before
//! the task has begun, it also withdraws the scheduled effect.
//!
//! # Reversal
//!
//! The inverse of a deferred command is a [`DeferredRestore`] bound to the
//! same run. Invoking it:
//!
//! 1. cancels the forward effect if it has not started yet
//! 2. if the forward was canceled, does nothing else (there is nothing to
//!    restore)
//! 3. otherwise waits for a running forward effect to complete and restores
//!    the snapshot
//!
//! so undo is safe whether or not the effect has materialized.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use web_time::Duration;

use crate::cancellation::CancellationSource;
use crate::command::{Cancelable, Command};
use crate::invokeable::{Description, InvocationId, Invokeable};
use crate::metrics;
use crate::state::{Lifecycle, State};
use crate::work_queue::{TaskHandle, WorkQueueHandle};

type Capture<S> = Arc<dyn Fn() -> S + Send + Sync>;
type Apply<S> = Arc<dyn Fn(&S) + Send + Sync>;

/// The closures of a deferred command.
///
/// - `capture` runs synchronously in `invoke` and records the state the
///   effect will change.
/// - `apply` runs on the work queue with the captured snapshot.
/// - `restore` puts the snapshot back when the command is undone.
pub struct DeferredEffect<S> {
    label: String,
    capture: Capture<S>,
    apply: Apply<S>,
    restore: Apply<S>,
    delay: Option<Duration>,
}

impl<S> Clone for DeferredEffect<S> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            capture: Arc::clone(&self.capture),
            apply: Arc::clone(&self.apply),
            restore: Arc::clone(&self.restore),
            delay: self.delay,
        }
    }
}

impl<S> DeferredEffect<S> {
    pub fn new(
        label: impl Into<String>,
        capture: impl Fn() -> S + Send + Sync + 'static,
        apply: impl Fn(&S) + Send + Sync + 'static,
        restore: impl Fn(&S) + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            capture: Arc::new(capture),
            apply: Arc::new(apply),
            restore: Arc::new(restore),
            delay: None,
        }
    }

    /// Override the queue's default delay.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// State of one forward run, shared by the command, its scheduled task and
/// any restore created from it.
struct Run<S> {
    lifecycle: Lifecycle,
    snapshot: OnceLock<S>,
    /// Set by the task once it has passed the cancellation check.
    started: Mutex<bool>,
    cancellation: CancellationSource,
    completion: OnceLock<TaskHandle>,
}

impl<S> Run<S> {
    fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            snapshot: OnceLock::new(),
            started: Mutex::new(false),
            cancellation: CancellationSource::new(),
            completion: OnceLock::new(),
        }
    }

    /// Called from the task. Returns whether the effect may run.
    fn begin_effect(&self) -> bool {
        let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        if self.cancellation.token().is_cancelled() {
            return false;
        }
        *started = true;
        true
    }

    fn cancel(&self, label: &str) -> bool {
        let started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        if *started || !self.lifecycle.cancel() {
            return false;
        }
        self.cancellation.cancel();
        drop(started);

        metrics::record_deferred_canceled();
        tracing::debug!(target: "commander.deferred", label, "deferred effect canceled");
        true
    }

    /// `Executing → Finished`. Before the task has begun, the effect is
    /// withdrawn as well.
    fn finish(&self) -> bool {
        let started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.lifecycle.finish() {
            return false;
        }
        if !*started {
            self.cancellation.cancel();
        }
        true
    }

    fn wait_settled(&self) {
        if let Some(completion) = self.completion.get() {
            completion.join();
        }
    }
}

/// A command whose effect runs on a work queue after a delay.
///
/// ```no_run
/// use std::sync::{Arc, Mutex};
/// use commander_runtime::{
///     DeferredCommand, DeferredConfig, DeferredEffect, Invokeable, WorkQueue,
/// };
///
/// let queue = WorkQueue::new(&DeferredConfig::default()).unwrap();
/// let value = Arc::new(Mutex::new(1));
/// let (read, write, undo) = (Arc::clone(&value), Arc::clone(&value), Arc::clone(&value));
///
/// let double = DeferredCommand::new(
///     DeferredEffect::new(
///         "double",
///         move || *read.lock().unwrap(),
///         move |_| *write.lock().unwrap() *= 2,
///         move |before| *undo.lock().unwrap() = *before,
///     ),
///     queue.handle(),
/// );
/// double.invoke();
/// assert!(double.state().is_executing());
/// ```
pub struct DeferredCommand<S> {
    effect: DeferredEffect<S>,
    queue: WorkQueueHandle,
    run: Arc<Run<S>>,
    id: InvocationId,
}

impl<S: Send + Sync + 'static> DeferredCommand<S> {
    #[must_use]
    pub fn new(effect: DeferredEffect<S>, queue: WorkQueueHandle) -> Self {
        Self {
            effect,
            queue,
            run: Arc::new(Run::new()),
            id: InvocationId::next(),
        }
    }

    /// Delay this command schedules its effect with.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.effect.delay.unwrap_or_else(|| self.queue.default_delay())
    }

    /// Completion handle of the scheduled effect, once invoked.
    #[must_use]
    pub fn completion(&self) -> Option<TaskHandle> {
        self.run.completion.get().cloned()
    }

    /// The snapshot captured by `invoke`, if invoked.
    #[must_use]
    pub fn snapshot(&self) -> Option<&S> {
        self.run.snapshot.get()
    }
}

impl<S: Send + Sync + 'static> Invokeable for DeferredCommand<S> {
    fn invoke(&self) {
        if !self.run.lifecycle.start(self.type_name()) {
            return;
        }
        let _ = self.run.snapshot.set((self.effect.capture)());

        let run = Arc::clone(&self.run);
        let apply = Arc::clone(&self.effect.apply);
        let label = self.effect.label.clone();
        let delay = self.delay();
        let completion = self.queue.schedule(delay, move || {
            if !run.begin_effect() {
                tracing::debug!(target: "commander.deferred", label = %label, "skipping canceled effect");
                return;
            }
            if let Some(snapshot) = run.snapshot.get() {
                apply(snapshot);
            }
            if run.finish() {
                tracing::debug!(target: "commander.deferred", label = %label, "deferred effect applied");
            }
        });
        let _ = self.run.completion.set(completion);

        tracing::debug!(
            target: "commander.deferred",
            label = %self.effect.label,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "deferred effect scheduled"
        );
    }

    fn state(&self) -> State {
        self.run.lifecycle.get()
    }

    fn forbid(&self) -> bool {
        self.run.lifecycle.forbid()
    }

    fn describe(&self) -> Description {
        Description::new(self.type_name(), self.state())
            .with_id(Some(self.id))
            .field("label", &self.effect.label)
            .field("delay_ms", self.delay().as_millis())
    }

    fn id(&self) -> Option<InvocationId> {
        Some(self.id)
    }

    fn type_name(&self) -> &'static str {
        "DeferredCommand"
    }
}

impl<S: Send + Sync + 'static> Cancelable for DeferredCommand<S> {
    fn cancel(&self) -> bool {
        self.run.cancel(&self.effect.label)
    }

    fn finish(&self) -> bool {
        if self.run.finish() {
            tracing::debug!(
                target: "commander.deferred",
                label = %self.effect.label,
                "deferred command finished by caller"
            );
            return true;
        }
        let state = self.state();
        tracing::warn!(
            target: "commander.lifecycle",
            label = %self.effect.label,
            %state,
            "finish on a deferred command that is not executing; ignoring"
        );
        debug_assert!(false, "finish() called on a DeferredCommand in state {state}");
        false
    }

    fn is_pending(&self) -> bool {
        self.state().is_executing()
    }
}

impl<S: Send + Sync + 'static> Command for DeferredCommand<S> {
    fn inversed(&self) -> Arc<dyn Command> {
        Arc::new(DeferredRestore {
            effect: self.effect.clone(),
            queue: self.queue.clone(),
            forward: Arc::clone(&self.run),
            id: InvocationId::next(),
            lifecycle: Lifecycle::new(),
        })
    }

    fn as_cancelable(&self) -> Option<&dyn Cancelable> {
        Some(self)
    }
}

impl<S> fmt::Debug for DeferredCommand<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredCommand")
            .field("label", &self.effect.label)
            .field("id", &self.id)
            .field("state", &self.run.lifecycle.get())
            .finish_non_exhaustive()
    }
}

/// Inverse of a [`DeferredCommand`]: restores the forward run's snapshot.
///
/// Runs synchronously. See the module docs for the exact sequence.
pub struct DeferredRestore<S> {
    effect: DeferredEffect<S>,
    queue: WorkQueueHandle,
    forward: Arc<Run<S>>,
    id: InvocationId,
    lifecycle: Lifecycle,
}

impl<S: Send + Sync + 'static> DeferredRestore<S> {
    /// Whether the forward run ended up canceled.
    #[must_use]
    pub fn forward_canceled(&self) -> bool {
        self.forward.lifecycle.get() == State::Canceled
    }
}

impl<S: Send + Sync + 'static> Invokeable for DeferredRestore<S> {
    fn invoke(&self) {
        if !self.lifecycle.start(self.type_name()) {
            return;
        }
        self.forward.cancel(&self.effect.label);

        if self.forward_canceled() {
            tracing::debug!(
                target: "commander.deferred",
                label = %self.effect.label,
                "forward effect never ran; nothing to restore"
            );
        } else {
            self.forward.wait_settled();
            if let Some(snapshot) = self.forward.snapshot.get() {
                (self.effect.restore)(snapshot);
            }
        }
        self.lifecycle.finish();
    }

    fn state(&self) -> State {
        self.lifecycle.get()
    }

    fn forbid(&self) -> bool {
        self.lifecycle.forbid()
    }

    fn describe(&self) -> Description {
        Description::new(self.type_name(), self.state())
            .with_id(Some(self.id))
            .field("label", &self.effect.label)
    }

    fn id(&self) -> Option<InvocationId> {
        Some(self.id)
    }

    fn type_name(&self) -> &'static str {
        "DeferredRestore"
    }
}

impl<S: Send + Sync + 'static> Command for DeferredRestore<S> {
    /// A fresh forward run with the same closures.
    fn inversed(&self) -> Arc<dyn Command> {
        Arc::new(DeferredCommand::new(self.effect.clone(), self.queue.clone()))
    }
}

impl<S> fmt::Debug for DeferredRestore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredRestore")
            .field("label", &self.effect.label)
            .field("id", &self.id)
            .field("state", &self.lifecycle.get())
            .finish_non_exhaustive()
    }
}
