#![forbid(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::fmt;
use std::io::Write;

use crate::config::LoggingConfig;
use crate::handler::InvokeableHandler;
use crate::invokeable::Invocation;

/// Writes one description per dispatched invocation.
///
/// Each entry goes to the optional text sink as `describe()` plus a newline
/// and, unless disabled in [`LoggingConfig`], to `tracing` as a debug event
/// under the `commander.log` target.
pub struct InvokeableLogger {
    sink: RefCell<Option<Box<dyn Write>>>,
    emit_tracing: bool,
    enabled: Cell<bool>,
}

impl InvokeableLogger {
    /// A logger that only emits tracing events.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sink: RefCell::new(None),
            emit_tracing: true,
            enabled: Cell::new(true),
        }
    }

    /// A logger writing to `sink`.
    #[must_use]
    pub fn with_sink(sink: impl Write + 'static) -> Self {
        let logger = Self::new();
        logger.set_sink(sink);
        logger
    }

    #[must_use]
    pub fn from_config(config: &LoggingConfig) -> Self {
        Self {
            emit_tracing: config.emit_tracing,
            ..Self::new()
        }
    }

    /// Replace the text sink.
    pub fn set_sink(&self, sink: impl Write + 'static) {
        *self.sink.borrow_mut() = Some(Box::new(sink));
    }

    fn write_line(&self, line: &str) {
        let mut sink = self.sink.borrow_mut();
        let Some(writer) = sink.as_mut() else {
            return;
        };
        if let Err(err) = writeln!(writer, "{line}").and_then(|()| writer.flush()) {
            tracing::warn!(target: "commander.log", error = %err, "failed to write log entry");
        }
    }
}

impl Default for InvokeableLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl InvokeableHandler for InvokeableLogger {
    fn name(&self) -> &'static str {
        "logger"
    }

    fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    fn handle_invokeable(&self, invocation: &Invocation) {
        let description = invocation.describe().to_string();
        if self.emit_tracing {
            tracing::debug!(
                target: "commander.log",
                kind = invocation.kind(),
                item = invocation.type_name(),
                "{description}"
            );
        }
        self.write_line(&description);
    }
}

impl fmt::Debug for InvokeableLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvokeableLogger")
            .field("has_sink", &self.sink.borrow().is_some())
            .field("emit_tracing", &self.emit_tracing)
            .field("enabled", &self.enabled.get())
            .finish()
    }
}
