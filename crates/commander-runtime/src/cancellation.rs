#![forbid(unsafe_code)]

//! One-shot cancellation signal shared between a deferred command and the
//! work queue task that runs its effect.
//!
//! The task consults its [`CancellationToken`] exactly once, when it begins.
//! Cancelling before that moment always suppresses the effect; cancelling
//! afterwards has no effect on the running task.
//!
//! ```
//! use commander_runtime::cancellation::CancellationSource;
//!
//! let source = CancellationSource::new();
//! let token = source.token();
//! assert!(source.cancel());
//! assert!(!source.cancel(), "only the first cancel reports true");
//! assert!(token.is_cancelled());
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Read side of a cancellation signal. Cheap to clone and `Send`.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

/// Control side of a cancellation signal.
///
/// Dropping the source does **not** cancel its tokens.
pub struct CancellationSource {
    cancelled: Arc<AtomicBool>,
}

impl CancellationSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A token observing this source.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// Request cancellation. Returns `true` for the call that flipped the
    /// signal, `false` if it was already cancelled.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationSource")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancellationToken {
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn token_starts_uncancelled() {
        let source = CancellationSource::new();
        let token = source.token();
        assert!(!token.is_cancelled());
        assert!(!source.is_cancelled());
    }

    #[test]
    fn cancel_reaches_every_token() {
        let source = CancellationSource::new();
        let t1 = source.token();
        let t2 = t1.clone();
        assert!(source.cancel());
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
    }

    #[test]
    fn only_first_cancel_reports_true() {
        let source = CancellationSource::default();
        assert!(source.cancel());
        assert!(!source.cancel());
        assert!(source.is_cancelled());
    }

    #[test]
    fn drop_source_does_not_cancel() {
        let source = CancellationSource::new();
        let token = source.token();
        drop(source);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn token_observes_cancel_from_another_thread() {
        let source = CancellationSource::new();
        let token = source.token();
        thread::spawn(move || source.cancel()).join().unwrap();
        assert!(token.is_cancelled());
    }
}
