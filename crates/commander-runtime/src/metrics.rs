#![forbid(unsafe_code)]

//! Process-wide dispatch counters.
//!
//! Counters are monotonic and shared by every dispatcher in the process.
//! History itself is never global; only these totals are.

use std::sync::atomic::{AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// Monotonic counters
// ---------------------------------------------------------------------------

static INVOCATIONS_DISPATCHED_TOTAL: AtomicU64 = AtomicU64::new(0);
static INVOCATIONS_FORBIDDEN_TOTAL: AtomicU64 = AtomicU64::new(0);
static DEFERRED_EFFECTS_CANCELED_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Invocations accepted by a validator and fanned out to handlers.
#[must_use]
pub fn invocations_dispatched_total() -> u64 {
    INVOCATIONS_DISPATCHED_TOTAL.load(Ordering::Relaxed)
}

/// Invocations rejected by a validator.
#[must_use]
pub fn invocations_forbidden_total() -> u64 {
    INVOCATIONS_FORBIDDEN_TOTAL.load(Ordering::Relaxed)
}

/// Deferred effects canceled before they started.
#[must_use]
pub fn deferred_effects_canceled_total() -> u64 {
    DEFERRED_EFFECTS_CANCELED_TOTAL.load(Ordering::Relaxed)
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub invocations_dispatched: u64,
    pub invocations_forbidden: u64,
    pub deferred_effects_canceled: u64,
}

impl MetricsSnapshot {
    #[must_use]
    pub fn capture() -> Self {
        Self {
            invocations_dispatched: invocations_dispatched_total(),
            invocations_forbidden: invocations_forbidden_total(),
            deferred_effects_canceled: deferred_effects_canceled_total(),
        }
    }

    /// Counter growth since `earlier`.
    #[must_use]
    pub fn since(&self, earlier: &Self) -> Self {
        Self {
            invocations_dispatched: self
                .invocations_dispatched
                .saturating_sub(earlier.invocations_dispatched),
            invocations_forbidden: self
                .invocations_forbidden
                .saturating_sub(earlier.invocations_forbidden),
            deferred_effects_canceled: self
                .deferred_effects_canceled
                .saturating_sub(earlier.deferred_effects_canceled),
        }
    }
}

pub(crate) fn record_dispatched() {
    INVOCATIONS_DISPATCHED_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_forbidden() {
    INVOCATIONS_FORBIDDEN_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_deferred_canceled() {
    DEFERRED_EFFECTS_CANCELED_TOTAL.fetch_add(1, Ordering::Relaxed);
}
