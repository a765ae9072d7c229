#![forbid(unsafe_code)]

use std::fmt;

/// Errors returned by [`UndoManager`](super::UndoManager) batch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    /// Fewer commands recorded than requested.
    UndoUnavailable { requested: usize, available: usize },
    /// Fewer undone commands than requested.
    RedoUnavailable { requested: usize, available: usize },
}

impl HistoryError {
    /// Number of entries the caller asked for.
    #[must_use]
    pub const fn requested(&self) -> usize {
        match self {
            Self::UndoUnavailable { requested, .. } | Self::RedoUnavailable { requested, .. } => {
                *requested
            }
        }
    }

    /// Number of entries that were available.
    #[must_use]
    pub const fn available(&self) -> usize {
        match self {
            Self::UndoUnavailable { available, .. } | Self::RedoUnavailable { available, .. } => {
                *available
            }
        }
    }
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UndoUnavailable {
                requested,
                available,
            } => write!(
                f,
                "cannot undo {requested} command(s): {available} available"
            ),
            Self::RedoUnavailable {
                requested,
                available,
            } => write!(
                f,
                "cannot redo {requested} command(s): {available} available"
            ),
        }
    }
}

impl std::error::Error for HistoryError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_counts() {
        let err = HistoryError::UndoUnavailable {
            requested: 3,
            available: 1,
        };
        assert_eq!(err.to_string(), "cannot undo 3 command(s): 1 available");
        assert_eq!(err.requested(), 3);
        assert_eq!(err.available(), 1);

        let err = HistoryError::RedoUnavailable {
            requested: 1,
            available: 0,
        };
        assert_eq!(err.to_string(), "cannot redo 1 command(s): 0 available");
    }
}
