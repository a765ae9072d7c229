#![forbid(unsafe_code)]

//! Gates deciding whether an invocation may be dispatched.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::invokeable::Invocation;

/// A pure predicate over invocations.
///
/// `validate` must not change the invocation's state; the dispatcher marks
/// rejected items as forbidden itself.
pub trait Validator {
    fn validate(&self, invocation: &Invocation) -> bool;
}

impl<F> Validator for F
where
    F: Fn(&Invocation) -> bool + Send + Sync,
{
    fn validate(&self, invocation: &Invocation) -> bool {
        self(invocation)
    }
}

/// Accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Validator for AllowAll {
    fn validate(&self, _invocation: &Invocation) -> bool {
        true
    }
}

/// Oracle deciding whether editing is currently allowed.
pub trait EditPermission {
    fn can_edit(&self) -> bool;
}

/// Application-wide editing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditMode {
    ReadOnly,
    #[default]
    Full,
}

impl EditPermission for EditMode {
    fn can_edit(&self) -> bool {
        matches!(self, Self::Full)
    }
}

/// An [`EditMode`] that can be flipped at runtime while a validator holds it.
#[derive(Debug, Clone, Default)]
pub struct SharedEditMode {
    read_only: Arc<AtomicBool>,
}

impl SharedEditMode {
    #[must_use]
    pub fn new(mode: EditMode) -> Self {
        let shared = Self::default();
        shared.set(mode);
        shared
    }

    pub fn set(&self, mode: EditMode) {
        self.read_only
            .store(mode == EditMode::ReadOnly, Ordering::Release);
    }

    #[must_use]
    pub fn get(&self) -> EditMode {
        if self.read_only.load(Ordering::Acquire) {
            EditMode::ReadOnly
        } else {
            EditMode::Full
        }
    }
}

impl EditPermission for SharedEditMode {
    fn can_edit(&self) -> bool {
        self.get().can_edit()
    }
}

/// Queries always pass; mutating commands pass iff the oracle allows
/// editing.
pub struct PermissionValidator<P> {
    permission: P,
}

impl<P: EditPermission> PermissionValidator<P> {
    pub fn new(permission: P) -> Self {
        Self { permission }
    }

    pub fn permission(&self) -> &P {
        &self.permission
    }
}

impl<P: EditPermission> Validator for PermissionValidator<P> {
    fn validate(&self, invocation: &Invocation) -> bool {
        !invocation.is_mutating() || self.permission.can_edit()
    }
}

impl<P: fmt::Debug> fmt::Debug for PermissionValidator<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionValidator")
            .field("permission", &self.permission)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::BlockCommand;
    use crate::query::BlockQuery;

    fn command() -> Invocation {
        Invocation::from(Arc::new(BlockCommand::new(|| {}, || {})))
    }

    fn query() -> Invocation {
        Invocation::query(Arc::new(BlockQuery::new(|| {})))
    }

    #[test]
    fn read_only_rejects_commands_but_not_queries() {
        let validator = PermissionValidator::new(EditMode::ReadOnly);
        assert!(!validator.validate(&command()));
        assert!(validator.validate(&query()));
    }

    #[test]
    fn full_mode_accepts_everything() {
        let validator = PermissionValidator::new(EditMode::Full);
        assert!(validator.validate(&command()));
        assert!(validator.validate(&query()));
    }

    #[test]
    fn non_mutating_commands_pass_read_only() {
        let validator = PermissionValidator::new(EditMode::ReadOnly);
        let passive = Invocation::from(Arc::new(BlockCommand::new(|| {}, || {}).with_mutating(false)));
        assert!(validator.validate(&passive));
    }

    #[test]
    fn validation_has_no_side_effects() {
        let validator = PermissionValidator::new(EditMode::ReadOnly);
        let invocation = command();
        validator.validate(&invocation);
        assert!(invocation.state().is_ready());
    }

    #[test]
    fn shared_mode_flips_at_runtime() {
        let mode = SharedEditMode::new(EditMode::Full);
        let validator = PermissionValidator::new(mode.clone());
        assert!(validator.validate(&command()));
        mode.set(EditMode::ReadOnly);
        assert!(!validator.validate(&command()));
        assert_eq!(validator.permission().get(), EditMode::ReadOnly);
    }

    #[test]
    fn closures_are_validators() {
        let only_queries = |invocation: &Invocation| invocation.kind() == "query";
        assert!(only_queries.validate(&query()));
        assert!(!only_queries.validate(&command()));
        assert!(AllowAll.validate(&command()));
    }
}
