//! Descriptors with their routines resolved.

use super::{BindingDescriptor, ReturnDefaultPolicy};
use crate::handler::{CleanupThunk, HandlerThunk};

/// What a matching binding does after logging.
#[derive(Clone)]
pub enum BindingAction {
    /// Re-raise the original failure.
    LogOnly,
    /// Substitute a default result.
    ReturnDefault(ReturnDefaultPolicy),
    /// Ask a handler for a flow decision.
    Handler(HandlerThunk),
}

impl std::fmt::Debug for BindingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingAction::LogOnly => f.write_str("LogOnly"),
            BindingAction::ReturnDefault(policy) => write!(f, "ReturnDefault({policy:?})"),
            BindingAction::Handler(thunk) => write!(f, "Handler({})", thunk.routine()),
        }
    }
}

/// A binding ready for dispatch.
#[derive(Clone, Debug)]
pub struct ResolvedBinding {
    descriptor: BindingDescriptor,
    action: BindingAction,
    cleanup: Option<CleanupThunk>,
    log_targets: Vec<(String, usize)>,
}

impl ResolvedBinding {
    pub(crate) fn new(
        descriptor: BindingDescriptor,
        action: BindingAction,
        cleanup: Option<CleanupThunk>,
        log_targets: Vec<(String, usize)>,
    ) -> Self {
        Self {
            descriptor,
            action,
            cleanup,
            log_targets,
        }
    }

    /// The declared descriptor.
    #[inline]
    pub fn descriptor(&self) -> &BindingDescriptor {
        &self.descriptor
    }

    /// Resolved response.
    #[inline]
    pub fn action(&self) -> &BindingAction {
        &self.action
    }

    /// Resolved cleanup routine, if declared.
    #[inline]
    pub fn cleanup(&self) -> Option<&CleanupThunk> {
        self.cleanup.as_ref()
    }

    /// Log targets as (parameter name, argument position).
    #[inline]
    pub fn log_targets(&self) -> &[(String, usize)] {
        &self.log_targets
    }
}
