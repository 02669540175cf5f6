//! Error types for catchwire.

use thiserror::Error;

use crate::binding::RoutineId;
use crate::context::CallSiteId;
use crate::failure::Failure;

/// Main error type for all dispatch operations.
///
/// Only [`InterceptError::Guarded`] carries a failure of the guarded call; every
/// other variant is a configuration or programming defect and is never
/// suppressed by a binding.
#[derive(Debug, Error)]
pub enum InterceptError {
    /// The guarded call failed and no binding suppressed it (or a binding
    /// replaced it with another failure).
    #[error("guarded call failed: {0}")]
    Guarded(Failure),

    /// A binding references a routine that is not registered.
    #[error("routine {routine} referenced at {site} is not registered")]
    HandlerNotFound {
        /// Call site whose binding referenced the routine.
        site: CallSiteId,
        /// The unresolved routine.
        routine: RoutineId,
    },

    /// A routine's parameters do not match the guarded call's parameters.
    #[error("routine {routine} does not fit {site}: expected {expected}, found {found}")]
    SignatureMismatch {
        /// Call site the routine was bound to.
        site: CallSiteId,
        /// The mismatched routine.
        routine: RoutineId,
        /// Parameter list of the call site.
        expected: String,
        /// Parameter list of the routine.
        found: String,
    },

    /// A decision payload does not match the guarded call's declared result.
    #[error("return type mismatch: expected {expected}, got {actual}")]
    ReturnTypeMismatch {
        /// Declared type.
        expected: String,
        /// Type actually supplied.
        actual: String,
    },

    /// A handler or cleanup routine itself failed.
    #[error("routine {routine} failed: {source}")]
    HandlerExecution {
        /// The failing routine.
        routine: RoutineId,
        /// What it raised.
        #[source]
        source: Failure,
    },

    /// A declared binding is malformed.
    #[error("invalid binding: {0}")]
    InvalidBinding(String),

    /// Binding table could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl InterceptError {
    /// The propagated guarded-call failure, if this is one.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            InterceptError::Guarded(failure) => Some(failure),
            _ => None,
        }
    }

    /// Consume into the propagated guarded-call failure, if this is one.
    pub fn into_failure(self) -> Option<Failure> {
        match self {
            InterceptError::Guarded(failure) => Some(failure),
            _ => None,
        }
    }

    /// Returns true for configuration and programming defects.
    pub fn is_defect(&self) -> bool {
        !matches!(self, InterceptError::Guarded(_))
    }
}

/// Result type alias using InterceptError.
pub type Result<T> = std::result::Result<T, InterceptError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::categories;

    #[test]
    fn test_guarded_accessors() {
        let failure = Failure::new(&categories::FAILURE, "boom");
        let err = InterceptError::Guarded(failure.clone());

        assert!(!err.is_defect());
        assert!(err.failure().unwrap().ptr_eq(&failure));
        assert!(err.into_failure().unwrap().ptr_eq(&failure));
    }

    #[test]
    fn test_defects() {
        let err = InterceptError::HandlerNotFound {
            site: CallSiteId::new("Orders", "place"),
            routine: RoutineId::new("Handlers", "missing"),
        };
        assert!(err.is_defect());
        assert!(err.failure().is_none());
        assert_eq!(
            err.to_string(),
            "routine Handlers.missing referenced at Orders::place is not registered"
        );
    }

    #[test]
    fn test_execution_source_chain() {
        use std::error::Error as _;

        let err = InterceptError::HandlerExecution {
            routine: RoutineId::new("Handlers", "h"),
            source: Failure::new(&categories::FAILURE, "inner"),
        };
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("Failure: inner"));
    }
}
