//! Flow decisions returned by handler routines.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{InterceptError, Result};
use crate::failure::Failure;
use crate::value::Value;

/// The kind of a [`FlowDecision`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Re-raise the original failure.
    Rethrow,
    /// Not handled here; try the next binding.
    Continue,
    /// Handled; optionally substitute a result.
    Return,
    /// Replace the failure with another one.
    Throw,
    /// No explicit choice; treated as `Rethrow`.
    DefaultUnspecified,
}

/// What a handler decided to do with a failure.
#[derive(Debug, Clone, Default)]
pub enum FlowDecision {
    /// Re-raise the original failure.
    Rethrow,
    /// Not handled here; try the next binding.
    Continue,
    /// Handled. `None` leaves the result untouched; `Some` must match the
    /// guarded call's declared result type.
    Return(Option<Value>),
    /// Raise this failure instead of the original.
    Throw(Failure),
    /// No explicit choice; treated as `Rethrow`.
    #[default]
    DefaultUnspecified,
}

impl FlowDecision {
    /// Handled, no result override.
    pub fn handled() -> Self {
        FlowDecision::Return(None)
    }

    /// Handled, substituting `value` as the result.
    pub fn returning<T>(value: T) -> Self
    where
        T: Any + Send + Sync + fmt::Debug,
    {
        FlowDecision::Return(Some(Value::new(value)))
    }

    /// Build a decision from a strategy and a dynamic payload.
    ///
    /// `Throw` requires the payload to hold a [`Failure`]; the payload is
    /// ignored for strategies that carry none.
    ///
    /// # Errors
    ///
    /// Returns `ReturnTypeMismatch` if `Throw` is given a missing or non-failure payload.
    pub fn from_parts(strategy: Strategy, payload: Option<Value>) -> Result<Self> {
        match strategy {
            Strategy::Rethrow => Ok(FlowDecision::Rethrow),
            Strategy::Continue => Ok(FlowDecision::Continue),
            Strategy::DefaultUnspecified => Ok(FlowDecision::DefaultUnspecified),
            Strategy::Return => Ok(FlowDecision::Return(payload)),
            Strategy::Throw => match payload.as_ref().and_then(Value::downcast::<Failure>) {
                Some(failure) => Ok(FlowDecision::Throw(failure)),
                None => Err(InterceptError::ReturnTypeMismatch {
                    expected: std::any::type_name::<Failure>().to_string(),
                    actual: payload
                        .map(|p| p.type_key().name().to_string())
                        .unwrap_or_else(|| "none".to_string()),
                }),
            },
        }
    }

    /// Strategy of this decision.
    pub fn strategy(&self) -> Strategy {
        match self {
            FlowDecision::Rethrow => Strategy::Rethrow,
            FlowDecision::Continue => Strategy::Continue,
            FlowDecision::Return(_) => Strategy::Return,
            FlowDecision::Throw(_) => Strategy::Throw,
            FlowDecision::DefaultUnspecified => Strategy::DefaultUnspecified,
        }
    }
}
