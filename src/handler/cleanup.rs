//! Cleanup routines.
//!
//! Cleanups receive the guarded call's argument snapshot and return nothing.
//! They share the handler's construction rule, minus the failure parameter.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use super::invoker::{BoxFuture, RoutineShape};
use crate::binding::RoutineId;
use crate::context::{Arguments, CallSite};
use crate::error::{InterceptError, Result};
use crate::failure::{categories, Failure};
use crate::value::{ArgList, TypeKey};

/// Result type for cleanup routines.
pub type CleanupResult = std::result::Result<(), Failure>;

/// Trait for cleanup routines.
pub trait Cleanup: Send + Sync + 'static {
    /// Declared parameter shape.
    fn shape(&self) -> RoutineShape;

    /// Run the cleanup.
    fn call(&self, arguments: Arguments) -> BoxFuture<'static, CleanupResult>;
}

/// Wrapper that rebuilds typed arguments before running the cleanup.
pub struct TypedCleanup<F, A, Fut>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    A: ArgList,
    Fut: Future<Output = CleanupResult> + Send + 'static,
{
    cleanup: F,
    _phantom: PhantomData<fn(A) -> Fut>,
}

impl<F, A, Fut> TypedCleanup<F, A, Fut>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    A: ArgList,
    Fut: Future<Output = CleanupResult> + Send + 'static,
{
    /// Create a new typed cleanup.
    pub fn new(cleanup: F) -> Self {
        Self {
            cleanup,
            _phantom: PhantomData,
        }
    }
}

impl<F, A, Fut> Cleanup for TypedCleanup<F, A, Fut>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    A: ArgList,
    Fut: Future<Output = CleanupResult> + Send + 'static,
{
    fn shape(&self) -> RoutineShape {
        RoutineShape::with_params(A::param_types())
    }

    fn call(&self, arguments: Arguments) -> BoxFuture<'static, CleanupResult> {
        match A::from_values(arguments.as_slice()) {
            Some(args) => Box::pin((self.cleanup)(args)),
            None => {
                let failure = Failure::new(
                    &categories::INVALID_ARGUMENTS,
                    format!(
                        "arguments {} do not fit cleanup parameters {}",
                        TypeKey::describe(&arguments.types()),
                        TypeKey::describe(&A::param_types())
                    ),
                );
                Box::pin(async move { Err(failure) })
            }
        }
    }
}

/// Cached callable adapter for one cleanup routine.
#[derive(Clone)]
pub struct CleanupThunk {
    routine: RoutineId,
    shape: RoutineShape,
    cleanup: Arc<dyn Cleanup>,
}

impl CleanupThunk {
    /// Build a thunk, reading the cleanup's shape once.
    pub fn build(routine: RoutineId, cleanup: Arc<dyn Cleanup>) -> Self {
        let shape = cleanup.shape();
        Self {
            routine,
            shape,
            cleanup,
        }
    }

    /// Routine identity.
    #[inline]
    pub fn routine(&self) -> &RoutineId {
        &self.routine
    }

    /// Declared shape.
    #[inline]
    pub fn shape(&self) -> &RoutineShape {
        &self.shape
    }

    /// Check this cleanup can serve `site`.
    ///
    /// # Errors
    ///
    /// Returns `SignatureMismatch` if the parameter lists differ.
    pub fn check_against(&self, site: &CallSite) -> Result<()> {
        self.shape.check(&self.routine, site)
    }

    /// Run the cleanup. Cleanup failures become `HandlerExecution`.
    pub fn invoke(&self, arguments: Arguments) -> BoxFuture<'static, Result<()>> {
        let fut = self.cleanup.call(arguments);
        let routine = self.routine.clone();

        Box::pin(async move {
            fut.await
                .map_err(|source| InterceptError::HandlerExecution { routine, source })
        })
    }
}

impl std::fmt::Debug for CleanupThunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupThunk")
            .field("routine", &self.routine)
            .field("shape", &self.shape)
            .finish()
    }
}
