//! Handler routines and the thunks that invoke them.
//!
//! A handler is registered once as a typed closure. [`TypedHandler`],
//! [`ReceiverHandler`] and [`FailureHandler`] adapt it to the uniform [`Handler`] shape the engine
//! calls, and record its declared parameter list so a mismatch with the call
//! site surfaces when bindings are resolved rather than on every call.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use super::FlowDecision;
use crate::binding::RoutineId;
use crate::context::{Arguments, CallSite, Receiver};
use crate::error::{InterceptError, Result};
use crate::failure::{categories, Failure};
use crate::value::{ArgList, TypeKey};

/// Boxed future for routine results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result type for handler routines. `Err` means the handler itself failed.
pub type HandlerResult = std::result::Result<FlowDecision, Failure>;

/// Declared parameter shape of a routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineShape {
    exception_only: bool,
    params: Vec<TypeKey>,
}

impl RoutineShape {
    /// A routine taking only the failure.
    pub fn exception_only() -> Self {
        Self {
            exception_only: true,
            params: Vec::new(),
        }
    }

    /// A routine taking the call's arguments (after the failure, for handlers).
    pub fn with_params(params: Vec<TypeKey>) -> Self {
        Self {
            exception_only: false,
            params,
        }
    }

    /// Whether the routine takes only the failure.
    #[inline]
    pub fn is_exception_only(&self) -> bool {
        self.exception_only
    }

    /// Parameters matched against the call site.
    #[inline]
    pub fn params(&self) -> &[TypeKey] {
        &self.params
    }

    /// Check the parameter list against the call site.
    pub(crate) fn check(&self, routine: &RoutineId, site: &CallSite) -> Result<()> {
        if self.exception_only {
            return Ok(());
        }
        let expected = site.param_types();
        if expected != self.params {
            return Err(InterceptError::SignatureMismatch {
                site: site.id().clone(),
                routine: routine.clone(),
                expected: TypeKey::describe(&expected),
                found: TypeKey::describe(&self.params),
            });
        }
        Ok(())
    }
}

/// Everything a handler may look at.
#[derive(Debug, Clone)]
pub struct HandlerInput {
    /// Owning instance of the guarded call, if any.
    pub receiver: Option<Receiver>,
    /// Argument snapshot (empty for exception-only handlers).
    pub arguments: Arguments,
    /// The failure being handled.
    pub failure: Failure,
}

/// Trait for handler routines.
pub trait Handler: Send + Sync + 'static {
    /// Declared parameter shape.
    fn shape(&self) -> RoutineShape;

    /// Decide what to do with a failure.
    fn call(&self, input: HandlerInput) -> BoxFuture<'static, HandlerResult>;
}

fn argument_failure(expected: &[TypeKey], arguments: &Arguments) -> Failure {
    Failure::new(
        &categories::INVALID_ARGUMENTS,
        format!(
            "arguments {} do not fit parameters {}",
            TypeKey::describe(&arguments.types()),
            TypeKey::describe(expected)
        ),
    )
}

/// Wrapper that rebuilds typed arguments before calling the handler.
pub struct TypedHandler<F, A, Fut>
where
    F: Fn(Failure, A) -> Fut + Send + Sync + 'static,
    A: ArgList,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(A) -> Fut>,
}

impl<F, A, Fut> TypedHandler<F, A, Fut>
where
    F: Fn(Failure, A) -> Fut + Send + Sync + 'static,
    A: ArgList,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, A, Fut> Handler for TypedHandler<F, A, Fut>
where
    F: Fn(Failure, A) -> Fut + Send + Sync + 'static,
    A: ArgList,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn shape(&self) -> RoutineShape {
        RoutineShape::with_params(A::param_types())
    }

    fn call(&self, input: HandlerInput) -> BoxFuture<'static, HandlerResult> {
        let args = match A::from_values(input.arguments.as_slice()) {
            Some(args) => args,
            None => {
                let failure = argument_failure(&A::param_types(), &input.arguments);
                return Box::pin(async move { Err(failure) });
            }
        };

        Box::pin((self.handler)(input.failure, args))
    }
}

/// Wrapper for handlers that also take the guarded call's owning instance.
///
/// The receiver is `None` for free-standing call sites.
pub struct ReceiverHandler<F, A, Fut>
where
    F: Fn(Option<Receiver>, Failure, A) -> Fut + Send + Sync + 'static,
    A: ArgList,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(A) -> Fut>,
}

impl<F, A, Fut> ReceiverHandler<F, A, Fut>
where
    F: Fn(Option<Receiver>, Failure, A) -> Fut + Send + Sync + 'static,
    A: ArgList,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Create a new receiver-aware handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, A, Fut> Handler for ReceiverHandler<F, A, Fut>
where
    F: Fn(Option<Receiver>, Failure, A) -> Fut + Send + Sync + 'static,
    A: ArgList,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn shape(&self) -> RoutineShape {
        RoutineShape::with_params(A::param_types())
    }

    fn call(&self, input: HandlerInput) -> BoxFuture<'static, HandlerResult> {
        let Some(args) = A::from_values(input.arguments.as_slice()) else {
            let failure = argument_failure(&A::param_types(), &input.arguments);
            return Box::pin(async move { Err(failure) });
        };

        Box::pin((self.handler)(input.receiver, input.failure, args))
    }
}

/// Wrapper for handlers that take only the failure.
pub struct FailureHandler<F, Fut>
where
    F: Fn(Failure) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FailureHandler<F, Fut>
where
    F: Fn(Failure) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Create a new exception-only handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Handler for FailureHandler<F, Fut>
where
    F: Fn(Failure) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn shape(&self) -> RoutineShape {
        RoutineShape::exception_only()
    }

    fn call(&self, input: HandlerInput) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(input.failure))
    }
}

/// Cached callable adapter for one handler routine.
#[derive(Clone)]
pub struct HandlerThunk {
    routine: RoutineId,
    shape: RoutineShape,
    handler: Arc<dyn Handler>,
}

impl HandlerThunk {
    /// Build a thunk, reading the handler's shape once.
    pub fn build(routine: RoutineId, handler: Arc<dyn Handler>) -> Self {
        let shape = handler.shape();
        Self {
            routine,
            shape,
            handler,
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

    /// True when the routine takes exactly one failure parameter.
    #[inline]
    pub fn exception_only_shape(&self) -> bool {
        self.shape.is_exception_only()
    }

    /// Check this handler can serve `site`.
    ///
    /// # Errors
    ///
    /// Returns `SignatureMismatch` if the parameter lists differ.
    pub fn check_against(&self, site: &CallSite) -> Result<()> {
        self.shape.check(&self.routine, site)
    }

    /// Invoke the handler. Handler failures become `HandlerExecution`.
    pub fn invoke(
        &self,
        receiver: Option<Receiver>,
        arguments: Arguments,
        failure: Failure,
    ) -> BoxFuture<'static, Result<FlowDecision>> {
        let arguments = if self.exception_only_shape() {
            Arguments::empty()
        } else {
            arguments
        };
        let fut = self.handler.call(HandlerInput {
            receiver,
            arguments,
            failure,
        });
        let routine = self.routine.clone();

        Box::pin(async move {
            fut.await
                .map_err(|source| InterceptError::HandlerExecution { routine, source })
        })
    }
}

impl std::fmt::Debug for HandlerThunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerThunk")
            .field("routine", &self.routine)
            .field("shape", &self.shape)
            .finish()
    }
}
