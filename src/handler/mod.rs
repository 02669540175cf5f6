//! Handler module - routines that decide and clean up after failures.
//!
//! Provides:
//! - [`Handler`] / [`Cleanup`] - uniform routine shapes the engine invokes
//! - [`TypedHandler`], [`ReceiverHandler`], [`FailureHandler`], [`TypedCleanup`] - closure adapters
//! - [`HandlerThunk`] / [`CleanupThunk`] - cached, shape-checked callables
//! - [`FlowDecision`] - what a handler wants done with a failure
//! - [`RoutineRegistry`] - maps routine identities to implementations
//!
//! # Example
//!
//! ```
//! use catchwire::failure::Failure;
//! use catchwire::handler::{FlowDecision, RoutineRegistry};
//!
//! let mut registry = RoutineRegistry::new();
//!
//! // Full shape: failure followed by the guarded call's arguments
//! registry.register_handler("Orders", "on_stock", |_f: Failure, (qty,): (u32,)| async move {
//!     if qty > 100 {
//!         Ok(FlowDecision::Continue)
//!     } else {
//!         Ok(FlowDecision::returning(0i64))
//!     }
//! });
//!
//! // Exception-only shape
//! registry.register_failure_handler("Orders", "rethrow", |_f: Failure| async {
//!     Ok(FlowDecision::Rethrow)
//! });
//! ```

mod cleanup;
mod decision;
mod invoker;
mod registry;

pub use cleanup::{Cleanup, CleanupResult, CleanupThunk, TypedCleanup};
pub use decision::{FlowDecision, Strategy};
pub use invoker::{
    BoxFuture, FailureHandler, Handler, HandlerInput, HandlerResult, HandlerThunk, ReceiverHandler,
    RoutineShape, TypedHandler,
};
pub use registry::RoutineRegistry;
