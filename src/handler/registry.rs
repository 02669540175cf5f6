//! Routine registry for resolving handlers and cleanups by identity.
//!
//! The registry maps [`RoutineId`]s (target type + routine name) to handler and
//! cleanup implementations. Bindings refer to routines by identity only; the
//! invocation cache looks them up here the first time a call site is resolved.
//!
//! # Example
//!
//! ```
//! use catchwire::binding::RoutineId;
//! use catchwire::failure::Failure;
//! use catchwire::handler::{FlowDecision, RoutineRegistry};
//!
//! let mut registry = RoutineRegistry::new();
//!
//! registry.register_handler("OrderHandlers", "on_validation", |_f: Failure, (id,): (u64,)| async move {
//!     Ok(FlowDecision::returning(id as i64))
//! });
//! registry.register_cleanup("OrderHandlers", "release", |(_id,): (u64,)| async { Ok(()) });
//!
//! assert!(registry.handler(&RoutineId::new("OrderHandlers", "on_validation")).is_some());
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use super::{
    Cleanup, CleanupResult, FailureHandler, Handler, HandlerResult, ReceiverHandler, TypedCleanup,
    TypedHandler,
};
use crate::binding::RoutineId;
use crate::context::Receiver;
use crate::failure::Failure;
use crate::value::ArgList;

/// Registry mapping routine identities to handlers and cleanups.
#[derive(Default)]
pub struct RoutineRegistry {
    /// Handlers by identity.
    handlers: HashMap<RoutineId, Arc<dyn Handler>>,
    /// Cleanups by identity.
    cleanups: HashMap<RoutineId, Arc<dyn Cleanup>>,
}

impl RoutineRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler taking the failure and the call's arguments.
    ///
    /// # Arguments
    ///
    /// * `target` - Target type name
    /// * `name` - Routine name
    /// * `handler` - Function of `(Failure, A)` returning a flow decision
    pub fn register_handler<F, A, Fut>(&mut self, target: &str, name: &str, handler: F)
    where
        F: Fn(Failure, A) -> Fut + Send + Sync + 'static,
        A: ArgList,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.insert_handler(RoutineId::new(target, name), Arc::new(TypedHandler::new(handler)));
    }

    /// Register a handler that also takes the guarded call's owning instance.
    pub fn register_receiver_handler<F, A, Fut>(&mut self, target: &str, name: &str, handler: F)
    where
        F: Fn(Option<Receiver>, Failure, A) -> Fut + Send + Sync + 'static,
        A: ArgList,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.insert_handler(RoutineId::new(target, name), Arc::new(ReceiverHandler::new(handler)));
    }

    /// Register a handler taking only the failure.
    pub fn register_failure_handler<F, Fut>(&mut self, target: &str, name: &str, handler: F)
    where
        F: Fn(Failure) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.insert_handler(RoutineId::new(target, name), Arc::new(FailureHandler::new(handler)));
    }

    /// Register a cleanup taking the call's arguments.
    pub fn register_cleanup<F, A, Fut>(&mut self, target: &str, name: &str, cleanup: F)
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        A: ArgList,
        Fut: Future<Output = CleanupResult> + Send + 'static,
    {
        self.insert_cleanup(RoutineId::new(target, name), Arc::new(TypedCleanup::new(cleanup)));
    }

    /// Register a custom [`Handler`] implementation.
    pub fn insert_handler(&mut self, routine: RoutineId, handler: Arc<dyn Handler>) {
        if self.handlers.insert(routine.clone(), handler).is_some() {
            tracing::warn!(%routine, "handler re-registered, previous one replaced");
        }
    }

    /// Register a custom [`Cleanup`] implementation.
    pub fn insert_cleanup(&mut self, routine: RoutineId, cleanup: Arc<dyn Cleanup>) {
        if self.cleanups.insert(routine.clone(), cleanup).is_some() {
            tracing::warn!(%routine, "cleanup re-registered, previous one replaced");
        }
    }

    /// Get a handler by identity.
    pub fn handler(&self, routine: &RoutineId) -> Option<Arc<dyn Handler>> {
        self.handlers.get(routine).cloned()
    }

    /// Get a cleanup by identity.
    pub fn cleanup(&self, routine: &RoutineId) -> Option<Arc<dyn Cleanup>> {
        self.cleanups.get(routine).cloned()
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Number of registered cleanups.
    pub fn cleanup_count(&self) -> usize {
        self.cleanups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::FlowDecision;
    use crate::value::TypeKey;

    #[test]
    fn test_register_handler() {
        let mut registry = RoutineRegistry::new();

        registry.register_handler("Orders", "on_error", |_f: Failure, (_id,): (u64,)| async {
            Ok(FlowDecision::handled())
        });

        let handler = registry.handler(&RoutineId::new("Orders", "on_error")).unwrap();
        assert!(!handler.shape().is_exception_only());
        assert_eq!(handler.shape().params(), &[TypeKey::of::<u64>()]);
        assert_eq!(registry.handler_count(), 1);
    }

    #[test]
    fn test_register_failure_handler() {
        let mut registry = RoutineRegistry::new();

        registry.register_failure_handler("Orders", "log", |_f: Failure| async {
            Ok(FlowDecision::Rethrow)
        });

        let handler = registry.handler(&RoutineId::new("Orders", "log")).unwrap();
        assert!(handler.shape().is_exception_only());
    }

    #[test]
    fn test_register_receiver_handler() {
        let mut registry = RoutineRegistry::new();

        registry.register_receiver_handler(
            "Orders",
            "with_self",
            |_r: Option<Receiver>, _f: Failure, (_id,): (u64,)| async { Ok(FlowDecision::Rethrow) },
        );

        let handler = registry.handler(&RoutineId::new("Orders", "with_self")).unwrap();
        assert!(!handler.shape().is_exception_only());
        assert_eq!(handler.shape().params(), &[TypeKey::of::<u64>()]);
    }

    #[test]
    fn test_register_cleanup() {
        let mut registry = RoutineRegistry::new();

        registry.register_cleanup("Orders", "release", |(): ()| async { Ok(()) });

        assert!(registry.cleanup(&RoutineId::new("Orders", "release")).is_some());
        assert_eq!(registry.cleanup_count(), 1);
        assert_eq!(registry.handler_count(), 0);
    }

    #[test]
    fn test_handlers_and_cleanups_are_separate() {
        let mut registry = RoutineRegistry::new();

        registry.register_cleanup("Orders", "same", |(): ()| async { Ok(()) });

        assert!(registry.handler(&RoutineId::new("Orders", "same")).is_none());
        assert!(registry.cleanup(&RoutineId::new("Orders", "same")).is_some());
    }

    #[test]
    fn test_routine_not_found() {
        let registry = RoutineRegistry::new();

        assert!(registry.handler(&RoutineId::new("Nope", "missing")).is_none());
        assert!(registry.cleanup(&RoutineId::new("Nope", "missing")).is_none());
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut registry = RoutineRegistry::new();

        registry.register_failure_handler("Orders", "h", |_f: Failure| async {
            Ok(FlowDecision::Rethrow)
        });
        registry.register_handler("Orders", "h", |_f: Failure, (): ()| async {
            Ok(FlowDecision::Continue)
        });

        assert_eq!(registry.handler_count(), 1);
        let handler = registry.handler(&RoutineId::new("Orders", "h")).unwrap();
        assert!(!handler.shape().is_exception_only());
    }
}
