//! Interceptor builder and entry point.
//!
//! The [`InterceptorBuilder`] collects binding sources, routines, diagnostics
//! sinks and engine policies. The built [`Interceptor`] is registered once
//! with the hosting framework and reused for every guarded call.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use catchwire::binding::BindingDescriptor;
//! use catchwire::context::{Arguments, CallSite};
//! use catchwire::failure::{categories, Category, Failure};
//! use catchwire::handler::FlowDecision;
//! use catchwire::Interceptor;
//!
//! static VALIDATION: Category = Category::child_of("Validation", &categories::FAILURE);
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let site = Arc::new(CallSite::new("Orders", "quote").returns::<i64>());
//!
//! let interceptor = Interceptor::builder()
//!     .bind(
//!         site.id().clone(),
//!         BindingDescriptor::on(&[&VALIDATION]).handler("OrderHandlers", "fallback"),
//!     )
//!     .failure_handler("OrderHandlers", "fallback", |_f: Failure| async {
//!         Ok(FlowDecision::returning(0i64))
//!     })
//!     .build();
//!
//! let quote = interceptor
//!     .call::<i64, _>(site, None, Arguments::empty(), async {
//!         Err(Failure::new(&VALIDATION, "unknown sku"))
//!     })
//!     .await
//!     .unwrap();
//! assert_eq!(quote, Some(0));
//! # });
//! ```

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::binding::{BindingDescriptor, BindingSource, ChainedBindings, StaticBindings};
use crate::cache::InvocationCache;
use crate::context::{Arguments, CallSite, CallSiteId, InvocationContext, Receiver};
use crate::diagnostics::{DiagnosticSink, DiagnosticsAdapter, TracingSink};
use crate::engine::{
    CleanupFailurePolicy, CompositePolicy, DispatchEngine, EngineConfig, HandlerIsolation,
};
use crate::error::{InterceptError, Result};
use crate::failure::Failure;
use crate::handler::{CleanupResult, HandlerResult, RoutineRegistry};
use crate::value::{ArgList, TypeKey, Value};

/// Builder for configuring and creating an [`Interceptor`].
pub struct InterceptorBuilder {
    sources: ChainedBindings,
    inline: StaticBindings,
    routines: RoutineRegistry,
    diagnostics: DiagnosticsAdapter,
    config: EngineConfig,
}

impl InterceptorBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            sources: ChainedBindings::new(),
            inline: StaticBindings::new(),
            routines: RoutineRegistry::new(),
            diagnostics: DiagnosticsAdapter::new(),
            config: EngineConfig::default(),
        }
    }

    /// Add a binding source.
    ///
    /// Sources are queried in the order they were added; bindings declared
    /// with [`bind`](Self::bind) come after all of them.
    pub fn bindings<S: BindingSource>(mut self, source: S) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Declare one binding for a call site.
    pub fn bind(mut self, site: CallSiteId, descriptor: BindingDescriptor) -> Self {
        self.inline.add(site, descriptor);
        self
    }

    /// Replace the routine registry.
    pub fn routines(mut self, registry: RoutineRegistry) -> Self {
        self.routines = registry;
        self
    }

    /// Register a handler taking the failure and the call's arguments.
    pub fn handler<F, A, Fut>(mut self, target: &str, name: &str, handler: F) -> Self
    where
        F: Fn(Failure, A) -> Fut + Send + Sync + 'static,
        A: ArgList,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.routines.register_handler(target, name, handler);
        self
    }

    /// Register a handler that also takes the guarded call's owning instance.
    pub fn receiver_handler<F, A, Fut>(mut self, target: &str, name: &str, handler: F) -> Self
    where
        F: Fn(Option<Receiver>, Failure, A) -> Fut + Send + Sync + 'static,
        A: ArgList,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.routines.register_receiver_handler(target, name, handler);
        self
    }

    /// Register a handler taking only the failure.
    pub fn failure_handler<F, Fut>(mut self, target: &str, name: &str, handler: F) -> Self
    where
        F: Fn(Failure) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.routines.register_failure_handler(target, name, handler);
        self
    }

    /// Register a cleanup routine.
    pub fn cleanup<F, A, Fut>(mut self, target: &str, name: &str, cleanup: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        A: ArgList,
        Fut: Future<Output = CleanupResult> + Send + 'static,
    {
        self.routines.register_cleanup(target, name, cleanup);
        self
    }

    /// Route diagnostics of call sites declared on `declaring_type` to `sink`.
    pub fn diagnostics<S: DiagnosticSink>(mut self, declaring_type: &str, sink: S) -> Self {
        self.diagnostics.register(declaring_type, Arc::new(sink));
        self
    }

    /// Route diagnostics to `sink` when the receiver is a `T` and the
    /// declaring type has no sink of its own.
    pub fn receiver_diagnostics<T: Any, S: DiagnosticSink>(mut self, sink: S) -> Self {
        self.diagnostics.register_type::<T>(Arc::new(sink));
        self
    }

    /// Sink for declaring types with no sink of their own.
    pub fn fallback_diagnostics<S: DiagnosticSink>(mut self, sink: S) -> Self {
        self.diagnostics.set_fallback(Arc::new(sink));
        self
    }

    /// Send every diagnostic without a dedicated sink to `tracing`.
    pub fn tracing_diagnostics(self) -> Self {
        self.fallback_diagnostics(TracingSink)
    }

    /// Set the composite-failure policy.
    ///
    /// Default: `LastEvaluated`
    pub fn composite_policy(mut self, policy: CompositePolicy) -> Self {
        self.config.composite_policy = policy;
        self
    }

    /// Set the cleanup-failure policy.
    ///
    /// Default: `Supersede`
    pub fn cleanup_failure_policy(mut self, policy: CleanupFailurePolicy) -> Self {
        self.config.cleanup_failure_policy = policy;
        self
    }

    /// Set where handlers and cleanups run.
    ///
    /// Default: `Inline`
    pub fn handler_isolation(mut self, isolation: HandlerIsolation) -> Self {
        self.config.handler_isolation = isolation;
        self
    }

    /// Build the interceptor.
    pub fn build(self) -> Interceptor {
        let mut sources = self.sources;
        if !self.inline.is_empty() {
            sources.push(Arc::new(self.inline));
        }
        tracing::debug!(
            sources = sources.len(),
            handlers = self.routines.handler_count(),
            cleanups = self.routines.cleanup_count(),
            "interceptor built"
        );

        let cache = Arc::new(InvocationCache::new(
            Arc::new(sources),
            Arc::new(self.routines),
        ));
        Interceptor {
            engine: Arc::new(DispatchEngine::new(cache, self.diagnostics, self.config)),
        }
    }
}

impl Default for InterceptorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Registered entry point for guarded calls.
///
/// Cheap to clone; every clone shares one invocation cache.
#[derive(Clone)]
pub struct Interceptor {
    engine: Arc<DispatchEngine>,
}

impl Interceptor {
    /// Create a new builder.
    pub fn builder() -> InterceptorBuilder {
        InterceptorBuilder::new()
    }

    /// Dispatch a guarded call.
    pub async fn intercept_async(&self, ctx: InvocationContext) -> Result<Option<Value>> {
        self.engine.dispatch(ctx).await
    }

    /// Dispatch a typed guarded call.
    ///
    /// Returns `None` when the call site declares no result, or when a handler
    /// handled the failure without substituting one.
    ///
    /// # Errors
    ///
    /// Returns `ReturnTypeMismatch` if the dispatch result is not a `T`.
    pub async fn call<T, Fut>(
        &self,
        site: Arc<CallSite>,
        receiver: Option<Receiver>,
        arguments: Arguments,
        guarded: Fut,
    ) -> Result<Option<T>>
    where
        T: Any + Send + Sync + fmt::Debug + Clone,
        Fut: Future<Output = std::result::Result<T, Failure>> + Send + 'static,
    {
        let unit = site.result().is_unit();
        let mut ctx = InvocationContext::from_future(site, arguments, async move {
            let value = guarded.await?;
            Ok::<_, Failure>(if unit { None } else { Some(Value::new(value)) })
        });
        if let Some(receiver) = receiver {
            ctx = ctx.with_receiver(receiver);
        }

        match self.intercept_async(ctx).await? {
            None => Ok(None),
            Some(value) => value
                .downcast::<T>()
                .map(Some)
                .ok_or_else(|| InterceptError::ReturnTypeMismatch {
                    expected: TypeKey::of::<T>().name().to_string(),
                    actual: value.type_key().name().to_string(),
                }),
        }
    }

    /// Shared invocation cache.
    pub fn cache(&self) -> &Arc<InvocationCache> {
        self.engine.cache()
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        self.engine.config()
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("engine", &self.engine)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::{categories, Category};
    use crate::handler::FlowDecision;

    static VALIDATION: Category = Category::child_of("Validation", &categories::FAILURE);

    #[test]
    fn test_builder_default() {
        let builder = InterceptorBuilder::default();
        assert!(builder.sources.is_empty());
        assert!(builder.inline.is_empty());
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Interceptor::builder()
            .composite_policy(CompositePolicy::FirstMatch)
            .cleanup_failure_policy(CleanupFailurePolicy::Suppress)
            .handler_isolation(HandlerIsolation::Spawned);

        assert_eq!(builder.config.composite_policy, CompositePolicy::FirstMatch);
        assert_eq!(
            builder.config.cleanup_failure_policy,
            CleanupFailurePolicy::Suppress
        );
        assert_eq!(builder.config.handler_isolation, HandlerIsolation::Spawned);

        let interceptor = builder.build();
        assert_eq!(interceptor.config().handler_isolation, HandlerIsolation::Spawned);
    }

    #[test]
    fn test_builder_method_chaining() {
        let builder = Interceptor::builder()
            .bind(
                CallSiteId::new("Orders", "place"),
                BindingDescriptor::on(&[&VALIDATION]).handler("H", "h"),
            )
            .handler("H", "h", |_f: Failure, (_id,): (u64,)| async {
                Ok(FlowDecision::handled())
            })
            .failure_handler("H", "f", |_f: Failure| async { Ok(FlowDecision::Rethrow) })
            .cleanup("H", "c", |(): ()| async { Ok(()) })
            .tracing_diagnostics();

        assert_eq!(builder.inline.len(), 1);
        assert_eq!(builder.routines.handler_count(), 2);
        assert_eq!(builder.routines.cleanup_count(), 1);
        assert!(builder.diagnostics.has_sink("Orders"));
    }

    #[tokio::test]
    async fn test_call_unit_site() {
        let site = Arc::new(CallSite::new("Jobs", "run"));
        let interceptor = Interceptor::builder().build();

        let out = interceptor
            .call::<(), _>(site, None, Arguments::empty(), async { Ok(()) })
            .await
            .unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_call_typed_result_and_failure() {
        let site = Arc::new(CallSite::new("Jobs", "count").returns::<u32>());
        let interceptor = Interceptor::builder().build();

        let out = interceptor
            .call::<u32, _>(site.clone(), None, Arguments::empty(), async { Ok(3) })
            .await
            .unwrap();
        assert_eq!(out, Some(3));

        let err = interceptor
            .call::<u32, _>(site, None, Arguments::empty(), async {
                Err(Failure::new(&VALIDATION, "nope"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.failure().map(Failure::message), Some("nope"));
    }

    #[tokio::test]
    async fn test_call_sources_then_inline_bindings() {
        let site = Arc::new(CallSite::new("Jobs", "count").returns::<u32>());
        let source = StaticBindings::new().bind(
            site.id().clone(),
            BindingDescriptor::on(&[&VALIDATION]).handler("H", "first"),
        );
        let interceptor = Interceptor::builder()
            .bind(
                site.id().clone(),
                BindingDescriptor::on(&[&VALIDATION]).handler("H", "second"),
            )
            .bindings(source)
            .failure_handler("H", "first", |_f: Failure| async {
                Ok(FlowDecision::returning(1u32))
            })
            .failure_handler("H", "second", |_f: Failure| async {
                Ok(FlowDecision::returning(2u32))
            })
            .build();

        let out = interceptor
            .call::<u32, _>(site, None, Arguments::empty(), async {
                Err(Failure::new(&VALIDATION, "nope"))
            })
            .await
            .unwrap();
        assert_eq!(out, Some(1));
    }
}
