//! Invocation cache: memoized binding and thunk resolution.
//!
//! Resolving a call site reads its declared bindings, validates them, looks up
//! every referenced routine and checks its shape against the call site. The
//! result is installed once and read by every later dispatch; nothing is ever
//! evicted.
//!
//! # Concurrency
//!
//! Resolution is pure, so concurrent first callers for the same key may each
//! compute it. The slow path runs without holding any map lock and then
//! installs with insert-if-absent semantics; every caller gets the value that
//! won the install.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::binding::{
    BindingAction, BindingDescriptor, BindingSource, ResolvedBinding, ReturnDefaultPolicy,
    RoutineId,
};
use crate::context::{CallSite, CallSiteId};
use crate::error::{InterceptError, Result};
use crate::handler::{CleanupThunk, HandlerThunk, RoutineRegistry};

/// Resolved bindings of one call site.
#[derive(Debug, Clone)]
pub enum SiteBindings {
    /// The call site declares no bindings.
    Unbound,
    /// Bindings in declaration order.
    Bound(Arc<[ResolvedBinding]>),
}

impl SiteBindings {
    /// Bindings in declaration order (empty when unbound).
    pub fn as_slice(&self) -> &[ResolvedBinding] {
        match self {
            SiteBindings::Unbound => &[],
            SiteBindings::Bound(bindings) => bindings,
        }
    }

    /// Returns true if the call site declares no bindings.
    pub fn is_unbound(&self) -> bool {
        matches!(self, SiteBindings::Unbound)
    }

    /// Declared descriptors, in order.
    pub fn descriptors(&self) -> Vec<BindingDescriptor> {
        self.as_slice()
            .iter()
            .map(|b| b.descriptor().clone())
            .collect()
    }
}

/// Process-wide memo of call-site bindings and routine thunks.
pub struct InvocationCache {
    source: Arc<dyn BindingSource>,
    routines: Arc<RoutineRegistry>,
    sites: DashMap<CallSiteId, SiteBindings>,
    handlers: DashMap<RoutineId, HandlerThunk>,
    cleanups: DashMap<RoutineId, CleanupThunk>,
    resolutions: AtomicUsize,
}

impl InvocationCache {
    /// Create an empty cache over a binding source and routine registry.
    pub fn new(source: Arc<dyn BindingSource>, routines: Arc<RoutineRegistry>) -> Self {
        Self {
            source,
            routines,
            sites: DashMap::new(),
            handlers: DashMap::new(),
            cleanups: DashMap::new(),
            resolutions: AtomicUsize::new(0),
        }
    }

    /// Resolved bindings for `site`, resolving and caching on first use.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBinding`, `HandlerNotFound` or `SignatureMismatch` when a
    /// declared binding cannot be resolved. Failed resolutions are not cached.
    pub fn resolve_bindings(&self, site: &CallSite) -> Result<SiteBindings> {
        if let Some(hit) = self.sites.get(site.id()) {
            return Ok(hit.value().clone());
        }

        let resolved = self.resolve_site(site)?;
        let installed = self
            .sites
            .entry(site.id().clone())
            .or_insert(resolved)
            .value()
            .clone();
        Ok(installed)
    }

    /// Thunk for a handler routine, building and caching it on first use.
    ///
    /// # Errors
    ///
    /// Returns `HandlerNotFound` if no handler is registered under `routine`.
    pub fn resolve_handler(&self, site: &CallSiteId, routine: &RoutineId) -> Result<HandlerThunk> {
        if let Some(hit) = self.handlers.get(routine) {
            return Ok(hit.value().clone());
        }

        let handler = self
            .routines
            .handler(routine)
            .ok_or_else(|| InterceptError::HandlerNotFound {
                site: site.clone(),
                routine: routine.clone(),
            })?;
        let thunk = HandlerThunk::build(routine.clone(), handler);
        Ok(self
            .handlers
            .entry(routine.clone())
            .or_insert(thunk)
            .value()
            .clone())
    }

    /// Thunk for a cleanup routine, building and caching it on first use.
    ///
    /// # Errors
    ///
    /// Returns `HandlerNotFound` if no cleanup is registered under `routine`.
    pub fn resolve_cleanup(&self, site: &CallSiteId, routine: &RoutineId) -> Result<CleanupThunk> {
        if let Some(hit) = self.cleanups.get(routine) {
            return Ok(hit.value().clone());
        }

        let cleanup = self
            .routines
            .cleanup(routine)
            .ok_or_else(|| InterceptError::HandlerNotFound {
                site: site.clone(),
                routine: routine.clone(),
            })?;
        let thunk = CleanupThunk::build(routine.clone(), cleanup);
        Ok(self
            .cleanups
            .entry(routine.clone())
            .or_insert(thunk)
            .value()
            .clone())
    }

    /// Number of call-site resolutions performed (including redundant ones).
    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::Acquire)
    }

    /// Number of call sites cached.
    pub fn cached_sites(&self) -> usize {
        self.sites.len()
    }

    /// Slow path: read, validate and resolve the declared bindings of `site`.
    fn resolve_site(&self, site: &CallSite) -> Result<SiteBindings> {
        self.resolutions.fetch_add(1, Ordering::AcqRel);

        let declared = self.source.bindings_for(site.id());
        if declared.is_empty() {
            tracing::debug!(site = %site.id(), "no bindings declared");
            return Ok(SiteBindings::Unbound);
        }

        let mut resolved = Vec::with_capacity(declared.len());
        for descriptor in declared {
            descriptor.validate()?;

            let handler = match descriptor.handler_routine() {
                Some(routine) => {
                    let thunk = self.resolve_handler(site.id(), routine)?;
                    thunk.check_against(site)?;
                    Some(thunk)
                }
                None => None,
            };

            let cleanup = match descriptor.cleanup_routine() {
                Some(routine) => {
                    let thunk = self.resolve_cleanup(site.id(), routine)?;
                    thunk.check_against(site)?;
                    Some(thunk)
                }
                None => None,
            };

            let action = if descriptor.is_log_only() {
                BindingAction::LogOnly
            } else if descriptor.default_policy() != ReturnDefaultPolicy::None {
                BindingAction::ReturnDefault(descriptor.default_policy())
            } else {
                match handler {
                    Some(thunk) => BindingAction::Handler(thunk),
                    // validate() guarantees one of the three responses
                    None => {
                        return Err(InterceptError::InvalidBinding(format!(
                            "binding at {} has no response",
                            site.id()
                        )))
                    }
                }
            };

            let log_targets = descriptor
                .targets()
                .iter()
                .filter_map(|name| match site.param_index(name) {
                    Some(index) => Some((name.clone(), index)),
                    None => {
                        tracing::warn!(site = %site.id(), log_target = %name, "log target is not a parameter, ignored");
                        None
                    }
                })
                .collect();

            resolved.push(ResolvedBinding::new(descriptor, action, cleanup, log_targets));
        }

        tracing::debug!(site = %site.id(), bindings = resolved.len(), "bindings resolved");
        Ok(SiteBindings::Bound(resolved.into()))
    }
}

impl std::fmt::Debug for InvocationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationCache")
            .field("sites", &self.sites.len())
            .field("handlers", &self.handlers.len())
            .field("cleanups", &self.cleanups.len())
            .field("resolutions", &self.resolutions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::StaticBindings;
    use crate::failure::{categories, Category, Failure};
    use crate::handler::FlowDecision;

    static VALIDATION: Category = Category::child_of("Validation", &categories::FAILURE);

    fn site() -> CallSite {
        CallSite::new("Orders", "place")
            .param::<u64>("order_id")
            .returns::<i64>()
    }

    fn registry() -> Arc<RoutineRegistry> {
        let mut registry = RoutineRegistry::new();
        registry.register_handler("H", "typed", |_f: Failure, (_id,): (u64,)| async {
            Ok(FlowDecision::handled())
        });
        registry.register_handler("H", "wrong", |_f: Failure, (_s,): (String,)| async {
            Ok(FlowDecision::handled())
        });
        registry.register_cleanup("H", "release", |(_id,): (u64,)| async { Ok(()) });
        Arc::new(registry)
    }

    fn cache(bindings: StaticBindings) -> InvocationCache {
        InvocationCache::new(Arc::new(bindings), registry())
    }

    #[test]
    fn test_unbound_marker_is_cached() {
        let cache = cache(StaticBindings::new());

        assert!(cache.resolve_bindings(&site()).unwrap().is_unbound());
        assert!(cache.resolve_bindings(&site()).unwrap().is_unbound());
        assert_eq!(cache.resolutions(), 1);
        assert_eq!(cache.cached_sites(), 1);
    }

    #[test]
    fn test_resolves_actions_in_declaration_order() {
        let id = site().id().clone();
        let cache = cache(
            StaticBindings::new()
                .bind(id.clone(), BindingDescriptor::on(&[&VALIDATION]).log_only())
                .bind(
                    id.clone(),
                    BindingDescriptor::on(&[&VALIDATION])
                        .return_default(ReturnDefaultPolicy::DefaultValue),
                )
                .bind(
                    id,
                    BindingDescriptor::on(&[&VALIDATION])
                        .handler("H", "typed")
                        .cleanup("H", "release")
                        .log_targets(["order_id", "unknown"]),
                ),
        );

        let bindings = cache.resolve_bindings(&site()).unwrap();
        let slice = bindings.as_slice();
        assert_eq!(slice.len(), 3);
        assert!(matches!(slice[0].action(), BindingAction::LogOnly));
        assert!(matches!(
            slice[1].action(),
            BindingAction::ReturnDefault(ReturnDefaultPolicy::DefaultValue)
        ));
        assert!(matches!(slice[2].action(), BindingAction::Handler(_)));
        assert!(slice[2].cleanup().is_some());
        assert_eq!(slice[2].log_targets(), &[("order_id".to_string(), 0)]);
    }

    #[test]
    fn test_handler_not_found() {
        let cache = cache(StaticBindings::new().bind(
            site().id().clone(),
            BindingDescriptor::on(&[&VALIDATION]).handler("H", "missing"),
        ));

        let err = cache.resolve_bindings(&site()).unwrap_err();
        assert!(matches!(err, InterceptError::HandlerNotFound { .. }));
        assert_eq!(cache.cached_sites(), 0);
    }

    #[test]
    fn test_cleanup_not_found() {
        let cache = cache(StaticBindings::new().bind(
            site().id().clone(),
            BindingDescriptor::on(&[&VALIDATION]).log_only().cleanup("H", "missing"),
        ));

        assert!(matches!(
            cache.resolve_bindings(&site()),
            Err(InterceptError::HandlerNotFound { .. })
        ));
    }

    #[test]
    fn test_signature_mismatch_at_resolution() {
        let cache = cache(StaticBindings::new().bind(
            site().id().clone(),
            BindingDescriptor::on(&[&VALIDATION]).handler("H", "wrong"),
        ));

        assert!(matches!(
            cache.resolve_bindings(&site()),
            Err(InterceptError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_descriptor() {
        let cache = cache(StaticBindings::new().bind(
            site().id().clone(),
            BindingDescriptor::on(&[]).handler("H", "typed"),
        ));

        assert!(matches!(
            cache.resolve_bindings(&site()),
            Err(InterceptError::InvalidBinding(_))
        ));
    }

    #[test]
    fn test_thunks_are_shared() {
        let cache = cache(StaticBindings::new());
        let id = site().id().clone();
        let routine = RoutineId::new("H", "typed");

        let first = cache.resolve_handler(&id, &routine).unwrap();
        let second = cache.resolve_handler(&id, &routine).unwrap();
        assert_eq!(first.routine(), second.routine());
        assert_eq!(first.shape(), second.shape());
    }

    #[test]
    fn test_repeat_resolution_is_element_wise_equal() {
        let id = site().id().clone();
        let bindings = StaticBindings::new()
            .bind(id.clone(), BindingDescriptor::on(&[&VALIDATION]).handler("H", "typed"))
            .bind(id, BindingDescriptor::on(&[&categories::FAILURE]).log_only());

        let cold_a = cache(bindings.clone()).resolve_bindings(&site()).unwrap();
        let cold_b = cache(bindings).resolve_bindings(&site()).unwrap();
        assert_eq!(cold_a.descriptors(), cold_b.descriptors());
    }
}
