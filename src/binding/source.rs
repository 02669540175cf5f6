//! Binding sources: where declared bindings come from.
//!
//! The declaration layer (attributes, code generation, a config file) lives
//! outside this crate; it only has to hand over descriptors per call site in
//! declaration order.

use std::collections::HashMap;
use std::sync::Arc;

use super::BindingDescriptor;
use crate::context::CallSiteId;

/// Supplier of declared bindings.
pub trait BindingSource: Send + Sync + 'static {
    /// Declared bindings for `site`, in declaration order. Empty if none.
    fn bindings_for(&self, site: &CallSiteId) -> Vec<BindingDescriptor>;
}

impl<F> BindingSource for F
where
    F: Fn(&CallSiteId) -> Vec<BindingDescriptor> + Send + Sync + 'static,
{
    fn bindings_for(&self, site: &CallSiteId) -> Vec<BindingDescriptor> {
        self(site)
    }
}

/// In-memory bindings populated through a builder.
#[derive(Debug, Clone, Default)]
pub struct StaticBindings {
    sites: HashMap<CallSiteId, Vec<BindingDescriptor>>,
}

impl StaticBindings {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor to `site` (builder style).
    pub fn bind(mut self, site: CallSiteId, descriptor: BindingDescriptor) -> Self {
        self.add(site, descriptor);
        self
    }

    /// Append a descriptor to `site`.
    pub fn add(&mut self, site: CallSiteId, descriptor: BindingDescriptor) {
        self.sites.entry(site).or_default().push(descriptor);
    }

    /// Number of descriptors across all sites.
    pub fn len(&self) -> usize {
        self.sites.values().map(Vec::len).sum()
    }

    /// Returns true if no descriptors are declared.
    pub fn is_empty(&self) -> bool {
        self.sites.values().all(Vec::is_empty)
    }
}

impl BindingSource for StaticBindings {
    fn bindings_for(&self, site: &CallSiteId) -> Vec<BindingDescriptor> {
        self.sites.get(site).cloned().unwrap_or_default()
    }
}

/// Several sources queried in order; their bindings are concatenated.
#[derive(Clone, Default)]
pub struct ChainedBindings {
    sources: Vec<Arc<dyn BindingSource>>,
}

impl ChainedBindings {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source.
    pub fn push(&mut self, source: Arc<dyn BindingSource>) {
        self.sources.push(source);
    }

    /// Number of sources in the chain.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Returns true if the chain holds no sources.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl BindingSource for ChainedBindings {
    fn bindings_for(&self, site: &CallSiteId) -> Vec<BindingDescriptor> {
        self.sources
            .iter()
            .flat_map(|source| source.bindings_for(site))
            .collect()
    }
}
