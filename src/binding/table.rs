//! JSON binding tables.
//!
//! A table lists call sites and their bindings in declaration order. Category
//! names are resolved against the categories the caller supplies (the built-in
//! `Failure` and `Aggregate` roots are always known).
//!
//! # Example
//!
//! ```
//! use catchwire::binding::{BindingSource, BindingTable};
//! use catchwire::context::CallSiteId;
//! use catchwire::failure::{categories, Category};
//!
//! static IO: Category = Category::child_of("Io", &categories::FAILURE);
//!
//! let json = r#"{
//!     "sites": [{
//!         "type": "Store",
//!         "routine": "save",
//!         "bindings": [{ "filters": ["Io"], "log_only": true, "level": "warn" }]
//!     }]
//! }"#;
//!
//! let table = BindingTable::from_json(json, &[&IO]).unwrap();
//! assert_eq!(table.bindings_for(&CallSiteId::new("Store", "save")).len(), 1);
//! ```

use serde::Deserialize;

use super::{BindingDescriptor, BindingSource, LogLevel, ReturnDefaultPolicy, RoutineId, StaticBindings};
use crate::context::CallSiteId;
use crate::error::{InterceptError, Result};
use crate::failure::{categories, Category};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableDecl {
    #[serde(default)]
    sites: Vec<SiteDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SiteDecl {
    #[serde(rename = "type")]
    declaring_type: String,
    routine: String,
    #[serde(default)]
    bindings: Vec<BindingDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BindingDecl {
    filters: Vec<String>,
    #[serde(default)]
    handler: Option<RoutineId>,
    #[serde(default)]
    cleanup: Option<RoutineId>,
    #[serde(default)]
    log_only: bool,
    #[serde(default)]
    level: LogLevel,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    log_targets: Vec<String>,
    #[serde(default)]
    return_default: ReturnDefaultPolicy,
}

/// Bindings loaded from a JSON document.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    bindings: StaticBindings,
}

impl BindingTable {
    /// Parse a table, resolving category names against `known`.
    ///
    /// # Errors
    ///
    /// Returns `Json` for malformed documents and `InvalidBinding` for unknown
    /// category names or descriptors that fail validation.
    pub fn from_json(json: &str, known: &[&'static Category]) -> Result<Self> {
        let decl: TableDecl = serde_json::from_str(json)?;
        let mut bindings = StaticBindings::new();

        for site in decl.sites {
            let id = CallSiteId::new(site.declaring_type, site.routine);
            for binding in site.bindings {
                let descriptor = binding.into_descriptor(known)?;
                descriptor.validate()?;
                bindings.add(id.clone(), descriptor);
            }
        }

        Ok(Self { bindings })
    }

    /// Number of descriptors in the table.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns true if the table declares nothing.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl BindingSource for BindingTable {
    fn bindings_for(&self, site: &CallSiteId) -> Vec<BindingDescriptor> {
        self.bindings.bindings_for(site)
    }
}

impl BindingDecl {
    fn into_descriptor(self, known: &[&'static Category]) -> Result<BindingDescriptor> {
        let filters = self
            .filters
            .iter()
            .map(|name| lookup_category(name, known))
            .collect::<Result<Vec<_>>>()?;

        let mut descriptor = BindingDescriptor::on(&filters)
            .log_level(self.level)
            .log_targets(self.log_targets)
            .return_default(self.return_default);
        if let Some(handler) = self.handler {
            descriptor = descriptor.handler(handler.target, handler.name);
        }
        if let Some(cleanup) = self.cleanup {
            descriptor = descriptor.cleanup(cleanup.target, cleanup.name);
        }
        if let Some(message) = self.message {
            descriptor = descriptor.message(message);
        }
        if self.log_only {
            descriptor = descriptor.log_only();
        }
        Ok(descriptor)
    }
}

/// Resolve a filter name. A full path always wins; a bare name must identify
/// exactly one category.
fn lookup_category(name: &str, known: &[&'static Category]) -> Result<&'static Category> {
    let builtins: [&'static Category; 2] = [&categories::FAILURE, &categories::AGGREGATE];
    let candidates = || known.iter().chain(builtins.iter()).copied();

    if let Some(category) = candidates().find(|c| c.path() == name) {
        return Ok(category);
    }

    let mut matches: Vec<&'static Category> = Vec::new();
    for category in candidates().filter(|c| c.name() == name) {
        if !matches.contains(&category) {
            matches.push(category);
        }
    }
    match matches.as_slice() {
        [] => Err(InterceptError::InvalidBinding(format!(
            "unknown failure category: {name}"
        ))),
        [category] => Ok(*category),
        several => {
            let paths: Vec<String> = several.iter().map(|c| c.path()).collect();
            Err(InterceptError::InvalidBinding(format!(
                "ambiguous failure category {name}: use one of {}",
                paths.join(", ")
            )))
        }
    }
}
