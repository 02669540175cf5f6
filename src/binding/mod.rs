//! Binding module - declared exception-handling rules.
//!
//! Provides:
//! - [`BindingDescriptor`] - one declared rule for a call site
//! - [`BindingSource`] - where declared rules come from
//! - [`StaticBindings`] / [`BindingTable`] - builder- and JSON-backed sources
//! - [`ResolvedBinding`] - a descriptor with its routines resolved to thunks
//!
//! # Example
//!
//! ```
//! use catchwire::binding::{BindingDescriptor, LogLevel, StaticBindings};
//! use catchwire::context::CallSiteId;
//! use catchwire::failure::{categories, Category};
//!
//! static VALIDATION: Category = Category::child_of("Validation", &categories::FAILURE);
//!
//! let bindings = StaticBindings::new().bind(
//!     CallSiteId::new("OrderService", "place"),
//!     BindingDescriptor::on(&[&VALIDATION])
//!         .handler("OrderHandlers", "on_validation")
//!         .log_level(LogLevel::Warn),
//! );
//! assert_eq!(bindings.len(), 1);
//! ```

mod descriptor;
mod resolved;
mod source;
mod table;

pub use descriptor::{BindingDescriptor, LogLevel, ReturnDefaultPolicy, RoutineId};
pub use resolved::{BindingAction, ResolvedBinding};
pub use source::{BindingSource, ChainedBindings, StaticBindings};
pub use table::BindingTable;
