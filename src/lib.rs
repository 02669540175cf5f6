//! # catchwire
//!
//! Declarative exception dispatch for async guarded calls.
//!
//! Call sites declare which failure categories they want handled, which
//! routine decides what happens, what gets logged and which cleanup always
//! runs. The engine resolves those declarations once per call site and then
//! runs every guarded call through the same protocol:
//!
//! - run the guarded call
//! - on failure, consult the bindings in declaration order
//! - let the first matching one suppress, replace or re-raise the failure
//! - run the first declared cleanup routine on every path
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use catchwire::binding::BindingDescriptor;
//! use catchwire::context::{Arguments, CallSite, InvocationContext};
//! use catchwire::failure::{categories, Category, Failure};
//! use catchwire::handler::FlowDecision;
//! use catchwire::value::Value;
//! use catchwire::Interceptor;
//!
//! static VALIDATION: Category = Category::child_of("Validation", &categories::FAILURE);
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let site = Arc::new(
//!     CallSite::new("OrderService", "place")
//!         .param::<u64>("order_id")
//!         .returns::<i64>(),
//! );
//!
//! let interceptor = Interceptor::builder()
//!     .bind(
//!         site.id().clone(),
//!         BindingDescriptor::on(&[&VALIDATION])
//!             .handler("OrderHandlers", "on_validation")
//!             .cleanup("OrderHandlers", "release")
//!             .log_targets(["order_id"]),
//!     )
//!     .handler("OrderHandlers", "on_validation", |_f: Failure, (id,): (u64,)| async move {
//!         Ok(FlowDecision::returning(-(id as i64)))
//!     })
//!     .cleanup("OrderHandlers", "release", |(_id,): (u64,)| async { Ok(()) })
//!     .tracing_diagnostics()
//!     .build();
//!
//! let ctx = InvocationContext::from_future(
//!     site,
//!     Arguments::new(vec![Value::new(7u64)]),
//!     async { Err(Failure::new(&VALIDATION, "sku unknown")) },
//! );
//! let result = interceptor.intercept_async(ctx).await.unwrap();
//! assert_eq!(result.and_then(|v| v.downcast::<i64>()), Some(-7));
//! # });
//! ```

pub mod binding;
pub mod cache;
pub mod context;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod failure;
pub mod handler;
pub mod value;

mod interceptor;

pub use binding::{BindingDescriptor, LogLevel, ReturnDefaultPolicy};
pub use context::{Arguments, CallSite, CallSiteId, InvocationContext, Receiver};
pub use engine::{CleanupFailurePolicy, CompositePolicy, EngineConfig, HandlerIsolation};
pub use error::{InterceptError, Result};
pub use failure::{Category, Failure};
pub use handler::FlowDecision;
pub use interceptor::{Interceptor, InterceptorBuilder};
pub use value::Value;
