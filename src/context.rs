//! Call sites and per-call invocation contexts.
//!
//! A [`CallSite`] describes a guarded routine once: its stable identity, its
//! parameter list and its declared result. An [`InvocationContext`] carries one
//! call through the dispatch engine:
//! - `receiver` - the owning instance, if any
//! - `arguments` - positional snapshot of the call's arguments
//! - `proceed` - thunk running the real guarded body
//! - `result` / `failure` - write-once outcome slots
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use catchwire::context::{Arguments, CallSite, InvocationContext};
//! use catchwire::value::Value;
//!
//! let site = Arc::new(
//!     CallSite::new("OrderService", "place")
//!         .param::<u64>("order_id")
//!         .returns::<i64>(),
//! );
//! let args = Arguments::new(vec![Value::new(17u64)]);
//! let ctx = InvocationContext::from_future(site, args, async { Ok(Some(Value::new(1i64))) });
//! assert_eq!(ctx.site().id().to_string(), "OrderService::place");
//! ```

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::failure::{categories, Failure};
use crate::handler::BoxFuture;
use crate::value::{TypeKey, Value};

/// Outcome of the guarded call itself.
pub type GuardedOutput = std::result::Result<Option<Value>, Failure>;

/// Zero-argument thunk running the guarded body.
pub type Proceed = Box<dyn FnOnce() -> BoxFuture<'static, GuardedOutput> + Send>;

/// Stable identity of a call site: declaring type plus routine name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSiteId {
    declaring_type: String,
    routine: String,
}

impl CallSiteId {
    /// Create a call site identity.
    pub fn new(declaring_type: impl Into<String>, routine: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            routine: routine.into(),
        }
    }

    /// Declaring type name.
    #[inline]
    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    /// Routine name.
    #[inline]
    pub fn routine(&self) -> &str {
        &self.routine
    }
}

impl fmt::Display for CallSiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.routine)
    }
}

/// A declared parameter of a guarded routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Parameter name, referenced by binding log targets.
    pub name: String,
    /// Parameter type.
    pub ty: TypeKey,
}

type ValueFactory = fn() -> Value;

fn default_value<T>() -> Value
where
    T: Any + Send + Sync + fmt::Debug + Default,
{
    Value::new(T::default())
}

/// Declared result of a guarded routine.
#[derive(Clone)]
pub enum ResultSpec {
    /// The routine produces no value.
    Unit,
    /// The routine produces a value of type `ty`.
    Value {
        /// Result type.
        ty: TypeKey,
        /// Zero value, used by `ReturnDefaultPolicy::DefaultValue`.
        zero: Option<ValueFactory>,
        /// Fresh instance, used by `ReturnDefaultPolicy::NewInstance`.
        instance: Option<ValueFactory>,
    },
}

impl ResultSpec {
    /// A value result whose zero value and fresh instance are both `T::default()`.
    pub fn of<T>() -> Self
    where
        T: Any + Send + Sync + fmt::Debug + Default,
    {
        ResultSpec::Value {
            ty: TypeKey::of::<T>(),
            zero: Some(default_value::<T>),
            instance: Some(default_value::<T>),
        }
    }

    /// A value result with no known default.
    pub fn opaque<T: Any>() -> Self {
        ResultSpec::Value {
            ty: TypeKey::of::<T>(),
            zero: None,
            instance: None,
        }
    }

    /// Override the `NewInstance` factory.
    pub fn with_instance(self, factory: fn() -> Value) -> Self {
        match self {
            ResultSpec::Unit => ResultSpec::Unit,
            ResultSpec::Value { ty, zero, .. } => ResultSpec::Value {
                ty,
                zero,
                instance: Some(factory),
            },
        }
    }

    /// Returns true if the routine produces no value.
    #[inline]
    pub fn is_unit(&self) -> bool {
        matches!(self, ResultSpec::Unit)
    }

    /// Declared result type, if any.
    pub fn type_key(&self) -> Option<TypeKey> {
        match self {
            ResultSpec::Unit => None,
            ResultSpec::Value { ty, .. } => Some(*ty),
        }
    }

    /// Returns true if `value` may stand in for this result.
    pub fn accepts(&self, value: &Value) -> bool {
        self.type_key() == Some(value.type_key())
    }

    /// Zero value of the result type.
    pub fn zero_value(&self) -> Option<Value> {
        match self {
            ResultSpec::Value { zero: Some(f), .. } => Some(f()),
            _ => None,
        }
    }

    /// Freshly constructed instance of the result type.
    pub fn new_instance(&self) -> Option<Value> {
        match self {
            ResultSpec::Value {
                instance: Some(f), ..
            } => Some(f()),
            _ => None,
        }
    }

    /// Human-readable name of the declared result.
    pub fn describe(&self) -> String {
        match self {
            ResultSpec::Unit => "()".to_string(),
            ResultSpec::Value { ty, .. } => ty.name().to_string(),
        }
    }
}

impl fmt::Debug for ResultSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultSpec::Unit => f.write_str("Unit"),
            ResultSpec::Value { ty, zero, instance } => f
                .debug_struct("Value")
                .field("ty", ty)
                .field("zero", &zero.is_some())
                .field("instance", &instance.is_some())
                .finish(),
        }
    }
}

/// Static description of a guarded routine.
#[derive(Debug, Clone)]
pub struct CallSite {
    id: CallSiteId,
    params: Vec<Param>,
    result: ResultSpec,
}

impl CallSite {
    /// Create a call site with no parameters and no result.
    pub fn new(declaring_type: impl Into<String>, routine: impl Into<String>) -> Self {
        Self {
            id: CallSiteId::new(declaring_type, routine),
            params: Vec::new(),
            result: ResultSpec::Unit,
        }
    }

    /// Append a parameter.
    pub fn param<T: Any>(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            ty: TypeKey::of::<T>(),
        });
        self
    }

    /// Declare a defaultable result type.
    pub fn returns<T>(mut self) -> Self
    where
        T: Any + Send + Sync + fmt::Debug + Default,
    {
        self.result = ResultSpec::of::<T>();
        self
    }

    /// Declare the result explicitly.
    pub fn with_result(mut self, result: ResultSpec) -> Self {
        self.result = result;
        self
    }

    /// Call site identity.
    #[inline]
    pub fn id(&self) -> &CallSiteId {
        &self.id
    }

    /// Declared parameters.
    #[inline]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Declared result.
    #[inline]
    pub fn result(&self) -> &ResultSpec {
        &self.result
    }

    /// Parameter types, in order.
    pub fn param_types(&self) -> Vec<TypeKey> {
        self.params.iter().map(|p| p.ty).collect()
    }

    /// Position of the parameter called `name`.
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }
}

/// The instance that owns a guarded call.
#[derive(Clone)]
pub struct Receiver {
    instance: Arc<dyn Any + Send + Sync>,
    ty: TypeKey,
}

impl Receiver {
    /// Wrap a shared instance.
    pub fn new<T: Any + Send + Sync>(instance: Arc<T>) -> Self {
        Self {
            instance,
            ty: TypeKey::of::<T>(),
        }
    }

    /// Runtime type of the instance.
    #[inline]
    pub fn type_key(&self) -> TypeKey {
        self.ty
    }

    /// Recover the typed instance.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.instance.clone().downcast::<T>().ok()
    }
}

impl fmt::Debug for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Receiver<{}>", self.ty)
    }
}

/// Immutable positional snapshot of a call's arguments.
#[derive(Debug, Clone)]
pub struct Arguments(Arc<[Value]>);

impl Arguments {
    /// Snapshot the given values.
    pub fn new(values: Vec<Value>) -> Self {
        Self(values.into())
    }

    /// An empty snapshot.
    pub fn empty() -> Self {
        Self(Vec::new().into())
    }

    /// Values, in order.
    #[inline]
    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    /// Value at position `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Number of values.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Runtime types of the values, in order.
    pub fn types(&self) -> Vec<TypeKey> {
        self.0.iter().map(Value::type_key).collect()
    }
}

impl Default for Arguments {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<Value> for Arguments {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// State of one guarded call while it is being dispatched.
pub struct InvocationContext {
    receiver: Option<Receiver>,
    site: Arc<CallSite>,
    arguments: Arguments,
    proceed: Option<Proceed>,
    result: Option<Value>,
    failure: Option<Failure>,
}

impl InvocationContext {
    /// Create a context from a proceed thunk.
    pub fn new<F>(site: Arc<CallSite>, arguments: Arguments, proceed: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'static, GuardedOutput> + Send + 'static,
    {
        Self {
            receiver: None,
            site,
            arguments,
            proceed: Some(Box::new(proceed)),
            result: None,
            failure: None,
        }
    }

    /// Create a context whose guarded body is an already-built future.
    pub fn from_future<Fut>(site: Arc<CallSite>, arguments: Arguments, guarded: Fut) -> Self
    where
        Fut: Future<Output = GuardedOutput> + Send + 'static,
    {
        Self::new(site, arguments, move || Box::pin(guarded))
    }

    /// Attach the owning instance.
    pub fn with_receiver(mut self, receiver: Receiver) -> Self {
        self.receiver = Some(receiver);
        self
    }

    /// Owning instance, if any.
    #[inline]
    pub fn receiver(&self) -> Option<&Receiver> {
        self.receiver.as_ref()
    }

    /// Call site description.
    #[inline]
    pub fn site(&self) -> &Arc<CallSite> {
        &self.site
    }

    /// Argument snapshot.
    #[inline]
    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// Successful or substituted result, once set.
    #[inline]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Terminal failure, once set.
    #[inline]
    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    /// Run the guarded body. The thunk runs at most once.
    pub(crate) async fn proceed(&mut self) -> GuardedOutput {
        match self.proceed.take() {
            Some(proceed) => proceed().await,
            None => Err(Failure::new(
                &categories::FAILURE,
                format!("guarded call {} already proceeded", self.site.id()),
            )),
        }
    }

    /// Fill the result slot. Returns false if it was already written.
    pub(crate) fn set_result(&mut self, value: Value) -> bool {
        if self.result.is_some() {
            tracing::debug!(site = %self.site.id(), "result slot already written");
            return false;
        }
        self.result = Some(value);
        true
    }

    /// Fill the failure slot. Returns false if it was already written.
    pub(crate) fn set_failure(&mut self, failure: Failure) -> bool {
        if self.failure.is_some() {
            tracing::debug!(site = %self.site.id(), "failure slot already written");
            return false;
        }
        self.failure = Some(failure);
        true
    }

    /// Take the result out of the context.
    pub(crate) fn take_result(&mut self) -> Option<Value> {
        self.result.take()
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("site", self.site.id())
            .field("receiver", &self.receiver)
            .field("arguments", &self.arguments.len())
            .field("proceeded", &self.proceed.is_none())
            .field("result", &self.result)
            .field("failure", &self.failure)
            .finish()
    }
}
