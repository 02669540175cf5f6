//! Type-erased argument and result values.
//!
//! The guarded call's argument snapshot and any substituted result travel as
//! [`Value`]s. Handlers receive them back as concrete types through
//! [`ArgList`], which is implemented for tuples so the parameter shape of a
//! handler is known at compile time.
//!
//! # Example
//!
//! ```
//! use catchwire::value::{ArgList, Value};
//!
//! let args = vec![Value::new(7u32), Value::new(String::from("sku-1"))];
//! let (qty, sku) = <(u32, String)>::from_values(&args).unwrap();
//! assert_eq!(qty, 7);
//! assert_eq!(sku, "sku-1");
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identity of a Rust type, compared by [`TypeId`].
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key for `T`.
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Type ID.
    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Type name (as reported by `std::any::type_name`).
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Render a parameter list like `(u32, alloc::string::String)`.
    pub fn describe(keys: &[TypeKey]) -> String {
        let names: Vec<&str> = keys.iter().map(|k| k.name).collect();
        format!("({})", names.join(", "))
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

type RenderFn = fn(&(dyn Any + Send + Sync)) -> String;

fn render_debug<T: Any + fmt::Debug>(value: &(dyn Any + Send + Sync)) -> String {
    value
        .downcast_ref::<T>()
        .map(|v| format!("{v:?}"))
        .unwrap_or_default()
}

/// A type-erased, cheaply cloneable value.
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    ty: TypeKey,
    render: RenderFn,
}

impl Value {
    /// Wrap a value.
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync + fmt::Debug,
    {
        Self {
            inner: Arc::new(value),
            ty: TypeKey::of::<T>(),
            render: render_debug::<T>,
        }
    }

    /// Runtime type of the wrapped value.
    #[inline]
    pub fn type_key(&self) -> TypeKey {
        self.ty
    }

    /// Returns true if the wrapped value is a `T`.
    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        self.ty.id == TypeId::of::<T>()
    }

    /// Borrow the wrapped value as `T`.
    #[inline]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.inner).downcast_ref::<T>()
    }

    /// Clone the wrapped value out as `T`.
    pub fn downcast<T: Any + Clone>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }

    /// `Debug` rendering of the wrapped value, used in diagnostics.
    pub fn render(&self) -> String {
        (self.render)(&*self.inner)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value<{}>({})", self.ty.name, self.render())
    }
}

/// A statically typed parameter list that can be rebuilt from a snapshot.
pub trait ArgList: Sized + Send + 'static {
    /// Declared parameter types, in order.
    fn param_types() -> Vec<TypeKey>;

    /// Rebuild the list from positional values.
    ///
    /// Returns `None` if the arity or any element type differs.
    fn from_values(values: &[Value]) -> Option<Self>;
}

impl ArgList for () {
    fn param_types() -> Vec<TypeKey> {
        Vec::new()
    }

    fn from_values(values: &[Value]) -> Option<Self> {
        values.is_empty().then_some(())
    }
}

macro_rules! impl_arg_list {
    ($len:expr; $($ty:ident => $idx:tt),+) => {
        impl<$($ty),+> ArgList for ($($ty,)+)
        where
            $($ty: Any + Clone + Send + Sync),+
        {
            fn param_types() -> Vec<TypeKey> {
                vec![$(TypeKey::of::<$ty>()),+]
            }

            fn from_values(values: &[Value]) -> Option<Self> {
                if values.len() != $len {
                    return None;
                }
                Some(($(values[$idx].downcast::<$ty>()?,)+))
            }
        }
    };
}

impl_arg_list!(1; A => 0);
impl_arg_list!(2; A => 0, B => 1);
impl_arg_list!(3; A => 0, B => 1, C => 2);
impl_arg_list!(4; A => 0, B => 1, C => 2, D => 3);
impl_arg_list!(5; A => 0, B => 1, C => 2, D => 3, E => 4);
impl_arg_list!(6; A => 0, B => 1, C => 2, D => 3, E => 4, F => 5);

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Order {
        id: u64,
    }

    #[test]
    fn test_type_key_equality() {
        assert_eq!(TypeKey::of::<u32>(), TypeKey::of::<u32>());
        assert_ne!(TypeKey::of::<u32>(), TypeKey::of::<i32>());
        assert_eq!(TypeKey::of::<u32>().name(), "u32");
    }

    #[test]
    fn test_describe() {
        let keys = [TypeKey::of::<u8>(), TypeKey::of::<bool>()];
        assert_eq!(TypeKey::describe(&keys), "(u8, bool)");
        assert_eq!(TypeKey::describe(&[]), "()");
    }

    #[test]
    fn test_value_downcast() {
        let value = Value::new(Order { id: 9 });

        assert!(value.is::<Order>());
        assert!(!value.is::<u64>());
        assert_eq!(value.downcast_ref::<Order>().map(|o| o.id), Some(9));
        assert_eq!(value.downcast::<Order>(), Some(Order { id: 9 }));
        assert!(value.downcast::<u64>().is_none());
    }

    #[test]
    fn test_value_render() {
        assert_eq!(Value::new(42i32).render(), "42");
        assert_eq!(Value::new("abc").render(), "\"abc\"");
        assert_eq!(Value::new(Order { id: 1 }).render(), "Order { id: 1 }");
    }

    #[test]
    fn test_value_clone_shares_storage() {
        let value = Value::new(String::from("shared"));
        let copy = value.clone();
        assert_eq!(copy.downcast_ref::<String>().map(String::as_str), Some("shared"));
        assert_eq!(value.type_key(), copy.type_key());
    }

    #[test]
    fn test_arg_list_param_types() {
        assert!(<()>::param_types().is_empty());
        assert_eq!(
            <(u32, String)>::param_types(),
            vec![TypeKey::of::<u32>(), TypeKey::of::<String>()]
        );
    }

    #[test]
    fn test_arg_list_from_values() {
        let values = vec![Value::new(1u32), Value::new(Order { id: 2 })];
        let (n, order) = <(u32, Order)>::from_values(&values).unwrap();
        assert_eq!(n, 1);
        assert_eq!(order.id, 2);
    }

    #[test]
    fn test_arg_list_rejects_wrong_arity_or_type() {
        let values = vec![Value::new(1u32)];
        assert!(<(u32, u32)>::from_values(&values).is_none());
        assert!(<(i64,)>::from_values(&values).is_none());
        assert!(<()>::from_values(&values).is_none());
        assert!(<()>::from_values(&[]).is_some());
    }
}
