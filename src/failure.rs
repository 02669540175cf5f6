//! Failure categories and failure values.
//!
//! A [`Category`] is a node in a static tree of failure kinds. Bindings filter
//! on categories, and a failure matches a filter when its category is the filter
//! or one of its descendants.
//!
//! # Example
//!
//! ```
//! use catchwire::failure::{categories, Category, Failure};
//!
//! static IO: Category = Category::child_of("Io", &categories::FAILURE);
//! static TIMEOUT: Category = Category::child_of("Timeout", &IO);
//!
//! let failure = Failure::new(&TIMEOUT, "read timed out");
//! assert!(failure.is(&IO));
//! assert!(failure.is(&categories::FAILURE));
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// A failure category.
///
/// Declare categories as `static` items so filters and failures can refer to
/// them with a `'static` lifetime.
pub struct Category {
    name: &'static str,
    parent: Option<&'static Category>,
}

impl Category {
    /// Create a root category with no parent.
    pub const fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    /// Create a category nested under `parent`.
    pub const fn child_of(name: &'static str, parent: &'static Category) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    /// Category name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Parent category, if any.
    #[inline]
    pub fn parent(&self) -> Option<&'static Category> {
        self.parent
    }

    /// Returns true if `self` is `other` or one of its descendants.
    pub fn is_a(&self, other: &Category) -> bool {
        let mut current: Option<&Category> = Some(self);
        while let Some(category) = current {
            if category == other {
                return true;
            }
            current = category.parent;
        }
        false
    }

    /// Full path from the root, e.g. `Failure/Io/Timeout`.
    pub fn path(&self) -> String {
        let mut names = vec![self.name];
        let mut current = self.parent;
        while let Some(category) = current {
            names.push(category.name);
            current = category.parent;
        }
        names.reverse();
        names.join("/")
    }
}

// Structural equality: same name under an equal parent chain.
impl PartialEq for Category {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.name == other.name && self.parent == other.parent
    }
}

impl Eq for Category {}

impl fmt::Debug for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Built-in categories.
pub mod categories {
    use super::Category;

    /// Root of every failure category.
    pub static FAILURE: Category = Category::root("Failure");

    /// Composite failures wrapping several inner failures.
    pub static AGGREGATE: Category = Category::child_of("Aggregate", &FAILURE);

    /// An argument snapshot did not fit the routine it was handed to.
    pub static INVALID_ARGUMENTS: Category = Category::child_of("InvalidArguments", &FAILURE);

    /// A handler or cleanup task panicked or was cancelled.
    pub static ABORTED: Category = Category::child_of("Aborted", &FAILURE);
}

struct FailureInner {
    category: &'static Category,
    message: String,
    source: Option<Box<dyn StdError + Send + Sync>>,
    inner: Vec<Failure>,
}

/// A failure raised by a guarded call or a bound routine.
///
/// Cheap to clone; clones share the same underlying failure, which
/// [`Failure::ptr_eq`] can observe.
#[derive(Clone)]
pub struct Failure {
    inner: Arc<FailureInner>,
}

impl Failure {
    /// Create a failure with a category and message.
    pub fn new(category: &'static Category, message: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(FailureInner {
                category,
                message: message.into(),
                source: None,
                inner: Vec::new(),
            }),
        }
    }

    /// Wrap an error value, keeping it reachable through [`Failure::downcast_ref`].
    pub fn from_error<E>(category: &'static Category, error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(FailureInner {
                category,
                message: error.to_string(),
                source: Some(Box::new(error)),
                inner: Vec::new(),
            }),
        }
    }

    /// Create a composite failure from several inner failures (order preserved).
    pub fn composite(failures: impl IntoIterator<Item = Failure>) -> Self {
        let inner: Vec<Failure> = failures.into_iter().collect();
        let message = format!("{} inner failure(s) occurred", inner.len());
        Self {
            inner: Arc::new(FailureInner {
                category: &categories::AGGREGATE,
                message,
                source: None,
                inner,
            }),
        }
    }

    /// Category of this failure.
    #[inline]
    pub fn category(&self) -> &'static Category {
        self.inner.category
    }

    /// Failure message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.inner.message
    }

    /// Returns true if this failure's category is `category` or a descendant.
    #[inline]
    pub fn is(&self, category: &Category) -> bool {
        self.inner.category.is_a(category)
    }

    /// Returns true if this failure matches any of the given filters.
    pub fn matches_any(&self, filters: &[&'static Category]) -> bool {
        filters.iter().any(|filter| self.is(filter))
    }

    /// Returns true if this failure aggregates inner failures.
    #[inline]
    pub fn is_composite(&self) -> bool {
        !self.inner.inner.is_empty()
    }

    /// Inner failures of a composite (empty otherwise).
    #[inline]
    pub fn inner(&self) -> &[Failure] {
        &self.inner.inner
    }

    /// Expand into the failures to match against bindings.
    ///
    /// A composite yields its inner failures in order; anything else yields itself.
    /// Only one level is expanded.
    pub fn expand(&self) -> Vec<Failure> {
        if self.is_composite() {
            self.inner.inner.clone()
        } else {
            vec![self.clone()]
        }
    }

    /// Downcast the wrapped error, if this failure was built with [`Failure::from_error`].
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.source.as_ref()?.downcast_ref::<E>()
    }

    /// Returns true if both handles refer to the same failure.
    #[inline]
    pub fn ptr_eq(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Failure");
        s.field("category", &self.inner.category)
            .field("message", &self.inner.message);
        if self.is_composite() {
            s.field("inner", &self.inner.inner);
        }
        s.finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.inner.category, self.inner.message)
    }
}

impl StdError for Failure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}
