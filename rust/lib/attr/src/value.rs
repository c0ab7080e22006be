use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, LazyLock};

/// The null value, used where an attribute has no meaningful value
/// (NoOp defaults, optional kinds, missing old values in validators).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Null;

static NULL: LazyLock<Value> = LazyLock::new(|| Value::new(Null));

/// A type-erased, reference-counted attribute value.
///
/// Wraps `Arc<dyn Any + Send + Sync>` so reads out of object storage are
/// an atomic increment, never a data copy. Values built with [`Value::new`]
/// remember how to compare and print themselves; values built with
/// [`Value::opaque`] do not, and every equality check against them is
/// inconclusive (change detection then treats them as changed).
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    eq: Option<fn(&dyn Any, &dyn Any) -> bool>,
    debug: Option<fn(&dyn Any, &mut fmt::Formatter<'_>) -> fmt::Result>,
}

fn eq_as<T: PartialEq + 'static>(a: &dyn Any, b: &dyn Any) -> bool {
    match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn debug_as<T: fmt::Debug + 'static>(v: &dyn Any, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match v.downcast_ref::<T>() {
        Some(v) => v.fmt(f),
        None => f.write_str("<?>"),
    }
}

impl Value {
    /// Wrap a comparable, printable value.
    pub fn new<T: Any + PartialEq + fmt::Debug + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
            eq: Some(eq_as::<T>),
            debug: Some(debug_as::<T>),
        }
    }

    /// Wrap a value that has no equality. Comparisons involving it are
    /// inconclusive.
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
            eq: None,
            debug: None,
        }
    }

    /// The shared null value.
    pub fn null() -> Self {
        NULL.clone()
    }

    pub fn is_null(&self) -> bool {
        self.inner.is::<Null>()
    }

    /// Try to downcast to a concrete type reference.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Downcast and clone out the concrete value.
    pub fn get<T: Any + Clone>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    pub fn type_id(&self) -> TypeId {
        (*self.inner).type_id()
    }

    /// Rust type name of the wrapped value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether both handles point at the same allocation.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }

    /// Compare two values.
    ///
    /// Returns `None` when the comparison cannot be made (either side is
    /// opaque). Identical handles are always equal.
    pub fn try_eq(&self, other: &Value) -> Option<bool> {
        if self.ptr_eq(other) {
            return Some(true);
        }
        let eq = self.eq?;
        other.eq?;
        if self.type_id() != other.type_id() {
            return Some(false);
        }
        Some(eq(&*self.inner, &*other.inner))
    }

    /// Number of strong references to the underlying value.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.try_eq(other).unwrap_or(false)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.debug {
            Some(debug) => debug(&*self.inner, f),
            None => write!(f, "<{}>", self.type_name),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::null()
    }
}

macro_rules! value_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::new(v)
                }
            }
        )*
    };
}

value_from!(bool, i32, i64, u32, u64, usize, f64, String, Null);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::new(v.to_string())
    }
}

// ── ValueKind ───────────────────────────────────────────────────────

/// A runtime type check used by `ValidateMode::Kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueKind {
    type_id: TypeId,
    name: &'static str,
    optional: bool,
}

impl ValueKind {
    /// Accept values of exactly type `T`.
    pub fn of<T: Any>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            optional: false,
        }
    }

    /// Also accept null.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn accepts(&self, value: &Value) -> bool {
        value.type_id() == self.type_id || (self.optional && value.is_null())
    }

    /// Human readable description used in validation errors.
    pub fn describe(&self) -> String {
        if self.optional {
            format!("Option<{}>", self.name)
        } else {
            self.name.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Construction / downcast
    // ========================================================================

    #[test]
    fn downcast_matches_wrapped_type() {
        let v = Value::new(42i64);
        assert_eq!(v.downcast_ref::<i64>(), Some(&42));
        assert_eq!(v.downcast_ref::<i32>(), None);
        assert!(v.is::<i64>());
        assert_eq!(v.type_id(), TypeId::of::<i64>());
    }

    #[test]
    fn get_clones_out() {
        let v = Value::from("port");
        assert_eq!(v.get::<String>(), Some("port".to_string()));
    }

    #[test]
    fn null_is_shared() {
        let a = Value::null();
        let b = Value::default();
        assert!(a.is_null());
        assert!(a.ptr_eq(&b));
        assert!(!Value::new(0i64).is_null());
    }

    #[test]
    fn clone_shares_allocation() {
        let v1 = Value::new(vec![0u8; 1024]);
        let v2 = v1.clone();
        assert_eq!(v1.ref_count(), 2);
        assert!(v1.ptr_eq(&v2));
    }

    // ========================================================================
    // Equality
    // ========================================================================

    #[test]
    fn equal_values_compare_equal() {
        assert_eq!(Value::new(3i64), Value::new(3i64));
        assert_ne!(Value::new(3i64), Value::new(4i64));
    }

    #[test]
    fn different_types_are_unequal_not_inconclusive() {
        assert_eq!(Value::new(3i64).try_eq(&Value::new(3i32)), Some(false));
    }

    #[test]
    fn opaque_comparison_is_inconclusive() {
        struct NoEq;
        let a = Value::opaque(NoEq);
        let b = Value::opaque(NoEq);
        assert_eq!(a.try_eq(&b), None);
        assert_eq!(a.try_eq(&Value::new(1i64)), None);
        assert_ne!(a, b);
    }

    #[test]
    fn identical_opaque_handles_are_equal() {
        struct NoEq;
        let a = Value::opaque(NoEq);
        assert_eq!(a.try_eq(&a.clone()), Some(true));
    }

    // ========================================================================
    // Debug
    // ========================================================================

    #[test]
    fn debug_delegates_to_inner() {
        assert_eq!(format!("{:?}", Value::from("x")), "\"x\"");
        assert_eq!(format!("{:?}", Value::null()), "Null");
    }

    #[test]
    fn debug_of_opaque_shows_type_name() {
        struct Blob;
        let dbg = format!("{:?}", Value::opaque(Blob));
        assert!(dbg.contains("Blob"));
    }

    // ========================================================================
    // ValueKind
    // ========================================================================

    #[test]
    fn kind_accepts_only_its_type() {
        let kind = ValueKind::of::<i64>();
        assert!(kind.accepts(&Value::new(1i64)));
        assert!(!kind.accepts(&Value::from("1")));
        assert!(!kind.accepts(&Value::null()));
        assert_eq!(kind.describe(), "i64");
    }

    #[test]
    fn optional_kind_accepts_null() {
        let kind = ValueKind::of::<String>().optional();
        assert!(kind.accepts(&Value::null()));
        assert!(kind.accepts(&Value::from("a")));
        assert!(kind.describe().starts_with("Option<"));
    }

    // Compile-time: Value must be Send + Sync.
    fn _assert_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Value>();
        assert_sync::<Value>();
    }
}
