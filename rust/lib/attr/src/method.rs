//! Callables used as mode contexts and named methods on object types.
//!
//! A mode either carries its callable directly (`DefaultMode::Factory`,
//! `ValidateMode::Call`, ...) or names a method looked up on the object's
//! type at dispatch time (`ObjectMethod` modes). Named methods are
//! registered with [`TypeBuilder::method`](crate::TypeBuilder::method)
//! and must have the shape the calling operation expects.

use std::fmt;
use std::sync::Arc;

use crate::change::Change;
use crate::error::Result;
use crate::object::Object;
use crate::value::Value;

/// Zero-argument default factory.
pub type Factory = Arc<dyn Fn() -> Result<Value> + Send + Sync>;
/// Computes a value from the owner (defaults, property getters).
pub type Getter = Arc<dyn Fn(&Object) -> Result<Value> + Send + Sync>;
/// Receives a value for the owner (property setters).
pub type Setter = Arc<dyn Fn(&Object, Value) -> Result<()> + Send + Sync>;
pub type Deleter = Arc<dyn Fn(&Object) -> Result<()> + Send + Sync>;
/// `(owner, old, new) -> validated`.
pub type Validator = Arc<dyn Fn(&Object, Option<&Value>, Value) -> Result<Value> + Send + Sync>;
/// `(owner, value) -> value` applied after a slot read.
pub type PostGetter = Arc<dyn Fn(&Object, Value) -> Result<Value> + Send + Sync>;
/// `(owner, old, new)` run after a slot write.
pub type PostSetter = Arc<dyn Fn(&Object, Option<&Value>, &Value) -> Result<()> + Send + Sync>;
/// `(owner, attribute name) -> include in state?`
pub type StatePredicate = Arc<dyn Fn(&Object, &str) -> bool + Send + Sync>;
pub type ObserverFn = Arc<dyn Fn(&Change) -> Result<()> + Send + Sync>;
/// Observer implemented as a method: `(owner, change)`.
pub type MethodObserver = Arc<dyn Fn(&Object, &Change) -> Result<()> + Send + Sync>;

/// A named method on an object type.
#[derive(Clone)]
pub enum Method {
    Getter(Getter),
    Setter(Setter),
    Deleter(Deleter),
    Validator(Validator),
    PostGetter(PostGetter),
    PostSetter(PostSetter),
    StatePredicate(StatePredicate),
    Observer(MethodObserver),
}

impl Method {
    pub fn getter(f: impl Fn(&Object) -> Result<Value> + Send + Sync + 'static) -> Self {
        Method::Getter(Arc::new(f))
    }

    pub fn setter(f: impl Fn(&Object, Value) -> Result<()> + Send + Sync + 'static) -> Self {
        Method::Setter(Arc::new(f))
    }

    pub fn deleter(f: impl Fn(&Object) -> Result<()> + Send + Sync + 'static) -> Self {
        Method::Deleter(Arc::new(f))
    }

    pub fn validator(
        f: impl Fn(&Object, Option<&Value>, Value) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Method::Validator(Arc::new(f))
    }

    pub fn post_getter(f: impl Fn(&Object, Value) -> Result<Value> + Send + Sync + 'static) -> Self {
        Method::PostGetter(Arc::new(f))
    }

    pub fn post_setter(
        f: impl Fn(&Object, Option<&Value>, &Value) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Method::PostSetter(Arc::new(f))
    }

    pub fn state_predicate(f: impl Fn(&Object, &str) -> bool + Send + Sync + 'static) -> Self {
        Method::StatePredicate(Arc::new(f))
    }

    pub fn observer(f: impl Fn(&Object, &Change) -> Result<()> + Send + Sync + 'static) -> Self {
        Method::Observer(Arc::new(f))
    }

    /// Shape name, used in configuration errors.
    pub fn shape(&self) -> &'static str {
        match self {
            Method::Getter(_) => "getter",
            Method::Setter(_) => "setter",
            Method::Deleter(_) => "deleter",
            Method::Validator(_) => "validator",
            Method::PostGetter(_) => "post-getter",
            Method::PostSetter(_) => "post-setter",
            Method::StatePredicate(_) => "state predicate",
            Method::Observer(_) => "observer",
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Method({})", self.shape())
    }
}

/// Method name prefixes bound automatically at type construction.
pub(crate) mod magic {
    pub const DEFAULT: &str = "_default_";
    pub const VALIDATE: &str = "_validate_";
    pub const POST_VALIDATE: &str = "_post_validate_";
    pub const POST_GETATTR: &str = "_post_getattr_";
    pub const POST_SETATTR: &str = "_post_setattr_";
    pub const GETSTATE: &str = "_getstate_";
    pub const OBSERVE: &str = "_observe_";

    /// Property accessors looked up when a property has no function.
    pub const GET: &str = "_get_";
    pub const SET: &str = "_set_";
    pub const DEL: &str = "_del_";
}
