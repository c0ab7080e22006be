//! Behavior mode registry.
//!
//! Each attribute operation is a switch over a small closed set of modes.
//! A mode variant carries its own context (a constant, a callable, a
//! method name); `Delegate` and `SchemaMethod` take their context from the
//! schema itself (the delegate schema and the schema hooks).

use std::fmt;

use serde::Serialize;

use crate::method::{
    Deleter, Factory, Getter, PostGetter, PostSetter, Setter, StatePredicate, Validator,
};
use crate::value::{Value, ValueKind};

/// The attribute operations a schema configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Get,
    Set,
    Delete,
    Default,
    Validate,
    PostValidate,
    PostGet,
    PostSet,
    GetState,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::Set => "set",
            Operation::Delete => "delete",
            Operation::Default => "default",
            Operation::Validate => "validate",
            Operation::PostValidate => "post_validate",
            Operation::PostGet => "post_get",
            Operation::PostSet => "post_set",
            Operation::GetState => "getstate",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) const DELEGATE: &str = "delegate";
pub(crate) const SCHEMA_METHOD: &str = "schema_method";

// ── Get ─────────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum GetMode {
    /// Always reads null.
    NoOp,
    /// Read the storage slot, computing and caching the default when unset.
    Slot,
    /// Returns a bound emitter; nothing is stored.
    Event,
    Signal,
    /// Computed on every read. `None` looks up `_get_<name>` on the type.
    Property(Option<Getter>),
    /// Computed once and cached in the slot until reset.
    CachedProperty(Option<Getter>),
    Call(Getter),
    ObjectMethod(String),
    SchemaMethod,
    Delegate,
}

impl GetMode {
    pub fn label(&self) -> &'static str {
        match self {
            GetMode::NoOp => "noop",
            GetMode::Slot => "slot",
            GetMode::Event => "event",
            GetMode::Signal => "signal",
            GetMode::Property(_) => "property",
            GetMode::CachedProperty(_) => "cached_property",
            GetMode::Call(_) => "call",
            GetMode::ObjectMethod(_) => "object_method",
            GetMode::SchemaMethod => SCHEMA_METHOD,
            GetMode::Delegate => DELEGATE,
        }
    }
}

// ── Set ─────────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum SetMode {
    NoOp,
    Slot,
    /// Every assignment fails.
    Constant,
    /// Assignment fails once the slot holds a value.
    ReadOnly,
    /// Validate and dispatch to observers without storing.
    Event,
    /// Assignment fails; emit through the connector instead.
    Signal,
    /// `None` looks up `_set_<name>`; missing setter is an immutability error.
    Property(Option<Setter>),
    Call(Setter),
    ObjectMethod(String),
    SchemaMethod,
    Delegate,
}

impl SetMode {
    pub fn label(&self) -> &'static str {
        match self {
            SetMode::NoOp => "noop",
            SetMode::Slot => "slot",
            SetMode::Constant => "constant",
            SetMode::ReadOnly => "read_only",
            SetMode::Event => "event",
            SetMode::Signal => "signal",
            SetMode::Property(_) => "property",
            SetMode::Call(_) => "call",
            SetMode::ObjectMethod(_) => "object_method",
            SetMode::SchemaMethod => SCHEMA_METHOD,
            SetMode::Delegate => DELEGATE,
        }
    }
}

// ── Delete ──────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum DeleteMode {
    NoOp,
    Slot,
    Constant,
    ReadOnly,
    Event,
    Signal,
    /// `None` looks up `_del_<name>`.
    Property(Option<Deleter>),
    SchemaMethod,
    Delegate,
}

impl DeleteMode {
    pub fn label(&self) -> &'static str {
        match self {
            DeleteMode::NoOp => "noop",
            DeleteMode::Slot => "slot",
            DeleteMode::Constant => "constant",
            DeleteMode::ReadOnly => "read_only",
            DeleteMode::Event => "event",
            DeleteMode::Signal => "signal",
            DeleteMode::Property(_) => "property",
            DeleteMode::SchemaMethod => SCHEMA_METHOD,
            DeleteMode::Delegate => DELEGATE,
        }
    }
}

// ── Default ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum DefaultMode {
    /// Null.
    NoOp,
    Static(Value),
    Factory(Factory),
    Call(Getter),
    ObjectMethod(String),
    SchemaMethod,
    /// Reading an unset slot is an error.
    NonOptional,
    Delegate,
}

impl DefaultMode {
    pub fn label(&self) -> &'static str {
        match self {
            DefaultMode::NoOp => "noop",
            DefaultMode::Static(_) => "static",
            DefaultMode::Factory(_) => "factory",
            DefaultMode::Call(_) => "call",
            DefaultMode::ObjectMethod(_) => "object_method",
            DefaultMode::SchemaMethod => SCHEMA_METHOD,
            DefaultMode::NonOptional => "non_optional",
            DefaultMode::Delegate => DELEGATE,
        }
    }
}

// ── Validate / post-validate ────────────────────────────────────────

#[derive(Clone)]
pub enum ValidateMode {
    NoOp,
    Kind(ValueKind),
    Call(Validator),
    ObjectMethod(String),
    SchemaMethod,
    Delegate,
}

impl ValidateMode {
    pub fn label(&self) -> &'static str {
        match self {
            ValidateMode::NoOp => "noop",
            ValidateMode::Kind(_) => "kind",
            ValidateMode::Call(_) => "call",
            ValidateMode::ObjectMethod(_) => "object_method",
            ValidateMode::SchemaMethod => SCHEMA_METHOD,
            ValidateMode::Delegate => DELEGATE,
        }
    }
}

#[derive(Clone)]
pub enum PostValidateMode {
    NoOp,
    Call(Validator),
    ObjectMethod(String),
    SchemaMethod,
    Delegate,
}

impl PostValidateMode {
    pub fn label(&self) -> &'static str {
        match self {
            PostValidateMode::NoOp => "noop",
            PostValidateMode::Call(_) => "call",
            PostValidateMode::ObjectMethod(_) => "object_method",
            PostValidateMode::SchemaMethod => SCHEMA_METHOD,
            PostValidateMode::Delegate => DELEGATE,
        }
    }
}

// ── Post get / post set ─────────────────────────────────────────────

#[derive(Clone)]
pub enum PostGetMode {
    NoOp,
    Call(PostGetter),
    ObjectMethod(String),
    SchemaMethod,
    Delegate,
}

impl PostGetMode {
    pub fn label(&self) -> &'static str {
        match self {
            PostGetMode::NoOp => "noop",
            PostGetMode::Call(_) => "call",
            PostGetMode::ObjectMethod(_) => "object_method",
            PostGetMode::SchemaMethod => SCHEMA_METHOD,
            PostGetMode::Delegate => DELEGATE,
        }
    }
}

#[derive(Clone)]
pub enum PostSetMode {
    NoOp,
    Call(PostSetter),
    ObjectMethod(String),
    SchemaMethod,
    Delegate,
}

impl PostSetMode {
    pub fn label(&self) -> &'static str {
        match self {
            PostSetMode::NoOp => "noop",
            PostSetMode::Call(_) => "call",
            PostSetMode::ObjectMethod(_) => "object_method",
            PostSetMode::SchemaMethod => SCHEMA_METHOD,
            PostSetMode::Delegate => DELEGATE,
        }
    }
}

// ── Get state ───────────────────────────────────────────────────────

/// Whether an attribute participates in a state snapshot.
#[derive(Clone)]
pub enum GetStateMode {
    Include,
    Exclude,
    /// Include only when the slot holds a value.
    IncludeNonDefault,
    /// Include when the attribute can be written back (property with a setter).
    Property,
    Predicate(StatePredicate),
    ObjectMethod(String),
    SchemaMethod,
    Delegate,
}

impl GetStateMode {
    pub fn label(&self) -> &'static str {
        match self {
            GetStateMode::Include => "include",
            GetStateMode::Exclude => "exclude",
            GetStateMode::IncludeNonDefault => "include_non_default",
            GetStateMode::Property => "property",
            GetStateMode::Predicate(_) => "predicate",
            GetStateMode::ObjectMethod(_) => "object_method",
            GetStateMode::SchemaMethod => SCHEMA_METHOD,
            GetStateMode::Delegate => DELEGATE,
        }
    }
}

// ── Modes ───────────────────────────────────────────────────────────

/// The full mode table of one schema.
#[derive(Clone)]
pub struct Modes {
    pub get: GetMode,
    pub set: SetMode,
    pub delete: DeleteMode,
    pub default: DefaultMode,
    pub validate: ValidateMode,
    pub post_validate: PostValidateMode,
    pub post_get: PostGetMode,
    pub post_set: PostSetMode,
    pub getstate: GetStateMode,
}

impl Default for Modes {
    fn default() -> Self {
        Self {
            get: GetMode::Slot,
            set: SetMode::Slot,
            delete: DeleteMode::Slot,
            default: DefaultMode::NoOp,
            validate: ValidateMode::NoOp,
            post_validate: PostValidateMode::NoOp,
            post_get: PostGetMode::NoOp,
            post_set: PostSetMode::NoOp,
            getstate: GetStateMode::Include,
        }
    }
}

impl Modes {
    /// Every operation forwarded to the delegate schema.
    pub fn delegated() -> Self {
        Self {
            get: GetMode::Delegate,
            set: SetMode::Delegate,
            delete: DeleteMode::Delegate,
            default: DefaultMode::Delegate,
            validate: ValidateMode::Delegate,
            post_validate: PostValidateMode::Delegate,
            post_get: PostGetMode::Delegate,
            post_set: PostSetMode::Delegate,
            getstate: GetStateMode::Delegate,
        }
    }

    /// Mode label per operation, in operation order.
    pub fn labels(&self) -> [(Operation, &'static str); 9] {
        [
            (Operation::Get, self.get.label()),
            (Operation::Set, self.set.label()),
            (Operation::Delete, self.delete.label()),
            (Operation::Default, self.default.label()),
            (Operation::Validate, self.validate.label()),
            (Operation::PostValidate, self.post_validate.label()),
            (Operation::PostGet, self.post_get.label()),
            (Operation::PostSet, self.post_set.label()),
            (Operation::GetState, self.getstate.label()),
        ]
    }

    /// Operations whose mode has the given label.
    pub(crate) fn operations_with(&self, label: &str) -> Vec<Operation> {
        self.labels()
            .into_iter()
            .filter(|(_, l)| *l == label)
            .map(|(op, _)| op)
            .collect()
    }
}

impl fmt::Debug for Modes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (op, label) in self.labels() {
            map.entry(&op.as_str(), &label);
        }
        map.finish()
    }
}
