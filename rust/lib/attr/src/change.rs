//! Change records passed to observers.

use indexmap::IndexMap;
use serde::Serialize;

use crate::object::Object;
use crate::value::Value;

/// What happened to an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// First value of a slot, either assigned or computed by the default mode.
    Create,
    /// Slot value replaced by an unequal value.
    Update,
    /// Slot cleared.
    Delete,
    /// Event or signal emission; nothing was stored.
    Event,
    /// Cached property reset.
    Property,
    /// Mutation inside a container value.
    Container,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
            ChangeKind::Event => "event",
            ChangeKind::Property => "property",
            ChangeKind::Container => "container",
        }
    }

    /// The filter bit matching this kind.
    pub fn flag(&self) -> ChangeTypes {
        match self {
            ChangeKind::Create => ChangeTypes::CREATE,
            ChangeKind::Update => ChangeTypes::UPDATE,
            ChangeKind::Delete => ChangeTypes::DELETE,
            ChangeKind::Event => ChangeTypes::EVENT,
            ChangeKind::Property => ChangeTypes::PROPERTY,
            ChangeKind::Container => ChangeTypes::CONTAINER,
        }
    }
}

bitflags::bitflags! {
    /// Change kinds an observer wants to receive.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChangeTypes: u8 {
        const CREATE = 1 << 0;
        const UPDATE = 1 << 1;
        const DELETE = 1 << 2;
        const EVENT = 1 << 3;
        const PROPERTY = 1 << 4;
        const CONTAINER = 1 << 5;
    }
}

impl Default for ChangeTypes {
    fn default() -> Self {
        ChangeTypes::all()
    }
}

/// One attribute change, built transiently per notification.
///
/// For `Delete`, `value` holds the value that was removed. For `Update`
/// and `Property`, `old` holds the previous value.
#[derive(Debug, Clone)]
pub struct Change {
    pub kind: ChangeKind,
    pub name: String,
    pub object: Object,
    pub value: Value,
    pub old: Option<Value>,
    /// Operation specific fields for container changes.
    pub extra: IndexMap<String, Value>,
}

impl Change {
    pub fn new(kind: ChangeKind, object: &Object, name: &str, value: Value) -> Self {
        Self {
            kind,
            name: name.to_string(),
            object: object.clone(),
            value,
            old: None,
            extra: IndexMap::new(),
        }
    }

    pub fn with_old(mut self, old: Value) -> Self {
        self.old = Some(old);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}
