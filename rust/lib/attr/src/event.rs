//! Emitters returned by reading event and signal attributes.

use std::fmt;

use crate::change::{Change, ChangeKind};
use crate::error::Result;
use crate::object::Object;
use crate::observer::Observer;
use crate::value::Value;

/// An event attribute bound to one object.
///
/// Emitting validates the payload like an assignment would and hands it
/// to the attribute's observers. Nothing is stored.
#[derive(Clone, PartialEq)]
pub struct EventBinder {
    object: Object,
    name: String,
}

impl EventBinder {
    pub(crate) fn new(object: &Object, name: &str) -> Self {
        Self {
            object: object.clone(),
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn object(&self) -> &Object {
        &self.object
    }

    pub fn emit(&self, value: impl Into<Value>) -> Result<()> {
        self.object
            .schema_or_err(&self.name)?
            .set_value(&self.object, value.into())
    }

    pub fn connect(&self, observer: Observer) -> Result<()> {
        self.object.observe(&self.name, observer)
    }

    pub fn disconnect(&self, observer: &Observer) -> Result<()> {
        self.object.unobserve(&self.name, observer)
    }
}

impl fmt::Debug for EventBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBinder({}.{})", self.object.type_name(), self.name)
    }
}

/// A signal attribute bound to one object.
///
/// Unlike an event, a signal payload is not validated.
#[derive(Clone, PartialEq)]
pub struct SignalConnector {
    object: Object,
    name: String,
}

impl SignalConnector {
    pub(crate) fn new(object: &Object, name: &str) -> Self {
        Self {
            object: object.clone(),
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn emit(&self, value: impl Into<Value>) -> Result<()> {
        let schema = self.object.schema_or_err(&self.name)?;
        if !schema.is_observed(&self.object, &self.name) {
            return Ok(());
        }
        let change = Change::new(ChangeKind::Event, &self.object, &self.name, value.into());
        schema.notify(&self.object, &change)
    }

    pub fn connect(&self, observer: Observer) -> Result<()> {
        self.object.observe(&self.name, observer)
    }

    pub fn disconnect(&self, observer: &Observer) -> Result<()> {
        self.object.unobserve(&self.name, observer)
    }
}

impl fmt::Debug for SignalConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignalConnector({}.{})", self.object.type_name(), self.name)
    }
}
