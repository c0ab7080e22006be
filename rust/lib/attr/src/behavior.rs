//! Per-operation dispatch.
//!
//! Every attribute access ends up in one of the `*_value` entry points
//! below, which match on the schema's mode for that operation. Slot-backed
//! handlers are the only ones touching storage, post hooks and change
//! notification; the other modes hand the operation to their context.

use std::sync::Arc;

use tracing::debug;

use crate::change::{Change, ChangeKind};
use crate::error::{AttrError, Result, ValidationError};
use crate::event::{EventBinder, SignalConnector};
use crate::method::{Method, magic};
use crate::mode::{
    DefaultMode, DeleteMode, GetMode, GetStateMode, PostGetMode, PostSetMode, PostValidateMode,
    SetMode, ValidateMode,
};
use crate::object::Object;
use crate::schema::{AttributeSchema, SchemaHooks};
use crate::value::Value;

pub(crate) fn lookup(object: &Object, name: &str) -> Result<Method> {
    object
        .object_type()
        .lookup_method(name)
        .ok_or_else(|| AttrError::NoSuchMethod {
            type_name: object.type_name().to_string(),
            method: name.to_string(),
        })
}

pub(crate) fn wrong_shape(object: &Object, name: &str, found: &Method, expected: &str) -> AttrError {
    AttrError::config(format!(
        "method '{}.{}' is a {}, expected a {}",
        object.type_name(),
        name,
        found.shape(),
        expected
    ))
}

/// Call a named method of the expected shape on the object's type.
macro_rules! call_method {
    ($object:expr, $name:expr, $variant:ident, $shape:literal, ($($arg:expr),*)) => {{
        let f = match $crate::behavior::lookup($object, $name)? {
            $crate::method::Method::$variant(f) => f,
            other => return Err($crate::behavior::wrong_shape($object, $name, &other, $shape)),
        };
        f($($arg),*)
    }};
}

pub(crate) use call_method;

impl AttributeSchema {
    fn delegate_or_err(&self) -> Result<Arc<AttributeSchema>> {
        self.delegate_schema()
            .ok_or_else(|| AttrError::config(format!("'{}' has no delegate schema", self.name())))
    }

    fn hooks_or_err(&self) -> Result<Arc<dyn SchemaHooks>> {
        self.hooks()
            .ok_or_else(|| AttrError::config(format!("'{}' has no schema hooks", self.name())))
    }

    // ── Get ─────────────────────────────────────────────────────────

    /// Read the attribute from `object`.
    pub fn get_value(&self, object: &Object) -> Result<Value> {
        match self.get_mode() {
            GetMode::NoOp => Ok(Value::null()),
            GetMode::Slot => self.slot_get(object),
            GetMode::Event => Ok(Value::new(EventBinder::new(object, &self.name()))),
            GetMode::Signal => Ok(Value::new(SignalConnector::new(object, &self.name()))),
            GetMode::Property(getter) => self.property_get(object, getter.as_ref()),
            GetMode::CachedProperty(getter) => {
                let index = self.index();
                if let Some(value) = object.storage().get(index) {
                    return Ok(value);
                }
                let value = self.property_get(object, getter.as_ref())?;
                if object.storage().has_slot(index) {
                    object.storage().set(index, value.clone())?;
                }
                Ok(value)
            }
            GetMode::Call(getter) => getter(object),
            GetMode::ObjectMethod(name) => call_method!(object, &name, Getter, "getter", (object)),
            GetMode::SchemaMethod => self.hooks_or_err()?.get(self, object),
            GetMode::Delegate => self.delegate_or_err()?.get_value(object),
        }
    }

    fn slot_get(&self, object: &Object) -> Result<Value> {
        let index = self.index();
        if let Some(value) = object.storage().get(index) {
            return self.post_get(object, value);
        }
        // A failing default leaves the slot unset; the next read retries.
        let default = self.default_value(object)?;
        let value = self.full_validate(object, None, default)?;
        if !object.storage().has_slot(index) {
            // Allocated before this attribute existed: nothing to cache into.
            return self.post_get(object, value);
        }
        object.storage().set(index, value.clone())?;
        let name = self.name();
        if self.is_observed(object, &name) {
            self.notify(
                object,
                &Change::new(ChangeKind::Create, object, &name, value.clone()),
            )?;
        }
        self.post_get(object, value)
    }

    fn property_get(&self, object: &Object, getter: Option<&crate::method::Getter>) -> Result<Value> {
        if let Some(getter) = getter {
            return getter(object);
        }
        let name = self.name();
        let method = format!("{}{}", magic::GET, name);
        if object.object_type().lookup_method(&method).is_none() {
            return Err(AttrError::immutable(object.type_name(), &name, "unreadable attribute"));
        }
        call_method!(object, &method, Getter, "getter", (object))
    }

    // ── Set ─────────────────────────────────────────────────────────

    /// Assign `value` to the attribute on `object`.
    pub fn set_value(&self, object: &Object, value: Value) -> Result<()> {
        match self.set_mode() {
            SetMode::NoOp => Ok(()),
            SetMode::Slot => self.slot_set(object, value),
            SetMode::Constant => Err(AttrError::immutable(
                object.type_name(),
                &self.name(),
                "cannot assign to a constant",
            )),
            SetMode::ReadOnly => {
                if object.storage().is_set(self.index()) {
                    return Err(AttrError::immutable(
                        object.type_name(),
                        &self.name(),
                        "read only attribute can only be set once",
                    ));
                }
                self.slot_set(object, value)
            }
            SetMode::Event => {
                let value = self.full_validate(object, None, value)?;
                let name = self.name();
                if self.is_observed(object, &name) {
                    self.notify(object, &Change::new(ChangeKind::Event, object, &name, value))?;
                }
                Ok(())
            }
            SetMode::Signal => Err(AttrError::immutable(
                object.type_name(),
                &self.name(),
                "cannot assign to a signal",
            )),
            SetMode::Property(setter) => match setter {
                Some(setter) => setter(object, value),
                None => {
                    let name = self.name();
                    let method = format!("{}{}", magic::SET, name);
                    if object.object_type().lookup_method(&method).is_none() {
                        return Err(AttrError::immutable(
                            object.type_name(),
                            &name,
                            "can't set attribute",
                        ));
                    }
                    call_method!(object, &method, Setter, "setter", (object, value))
                }
            },
            SetMode::Call(setter) => setter(object, value),
            SetMode::ObjectMethod(name) => call_method!(object, &name, Setter, "setter", (object, value)),
            SetMode::SchemaMethod => self.hooks_or_err()?.set(self, object, value),
            SetMode::Delegate => self.delegate_or_err()?.set_value(object, value),
        }
    }

    fn slot_set(&self, object: &Object, value: Value) -> Result<()> {
        let index = self.index();
        let old = object.storage().get(index);
        let new = self.full_validate(object, old.as_ref(), value)?;
        object.storage().set(index, new.clone())?;
        self.post_set(object, old.as_ref(), &new)?;

        let name = self.name();
        if !self.is_observed(object, &name) {
            return Ok(());
        }
        let change = match old {
            None => Change::new(ChangeKind::Create, object, &name, new),
            Some(old) => {
                match old.try_eq(&new) {
                    Some(true) => return Ok(()),
                    Some(false) => {}
                    None => debug!(
                        attribute = %name,
                        type_name = new.type_name(),
                        "values not comparable, treating as changed"
                    ),
                }
                Change::new(ChangeKind::Update, object, &name, new).with_old(old)
            }
        };
        self.notify(object, &change)
    }

    // ── Delete ──────────────────────────────────────────────────────

    /// Delete the attribute from `object`. Slot-backed attributes fall
    /// back to their default on the next read.
    pub fn delete_value(&self, object: &Object) -> Result<()> {
        match self.delete_mode() {
            DeleteMode::NoOp => Ok(()),
            DeleteMode::Slot => {
                let Some(old) = object.storage().take(self.index()) else {
                    return Ok(());
                };
                let name = self.name();
                if self.is_observed(object, &name) {
                    self.notify(object, &Change::new(ChangeKind::Delete, object, &name, old))?;
                }
                Ok(())
            }
            DeleteMode::Constant => Err(AttrError::immutable(
                object.type_name(),
                &self.name(),
                "cannot delete a constant",
            )),
            DeleteMode::ReadOnly => Err(AttrError::immutable(
                object.type_name(),
                &self.name(),
                "cannot delete a read only attribute",
            )),
            DeleteMode::Event => Err(AttrError::immutable(
                object.type_name(),
                &self.name(),
                "cannot delete an event",
            )),
            DeleteMode::Signal => Err(AttrError::immutable(
                object.type_name(),
                &self.name(),
                "cannot delete a signal",
            )),
            DeleteMode::Property(deleter) => match deleter {
                Some(deleter) => deleter(object),
                None => {
                    let name = self.name();
                    let method = format!("{}{}", magic::DEL, name);
                    if object.object_type().lookup_method(&method).is_none() {
                        return Err(AttrError::immutable(
                            object.type_name(),
                            &name,
                            "can't delete attribute",
                        ));
                    }
                    call_method!(object, &method, Deleter, "deleter", (object))
                }
            },
            DeleteMode::SchemaMethod => self.hooks_or_err()?.delete(self, object),
            DeleteMode::Delegate => self.delegate_or_err()?.delete_value(object),
        }
    }

    // ── Default ─────────────────────────────────────────────────────

    /// Compute the default value for `object`. Does not validate or store.
    pub fn default_value(&self, object: &Object) -> Result<Value> {
        match self.default_mode() {
            DefaultMode::NoOp => Ok(Value::null()),
            DefaultMode::Static(value) => Ok(value),
            DefaultMode::Factory(factory) => factory(),
            DefaultMode::Call(getter) => getter(object),
            DefaultMode::ObjectMethod(name) => call_method!(object, &name, Getter, "getter", (object)),
            DefaultMode::SchemaMethod => self.hooks_or_err()?.default_value(self, object),
            DefaultMode::NonOptional => Err(AttrError::Unset {
                type_name: object.type_name().to_string(),
                attribute: self.name(),
            }),
            DefaultMode::Delegate => self.delegate_or_err()?.default_value(object),
        }
    }

    // ── Validation ──────────────────────────────────────────────────

    pub fn validate(&self, object: &Object, old: Option<&Value>, new: Value) -> Result<Value> {
        match self.validate_mode() {
            ValidateMode::NoOp => Ok(new),
            ValidateMode::Kind(kind) => {
                if kind.accepts(&new) {
                    Ok(new)
                } else {
                    Err(ValidationError {
                        type_name: object.type_name().to_string(),
                        attribute: self.name(),
                        value: format!("{new:?}"),
                        expected: kind.describe(),
                    }
                    .into())
                }
            }
            ValidateMode::Call(f) => f(object, old, new),
            ValidateMode::ObjectMethod(name) => {
                call_method!(object, &name, Validator, "validator", (object, old, new))
            }
            ValidateMode::SchemaMethod => self.hooks_or_err()?.validate(self, object, old, new),
            ValidateMode::Delegate => self.delegate_or_err()?.validate(object, old, new),
        }
    }

    pub fn post_validate(
        &self,
        object: &Object,
        old: Option<&Value>,
        new: Value,
    ) -> Result<Value> {
        match self.post_validate_mode() {
            PostValidateMode::NoOp => Ok(new),
            PostValidateMode::Call(f) => f(object, old, new),
            PostValidateMode::ObjectMethod(name) => {
                call_method!(object, &name, Validator, "validator", (object, old, new))
            }
            PostValidateMode::SchemaMethod => {
                self.hooks_or_err()?.post_validate(self, object, old, new)
            }
            PostValidateMode::Delegate => self.delegate_or_err()?.post_validate(object, old, new),
        }
    }

    /// Validate then post-validate.
    pub fn full_validate(
        &self,
        object: &Object,
        old: Option<&Value>,
        new: Value,
    ) -> Result<Value> {
        let new = self.validate(object, old, new)?;
        self.post_validate(object, old, new)
    }

    // ── Post get / post set ─────────────────────────────────────────

    pub fn post_get(&self, object: &Object, value: Value) -> Result<Value> {
        match self.post_get_mode() {
            PostGetMode::NoOp => Ok(value),
            PostGetMode::Call(f) => f(object, value),
            PostGetMode::ObjectMethod(name) => {
                call_method!(object, &name, PostGetter, "post-getter", (object, value))
            }
            PostGetMode::SchemaMethod => self.hooks_or_err()?.post_get(self, object, value),
            PostGetMode::Delegate => self.delegate_or_err()?.post_get(object, value),
        }
    }

    pub fn post_set(&self, object: &Object, old: Option<&Value>, new: &Value) -> Result<()> {
        match self.post_set_mode() {
            PostSetMode::NoOp => Ok(()),
            PostSetMode::Call(f) => f(object, old, new),
            PostSetMode::ObjectMethod(name) => {
                call_method!(object, &name, PostSetter, "post-setter", (object, old, new))
            }
            PostSetMode::SchemaMethod => self.hooks_or_err()?.post_set(self, object, old, new),
            PostSetMode::Delegate => self.delegate_or_err()?.post_set(object, old, new),
        }
    }

    // ── Get state ───────────────────────────────────────────────────

    /// Whether the attribute belongs in a state snapshot of `object`.
    pub fn should_getstate(&self, object: &Object) -> Result<bool> {
        match self.getstate_mode() {
            GetStateMode::Include => Ok(true),
            GetStateMode::Exclude => Ok(false),
            GetStateMode::IncludeNonDefault => Ok(object.storage().is_set(self.index())),
            GetStateMode::Property => Ok(match self.set_mode() {
                SetMode::Property(Some(_)) => true,
                SetMode::Property(None) => object
                    .object_type()
                    .lookup_method(&format!("{}{}", magic::SET, self.name()))
                    .is_some(),
                _ => true,
            }),
            GetStateMode::Predicate(f) => Ok(f(object, &self.name())),
            GetStateMode::ObjectMethod(name) => {
                let attribute = self.name();
                Ok(call_method!(object, &name, StatePredicate, "state predicate", (object, &attribute)))
            }
            GetStateMode::SchemaMethod => Ok(self.hooks_or_err()?.should_getstate(self, object)),
            GetStateMode::Delegate => self.delegate_or_err()?.should_getstate(object),
        }
    }

    // ── Notification ────────────────────────────────────────────────

    /// Whether a change of this attribute on `object` would reach anyone.
    pub(crate) fn is_observed(&self, object: &Object, name: &str) -> bool {
        object.notifications_enabled()
            && (self.has_observers() || object.has_dynamic_observers(name))
    }

    /// Dispatch `change` to the static observers, then to the observers
    /// registered on `object`. Nothing runs while `object` is suppressed.
    pub fn notify(&self, object: &Object, change: &Change) -> Result<()> {
        if !object.notifications_enabled() {
            return Ok(());
        }
        self.notify_static(change)?;
        object.notify_dynamic(&change.name, change)
    }

    /// Drop a cached property value and report the reset to observers.
    pub(crate) fn reset(&self, object: &Object) -> Result<()> {
        let old = match self.get_mode() {
            GetMode::CachedProperty(_) => object.storage().take(self.index()),
            GetMode::Property(_) => None,
            GetMode::Delegate => return self.delegate_or_err()?.reset(object),
            other => {
                return Err(AttrError::config(format!(
                    "'{}.{}' is not a property (get mode '{}')",
                    object.type_name(),
                    self.name(),
                    other.label()
                )));
            }
        };
        let name = self.name();
        if !self.is_observed(object, &name) {
            return Ok(());
        }
        let new = self.get_value(object)?;
        let mut change = Change::new(ChangeKind::Property, object, &name, new);
        if let Some(old) = old {
            change = change.with_old(old);
        }
        self.notify(object, &change)
    }
}
