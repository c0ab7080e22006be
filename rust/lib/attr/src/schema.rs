//! Attribute schemas.
//!
//! One [`AttributeSchema`] describes one declared attribute of one object
//! type: its name, its storage slot, a mode per operation, optional
//! metadata and the static observers shared by every instance.
//!
//! Schemas are shared through `Arc`. Sharing is how inheritance works: a
//! subclass that does not touch an attribute keeps pointing at its base's
//! schema. A schema is configured with the `with_*` builders before it is
//! declared; afterwards it only changes through a [`SchemaEditor`] from
//! [`ObjectType::customize`](crate::ObjectType::customize), which first
//! clones any schema the type does not own. `Clone` is a deep copy with a
//! fresh identity.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Value as JsonValue, json};

use crate::change::{Change, ChangeTypes};
use crate::error::{AttrError, Result};
use crate::method::{Deleter, Getter, Setter};
use crate::mode::{
    DELEGATE, DefaultMode, DeleteMode, GetMode, GetStateMode, Modes, Operation, PostGetMode,
    PostSetMode, PostValidateMode, SCHEMA_METHOD, SetMode, ValidateMode,
};
use crate::object::Object;
use crate::observer::{Observer, StaticObservers};
use crate::value::{Value, ValueKind};

static NEXT_SCHEMA_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a schema. Clones get a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(u64);

impl SchemaId {
    fn next() -> Self {
        SchemaId(NEXT_SCHEMA_ID.fetch_add(1, Ordering::Relaxed))
    }
}

// ── SchemaHooks ─────────────────────────────────────────────────────

/// Behavior supplied by a specialized schema kind.
///
/// Called for every operation whose mode is `SchemaMethod`. Unimplemented
/// operations fall back to a configuration error (get, set, delete,
/// default) or a pass-through (validation, post hooks).
pub trait SchemaHooks: Send + Sync {
    fn get(&self, schema: &AttributeSchema, _object: &Object) -> Result<Value> {
        Err(unsupported(schema, Operation::Get))
    }

    fn set(&self, schema: &AttributeSchema, _object: &Object, _value: Value) -> Result<()> {
        Err(unsupported(schema, Operation::Set))
    }

    fn delete(&self, schema: &AttributeSchema, _object: &Object) -> Result<()> {
        Err(unsupported(schema, Operation::Delete))
    }

    fn default_value(&self, schema: &AttributeSchema, _object: &Object) -> Result<Value> {
        Err(unsupported(schema, Operation::Default))
    }

    fn validate(
        &self,
        _schema: &AttributeSchema,
        _object: &Object,
        _old: Option<&Value>,
        new: Value,
    ) -> Result<Value> {
        Ok(new)
    }

    fn post_validate(
        &self,
        _schema: &AttributeSchema,
        _object: &Object,
        _old: Option<&Value>,
        new: Value,
    ) -> Result<Value> {
        Ok(new)
    }

    fn post_get(&self, _schema: &AttributeSchema, _object: &Object, value: Value) -> Result<Value> {
        Ok(value)
    }

    fn post_set(
        &self,
        _schema: &AttributeSchema,
        _object: &Object,
        _old: Option<&Value>,
        _new: &Value,
    ) -> Result<()> {
        Ok(())
    }

    fn should_getstate(&self, _schema: &AttributeSchema, _object: &Object) -> bool {
        true
    }
}

fn unsupported(schema: &AttributeSchema, op: Operation) -> AttrError {
    AttrError::config(format!(
        "schema hooks of '{}' do not implement '{}'",
        schema.name(),
        op
    ))
}

// ── AttributeSchema ─────────────────────────────────────────────────

#[derive(Clone)]
pub(crate) struct SchemaState {
    pub name: String,
    pub index: usize,
    pub modes: Modes,
    /// Boxed and absent by default to keep schemas small.
    pub metadata: Option<Box<IndexMap<String, JsonValue>>>,
    pub delegate: Option<Arc<AttributeSchema>>,
    pub hooks: Option<Arc<dyn SchemaHooks>>,
}

impl SchemaState {
    fn check_shape(&self) -> Result<()> {
        if self.delegate.is_none() {
            if let Some(op) = self.modes.operations_with(DELEGATE).first() {
                return Err(AttrError::config(format!(
                    "'{}': delegate mode for '{}' requires a delegate schema",
                    self.name, op
                )));
            }
        }
        if self.hooks.is_none() {
            if let Some(op) = self.modes.operations_with(SCHEMA_METHOD).first() {
                return Err(AttrError::config(format!(
                    "'{}': schema method mode for '{}' requires schema hooks",
                    self.name, op
                )));
            }
        }
        let empty_method = matches!(&self.modes.get, GetMode::ObjectMethod(m) if m.is_empty())
            || matches!(&self.modes.set, SetMode::ObjectMethod(m) if m.is_empty())
            || matches!(&self.modes.default, DefaultMode::ObjectMethod(m) if m.is_empty())
            || matches!(&self.modes.validate, ValidateMode::ObjectMethod(m) if m.is_empty())
            || matches!(&self.modes.post_validate, PostValidateMode::ObjectMethod(m) if m.is_empty())
            || matches!(&self.modes.post_get, PostGetMode::ObjectMethod(m) if m.is_empty())
            || matches!(&self.modes.post_set, PostSetMode::ObjectMethod(m) if m.is_empty())
            || matches!(&self.modes.getstate, GetStateMode::ObjectMethod(m) if m.is_empty());
        if empty_method {
            return Err(AttrError::config(format!(
                "'{}': object method modes need a method name",
                self.name
            )));
        }
        Ok(())
    }
}

/// Configuration of one declared attribute.
pub struct AttributeSchema {
    id: SchemaId,
    state: RwLock<SchemaState>,
    observers: StaticObservers,
    /// Set once a type table has taken this schema. Any further table
    /// receives a clone.
    claimed: AtomicBool,
}

impl AttributeSchema {
    /// A slot-backed attribute with a null default.
    pub fn new() -> Self {
        Self::with_modes(Modes::default())
    }

    fn with_modes(modes: Modes) -> Self {
        Self {
            id: SchemaId::next(),
            state: RwLock::new(SchemaState {
                name: String::new(),
                index: 0,
                modes,
                metadata: None,
                delegate: None,
                hooks: None,
            }),
            observers: StaticObservers::default(),
            claimed: AtomicBool::new(false),
        }
    }

    // ── Presets ─────────────────────────────────────────────────────

    /// A value fixed at `value`; every set or delete fails. Left out of
    /// state snapshots.
    pub fn constant(value: impl Into<Value>) -> Self {
        let mut modes = Modes::default();
        modes.set = SetMode::Constant;
        modes.delete = DeleteMode::Constant;
        modes.default = DefaultMode::Static(value.into());
        modes.getstate = GetStateMode::Exclude;
        Self::with_modes(modes)
    }

    /// Assignable once; later sets and every delete fail.
    pub fn read_only() -> Self {
        let mut modes = Modes::default();
        modes.set = SetMode::ReadOnly;
        modes.delete = DeleteMode::ReadOnly;
        Self::with_modes(modes)
    }

    /// Stateless: reads return an [`EventBinder`](crate::EventBinder),
    /// assignments validate and notify without storing.
    pub fn event() -> Self {
        Self::with_modes(Modes {
            get: GetMode::Event,
            set: SetMode::Event,
            delete: DeleteMode::Event,
            getstate: GetStateMode::Exclude,
            ..Modes::default()
        })
    }

    /// Stateless: reads return a [`SignalConnector`](crate::SignalConnector);
    /// assignment and deletion fail.
    pub fn signal() -> Self {
        Self::with_modes(Modes {
            get: GetMode::Signal,
            set: SetMode::Signal,
            delete: DeleteMode::Signal,
            getstate: GetStateMode::Exclude,
            ..Modes::default()
        })
    }

    /// Computed on every read. Missing functions fall back to the
    /// `_get_<name>`, `_set_<name>` and `_del_<name>` methods of the type.
    pub fn property(getter: Option<Getter>, setter: Option<Setter>, deleter: Option<Deleter>) -> Self {
        Self::with_modes(Modes {
            get: GetMode::Property(getter),
            set: SetMode::Property(setter),
            delete: DeleteMode::Property(deleter),
            getstate: GetStateMode::Property,
            ..Modes::default()
        })
    }

    /// Read-only property computed by `f`.
    pub fn computed(f: impl Fn(&Object) -> Result<Value> + Send + Sync + 'static) -> Self {
        Self::property(Some(Arc::new(f)), None, None)
    }

    /// Property computed once and cached in its slot until reset.
    pub fn cached(getter: Option<Getter>) -> Self {
        Self::with_modes(Modes {
            get: GetMode::CachedProperty(getter),
            set: SetMode::Property(None),
            delete: DeleteMode::Property(None),
            getstate: GetStateMode::Property,
            ..Modes::default()
        })
    }

    /// Forward every operation to `inner`, which shares this schema's
    /// name and slot.
    pub fn delegate(inner: AttributeSchema) -> Self {
        let schema = Self::with_modes(Modes::delegated());
        schema.state.write().delegate = Some(Arc::new(inner));
        schema
    }

    // ── Builders ────────────────────────────────────────────────────

    pub fn with_default(self, value: impl Into<Value>) -> Self {
        self.with_default_mode(DefaultMode::Static(value.into()))
    }

    /// Default computed by a zero-argument factory, once per instance.
    pub fn with_factory(self, f: impl Fn() -> Result<Value> + Send + Sync + 'static) -> Self {
        self.with_default_mode(DefaultMode::Factory(Arc::new(f)))
    }

    /// Accept only values of type `T`.
    pub fn typed<T: std::any::Any>(self) -> Self {
        self.with_validate_mode(ValidateMode::Kind(ValueKind::of::<T>()))
    }

    /// Accept values of type `T` or null.
    pub fn optional<T: std::any::Any>(self) -> Self {
        self.with_validate_mode(ValidateMode::Kind(ValueKind::of::<T>().optional()))
    }

    pub fn with_validator(
        self,
        f: impl Fn(&Object, Option<&Value>, Value) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.with_validate_mode(ValidateMode::Call(Arc::new(f)))
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.state
            .get_mut()
            .metadata
            .get_or_insert_with(Default::default)
            .insert(key.into(), value);
        self
    }

    pub fn with_hooks(mut self, hooks: impl SchemaHooks + 'static) -> Self {
        self.state.get_mut().hooks = Some(Arc::new(hooks));
        self
    }

    // ── Identity / layout ───────────────────────────────────────────

    pub fn id(&self) -> SchemaId {
        self.id
    }

    pub fn name(&self) -> String {
        self.state.read().name.clone()
    }

    pub fn index(&self) -> usize {
        self.state.read().index
    }

    /// Rename, keeping the delegate in step.
    pub(crate) fn set_name(&self, name: &str) {
        let delegate = {
            let mut state = self.state.write();
            state.name = name.to_string();
            state.delegate.clone()
        };
        if let Some(delegate) = delegate {
            delegate.set_name(name);
        }
    }

    /// Move to another slot, keeping the delegate in step.
    pub(crate) fn set_index(&self, index: usize) {
        let delegate = {
            let mut state = self.state.write();
            state.index = index;
            state.delegate.clone()
        };
        if let Some(delegate) = delegate {
            delegate.set_index(index);
        }
    }

    /// Mark the schema as taken by a type. Returns false if another type
    /// (or another name in the same type) already holds it.
    pub(crate) fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }

    pub fn delegate_schema(&self) -> Option<Arc<AttributeSchema>> {
        self.state.read().delegate.clone()
    }

    pub(crate) fn hooks(&self) -> Option<Arc<dyn SchemaHooks>> {
        self.state.read().hooks.clone()
    }

    /// Replace the delegate. The new delegate takes this schema's name and slot.
    pub(crate) fn set_delegate(&self, inner: AttributeSchema) {
        let (name, index) = {
            let state = self.state.read();
            (state.name.clone(), state.index)
        };
        inner.set_name(&name);
        inner.set_index(index);
        self.state.write().delegate = Some(Arc::new(inner));
    }

    pub(crate) fn set_hooks(&self, hooks: Arc<dyn SchemaHooks>) {
        self.state.write().hooks = Some(hooks);
    }

    /// Check that every mode has the context it needs.
    pub fn check(&self) -> Result<()> {
        self.state.read().check_shape()
    }

    pub fn modes(&self) -> Modes {
        self.state.read().modes.clone()
    }

    // ── Metadata ────────────────────────────────────────────────────

    pub fn metadata(&self) -> IndexMap<String, JsonValue> {
        self.state
            .read()
            .metadata
            .as_deref()
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_metadata(&self, key: &str) -> Option<JsonValue> {
        self.state.read().metadata.as_ref()?.get(key).cloned()
    }

    pub(crate) fn set_metadata(&self, key: impl Into<String>, value: JsonValue) {
        self.state
            .write()
            .metadata
            .get_or_insert_with(Default::default)
            .insert(key.into(), value);
    }

    // ── Static observers ────────────────────────────────────────────

    pub(crate) fn add_static_observer(&self, observer: Observer) {
        self.add_static_observer_with(observer, ChangeTypes::all());
    }

    pub(crate) fn add_static_observer_with(&self, observer: Observer, types: ChangeTypes) {
        if let Some(delegate) = self.delegate_schema() {
            delegate.add_static_observer_with(observer.clone(), types);
        }
        self.observers.add(observer, types);
    }

    pub(crate) fn remove_static_observer(&self, observer: &Observer) {
        if let Some(delegate) = self.delegate_schema() {
            delegate.remove_static_observer(observer);
        }
        self.observers.remove(observer);
    }

    pub(crate) fn clear_static_observers(&self) {
        if let Some(delegate) = self.delegate_schema() {
            delegate.clear_static_observers();
        }
        self.observers.clear();
    }

    pub fn has_observers(&self) -> bool {
        !self.observers.is_empty()
    }

    pub fn has_observer(&self, observer: &Observer) -> bool {
        self.observers.contains(observer)
    }

    pub fn static_observers(&self) -> Vec<Observer> {
        self.observers.observers()
    }

    /// Take over the static observers of the schema this one replaces.
    pub(crate) fn copy_static_observers(&self, other: &AttributeSchema) {
        if std::ptr::eq(self, other) {
            return;
        }
        if let Some(delegate) = self.delegate_schema() {
            delegate.copy_static_observers(other);
        }
        self.observers.extend_from(&other.observers);
    }

    pub(crate) fn notify_static(&self, change: &Change) -> Result<()> {
        self.observers.dispatch(change)
    }

    // ── Introspection ───────────────────────────────────────────────

    /// JSON description of the schema: name, slot, mode per operation,
    /// metadata and delegate.
    pub fn describe(&self) -> JsonValue {
        let state = self.state.read().clone();
        let modes: serde_json::Map<String, JsonValue> = state
            .modes
            .labels()
            .into_iter()
            .map(|(op, label)| (op.as_str().to_string(), json!(label)))
            .collect();
        let mut ir = json!({
            "name": state.name,
            "index": state.index,
            "modes": modes,
            "static_observers": self.observers.observers().len(),
        });
        if let Some(metadata) = &state.metadata {
            ir["metadata"] = json!(metadata.as_ref());
        }
        if let Some(delegate) = &state.delegate {
            ir["delegate"] = delegate.describe();
        }
        ir
    }
}

macro_rules! mode_accessors {
    ($($field:ident: $ty:ty => $get:ident, $set:ident, $with:ident;)*) => {
        impl AttributeSchema {
            $(
                pub fn $get(&self) -> $ty {
                    self.state.read().modes.$field.clone()
                }

                /// Rebind this mode in place. Fails, leaving the old mode,
                /// when the schema lacks the context the mode needs.
                pub(crate) fn $set(&self, mode: $ty) -> Result<()> {
                    let mut state = self.state.write();
                    let previous = std::mem::replace(&mut state.modes.$field, mode);
                    if let Err(err) = state.check_shape() {
                        state.modes.$field = previous;
                        return Err(err);
                    }
                    Ok(())
                }

                pub fn $with(mut self, mode: $ty) -> Self {
                    self.state.get_mut().modes.$field = mode;
                    self
                }
            )*
        }

        impl SchemaEditor<'_> {
            $(
                pub fn $set(&self, mode: $ty) -> Result<()> {
                    self.schema.$set(mode)
                }
            )*
        }
    };
}

mode_accessors! {
    get: GetMode => get_mode, set_get_mode, with_get_mode;
    set: SetMode => set_mode, set_set_mode, with_set_mode;
    delete: DeleteMode => delete_mode, set_delete_mode, with_delete_mode;
    default: DefaultMode => default_mode, set_default_mode, with_default_mode;
    validate: ValidateMode => validate_mode, set_validate_mode, with_validate_mode;
    post_validate: PostValidateMode => post_validate_mode, set_post_validate_mode, with_post_validate_mode;
    post_get: PostGetMode => post_get_mode, set_post_get_mode, with_post_get_mode;
    post_set: PostSetMode => post_set_mode, set_post_set_mode, with_post_set_mode;
    getstate: GetStateMode => getstate_mode, set_getstate_mode, with_getstate_mode;
}

// ── SchemaEditor ────────────────────────────────────────────────────

/// Mutable view of a schema owned by the type that handed it out.
///
/// Obtained from [`ObjectType::customize`](crate::ObjectType::customize),
/// which clones an inherited schema before giving access to it, so edits
/// never reach a base type.
pub struct SchemaEditor<'a> {
    schema: &'a AttributeSchema,
}

impl<'a> SchemaEditor<'a> {
    pub(crate) fn new(schema: &'a AttributeSchema) -> Self {
        Self { schema }
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: JsonValue) {
        self.schema.set_metadata(key, value);
    }

    pub fn set_delegate(&self, inner: AttributeSchema) {
        self.schema.set_delegate(inner);
    }

    pub fn set_hooks(&self, hooks: Arc<dyn SchemaHooks>) {
        self.schema.set_hooks(hooks);
    }

    pub fn add_static_observer(&self, observer: Observer) {
        self.schema.add_static_observer(observer);
    }

    pub fn add_static_observer_with(&self, observer: Observer, types: ChangeTypes) {
        self.schema.add_static_observer_with(observer, types);
    }

    pub fn remove_static_observer(&self, observer: &Observer) {
        self.schema.remove_static_observer(observer);
    }

    pub fn clear_static_observers(&self) {
        self.schema.clear_static_observers();
    }
}

impl std::ops::Deref for SchemaEditor<'_> {
    type Target = AttributeSchema;

    fn deref(&self) -> &AttributeSchema {
        self.schema
    }
}

impl Default for AttributeSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for AttributeSchema {
    /// Independent copy: same name, slot, modes, metadata and static
    /// observers, new identity. A delegate is copied too.
    fn clone(&self) -> Self {
        let mut state = self.state.read().clone();
        state.delegate = state
            .delegate
            .as_ref()
            .map(|delegate| Arc::new(delegate.as_ref().clone()));
        Self {
            id: SchemaId::next(),
            state: RwLock::new(state),
            observers: self.observers.duplicate(),
            claimed: AtomicBool::new(false),
        }
    }
}

impl fmt::Debug for AttributeSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("AttributeSchema")
            .field("id", &self.id)
            .field("name", &state.name)
            .field("index", &state.index)
            .field("modes", &state.modes)
            .finish()
    }
}
