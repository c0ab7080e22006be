//! Instances and the per-instance access surface.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use crate::behavior::call_method;
use crate::change::{Change, ChangeKind, ChangeTypes};
use crate::error::{AttrError, Result};
use crate::extended::ExtendedObserver;
use crate::object_type::ObjectType;
use crate::observer::{DynamicObservers, Observer};
use crate::schema::AttributeSchema;
use crate::storage::ObjectStorage;
use crate::value::Value;

struct ObjectInner {
    ty: Arc<ObjectType>,
    storage: ObjectStorage,
    observers: DynamicObservers,
    /// Nesting depth of active suppression scopes.
    suppress: AtomicUsize,
    frozen: AtomicBool,
}

/// An instance of an [`ObjectType`].
///
/// Cloning an `Object` clones the handle; both refer to the same instance.
#[derive(Clone)]
pub struct Object(Arc<ObjectInner>);

/// Non-owning handle, used by bound-method observers.
#[derive(Clone)]
pub struct WeakObject(Weak<ObjectInner>);

impl WeakObject {
    pub fn upgrade(&self) -> Option<Object> {
        self.0.upgrade().map(Object)
    }

    pub fn ptr_eq(&self, other: &WeakObject) -> bool {
        self.0.ptr_eq(&other.0)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl Object {
    /// Allocate an instance with every slot unset.
    pub fn new(ty: &Arc<ObjectType>) -> Self {
        Object(Arc::new(ObjectInner {
            ty: ty.clone(),
            storage: ObjectStorage::new(ty.slot_count()),
            observers: DynamicObservers::default(),
            suppress: AtomicUsize::new(0),
            frozen: AtomicBool::new(false),
        }))
    }

    /// Allocate an instance and assign initial values in order.
    pub fn with_values<'a, V: Into<Value>>(
        ty: &Arc<ObjectType>,
        values: impl IntoIterator<Item = (&'a str, V)>,
    ) -> Result<Self> {
        let object = Self::new(ty);
        for (name, value) in values {
            object.set(name, value)?;
        }
        Ok(object)
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject(Arc::downgrade(&self.0))
    }

    pub fn object_type(&self) -> &Arc<ObjectType> {
        &self.0.ty
    }

    pub fn type_name(&self) -> &str {
        self.0.ty.name()
    }

    pub(crate) fn storage(&self) -> &ObjectStorage {
        &self.0.storage
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    // ── Attribute access ────────────────────────────────────────────

    pub fn schemas(&self) -> Vec<Arc<AttributeSchema>> {
        self.0.ty.schemas()
    }

    pub fn schema(&self, name: &str) -> Option<Arc<AttributeSchema>> {
        self.0.ty.schema(name)
    }

    pub(crate) fn schema_or_err(&self, name: &str) -> Result<Arc<AttributeSchema>> {
        self.schema(name).ok_or_else(|| AttrError::NoSuchAttribute {
            type_name: self.type_name().to_string(),
            attribute: name.to_string(),
        })
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        self.schema_or_err(name)?.get_value(self)
    }

    /// Read and downcast. `None` if the value has another type.
    pub fn get_as<T: Clone + 'static>(&self, name: &str) -> Result<Option<T>> {
        Ok(self.get(name)?.get::<T>())
    }

    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let schema = self.schema_or_err(name)?;
        self.check_frozen(name)?;
        schema.set_value(self, value.into())
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let schema = self.schema_or_err(name)?;
        self.check_frozen(name)?;
        schema.delete_value(self)
    }

    /// Raw slot read. Bypasses every mode; unset reads as `None`.
    pub fn get_slot(&self, index: usize) -> Option<Value> {
        self.0.storage.get(index)
    }

    /// Raw slot write. No validation, no notification.
    pub fn set_slot(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        self.0.storage.set(index, value.into()).map(|_| ())
    }

    pub fn clear_slot(&self, index: usize) -> Option<Value> {
        self.0.storage.take(index)
    }

    // ── Freezing ────────────────────────────────────────────────────

    /// Reject every later set and delete.
    pub fn freeze(&self) {
        self.0.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.load(Ordering::Acquire)
    }

    fn check_frozen(&self, name: &str) -> Result<()> {
        if self.is_frozen() {
            return Err(AttrError::Frozen {
                type_name: self.type_name().to_string(),
                attribute: name.to_string(),
            });
        }
        Ok(())
    }

    // ── Observation ─────────────────────────────────────────────────

    /// Observe attribute `path` on this instance. A dotted path such as
    /// `"child.value"` follows whatever object `child` currently holds.
    pub fn observe(&self, path: &str, observer: Observer) -> Result<()> {
        self.observe_with(path, observer, ChangeTypes::all())
    }

    /// Observe several attributes with the same observer.
    pub fn observe_many(&self, paths: &[&str], observer: Observer) -> Result<()> {
        for path in paths {
            self.observe(path, observer.clone())?;
        }
        Ok(())
    }

    /// Observe `path`, receiving only the given change kinds.
    pub fn observe_with(&self, path: &str, observer: Observer, types: ChangeTypes) -> Result<()> {
        let Some((head, rest)) = path.split_once('.') else {
            self.schema_or_err(path)?;
            self.0.observers.add(path, observer, types);
            return Ok(());
        };
        self.schema_or_err(head)?;
        let ext = Arc::new(ExtendedObserver::new(rest, observer, types));
        self.0.observers.add(
            head,
            Observer::Extended(ext.clone()),
            ExtendedObserver::head_types(),
        );
        match self.current_object(head)? {
            Some(target) => ext.attach(self, &target),
            None => Ok(()),
        }
    }

    /// Remove one observer from `path`.
    pub fn unobserve(&self, path: &str, observer: &Observer) -> Result<()> {
        let Some((head, rest)) = path.split_once('.') else {
            self.0.observers.remove(path, observer);
            return Ok(());
        };
        let ext = Arc::new(ExtendedObserver::new(rest, observer.clone(), ChangeTypes::all()));
        self.0.observers.remove(head, &Observer::Extended(ext.clone()));
        // A head holding something other than an object has nothing attached.
        let target = self
            .schema(head)
            .and_then(|schema| self.0.storage.get(schema.index()))
            .and_then(|value| value.as_object().cloned());
        match target {
            Some(target) => target.unobserve(rest, &ext.resolve(self)),
            None => Ok(()),
        }
    }

    /// Remove every observer of one attribute.
    pub fn unobserve_attr(&self, name: &str) {
        self.0.observers.remove_topic(name);
    }

    /// Remove every observer of every attribute.
    pub fn unobserve_all(&self) {
        self.0.observers.clear();
    }

    /// Whether anything observes `name`: static observers on the schema
    /// or observers registered on this instance.
    pub fn has_observers(&self, name: &str) -> bool {
        self.schema(name).is_some_and(|s| s.has_observers()) || self.has_dynamic_observers(name)
    }

    pub fn has_observer(&self, name: &str, observer: &Observer) -> bool {
        self.schema(name).is_some_and(|s| s.has_observer(observer))
            || self.0.observers.contains(name, observer)
    }

    /// Observers registered on this instance for `name`.
    pub fn observers(&self, name: &str) -> Vec<Observer> {
        self.0.observers.observers(name)
    }

    pub(crate) fn has_dynamic_observers(&self, name: &str) -> bool {
        !self.0.observers.is_empty() && self.0.observers.has_observers(name)
    }

    pub(crate) fn notify_dynamic(&self, name: &str, change: &Change) -> Result<()> {
        if self.0.observers.is_empty() {
            return Ok(());
        }
        self.0.observers.dispatch(name, change)
    }

    /// Object currently stored in the slot of `name`, without computing
    /// a default. Errors if the slot holds something that is not an object.
    fn current_object(&self, name: &str) -> Result<Option<Object>> {
        let schema = self.schema_or_err(name)?;
        match self.0.storage.get(schema.index()) {
            None => Ok(None),
            Some(value) if value.is_null() => Ok(None),
            Some(value) => match value.as_object() {
                Some(object) => Ok(Some(object.clone())),
                None => Err(AttrError::NotObservable {
                    attribute: name.to_string(),
                    value: format!("{value:?}"),
                }),
            },
        }
    }

    /// Invoke the observer method `method` of this object's type.
    pub fn call_observer(&self, method: &str, change: &Change) -> Result<()> {
        call_method!(self, method, Observer, "observer", (self, change))
    }

    // ── Notification ────────────────────────────────────────────────

    /// Dispatch a caller-built change to the observers of `name`.
    pub fn notify(&self, name: &str, change: &Change) -> Result<()> {
        self.schema_or_err(name)?.notify(self, change)
    }

    /// Report a mutation inside the container held by `name`. `extra`
    /// describes the operation (for instance `operation`, `item`).
    pub fn notify_container(
        &self,
        name: &str,
        value: Value,
        extra: IndexMap<String, Value>,
    ) -> Result<()> {
        let schema = self.schema_or_err(name)?;
        if !schema.is_observed(self, name) {
            return Ok(());
        }
        let mut change = Change::new(ChangeKind::Container, self, name, value);
        change.extra = extra;
        schema.notify(self, &change)
    }

    /// Drop the cached value of a property and notify a `property` change.
    pub fn reset_property(&self, name: &str) -> Result<()> {
        self.schema_or_err(name)?.reset(self)
    }

    // ── Suppression ─────────────────────────────────────────────────

    pub fn notifications_enabled(&self) -> bool {
        self.0.suppress.load(Ordering::Acquire) == 0
    }

    /// Silence notifications until the returned guard drops. Scopes nest.
    pub fn suppress_notifications(&self) -> SuppressGuard {
        self.0.suppress.fetch_add(1, Ordering::AcqRel);
        SuppressGuard {
            object: self.clone(),
        }
    }

    /// Run `f` with notifications silenced.
    pub fn with_suppressed<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.suppress_notifications();
        f()
    }
}

/// Suppression scope. Notifications resume when the last guard drops,
/// including during unwinding.
#[must_use = "notifications resume as soon as the guard is dropped"]
pub struct SuppressGuard {
    object: Object,
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        self.object.0.suppress.fetch_sub(1, Ordering::AcqRel);
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} object at {:p}>", self.type_name(), Arc::as_ptr(&self.0))
    }
}

impl Value {
    /// Wrap an object so it can be stored in another object's attribute.
    pub fn object(object: Object) -> Self {
        Value::new(object)
    }

    pub fn as_object(&self) -> Option<&Object> {
        self.downcast_ref::<Object>()
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::new(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TypeBuilder;
    use crate::method::Method;
    use parking_lot::Mutex;

    fn point() -> Arc<ObjectType> {
        TypeBuilder::new("Point")
            .attr("x", AttributeSchema::new().with_default(0i64))
            .attr("y", AttributeSchema::new().with_default(0i64))
            .build()
            .unwrap()
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Observer {
        let log = log.clone();
        Observer::new(move |change| {
            log.lock()
                .push(format!("{tag}:{}:{}", change.kind.as_str(), change.name));
            Ok(())
        })
    }

    // ========================================================================
    // Access
    // ========================================================================

    #[test]
    fn get_computes_default_once() {
        let obj = Object::new(&point());
        assert_eq!(obj.get_slot(0), None);
        assert_eq!(obj.get("x").unwrap(), Value::new(0i64));
        assert_eq!(obj.get_slot(0), Some(Value::new(0i64)));
    }

    #[test]
    fn unknown_attribute() {
        let obj = Object::new(&point());
        let err = obj.get("z").unwrap_err();
        assert!(matches!(err, AttrError::NoSuchAttribute { .. }));
        assert!(obj.set("z", 1i64).is_err());
        assert!(obj.observe("z", Observer::method("m")).is_err());
    }

    #[test]
    fn with_values_assigns_in_order() {
        let obj = Object::with_values(&point(), [("x", 3i64), ("y", 4i64)]).unwrap();
        assert_eq!(obj.get_as::<i64>("x").unwrap(), Some(3));
        assert_eq!(obj.get_as::<i64>("y").unwrap(), Some(4));
    }

    #[test]
    fn raw_slots_bypass_modes() {
        let ty = TypeBuilder::new("Typed")
            .attr("n", AttributeSchema::new().typed::<i64>())
            .build()
            .unwrap();
        let obj = Object::new(&ty);
        obj.set_slot(0, "not an int").unwrap();
        assert_eq!(obj.get("n").unwrap(), Value::from("not an int"));
        assert_eq!(obj.clear_slot(0), Some(Value::from("not an int")));
        assert!(obj.set_slot(1, 0i64).is_err());
    }

    #[test]
    fn frozen_object_rejects_writes() {
        let obj = Object::new(&point());
        obj.set("x", 1i64).unwrap();
        obj.freeze();
        assert!(obj.is_frozen());
        assert!(matches!(obj.set("x", 2i64), Err(AttrError::Frozen { .. })));
        assert!(matches!(obj.delete("x"), Err(AttrError::Frozen { .. })));
        assert_eq!(obj.get("x").unwrap(), Value::new(1i64));
    }

    #[test]
    fn objects_compare_by_identity() {
        let ty = point();
        let a = Object::new(&ty);
        let b = Object::new(&ty);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert!(a.downgrade().upgrade().is_some_and(|o| o == a));
    }

    // ========================================================================
    // Dynamic observers
    // ========================================================================

    #[test]
    fn observer_sees_create_update_delete() {
        let obj = Object::new(&point());
        let log = Arc::new(Mutex::new(Vec::new()));
        obj.observe("x", recorder(&log, "d")).unwrap();

        obj.get("x").unwrap();
        obj.set("x", 5i64).unwrap();
        obj.set("x", 5i64).unwrap();
        obj.delete("x").unwrap();
        obj.get("y").unwrap();

        assert_eq!(
            *log.lock(),
            vec!["d:create:x", "d:update:x", "d:delete:x"]
        );
    }

    #[test]
    fn update_carries_old_value() {
        let obj = Object::with_values(&point(), [("x", 1i64)]).unwrap();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        obj.observe(
            "x",
            Observer::new(move |change| {
                *sink.lock() = Some((change.old.clone(), change.value.clone()));
                Ok(())
            }),
        )
        .unwrap();
        obj.set("x", 2i64).unwrap();
        assert_eq!(
            *seen.lock(),
            Some((Some(Value::new(1i64)), Value::new(2i64)))
        );
    }

    #[test]
    fn change_type_filter() {
        let obj = Object::new(&point());
        let log = Arc::new(Mutex::new(Vec::new()));
        obj.observe_with("x", recorder(&log, "u"), ChangeTypes::UPDATE)
            .unwrap();
        obj.set("x", 1i64).unwrap();
        obj.set("x", 2i64).unwrap();
        obj.delete("x").unwrap();
        assert_eq!(*log.lock(), vec!["u:update:x"]);
    }

    #[test]
    fn unobserve_forms() {
        let obj = Object::new(&point());
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder(&log, "a");
        let b = recorder(&log, "b");
        obj.observe_many(&["x", "y"], a.clone()).unwrap();
        obj.observe("x", b.clone()).unwrap();
        assert!(obj.has_observer("x", &a));
        assert!(obj.has_observers("y"));

        obj.unobserve("x", &a).unwrap();
        assert!(!obj.has_observer("x", &a));
        assert!(obj.has_observer("x", &b));

        obj.unobserve_attr("x");
        assert!(!obj.has_observers("x"));
        assert!(obj.has_observers("y"));

        obj.unobserve_all();
        assert!(!obj.has_observers("y"));
        obj.set("x", 1i64).unwrap();
        assert!(log.lock().is_empty());
    }

    #[test]
    fn observers_are_per_instance() {
        let ty = point();
        let a = Object::new(&ty);
        let b = Object::new(&ty);
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        a.observe(
            "x",
            Observer::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();
        b.set("x", 1i64).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        a.set("x", 1i64).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn observer_error_propagates_after_store() {
        let obj = Object::new(&point());
        obj.observe("x", Observer::new(|_| Err(AttrError::callback("boom"))))
            .unwrap();
        let err = obj.set("x", 1i64).unwrap_err();
        assert_eq!(err, AttrError::Callback("boom".into()));
        assert_eq!(obj.get_slot(0), Some(Value::new(1i64)));
    }

    #[test]
    fn method_observers_resolve_on_the_changed_object() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let ty = TypeBuilder::new("Watched")
            .attr("v", AttributeSchema::new())
            .method(
                "on_v",
                Method::observer(move |_, _| {
                    h.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .build()
            .unwrap();
        let obj = Object::new(&ty);
        obj.observe("v", Observer::method("on_v")).unwrap();
        obj.set("v", 1i64).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        obj.observe("v", Observer::method("missing")).unwrap();
        assert!(matches!(
            obj.set("v", 2i64),
            Err(AttrError::NoSuchMethod { .. })
        ));
    }

    #[test]
    fn bound_observer_is_skipped_once_owner_is_gone() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let listener_ty = TypeBuilder::new("Listener")
            .method(
                "on_change",
                Method::observer(move |_, _| {
                    h.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .build()
            .unwrap();
        let source = Object::new(&point());
        let listener = Object::new(&listener_ty);
        source
            .observe("x", Observer::bound(&listener, "on_change"))
            .unwrap();
        source.set("x", 1i64).unwrap();
        drop(listener);
        assert!(source.has_observers("x"));
        source.set("x", 2i64).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        // The dead entry is dropped by the dispatch that skipped it.
        assert!(!source.has_observers("x"));
        assert!(source.observers("x").is_empty());
    }

    // ========================================================================
    // Suppression
    // ========================================================================

    #[test]
    fn suppression_nests() {
        let obj = Object::new(&point());
        let log = Arc::new(Mutex::new(Vec::new()));
        obj.observe("x", recorder(&log, "d")).unwrap();
        {
            let _outer = obj.suppress_notifications();
            {
                let _inner = obj.suppress_notifications();
                obj.set("x", 1i64).unwrap();
            }
            assert!(!obj.notifications_enabled());
            obj.set("x", 2i64).unwrap();
        }
        assert!(obj.notifications_enabled());
        obj.set("x", 3i64).unwrap();
        assert_eq!(*log.lock(), vec!["d:update:x"]);
    }

    #[test]
    fn suppression_ends_on_error() {
        let obj = Object::new(&point());
        let result: Result<()> = obj.with_suppressed(|| {
            obj.set("x", 1i64)?;
            Err(AttrError::callback("bail"))
        });
        assert!(result.is_err());
        assert!(obj.notifications_enabled());
    }

    // ========================================================================
    // Dotted observation
    // ========================================================================

    fn node() -> Arc<ObjectType> {
        TypeBuilder::new("Node")
            .attr("value", AttributeSchema::new().with_default(0i64))
            .attr("child", AttributeSchema::new())
            .build()
            .unwrap()
    }

    #[test]
    fn dotted_observer_follows_replacement() {
        let ty = node();
        let root = Object::new(&ty);
        let first = Object::new(&ty);
        let second = Object::new(&ty);
        root.set("child", first.clone()).unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        root.observe("child.value", recorder(&log, "p")).unwrap();

        first.set("value", 1i64).unwrap();
        root.set("child", second.clone()).unwrap();
        first.set("value", 2i64).unwrap();
        second.set("value", 3i64).unwrap();

        assert_eq!(*log.lock(), vec!["p:create:value", "p:create:value"]);
        assert!(!first.has_observers("value"));
        assert!(second.has_observers("value"));
    }

    #[test]
    fn dotted_observer_detaches_on_delete_and_unobserve() {
        let ty = node();
        let root = Object::new(&ty);
        let child = Object::new(&ty);
        let obs = Observer::new(|_| Ok(()));
        root.observe("child.value", obs.clone()).unwrap();
        root.set("child", child.clone()).unwrap();
        assert!(child.has_observer("value", &obs));

        root.delete("child").unwrap();
        assert!(!child.has_observers("value"));

        root.set("child", child.clone()).unwrap();
        root.unobserve("child.value", &obs).unwrap();
        assert!(!child.has_observers("value"));
        assert!(!root.has_observers("child"));
    }

    #[test]
    fn dotted_observer_rejects_plain_values() {
        let root = Object::new(&node());
        root.observe("child.value", Observer::new(|_| Ok(()))).unwrap();
        let err = root.set("child", 5i64).unwrap_err();
        assert!(matches!(err, AttrError::NotObservable { .. }));
        assert!(root.set("child", Value::null()).is_ok());
    }

    #[test]
    fn dotted_unobserve_after_plain_value_was_stored() {
        let root = Object::new(&node());
        let obs = Observer::new(|_| Ok(()));
        root.observe("child.value", obs.clone()).unwrap();
        assert!(root.set("child", 5i64).is_err());
        assert_eq!(root.get_slot(1), Some(Value::new(5i64)));

        root.unobserve("child.value", &obs).unwrap();
        assert!(!root.has_observers("child"));
        root.set("child", 6i64).unwrap();
    }

    #[test]
    fn deep_dotted_path() {
        let ty = node();
        let root = Object::new(&ty);
        let mid = Object::new(&ty);
        let leaf = Object::new(&ty);
        let log = Arc::new(Mutex::new(Vec::new()));
        root.observe("child.child.value", recorder(&log, "deep"))
            .unwrap();
        root.set("child", mid.clone()).unwrap();
        mid.set("child", leaf.clone()).unwrap();
        leaf.set("value", 9i64).unwrap();
        assert_eq!(*log.lock(), vec!["deep:create:value"]);
    }

    // ========================================================================
    // Manual notifications
    // ========================================================================

    #[test]
    fn container_and_manual_notifications() {
        let obj = Object::new(&point());
        let extras = Arc::new(Mutex::new(Vec::new()));
        let sink = extras.clone();
        obj.observe(
            "x",
            Observer::new(move |change| {
                sink.lock().push((change.kind, change.extra.len()));
                Ok(())
            }),
        )
        .unwrap();

        let mut extra = IndexMap::new();
        extra.insert("operation".to_string(), Value::from("append"));
        obj.notify_container("x", Value::new(1i64), extra).unwrap();

        let change = Change::new(ChangeKind::Event, &obj, "x", Value::null());
        obj.notify("x", &change).unwrap();

        assert_eq!(
            *extras.lock(),
            vec![(ChangeKind::Container, 1), (ChangeKind::Event, 0)]
        );
    }
}
