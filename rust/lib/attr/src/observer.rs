//! Observer lists and reentrant-safe dispatch.
//!
//! Both static (per-schema) and dynamic (per-instance) observers live in
//! an [`ObserverList`]. While a dispatch is running over a list the list
//! is *guarded*: additions and removals are staged and applied when the
//! outermost dispatch over that list completes, including when an
//! observer returns an error. Iteration is index based over a list that
//! cannot change underneath it, and no lock is held while an observer runs.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::change::{Change, ChangeTypes};
use crate::error::Result;
use crate::extended::ExtendedObserver;
use crate::method::ObserverFn;
use crate::object::{Object, WeakObject};

// ── Observer ────────────────────────────────────────────────────────

/// Something to call when an attribute changes.
#[derive(Clone)]
pub enum Observer {
    /// A closure. Compared by identity: keep a clone to unobserve it.
    Callback(ObserverFn),
    /// A method looked up on the object the change happened on.
    Method(String),
    /// A method on a specific owner, held weakly.
    Bound { owner: WeakObject, method: String },
    /// Follows a dotted path; installed by `observe("a.b", ..)`.
    Extended(Arc<ExtendedObserver>),
}

impl Observer {
    pub fn new(f: impl Fn(&Change) -> Result<()> + Send + Sync + 'static) -> Self {
        Observer::Callback(Arc::new(f))
    }

    pub fn method(name: impl Into<String>) -> Self {
        Observer::Method(name.into())
    }

    pub fn bound(owner: &Object, method: impl Into<String>) -> Self {
        Observer::Bound {
            owner: owner.downgrade(),
            method: method.into(),
        }
    }

    /// False for a bound observer whose owner has been dropped.
    pub fn is_alive(&self) -> bool {
        match self {
            Observer::Bound { owner, .. } => owner.is_alive(),
            _ => true,
        }
    }

    pub(crate) fn invoke(&self, change: &Change) -> Result<()> {
        match self {
            Observer::Callback(f) => f(change),
            Observer::Method(name) => change.object.call_observer(name, change),
            Observer::Bound { owner, method } => match owner.upgrade() {
                Some(owner) => owner.call_observer(method, change),
                None => Ok(()),
            },
            Observer::Extended(ext) => ext.handle(change),
        }
    }
}

impl PartialEq for Observer {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Observer::Callback(a), Observer::Callback(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Observer::Method(a), Observer::Method(b)) => a == b,
            (
                Observer::Bound { owner: oa, method: ma },
                Observer::Bound { owner: ob, method: mb },
            ) => ma == mb && oa.ptr_eq(ob),
            (Observer::Extended(a), Observer::Extended(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observer::Callback(cb) => write!(f, "Callback({:p})", Arc::as_ptr(cb)),
            Observer::Method(name) => write!(f, "Method({name})"),
            Observer::Bound { method, .. } => write!(f, "Bound({method})"),
            Observer::Extended(ext) => write!(f, "Extended({ext:?})"),
        }
    }
}

/// An observer plus the change kinds it receives.
#[derive(Debug, Clone)]
pub(crate) struct ObserverEntry {
    pub observer: Observer,
    pub types: ChangeTypes,
}

// ── ObserverList ────────────────────────────────────────────────────

#[derive(Debug)]
enum Edit {
    Add(ObserverEntry),
    Remove(Observer),
    Clear,
}

#[derive(Debug, Default)]
pub(crate) struct ObserverList {
    entries: Vec<ObserverEntry>,
    /// Number of dispatches currently iterating this list.
    guard: usize,
    pending: Vec<Edit>,
}

impl ObserverList {
    /// Copy of the registered entries, without guard state or staged edits.
    pub fn duplicate(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            guard: 0,
            pending: Vec::new(),
        }
    }

    pub fn add(&mut self, entry: ObserverEntry) {
        if self.guard > 0 {
            trace!(observer = ?entry.observer, "staging observer add");
            self.pending.push(Edit::Add(entry));
        } else {
            self.apply(Edit::Add(entry));
        }
    }

    pub fn remove(&mut self, observer: &Observer) {
        if self.guard > 0 {
            trace!(?observer, "staging observer remove");
            self.pending.push(Edit::Remove(observer.clone()));
        } else {
            self.apply(Edit::Remove(observer.clone()));
        }
    }

    pub fn clear(&mut self) {
        if self.guard > 0 {
            self.pending.push(Edit::Clear);
        } else {
            self.entries.clear();
        }
    }

    pub fn contains(&self, observer: &Observer) -> bool {
        self.entries.iter().any(|e| &e.observer == observer)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn observers(&self) -> Vec<Observer> {
        self.entries.iter().map(|e| e.observer.clone()).collect()
    }

    pub fn is_guarded(&self) -> bool {
        self.guard > 0
    }

    fn entry(&self, index: usize) -> Option<ObserverEntry> {
        self.entries.get(index).cloned()
    }

    fn enter(&mut self) {
        self.guard += 1;
    }

    fn exit(&mut self) {
        self.guard = self.guard.saturating_sub(1);
        if self.guard > 0 {
            return;
        }
        if !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            trace!(edits = pending.len(), "committing staged observer edits");
            for edit in pending {
                self.apply(edit);
            }
        }
        let before = self.entries.len();
        self.entries.retain(|e| e.observer.is_alive());
        if self.entries.len() != before {
            trace!(pruned = before - self.entries.len(), "dropped dead bound observers");
        }
    }

    fn apply(&mut self, edit: Edit) {
        match edit {
            Edit::Add(entry) => {
                // Re-registering an observer only updates its filter.
                match self.entries.iter_mut().find(|e| e.observer == entry.observer) {
                    Some(existing) => existing.types = entry.types,
                    None => self.entries.push(entry),
                }
            }
            Edit::Remove(observer) => self.entries.retain(|e| e.observer != observer),
            Edit::Clear => self.entries.clear(),
        }
    }
}

// ── Dispatch ────────────────────────────────────────────────────────

/// Access to one observer list behind a lock.
pub(crate) trait ListAccess {
    /// Run `f` on the list, or return `None` if the list does not exist.
    fn with_list<R>(&self, f: impl FnOnce(&mut ObserverList) -> R) -> Option<R>;

    /// Leave a dispatch started with `enter`.
    fn release(&self) {
        self.with_list(ObserverList::exit);
    }
}

struct ReleaseOnDrop<'a, A: ListAccess>(&'a A);

impl<A: ListAccess> Drop for ReleaseOnDrop<'_, A> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Invoke every entry of the list interested in the change, in
/// registration order. Stops at the first observer error.
pub(crate) fn dispatch<A: ListAccess>(access: &A, change: &Change) -> Result<()> {
    if access.with_list(ObserverList::enter).is_none() {
        return Ok(());
    }
    let _release = ReleaseOnDrop(access);
    let flag = change.kind.flag();
    let mut index = 0;
    while let Some(entry) = access.with_list(|list| list.entry(index)).flatten() {
        index += 1;
        if entry.types.contains(flag) {
            trace!(attribute = %change.name, kind = change.kind.as_str(), observer = ?entry.observer, "notify");
            entry.observer.invoke(change)?;
        }
    }
    Ok(())
}

// ── Static observers ────────────────────────────────────────────────

/// Observer list attached to a schema, shared by every instance.
#[derive(Debug, Default)]
pub(crate) struct StaticObservers {
    list: Mutex<ObserverList>,
}

impl ListAccess for StaticObservers {
    fn with_list<R>(&self, f: impl FnOnce(&mut ObserverList) -> R) -> Option<R> {
        Some(f(&mut self.list.lock()))
    }
}

impl StaticObservers {
    pub fn duplicate(&self) -> Self {
        Self {
            list: Mutex::new(self.list.lock().duplicate()),
        }
    }

    pub fn add(&self, observer: Observer, types: ChangeTypes) {
        self.list.lock().add(ObserverEntry { observer, types });
    }

    pub fn remove(&self, observer: &Observer) {
        self.list.lock().remove(observer);
    }

    pub fn clear(&self) {
        self.list.lock().clear();
    }

    pub fn contains(&self, observer: &Observer) -> bool {
        self.list.lock().contains(observer)
    }

    pub fn is_empty(&self) -> bool {
        self.list.lock().is_empty()
    }

    pub fn observers(&self) -> Vec<Observer> {
        self.list.lock().observers()
    }

    /// Add every entry of `other` not already present here.
    pub fn extend_from(&self, other: &StaticObservers) {
        let entries = other.list.lock().entries.clone();
        let mut list = self.list.lock();
        for entry in entries {
            if !list.contains(&entry.observer) {
                list.add(entry);
            }
        }
    }

    pub fn dispatch(&self, change: &Change) -> Result<()> {
        dispatch(self, change)
    }
}

// ── Dynamic observers ───────────────────────────────────────────────

/// Per-instance observers keyed by attribute name.
///
/// Unallocated until the first observer is registered, so an unobserved
/// instance pays one empty check per notification.
#[derive(Debug, Default)]
pub(crate) struct DynamicObservers {
    topics: Mutex<Option<IndexMap<String, ObserverList>>>,
}

struct TopicAccess<'a> {
    map: &'a DynamicObservers,
    topic: &'a str,
}

impl ListAccess for TopicAccess<'_> {
    fn with_list<R>(&self, f: impl FnOnce(&mut ObserverList) -> R) -> Option<R> {
        let mut topics = self.map.topics.lock();
        topics.as_mut()?.get_mut(self.topic).map(f)
    }

    fn release(&self) {
        let mut topics = self.map.topics.lock();
        if let Some(map) = topics.as_mut() {
            if let Some(list) = map.get_mut(self.topic) {
                list.exit();
                if list.is_empty() && !list.is_guarded() {
                    map.shift_remove(self.topic);
                }
            }
            if map.is_empty() {
                *topics = None;
            }
        }
    }
}

impl DynamicObservers {
    pub fn add(&self, topic: &str, observer: Observer, types: ChangeTypes) {
        let mut topics = self.topics.lock();
        topics
            .get_or_insert_with(IndexMap::new)
            .entry(topic.to_string())
            .or_default()
            .add(ObserverEntry { observer, types });
    }

    pub fn remove(&self, topic: &str, observer: &Observer) {
        let mut topics = self.topics.lock();
        let Some(map) = topics.as_mut() else {
            return;
        };
        if let Some(list) = map.get_mut(topic) {
            list.remove(observer);
            if list.is_empty() && !list.is_guarded() {
                map.shift_remove(topic);
            }
        }
        if map.is_empty() {
            *topics = None;
        }
    }

    pub fn remove_topic(&self, topic: &str) {
        let mut topics = self.topics.lock();
        let Some(map) = topics.as_mut() else {
            return;
        };
        if let Some(list) = map.get_mut(topic) {
            if list.is_guarded() {
                list.clear();
            } else {
                map.shift_remove(topic);
            }
        }
        if map.is_empty() {
            *topics = None;
        }
    }

    pub fn clear(&self) {
        let mut topics = self.topics.lock();
        let Some(map) = topics.as_mut() else {
            return;
        };
        for list in map.values_mut() {
            list.clear();
        }
        map.retain(|_, list| list.is_guarded());
        if map.is_empty() {
            *topics = None;
        }
    }

    pub fn has_observers(&self, topic: &str) -> bool {
        self.topics
            .lock()
            .as_ref()
            .and_then(|map| map.get(topic))
            .is_some_and(|list| !list.is_empty())
    }

    pub fn contains(&self, topic: &str, observer: &Observer) -> bool {
        self.topics
            .lock()
            .as_ref()
            .and_then(|map| map.get(topic))
            .is_some_and(|list| list.contains(observer))
    }

    pub fn observers(&self, topic: &str) -> Vec<Observer> {
        self.topics
            .lock()
            .as_ref()
            .and_then(|map| map.get(topic))
            .map(ObserverList::observers)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.lock().is_none()
    }

    pub fn dispatch(&self, topic: &str, change: &Change) -> Result<()> {
        dispatch(&TopicAccess { map: self, topic }, change)
    }
}
