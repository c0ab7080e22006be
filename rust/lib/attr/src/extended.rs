//! Dotted-path observation.
//!
//! Observing `"a.b"` installs an [`ExtendedObserver`] on `a`. Whenever the
//! object held by `a` changes, the user observer is moved from the old
//! object's `b` to the new object's `b`. Longer paths recurse: the
//! registration on the new object is itself dotted.

use std::fmt;

use crate::change::{Change, ChangeKind, ChangeTypes};
use crate::error::{AttrError, Result};
use crate::object::Object;
use crate::observer::Observer;

/// Wrapper registered on the head attribute of a dotted path.
pub struct ExtendedObserver {
    /// Remaining path observed on the value of the head attribute.
    pub(crate) path: String,
    pub(crate) observer: Observer,
    /// Filter applied to the registration on the followed object.
    pub(crate) types: ChangeTypes,
}

impl ExtendedObserver {
    pub(crate) fn new(path: &str, observer: Observer, types: ChangeTypes) -> Self {
        Self {
            path: path.to_string(),
            observer,
            types,
        }
    }

    /// Change kinds of the head attribute the wrapper reacts to.
    pub(crate) fn head_types() -> ChangeTypes {
        ChangeTypes::CREATE | ChangeTypes::UPDATE | ChangeTypes::DELETE
    }

    /// The observer actually registered on followed objects. Unbound
    /// method observers are bound to the object owning the head attribute.
    pub(crate) fn resolve(&self, owner: &Object) -> Observer {
        match &self.observer {
            Observer::Method(name) => Observer::bound(owner, name.clone()),
            other => other.clone(),
        }
    }

    /// Register on the object currently held by the head attribute.
    pub(crate) fn attach(&self, owner: &Object, target: &Object) -> Result<()> {
        target.observe_with(&self.path, self.resolve(owner), self.types)
    }

    pub(crate) fn handle(&self, change: &Change) -> Result<()> {
        let (old, new) = match change.kind {
            ChangeKind::Create => (None, Some(&change.value)),
            ChangeKind::Update => (change.old.as_ref(), Some(&change.value)),
            ChangeKind::Delete => (Some(&change.value), None),
            _ => return Ok(()),
        };
        let observer = self.resolve(&change.object);
        if let Some(old) = old.and_then(|v| v.as_object()) {
            old.unobserve(&self.path, &observer)?;
        }
        if let Some(new) = new {
            if let Some(target) = new.as_object() {
                target.observe_with(&self.path, observer, self.types)?;
            } else if !new.is_null() {
                return Err(AttrError::NotObservable {
                    attribute: format!("{}.{}", change.name, self.path),
                    value: format!("{new:?}"),
                });
            }
        }
        Ok(())
    }
}

impl PartialEq for ExtendedObserver {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.observer == other.observer
    }
}

impl fmt::Debug for ExtendedObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {:?}", self.path, self.observer)
    }
}
