//! State snapshots.
//!
//! A snapshot maps attribute names to values for every attribute whose
//! get-state mode includes it. Framing the snapshot into bytes is left to
//! the caller.

use indexmap::IndexMap;
use tracing::trace;

use crate::error::Result;
use crate::object::Object;
use crate::value::Value;

/// Attribute name to value, in table order.
pub type State = IndexMap<String, Value>;

impl Object {
    /// Values of every attribute participating in the state. Reading an
    /// unset slot-backed attribute computes its default.
    pub fn get_state(&self) -> Result<State> {
        let mut state = State::new();
        for schema in self.schemas() {
            if !schema.should_getstate(self)? {
                continue;
            }
            let name = schema.name();
            let value = schema.get_value(self)?;
            state.insert(name, value);
        }
        trace!(type_name = self.type_name(), attributes = state.len(), "state captured");
        Ok(state)
    }

    /// Assign every entry through the normal set path, with notifications
    /// suppressed.
    pub fn set_state(&self, state: &State) -> Result<()> {
        let _guard = self.suppress_notifications();
        for (name, value) in state {
            self.set(name, value.clone())?;
        }
        Ok(())
    }

    /// A fresh instance of the same type restored from this one's state.
    pub fn restore_copy(&self) -> Result<Object> {
        let state = self.get_state()?;
        let copy = Object::new(self.object_type());
        copy.set_state(&state)?;
        Ok(copy)
    }
}
