//! Attr: declarative attribute runtime.
//!
//! Objects whose fields carry validation, computed defaults, change
//! notification and a serialization policy, stored in a fixed-size slot
//! vector per instance.
//!
//! # Three Pieces
//!
//! - **Schemas**: an [`AttributeSchema`] picks a mode per operation (get,
//!   set, delete, default, validate, post-validate, post-get, post-set,
//!   get-state). Dispatch is a match on a closed enum per operation.
//! - **Layout**: [`TypeBuilder`] linearizes the bases (C3), merges
//!   inherited schemas, resolves slot collisions between independently
//!   laid out bases and assigns every attribute a slot in `0..N`.
//! - **Notification**: static observers (per schema) run before dynamic
//!   observers (per instance). Lists edited from inside an observer are
//!   committed after the dispatch, and suppression scopes nest.
//!
//! # Example
//!
//! ```ignore
//! use openerp_attr::{AttributeSchema, Object, Observer, TypeBuilder};
//!
//! let point = TypeBuilder::new("Point")
//!     .attr("x", AttributeSchema::new().typed::<i64>().with_default(0i64))
//!     .attr("y", AttributeSchema::new().typed::<i64>().with_default(0i64))
//!     .build()?;
//!
//! let p = Object::new(&point);
//! p.observe("x", Observer::new(|change| {
//!     println!("{} {}: {:?}", change.kind.as_str(), change.name, change.value);
//!     Ok(())
//! }))?;
//! p.set("x", 3i64)?;
//! ```

mod behavior;
pub mod change;
pub mod config;
pub mod error;
pub mod event;
pub mod extended;
mod layout;
pub mod method;
pub mod mode;
pub mod object;
pub mod object_type;
pub mod observer;
pub mod schema;
pub mod state;
mod storage;
pub mod value;

// Re-export primary types at crate root.
pub use change::{Change, ChangeKind, ChangeTypes};
pub use config::BuildConfig;
pub use error::{AttrError, Result, ValidationError};
pub use event::{EventBinder, SignalConnector};
pub use extended::ExtendedObserver;
pub use method::Method;
pub use mode::{
    DefaultMode, DeleteMode, GetMode, GetStateMode, Modes, Operation, PostGetMode, PostSetMode,
    PostValidateMode, SetMode, ValidateMode,
};
pub use object::{Object, SuppressGuard, WeakObject};
pub use object_type::{ObjectType, TypeBuilder};
pub use observer::Observer;
pub use schema::{AttributeSchema, SchemaEditor, SchemaHooks, SchemaId};
pub use state::State;
pub use value::{Null, Value, ValueKind};
