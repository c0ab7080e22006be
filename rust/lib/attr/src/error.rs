use std::fmt;

use thiserror::Error;

// ── ValidationError ─────────────────────────────────────────────────

/// A value was rejected by an attribute's validate mode.
///
/// Always attributable to one attribute on one object type, and carries
/// enough context to build a human readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Name of the object type owning the attribute.
    pub type_name: String,
    /// Attribute that rejected the value.
    pub attribute: String,
    /// Debug rendering of the offending value.
    pub value: String,
    /// Description of what the attribute accepts (e.g. `i64`, `Option<String>`).
    pub expected: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the '{}' attribute of a '{}' object must be of kind '{}', got {}",
            self.attribute, self.type_name, self.expected, self.value
        )
    }
}

// ── AttrError ───────────────────────────────────────────────────────

/// Unified error type for the attribute runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttrError {
    /// A value failed validation.
    #[error("{0}")]
    Validation(ValidationError),

    /// Set/delete on an attribute that does not allow it
    /// (constant, read-only, event, signal, property without setter).
    #[error("'{type_name}.{attribute}': {reason}")]
    Immutable {
        type_name: String,
        attribute: String,
        reason: String,
    },

    /// Malformed mode or schema configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The layout builder could not produce a contiguous slot assignment.
    /// Signals a bug in the builder, never a user error.
    #[error("layout invariant violated: {0}")]
    Layout(String),

    #[error("'{type_name}' object has no attribute '{attribute}'")]
    NoSuchAttribute { type_name: String, attribute: String },

    #[error("'{type_name}' object has no method '{method}'")]
    NoSuchMethod { type_name: String, method: String },

    /// Dotted observation hit a value that cannot be observed.
    #[error("cannot observe '{attribute}' on a non-observable value {value}")]
    NotObservable { attribute: String, value: String },

    /// Read of an unset attribute whose default mode forbids a default.
    #[error("'{type_name}.{attribute}' has no value and no default")]
    Unset { type_name: String, attribute: String },

    #[error("slot index {index} out of range for storage of {len} slots")]
    SlotOutOfRange { index: usize, len: usize },

    #[error("cannot modify '{attribute}' of a frozen '{type_name}' object")]
    Frozen { type_name: String, attribute: String },

    /// Error raised by user code (observer, factory, method).
    #[error("{0}")]
    Callback(String),
}

impl AttrError {
    /// Convenience constructor for errors raised by user callbacks.
    pub fn callback(message: impl Into<String>) -> Self {
        AttrError::Callback(message.into())
    }

    pub(crate) fn immutable(type_name: &str, attribute: &str, reason: &str) -> Self {
        AttrError::Immutable {
            type_name: type_name.to_string(),
            attribute: attribute.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        AttrError::Configuration(message.into())
    }

    /// Whether this is a validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, AttrError::Validation(_))
    }
}

impl From<ValidationError> for AttrError {
    fn from(err: ValidationError) -> Self {
        AttrError::Validation(err)
    }
}

pub type Result<T, E = AttrError> = std::result::Result<T, E>;
