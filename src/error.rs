//! Error types shared by the binder and the freshness tiers.

use std::fmt;
use thiserror::Error;

/// The scalar kinds a settings field can be declared as.
///
/// Used to describe coercion failures in [`BindError::TypeMismatch`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FieldKind {
    /// UTF-8 string.
    String,
    /// Signed or unsigned integer.
    Integer,
    /// Floating point number.
    Float,
    /// Boolean.
    Bool,
    /// Nested settings record.
    Section,
}

impl FieldKind {
    /// Returns a stable string representation of the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Bool => "boolean",
            Self::Section => "section",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while binding a configuration section into a settings type.
#[derive(Debug, Clone, Error, PartialEq)]
#[non_exhaustive]
pub enum BindError {
    /// The requested section does not exist in the configuration tree.
    #[error("configuration section not found: '{section}'")]
    SectionNotFound {
        /// The section path that was looked up.
        section: String,
    },

    /// The target type cannot be bound: it is not a record, or one of its fields
    /// has a type outside the bindable set.
    #[error("type '{type_name}' is not bindable: {reason}")]
    Shape {
        /// Rust type name of the target.
        type_name: &'static str,
        /// Why the type was rejected.
        reason: String,
    },

    /// A raw value could not be coerced into the declared field type.
    #[error("cannot bind '{path}' as {expected}: found {found}")]
    TypeMismatch {
        /// Full configuration path of the offending value.
        path: String,
        /// The declared kind of the field.
        expected: FieldKind,
        /// Short description of the raw value.
        found: String,
    },
}

/// Errors produced by the configuration source.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum SourceError {
    /// The source was closed and emits no further changes.
    #[error("configuration source is closed")]
    Closed,

    /// A configuration document did not have an object at its root.
    #[error("configuration root must be an object")]
    InvalidRoot,
}
