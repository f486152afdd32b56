use thiserror::Error;

use crate::model::{PropertyId, SpecId};
use crate::order::OrderError;

/// Structural problems with a single declaration or spec.
///
/// A validation error fails synthesis of the offending property or spec only;
/// callers record it as a diagnostic and keep going.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Duplicate role marker on '{method}': already {existing}, found {found}")]
    DuplicateRole {
        method: String,
        existing: String,
        found: String,
    },

    #[error("No role marker on '{0}' (expected Property, Child or Children)")]
    MissingRole(String),

    #[error("Not a getter: '{method}' takes {parameters} parameter(s)")]
    NotAGetter { method: String, parameters: usize },

    #[error("Unknown marker '{marker}' on '{method}'")]
    UnknownMarker { method: String, marker: String },

    #[error("Marker '{marker}' on '{method}' is missing its value")]
    MissingMarkerValue { method: String, marker: String },

    #[error("Duplicate property '{property}' in {spec}")]
    DuplicateProperty { spec: SpecId, property: PropertyId },

    #[error("Duplicate spec '{0}'")]
    DuplicateSpec(SpecId),

    #[error("Incompatible override of '{property}': {parent} cannot narrow to {child}")]
    IncompatibleOverride {
        property: PropertyId,
        parent: String,
        child: String,
    },
}

#[derive(Error, Debug)]
pub enum NodegenError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Ordering error: {0}")]
    Order(#[from] OrderError),

    #[error("Plan registry error: {0}")]
    Registry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
