//! Crate error type.

use thiserror::Error;

use crate::types::TypeTag;

/// Convenience alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong inside the composition core.
///
/// Structural and singleton violations indicate programming errors in the
/// caller; they are surfaced immediately and never silently recovered.
#[derive(Debug, Error)]
pub enum Error {
    /// A hierarchy or registration precondition was violated.
    #[error("structural violation: {0}")]
    StructuralViolation(String),

    /// A second live instance of a system-singleton component type.
    #[error("component type `{0}` is a system singleton and already has a live instance")]
    DuplicateSingleton(TypeTag),

    /// A throwing `get` found nothing registered under the tag.
    #[error("no instance registered under type `{0}`")]
    NotFound(TypeTag),

    /// Serialized data referenced a type name the type registry cannot build.
    #[error("unknown type `{0}` in serialized data")]
    UnknownType(String),

    /// Serialized data did not have the expected shape.
    #[error("malformed serialized data: {0}")]
    MalformedData(String),
}

impl Error {
    pub(crate) fn structural(message: impl Into<String>) -> Self {
        Self::StructuralViolation(message.into())
    }
}
