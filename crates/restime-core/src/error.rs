//! Shared error type across restime crates.

use thiserror::Error;

use crate::tag::AccessorError;

/// Shared result type.
pub type Result<T> = std::result::Result<T, RestimeError>;

/// Unified error type used by core and server.
#[derive(Debug, Error)]
pub enum RestimeError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    /// A tag declaration references a property the argument cannot provide.
    #[error("failed to read tag property \"{property}\" value from object of type {type_name}")]
    InvalidTagProperty {
        property: String,
        type_name: &'static str,
        #[source]
        source: Option<AccessorError>,
    },
    #[error("no argument at position {index} for tag \"{tag}\"")]
    MissingArgument { tag: String, index: usize },
    #[error("duplicate timed resource: {method} {path}")]
    DuplicateResource { method: String, path: String },
    #[error("unsupported http method for timed resource: {0}")]
    UnsupportedMethod(String),
    #[error("server failed to start: {0}")]
    ServerStart(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl RestimeError {
    /// Stable short code, used as a structured logging field.
    pub fn code(&self) -> &'static str {
        match self {
            RestimeError::InvalidConfig(_) => "INVALID_CONFIG",
            RestimeError::UnsupportedVersion => "UNSUPPORTED_VERSION",
            RestimeError::InvalidTagProperty { .. } => "INVALID_TAG_PROPERTY",
            RestimeError::MissingArgument { .. } => "MISSING_ARGUMENT",
            RestimeError::DuplicateResource { .. } => "DUPLICATE_RESOURCE",
            RestimeError::UnsupportedMethod(_) => "UNSUPPORTED_METHOD",
            RestimeError::ServerStart(_) => "SERVER_START",
            RestimeError::Io(_) => "IO",
        }
    }
}
