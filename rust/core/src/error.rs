//! Error types for opening, reading and closing a link

use std::io;
use thiserror::Error;

/// Errors raised while opening a link session.
///
/// Every variant is fatal to the `open` call that produced it and is
/// returned only after all partially acquired OS resources were released.
#[derive(Error, Debug)]
pub enum LinkError {
    /// The name cannot be used as a platform shared memory name
    #[error("invalid link name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// Neither an existing region could be opened nor a new one created
    #[error("failed to create shared memory mapping {name:?}: {source}")]
    ResourceCreation {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The region handle was obtained but mapping it failed
    #[error("failed to map view of shared memory {name:?}: {source}")]
    Mapping {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The view was mapped but the caller-facing wrapper could not be built
    #[error("failed to bind link view for {name:?}: {source}")]
    Binding {
        name: String,
        #[source]
        source: BindingFailure,
    },
}

/// Convenience type alias
pub type Result<T> = std::result::Result<T, LinkError>;

impl LinkError {
    /// Coarse classification, stable across releases
    pub fn kind(&self) -> LinkErrorKind {
        match self {
            LinkError::InvalidName { .. } => LinkErrorKind::InvalidName,
            LinkError::ResourceCreation { .. } => LinkErrorKind::ResourceCreation,
            LinkError::Mapping { .. } => LinkErrorKind::Mapping,
            LinkError::Binding { .. } => LinkErrorKind::Binding,
        }
    }

    /// Name of the link the failed call was made for
    pub fn link_name(&self) -> &str {
        match self {
            LinkError::InvalidName { name, .. }
            | LinkError::ResourceCreation { name, .. }
            | LinkError::Mapping { name, .. }
            | LinkError::Binding { name, .. } => name,
        }
    }
}

/// Error categories for status codes and handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkErrorKind {
    InvalidName,
    ResourceCreation,
    Mapping,
    Binding,
}

/// Reason reported by a binder that could not wrap a mapped view.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct BindingFailure(pub String);

impl BindingFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Failures reported by an explicit close.
///
/// Both teardown steps are always attempted; this error lists every step
/// that failed.
#[derive(Error, Debug)]
pub enum TeardownError {
    #[error("failed to unmap view of {name:?}: {source}")]
    Unmap {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to release handle of {name:?}: {source}")]
    Release {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to unmap view of {name:?} ({unmap}) and to release its handle ({release})")]
    Both {
        name: String,
        unmap: io::Error,
        release: io::Error,
    },
}

impl TeardownError {
    /// Fold the outcome of both teardown steps into a single result
    pub fn from_steps(
        name: &str,
        unmap: io::Result<()>,
        release: io::Result<()>,
    ) -> std::result::Result<(), TeardownError> {
        let name = name.to_string();
        match (unmap, release) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(source), Ok(())) => Err(TeardownError::Unmap { name, source }),
            (Ok(()), Err(source)) => Err(TeardownError::Release { name, source }),
            (Err(unmap), Err(release)) => Err(TeardownError::Both { name, unmap, release }),
        }
    }
}

/// Out-of-range access to a mapped view
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("range {offset}..{offset}+{len} is outside the {capacity}-byte view")]
pub struct ViewRangeError {
    pub offset: usize,
    pub len: usize,
    pub capacity: usize,
}
