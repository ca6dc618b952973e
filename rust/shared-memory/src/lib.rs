//! MumbleLink - Shared Memory Module
//!
//! Opens, maps and tears down the named shared memory region behind a link.
//! [`LinkSession`] is the core type; [`BoundLink`] and [`LinkRegistry`]
//! build on it for foreign runtimes and shared use.

pub mod binding;
pub mod platform;
pub mod registry;
pub mod session;
pub mod system;

#[cfg(test)]
pub(crate) mod testing;

pub use binding::*;
pub use platform::*;
pub use registry::*;
pub use session::*;
pub use system::*;

pub use mumble_link_core::{
    BindingFailure, LinkError, LinkErrorKind, LinkName, Result, TeardownError, ViewRangeError,
    DEFAULT_LINK_NAME, LINK_BYTES,
};
