//! MumbleLink - Core Module
//!
//! Constants, name validation and the error taxonomy shared by every
//! layer that opens the link region.

pub mod error;
pub mod name;

pub use error::*;
pub use name::*;

/// Re-export common types
pub mod prelude {
    pub use crate::{
        error::{LinkError, LinkErrorKind, Result, TeardownError},
        name::LinkName,
        DEFAULT_LINK_NAME, LINK_BYTES,
    };
}

/// Size of the link region in bytes.
///
/// Every mapping covers exactly this many bytes, whether the region was
/// attached or created by this process.
pub const LINK_BYTES: usize = 5460;

/// Handle name used by the game client when no custom name is configured.
pub const DEFAULT_LINK_NAME: &str = "MumbleLink";

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
