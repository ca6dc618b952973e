//! MumbleLink
//!
//! Zero-copy, read-only access to the MumbleLink shared memory region that
//! game clients publish positional audio data through.
//!
//! ```no_run
//! use mumble_link::prelude::*;
//!
//! let session = LinkSession::open_default()?;
//! let tick = &session.view()[4..8];
//! println!("{:?} tick bytes {:?}", session.origin(), tick);
//! session.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use mumble_link_core::{
    BindingFailure, LinkError, LinkErrorKind, LinkName, Result, TeardownError, ViewRangeError,
    DEFAULT_LINK_NAME, LINK_BYTES, VERSION,
};
pub use mumble_link_shared_memory::{
    BoundLink, LinkBinder, LinkRegistry, LinkSession, OsRegions, RegionOrigin, RegionSystem,
};

/// Re-export common types
pub mod prelude {
    pub use mumble_link_core::prelude::*;
    pub use mumble_link_shared_memory::{BoundLink, LinkBinder, LinkRegistry, LinkSession, RegionOrigin};
}
