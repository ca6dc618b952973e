//! Link session lifecycle: open-or-create, map, and ordered teardown

use crate::{OsRegions, RegionOrigin, RegionSystem};
use mumble_link_core::{LinkError, LinkName, Result, TeardownError, ViewRangeError, LINK_BYTES};
use std::fmt;
use std::io;
use std::ptr::NonNull;
use tracing::{debug, info, instrument, warn};

/// Exclusive owner of one region handle.
///
/// The handle is released exactly once: by [`RegionGuard::release`] or, if
/// that never ran, when the guard is dropped.
struct RegionGuard<S: RegionSystem> {
    system: S,
    handle: Option<S::Handle>,
    name: LinkName,
}

impl<S: RegionSystem> RegionGuard<S> {
    /// Attach to an existing region, or create one if none is present
    fn acquire(system: S, name: LinkName) -> Result<(Self, RegionOrigin)> {
        let (handle, origin) = match system.open_existing(&name) {
            Ok(handle) => (handle, RegionOrigin::Attached),
            Err(open_err) => {
                debug!(name = %name, error = %open_err, "no existing link region, creating one");
                match system.create(&name, LINK_BYTES) {
                    Ok(handle) => (handle, RegionOrigin::Created),
                    Err(create_err) => {
                        return Err(LinkError::ResourceCreation {
                            name: name.into_string(),
                            source: creation_cause(open_err, create_err),
                        })
                    }
                }
            }
        };

        let guard = Self {
            system,
            handle: Some(handle),
            name,
        };
        Ok((guard, origin))
    }

    fn map_read(&self) -> io::Result<NonNull<u8>> {
        match &self.handle {
            Some(handle) => self.system.map_read(handle, LINK_BYTES),
            None => Err(io::Error::new(io::ErrorKind::Other, "region handle already released")),
        }
    }

    fn release(&mut self) -> io::Result<()> {
        match self.handle.take() {
            Some(handle) => self.system.release(handle),
            None => Ok(()),
        }
    }
}

/// A missing region only explains the create error; any other open failure
/// is the real cause and is reported first.
fn creation_cause(open_err: io::Error, create_err: io::Error) -> io::Error {
    if open_err.kind() == io::ErrorKind::NotFound {
        return create_err;
    }
    io::Error::new(
        open_err.kind(),
        format!("{} (create fallback: {})", open_err, create_err),
    )
}

impl<S: RegionSystem> Drop for RegionGuard<S> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(name = %self.name, error = %err, "failed to release link region handle");
        }
    }
}

/// An open link: one region handle plus one read-only view of
/// [`LINK_BYTES`] bytes.
///
/// The view address never changes while the session lives. Teardown
/// unmaps the view before releasing the handle and happens exactly once,
/// either through [`LinkSession::close`] or when the session is dropped.
/// Borrows of the view are tied to the session, so the view cannot be read
/// after it was closed.
///
/// The bytes are owned by whichever process publishes them and may change at
/// any time; nothing here synchronises their contents.
pub struct LinkSession<S: RegionSystem = OsRegions> {
    view: NonNull<u8>,
    mapped: bool,
    origin: RegionOrigin,
    // Dropped after `LinkSession::drop` has unmapped the view
    region: RegionGuard<S>,
}

// Safety: the view is a process-wide mapping that is only ever read through
// `&self`, and it is unmapped only by the owner of the session.
unsafe impl<S> Send for LinkSession<S>
where
    S: RegionSystem + Send,
    S::Handle: Send,
{
}

unsafe impl<S> Sync for LinkSession<S>
where
    S: RegionSystem + Sync,
    S::Handle: Sync,
{
}

impl LinkSession<OsRegions> {
    /// Open the link region called `name`, creating it if it does not exist
    pub fn open(name: impl Into<String>) -> Result<Self> {
        Self::open_with(OsRegions, LinkName::new(name)?)
    }

    /// Shorthand for `LinkSession::open("MumbleLink")`
    pub fn open_default() -> Result<Self> {
        Self::open_with(OsRegions, LinkName::default())
    }
}

impl<S: RegionSystem> LinkSession<S> {
    /// Open `name` through the given region system.
    ///
    /// Fails with [`LinkError::ResourceCreation`] if the region could be
    /// neither opened nor created, and with [`LinkError::Mapping`] if it could
    /// not be mapped. No handle or view is held after a failure.
    #[instrument(level = "debug", skip_all, fields(name = %name))]
    pub fn open_with(system: S, name: LinkName) -> Result<Self> {
        let (region, origin) = RegionGuard::acquire(system, name)?;

        let view = match region.map_read() {
            Ok(view) => view,
            Err(source) => {
                // `region` goes out of scope here and releases the handle
                return Err(LinkError::Mapping {
                    name: region.name.to_string(),
                    source,
                });
            }
        };

        info!(name = %region.name, ?origin, "link session opened");

        Ok(Self {
            view,
            mapped: true,
            origin,
            region,
        })
    }

    pub fn name(&self) -> &LinkName {
        &self.region.name
    }

    /// Whether the region was attached to or created by this session
    pub fn origin(&self) -> RegionOrigin {
        self.origin
    }

    /// Zero-copy view of the whole region
    pub fn view(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.view.as_ptr(), LINK_BYTES) }
    }

    /// Base address of the mapped view
    pub fn as_ptr(&self) -> *const u8 {
        self.view.as_ptr()
    }

    /// Copy `dest.len()` bytes starting at `offset` into `dest`.
    ///
    /// `dest` is left untouched if the range does not fit in the view.
    pub fn copy_to(&self, offset: usize, dest: &mut [u8]) -> std::result::Result<(), ViewRangeError> {
        let end = offset
            .checked_add(dest.len())
            .filter(|end| *end <= LINK_BYTES)
            .ok_or(ViewRangeError {
                offset,
                len: dest.len(),
                capacity: LINK_BYTES,
            })?;

        dest.copy_from_slice(&self.view()[offset..end]);
        Ok(())
    }

    /// Owned copy of the current region contents
    pub fn snapshot(&self) -> Vec<u8> {
        self.view().to_vec()
    }

    /// Unmap the view, then release the region handle.
    ///
    /// Both steps run even if the first fails; every failure is reported in
    /// the returned [`TeardownError`].
    pub fn close(mut self) -> std::result::Result<(), TeardownError> {
        let unmap = self.unmap_view();
        let release = self.region.release();

        let result = TeardownError::from_steps(self.region.name.as_str(), unmap, release);
        match &result {
            Ok(()) => debug!(name = %self.region.name, "link session closed"),
            Err(err) => warn!(name = %self.region.name, error = %err, "link session closed with errors"),
        }
        result
    }

    fn unmap_view(&mut self) -> io::Result<()> {
        if !std::mem::replace(&mut self.mapped, false) {
            return Ok(());
        }
        unsafe { self.region.system.unmap(self.view, LINK_BYTES) }
    }
}

impl<S: RegionSystem> Drop for LinkSession<S> {
    fn drop(&mut self) {
        if let Err(err) = self.unmap_view() {
            warn!(name = %self.region.name, error = %err, "failed to unmap link view");
        }
    }
}

impl<S: RegionSystem> fmt::Debug for LinkSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkSession")
            .field("name", &self.region.name)
            .field("origin", &self.origin)
            .field("view", &self.view)
            .field("len", &LINK_BYTES)
            .finish()
    }
}
