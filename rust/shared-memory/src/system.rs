//! The OS boundary every session goes through

use std::io;
use std::ptr::NonNull;
use std::sync::Arc;

use mumble_link_core::LinkName;

/// How a session came to hold its region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionOrigin {
    /// Another process published the region; this process only reads it
    Attached,
    /// This process created the region, zero-initialised by the OS
    Created,
}

/// Primitive named shared memory operations.
///
/// A session only ever calls these in one order: `open_existing`, then
/// `create` if that failed, then `map_read`, and finally `unmap` followed by
/// `release`. Implementations must not retry internally.
pub trait RegionSystem {
    /// Owned handle to a named region
    type Handle;

    /// Open an existing region for reading
    fn open_existing(&self, name: &LinkName) -> io::Result<Self::Handle>;

    /// Create a new region of `size` bytes, read-write
    fn create(&self, name: &LinkName, size: usize) -> io::Result<Self::Handle>;

    /// Map `size` bytes of the region read-only
    fn map_read(&self, handle: &Self::Handle, size: usize) -> io::Result<NonNull<u8>>;

    /// Unmap a view returned by [`RegionSystem::map_read`].
    ///
    /// # Safety
    ///
    /// `view` and `size` must come from a single successful `map_read` call
    /// and no reference into the view may outlive this call.
    unsafe fn unmap(&self, view: NonNull<u8>, size: usize) -> io::Result<()>;

    /// Release a handle. Called exactly once per handle, after its view
    /// (if any) was unmapped.
    fn release(&self, handle: Self::Handle) -> io::Result<()>;
}

impl<T: RegionSystem + ?Sized> RegionSystem for &T {
    type Handle = T::Handle;

    fn open_existing(&self, name: &LinkName) -> io::Result<Self::Handle> {
        (**self).open_existing(name)
    }

    fn create(&self, name: &LinkName, size: usize) -> io::Result<Self::Handle> {
        (**self).create(name, size)
    }

    fn map_read(&self, handle: &Self::Handle, size: usize) -> io::Result<NonNull<u8>> {
        (**self).map_read(handle, size)
    }

    unsafe fn unmap(&self, view: NonNull<u8>, size: usize) -> io::Result<()> {
        (**self).unmap(view, size)
    }

    fn release(&self, handle: Self::Handle) -> io::Result<()> {
        (**self).release(handle)
    }
}

impl<T: RegionSystem + ?Sized> RegionSystem for Arc<T> {
    type Handle = T::Handle;

    fn open_existing(&self, name: &LinkName) -> io::Result<Self::Handle> {
        (**self).open_existing(name)
    }

    fn create(&self, name: &LinkName, size: usize) -> io::Result<Self::Handle> {
        (**self).create(name, size)
    }

    fn map_read(&self, handle: &Self::Handle, size: usize) -> io::Result<NonNull<u8>> {
        (**self).map_read(handle, size)
    }

    unsafe fn unmap(&self, view: NonNull<u8>, size: usize) -> io::Result<()> {
        (**self).unmap(view, size)
    }

    fn release(&self, handle: Self::Handle) -> io::Result<()> {
        (**self).release(handle)
    }
}
