//! In-memory region system that records every call, for failure-path tests

use crate::RegionSystem;
use mumble_link_core::{LinkName, LINK_BYTES};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::ptr::NonNull;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    OpenExisting,
    Create,
    Map,
    Unmap,
    Release,
}

pub(crate) struct FakeHandle {
    name: String,
    backing: usize,
    created: bool,
}

/// Heap block standing in for a shared memory object
struct Backing {
    ptr: NonNull<u8>,
    len: usize,
}

// Safety: the block is only freed when the owning `FakeRegions` drops
unsafe impl Send for Backing {}

#[derive(Default)]
struct FakeState {
    names: HashMap<String, usize>,
    backings: Vec<Backing>,
    calls: Vec<Call>,
    live_handles: usize,
    live_views: usize,
    fail_open: bool,
    fail_create: bool,
    fail_map: bool,
    fail_unmap: bool,
    fail_release: bool,
}

/// Mimics POSIX semantics: the creator's release removes the name, while
/// memory stays valid for views that are still mapped.
#[derive(Default)]
pub(crate) struct FakeRegions {
    state: Mutex<FakeState>,
}

impl FakeRegions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_open(self) -> Self {
        self.state.lock().fail_open = true;
        self
    }

    pub fn failing_create(self) -> Self {
        self.state.lock().fail_create = true;
        self
    }

    pub fn failing_map(self) -> Self {
        self.state.lock().fail_map = true;
        self
    }

    pub fn failing_unmap(self) -> Self {
        self.state.lock().fail_unmap = true;
        self
    }

    pub fn failing_release(self) -> Self {
        self.state.lock().fail_release = true;
        self
    }

    /// Create a region as an external publisher would
    pub fn publish(&self, name: &str) {
        let mut state = self.state.lock();
        let index = allocate(&mut state, LINK_BYTES);
        state.names.insert(name.to_string(), index);
    }

    /// Write into a named region from the publisher side
    pub fn write(&self, name: &str, offset: usize, bytes: &[u8]) {
        let state = self.state.lock();
        let backing = &state.backings[state.names[name]];
        assert!(offset + bytes.len() <= backing.len);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), backing.ptr.as_ptr().add(offset), bytes.len());
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, call: Call) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == call).count()
    }

    pub fn live_handles(&self) -> usize {
        self.state.lock().live_handles
    }

    pub fn live_views(&self) -> usize {
        self.state.lock().live_views
    }
}

fn allocate(state: &mut FakeState, len: usize) -> usize {
    let block: Box<[u8]> = vec![0u8; len].into_boxed_slice();
    let ptr = NonNull::new(Box::into_raw(block).cast::<u8>()).expect("box pointer is never null");
    state.backings.push(Backing { ptr, len });
    state.backings.len() - 1
}

impl RegionSystem for FakeRegions {
    type Handle = FakeHandle;

    fn open_existing(&self, name: &LinkName) -> io::Result<FakeHandle> {
        let mut state = self.state.lock();
        state.calls.push(Call::OpenExisting);

        if state.fail_open {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }

        let backing = *state
            .names
            .get(name.as_str())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        state.live_handles += 1;
        Ok(FakeHandle { name: name.to_string(), backing, created: false })
    }

    fn create(&self, name: &LinkName, size: usize) -> io::Result<FakeHandle> {
        let mut state = self.state.lock();
        state.calls.push(Call::Create);

        if state.fail_create {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        if state.names.contains_key(name.as_str()) {
            return Err(io::Error::from(io::ErrorKind::AlreadyExists));
        }

        let backing = allocate(&mut state, size);
        state.names.insert(name.to_string(), backing);
        state.live_handles += 1;
        Ok(FakeHandle { name: name.to_string(), backing, created: true })
    }

    fn map_read(&self, handle: &FakeHandle, size: usize) -> io::Result<NonNull<u8>> {
        let mut state = self.state.lock();
        state.calls.push(Call::Map);

        if state.fail_map {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }
        let backing = &state.backings[handle.backing];
        if backing.len < size {
            return Err(io::Error::from(io::ErrorKind::InvalidData));
        }

        let ptr = backing.ptr;
        state.live_views += 1;
        Ok(ptr)
    }

    unsafe fn unmap(&self, _view: NonNull<u8>, _size: usize) -> io::Result<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::Unmap);

        if state.fail_unmap {
            return Err(io::Error::from(io::ErrorKind::Other));
        }
        state.live_views -= 1;
        Ok(())
    }

    fn release(&self, handle: FakeHandle) -> io::Result<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::Release);

        if handle.created {
            state.names.remove(&handle.name);
        }
        if state.fail_release {
            return Err(io::Error::from(io::ErrorKind::Other));
        }
        state.live_handles -= 1;
        Ok(())
    }
}

impl Drop for FakeRegions {
    fn drop(&mut self) {
        for backing in self.state.get_mut().backings.drain(..) {
            let slice = std::ptr::slice_from_raw_parts_mut(backing.ptr.as_ptr(), backing.len);
            drop(unsafe { Box::from_raw(slice) });
        }
    }
}
