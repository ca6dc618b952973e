//! A writable stand-in for the process that publishes link data

#![allow(dead_code)]

use mumble_link_shared_memory::{LinkName, LINK_BYTES};
use nix::fcntl::OFlag;
use nix::sys::mman::{mmap, munmap, shm_open, shm_unlink, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use std::ffi::CString;
use std::num::NonZeroUsize;
use std::os::fd::OwnedFd;
use std::ptr::NonNull;

pub struct Publisher {
    ptr: NonNull<u8>,
    path: CString,
    owner: bool,
    _fd: OwnedFd,
}

impl Publisher {
    /// Create the region, as the game client does on startup
    pub fn create(name: &LinkName) -> Self {
        let path = CString::new(format!("/{}", name)).unwrap();
        let fd = shm_open(
            path.as_c_str(),
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .unwrap();
        nix::unistd::ftruncate(&fd, LINK_BYTES as _).unwrap();
        Self::map(fd, path, true)
    }

    /// Open a region someone else created, for writing
    pub fn attach(name: &LinkName) -> Self {
        let path = CString::new(format!("/{}", name)).unwrap();
        let fd = shm_open(path.as_c_str(), OFlag::O_RDWR, Mode::empty()).unwrap();
        Self::map(fd, path, false)
    }

    fn map(fd: OwnedFd, path: CString, owner: bool) -> Self {
        let ptr = unsafe {
            mmap(
                None,
                NonZeroUsize::new(LINK_BYTES).unwrap(),
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                Some(&fd),
                0,
            )
        }
        .unwrap();

        Self {
            ptr: NonNull::new(ptr.cast::<u8>()).unwrap(),
            path,
            owner,
            _fd: fd,
        }
    }

    pub fn write(&self, offset: usize, bytes: &[u8]) {
        assert!(offset + bytes.len() <= LINK_BYTES);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.as_ptr().add(offset), bytes.len());
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.ptr.as_ptr().cast(), LINK_BYTES);
        }
        if self.owner {
            let _ = shm_unlink(self.path.as_c_str());
        }
    }
}
