//! Platform-specific implementations for named shared memory

use crate::{RegionOrigin, RegionSystem};
use mumble_link_core::LinkName;
use std::io;
use std::ptr::NonNull;

/// Named shared memory provided by the operating system.
///
/// POSIX systems use `shm_open` + `mmap`, Windows uses file mappings backed
/// by the paging file.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRegions;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        use unix_impl as imp;
        pub use unix_impl::PosixRegion as OsRegionHandle;
    } else if #[cfg(windows)] {
        use windows_impl as imp;
        pub use windows_impl::WindowsRegion as OsRegionHandle;
    } else {
        use unsupported_impl as imp;
        pub use unsupported_impl::UnsupportedRegion as OsRegionHandle;
    }
}

impl RegionSystem for OsRegions {
    type Handle = OsRegionHandle;

    fn open_existing(&self, name: &LinkName) -> io::Result<Self::Handle> {
        imp::open_existing(name)
    }

    fn create(&self, name: &LinkName, size: usize) -> io::Result<Self::Handle> {
        imp::create(name, size)
    }

    fn map_read(&self, handle: &Self::Handle, size: usize) -> io::Result<NonNull<u8>> {
        imp::map_read(handle, size)
    }

    unsafe fn unmap(&self, view: NonNull<u8>, size: usize) -> io::Result<()> {
        imp::unmap(view, size)
    }

    fn release(&self, handle: Self::Handle) -> io::Result<()> {
        imp::release(handle)
    }
}

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use nix::fcntl::OFlag;
    use nix::sys::mman::{mmap, munmap, shm_open, shm_unlink, MapFlags, ProtFlags};
    use nix::sys::stat::{fstat, Mode};
    use parking_lot::{Mutex, MutexGuard};
    use std::collections::HashMap;
    use std::ffi::CString;
    use std::num::NonZeroUsize;
    use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd};
    use std::sync::OnceLock;

    /// Open handles per object name in this process
    #[derive(Debug, Default)]
    struct Holders {
        count: usize,
        created_here: bool,
    }

    // POSIX has no cross-process handle count, so only holders in this
    // process can keep the name alive.
    static HOLDERS: OnceLock<Mutex<HashMap<CString, Holders>>> = OnceLock::new();

    fn holders() -> MutexGuard<'static, HashMap<CString, Holders>> {
        HOLDERS.get_or_init(|| Mutex::new(HashMap::new())).lock()
    }

    /// An open POSIX shared memory object
    #[derive(Debug)]
    pub struct PosixRegion {
        fd: OwnedFd,
        path: CString,
        origin: RegionOrigin,
    }

    impl PosixRegion {
        pub fn origin(&self) -> RegionOrigin {
            self.origin
        }
    }

    fn posix_path(name: &LinkName) -> io::Result<CString> {
        CString::new(format!("/{}", name))
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "region name contains a NUL byte"))
    }

    pub fn open_existing(name: &LinkName) -> io::Result<PosixRegion> {
        let path = posix_path(name)?;

        // Held across shm_open so a concurrent last release cannot unlink in between
        let mut holders = holders();
        let fd = shm_open(path.as_c_str(), OFlag::O_RDONLY, Mode::empty())?;
        holders.entry(path.clone()).or_default().count += 1;

        Ok(PosixRegion { fd, path, origin: RegionOrigin::Attached })
    }

    pub fn create(name: &LinkName, size: usize) -> io::Result<PosixRegion> {
        let path = posix_path(name)?;
        let len = libc::off_t::try_from(size)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "region size overflows off_t"))?;

        let mut holders = holders();

        // O_EXCL: losing a creation race must not hand back someone else's region
        let fd = shm_open(
            path.as_c_str(),
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )?;

        if let Err(err) = nix::unistd::ftruncate(&fd, len) {
            let _ = shm_unlink(path.as_c_str());
            return Err(err.into());
        }

        let entry = holders.entry(path.clone()).or_default();
        entry.count += 1;
        entry.created_here = true;

        Ok(PosixRegion { fd, path, origin: RegionOrigin::Created })
    }

    pub fn map_read(handle: &PosixRegion, size: usize) -> io::Result<NonNull<u8>> {
        let length = NonZeroUsize::new(size)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "cannot map an empty view"))?;

        // Reading past the end of a shorter object raises SIGBUS
        let stat = fstat(handle.fd.as_raw_fd())?;
        let actual = u64::try_from(stat.st_size).unwrap_or(0);
        if actual < size as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("region is {} bytes, expected at least {}", actual, size),
            ));
        }

        let ptr = unsafe {
            mmap(
                None,
                length,
                ProtFlags::PROT_READ,
                MapFlags::MAP_SHARED,
                Some(&handle.fd),
                0,
            )
        }?;

        NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))
    }

    pub unsafe fn unmap(view: NonNull<u8>, size: usize) -> io::Result<()> {
        munmap(view.as_ptr().cast(), size)?;
        Ok(())
    }

    pub fn release(handle: PosixRegion) -> io::Result<()> {
        let PosixRegion { fd, path, .. } = handle;
        let mut holders = holders();

        let closed = nix::unistd::close(fd.into_raw_fd()).map_err(io::Error::from);

        // The name goes away with the last holder, if this process created it
        let remaining = holders.get_mut(&path).map(|entry| {
            entry.count = entry.count.saturating_sub(1);
            entry.count
        });
        let last_owned = match remaining {
            Some(0) => holders.remove(&path).is_some_and(|entry| entry.created_here),
            _ => false,
        };

        let unlinked = if last_owned {
            shm_unlink(path.as_c_str()).map_err(io::Error::from)
        } else {
            Ok(())
        };

        closed.and(unlinked)
    }
}

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use std::ffi::CString;
    use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
    use winapi::um::memoryapi::{MapViewOfFile, UnmapViewOfFile, FILE_MAP_READ};
    use winapi::um::winbase::{CreateFileMappingA, OpenFileMappingA};
    use winapi::um::winnt::{HANDLE, PAGE_READWRITE};

    /// An open file mapping handle
    #[derive(Debug)]
    pub struct WindowsRegion {
        handle: HANDLE,
        origin: RegionOrigin,
    }

    // Safety: file mapping handles are process-wide and usable from any thread
    unsafe impl Send for WindowsRegion {}
    unsafe impl Sync for WindowsRegion {}

    impl WindowsRegion {
        pub fn origin(&self) -> RegionOrigin {
            self.origin
        }
    }

    fn mapping_name(name: &LinkName) -> io::Result<CString> {
        CString::new(name.as_str())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "region name contains a NUL byte"))
    }

    pub fn open_existing(name: &LinkName) -> io::Result<WindowsRegion> {
        let c_name = mapping_name(name)?;

        let handle = unsafe { OpenFileMappingA(FILE_MAP_READ, 0, c_name.as_ptr()) };
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }

        Ok(WindowsRegion { handle, origin: RegionOrigin::Attached })
    }

    pub fn create(name: &LinkName, size: usize) -> io::Result<WindowsRegion> {
        let c_name = mapping_name(name)?;
        let size = size as u64;

        let handle = unsafe {
            CreateFileMappingA(
                INVALID_HANDLE_VALUE,
                std::ptr::null_mut(),
                PAGE_READWRITE,
                (size >> 32) as u32,
                (size & 0xFFFF_FFFF) as u32,
                c_name.as_ptr(),
            )
        };
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }

        Ok(WindowsRegion { handle, origin: RegionOrigin::Created })
    }

    pub fn map_read(handle: &WindowsRegion, size: usize) -> io::Result<NonNull<u8>> {
        let ptr = unsafe { MapViewOfFile(handle.handle, FILE_MAP_READ, 0, 0, size) };

        NonNull::new(ptr.cast::<u8>()).ok_or_else(io::Error::last_os_error)
    }

    pub unsafe fn unmap(view: NonNull<u8>, _size: usize) -> io::Result<()> {
        if UnmapViewOfFile(view.as_ptr() as *const _) == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn release(handle: WindowsRegion) -> io::Result<()> {
        // The OS destroys the mapping once its last handle is closed
        if unsafe { CloseHandle(handle.handle) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(not(any(unix, windows)))]
mod unsupported_impl {
    use super::*;

    /// Placeholder handle on platforms without named shared memory
    #[derive(Debug)]
    pub struct UnsupportedRegion(());

    impl UnsupportedRegion {
        pub fn origin(&self) -> RegionOrigin {
            RegionOrigin::Attached
        }
    }

    fn unsupported() -> io::Error {
        io::Error::new(io::ErrorKind::Unsupported, "named shared memory is not supported on this platform")
    }

    pub fn open_existing(_name: &LinkName) -> io::Result<UnsupportedRegion> {
        Err(unsupported())
    }

    pub fn create(_name: &LinkName, _size: usize) -> io::Result<UnsupportedRegion> {
        Err(unsupported())
    }

    pub fn map_read(_handle: &UnsupportedRegion, _size: usize) -> io::Result<NonNull<u8>> {
        Err(unsupported())
    }

    pub unsafe fn unmap(_view: NonNull<u8>, _size: usize) -> io::Result<()> {
        Err(unsupported())
    }

    pub fn release(_handle: UnsupportedRegion) -> io::Result<()> {
        Ok(())
    }
}
