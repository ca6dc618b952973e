#![allow(clippy::missing_safety_doc)]

//! C ABI for managed runtimes that read the link region.
//!
//! A runtime calls [`mumble_link_open`] to receive a [`MumbleLinkView`]:
//! an opaque session pointer, the address and length of the read-only view,
//! and the link name. It wraps `data`/`len` in its own zero-copy buffer type
//! and later passes `session` to [`mumble_link_close`] exactly once.

use std::cell::RefCell;
use std::ffi::{c_char, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::Once;

use mumble_link_shared_memory::{
    BindingFailure, BoundLink, LinkBinder, LinkError, LinkErrorKind, LinkName, LINK_BYTES,
};
use tracing::{error, warn};

pub const MUMBLE_LINK_OK: i32 = 0;
pub const MUMBLE_LINK_INVALID_ARGUMENT: i32 = 1;
pub const MUMBLE_LINK_RESOURCE_CREATION: i32 = 2;
pub const MUMBLE_LINK_MAPPING: i32 = 3;
pub const MUMBLE_LINK_BINDING: i32 = 4;
pub const MUMBLE_LINK_PANIC: i32 = 5;

// ============================================================================
// Types
// ============================================================================

/// Result of a successful open.
///
/// `data` and `name` stay valid until `session` is passed to
/// [`mumble_link_close`]; reading either afterwards is undefined behavior.
#[repr(C)]
#[derive(Debug)]
pub struct MumbleLinkView {
    pub session: *mut MumbleLinkSession,
    pub data: *const u8,
    pub len: usize,
    pub name: *const c_char,
}

/// Opaque session handed to the runtime.
pub struct MumbleLinkSession {
    link: BoundLink<CString>,
}

/// Builds the C-side name and checks there is somewhere to put the result
struct ViewBinder {
    out: *mut MumbleLinkView,
}

impl LinkBinder for ViewBinder {
    type Binding = CString;

    fn bind(&mut self, _view: &[u8], name: &LinkName) -> Result<CString, BindingFailure> {
        if self.out.is_null() {
            return Err(BindingFailure::new("output view pointer is null"));
        }
        CString::new(name.as_str()).map_err(|_| BindingFailure::new("link name is not a valid C string"))
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(message: &str) {
    let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

static INIT_LOGGING: Once = Once::new();

fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init();
    });
}

fn status_of(err: &LinkError) -> i32 {
    match err.kind() {
        LinkErrorKind::InvalidName => MUMBLE_LINK_INVALID_ARGUMENT,
        LinkErrorKind::ResourceCreation => MUMBLE_LINK_RESOURCE_CREATION,
        LinkErrorKind::Mapping => MUMBLE_LINK_MAPPING,
        LinkErrorKind::Binding => MUMBLE_LINK_BINDING,
    }
}

// ============================================================================
// C ABI: session lifecycle
// ============================================================================

/// Open the link region `name`, creating it if no publisher exists yet.
///
/// Returns `MUMBLE_LINK_OK` and fills `*out` on success. Any other status
/// means nothing was acquired; [`mumble_link_last_error`] describes why.
#[no_mangle]
pub unsafe extern "C" fn mumble_link_open(name: *const c_char, out: *mut MumbleLinkView) -> i32 {
    init_logging();

    match panic::catch_unwind(AssertUnwindSafe(|| open_view(name, out))) {
        Ok(Ok(())) => {
            clear_last_error();
            MUMBLE_LINK_OK
        }
        Ok(Err((status, message))) => {
            set_last_error(&message);
            status
        }
        Err(_) => {
            error!("panic while opening link");
            set_last_error("panic while opening link");
            MUMBLE_LINK_PANIC
        }
    }
}

unsafe fn open_view(name: *const c_char, out: *mut MumbleLinkView) -> Result<(), (i32, String)> {
    if name.is_null() {
        return Err((MUMBLE_LINK_INVALID_ARGUMENT, "link name is null".to_string()));
    }
    let name = CStr::from_ptr(name)
        .to_str()
        .map_err(|_| (MUMBLE_LINK_INVALID_ARGUMENT, "link name is not valid UTF-8".to_string()))?;

    let link = BoundLink::open(name, ViewBinder { out }).map_err(|err| {
        error!(name, error = %err, "failed to open link");
        (status_of(&err), err.to_string())
    })?;

    let data = link.view().as_ptr();
    let name = link.binding().as_ptr();
    let session = Box::into_raw(Box::new(MumbleLinkSession { link }));

    out.write(MumbleLinkView {
        session,
        data,
        len: LINK_BYTES,
        name,
    });
    Ok(())
}

/// Unmap the view and release the region handle of `session`.
///
/// Must be called exactly once per session; a null pointer is ignored.
/// Teardown failures are logged and otherwise swallowed.
#[no_mangle]
pub unsafe extern "C" fn mumble_link_close(session: *mut MumbleLinkSession) {
    if session.is_null() {
        return;
    }

    let session = Box::from_raw(session);
    catch_panic("closing link", move || {
        if let Err(err) = session.link.close() {
            warn!(error = %err, "link teardown failed");
        }
    });
}

/// Run `f` without letting a panic unwind into the host; returns whether one was caught
fn catch_panic(action: &str, f: impl FnOnce()) -> bool {
    let caught = panic::catch_unwind(AssertUnwindSafe(f)).is_err();
    if caught {
        error!("panic while {}", action);
    }
    caught
}

/// Size of every link view in bytes.
#[no_mangle]
pub extern "C" fn mumble_link_bytes() -> usize {
    LINK_BYTES
}

/// Message for the last failed open on this thread, or null.
///
/// The string stays valid until the next `mumble_link_open` on this thread.
#[no_mangle]
pub extern "C" fn mumble_link_last_error() -> *const c_char {
    LAST_ERROR.with(|slot| match slot.borrow().as_ref() {
        Some(message) => message.as_ptr(),
        None => ptr::null(),
    })
}
