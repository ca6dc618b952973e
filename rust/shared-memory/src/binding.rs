//! Handing a mapped view to a foreign runtime

use crate::{LinkSession, OsRegions, RegionSystem};
use mumble_link_core::{BindingFailure, LinkError, LinkName, Result, TeardownError};
use tracing::warn;

/// Builds the caller-facing wrapper around a freshly mapped view.
///
/// A runtime binding (JNI, a C ABI, a scripting host) implements this to
/// look up its result type and construct the object it hands back. The
/// wrapper may keep raw pointers into `view`; those stay valid until the
/// owning [`BoundLink`] is closed.
pub trait LinkBinder {
    type Binding;

    fn bind(&mut self, view: &[u8], name: &LinkName) -> std::result::Result<Self::Binding, BindingFailure>;
}

impl<F, T> LinkBinder for F
where
    F: FnMut(&[u8], &LinkName) -> std::result::Result<T, BindingFailure>,
{
    type Binding = T;

    fn bind(&mut self, view: &[u8], name: &LinkName) -> std::result::Result<T, BindingFailure> {
        self(view, name)
    }
}

/// A session together with the wrapper a runtime built for it.
///
/// The binding is dropped before the session, so it never outlives the
/// view it may point into.
pub struct BoundLink<T, S: RegionSystem = OsRegions> {
    binding: T,
    session: LinkSession<S>,
}

impl<T> BoundLink<T, OsRegions> {
    /// Open `name` and bind its view with `binder`
    pub fn open<B>(name: impl Into<String>, binder: B) -> Result<Self>
    where
        B: LinkBinder<Binding = T>,
    {
        Self::open_with(OsRegions, LinkName::new(name)?, binder)
    }
}

impl<T, S: RegionSystem> BoundLink<T, S> {
    /// Open `name` through `system` and bind its view.
    ///
    /// If the binder fails the view is unmapped, then the handle released,
    /// and [`LinkError::Binding`] is returned.
    pub fn open_with<B>(system: S, name: LinkName, mut binder: B) -> Result<Self>
    where
        B: LinkBinder<Binding = T>,
    {
        let session = LinkSession::open_with(system, name)?;

        match binder.bind(session.view(), session.name()) {
            Ok(binding) => Ok(Self { binding, session }),
            Err(source) => {
                warn!(name = %session.name(), error = %source, "binding failed, unwinding link session");
                let name = session.name().to_string();
                if let Err(err) = session.close() {
                    warn!(name = %name, error = %err, "unwinding after binding failure was incomplete");
                }
                Err(LinkError::Binding { name, source })
            }
        }
    }

    pub fn binding(&self) -> &T {
        &self.binding
    }

    pub fn session(&self) -> &LinkSession<S> {
        &self.session
    }

    pub fn view(&self) -> &[u8] {
        self.session.view()
    }

    pub fn name(&self) -> &LinkName {
        self.session.name()
    }

    /// Drop the binding, then tear the session down
    pub fn close(self) -> std::result::Result<(), TeardownError> {
        let Self { binding, session } = self;
        drop(binding);
        session.close()
    }
}
