//! Shared link sessions, one per name

use crate::{LinkSession, OsRegions, RegionSystem};
use mumble_link_core::{LinkName, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Hands out one shared session per link name.
///
/// Callers holding the returned `Arc` keep the session open; it is torn
/// down when the last clone is dropped, and the next `open` for that name
/// starts a new session. Teardown through `Drop` is best-effort and only
/// logs failures.
pub struct LinkRegistry<S: RegionSystem + Clone = OsRegions> {
    system: S,
    sessions: Mutex<HashMap<String, Weak<LinkSession<S>>>>,
}

impl LinkRegistry<OsRegions> {
    /// Create a registry backed by the operating system
    pub fn new() -> Self {
        Self::with_system(OsRegions)
    }
}

impl Default for LinkRegistry<OsRegions> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: RegionSystem + Clone> LinkRegistry<S> {
    pub fn with_system(system: S) -> Self {
        Self {
            system,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Get the live session for `name`, or open a new one
    pub fn open(&self, name: impl Into<String>) -> Result<Arc<LinkSession<S>>> {
        let name = LinkName::new(name)?;
        let mut sessions = self.sessions.lock();

        if let Some(session) = sessions.get(name.as_str()).and_then(Weak::upgrade) {
            debug!(name = %name, "reusing shared link session");
            return Ok(session);
        }
        sessions.retain(|_, session| session.strong_count() > 0);

        let session = Arc::new(LinkSession::open_with(self.system.clone(), name.clone())?);
        sessions.insert(name.into_string(), Arc::downgrade(&session));
        Ok(session)
    }

    /// Names that currently have a live session
    pub fn active_names(&self) -> Vec<String> {
        let mut sessions = self.sessions.lock();
        sessions.retain(|_, session| session.strong_count() > 0);

        let mut names: Vec<String> = sessions.keys().cloned().collect();
        names.sort();
        names
    }
}
