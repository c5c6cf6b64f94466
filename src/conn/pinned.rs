use std::{fmt, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{Error, Result};

use super::Connection;

/// A handle to a connection whose lifetime is tied to a single cursor, as required under
/// load-balanced topologies. The cursor that owns the handle borrows the connection back for
/// each `getMore` and for the final `killCursors`; dropping the last handle releases the
/// connection itself.
#[derive(Clone)]
pub struct PinnedConnectionHandle {
    slot: Arc<Mutex<Option<Box<dyn Connection>>>>,
}

impl fmt::Debug for PinnedConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedConnectionHandle").finish()
    }
}

impl PinnedConnectionHandle {
    pub(crate) fn new(connection: Box<dyn Connection>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(connection))),
        }
    }

    /// Returns a new handle referring to the same pinned connection.
    pub(crate) fn replicate(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }

    /// Borrows the pinned connection for a single command. At most one operation runs on a
    /// cursor at a time, so this only contends with a concurrent release.
    pub(crate) async fn take_connection(&self) -> Result<PinnedConnection> {
        let guard = Arc::clone(&self.slot).lock_owned().await;
        if guard.is_none() {
            return Err(Error::internal(
                "attempted to use a pinned connection that was already released",
            ));
        }
        Ok(PinnedConnection { guard })
    }

    /// Releases the underlying connection. Any clone of this handle observes the release.
    pub(crate) async fn release(&self) {
        let mut guard = self.slot.lock().await;
        *guard = None;
    }
}

/// An exclusive borrow of a pinned connection. The connection returns to its handle when this is
/// dropped.
pub(crate) struct PinnedConnection {
    guard: OwnedMutexGuard<Option<Box<dyn Connection>>>,
}

impl PinnedConnection {
    pub(crate) fn as_mut(&mut self) -> &mut dyn Connection {
        // Checked in `take_connection`.
        self.guard
            .as_mut()
            .expect("pinned connection present while guard held")
            .as_mut()
    }
}
