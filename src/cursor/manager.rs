use std::sync::{Arc, Mutex};

use crate::{
    conn::{Connection, ConnectionSource, PinnedConnection, PinnedConnectionHandle},
    context::OperationContext,
    error::{Error, ErrorKind, Result},
    operation::KillCursors,
    Namespace,
};

use super::ServerCursor;

/// The client-side resources retained on behalf of a live server cursor: the connection source
/// that must stay alive for `getMore`s, the pinned connection under load-balanced deployments,
/// and the server cursor itself.
///
/// The manager serializes per-cursor operations and implements deferred close: a `close` that
/// arrives while an operation is in flight marks the cursor close-pending, and the in-flight
/// operation performs the physical release when it completes. All state transitions happen under
/// a single mutex; the release work itself runs outside it.
pub(crate) struct CursorResourceManager {
    state: Mutex<State>,
}

struct State {
    phase: Phase,
    server_cursor: Option<ServerCursor>,
    source: Option<Arc<dyn ConnectionSource>>,
    pinned: Option<PinnedConnectionHandle>,
    skip_releasing_server_resources: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Idle,
    InProgress,
    ClosePending,
    Closed,
}

impl CursorResourceManager {
    pub(crate) fn new(
        server_cursor: Option<ServerCursor>,
        source: Option<Arc<dyn ConnectionSource>>,
        pinned: Option<PinnedConnectionHandle>,
    ) -> Self {
        Self {
            state: Mutex::new(State {
                phase: Phase::Idle,
                server_cursor,
                source,
                pinned,
                skip_releasing_server_resources: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Attempts to begin an operation. Returns `Ok(false)` if the cursor is closed or
    /// close-pending; fails if another operation is already in progress.
    pub(crate) fn try_start_operation(&self) -> Result<bool> {
        let mut state = self.lock();
        match state.phase {
            Phase::Idle => {
                state.phase = Phase::InProgress;
                Ok(true)
            }
            Phase::InProgress => Err(ErrorKind::ConcurrentCursorOperation.into()),
            Phase::ClosePending | Phase::Closed => Ok(false),
        }
    }

    /// Completes the operation started by [`try_start_operation`](Self::try_start_operation).
    /// When a close arrived mid-operation, the extracted resources are returned for the caller
    /// to release.
    pub(crate) fn end_operation(&self) -> Option<ClosePayload> {
        let mut state = self.lock();
        match state.phase {
            Phase::InProgress => {
                state.phase = Phase::Idle;
                None
            }
            Phase::ClosePending => {
                state.phase = Phase::Closed;
                Some(state.extract_payload())
            }
            Phase::Idle | Phase::Closed => None,
        }
    }

    /// Closes the cursor. If an operation is in flight the close is deferred; otherwise the
    /// extracted resources are returned for the caller to release. Repeated closes have no
    /// further effect.
    pub(crate) fn close(&self) -> Option<ClosePayload> {
        let mut state = self.lock();
        match state.phase {
            Phase::InProgress => {
                state.phase = Phase::ClosePending;
                None
            }
            Phase::Idle => {
                state.phase = Phase::Closed;
                Some(state.extract_payload())
            }
            Phase::ClosePending | Phase::Closed => None,
        }
    }

    /// Updates the server cursor after a `getMore`. Setting `None` releases the retained client
    /// resources eagerly since no further server commands will be issued for this cursor.
    pub(crate) fn set_server_cursor(&self, server_cursor: Option<ServerCursor>) {
        let mut state = self.lock();
        debug_assert!(
            matches!(state.phase, Phase::InProgress | Phase::ClosePending),
            "server cursor updated outside an operation"
        );
        state.server_cursor = server_cursor;
        if state.server_cursor.is_none() {
            state.source = None;
            state.pinned = None;
        }
    }

    /// Records that the connection pinned to this cursor was observed failing. A later
    /// `killCursors` through it would be futile, so the server cursor is abandoned on close.
    pub(crate) fn on_corrupted_connection(&self) {
        let mut state = self.lock();
        if state.pinned.is_some() {
            state.skip_releasing_server_resources = true;
        }
    }

    pub(crate) fn server_cursor(&self) -> Option<ServerCursor> {
        self.lock().server_cursor.clone()
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.lock().server_cursor.is_none()
    }

    pub(crate) fn is_closed(&self) -> bool {
        matches!(self.lock().phase, Phase::ClosePending | Phase::Closed)
    }

    /// Checks out a connection for a cursor operation: the pinned connection if one exists, a
    /// pooled connection from the retained source otherwise.
    pub(crate) async fn checkout_connection(&self) -> Result<CursorConnection> {
        let (pinned, source) = {
            let state = self.lock();
            (
                state.pinned.as_ref().map(|p| p.replicate()),
                state.source.clone(),
            )
        };
        if let Some(pinned) = pinned {
            return Ok(CursorConnection::Pinned(pinned.take_connection().await?));
        }
        if let Some(source) = source {
            return Ok(CursorConnection::Pooled(source.connection().await?));
        }
        Err(Error::internal(
            "attempted to acquire a connection for a cursor with no retained source",
        ))
    }
}

impl State {
    fn extract_payload(&mut self) -> ClosePayload {
        ClosePayload {
            server_cursor: self.server_cursor.take(),
            source: self.source.take(),
            pinned: self.pinned.take(),
            skip_kill: self.skip_releasing_server_resources,
        }
    }
}

/// A connection checked out for a single cursor operation.
pub(crate) enum CursorConnection {
    Pinned(PinnedConnection),
    Pooled(Box<dyn Connection>),
}

impl CursorConnection {
    pub(crate) fn as_mut(&mut self) -> &mut dyn Connection {
        match self {
            Self::Pinned(conn) => conn.as_mut(),
            Self::Pooled(conn) => conn.as_mut(),
        }
    }
}

/// The resources extracted from a closed cursor, released outside the manager's lock.
pub(crate) struct ClosePayload {
    server_cursor: Option<ServerCursor>,
    source: Option<Arc<dyn ConnectionSource>>,
    pinned: Option<PinnedConnectionHandle>,
    skip_kill: bool,
}

impl ClosePayload {
    /// Releases the payload: a best-effort `killCursors` for a still-live server cursor
    /// (skipped when the pinned connection was corrupted), then the pinned connection and
    /// source, exactly once each. Server errors during the kill are swallowed since release is
    /// best-effort.
    pub(crate) async fn run(self, ns: Namespace, ctx: OperationContext) {
        if let Some(server_cursor) = self.server_cursor {
            if self.skip_kill {
                tracing::debug!(
                    cursor_id = server_cursor.id,
                    namespace = %ns,
                    "abandoning server cursor on a corrupted connection"
                );
            } else {
                let conn = match self.pinned {
                    Some(ref pinned) => pinned
                        .take_connection()
                        .await
                        .map(CursorConnection::Pinned),
                    None => match self.source {
                        Some(ref source) => {
                            source.connection().await.map(CursorConnection::Pooled)
                        }
                        None => Err(Error::internal("cursor retained no connection source")),
                    },
                };
                match conn {
                    Ok(mut conn) => {
                        let mut kill = KillCursors::new(ns.clone(), server_cursor.id);
                        let result = crate::executor::execute_on_connection(
                            &mut kill,
                            conn.as_mut(),
                            &ctx,
                            None,
                        )
                        .await;
                        tracing::debug!(
                            cursor_id = server_cursor.id,
                            namespace = %ns,
                            success = result.is_ok(),
                            "killCursors issued on cursor close"
                        );
                    }
                    Err(error) => {
                        tracing::debug!(
                            cursor_id = server_cursor.id,
                            namespace = %ns,
                            %error,
                            "failed to acquire a connection to kill a server cursor"
                        );
                    }
                }
            }
        }

        if let Some(pinned) = self.pinned {
            pinned.release().await;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn manager_with_cursor() -> CursorResourceManager {
        CursorResourceManager::new(
            Some(ServerCursor::new(42, Default::default())),
            None,
            None,
        )
    }

    #[test]
    fn at_most_one_operation_in_progress() {
        let manager = manager_with_cursor();
        assert!(manager.try_start_operation().unwrap());
        let err = manager.try_start_operation().unwrap_err();
        assert!(matches!(*err.kind, ErrorKind::ConcurrentCursorOperation));
        assert!(manager.end_operation().is_none());
        assert!(manager.try_start_operation().unwrap());
    }

    #[test]
    fn close_is_deferred_while_an_operation_is_in_flight() {
        let manager = manager_with_cursor();
        assert!(manager.try_start_operation().unwrap());

        // Close arrives mid-operation: no resources handed out yet.
        assert!(manager.close().is_none());
        assert!(manager.is_closed());

        // New operations cannot start while the close is pending.
        assert!(!manager.try_start_operation().unwrap());

        // The in-flight operation performs the release on completion.
        let payload = manager.end_operation().expect("deferred close payload");
        assert!(payload.server_cursor.is_some());
    }

    #[test]
    fn close_is_idempotent() {
        let manager = manager_with_cursor();
        assert!(manager.close().is_some());
        assert!(manager.close().is_none());
        assert!(manager.close().is_none());
        assert!(!manager.try_start_operation().unwrap());
    }

    #[test]
    fn exhaustion_releases_resources_eagerly() {
        let manager = manager_with_cursor();
        assert!(manager.try_start_operation().unwrap());
        manager.set_server_cursor(None);
        assert!(manager.is_exhausted());
        assert!(manager.end_operation().is_none());

        // A later close has nothing left to kill.
        let payload = manager.close().unwrap();
        assert!(payload.server_cursor.is_none());
    }

    #[test]
    fn corrupted_pin_skips_server_side_release() {
        let manager = CursorResourceManager::new(
            Some(ServerCursor::new(42, Default::default())),
            None,
            None,
        );
        // Without a pinned connection the flag does not apply.
        manager.on_corrupted_connection();
        let payload = manager.close().unwrap();
        assert!(!payload.skip_kill);
    }
}
