//! Batch cursors over server-side query results.

mod manager;

use std::{
    collections::VecDeque,
    sync::Arc,
    time::Duration,
};

use crate::{
    bson::{Bson, Document, RawDocumentBuf, Timestamp},
    change_stream::event::ResumeToken,
    conn::{ConnectionSource, PinnedConnectionHandle, ServerAddress, StreamDescription},
    context::OperationContext,
    error::{ErrorKind, Result},
    operation::{CursorInfo, GetMore},
    runtime,
    Namespace,
};

pub(crate) use manager::CursorResourceManager;

/// A server-side cursor: its id and the address of the server holding it. An id of zero means
/// the cursor is exhausted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerCursor {
    /// The cursor id assigned by the server.
    pub id: i64,

    /// The address of the server holding the cursor.
    pub address: ServerAddress,
}

impl ServerCursor {
    pub(crate) fn new(id: i64, address: ServerAddress) -> Self {
        Self { id, address }
    }
}

/// Specification used to create a new cursor, produced by cursor-returning operations.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct CursorSpecification {
    pub(crate) info: CursorInformation,
    pub(crate) initial_buffer: VecDeque<RawDocumentBuf>,
    pub(crate) post_batch_resume_token: Option<ResumeToken>,
    pub(crate) operation_time: Option<Timestamp>,
    pub(crate) max_wire_version: Option<i32>,
}

impl CursorSpecification {
    pub(crate) fn new(
        info: CursorInfo,
        operation_time: Option<Timestamp>,
        description: &StreamDescription,
        batch_size: impl Into<Option<u32>>,
        max_await_time: impl Into<Option<Duration>>,
        comment: impl Into<Option<Bson>>,
        limit: impl Into<Option<i64>>,
    ) -> Self {
        Self {
            info: CursorInformation {
                ns: info.ns,
                id: info.id,
                address: description.server_address.clone(),
                batch_size: batch_size.into(),
                max_await_time: max_await_time.into(),
                comment: comment.into(),
                limit: limit.into().filter(|limit| *limit != 0),
            },
            initial_buffer: info.first_batch,
            post_batch_resume_token: ResumeToken::from_raw(info.post_batch_resume_token),
            operation_time,
            max_wire_version: description.max_wire_version,
        }
    }

    /// The id of the server-side cursor, or zero if the server returned the whole result.
    pub fn id(&self) -> i64 {
        self.info.id
    }

    pub(crate) fn server_cursor(&self) -> Option<ServerCursor> {
        if self.info.id == 0 {
            None
        } else {
            Some(ServerCursor::new(self.info.id, self.info.address.clone()))
        }
    }
}

/// Static information about a cursor, shared by every `getMore` issued on its behalf.
#[derive(Clone, Debug)]
pub(crate) struct CursorInformation {
    pub(crate) ns: Namespace,
    pub(crate) address: ServerAddress,
    pub(crate) id: i64,
    pub(crate) batch_size: Option<u32>,
    pub(crate) max_await_time: Option<Duration>,
    pub(crate) comment: Option<Bson>,
    pub(crate) limit: Option<i64>,
}

/// A streaming cursor over the batches of a server-side cursor.
///
/// The cursor issues `getMore` commands as its in-memory batch is exhausted, until the server
/// cursor is exhausted, the client-side limit is reached, or the cursor is closed. A failed
/// `getMore` leaves the cursor operable: the caller may retry or close it explicitly. Dropping
/// an unexhausted cursor schedules a best-effort `killCursors` on the runtime.
pub struct CommandBatchCursor {
    ctx: OperationContext,
    info: CursorInformation,
    buffer: VecDeque<RawDocumentBuf>,
    post_batch_resume_token: Option<ResumeToken>,
    operation_time: Option<Timestamp>,
    first_batch_empty: bool,
    max_wire_version: Option<i32>,
    returned: u64,
    manager: CursorResourceManager,
}

impl CommandBatchCursor {
    pub(crate) fn new(
        spec: CursorSpecification,
        source: Option<Arc<dyn ConnectionSource>>,
        pinned: Option<PinnedConnectionHandle>,
        ctx: OperationContext,
    ) -> Self {
        let first_batch_empty = spec.initial_buffer.is_empty();
        let server_cursor = spec.server_cursor();
        let mut buffer = spec.initial_buffer;

        // When the initial batch already satisfies the limit, the remaining server-side results
        // will never be requested; the excess documents are discarded and any still-live server
        // cursor is killed on close.
        if let Some(limit) = spec.info.limit {
            let limit = limit.unsigned_abs();
            if buffer.len() as u64 >= limit {
                buffer.truncate(limit as usize);
            }
        }

        let retain_source = server_cursor.is_some();
        let manager = CursorResourceManager::new(
            server_cursor,
            if retain_source { source } else { None },
            if retain_source { pinned } else { None },
        );

        Self {
            ctx,
            info: spec.info,
            buffer,
            post_batch_resume_token: spec.post_batch_resume_token,
            operation_time: spec.operation_time,
            first_batch_empty,
            max_wire_version: spec.max_wire_version,
            returned: 0,
            manager,
        }
    }

    /// Advances the cursor, fetching batches from the server as needed, and returns the next
    /// document. Returns `None` once the cursor is exhausted.
    pub async fn next(&mut self) -> Result<Option<Document>> {
        loop {
            match self.try_next().await? {
                Some(doc) => return Ok(Some(doc)),
                None if self.is_exhausted() => return Ok(None),
                // An empty non-exhausted batch (e.g. a tailable cursor with no new data yet) is
                // an iteration boundary; keep polling within the deadline.
                None => {
                    self.ctx.timeout.remaining()?;
                }
            }
        }
    }

    /// Attempts to advance the cursor, issuing at most one `getMore`. Returns `None` if no
    /// document is currently available.
    pub async fn try_next(&mut self) -> Result<Option<Document>> {
        match self.try_next_raw().await? {
            Some(raw) => Ok(Some(bson::from_slice(raw.as_bytes())?)),
            None => Ok(None),
        }
    }

    /// Whether another document is available, fetching from the server as needed.
    pub async fn has_next(&mut self) -> Result<bool> {
        if self.manager.is_closed() {
            return Err(ErrorKind::CursorClosed.into());
        }
        loop {
            if !self.buffer.is_empty() {
                return Ok(true);
            }
            if self.is_exhausted() {
                return Ok(false);
            }
            self.ctx.timeout.remaining()?;
            self.get_more().await?;
        }
    }

    pub(crate) async fn try_next_raw(&mut self) -> Result<Option<RawDocumentBuf>> {
        if self.manager.is_closed() {
            return Err(ErrorKind::CursorClosed.into());
        }
        if self.buffer.is_empty() && !self.is_exhausted() {
            self.get_more().await?;
        }
        match self.buffer.pop_front() {
            Some(doc) => {
                self.returned += 1;
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    /// The number of documents currently buffered in memory.
    pub fn available(&self) -> usize {
        self.buffer.len()
    }

    /// The batch size hint applied to subsequent `getMore`s.
    pub fn batch_size(&self) -> Option<u32> {
        self.info.batch_size
    }

    /// Overrides the batch size applied to subsequent `getMore`s.
    pub fn set_batch_size(&mut self, batch_size: u32) {
        self.info.batch_size = Some(batch_size);
    }

    /// The server-side cursor, if it has not been exhausted.
    pub fn server_cursor(&self) -> Option<ServerCursor> {
        self.manager.server_cursor()
    }

    /// The address of the server the cursor was opened on.
    pub fn server_address(&self) -> &ServerAddress {
        &self.info.address
    }

    /// The most recent `postBatchResumeToken` returned by the server, if any.
    pub fn post_batch_resume_token(&self) -> Option<&ResumeToken> {
        self.post_batch_resume_token.as_ref()
    }

    /// The `operationTime` reported by the initial command, if any.
    pub fn operation_time(&self) -> Option<Timestamp> {
        self.operation_time
    }

    /// Whether the first batch returned by the server was empty.
    pub fn is_first_batch_empty(&self) -> bool {
        self.first_batch_empty
    }

    /// The max wire version of the connection the cursor was opened on.
    pub fn max_wire_version(&self) -> Option<i32> {
        self.max_wire_version
    }

    /// Whether both the local buffer and the server cursor are exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.manager.is_exhausted() || self.limit_reached()
    }

    fn limit_reached(&self) -> bool {
        match self.info.limit {
            Some(limit) => self.returned + self.buffer.len() as u64 >= limit.unsigned_abs(),
            None => false,
        }
    }

    fn remaining_limit(&self) -> Option<u64> {
        self.info
            .limit
            .map(|limit| limit.unsigned_abs().saturating_sub(self.returned))
    }

    async fn get_more(&mut self) -> Result<()> {
        if !self.manager.try_start_operation()? {
            return Err(ErrorKind::CursorClosed.into());
        }
        let result = self.run_get_more().await;
        if let Some(payload) = self.manager.end_operation() {
            payload.run(self.info.ns.clone(), self.ctx.clone()).await;
        }
        result
    }

    async fn run_get_more(&mut self) -> Result<()> {
        let server_cursor = match self.manager.server_cursor() {
            Some(server_cursor) => server_cursor,
            None => return Ok(()),
        };

        // The batch size is capped by what the limit still allows.
        let mut info = self.info.clone();
        if let Some(remaining) = self.remaining_limit() {
            let capped = remaining.min(i32::MAX as u64) as u32;
            info.batch_size = Some(match info.batch_size {
                Some(batch_size) if batch_size != 0 => batch_size.min(capped),
                _ => capped,
            });
        }

        // Tailable-await cursors carry their await budget on every getMore; otherwise the
        // timeout mode decides whether a per-iteration budget applies.
        let max_time = match self.info.max_await_time {
            Some(max_await_time) => Some(max_await_time),
            None => self.ctx.timeout.max_time_for_get_more()?,
        };

        let mut op = GetMore::new(&info, max_time);
        let mut conn = self.manager.checkout_connection().await?;
        let result =
            crate::executor::execute_on_connection(&mut op, conn.as_mut(), &self.ctx, None).await;
        drop(conn);

        match result {
            Ok(get_more) => {
                self.buffer = get_more.batch;
                if let Some(remaining) = self.remaining_limit() {
                    self.buffer.truncate(remaining.min(usize::MAX as u64) as usize);
                }
                if let Some(token) = get_more.post_batch_resume_token {
                    self.post_batch_resume_token = Some(token);
                }
                if get_more.exhausted {
                    self.manager.set_server_cursor(None);
                } else {
                    self.manager.set_server_cursor(Some(ServerCursor::new(
                        get_more.id,
                        server_cursor.address,
                    )));
                }
                Ok(())
            }
            Err(mut error) => {
                error.wire_version = self.max_wire_version;
                if error.is_network_error() {
                    self.manager.on_corrupted_connection();
                }
                if error.code() == Some(43) {
                    // CursorNotFound: the server no longer knows the cursor, so there is
                    // nothing left to kill on close.
                    self.manager.set_server_cursor(None);
                    if let ErrorKind::Command(ref mut command_error) = *error.kind {
                        command_error.message = format!(
                            "cursor {} was not found on the server: {}",
                            server_cursor.id, command_error.message
                        );
                    }
                }
                Err(error)
            }
        }
    }

    /// Closes the cursor, killing the server-side cursor if it is still alive and releasing the
    /// retained connection resources. Closing is idempotent and never fails.
    pub async fn close(&mut self) {
        self.buffer.clear();
        if let Some(payload) = self.manager.close() {
            payload.run(self.info.ns.clone(), self.ctx.clone()).await;
        }
    }
}

impl Drop for CommandBatchCursor {
    fn drop(&mut self) {
        if let Some(payload) = self.manager.close() {
            let ns = self.info.ns.clone();
            let ctx = self.ctx.clone();
            runtime::spawn(async move {
                payload.run(ns, ctx).await;
            });
        }
    }
}

impl std::fmt::Debug for CommandBatchCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBatchCursor")
            .field("ns", &self.info.ns)
            .field("id", &self.info.id)
            .field("buffered", &self.buffer.len())
            .field("returned", &self.returned)
            .finish()
    }
}
