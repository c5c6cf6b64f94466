//! A blocking facade over the async operation layer, for thread-per-request embedders.
//!
//! The contracts are identical to the async entry points in [`executor`](crate::executor) and
//! [`cursor`](crate::cursor); each call drives the corresponding future to completion on the
//! calling thread.

use std::sync::Arc;

use crate::{
    bson::Document,
    change_stream::{options::ChangeStreamOptions, ChangeStream, ChangeStreamTarget},
    change_stream::event::ChangeStreamEvent,
    conn::Binding,
    context::OperationContext,
    cursor::{CommandBatchCursor, CursorSpecification},
    error::Result,
    executor,
    operation::Operation,
    runtime,
};

/// Executes the given operation under the given binding, blocking until it completes.
pub fn execute_operation<T: Operation>(
    binding: &dyn Binding,
    op: &mut T,
    ctx: &OperationContext,
) -> Result<T::O> {
    runtime::block_on(executor::execute_operation(binding, op, ctx))
}

/// Executes a cursor-producing operation, blocking until the initial batch arrives.
pub fn execute_cursor_operation<Op>(
    binding: &dyn Binding,
    op: &mut Op,
    ctx: &OperationContext,
) -> Result<Cursor>
where
    Op: Operation<O = CursorSpecification>,
{
    runtime::block_on(executor::execute_cursor_operation(binding, op, ctx)).map(Cursor::new)
}

/// Opens a change stream, blocking until the initial aggregate completes.
pub fn execute_watch(
    binding: Arc<dyn Binding>,
    target: ChangeStreamTarget,
    pipeline: impl IntoIterator<Item = Document>,
    options: Option<ChangeStreamOptions>,
    ctx: OperationContext,
) -> Result<SyncChangeStream> {
    runtime::block_on(executor::execute_watch(
        binding, target, pipeline, options, ctx,
    ))
    .map(SyncChangeStream::new)
}

/// A blocking wrapper around [`CommandBatchCursor`].
#[derive(Debug)]
pub struct Cursor {
    async_cursor: CommandBatchCursor,
}

impl Cursor {
    fn new(async_cursor: CommandBatchCursor) -> Self {
        Self { async_cursor }
    }

    /// Advances the cursor and returns the next document, blocking on `getMore`s as needed.
    pub fn next(&mut self) -> Result<Option<Document>> {
        runtime::block_on(self.async_cursor.next())
    }

    /// Attempts to advance the cursor, issuing at most one `getMore`.
    pub fn try_next(&mut self) -> Result<Option<Document>> {
        runtime::block_on(self.async_cursor.try_next())
    }

    /// Whether another document is available.
    pub fn has_next(&mut self) -> Result<bool> {
        runtime::block_on(self.async_cursor.has_next())
    }

    /// Closes the cursor, killing the server-side cursor if it is still alive.
    pub fn close(&mut self) {
        runtime::block_on(self.async_cursor.close())
    }
}

impl std::ops::Deref for Cursor {
    type Target = CommandBatchCursor;

    fn deref(&self) -> &Self::Target {
        &self.async_cursor
    }
}

/// A blocking wrapper around [`ChangeStream`].
pub struct SyncChangeStream {
    async_stream: ChangeStream<ChangeStreamEvent>,
}

impl SyncChangeStream {
    fn new(async_stream: ChangeStream<ChangeStreamEvent>) -> Self {
        Self { async_stream }
    }

    /// Retrieves the next event, blocking until one is available or the stream is invalidated.
    pub fn next(&mut self) -> Result<Option<ChangeStreamEvent>> {
        runtime::block_on(self.async_stream.next())
    }

    /// Retrieves the next event if one is immediately available.
    pub fn next_if_any(&mut self) -> Result<Option<ChangeStreamEvent>> {
        runtime::block_on(self.async_stream.next_if_any())
    }

    /// The cached resume token.
    pub fn resume_token(&self) -> Option<crate::change_stream::event::ResumeToken> {
        self.async_stream.resume_token()
    }

    /// Whether the stream will continue to receive events.
    pub fn is_alive(&self) -> bool {
        self.async_stream.is_alive()
    }

    /// Closes the stream.
    pub fn close(&mut self) {
        runtime::block_on(self.async_stream.close())
    }
}
