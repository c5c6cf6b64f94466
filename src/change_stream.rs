//! Contains the functionality for change streams.

pub mod event;
pub mod options;

use std::{marker::PhantomData, sync::Arc};

use serde::de::DeserializeOwned;

use crate::{
    bson::{Document, Timestamp},
    change_stream::{event::ResumeToken, options::ChangeStreamOptions},
    conn::Binding,
    context::OperationContext,
    cursor::CommandBatchCursor,
    error::{ErrorKind, Result},
    executor,
    operation::AggregateTarget,
    Namespace,
};

pub use event::ChangeStreamEvent;

/// The target of a change stream: a collection, a database, or the whole deployment.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum ChangeStreamTarget {
    /// Watch the changes of a single collection.
    Collection(Namespace),

    /// Watch the changes of every collection in a database.
    Database(String),

    /// Watch all changes across the cluster.
    Cluster,
}

impl ChangeStreamTarget {
    pub(crate) fn aggregate_target(&self) -> AggregateTarget {
        match self {
            ChangeStreamTarget::Collection(ns) => AggregateTarget::Collection(ns.clone()),
            ChangeStreamTarget::Database(db) => AggregateTarget::Database(db.clone()),
            ChangeStreamTarget::Cluster => AggregateTarget::Database("admin".to_string()),
        }
    }

    pub(crate) fn is_cluster(&self) -> bool {
        matches!(self, ChangeStreamTarget::Cluster)
    }
}

/// Arguments passed to a `watch` call, captured to allow resume.
#[derive(Debug, Clone)]
pub(crate) struct WatchArgs {
    /// The pipeline of stages to append to an initial `$changeStream` stage.
    pub(crate) pipeline: Vec<Document>,

    /// The original target of the change stream.
    pub(crate) target: ChangeStreamTarget,

    /// The options provided to the initial `$changeStream` stage.
    pub(crate) options: Option<ChangeStreamOptions>,
}

/// Dynamic change stream state needed for resume.
#[derive(Debug, Default)]
pub(crate) struct ChangeStreamData {
    /// The `operationTime` returned by the initial `aggregate`, when the server supports
    /// operation-time resumes and no explicit starting point was given.
    pub(crate) initial_operation_time: Option<Timestamp>,

    /// The cached resume token.
    pub(crate) resume_token: Option<ResumeToken>,

    /// Whether the stream has returned a document to the caller.
    pub(crate) document_returned: bool,
}

/// A `ChangeStream` streams the ongoing changes of its associated collection, database, or
/// deployment.
///
/// Change streams are resumable: when a [resumable](https://github.com/mongodb/specifications/blob/master/source/change-streams/change-streams.md#resumable-error)
/// error is encountered (e.g. a transient network failure), the stream transparently kills its
/// cursor and re-runs its aggregation from the most recently observed resume token, so the
/// caller observes an uninterrupted sequence of events.
pub struct ChangeStream<T = ChangeStreamEvent>
where
    T: DeserializeOwned,
{
    cursor: CommandBatchCursor,
    args: WatchArgs,
    data: ChangeStreamData,
    binding: Arc<dyn Binding>,
    ctx: OperationContext,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> ChangeStream<T>
where
    T: DeserializeOwned,
{
    pub(crate) fn new(
        cursor: CommandBatchCursor,
        args: WatchArgs,
        data: ChangeStreamData,
        binding: Arc<dyn Binding>,
        ctx: OperationContext,
    ) -> Self {
        Self {
            cursor,
            args,
            data,
            binding,
            ctx,
            _phantom: PhantomData,
        }
    }

    /// Returns the cached resume token that can be used to resume after the most recently
    /// returned change.
    pub fn resume_token(&self) -> Option<ResumeToken> {
        self.data.resume_token.clone()
    }

    /// Update the type streamed values will be parsed as.
    pub fn with_type<D: DeserializeOwned>(self) -> ChangeStream<D> {
        ChangeStream {
            cursor: self.cursor,
            args: self.args,
            data: self.data,
            binding: self.binding,
            ctx: self.ctx,
            _phantom: PhantomData,
        }
    }

    /// Returns whether the change stream will continue to receive events.
    pub fn is_alive(&self) -> bool {
        !self.cursor.is_exhausted()
    }

    /// Retrieves the next event in the stream, blocking (via `getMore`s) until one is available
    /// or the stream is invalidated.
    pub async fn next(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(event) = self.next_if_any().await? {
                return Ok(Some(event));
            }
            if !self.is_alive() {
                return Ok(None);
            }
            self.ctx.timeout.remaining()?;
        }
    }

    /// Retrieves the next event in the stream, if any.
    ///
    /// Where [`next`](ChangeStream::next) will internally loop until a change document is
    /// received, this will make at most one request and return `None` if the returned batch is
    /// empty. This method should be used when storing the resume token in order to ensure the
    /// most up to date token is received.
    pub async fn next_if_any(&mut self) -> Result<Option<T>> {
        let raw = loop {
            match self.cursor.try_next_raw().await {
                Ok(doc) => break doc,
                Err(error) if error.is_resumable() => {
                    self.ctx.timeout.remaining()?;
                    self.resume().await?;
                }
                Err(error) => return Err(error),
            }
        };

        match raw {
            Some(doc) => {
                let token = match doc.get("_id")? {
                    Some(id) => ResumeToken(id.to_raw_bson()),
                    None => return Err(ErrorKind::MissingResumeToken.into()),
                };
                self.data.resume_token = Some(token);
                self.data.document_returned = true;
                Ok(Some(bson::from_slice(doc.as_bytes())?))
            }
            None => {
                if let Some(token) = self.cursor.post_batch_resume_token() {
                    self.data.resume_token = Some(token.clone());
                }
                Ok(None)
            }
        }
    }

    /// Kills the current cursor and rebuilds it from the stream's most recent resume point.
    async fn resume(&mut self) -> Result<()> {
        self.cursor.close().await;

        let wire_version = self.cursor.max_wire_version();
        let mut options = self.args.options.clone().unwrap_or_default();
        options.start_after = None;
        match self.data.resume_token.clone() {
            Some(token) => {
                options.resume_after = Some(token);
                options.start_at_operation_time = None;
            }
            None => {
                options.resume_after = None;
                let operation_time = self
                    .data
                    .initial_operation_time
                    .or(options.start_at_operation_time);
                options.start_at_operation_time = operation_time
                    .filter(|_| wire_version.map_or(false, |v| v >= 7));
            }
        }
        self.args.options = Some(options);

        let (cursor, data) =
            executor::execute_watch_inner(self.binding.as_ref(), &self.args, &self.ctx).await?;
        self.cursor = cursor;
        if self.data.initial_operation_time.is_none() {
            self.data.initial_operation_time = data.initial_operation_time;
        }
        Ok(())
    }

    /// Closes the stream, killing the server-side cursor if it is still alive.
    pub async fn close(&mut self) {
        self.cursor.close().await;
    }
}

impl<T: DeserializeOwned> std::fmt::Debug for ChangeStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeStream")
            .field("cursor", &self.cursor)
            .field("args", &self.args)
            .finish()
    }
}
