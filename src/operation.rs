//! The operation layer: one type per server-side command, each knowing how to build its command
//! document and interpret its response.
//!
//! Operations are executed by the functions in [`executor`](crate::executor), which drive the
//! shared retry loop and resource management. An operation type is the combination of the
//! command factory and the response transformer for one command shape.

mod aggregate;
mod bulk_write;
mod count;
mod count_documents;
mod create;
mod create_indexes;
mod delete;
mod distinct;
mod drop_collection;
mod drop_database;
mod drop_indexes;
mod explain;
mod find;
mod find_and_modify;
mod get_more;
mod insert;
mod kill_cursors;
mod list_collections;
mod list_databases;
mod list_indexes;
mod search_index;
mod single_write;
mod update;

#[cfg(test)]
mod test;

use std::{collections::VecDeque, fmt::Debug, ops::Deref};

use serde::{Deserialize, Serialize};

use crate::{
    bson::{self, Document, RawBsonRef, RawDocumentBuf, Timestamp},
    concern::WriteConcern,
    conn::{Command, PinnedConnectionHandle, RawCommandResponse, StreamDescription},
    context::OperationContext,
    error::{BulkWriteError, CommandError, Error, ErrorKind, Result, WriteConcernError},
    selection_criteria::SelectionCriteria,
    Namespace,
};

pub use aggregate::{Aggregate, AggregateTarget};
pub(crate) use aggregate::change_stream::ChangeStreamAggregate;
pub use bulk_write::{BulkWrite, WriteModel};
pub use count::Count;
pub use count_documents::CountDocuments;
pub use create::Create;
pub use create_indexes::CreateIndexes;
pub use delete::Delete;
pub use distinct::Distinct;
pub use drop_collection::DropCollection;
pub use drop_database::DropDatabase;
pub use drop_indexes::DropIndexes;
pub use explain::Explain;
pub use find::Find;
pub use find_and_modify::FindAndModify;
pub use get_more::GetMore;
pub use insert::Insert;
pub use kill_cursors::KillCursors;
pub use list_collections::ListCollections;
pub use list_databases::ListDatabases;
pub use list_indexes::ListIndexes;
pub use search_index::DropSearchIndex;
pub use single_write::{DeleteOne, InsertOne, UpdateOne};
pub use update::{Update, UpdateOrReplace};

pub(crate) const SERVER_4_4_0_WIRE_VERSION: i32 = 9;

/// A trait modeling the behavior of a server side operation.
///
/// No methods in this trait should have default behaviors to ensure that wrapper operations
/// replicate all behavior. Default behavior is provided by the [`OperationWithDefaults`] trait.
pub trait Operation {
    /// The output type of this operation.
    type O;

    /// The name of the server side command associated with this operation.
    const NAME: &'static str;

    /// Returns the command that should be sent to the server as part of this operation.
    /// The operation may store some additional state that is required for handling the response.
    ///
    /// `build` may be invoked more than once per logical operation when attempts are retried.
    fn build(
        &mut self,
        ctx: &OperationContext,
        description: &StreamDescription,
    ) -> Result<Command>;

    /// Interprets the server response to the command.
    fn handle_response(
        &self,
        response: RawCommandResponse,
        description: &StreamDescription,
    ) -> Result<Self::O>;

    /// Interpret an error encountered while sending the built command to the server, potentially
    /// recovering.
    fn handle_error(&self, error: Error) -> Result<Self::O>;

    /// Criteria to use for selecting the server that this operation will be executed on.
    fn selection_criteria(&self) -> Option<&SelectionCriteria>;

    /// Whether this operation acquires its connection source from the binding's read path or its
    /// write path.
    fn access(&self) -> Access;

    /// Whether or not this operation will request acknowledgment from the server.
    fn is_acknowledged(&self) -> bool;

    /// The write concern to use for this operation, if any.
    fn write_concern(&self) -> Option<&WriteConcern>;

    /// The level of retryability the operation supports.
    fn retryability(&self) -> Retryability;

    /// Updates this operation as needed for a retry.
    fn update_for_retry(&mut self);

    /// The connection this operation must run on, if it is bound to a cursor's pinned
    /// connection.
    fn pinned_connection(&self) -> Option<&PinnedConnectionHandle>;

    /// The name of the command this operation emits.
    fn name(&self) -> &str;
}

/// Whether an operation acquires its connection source via the binding's read path (under a read
/// preference) or its write path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Access {
    /// The operation reads; a connection source is acquired under the operation's read
    /// preference.
    Read,

    /// The operation writes; a connection source for the primary is acquired.
    Write,
}

/// The level of retryability an operation supports.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Retryability {
    /// The operation is a retryable write: it may be re-attempted with the same transaction
    /// number.
    Write,

    /// The operation is a retryable read.
    Read,

    /// The operation is never retried.
    None,
}

/// A mirror of the [`Operation`] trait with default behavior where appropriate. Should only be
/// implemented by operation types that do not delegate to other operations.
pub trait OperationWithDefaults {
    /// The output type of this operation.
    type O;

    /// The name of the server side command associated with this operation.
    const NAME: &'static str;

    /// Returns the command that should be sent to the server as part of this operation.
    fn build(
        &mut self,
        ctx: &OperationContext,
        description: &StreamDescription,
    ) -> Result<Command>;

    /// Interprets the server response to the command.
    fn handle_response(
        &self,
        response: RawCommandResponse,
        description: &StreamDescription,
    ) -> Result<Self::O>;

    /// Interpret an error encountered while sending the built command to the server, potentially
    /// recovering.
    fn handle_error(&self, error: Error) -> Result<Self::O> {
        Err(error)
    }

    /// Criteria to use for selecting the server that this operation will be executed on.
    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        None
    }

    /// Whether this operation uses the binding's read path or write path.
    fn access(&self) -> Access {
        Access::Write
    }

    /// Whether or not this operation will request acknowledgment from the server.
    fn is_acknowledged(&self) -> bool {
        self.write_concern()
            .map(WriteConcern::is_acknowledged)
            .unwrap_or(true)
    }

    /// The write concern to use for this operation, if any.
    fn write_concern(&self) -> Option<&WriteConcern> {
        None
    }

    /// The level of retryability the operation supports.
    fn retryability(&self) -> Retryability {
        Retryability::None
    }

    /// Updates this operation as needed for a retry.
    fn update_for_retry(&mut self) {}

    /// The connection this operation must run on, if any.
    fn pinned_connection(&self) -> Option<&PinnedConnectionHandle> {
        None
    }

    /// The name of the command this operation emits.
    fn name(&self) -> &str {
        Self::NAME
    }
}

impl<T: OperationWithDefaults> Operation for T {
    type O = T::O;
    const NAME: &'static str = T::NAME;
    fn build(
        &mut self,
        ctx: &OperationContext,
        description: &StreamDescription,
    ) -> Result<Command> {
        self.build(ctx, description)
    }
    fn handle_response(
        &self,
        response: RawCommandResponse,
        description: &StreamDescription,
    ) -> Result<Self::O> {
        self.handle_response(response, description)
    }
    fn handle_error(&self, error: Error) -> Result<Self::O> {
        self.handle_error(error)
    }
    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.selection_criteria()
    }
    fn access(&self) -> Access {
        self.access()
    }
    fn is_acknowledged(&self) -> bool {
        self.is_acknowledged()
    }
    fn write_concern(&self) -> Option<&WriteConcern> {
        self.write_concern()
    }
    fn retryability(&self) -> Retryability {
        self.retryability()
    }
    fn update_for_retry(&mut self) {
        self.update_for_retry()
    }
    fn pinned_connection(&self) -> Option<&PinnedConnectionHandle> {
        self.pinned_connection()
    }
    fn name(&self) -> &str {
        self.name()
    }
}

/// A response body useful for deserializing command errors.
#[derive(Deserialize, Debug)]
pub(crate) struct CommandErrorBody {
    #[serde(rename = "errorLabels")]
    pub(crate) error_labels: Option<Vec<String>>,

    #[serde(flatten)]
    pub(crate) command_error: CommandError,
}

impl From<CommandErrorBody> for Error {
    fn from(command_error_response: CommandErrorBody) -> Error {
        Error::new(
            ErrorKind::Command(command_error_response.command_error),
            command_error_response.error_labels,
        )
    }
}

/// Appends a serializable struct to the input document. The serializable struct MUST serialize to
/// a document; otherwise, an error will be thrown.
pub(crate) fn append_options<T: Serialize + Debug>(
    doc: &mut Document,
    options: Option<&T>,
) -> Result<()> {
    if let Some(options) = options {
        let options_doc = bson::to_document(options)?;
        doc.extend(options_doc);
    }
    Ok(())
}

#[derive(Deserialize, Debug)]
pub(crate) struct EmptyBody {}

/// Body of a write response that could possibly have a write concern error but not write errors.
#[derive(Debug, Deserialize, Default, Clone)]
pub(crate) struct WriteConcernOnlyBody {
    #[serde(rename = "writeConcernError")]
    write_concern_error: Option<WriteConcernError>,

    #[serde(rename = "errorLabels")]
    labels: Option<Vec<String>>,
}

impl WriteConcernOnlyBody {
    pub(crate) fn validate(&self) -> Result<()> {
        match self.write_concern_error {
            Some(ref wc_error) => Err(Error::new(
                ErrorKind::Write(crate::error::WriteFailure::WriteConcernError(
                    wc_error.clone(),
                )),
                self.labels.clone(),
            )),
            None => Ok(()),
        }
    }
}

/// Body of a write response: the affected-document count plus any write errors or write concern
/// error the server reports.
#[derive(Deserialize, Debug)]
pub(crate) struct WriteResponseBody<T = EmptyBody> {
    #[serde(flatten)]
    body: T,

    pub(crate) n: u64,

    #[serde(rename = "writeErrors")]
    pub(crate) write_errors: Option<Vec<BulkWriteError>>,

    #[serde(rename = "writeConcernError")]
    pub(crate) write_concern_error: Option<WriteConcernError>,

    #[serde(rename = "errorLabels")]
    pub(crate) labels: Option<Vec<String>>,
}

impl<T> Deref for WriteResponseBody<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.body
    }
}

/// The uniform body of a cursor-producing command's response.
#[derive(Debug, Deserialize)]
pub(crate) struct CursorBody {
    pub(crate) cursor: CursorInfo,

    #[serde(rename = "operationTime")]
    pub(crate) operation_time: Option<Timestamp>,
}

/// The `cursor` sub-document of a cursor-producing command's response.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CursorInfo {
    pub(crate) id: i64,

    pub(crate) ns: Namespace,

    pub(crate) first_batch: VecDeque<RawDocumentBuf>,

    pub(crate) post_batch_resume_token: Option<RawDocumentBuf>,
}

/// Extracts the `operationTime` field from a raw response, if present.
pub(crate) fn extract_operation_time(response: &RawCommandResponse) -> Result<Option<Timestamp>> {
    Ok(response
        .raw_body()?
        .get("operationTime")?
        .and_then(RawBsonRef::as_timestamp))
}

