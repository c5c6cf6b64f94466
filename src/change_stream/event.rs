//! Contains the types of change stream events.

use serde::{Deserialize, Serialize};

use crate::bson::{Bson, Document, RawBson, RawDocumentBuf, Timestamp};

/// An opaque token used for resuming an interrupted change stream.
///
/// See the documentation
/// [here](https://www.mongodb.com/docs/manual/changeStreams/#change-stream-resume-token) for more
/// information on resume tokens.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResumeToken(pub(crate) RawBson);

impl ResumeToken {
    pub(crate) fn from_raw(doc: Option<RawDocumentBuf>) -> Option<ResumeToken> {
        doc.map(|doc| ResumeToken(RawBson::Document(doc)))
    }

    /// The token as a [`Bson`] value, e.g. for persisting across processes.
    pub fn to_bson(&self) -> crate::error::Result<Bson> {
        Ok(self.0.clone().try_into()?)
    }
}

/// A change event emitted by a change stream, describing one committed operation.
///
/// See the documentation
/// [here](https://www.mongodb.com/docs/manual/reference/change-events/) for a description of
/// each event type.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ChangeStreamEvent {
    /// An opaque token for use when resuming an interrupted change stream.
    #[serde(rename = "_id")]
    pub id: ResumeToken,

    /// The type of operation that the event reports.
    pub operation_type: OperationType,

    /// The namespace the event applies to.
    pub ns: Option<ChangeNamespace>,

    /// The new name of the collection, for rename events.
    pub to: Option<ChangeNamespace>,

    /// The `_id` of the document created or modified by the event, for CRUD event types.
    pub document_key: Option<Document>,

    /// A description of the fields that were updated, for update events.
    pub update_description: Option<UpdateDescription>,

    /// The cluster time at which the change occurred.
    pub cluster_time: Option<Timestamp>,

    /// The wall time at which the change was applied.
    pub wall_time: Option<bson::DateTime>,

    /// The most current majority-committed version of the changed document, when the stream was
    /// configured to look it up.
    pub full_document: Option<Document>,

    /// The pre-image of the changed document, when the stream was configured to return it.
    pub full_document_before_change: Option<Document>,
}

/// The operation a change event describes.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum OperationType {
    /// A document was inserted.
    Insert,

    /// A document was updated.
    Update,

    /// A document was replaced.
    Replace,

    /// A document was deleted.
    Delete,

    /// A collection was dropped.
    Drop,

    /// A collection was renamed.
    Rename,

    /// A database was dropped.
    DropDatabase,

    /// A collection was invalidated (e.g. its stream target was dropped).
    Invalidate,

    /// A new shard key was set for the collection.
    ShardCollection,

    /// A different event type, for forward compatibility.
    #[serde(untagged)]
    Other(String),
}

/// The fields changed by an update event.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct UpdateDescription {
    /// The dotted paths that were set or replaced, with their new values.
    pub updated_fields: Option<Document>,

    /// The dotted paths that were removed.
    pub removed_fields: Option<Vec<String>>,

    /// Array truncations applied by the update.
    pub truncated_arrays: Option<Vec<Document>>,
}

/// The namespace a change event applies to.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[non_exhaustive]
pub struct ChangeNamespace {
    /// The database name.
    pub db: String,

    /// The collection name, absent for database-level events.
    pub coll: Option<String>,
}
