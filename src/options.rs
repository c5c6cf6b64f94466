//! Option types for the operations exposed by this crate.
//!
//! Option structs serialize directly into the command bodies they configure, so field renames
//! here are wire-format-significant. Fields that require special handling during command
//! construction (timeouts, concerns, selection criteria) are skipped during serialization and
//! consumed by the operation's `build` instead.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

use crate::{
    bson::{doc, Bson, Document},
    collation::Collation,
    concern::{ReadConcern, WriteConcern},
    selection_criteria::SelectionCriteria,
    serde_util,
};

pub use crate::change_stream::options::{
    ChangeStreamOptions,
    FullDocumentBeforeChangeType,
    FullDocumentType,
};

/// The type of cursor a find operation produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CursorType {
    /// A cursor that is closed by the server once its results are exhausted.
    NonTailable,

    /// A cursor over a capped collection that remains open after the last result is returned so
    /// that new documents can be retrieved later.
    Tailable,

    /// A tailable cursor for which the server blocks for a period of time waiting for new
    /// results rather than returning an empty batch immediately.
    TailableAwait,
}

impl CursorType {
    pub(crate) fn is_tailable(&self) -> bool {
        !matches!(self, CursorType::NonTailable)
    }
}

/// How a client-side deadline maps onto the `maxTimeMS` values of the commands issued on behalf
/// of a cursor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TimeoutMode {
    /// The deadline spans the whole iteration of the cursor: `maxTimeMS` is attached to the
    /// initial command and omitted from every `getMore`.
    #[default]
    CursorLifetime,

    /// Each call that may reach the server must complete within a freshly computed budget:
    /// `maxTimeMS` is omitted from the initial command and attached to every `getMore`. Tailable
    /// cursors always operate in this mode.
    Iteration,
}

/// An index hint: either the name of an index or its key pattern.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Hint {
    /// The key pattern of the index.
    Keys(Document),

    /// The name of the index.
    Name(String),
}

impl Hint {
    pub(crate) fn to_bson(&self) -> Bson {
        match self {
            Hint::Keys(ref d) => Bson::Document(d.clone()),
            Hint::Name(ref s) => Bson::String(s.clone()),
        }
    }
}

impl Serialize for Hint {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_bson().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Hint {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match Bson::deserialize(deserializer)? {
            Bson::Document(d) => Ok(Hint::Keys(d)),
            Bson::String(s) => Ok(Hint::Name(s)),
            other => Err(serde::de::Error::custom(format!(
                "expected document or string for index hint, got {:?}",
                other
            ))),
        }
    }
}

/// The modifications to apply in an update operation: either a document of update operators or
/// an aggregation pipeline.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum UpdateModifications {
    /// A document of update operators.
    Document(Document),

    /// An aggregation pipeline.
    ///
    /// Only available on server versions 4.2+.
    Pipeline(Vec<Document>),
}

impl UpdateModifications {
    pub(crate) fn to_bson(&self) -> Bson {
        match self {
            UpdateModifications::Document(ref d) => Bson::Document(d.clone()),
            UpdateModifications::Pipeline(ref p) => {
                Bson::Array(p.iter().map(|d| Bson::Document(d.clone())).collect())
            }
        }
    }
}

impl From<Document> for UpdateModifications {
    fn from(item: Document) -> Self {
        UpdateModifications::Document(item)
    }
}

impl Serialize for UpdateModifications {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_bson().serialize(serializer)
    }
}

/// Which version of a modified document a findAndModify variant returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReturnDocument {
    /// Return the document after modification.
    After,

    /// Return the document before modification.
    Before,
}

/// The verbosity of an explain command.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum Verbosity {
    /// Runs the query planner and chooses the winning plan, but does not execute it.
    QueryPlanner,

    /// Runs the query and reports execution statistics.
    ExecutionStats,

    /// Runs the query and reports execution statistics for the winning plan and candidate plans.
    AllPlansExecution,
}

/// Specifies the options to an aggregate operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct AggregateOptions {
    /// Enables writing to temporary files. When set to true, aggregation stages can write data
    /// to the _tmp subdirectory in the dbPath directory.
    pub allow_disk_use: Option<bool>,

    /// The number of documents the server should return per cursor batch.
    #[serde(skip_serializing)]
    pub batch_size: Option<u32>,

    /// Opt out of document-level validation.
    pub bypass_document_validation: Option<bool>,

    /// The collation to use for the operation.
    pub collation: Option<Collation>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    ///
    /// The comment can be any [`Bson`] value on server versions 4.4+; on lower versions it must
    /// be a string.
    pub comment: Option<Bson>,

    /// The index to use for the operation.
    pub hint: Option<Hint>,

    /// A map of parameter names to values that can be accessed from aggregation expressions
    /// using `$$`.
    #[serde(rename = "let")]
    pub let_vars: Option<Document>,

    /// The maximum amount of time for the server to wait on new documents to satisfy a
    /// tailable-await cursor query.
    #[serde(skip)]
    pub max_await_time: Option<Duration>,

    /// The maximum amount of time to allow the aggregation to run.
    #[serde(skip)]
    pub max_time: Option<Duration>,

    /// The read concern to use for the operation.
    #[serde(skip_serializing)]
    pub read_concern: Option<ReadConcern>,

    /// The criteria used to select a server for this operation.
    #[serde(skip)]
    pub selection_criteria: Option<SelectionCriteria>,

    /// The write concern to use for `$out` and `$merge` aggregations.
    #[serde(skip_serializing)]
    pub write_concern: Option<WriteConcern>,
}

/// Specifies the options to a find operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct FindOptions {
    /// Enables writing to temporary files by the server. When set to true, the find operation
    /// can write data to the _tmp subdirectory in the dbPath directory.
    ///
    /// Only supported in server versions 4.4+.
    pub allow_disk_use: Option<bool>,

    /// If true, partial results will be returned from a mongos rather than an error being
    /// returned if one or more shards is down.
    pub allow_partial_results: Option<bool>,

    /// The number of documents the server should return per cursor batch.
    #[serde(serialize_with = "serde_util::serialize_u32_option_as_i32", default)]
    pub batch_size: Option<u32>,

    /// The collation to use for the operation.
    pub collation: Option<Collation>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    pub comment: Option<Bson>,

    /// The type of cursor to return.
    #[serde(skip)]
    pub cursor_type: Option<CursorType>,

    /// The index to use for the operation.
    pub hint: Option<Hint>,

    /// The maximum number of documents to return. A negative value requests a single batch of
    /// `|limit|` documents.
    #[serde(serialize_with = "serde_util::serialize_absolute_value", default)]
    pub limit: Option<i64>,

    /// The exclusive upper bound for a specific index.
    pub max: Option<Document>,

    /// The maximum amount of time for the server to wait on new documents to satisfy a
    /// tailable-await cursor query.
    #[serde(skip)]
    pub max_await_time: Option<Duration>,

    /// The maximum amount of time to allow the query to run.
    #[serde(skip)]
    pub max_time: Option<Duration>,

    /// The inclusive lower bound for a specific index.
    pub min: Option<Document>,

    /// Whether the server should close the cursor after a period of inactivity.
    pub no_cursor_timeout: Option<bool>,

    /// Limits the fields of the document being returned.
    pub projection: Option<Document>,

    /// The read concern to use for the operation.
    #[serde(skip_serializing)]
    pub read_concern: Option<ReadConcern>,

    /// Whether to return only the index keys in the documents.
    pub return_key: Option<bool>,

    /// Whether to return the record identifier for each document.
    pub show_record_id: Option<bool>,

    /// The number of documents to skip before returning results.
    #[serde(serialize_with = "serde_util::serialize_u64_option_as_i64", default)]
    pub skip: Option<u64>,

    /// The order of the documents for the purposes of the operation.
    pub sort: Option<Document>,

    /// The criteria used to select a server for this operation.
    #[serde(skip)]
    pub selection_criteria: Option<SelectionCriteria>,

    /// A map of parameter names to values that can be accessed from query expressions using
    /// `$$`.
    #[serde(rename = "let")]
    pub let_vars: Option<Document>,
}

/// Specifies the options to a findAndModify delete variant.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct FindOneAndDeleteOptions {
    /// The collation to use for the operation.
    pub collation: Option<Collation>,

    /// The maximum amount of time to allow the operation to run.
    #[serde(skip)]
    pub max_time: Option<Duration>,

    /// Limits the fields of the document being returned.
    #[serde(rename = "fields")]
    pub projection: Option<Document>,

    /// The order of the documents for the purposes of the operation.
    pub sort: Option<Document>,

    /// The write concern to use for the operation.
    #[serde(skip_serializing)]
    pub write_concern: Option<WriteConcern>,

    /// The index to use for the operation.
    ///
    /// Only available on server versions 4.4+.
    pub hint: Option<Hint>,

    /// A map of parameter names to values that can be accessed from query expressions using
    /// `$$`.
    #[serde(rename = "let")]
    pub let_vars: Option<Document>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    pub comment: Option<Bson>,
}

/// Specifies the options to a findAndModify update variant.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct FindOneAndUpdateOptions {
    /// A set of filters specifying to which array elements an update should apply.
    pub array_filters: Option<Vec<Document>>,

    /// Opt out of document-level validation.
    pub bypass_document_validation: Option<bool>,

    /// The collation to use for the operation.
    pub collation: Option<Collation>,

    /// The maximum amount of time to allow the operation to run.
    #[serde(skip)]
    pub max_time: Option<Duration>,

    /// Limits the fields of the document being returned.
    #[serde(rename = "fields")]
    pub projection: Option<Document>,

    /// Whether the operation should return the document before or after modification.
    #[serde(skip)]
    pub return_document: Option<ReturnDocument>,

    /// The order of the documents for the purposes of the operation.
    pub sort: Option<Document>,

    /// If true, insert a document if no matching document is found.
    pub upsert: Option<bool>,

    /// The write concern to use for the operation.
    #[serde(skip_serializing)]
    pub write_concern: Option<WriteConcern>,

    /// The index to use for the operation.
    ///
    /// Only available on server versions 4.4+.
    pub hint: Option<Hint>,

    /// A map of parameter names to values that can be accessed from query expressions using
    /// `$$`.
    #[serde(rename = "let")]
    pub let_vars: Option<Document>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    pub comment: Option<Bson>,
}

/// Specifies the options to a findAndModify replace variant.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct FindOneAndReplaceOptions {
    /// Opt out of document-level validation.
    pub bypass_document_validation: Option<bool>,

    /// The collation to use for the operation.
    pub collation: Option<Collation>,

    /// The maximum amount of time to allow the operation to run.
    #[serde(skip)]
    pub max_time: Option<Duration>,

    /// Limits the fields of the document being returned.
    #[serde(rename = "fields")]
    pub projection: Option<Document>,

    /// Whether the operation should return the document before or after modification.
    #[serde(skip)]
    pub return_document: Option<ReturnDocument>,

    /// The order of the documents for the purposes of the operation.
    pub sort: Option<Document>,

    /// If true, insert a document if no matching document is found.
    pub upsert: Option<bool>,

    /// The write concern to use for the operation.
    #[serde(skip_serializing)]
    pub write_concern: Option<WriteConcern>,

    /// The index to use for the operation.
    ///
    /// Only available on server versions 4.4+.
    pub hint: Option<Hint>,

    /// A map of parameter names to values that can be accessed from query expressions using
    /// `$$`.
    #[serde(rename = "let")]
    pub let_vars: Option<Document>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    pub comment: Option<Bson>,
}

/// Specifies the options to an insert operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct InsertManyOptions {
    /// Opt out of document-level validation.
    pub bypass_document_validation: Option<bool>,

    /// Whether the writes must be applied in the order given, stopping at the first failure.
    /// Defaults to true.
    pub ordered: Option<bool>,

    /// The write concern to use for the operation.
    #[serde(skip_serializing)]
    pub write_concern: Option<WriteConcern>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    pub comment: Option<Bson>,
}

/// Specifies the options to an update operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct UpdateOptions {
    /// A set of filters specifying to which array elements an update should apply.
    pub array_filters: Option<Vec<Document>>,

    /// Opt out of document-level validation.
    pub bypass_document_validation: Option<bool>,

    /// If true, insert a document if no matching document is found.
    pub upsert: Option<bool>,

    /// The collation to use for the operation.
    pub collation: Option<Collation>,

    /// The index to use for the operation.
    ///
    /// Only available in server versions 4.2+.
    pub hint: Option<Hint>,

    /// The write concern to use for the operation.
    #[serde(skip_serializing)]
    pub write_concern: Option<WriteConcern>,

    /// A map of parameter names to values that can be accessed from update expressions using
    /// `$$`.
    #[serde(rename = "let")]
    pub let_vars: Option<Document>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    pub comment: Option<Bson>,
}

/// Specifies the options to a replace operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ReplaceOptions {
    /// Opt out of document-level validation.
    pub bypass_document_validation: Option<bool>,

    /// If true, insert a document if no matching document is found.
    pub upsert: Option<bool>,

    /// The collation to use for the operation.
    pub collation: Option<Collation>,

    /// The index to use for the operation.
    ///
    /// Only available in server versions 4.2+.
    pub hint: Option<Hint>,

    /// The write concern to use for the operation.
    #[serde(skip_serializing)]
    pub write_concern: Option<WriteConcern>,

    /// A map of parameter names to values that can be accessed from update expressions using
    /// `$$`.
    #[serde(rename = "let")]
    pub let_vars: Option<Document>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    pub comment: Option<Bson>,
}

/// Specifies the options to a delete operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DeleteOptions {
    /// The collation to use for the operation.
    pub collation: Option<Collation>,

    /// The write concern to use for the operation.
    #[serde(skip_serializing)]
    pub write_concern: Option<WriteConcern>,

    /// The index to use for the operation.
    ///
    /// Only available in server versions 4.4+.
    pub hint: Option<Hint>,

    /// A map of parameter names to values that can be accessed from query expressions using
    /// `$$`.
    #[serde(rename = "let")]
    pub let_vars: Option<Document>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    pub comment: Option<Bson>,
}

/// Specifies the options to a countDocuments operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct CountOptions {
    /// The collation to use for the operation.
    pub collation: Option<Collation>,

    /// The index to use for the operation.
    pub hint: Option<Hint>,

    /// The maximum number of documents to count.
    #[serde(serialize_with = "serde_util::serialize_u64_option_as_i64", default)]
    pub limit: Option<u64>,

    /// The maximum amount of time to allow the count to run.
    #[serde(skip)]
    pub max_time: Option<Duration>,

    /// The number of documents to skip before counting.
    #[serde(serialize_with = "serde_util::serialize_u64_option_as_i64", default)]
    pub skip: Option<u64>,

    /// The read concern to use for the operation.
    #[serde(skip_serializing)]
    pub read_concern: Option<ReadConcern>,

    /// The criteria used to select a server for this operation.
    #[serde(skip)]
    pub selection_criteria: Option<SelectionCriteria>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    pub comment: Option<Bson>,
}

/// Specifies the options to an estimatedDocumentCount operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct EstimatedDocumentCountOptions {
    /// The maximum amount of time to allow the count to run.
    #[serde(skip)]
    pub max_time: Option<Duration>,

    /// The read concern to use for the operation.
    #[serde(skip_serializing)]
    pub read_concern: Option<ReadConcern>,

    /// The criteria used to select a server for this operation.
    #[serde(skip)]
    pub selection_criteria: Option<SelectionCriteria>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    pub comment: Option<Bson>,
}

/// Specifies the options to a distinct operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DistinctOptions {
    /// The collation to use for the operation.
    pub collation: Option<Collation>,

    /// The maximum amount of time to allow the query to run.
    #[serde(skip)]
    pub max_time: Option<Duration>,

    /// The read concern to use for the operation.
    #[serde(skip_serializing)]
    pub read_concern: Option<ReadConcern>,

    /// The criteria used to select a server for this operation.
    #[serde(skip)]
    pub selection_criteria: Option<SelectionCriteria>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    pub comment: Option<Bson>,
}

/// Specifies the options to a create-collection operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct CreateCollectionOptions {
    /// Whether the collection should be capped. If true, `size` must also be set.
    pub capped: Option<bool>,

    /// The maximum size (in bytes) for a capped collection.
    #[serde(serialize_with = "serde_util::serialize_u64_option_as_i64", default)]
    pub size: Option<u64>,

    /// The maximum number of documents in a capped collection.
    #[serde(serialize_with = "serde_util::serialize_u64_option_as_i64", default)]
    pub max: Option<u64>,

    /// The storage engine that the collection should use.
    pub storage_engine: Option<Document>,

    /// Specifies a validator to restrict the schema of documents which can exist in the
    /// collection.
    pub validator: Option<Document>,

    /// Specifies how strictly the database should apply the validation rules to existing
    /// documents during an update.
    pub validation_level: Option<ValidationLevel>,

    /// Specifies whether the database should return an error or simply raise a warning if
    /// inserted documents do not pass the validation.
    pub validation_action: Option<ValidationAction>,

    /// The default collation for the collection.
    pub collation: Option<Collation>,

    /// The default configuration for indexes created on this collection.
    pub index_option_defaults: Option<Document>,

    /// Options for time series collections.
    pub timeseries: Option<TimeseriesOptions>,

    /// Documents in a time series collection expire after this duration.
    #[serde(
        serialize_with = "serde_util::serialize_duration_option_as_int_seconds",
        deserialize_with = "serde_util::deserialize_duration_option_from_u64_seconds",
        default
    )]
    pub expire_after_seconds: Option<Duration>,

    /// Whether pre- and post-images of changed documents are recorded for use in change streams.
    pub change_stream_pre_and_post_images: Option<ChangeStreamPreAndPostImages>,

    /// A clustered-index specification for the collection.
    pub clustered_index: Option<ClusteredIndex>,

    /// The encrypted-field configuration for queryable encryption. Driving the auxiliary
    /// collection chain, this is also serialized into the `create` command itself.
    pub encrypted_fields: Option<Document>,

    /// The write concern to use for the operation.
    #[serde(skip_serializing)]
    pub write_concern: Option<WriteConcern>,
}

/// Specifies how strictly the database should apply validation rules to existing documents
/// during an update.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum ValidationLevel {
    /// No validation for inserts or updates.
    Off,

    /// Apply validation rules to all inserts and updates.
    Strict,

    /// Apply validation rules to inserts and to updates on existing valid documents.
    Moderate,
}

/// Specifies whether the database should return an error or simply raise a warning if inserted
/// documents do not pass the validation.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum ValidationAction {
    /// Return an error if inserted documents do not pass the validation.
    Error,

    /// Raise a warning if inserted documents do not pass the validation.
    Warn,
}

/// Specifies options for a time series collection.
#[skip_serializing_none]
#[derive(Clone, Debug, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct TimeseriesOptions {
    /// The name of the top-level field to be used for time.
    #[builder(!default)]
    pub time_field: String,

    /// The name of the top-level field describing the series.
    pub meta_field: Option<String>,

    /// The coarse granularity of time series data.
    pub granularity: Option<TimeseriesGranularity>,
}

/// The coarse granularity of time series data.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum TimeseriesGranularity {
    /// The data is in the seconds range.
    Seconds,

    /// The data is in the minutes range.
    Minutes,

    /// The data is in the hours range.
    Hours,
}

/// Whether pre- and post-images of changed documents are recorded.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct ChangeStreamPreAndPostImages {
    /// Whether recording is enabled.
    pub enabled: bool,
}

/// A clustered-index specification.
#[skip_serializing_none]
#[derive(Clone, Debug, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct ClusteredIndex {
    /// The clustering key. Currently, the only supported value is `{ "_id": 1 }`.
    #[builder(!default)]
    pub key: Document,

    /// Whether the index entries must be unique. Currently required to be true.
    #[builder(!default)]
    pub unique: bool,

    /// An optional name for the index.
    pub name: Option<String>,

    /// The index format version.
    pub v: Option<i32>,
}

impl Default for ClusteredIndex {
    fn default() -> Self {
        Self {
            key: doc! { "_id": 1 },
            unique: true,
            name: None,
            v: None,
        }
    }
}

/// Specifies the options to a drop-collection operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DropCollectionOptions {
    /// The write concern to use for the operation.
    #[serde(skip_serializing)]
    pub write_concern: Option<WriteConcern>,

    /// The encrypted-field configuration of the collection being dropped; drives the auxiliary
    /// collection chain and is not part of the `drop` command itself.
    #[serde(skip_serializing)]
    pub encrypted_fields: Option<Document>,
}

/// Specifies the options to a drop-database operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DropDatabaseOptions {
    /// The write concern to use for the operation.
    #[serde(skip_serializing)]
    pub write_concern: Option<WriteConcern>,
}

/// Specifies the options to a createIndexes operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct CreateIndexOptions {
    /// The minimum number of data-bearing voting replica set members that must report a
    /// successful build before the command returns.
    ///
    /// Only available on server versions 4.4+.
    pub commit_quorum: Option<CommitQuorum>,

    /// The maximum amount of time to allow the index build to run.
    #[serde(skip)]
    pub max_time: Option<Duration>,

    /// The write concern to use for the operation.
    #[serde(skip_serializing)]
    pub write_concern: Option<WriteConcern>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    pub comment: Option<Bson>,
}

/// Specifies the minimum number of data-bearing voting replica set members that must report a
/// successful index build before the `createIndexes` command returns.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum CommitQuorum {
    /// A specific number of members.
    Nodes(u32),

    /// A majority of data-bearing voting members.
    Majority,

    /// All data-bearing voting members.
    VotingMembers,

    /// A replica set tag name.
    Custom(String),
}

impl Serialize for CommitQuorum {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            CommitQuorum::Nodes(n) => {
                serde_util::serialize_u32_option_as_i32(&Some(*n), serializer)
            }
            CommitQuorum::Majority => serializer.serialize_str("majority"),
            CommitQuorum::VotingMembers => serializer.serialize_str("votingMembers"),
            CommitQuorum::Custom(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for CommitQuorum {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum IntOrString {
            Int(u32),
            String(String),
        }
        match IntOrString::deserialize(deserializer)? {
            IntOrString::Int(n) => Ok(CommitQuorum::Nodes(n)),
            IntOrString::String(s) if s == "majority" => Ok(CommitQuorum::Majority),
            IntOrString::String(s) if s == "votingMembers" => Ok(CommitQuorum::VotingMembers),
            IntOrString::String(s) => Ok(CommitQuorum::Custom(s)),
        }
    }
}

/// Specifies the options to a dropIndexes operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DropIndexOptions {
    /// The maximum amount of time to allow the drop to run.
    #[serde(skip)]
    pub max_time: Option<Duration>,

    /// The write concern to use for the operation.
    #[serde(skip_serializing)]
    pub write_concern: Option<WriteConcern>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    pub comment: Option<Bson>,
}

/// Specifies the options to a listCollections operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ListCollectionsOptions {
    /// Filters the query.
    pub filter: Option<Document>,

    /// Whether to only return collections the user is authorized to use.
    pub authorized_collections: Option<bool>,

    /// The number of documents the server should return per cursor batch.
    #[serde(
        serialize_with = "serde_util::serialize_u32_option_as_batch_size",
        rename(serialize = "cursor"),
        default
    )]
    pub batch_size: Option<u32>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    pub comment: Option<Bson>,
}

/// Specifies the options to a listDatabases operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ListDatabasesOptions {
    /// Filters the query.
    pub filter: Option<Document>,

    /// Whether to only return databases the user is authorized to use.
    pub authorized_databases: Option<bool>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    pub comment: Option<Bson>,
}

/// Specifies the options to a listIndexes operation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ListIndexesOptions {
    /// The number of index documents the server should return per cursor batch.
    #[serde(
        serialize_with = "serde_util::serialize_u32_option_as_batch_size",
        rename(serialize = "cursor"),
        default
    )]
    pub batch_size: Option<u32>,

    /// The maximum amount of time to allow the operation to run.
    #[serde(skip)]
    pub max_time: Option<Duration>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    pub comment: Option<Bson>,
}
