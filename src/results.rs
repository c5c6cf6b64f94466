//! Contains the types of results returned by CRUD operations.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::{
    bson::{doc, Bson, Document, RawDocumentBuf},
    change_stream::event::ResumeToken,
    serde_util,
    Namespace,
};

/// The result of an insert operation.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct InsertManyResult {
    /// The `_id` field of the documents inserted, keyed by their index in the original input.
    pub inserted_ids: HashMap<usize, Bson>,
}

/// The result of an update operation.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct UpdateResult {
    /// The number of documents that matched the filter.
    pub matched_count: u64,

    /// The number of documents that were modified by the operation.
    pub modified_count: u64,

    /// The `_id` field of the upserted document, if an upsert took place.
    pub upserted_id: Option<Bson>,
}

/// The result of a delete operation.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct DeleteResult {
    /// The number of documents deleted by the operation.
    pub deleted_count: u64,
}

/// The result of a mixed bulk write.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct BulkWriteResult {
    /// The number of documents inserted.
    pub inserted_count: u64,

    /// The `_id` values of the inserted documents, keyed by their index in the models list.
    pub inserted_ids: HashMap<usize, Bson>,

    /// The number of documents matched by update operations.
    pub matched_count: u64,

    /// The number of documents modified by update operations.
    pub modified_count: u64,

    /// The number of documents deleted.
    pub deleted_count: u64,

    /// The number of documents upserted.
    pub upserted_count: u64,

    /// The `_id` values of the upserted documents, keyed by their index in the models list.
    pub upserted_ids: HashMap<usize, Bson>,
}

/// The result of a createIndexes operation.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct CreateIndexesResult {
    /// The names of the indexes created, in declaration order.
    pub index_names: Vec<String>,
}

/// A struct modeling the information about an individual database returned from a listDatabases
/// command.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DatabaseSpecification {
    /// The name of the database.
    pub name: String,

    /// The amount of disk space in bytes that is consumed by the database.
    #[serde(
        default,
        deserialize_with = "serde_util::deserialize_u64_from_bson_number",
        serialize_with = "serde_util::serialize_u64_as_i64"
    )]
    pub size_on_disk: u64,

    /// Whether the database has any data.
    #[serde(default)]
    pub empty: bool,
}

/// The batch of results yielded by a single `getMore`.
#[derive(Debug, Clone)]
pub struct GetMoreResult {
    pub(crate) batch: VecDeque<RawDocumentBuf>,
    pub(crate) exhausted: bool,
    pub(crate) post_batch_resume_token: Option<ResumeToken>,
    #[allow(dead_code)]
    pub(crate) ns: Namespace,
    pub(crate) id: i64,
}

/// Synthesizes the legacy acknowledged-write response shape from the counts of a completed write.
///
/// Single-write wrappers surface `{ ok: 1, n, updatedExisting?, upserted? }` for compatibility
/// with consumers of the pre-command write protocol.
pub fn legacy_write_response(
    n: u64,
    updated_existing: Option<bool>,
    upserted: Option<&Bson>,
) -> Document {
    let mut response = doc! { "ok": 1, "n": n as i64 };
    if let Some(updated_existing) = updated_existing {
        response.insert("updatedExisting", updated_existing);
    }
    if let Some(upserted) = upserted {
        response.insert("upserted", upserted.clone());
    }
    response
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn legacy_response_shape() {
        assert_eq!(
            legacy_write_response(3, None, None),
            doc! { "ok": 1, "n": 3_i64 }
        );
        assert_eq!(
            legacy_write_response(1, Some(false), Some(&Bson::Int32(7))),
            doc! { "ok": 1, "n": 1_i64, "updatedExisting": false, "upserted": 7 }
        );
    }
}
