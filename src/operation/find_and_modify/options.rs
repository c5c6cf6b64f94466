use std::time::Duration;

use serde::Serialize;
use serde_with::skip_serializing_none;

use crate::{
    bson::{Bson, Document},
    collation::Collation,
    concern::WriteConcern,
    options::{
        FindOneAndDeleteOptions,
        FindOneAndReplaceOptions,
        FindOneAndUpdateOptions,
        Hint,
        ReturnDocument,
    },
};

/// The modification a findAndModify applies.
#[derive(Clone, Debug)]
pub(super) enum Modification {
    /// Remove the matched document.
    Delete,

    /// Apply an update document, pipeline, or replacement.
    Update(Bson),
}

/// The merged option set shared by the findAndModify variants, serialized directly into the
/// command body.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct FindAndModifyOptions {
    #[serde(rename = "fields")]
    pub(super) projection: Option<Document>,

    pub(super) sort: Option<Document>,

    pub(super) new: Option<bool>,

    pub(super) upsert: Option<bool>,

    pub(super) bypass_document_validation: Option<bool>,

    #[serde(skip)]
    pub(super) write_concern: Option<WriteConcern>,

    pub(super) array_filters: Option<Vec<Document>>,

    #[serde(skip)]
    pub(super) max_time: Option<Duration>,

    pub(super) collation: Option<Collation>,

    pub(super) hint: Option<Hint>,

    #[serde(rename = "let")]
    pub(super) let_vars: Option<Document>,

    pub(super) comment: Option<Bson>,
}

fn new_from_return_document(return_document: Option<ReturnDocument>) -> Option<bool> {
    return_document.map(|rd| rd == ReturnDocument::After)
}

impl From<FindOneAndDeleteOptions> for FindAndModifyOptions {
    fn from(options: FindOneAndDeleteOptions) -> Self {
        FindAndModifyOptions {
            projection: options.projection,
            sort: options.sort,
            write_concern: options.write_concern,
            max_time: options.max_time,
            collation: options.collation,
            hint: options.hint,
            let_vars: options.let_vars,
            comment: options.comment,
            ..Default::default()
        }
    }
}

impl From<FindOneAndUpdateOptions> for FindAndModifyOptions {
    fn from(options: FindOneAndUpdateOptions) -> Self {
        FindAndModifyOptions {
            projection: options.projection,
            sort: options.sort,
            new: Some(
                new_from_return_document(options.return_document).unwrap_or(true),
            ),
            upsert: options.upsert,
            bypass_document_validation: options.bypass_document_validation,
            write_concern: options.write_concern,
            array_filters: options.array_filters,
            max_time: options.max_time,
            collation: options.collation,
            hint: options.hint,
            let_vars: options.let_vars,
            comment: options.comment,
        }
    }
}

impl From<FindOneAndReplaceOptions> for FindAndModifyOptions {
    fn from(options: FindOneAndReplaceOptions) -> Self {
        FindAndModifyOptions {
            projection: options.projection,
            sort: options.sort,
            new: Some(
                new_from_return_document(options.return_document).unwrap_or(true),
            ),
            upsert: options.upsert,
            bypass_document_validation: options.bypass_document_validation,
            write_concern: options.write_concern,
            max_time: options.max_time,
            collation: options.collation,
            hint: options.hint,
            let_vars: options.let_vars,
            comment: options.comment,
            ..Default::default()
        }
    }
}
