use serde::Deserialize;

use crate::{
    bson::{doc, Bson, Document},
    bson_util,
    concern::WriteConcern,
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    error::{BulkWriteFailure, Error, ErrorKind, Result},
    operation::{OperationWithDefaults, Retryability, WriteResponseBody},
    options::{ReplaceOptions, UpdateModifications, UpdateOptions},
    results::{BulkWriteResult, UpdateResult},
    Namespace,
};

/// The modification an [`Update`] applies: an update (operators or pipeline) or a full
/// replacement document.
#[derive(Clone, Debug)]
pub enum UpdateOrReplace {
    /// An update document or pipeline.
    UpdateModifications(UpdateModifications),

    /// A replacement document.
    Replacement(Document),
}

impl UpdateOrReplace {
    fn to_bson(&self) -> Bson {
        match self {
            Self::UpdateModifications(modifications) => modifications.to_bson(),
            Self::Replacement(document) => Bson::Document(document.clone()),
        }
    }
}

impl From<UpdateModifications> for UpdateOrReplace {
    fn from(modifications: UpdateModifications) -> Self {
        Self::UpdateModifications(modifications)
    }
}

/// Updates or replaces documents matching a filter with a single `update` command.
#[derive(Debug)]
pub struct Update {
    ns: Namespace,
    filter: Document,
    update: UpdateOrReplace,
    multi: Option<bool>,
    options: Option<UpdateOptions>,
}

impl Update {
    /// Constructs an update applying update operators or a pipeline. The update document is
    /// validated to consist of update operators.
    pub fn with_update(
        ns: Namespace,
        filter: Document,
        update: UpdateModifications,
        multi: bool,
        options: Option<UpdateOptions>,
    ) -> Result<Self> {
        if let UpdateModifications::Document(ref d) = update {
            bson_util::update_document_check(d)?;
        }
        Ok(Self {
            ns,
            filter,
            update: update.into(),
            multi: multi.then_some(true),
            options,
        })
    }

    /// Constructs a replacement of a single document. The replacement is validated to contain no
    /// top-level update operators.
    pub fn with_replace(
        ns: Namespace,
        filter: Document,
        replacement: Document,
        options: Option<ReplaceOptions>,
    ) -> Result<Self> {
        bson_util::replacement_document_check(&replacement)?;
        Ok(Self {
            ns,
            filter,
            update: UpdateOrReplace::Replacement(replacement),
            multi: None,
            options: options.map(ReplaceOptions::into_update_options),
        })
    }
}

impl ReplaceOptions {
    fn into_update_options(self) -> UpdateOptions {
        UpdateOptions {
            bypass_document_validation: self.bypass_document_validation,
            upsert: self.upsert,
            collation: self.collation,
            hint: self.hint,
            write_concern: self.write_concern,
            let_vars: self.let_vars,
            comment: self.comment,
            array_filters: None,
        }
    }
}

impl OperationWithDefaults for Update {
    type O = UpdateResult;

    const NAME: &'static str = "update";

    fn build(
        &mut self,
        ctx: &OperationContext,
        _description: &StreamDescription,
    ) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
        };

        let mut update = doc! {
            "q": self.filter.clone(),
            "u": self.update.to_bson(),
        };

        if let Some(ref options) = self.options {
            if let Some(upsert) = options.upsert {
                update.insert("upsert", upsert);
            }

            if let Some(ref array_filters) = options.array_filters {
                update.insert("arrayFilters", bson_util::to_bson_array(array_filters));
            }

            if let Some(ref hint) = options.hint {
                update.insert("hint", hint.to_bson());
            }

            if let Some(ref collation) = options.collation {
                update.insert("collation", bson::to_bson(collation)?);
            }

            if let Some(bypass_doc_validation) = options.bypass_document_validation {
                body.insert("bypassDocumentValidation", bypass_doc_validation);
            }

            if let Some(ref let_vars) = options.let_vars {
                body.insert("let", let_vars.clone());
            }

            if let Some(ref comment) = options.comment {
                body.insert("comment", comment.clone());
            }
        };

        if let Some(multi) = self.multi {
            update.insert("multi", multi);
        }

        body.insert("updates", vec![Bson::Document(update)]);
        body.insert("ordered", true);

        if let Some(write_concern) = ctx.session.effective_write_concern(self.write_concern()) {
            body.insert("writeConcern", bson::to_bson(&write_concern)?);
        }

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let body: WriteResponseBody<UpdateBody> = response.body()?;

        let matched_count = if body.upserted.is_some() { 0 } else { body.n };
        let modified_count = body.n_modified.unwrap_or(0);
        let upserted_id = body
            .upserted
            .as_ref()
            .and_then(|v| v.first())
            .and_then(|doc| doc.get("_id"))
            .cloned();

        if body.write_errors.is_some() || body.write_concern_error.is_some() {
            let mut failure = BulkWriteFailure::new();
            failure.write_errors = body.write_errors.clone();
            failure.write_concern_error = body.write_concern_error.clone();
            failure.partial_result = Some(Box::new(BulkWriteResult {
                matched_count,
                modified_count,
                upserted_count: if upserted_id.is_some() { 1 } else { 0 },
                ..Default::default()
            }));
            return Err(Error::new(
                ErrorKind::BulkWrite(failure),
                body.labels.clone(),
            ));
        }

        Ok(UpdateResult {
            matched_count,
            modified_count,
            upserted_id,
        })
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options
            .as_ref()
            .and_then(|opts| opts.write_concern.as_ref())
    }

    fn retryability(&self) -> Retryability {
        // Multi-document updates cannot be retried; the server may have applied a subset.
        if self.multi == Some(true) {
            Retryability::None
        } else {
            Retryability::Write
        }
    }
}

#[derive(Deserialize, Debug)]
struct UpdateBody {
    #[serde(rename = "nModified")]
    n_modified: Option<u64>,
    upserted: Option<Vec<Document>>,
}
