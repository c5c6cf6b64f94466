use crate::{
    bson::Document,
    concern::WriteConcern,
    conn::Binding,
    context::OperationContext,
    error::{BulkWriteError, BulkWriteFailure, Error, ErrorKind, Result},
    executor,
    operation::{Delete, Insert, Update},
    options::{
        DeleteOptions,
        InsertManyOptions,
        ReplaceOptions,
        UpdateModifications,
        UpdateOptions,
    },
    results::BulkWriteResult,
    Namespace,
};

/// A single write in a mixed bulk write.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum WriteModel {
    /// Insert one document.
    InsertOne {
        /// The document to insert.
        document: Document,
    },

    /// Update at most one document matching a filter.
    UpdateOne {
        /// The filter selecting the document.
        filter: Document,
        /// The update to apply.
        update: UpdateModifications,
        /// Options for the individual update.
        options: Option<UpdateOptions>,
    },

    /// Update every document matching a filter.
    UpdateMany {
        /// The filter selecting the documents.
        filter: Document,
        /// The update to apply.
        update: UpdateModifications,
        /// Options for the individual update.
        options: Option<UpdateOptions>,
    },

    /// Replace at most one document matching a filter.
    ReplaceOne {
        /// The filter selecting the document.
        filter: Document,
        /// The replacement document.
        replacement: Document,
        /// Options for the individual replacement.
        options: Option<ReplaceOptions>,
    },

    /// Delete at most one document matching a filter.
    DeleteOne {
        /// The filter selecting the document.
        filter: Document,
        /// Options for the individual delete.
        options: Option<DeleteOptions>,
    },

    /// Delete every document matching a filter.
    DeleteMany {
        /// The filter selecting the documents.
        filter: Document,
        /// Options for the individual delete.
        options: Option<DeleteOptions>,
    },
}

/// A mixed batch of writes executed as a sequence of `insert`, `update`, and `delete` commands.
///
/// Contiguous runs of same-typed models are grouped into single commands and split to respect the
/// server's write batch limit. In ordered mode the first write error stops the batch; in
/// unordered mode execution continues and the errors are aggregated.
#[derive(Debug)]
pub struct BulkWrite {
    ns: Namespace,
    models: Vec<WriteModel>,
    ordered: bool,
    write_concern: Option<WriteConcern>,
}

impl BulkWrite {
    /// Constructs a bulk write of the given models.
    pub fn new(
        ns: Namespace,
        models: Vec<WriteModel>,
        ordered: bool,
        write_concern: Option<WriteConcern>,
    ) -> Self {
        Self {
            ns,
            models,
            ordered,
            write_concern,
        }
    }

    /// Executes the bulk write under the given binding, producing an aggregated result.
    pub async fn execute(
        self,
        binding: &dyn Binding,
        ctx: &OperationContext,
    ) -> Result<BulkWriteResult> {
        let mut combiner = ResultCombiner::new(self.ordered);

        'runs: for (offset, run) in runs(&self.models) {
            match &run[0] {
                WriteModel::InsertOne { .. } => {
                    let documents: Vec<Document> = run
                        .iter()
                        .map(|model| match model {
                            WriteModel::InsertOne { document } => document.clone(),
                            _ => unreachable!("runs are homogeneous"),
                        })
                        .collect();

                    // The write batch limit is negotiated per connection, so each command
                    // covers as many of the remaining documents as the server accepts and the
                    // operation is re-issued for the rest.
                    let mut start = 0;
                    while start < documents.len() {
                        let options = InsertManyOptions::builder()
                            .ordered(self.ordered)
                            .write_concern(self.write_concern.clone())
                            .build();
                        let mut op = Insert::new(
                            self.ns.clone(),
                            documents[start..].to_vec(),
                            Some(options),
                        );
                        let outcome = RunOutcome::Insert(
                            executor::execute_operation(binding, &mut op, ctx).await,
                        );
                        let attempted = op.n_attempted().max(1);
                        if !combiner.absorb(offset + start, outcome) {
                            break 'runs;
                        }
                        start += attempted;
                    }
                }
                WriteModel::UpdateOne { .. }
                | WriteModel::UpdateMany { .. }
                | WriteModel::ReplaceOne { .. } => {
                    // Update statements can differ per model, so each one is its own command
                    // invocation.
                    let outcome =
                        RunOutcome::Update(self.execute_update(binding, ctx, &run[0]).await);
                    if !combiner.absorb(offset, outcome) {
                        break;
                    }
                }
                WriteModel::DeleteOne { .. } | WriteModel::DeleteMany { .. } => {
                    let outcome =
                        RunOutcome::Delete(self.execute_delete(binding, ctx, &run[0]).await);
                    if !combiner.absorb(offset, outcome) {
                        break;
                    }
                }
            }
        }

        combiner.finish()
    }

    async fn execute_update(
        &self,
        binding: &dyn Binding,
        ctx: &OperationContext,
        model: &WriteModel,
    ) -> Result<crate::results::UpdateResult> {
        let mut op = match model {
            WriteModel::UpdateOne {
                filter,
                update,
                options,
            } => Update::with_update(
                self.ns.clone(),
                filter.clone(),
                update.clone(),
                false,
                Some(self.update_options(options)),
            )?,
            WriteModel::UpdateMany {
                filter,
                update,
                options,
            } => Update::with_update(
                self.ns.clone(),
                filter.clone(),
                update.clone(),
                true,
                Some(self.update_options(options)),
            )?,
            WriteModel::ReplaceOne {
                filter,
                replacement,
                options,
            } => {
                let mut options = options.clone().unwrap_or_default();
                if options.write_concern.is_none() {
                    options.write_concern = self.write_concern.clone();
                }
                Update::with_replace(
                    self.ns.clone(),
                    filter.clone(),
                    replacement.clone(),
                    Some(options),
                )?
            }
            _ => unreachable!("update run contains update models"),
        };
        executor::execute_operation(binding, &mut op, ctx).await
    }

    async fn execute_delete(
        &self,
        binding: &dyn Binding,
        ctx: &OperationContext,
        model: &WriteModel,
    ) -> Result<crate::results::DeleteResult> {
        let (filter, limit, options) = match model {
            WriteModel::DeleteOne { filter, options } => (filter, Some(1), options),
            WriteModel::DeleteMany { filter, options } => (filter, None, options),
            _ => unreachable!("delete run contains delete models"),
        };
        let mut delete_options = options.clone().unwrap_or_default();
        if delete_options.write_concern.is_none() {
            delete_options.write_concern = self.write_concern.clone();
        }
        let mut op = Delete::new(
            self.ns.clone(),
            filter.clone(),
            limit,
            Some(delete_options),
        );
        executor::execute_operation(binding, &mut op, ctx).await
    }

    fn update_options(&self, options: &Option<UpdateOptions>) -> UpdateOptions {
        let mut options = options.clone().unwrap_or_default();
        if options.write_concern.is_none() {
            options.write_concern = self.write_concern.clone();
        }
        options
    }
}

/// Splits the models into homogeneous runs: contiguous inserts group into one run (split
/// against the server's batch limit at execution time); updates and deletes execute one model
/// per command.
fn runs(models: &[WriteModel]) -> Vec<(usize, &[WriteModel])> {
    let mut out = Vec::new();
    let mut start = 0;
    while start < models.len() {
        match models[start] {
            WriteModel::InsertOne { .. } => {
                let mut end = start + 1;
                while end < models.len() && matches!(models[end], WriteModel::InsertOne { .. }) {
                    end += 1;
                }
                out.push((start, &models[start..end]));
                start = end;
            }
            _ => {
                out.push((start, &models[start..start + 1]));
                start += 1;
            }
        }
    }
    out
}

enum RunOutcome {
    Insert(Result<crate::results::InsertManyResult>),
    Update(Result<crate::results::UpdateResult>),
    Delete(Result<crate::results::DeleteResult>),
}

struct ResultCombiner {
    ordered: bool,
    result: BulkWriteResult,
    write_errors: Vec<BulkWriteError>,
    write_concern_errors: Vec<crate::error::WriteConcernError>,
    labels: Vec<String>,
    fatal: Option<Error>,
}

impl ResultCombiner {
    fn new(ordered: bool) -> Self {
        Self {
            ordered,
            result: BulkWriteResult::default(),
            write_errors: Vec::new(),
            write_concern_errors: Vec::new(),
            labels: Vec::new(),
            fatal: None,
        }
    }

    /// Absorbs one run's outcome. Returns whether execution should continue.
    fn absorb(&mut self, offset: usize, outcome: RunOutcome) -> bool {
        let error = match outcome {
            RunOutcome::Insert(Ok(result)) => {
                self.result.inserted_count += result.inserted_ids.len() as u64;
                for (index, id) in result.inserted_ids {
                    self.result.inserted_ids.insert(offset + index, id);
                }
                None
            }
            RunOutcome::Update(Ok(result)) => {
                self.result.matched_count += result.matched_count;
                self.result.modified_count += result.modified_count;
                if let Some(id) = result.upserted_id {
                    self.result.upserted_count += 1;
                    self.result.upserted_ids.insert(offset, id);
                }
                None
            }
            RunOutcome::Delete(Ok(result)) => {
                self.result.deleted_count += result.deleted_count;
                None
            }
            RunOutcome::Insert(Err(e)) | RunOutcome::Update(Err(e)) | RunOutcome::Delete(Err(e)) => {
                Some(e)
            }
        };

        let Some(error) = error else {
            return true;
        };

        self.labels.extend(error.labels().iter().cloned());
        match *error.kind {
            ErrorKind::BulkWrite(ref failure) => {
                if let Some(ref partial) = failure.partial_result {
                    self.result.inserted_count += partial.inserted_count;
                    self.result.matched_count += partial.matched_count;
                    self.result.modified_count += partial.modified_count;
                    self.result.deleted_count += partial.deleted_count;
                    self.result.upserted_count += partial.upserted_count;
                    for (index, id) in &partial.upserted_ids {
                        self.result.upserted_ids.insert(offset + index, id.clone());
                    }
                }
                for (index, id) in &failure.inserted_ids {
                    self.result.inserted_ids.insert(offset + index, id.clone());
                }
                for write_error in failure.write_errors.iter().flatten() {
                    let mut write_error = write_error.clone();
                    write_error.index += offset;
                    self.write_errors.push(write_error);
                }
                if let Some(ref wc_error) = failure.write_concern_error {
                    self.write_concern_errors.push(wc_error.clone());
                }
                // An ordered batch stops at the first write error; unordered batches keep
                // going and report everything at the end.
                !self.ordered || self.write_errors.is_empty()
            }
            _ => {
                self.fatal = Some(error);
                false
            }
        }
    }

    fn finish(mut self) -> Result<BulkWriteResult> {
        if let Some(fatal) = self.fatal {
            return Err(fatal);
        }
        if self.write_errors.is_empty() && self.write_concern_errors.is_empty() {
            return Ok(self.result);
        }

        let mut failure = BulkWriteFailure::new();
        if !self.write_errors.is_empty() {
            failure.write_errors = Some(self.write_errors);
        }
        failure.write_concern_error = self.write_concern_errors.pop();
        failure.inserted_ids = self.result.inserted_ids.clone();
        failure.partial_result = Some(Box::new(self.result));
        Err(Error::new(
            ErrorKind::BulkWrite(failure),
            Some(self.labels),
        ))
    }
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;

    fn insert(x: i32) -> WriteModel {
        WriteModel::InsertOne {
            document: doc! { "x": x },
        }
    }

    #[test]
    fn contiguous_inserts_group_into_runs() {
        let models = vec![
            insert(1),
            insert(2),
            WriteModel::DeleteOne {
                filter: doc! { "x": 1 },
                options: None,
            },
            insert(3),
        ];
        let runs = runs(&models);
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].0, 0);
        assert_eq!(runs[0].1.len(), 2);
        assert_eq!(runs[1].0, 2);
        assert_eq!(runs[2].0, 3);
    }
}
