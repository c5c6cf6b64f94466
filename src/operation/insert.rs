use std::collections::HashMap;

use crate::{
    bson::{doc, oid::ObjectId, Bson, Document},
    bson_util,
    concern::WriteConcern,
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    error::{BulkWriteFailure, Error, ErrorKind, Result},
    operation::{append_options, OperationWithDefaults, Retryability, WriteResponseBody},
    options::InsertManyOptions,
    results::{BulkWriteResult, InsertManyResult},
    Namespace,
};

/// Inserts one or more documents with a single `insert` command.
///
/// The command covers as many of the documents as the server's write batch limit allows, in
/// order; [`n_attempted`](Insert::n_attempted) reports how many, and batching layers re-issue
/// the operation for the remainder.
#[derive(Debug)]
pub struct Insert {
    ns: Namespace,
    documents: Vec<Document>,
    inserted_ids: Vec<Bson>,
    options: InsertManyOptions,
}

impl Insert {
    /// Constructs an insert of the given documents. A missing `_id` is materialized
    /// driver-side so that the id of every inserted document can be reported.
    pub fn new(ns: Namespace, documents: Vec<Document>, options: Option<InsertManyOptions>) -> Self {
        let mut options = options.unwrap_or_default();
        if options.ordered.is_none() {
            options.ordered = Some(true);
        }

        Self {
            ns,
            documents,
            inserted_ids: vec![],
            options,
        }
    }

    /// The number of documents covered by the most recently built command.
    pub fn n_attempted(&self) -> usize {
        self.inserted_ids.len()
    }

    fn is_ordered(&self) -> bool {
        self.options.ordered.unwrap_or(true)
    }
}

impl OperationWithDefaults for Insert {
    type O = InsertManyResult;

    const NAME: &'static str = "insert";

    fn build(
        &mut self,
        ctx: &OperationContext,
        description: &StreamDescription,
    ) -> Result<Command> {
        // Oversized batches are split rather than rejected: the command takes the longest
        // prefix the server accepts, and at least one document so that re-issuing loops always
        // make progress.
        let max_batch = description
            .max_write_batch_size
            .unwrap_or(u64::MAX)
            .max(1)
            .min(self.documents.len() as u64) as usize;

        self.inserted_ids.clear();
        let mut docs = Vec::with_capacity(max_batch);
        for document in self.documents.iter().take(max_batch) {
            let mut document = document.clone();
            let id = document
                .entry("_id".to_string())
                .or_insert_with(|| Bson::ObjectId(ObjectId::new()))
                .clone();
            self.inserted_ids.push(id);
            docs.push(document);
        }

        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "documents": bson_util::to_bson_array(&docs),
        };

        append_options(&mut body, Some(&self.options))?;

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
        let body: WriteResponseBody = response.body()?;

        let mut map = HashMap::new();
        if self.is_ordered() {
            // Ordered inserts stop at the first write error, so the written documents are
            // exactly the prefix before the first error's index.
            let split = body
                .write_errors
                .as_ref()
                .and_then(|errors| errors.first())
                .map(|error| error.index)
                .unwrap_or(self.inserted_ids.len());
            for (i, id) in self.inserted_ids.iter().enumerate().take(split) {
                map.insert(i, id.clone());
            }
        } else {
            let failed_indexes: std::collections::HashSet<usize> = body
                .write_errors
                .iter()
                .flatten()
                .map(|error| error.index)
                .collect();
            for (i, id) in self.inserted_ids.iter().enumerate() {
                if !failed_indexes.contains(&i) {
                    map.insert(i, id.clone());
                }
            }
        }

        if body.write_errors.is_some() || body.write_concern_error.is_some() {
            let mut failure = BulkWriteFailure::new();
            failure.write_errors = body.write_errors.clone();
            failure.write_concern_error = body.write_concern_error.clone();
            let partial = BulkWriteResult {
                inserted_count: map.len() as u64,
                inserted_ids: map.clone(),
                ..Default::default()
            };
            failure.inserted_ids = map;
            failure.partial_result = Some(Box::new(partial));
            return Err(Error::new(
                ErrorKind::BulkWrite(failure),
                body.labels.clone(),
            ));
        }

        Ok(InsertManyResult { inserted_ids: map })
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options.write_concern.as_ref()
    }

    fn retryability(&self) -> Retryability {
        Retryability::Write
    }
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;
    use crate::operation::test::{build_test, handle_response_test};

    #[test]
    fn build_materializes_ids() {
        let mut op = Insert::new(
            Namespace::new("test_db", "test_coll"),
            vec![doc! { "x": 1 }, doc! { "_id": 5, "x": 2 }],
            None,
        );
        let cmd = build_test(&mut op);

        assert_eq!(cmd.name.as_str(), "insert");
        let documents = cmd.body.get_array("documents").unwrap();
        assert!(documents[0].as_document().unwrap().contains_key("_id"));
        assert_eq!(
            documents[1].as_document().unwrap().get("_id"),
            Some(&Bson::Int32(5))
        );
        assert_eq!(cmd.body.get("ordered"), Some(&Bson::Boolean(true)));
    }

    #[test]
    fn build_takes_at_most_the_server_batch_limit() {
        let mut op = Insert::new(
            Namespace::new("test_db", "test_coll"),
            vec![doc! { "_id": 1 }, doc! { "_id": 2 }, doc! { "_id": 3 }],
            None,
        );

        let mut description = StreamDescription::new_testing();
        description.max_write_batch_size = Some(2);
        let cmd = crate::operation::test::build_test_with_description(&mut op, &description);

        assert_eq!(cmd.body.get_array("documents").unwrap().len(), 2);
        assert_eq!(op.n_attempted(), 2);
    }

    #[test]
    fn ordered_write_error_reports_inserted_prefix() {
        let mut op = Insert::new(
            Namespace::new("test_db", "test_coll"),
            vec![doc! { "_id": 1 }, doc! { "_id": 2 }, doc! { "_id": 3 }],
            None,
        );
        let _ = build_test(&mut op);

        let err = handle_response_test(
            &op,
            doc! {
                "ok": 1,
                "n": 1,
                "writeErrors": [
                    { "index": 1, "code": 11000, "errmsg": "E11000 duplicate key" }
                ],
            },
        )
        .unwrap_err();

        match *err.kind {
            ErrorKind::BulkWrite(ref failure) => {
                assert_eq!(failure.inserted_ids.len(), 1);
                assert_eq!(failure.inserted_ids.get(&0), Some(&Bson::Int32(1)));
                assert_eq!(
                    failure.write_errors.as_ref().unwrap()[0].code,
                    11000
                );
            }
            ref other => panic!("expected bulk write error, got {:?}", other),
        }
    }

    #[test]
    fn handle_success() {
        let mut op = Insert::new(
            Namespace::new("test_db", "test_coll"),
            vec![doc! { "_id": 1 }, doc! { "_id": 2 }],
            None,
        );
        let _ = build_test(&mut op);

        let result = handle_response_test(&op, doc! { "ok": 1, "n": 2 }).unwrap();
        assert_eq!(result.inserted_ids.len(), 2);
        assert_eq!(result.inserted_ids.get(&1), Some(&Bson::Int32(2)));
    }
}
