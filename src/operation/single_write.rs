//! Single-document wrappers over the batch write operations.
//!
//! Each wrapper delegates to its batch counterpart and translates the outcome into the legacy
//! acknowledged-write surface: duplicate-key write errors become
//! [`ErrorKind::DuplicateKey`](crate::error::ErrorKind::DuplicateKey), other single-write
//! failures become [`ErrorKind::Write`](crate::error::ErrorKind::Write), and successes are
//! reported in the legacy `{ ok: 1, n, updatedExisting?, upserted? }` response shape.

use crate::{
    bson::Document,
    concern::WriteConcern,
    conn::{Command, PinnedConnectionHandle, RawCommandResponse, StreamDescription},
    context::OperationContext,
    error::{convert_bulk_errors, Error, Result},
    operation::{Access, Delete, Insert, Operation, Retryability, Update},
    options::{
        DeleteOptions,
        InsertManyOptions,
        ReplaceOptions,
        UpdateModifications,
        UpdateOptions,
    },
    results::legacy_write_response,
    selection_criteria::SelectionCriteria,
    Namespace,
};

/// Inserts a single document, reporting the legacy acknowledged-write response shape.
#[derive(Debug)]
pub struct InsertOne {
    inner: Insert,
}

impl InsertOne {
    /// Constructs an insert of the given document.
    pub fn new(ns: Namespace, document: Document, options: Option<InsertManyOptions>) -> Self {
        Self {
            inner: Insert::new(ns, vec![document], options),
        }
    }
}

impl Operation for InsertOne {
    type O = Document;

    const NAME: &'static str = "insert";

    fn build(
        &mut self,
        ctx: &OperationContext,
        description: &StreamDescription,
    ) -> Result<Command> {
        self.inner.build(ctx, description)
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        description: &StreamDescription,
    ) -> Result<Self::O> {
        match self.inner.handle_response(response, description) {
            Ok(result) => Ok(legacy_write_response(
                result.inserted_ids.len() as u64,
                None,
                None,
            )),
            Err(error) => Err(convert_bulk_errors(error)),
        }
    }

    fn handle_error(&self, error: Error) -> Result<Self::O> {
        Err(convert_bulk_errors(error))
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.inner.selection_criteria()
    }

    fn access(&self) -> Access {
        self.inner.access()
    }

    fn is_acknowledged(&self) -> bool {
        self.inner.is_acknowledged()
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.inner.write_concern()
    }

    fn retryability(&self) -> Retryability {
        self.inner.retryability()
    }

    fn update_for_retry(&mut self) {
        self.inner.update_for_retry()
    }

    fn pinned_connection(&self) -> Option<&PinnedConnectionHandle> {
        self.inner.pinned_connection()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Updates or replaces a single document, reporting the legacy acknowledged-write response
/// shape.
#[derive(Debug)]
pub struct UpdateOne {
    inner: Update,
}

impl UpdateOne {
    /// Constructs an update of a single document matching the filter.
    pub fn new(
        ns: Namespace,
        filter: Document,
        update: UpdateModifications,
        options: Option<UpdateOptions>,
    ) -> Result<Self> {
        Ok(Self {
            inner: Update::with_update(ns, filter, update, false, options)?,
        })
    }

    /// Constructs a replacement of a single document matching the filter.
    pub fn with_replace(
        ns: Namespace,
        filter: Document,
        replacement: Document,
        options: Option<ReplaceOptions>,
    ) -> Result<Self> {
        Ok(Self {
            inner: Update::with_replace(ns, filter, replacement, options)?,
        })
    }
}

impl Operation for UpdateOne {
    type O = Document;

    const NAME: &'static str = "update";

    fn build(
        &mut self,
        ctx: &OperationContext,
        description: &StreamDescription,
    ) -> Result<Command> {
        self.inner.build(ctx, description)
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        description: &StreamDescription,
    ) -> Result<Self::O> {
        match self.inner.handle_response(response, description) {
            Ok(result) => Ok(match result.upserted_id {
                Some(ref id) => legacy_write_response(1, Some(false), Some(id)),
                None => legacy_write_response(
                    result.matched_count,
                    Some(result.matched_count > 0),
                    None,
                ),
            }),
            Err(error) => Err(convert_bulk_errors(error)),
        }
    }

    fn handle_error(&self, error: Error) -> Result<Self::O> {
        Err(convert_bulk_errors(error))
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.inner.selection_criteria()
    }

    fn access(&self) -> Access {
        self.inner.access()
    }

    fn is_acknowledged(&self) -> bool {
        self.inner.is_acknowledged()
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.inner.write_concern()
    }

    fn retryability(&self) -> Retryability {
        self.inner.retryability()
    }

    fn update_for_retry(&mut self) {
        self.inner.update_for_retry()
    }

    fn pinned_connection(&self) -> Option<&PinnedConnectionHandle> {
        self.inner.pinned_connection()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Deletes a single document, reporting the legacy acknowledged-write response shape.
#[derive(Debug)]
pub struct DeleteOne {
    inner: Delete,
}

impl DeleteOne {
    /// Constructs a delete of a single document matching the filter.
    pub fn new(ns: Namespace, filter: Document, options: Option<DeleteOptions>) -> Self {
        Self {
            inner: Delete::new(ns, filter, Some(1), options),
        }
    }
}

impl Operation for DeleteOne {
    type O = Document;

    const NAME: &'static str = "delete";

    fn build(
        &mut self,
        ctx: &OperationContext,
        description: &StreamDescription,
    ) -> Result<Command> {
        self.inner.build(ctx, description)
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        description: &StreamDescription,
    ) -> Result<Self::O> {
        match self.inner.handle_response(response, description) {
            Ok(result) => Ok(legacy_write_response(result.deleted_count, None, None)),
            Err(error) => Err(convert_bulk_errors(error)),
        }
    }

    fn handle_error(&self, error: Error) -> Result<Self::O> {
        Err(convert_bulk_errors(error))
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.inner.selection_criteria()
    }

    fn access(&self) -> Access {
        self.inner.access()
    }

    fn is_acknowledged(&self) -> bool {
        self.inner.is_acknowledged()
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.inner.write_concern()
    }

    fn retryability(&self) -> Retryability {
        self.inner.retryability()
    }

    fn update_for_retry(&mut self) {
        self.inner.update_for_retry()
    }

    fn pinned_connection(&self) -> Option<&PinnedConnectionHandle> {
        self.inner.pinned_connection()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;
    use crate::{
        error::ErrorKind,
        operation::test::{build_test, handle_response_test},
    };

    #[test]
    fn insert_one_duplicate_key() {
        let mut op = InsertOne::new(Namespace::new("test_db", "test_coll"), doc! { "_id": 1 }, None);
        let _ = build_test(&mut op);

        let err = handle_response_test(
            &op,
            doc! {
                "ok": 1,
                "n": 0,
                "writeErrors": [
                    { "index": 0, "code": 11000, "errmsg": "E11000 duplicate key" }
                ],
            },
        )
        .unwrap_err();
        match *err.kind {
            ErrorKind::DuplicateKey(ref write_error) => assert_eq!(write_error.code, 11000),
            ref other => panic!("expected duplicate key error, got {:?}", other),
        }
    }

    #[test]
    fn insert_one_legacy_response() {
        let mut op = InsertOne::new(Namespace::new("test_db", "test_coll"), doc! { "_id": 1 }, None);
        let _ = build_test(&mut op);

        let response = handle_response_test(&op, doc! { "ok": 1, "n": 1 }).unwrap();
        assert_eq!(response, doc! { "ok": 1, "n": 1_i64 });
    }

    #[test]
    fn update_one_legacy_response() {
        let op = UpdateOne::new(
            Namespace::new("test_db", "test_coll"),
            doc! { "_id": 7 },
            UpdateModifications::Document(doc! { "$set": { "x": 1 } }),
            None,
        )
        .unwrap();

        let updated = handle_response_test(&op, doc! { "ok": 1, "n": 1, "nModified": 1 }).unwrap();
        assert_eq!(
            updated,
            doc! { "ok": 1, "n": 1_i64, "updatedExisting": true }
        );

        let upserted = handle_response_test(
            &op,
            doc! { "ok": 1, "n": 1, "nModified": 0, "upserted": [ { "index": 0, "_id": 7 } ] },
        )
        .unwrap();
        assert_eq!(
            upserted,
            doc! { "ok": 1, "n": 1_i64, "updatedExisting": false, "upserted": 7 }
        );

        let unmatched = handle_response_test(&op, doc! { "ok": 1, "n": 0, "nModified": 0 }).unwrap();
        assert_eq!(
            unmatched,
            doc! { "ok": 1, "n": 0_i64, "updatedExisting": false }
        );
    }

    #[test]
    fn update_one_write_concern_failure_converts() {
        let op = UpdateOne::new(
            Namespace::new("test_db", "test_coll"),
            doc! {},
            UpdateModifications::Document(doc! { "$set": { "x": 1 } }),
            None,
        )
        .unwrap();

        let err = handle_response_test(
            &op,
            doc! {
                "ok": 1,
                "n": 0,
                "nModified": 0,
                "writeConcernError": { "code": 64, "codeName": "WriteConcernFailed", "errmsg": "oops" },
            },
        )
        .unwrap_err();
        assert!(matches!(
            *err.kind,
            ErrorKind::Write(crate::error::WriteFailure::WriteConcernError(_))
        ));
    }

    #[test]
    fn delete_one_legacy_response() {
        let op = DeleteOne::new(Namespace::new("test_db", "test_coll"), doc! { "x": 1 }, None);
        let response = handle_response_test(&op, doc! { "ok": 1, "n": 1 }).unwrap();
        assert_eq!(response, doc! { "ok": 1, "n": 1_i64 });
    }
}
