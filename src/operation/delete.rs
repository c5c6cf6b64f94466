use crate::{
    bson::{doc, Document},
    concern::WriteConcern,
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    error::{BulkWriteFailure, Error, ErrorKind, Result},
    operation::{OperationWithDefaults, Retryability, WriteResponseBody},
    options::DeleteOptions,
    results::{BulkWriteResult, DeleteResult},
    Namespace,
};

/// Deletes documents matching a filter with a single `delete` command.
#[derive(Debug)]
pub struct Delete {
    ns: Namespace,
    filter: Document,
    limit: u32,
    options: Option<DeleteOptions>,
}

impl Delete {
    /// Constructs a delete of the documents matching the given filter. A `limit` of `None` (or
    /// zero) deletes all matching documents; `1` deletes at most one.
    pub fn new(
        ns: Namespace,
        filter: Document,
        limit: Option<u32>,
        options: Option<DeleteOptions>,
    ) -> Self {
        Self {
            ns,
            filter,
            limit: limit.unwrap_or(0),
            options,
        }
    }
}

impl OperationWithDefaults for Delete {
    type O = DeleteResult;

    const NAME: &'static str = "delete";

    fn build(
        &mut self,
        ctx: &OperationContext,
        _description: &StreamDescription,
    ) -> Result<Command> {
        let mut delete = doc! {
            "q": self.filter.clone(),
            "limit": self.limit as i32,
        };

        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
        };

        if let Some(ref options) = self.options {
            if let Some(ref collation) = options.collation {
                delete.insert("collation", bson::to_bson(collation)?);
            }

            if let Some(ref hint) = options.hint {
                delete.insert("hint", hint.to_bson());
            }

            if let Some(ref let_vars) = options.let_vars {
                body.insert("let", let_vars.clone());
            }

            if let Some(ref comment) = options.comment {
                body.insert("comment", comment.clone());
            }
        }

        body.insert("deletes", vec![crate::bson::Bson::Document(delete)]);
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
        let body: WriteResponseBody = response.body()?;

        if body.write_errors.is_some() || body.write_concern_error.is_some() {
            let mut failure = BulkWriteFailure::new();
            failure.write_errors = body.write_errors.clone();
            failure.write_concern_error = body.write_concern_error.clone();
            failure.partial_result = Some(Box::new(BulkWriteResult {
                deleted_count: body.n,
                ..Default::default()
            }));
            return Err(Error::new(
                ErrorKind::BulkWrite(failure),
                body.labels.clone(),
            ));
        }

        Ok(DeleteResult {
            deleted_count: body.n,
        })
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options
            .as_ref()
            .and_then(|opts| opts.write_concern.as_ref())
    }

    fn retryability(&self) -> Retryability {
        // Multi-document deletes cannot be retried; the server may have applied a subset.
        if self.limit == 1 {
            Retryability::Write
        } else {
            Retryability::None
        }
    }
}
