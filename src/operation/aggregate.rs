pub(crate) mod change_stream;

use once_cell::sync::Lazy;

use crate::{
    bson::{doc, Bson, Document},
    bson_util,
    concern::WriteConcern,
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    cursor::CursorSpecification,
    error::Result,
    operation::{append_options, Access, Retryability, SERVER_4_4_0_WIRE_VERSION},
    options::AggregateOptions,
    selection_criteria::{ReadPreference, SelectionCriteria},
    Namespace,
};

use super::{CursorBody, OperationWithDefaults, WriteConcernOnlyBody};

static PRIMARY: Lazy<SelectionCriteria> =
    Lazy::new(|| SelectionCriteria::ReadPreference(ReadPreference::Primary));

/// Runs an aggregation pipeline against a collection or a whole database and returns a cursor
/// over its results.
#[derive(Debug)]
pub struct Aggregate {
    target: AggregateTarget,
    pipeline: Vec<Document>,
    options: Option<AggregateOptions>,
}

impl Aggregate {
    /// Constructs an aggregation against the given target.
    pub fn new(
        target: impl Into<AggregateTarget>,
        pipeline: impl IntoIterator<Item = Document>,
        options: Option<AggregateOptions>,
    ) -> Self {
        Self {
            target: target.into(),
            pipeline: pipeline.into_iter().collect(),
            options,
        }
    }
}

// IMPORTANT: If new method implementations are added here, make sure `ChangeStreamAggregate` has
// the equivalent delegations.
impl OperationWithDefaults for Aggregate {
    type O = CursorSpecification;

    const NAME: &'static str = "aggregate";

    fn build(
        &mut self,
        ctx: &OperationContext,
        _description: &StreamDescription,
    ) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.target.to_bson(),
            "pipeline": bson_util::to_bson_array(&self.pipeline),
            "cursor": {}
        };

        if let Some(batch_size) = self.options.as_ref().and_then(|o| o.batch_size) {
            if batch_size > i32::MAX as u32 {
                return Err(crate::error::ErrorKind::InvalidArgument {
                    message: "The batch size must fit into a signed 32-bit integer".to_string(),
                }
                .into());
            }
            // Cursor-returning aggregations communicate the batch size through the `cursor`
            // sub-document; $out/$merge pipelines return no initial batch.
            if !self.is_out_or_merge() {
                if let Ok(cursor) = body.get_document_mut("cursor") {
                    cursor.insert("batchSize", batch_size as i32);
                }
            }
        }

        append_options(&mut body, self.options.as_ref())?;

        if self.is_out_or_merge() {
            if let Some(write_concern) = ctx
                .session
                .effective_write_concern(self.write_concern())
            {
                body.insert("writeConcern", bson::to_bson(&write_concern)?);
            }
        }

        let max_time = match self.options.as_ref().and_then(|o| o.max_time) {
            Some(max_time) => Some(max_time),
            None => ctx.timeout.max_time_for_initial_command()?,
        };
        if let Some(max_time) = max_time {
            body.insert("maxTimeMS", max_time.as_millis() as i64);
        }

        Ok(Command::new_read(
            Self::NAME,
            self.target.db_name(),
            ctx.session
                .effective_read_concern(self.options.as_ref().and_then(|o| o.read_concern.as_ref())),
            body,
        ))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        description: &StreamDescription,
    ) -> Result<Self::O> {
        let cursor_response: CursorBody = response.body()?;

        if self.is_out_or_merge() {
            let wc_error_info = response.body::<WriteConcernOnlyBody>()?;
            wc_error_info.validate()?;
        };

        // The comment should only be propagated to getMore calls on 4.4+.
        let comment = if description.max_wire_version.unwrap_or(0) < SERVER_4_4_0_WIRE_VERSION {
            None
        } else {
            self.options.as_ref().and_then(|opts| opts.comment.clone())
        };

        Ok(CursorSpecification::new(
            cursor_response.cursor,
            cursor_response.operation_time,
            description,
            self.options.as_ref().and_then(|opts| opts.batch_size),
            self.options.as_ref().and_then(|opts| opts.max_await_time),
            comment,
            None,
        ))
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        let user = self
            .options
            .as_ref()
            .and_then(|opts| opts.selection_criteria.as_ref());
        if user.is_none() && self.is_out_or_merge() {
            // Writing stages are dispatched through the primary unless the caller opted into
            // secondary targeting explicitly.
            return Some(&PRIMARY);
        }
        user
    }

    fn access(&self) -> Access {
        Access::Read
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options
            .as_ref()
            .and_then(|opts| opts.write_concern.as_ref())
    }

    fn retryability(&self) -> Retryability {
        if self.is_out_or_merge() {
            Retryability::None
        } else {
            Retryability::Read
        }
    }
}

impl Aggregate {
    /// Returns whether this is a $out or $merge aggregation operation.
    fn is_out_or_merge(&self) -> bool {
        self.pipeline
            .last()
            .map(|stage| {
                let stage = bson_util::first_key(stage);
                stage == Some("$out") || stage == Some("$merge")
            })
            .unwrap_or(false)
    }
}

/// The target of an aggregation: a collection, or a whole database (emitted as the numeric
/// target `1`).
#[derive(Clone, Debug)]
pub enum AggregateTarget {
    /// A database-level aggregation.
    Database(String),

    /// A collection-level aggregation.
    Collection(Namespace),
}

impl AggregateTarget {
    pub(crate) fn to_bson(&self) -> Bson {
        match self {
            AggregateTarget::Database(_) => Bson::Int32(1),
            AggregateTarget::Collection(ref ns) => Bson::String(ns.coll.to_string()),
        }
    }

    pub(crate) fn db_name(&self) -> &str {
        match self {
            AggregateTarget::Database(ref s) => s.as_str(),
            AggregateTarget::Collection(ref ns) => ns.db.as_str(),
        }
    }
}

impl From<Namespace> for AggregateTarget {
    fn from(ns: Namespace) -> Self {
        AggregateTarget::Collection(ns)
    }
}

impl From<String> for AggregateTarget {
    fn from(db_name: String) -> Self {
        AggregateTarget::Database(db_name)
    }
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;
    use crate::{bson_util, operation::test::build_test};

    #[test]
    fn build() {
        let ns = Namespace::new("test_db", "test_coll");
        let pipeline = vec![doc! { "$match": { "x": { "$gt": 1 } } }];
        let options = AggregateOptions::builder()
            .allow_disk_use(true)
            .batch_size(3_u32)
            .build();

        let mut op = Aggregate::new(ns, pipeline.clone(), Some(options));
        let mut cmd = build_test(&mut op);

        assert_eq!(cmd.name.as_str(), "aggregate");
        assert_eq!(cmd.target_db.as_str(), "test_db");

        let mut expected_body = doc! {
            "aggregate": "test_coll",
            "pipeline": bson_util::to_bson_array(&pipeline),
            "cursor": { "batchSize": 3_i32 },
            "allowDiskUse": true,
        };

        bson_util::sort_document(&mut cmd.body);
        bson_util::sort_document(&mut expected_body);
        assert_eq!(cmd.body, expected_body);
    }

    #[test]
    fn build_database_target() {
        let mut op = Aggregate::new("admin".to_string(), Vec::new(), None);
        let cmd = build_test(&mut op);

        assert_eq!(cmd.body.get("aggregate"), Some(&Bson::Int32(1)));
        assert_eq!(cmd.target_db.as_str(), "admin");
    }

    #[test]
    fn out_pipelines_target_primary_and_disable_retry() {
        let ns = Namespace::new("test_db", "test_coll");
        let op = Aggregate::new(ns, vec![doc! { "$out": "other" }], None);
        assert_eq!(
            op.selection_criteria(),
            Some(&SelectionCriteria::ReadPreference(ReadPreference::Primary))
        );
        assert_eq!(op.retryability(), Retryability::None);

        let op = Aggregate::new(
            Namespace::new("test_db", "test_coll"),
            vec![doc! { "$match": {} }],
            None,
        );
        assert_eq!(op.selection_criteria(), None);
        assert_eq!(op.retryability(), Retryability::Read);
    }

    #[test]
    fn out_pipelines_surface_write_concern_errors() {
        let ns = Namespace::new("test_db", "test_coll");
        let op = Aggregate::new(ns, vec![doc! { "$merge": { "into": "other" } }], None);
        let response = doc! {
            "ok": 1,
            "cursor": { "id": 0_i64, "ns": "test_db.test_coll", "firstBatch": [] },
            "writeConcernError": { "code": 64, "codeName": "WriteConcernFailed", "errmsg": "oops" },
        };
        let err = crate::operation::test::handle_response_test(&op, response).unwrap_err();
        assert!(matches!(
            *err.kind,
            crate::error::ErrorKind::Write(crate::error::WriteFailure::WriteConcernError(_))
        ));
    }
}
