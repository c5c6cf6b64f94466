use crate::{
    bson::{doc, Document},
    change_stream::{ChangeStreamData, WatchArgs},
    concern::WriteConcern,
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    cursor::CursorSpecification,
    error::{Error, Result},
    operation::{Access, Operation, Retryability},
    selection_criteria::SelectionCriteria,
};

use super::Aggregate;

/// The wire version at which `startAtOperationTime` resumes are supported.
const SERVER_4_0_0_WIRE_VERSION: i32 = 7;

/// The aggregation opening (or resuming) a change stream: an [`Aggregate`] whose pipeline is
/// prefixed with a `$changeStream` stage, whose cursor is tailable-await, and whose response
/// additionally yields the dynamic state the stream needs to resume.
pub(crate) struct ChangeStreamAggregate {
    inner: Aggregate,
    args: WatchArgs,
}

impl ChangeStreamAggregate {
    pub(crate) fn new(args: &WatchArgs) -> Result<Self> {
        let options = args.options.clone().unwrap_or_default();

        // The stage's sub-fields are emitted in a fixed order, with exactly one of the resume
        // points present.
        let mut stage = Document::new();
        if let Some(ref full_document) = options.full_document {
            stage.insert("fullDocument", bson::to_bson(full_document)?);
        }
        if let Some(ref before_change) = options.full_document_before_change {
            stage.insert("fullDocumentBeforeChange", bson::to_bson(before_change)?);
        }
        if args.target.is_cluster() {
            stage.insert("allChangesForCluster", true);
        }
        if let Some(show_expanded_events) = options.show_expanded_events {
            stage.insert("showExpandedEvents", show_expanded_events);
        }
        if let Some(ref resume_after) = options.resume_after {
            stage.insert("resumeAfter", resume_after.to_bson()?);
        } else if let Some(ref start_after) = options.start_after {
            stage.insert("startAfter", start_after.to_bson()?);
        } else if let Some(start_at_operation_time) = options.start_at_operation_time {
            stage.insert("startAtOperationTime", start_at_operation_time);
        }

        let mut pipeline = vec![doc! { "$changeStream": stage }];
        pipeline.extend(args.pipeline.iter().cloned());

        Ok(Self {
            inner: Aggregate::new(
                args.target.aggregate_target(),
                pipeline,
                Some(options.aggregate_options()),
            ),
            args: args.clone(),
        })
    }
}

impl Operation for ChangeStreamAggregate {
    type O = (CursorSpecification, ChangeStreamData);

    const NAME: &'static str = "aggregate";

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
        let op_time = crate::operation::extract_operation_time(&response)?;
        let spec = self.inner.handle_response(response, description)?;

        let mut data = ChangeStreamData::default();
        let options = self.args.options.as_ref();
        let has_start_point = options.map_or(false, |options| {
            options.resume_after.is_some()
                || options.start_after.is_some()
                || options.start_at_operation_time.is_some()
        });
        // Operation-time resume points only apply when the caller gave no explicit one and the
        // server returned no initial results to take a token from.
        if !has_start_point
            && spec.initial_buffer.is_empty()
            && spec.post_batch_resume_token.is_none()
            && description
                .max_wire_version
                .map_or(false, |v| v >= SERVER_4_0_0_WIRE_VERSION)
        {
            data.initial_operation_time = op_time;
        }
        data.resume_token = options
            .and_then(|options| options.start_after.clone().or_else(|| options.resume_after.clone()))
            .or_else(|| spec.post_batch_resume_token.clone());

        Ok((spec, data))
    }

    fn handle_error(&self, error: Error) -> Result<Self::O> {
        Err(error)
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

    fn pinned_connection(&self) -> Option<&crate::conn::PinnedConnectionHandle> {
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
        change_stream::{options::ChangeStreamOptions, ChangeStreamTarget},
        operation::test::build_test,
        options::FullDocumentType,
        Namespace,
    };

    #[test]
    fn stage_field_order() {
        let options = ChangeStreamOptions::builder()
            .full_document(FullDocumentType::UpdateLookup)
            .show_expanded_events(true)
            .build();
        let args = WatchArgs {
            pipeline: vec![doc! { "$match": { "operationType": "insert" } }],
            target: ChangeStreamTarget::Collection(Namespace::new("test_db", "orders")),
            options: Some(options),
        };
        let mut op = ChangeStreamAggregate::new(&args).unwrap();
        let cmd = build_test(&mut op);

        let pipeline = cmd.body.get_array("pipeline").unwrap();
        let stage = pipeline[0]
            .as_document()
            .unwrap()
            .get_document("$changeStream")
            .unwrap();
        let keys: Vec<_> = stage.keys().collect();
        assert_eq!(keys, vec!["fullDocument", "showExpandedEvents"]);
        assert_eq!(pipeline.len(), 2);
    }

    #[test]
    fn cluster_streams_set_all_changes_for_cluster() {
        let args = WatchArgs {
            pipeline: vec![],
            target: ChangeStreamTarget::Cluster,
            options: None,
        };
        let mut op = ChangeStreamAggregate::new(&args).unwrap();
        let cmd = build_test(&mut op);

        assert_eq!(cmd.body.get("aggregate"), Some(&bson::Bson::Int32(1)));
        let pipeline = cmd.body.get_array("pipeline").unwrap();
        let stage = pipeline[0]
            .as_document()
            .unwrap()
            .get_document("$changeStream")
            .unwrap();
        assert_eq!(stage.get("allChangesForCluster"), Some(&bson::Bson::Boolean(true)));
    }

    #[test]
    fn empty_first_batch_captures_operation_time() {
        let args = WatchArgs {
            pipeline: vec![],
            target: ChangeStreamTarget::Collection(Namespace::new("test_db", "orders")),
            options: None,
        };
        let op = ChangeStreamAggregate::new(&args).unwrap();
        let time = bson::Timestamp {
            time: 12,
            increment: 34,
        };
        let (_, data) = crate::operation::test::handle_response_test(
            &op,
            doc! {
                "ok": 1,
                "cursor": { "id": 7_i64, "ns": "test_db.orders", "firstBatch": [] },
                "operationTime": time,
            },
        )
        .unwrap();
        assert_eq!(data.initial_operation_time, Some(time));
    }
}
