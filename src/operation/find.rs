use crate::{
    bson::{doc, Document},
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    cursor::CursorSpecification,
    error::{ErrorKind, Result},
    operation::{
        append_options,
        Access,
        CursorBody,
        OperationWithDefaults,
        Retryability,
        SERVER_4_4_0_WIRE_VERSION,
    },
    options::{CursorType, FindOptions, TimeoutMode},
    selection_criteria::SelectionCriteria,
    Namespace,
};

/// Runs a query against a collection and returns a cursor over the matching documents.
#[derive(Debug)]
pub struct Find {
    ns: Namespace,
    filter: Document,
    options: Option<Box<FindOptions>>,
}

impl Find {
    /// Constructs a find against the given namespace.
    pub fn new(ns: Namespace, filter: Document, options: Option<FindOptions>) -> Self {
        Self {
            ns,
            filter,
            options: options.map(Box::new),
        }
    }

    fn cursor_type(&self) -> CursorType {
        self.options
            .as_ref()
            .and_then(|opts| opts.cursor_type)
            .unwrap_or(CursorType::NonTailable)
    }
}

impl OperationWithDefaults for Find {
    type O = CursorSpecification;
    const NAME: &'static str = "find";

    fn build(
        &mut self,
        ctx: &OperationContext,
        _description: &StreamDescription,
    ) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
        };

        let cursor_type = self.cursor_type();
        if cursor_type.is_tailable()
            && ctx.timeout.mode == TimeoutMode::CursorLifetime
            && (ctx.timeout.deadline.is_some() || ctx.timeout.max_time.is_some())
        {
            return Err(ErrorKind::InvalidArgument {
                message: "tailable cursors cannot be used with a cursor-lifetime timeout"
                    .to_string(),
            }
            .into());
        }

        if let Some(ref options) = self.options {
            // Negative limits are a request for a single batch as per the crud spec.
            if options.limit.map(|limit| limit < 0) == Some(true) {
                body.insert("singleBatch", true);
            }

            if options
                .batch_size
                .map(|batch_size| batch_size > i32::MAX as u32)
                == Some(true)
            {
                return Err(ErrorKind::InvalidArgument {
                    message: "The batch size must fit into a signed 32-bit integer".to_string(),
                }
                .into());
            }
        }

        match cursor_type {
            CursorType::Tailable => {
                body.insert("tailable", true);
            }
            CursorType::TailableAwait => {
                body.insert("tailable", true);
                body.insert("awaitData", true);
            }
            CursorType::NonTailable => {}
        };

        append_options(&mut body, self.options.as_deref())?;

        // On tailable cursors the server-side time limit only applies to awaitData getMores, so
        // the initial command never carries one.
        if !cursor_type.is_tailable() {
            let max_time = match self.options.as_ref().and_then(|o| o.max_time) {
                Some(max_time) => Some(max_time),
                None => ctx.timeout.max_time_for_initial_command()?,
            };
            if let Some(max_time) = max_time {
                body.insert("maxTimeMS", max_time.as_millis() as i64);
            }
        }

        body.insert("filter", self.filter.clone());

        Ok(Command::new_read(
            Self::NAME,
            self.ns.db.clone(),
            ctx.session.effective_read_concern(
                self.options.as_ref().and_then(|o| o.read_concern.as_ref()),
            ),
            body,
        ))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        description: &StreamDescription,
    ) -> Result<Self::O> {
        let response: CursorBody = response.body()?;

        // The comment should only be propagated to getMore calls on 4.4+.
        let comment = if description.max_wire_version.unwrap_or(0) < SERVER_4_4_0_WIRE_VERSION {
            None
        } else {
            self.options.as_ref().and_then(|opts| opts.comment.clone())
        };

        Ok(CursorSpecification::new(
            response.cursor,
            response.operation_time,
            description,
            self.options.as_ref().and_then(|opts| opts.batch_size),
            self.options.as_ref().and_then(|opts| opts.max_await_time),
            comment,
            self.options.as_ref().and_then(|opts| opts.limit),
        ))
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.options
            .as_ref()
            .and_then(|opts| opts.selection_criteria.as_ref())
    }

    fn access(&self) -> Access {
        Access::Read
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use bson::doc;

    use super::*;
    use crate::{
        bson_util,
        context::TimeoutContext,
        operation::test::{build_test, build_test_with_ctx},
    };

    #[test]
    fn build() {
        let ns = Namespace::new("test_db", "test_coll");
        let filter = doc! { "x": { "$gt": 1 } };
        let options = FindOptions::builder()
            .projection(doc! { "x": 1 })
            .skip(5_u64)
            .batch_size(10_u32)
            .build();

        let mut op = Find::new(ns, filter.clone(), Some(options));
        let mut cmd = build_test(&mut op);

        assert_eq!(cmd.name.as_str(), "find");
        assert_eq!(cmd.target_db.as_str(), "test_db");

        let mut expected_body = doc! {
            "find": "test_coll",
            "filter": filter,
            "projection": { "x": 1 },
            "skip": 5_i64,
            "batchSize": 10_i32,
        };

        bson_util::sort_document(&mut cmd.body);
        bson_util::sort_document(&mut expected_body);
        assert_eq!(cmd.body, expected_body);
    }

    #[test]
    fn negative_limit_requests_single_batch() {
        let ns = Namespace::new("test_db", "test_coll");
        let options = FindOptions::builder().limit(-3_i64).build();
        let mut op = Find::new(ns, doc! {}, Some(options));
        let cmd = build_test(&mut op);

        assert_eq!(cmd.body.get("limit"), Some(&bson::Bson::Int64(3)));
        assert_eq!(cmd.body.get("singleBatch"), Some(&bson::Bson::Boolean(true)));
    }

    #[test]
    fn tailable_flags() {
        let options = FindOptions::builder()
            .cursor_type(CursorType::TailableAwait)
            .build();
        let mut op = Find::new(Namespace::new("db", "capped"), doc! {}, Some(options));
        let cmd = build_test(&mut op);

        assert_eq!(cmd.body.get("tailable"), Some(&bson::Bson::Boolean(true)));
        assert_eq!(cmd.body.get("awaitData"), Some(&bson::Bson::Boolean(true)));
        assert!(!cmd.body.contains_key("maxTimeMS"));
    }

    #[test]
    fn tailable_rejects_cursor_lifetime_timeouts() {
        let options = FindOptions::builder()
            .cursor_type(CursorType::Tailable)
            .build();
        let mut op = Find::new(Namespace::new("db", "capped"), doc! {}, Some(options));
        let ctx = crate::OperationContext::new()
            .with_timeout(TimeoutContext::with_deadline_in(Duration::from_secs(5)));
        let err = op
            .build(&ctx, &crate::StreamDescription::new_testing())
            .unwrap_err();
        assert!(matches!(*err.kind, ErrorKind::InvalidArgument { .. }));
    }

    #[test]
    fn cursor_lifetime_attaches_max_time_to_initial_command() {
        let mut op = Find::new(Namespace::new("db", "coll"), doc! {}, None);
        let ctx = crate::OperationContext::new().with_timeout(TimeoutContext {
            max_time: Some(Duration::from_secs(2)),
            ..Default::default()
        });
        let cmd = build_test_with_ctx(&mut op, &ctx);
        assert_eq!(cmd.body.get("maxTimeMS"), Some(&bson::Bson::Int64(2000)));
    }

    #[test]
    fn iteration_mode_omits_max_time_from_initial_command() {
        let mut op = Find::new(Namespace::new("db", "coll"), doc! {}, None);
        let ctx = crate::OperationContext::new().with_timeout(TimeoutContext {
            max_time: Some(Duration::from_secs(2)),
            mode: TimeoutMode::Iteration,
            ..Default::default()
        });
        let cmd = build_test_with_ctx(&mut op, &ctx);
        assert!(!cmd.body.contains_key("maxTimeMS"));
    }
}
