use std::{collections::VecDeque, time::Duration};

use serde::Deserialize;

use crate::{
    bson::{doc, Bson, RawDocumentBuf},
    change_stream::event::ResumeToken,
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    cursor::CursorInformation,
    error::{ErrorKind, Result},
    operation::{Access, OperationWithDefaults},
    results::GetMoreResult,
    selection_criteria::SelectionCriteria,
    Namespace,
};

/// Fetches the next batch from a server-side cursor.
#[derive(Debug)]
pub struct GetMore {
    ns: Namespace,
    cursor_id: i64,
    selection_criteria: SelectionCriteria,
    batch_size: Option<u32>,
    max_time: Option<Duration>,
    comment: Option<Bson>,
}

impl GetMore {
    /// Composes a getMore from the cursor's static information. The `max_time` argument carries
    /// the value derived from the cursor's timeout mode and type, if any.
    pub(crate) fn new(info: &CursorInformation, max_time: Option<Duration>) -> Self {
        Self {
            ns: info.ns.clone(),
            cursor_id: info.id,
            selection_criteria: SelectionCriteria::from_address(info.address.clone()),
            batch_size: info.batch_size,
            max_time,
            comment: info.comment.clone(),
        }
    }
}

impl OperationWithDefaults for GetMore {
    type O = GetMoreResult;

    const NAME: &'static str = "getMore";

    fn build(
        &mut self,
        _ctx: &OperationContext,
        _description: &StreamDescription,
    ) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.cursor_id,
            "collection": self.ns.coll.clone(),
        };

        if let Some(batch_size) = self.batch_size {
            if batch_size > i32::MAX as u32 {
                return Err(ErrorKind::InvalidArgument {
                    message: "The batch size must fit into a signed 32-bit integer".to_string(),
                }
                .into());
            } else if batch_size != 0 {
                body.insert("batchSize", batch_size as i32);
            }
        }

        if let Some(ref max_time) = self.max_time {
            body.insert("maxTimeMS", max_time.as_millis() as i64);
        }

        if let Some(ref comment) = self.comment {
            body.insert("comment", comment.clone());
        }

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let response: GetMoreResponseBody = response.body()?;

        Ok(GetMoreResult {
            batch: response.cursor.next_batch,
            exhausted: response.cursor.id == 0,
            post_batch_resume_token: ResumeToken::from_raw(
                response.cursor.post_batch_resume_token,
            ),
            id: response.cursor.id,
            ns: Namespace::from_full_name(response.cursor.ns.as_str()).unwrap_or_else(|| {
                self.ns.clone()
            }),
        })
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        Some(&self.selection_criteria)
    }

    fn access(&self) -> Access {
        Access::Read
    }
}

#[derive(Debug, Deserialize)]
struct GetMoreResponseBody {
    cursor: NextBatchBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NextBatchBody {
    id: i64,
    next_batch: VecDeque<RawDocumentBuf>,
    post_batch_resume_token: Option<RawDocumentBuf>,
    ns: String,
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;
    use crate::{conn::ServerAddress, operation::test::build_test};

    fn info(batch_size: Option<u32>) -> CursorInformation {
        CursorInformation {
            ns: Namespace::new("test_db", "test_coll"),
            address: ServerAddress::default(),
            id: 42,
            batch_size,
            max_await_time: None,
            comment: None,
            limit: None,
        }
    }

    #[test]
    fn build() {
        let mut op = GetMore::new(&info(Some(5)), None);
        let cmd = build_test(&mut op);
        assert_eq!(
            cmd.body,
            doc! { "getMore": 42_i64, "collection": "test_coll", "batchSize": 5_i32 }
        );
    }

    #[test]
    fn zero_batch_size_omitted() {
        let mut op = GetMore::new(&info(Some(0)), None);
        let cmd = build_test(&mut op);
        assert!(!cmd.body.contains_key("batchSize"));
    }

    #[test]
    fn handle_response_reports_exhaustion() {
        let op = GetMore::new(&info(None), None);
        let result = crate::operation::test::handle_response_test(
            &op,
            doc! {
                "ok": 1,
                "cursor": {
                    "id": 0_i64,
                    "ns": "test_db.test_coll",
                    "nextBatch": [ { "x": 1 } ],
                },
            },
        )
        .unwrap();
        assert!(result.exhausted);
        assert_eq!(result.batch.len(), 1);
    }
}
