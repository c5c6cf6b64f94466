use serde::Deserialize;

use crate::{
    bson::{doc, Document},
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    error::Result,
    operation::{append_options, Access, OperationWithDefaults, Retryability},
    options::CountOptions,
    selection_criteria::SelectionCriteria,
    Namespace,
};

/// Counts the documents matching a filter with a `count` command.
#[derive(Debug)]
pub struct CountDocuments {
    ns: Namespace,
    filter: Document,
    options: Option<CountOptions>,
}

impl CountDocuments {
    /// Constructs a count of the documents matching the given filter.
    pub fn new(ns: Namespace, filter: Document, options: Option<CountOptions>) -> Self {
        Self {
            ns,
            filter,
            options,
        }
    }
}

impl OperationWithDefaults for CountDocuments {
    type O = u64;

    const NAME: &'static str = "count";

    fn build(
        &mut self,
        ctx: &OperationContext,
        _description: &StreamDescription,
    ) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "query": self.filter.clone(),
        };

        append_options(&mut body, self.options.as_ref())?;

        let max_time = match self.options.as_ref().and_then(|o| o.max_time) {
            Some(max_time) => Some(max_time),
            None => ctx.timeout.max_time_for_command()?,
        };
        if let Some(max_time) = max_time {
            body.insert("maxTimeMS", max_time.as_millis() as i64);
        }

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
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let response_body: ResponseBody = response.body()?;
        Ok(response_body.n)
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

#[derive(Debug, Deserialize)]
struct ResponseBody {
    n: u64,
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;
    use crate::{bson_util, operation::test::build_test};

    #[test]
    fn build() {
        let options = CountOptions::builder().limit(10_u64).skip(2_u64).build();
        let mut op = CountDocuments::new(
            Namespace::new("test_db", "test_coll"),
            doc! { "x": 1 },
            Some(options),
        );
        let mut cmd = build_test(&mut op);

        let mut expected_body = doc! {
            "count": "test_coll",
            "query": { "x": 1 },
            "limit": 10_i64,
            "skip": 2_i64,
        };

        bson_util::sort_document(&mut cmd.body);
        bson_util::sort_document(&mut expected_body);
        assert_eq!(cmd.body, expected_body);
    }
}
