use serde::Deserialize;

use crate::{
    bson::{doc, Bson, Document},
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    error::Result,
    operation::{append_options, Access, OperationWithDefaults, Retryability},
    options::DistinctOptions,
    selection_criteria::SelectionCriteria,
    Namespace,
};

/// Finds the distinct values of a field across a collection.
#[derive(Debug)]
pub struct Distinct {
    ns: Namespace,
    field_name: String,
    query: Option<Document>,
    options: Option<DistinctOptions>,
}

impl Distinct {
    /// Constructs a distinct over the given field.
    pub fn new(
        ns: Namespace,
        field_name: impl Into<String>,
        query: Option<Document>,
        options: Option<DistinctOptions>,
    ) -> Self {
        Distinct {
            ns,
            field_name: field_name.into(),
            query,
            options,
        }
    }
}

impl OperationWithDefaults for Distinct {
    type O = Vec<Bson>;

    const NAME: &'static str = "distinct";

    fn build(
        &mut self,
        ctx: &OperationContext,
        _description: &StreamDescription,
    ) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "key": self.field_name.clone(),
        };

        if let Some(ref query) = self.query {
            body.insert("query", query.clone());
        }

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
        let response: Response = response.body()?;
        Ok(response.values)
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
struct Response {
    values: Vec<Bson>,
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;
    use crate::operation::test::{build_test, handle_response_test};

    #[test]
    fn build() {
        let mut op = Distinct::new(
            Namespace::new("test_db", "test_coll"),
            "name",
            Some(doc! { "age": { "$gt": 18 } }),
            None,
        );
        let cmd = build_test(&mut op);
        assert_eq!(
            cmd.body,
            doc! {
                "distinct": "test_coll",
                "key": "name",
                "query": { "age": { "$gt": 18 } },
            }
        );
    }

    #[test]
    fn handle_success() {
        let op = Distinct::new(Namespace::new("test_db", "test_coll"), "name", None, None);
        let values =
            handle_response_test(&op, doc! { "ok": 1, "values": ["a", "b"] }).unwrap();
        assert_eq!(values, vec![Bson::from("a"), Bson::from("b")]);
    }
}
