use serde::Deserialize;

use crate::{
    bson::doc,
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    error::{Error, Result},
    operation::{append_options, Access, OperationWithDefaults, Retryability},
    options::EstimatedDocumentCountOptions,
    selection_criteria::SelectionCriteria,
    Namespace,
};

/// Estimates the number of documents in a collection from collection metadata, using a filterless
/// `count`. A count against a namespace that does not exist reports zero.
#[derive(Debug)]
pub struct Count {
    ns: Namespace,
    options: Option<EstimatedDocumentCountOptions>,
}

impl Count {
    /// Constructs an estimated count of the given namespace.
    pub fn new(ns: Namespace, options: Option<EstimatedDocumentCountOptions>) -> Self {
        Count { ns, options }
    }
}

impl OperationWithDefaults for Count {
    type O = u64;

    const NAME: &'static str = "count";

    fn build(
        &mut self,
        ctx: &OperationContext,
        _description: &StreamDescription,
    ) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
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

    fn handle_error(&self, error: Error) -> Result<Self::O> {
        if error.is_ns_not_found() {
            Ok(0)
        } else {
            Err(error)
        }
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
    use crate::{
        error::{CommandError, ErrorKind},
        operation::test::{build_test, handle_response_test},
    };

    #[test]
    fn build() {
        let mut op = Count::new(Namespace::new("test_db", "test_coll"), None);
        let cmd = build_test(&mut op);
        assert_eq!(cmd.body, doc! { "count": "test_coll" });
    }

    #[test]
    fn handle_success() {
        let op = Count::new(Namespace::new("test_db", "test_coll"), None);
        let n = handle_response_test(&op, doc! { "ok": 1, "n": 26 }).unwrap();
        assert_eq!(n, 26);
    }

    #[test]
    fn ns_not_found_counts_as_zero() {
        let op = Count::new(Namespace::new("test_db", "absent"), None);
        let err = Error::new(
            ErrorKind::Command(CommandError {
                code: 26,
                code_name: "NamespaceNotFound".to_string(),
                message: "ns not found".to_string(),
            }),
            None::<Vec<String>>,
        );
        assert_eq!(op.handle_error(err).unwrap(), 0);
    }
}
