use crate::{
    bson::{doc, Document},
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    error::Result,
    operation::{Access, Operation, Retryability},
    options::Verbosity,
    selection_criteria::SelectionCriteria,
};

/// Wraps another operation's command in an `explain`, returning the server's plan description
/// instead of executing the wrapped command.
#[derive(Debug)]
pub struct Explain<Op> {
    operation: Op,
    verbosity: Option<Verbosity>,
}

impl<Op: Operation> Explain<Op> {
    /// Constructs an explain of the given operation.
    pub fn new(operation: Op, verbosity: Option<Verbosity>) -> Self {
        Self {
            operation,
            verbosity,
        }
    }
}

impl<Op: Operation> Operation for Explain<Op> {
    type O = Document;

    const NAME: &'static str = "explain";

    fn build(
        &mut self,
        ctx: &OperationContext,
        description: &StreamDescription,
    ) -> Result<Command> {
        let inner = self.operation.build(ctx, description)?;

        let mut body = doc! {
            Self::NAME: inner.body,
        };
        if let Some(verbosity) = self.verbosity {
            body.insert("verbosity", bson::to_bson(&verbosity)?);
        }

        Ok(Command::new(Self::NAME, inner.target_db, body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        response.body()
    }

    fn handle_error(&self, error: crate::error::Error) -> Result<Self::O> {
        Err(error)
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.operation.selection_criteria()
    }

    fn access(&self) -> Access {
        Access::Read
    }

    fn is_acknowledged(&self) -> bool {
        true
    }

    fn write_concern(&self) -> Option<&crate::concern::WriteConcern> {
        None
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }

    fn update_for_retry(&mut self) {}

    fn pinned_connection(&self) -> Option<&crate::conn::PinnedConnectionHandle> {
        None
    }

    fn name(&self) -> &str {
        Self::NAME
    }
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;
    use crate::{operation::Find, operation::test::build_test, Namespace};

    #[test]
    fn wraps_the_inner_command() {
        let find = Find::new(Namespace::new("test_db", "test_coll"), doc! { "x": 1 }, None);
        let mut op = Explain::new(find, Some(Verbosity::QueryPlanner));
        let cmd = build_test(&mut op);

        assert_eq!(cmd.name.as_str(), "explain");
        assert_eq!(cmd.target_db.as_str(), "test_db");
        let explained = cmd.body.get_document("explain").unwrap();
        assert_eq!(explained.get_str("find").unwrap(), "test_coll");
        assert_eq!(cmd.body.get_str("verbosity").unwrap(), "queryPlanner");
    }
}
