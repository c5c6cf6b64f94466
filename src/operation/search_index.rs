use crate::{
    bson::doc,
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    error::{Error, Result},
    operation::OperationWithDefaults,
    Namespace,
};

/// Drops an Atlas Search index. Dropping an index on a collection that does not exist is a
/// success.
#[derive(Debug)]
pub struct DropSearchIndex {
    ns: Namespace,
    name: String,
}

impl DropSearchIndex {
    /// Constructs a drop of the search index with the given name.
    pub fn new(ns: Namespace, name: impl Into<String>) -> Self {
        Self {
            ns,
            name: name.into(),
        }
    }
}

impl OperationWithDefaults for DropSearchIndex {
    type O = ();

    const NAME: &'static str = "dropSearchIndex";

    fn build(
        &mut self,
        _ctx: &OperationContext,
        _description: &StreamDescription,
    ) -> Result<Command> {
        Ok(Command::new(
            Self::NAME,
            self.ns.db.clone(),
            doc! {
                Self::NAME: self.ns.coll.clone(),
                "name": &self.name,
            },
        ))
    }

    fn handle_response(
        &self,
        _response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        Ok(())
    }

    fn handle_error(&self, error: Error) -> Result<Self::O> {
        if error.is_ns_not_found() {
            Ok(())
        } else {
            Err(error)
        }
    }
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;
    use crate::operation::test::build_test;

    #[test]
    fn build() {
        let mut op = DropSearchIndex::new(Namespace::new("test_db", "test_coll"), "default");
        let cmd = build_test(&mut op);
        assert_eq!(
            cmd.body,
            doc! { "dropSearchIndex": "test_coll", "name": "default" }
        );
    }
}
