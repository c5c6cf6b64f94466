use crate::{
    bson::doc,
    concern::WriteConcern,
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    error::{Error, Result},
    operation::OperationWithDefaults,
    options::DropIndexOptions,
    Namespace,
};

/// Drops one or more indexes. Dropping an index on a collection that does not exist is a
/// success.
#[derive(Debug)]
pub struct DropIndexes {
    ns: Namespace,
    name: String,
    options: Option<DropIndexOptions>,
}

impl DropIndexes {
    /// Constructs a drop of the index with the given name; `"*"` drops all indexes.
    pub fn new(ns: Namespace, name: impl Into<String>, options: Option<DropIndexOptions>) -> Self {
        Self {
            ns,
            name: name.into(),
            options,
        }
    }
}

impl OperationWithDefaults for DropIndexes {
    type O = ();

    const NAME: &'static str = "dropIndexes";

    fn build(
        &mut self,
        ctx: &OperationContext,
        _description: &StreamDescription,
    ) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "index": self.name.clone(),
        };

        crate::operation::append_options(&mut body, self.options.as_ref())?;

        let max_time = match self.options.as_ref().and_then(|o| o.max_time) {
            Some(max_time) => Some(max_time),
            None => ctx.timeout.max_time_for_command()?,
        };
        if let Some(max_time) = max_time {
            body.insert("maxTimeMS", max_time.as_millis() as i64);
        }

        if let Some(write_concern) = ctx.session.effective_write_concern(self.write_concern()) {
            body.insert("writeConcern", bson::to_bson(&write_concern)?);
        }

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
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

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options
            .as_ref()
            .and_then(|opts| opts.write_concern.as_ref())
    }
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;
    use crate::operation::test::build_test;

    #[test]
    fn build() {
        let mut op = DropIndexes::new(Namespace::new("test_db", "test_coll"), "a_1", None);
        let cmd = build_test(&mut op);
        assert_eq!(cmd.body, doc! { "dropIndexes": "test_coll", "index": "a_1" });
    }
}
