use crate::{
    bson::doc,
    concern::WriteConcern,
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    error::Result,
    operation::{OperationWithDefaults, WriteConcernOnlyBody},
    options::DropDatabaseOptions,
};

/// Drops a database. Dropping a database that does not exist is a success.
#[derive(Debug)]
pub struct DropDatabase {
    name: String,
    options: Option<DropDatabaseOptions>,
}

impl DropDatabase {
    /// Constructs a drop of the given database.
    pub fn new(name: impl Into<String>, options: Option<DropDatabaseOptions>) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }
}

impl OperationWithDefaults for DropDatabase {
    type O = ();

    const NAME: &'static str = "dropDatabase";

    fn build(
        &mut self,
        ctx: &OperationContext,
        _description: &StreamDescription,
    ) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: 1,
        };

        if let Some(write_concern) = ctx.session.effective_write_concern(self.write_concern()) {
            body.insert("writeConcern", bson::to_bson(&write_concern)?);
        }

        Ok(Command::new(Self::NAME, self.name.clone(), body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let response: WriteConcernOnlyBody = response.body()?;
        response.validate()
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
        let mut op = DropDatabase::new("test_db", None);
        let cmd = build_test(&mut op);
        assert_eq!(cmd.body, doc! { "dropDatabase": 1 });
        assert_eq!(cmd.target_db.as_str(), "test_db");
    }
}
