use crate::{
    bson::doc,
    concern::WriteConcern,
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    error::{Error, Result},
    operation::{OperationWithDefaults, WriteConcernOnlyBody},
    options::DropCollectionOptions,
    Namespace,
};

/// Drops a collection. Dropping a collection that does not exist is a success.
#[derive(Debug)]
pub struct DropCollection {
    ns: Namespace,
    options: Option<DropCollectionOptions>,
}

impl DropCollection {
    /// Constructs a drop of the given namespace.
    pub fn new(ns: Namespace, options: Option<DropCollectionOptions>) -> Self {
        DropCollection { ns, options }
    }
}

impl OperationWithDefaults for DropCollection {
    type O = ();

    const NAME: &'static str = "drop";

    fn build(
        &mut self,
        ctx: &OperationContext,
        _description: &StreamDescription,
    ) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
        };

        if let Some(write_concern) = ctx.session.effective_write_concern(self.write_concern()) {
            body.insert("writeConcern", bson::to_bson(&write_concern)?);
        }

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let response: WriteConcernOnlyBody = response.body()?;
        response.validate()
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
    use crate::{
        concern::Acknowledgment,
        error::{CommandError, ErrorKind},
        operation::test::build_test,
    };

    #[test]
    fn build() {
        let options = DropCollectionOptions::builder()
            .write_concern(WriteConcern::from(Acknowledgment::Nodes(2)))
            .build();
        let mut op = DropCollection::new(Namespace::new("test_db", "test_coll"), Some(options));
        let cmd = build_test(&mut op);

        assert_eq!(
            cmd.body,
            doc! { "drop": "test_coll", "writeConcern": { "w": 2_i32 } }
        );
    }

    #[test]
    fn ns_not_found_is_success() {
        let op = DropCollection::new(Namespace::new("test_db", "absent"), None);
        let err = Error::new(
            ErrorKind::Command(CommandError {
                code: 26,
                code_name: "NamespaceNotFound".to_string(),
                message: "ns not found".to_string(),
            }),
            None::<Vec<String>>,
        );
        op.handle_error(err).unwrap();
    }
}
