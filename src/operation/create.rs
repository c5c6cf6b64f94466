use crate::{
    bson::doc,
    concern::WriteConcern,
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    error::Result,
    operation::{append_options, OperationWithDefaults, WriteConcernOnlyBody},
    options::CreateCollectionOptions,
    Namespace,
};

/// Creates a collection.
#[derive(Debug)]
pub struct Create {
    ns: Namespace,
    options: Option<CreateCollectionOptions>,
}

impl Create {
    /// Constructs a create of the given namespace.
    pub fn new(ns: Namespace, options: Option<CreateCollectionOptions>) -> Self {
        Self { ns, options }
    }
}

impl OperationWithDefaults for Create {
    type O = ();

    const NAME: &'static str = "create";

    fn build(
        &mut self,
        ctx: &OperationContext,
        _description: &StreamDescription,
    ) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
        };

        append_options(&mut body, self.options.as_ref())?;

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
    use crate::{bson_util, operation::test::build_test, options::ValidationLevel};

    #[test]
    fn build() {
        let options = CreateCollectionOptions::builder()
            .capped(true)
            .size(1024_u64)
            .validation_level(ValidationLevel::Moderate)
            .build();
        let mut op = Create::new(Namespace::new("test_db", "test_coll"), Some(options));
        let mut cmd = build_test(&mut op);

        assert_eq!(cmd.name.as_str(), "create");

        let mut expected_body = doc! {
            "create": "test_coll",
            "capped": true,
            "size": 1024_i64,
            "validationLevel": "moderate",
        };

        bson_util::sort_document(&mut cmd.body);
        bson_util::sort_document(&mut expected_body);
        assert_eq!(cmd.body, expected_body);
    }
}
