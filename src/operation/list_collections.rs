use crate::{
    bson::doc,
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    cursor::CursorSpecification,
    error::Result,
    operation::{append_options, Access, CursorBody, OperationWithDefaults, Retryability},
    options::ListCollectionsOptions,
};

/// Lists the collections of a database as a cursor over collection-specification documents.
#[derive(Debug)]
pub struct ListCollections {
    db: String,
    name_only: bool,
    options: Option<ListCollectionsOptions>,
}

impl ListCollections {
    /// Constructs a listCollections against the given database.
    pub fn new(db: impl Into<String>, name_only: bool, options: Option<ListCollectionsOptions>) -> Self {
        Self {
            db: db.into(),
            name_only,
            options,
        }
    }
}

impl OperationWithDefaults for ListCollections {
    type O = CursorSpecification;

    const NAME: &'static str = "listCollections";

    fn build(
        &mut self,
        _ctx: &OperationContext,
        _description: &StreamDescription,
    ) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: 1,
        };

        let mut name_only = self.name_only;
        if let Some(filter) = self.options.as_ref().and_then(|o| o.filter.as_ref()) {
            // A filter on anything but the name requires full specifications to match against.
            if name_only && filter.keys().any(|k| k != "name") {
                name_only = false;
            }
        }
        body.insert("nameOnly", name_only);

        append_options(&mut body, self.options.as_ref())?;

        Ok(Command::new(Self::NAME, self.db.clone(), body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        description: &StreamDescription,
    ) -> Result<Self::O> {
        let response: CursorBody = response.body()?;
        Ok(CursorSpecification::new(
            response.cursor,
            response.operation_time,
            description,
            self.options.as_ref().and_then(|opts| opts.batch_size),
            None,
            None,
            None,
        ))
    }

    fn access(&self) -> Access {
        Access::Read
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;
    use crate::{bson_util, operation::test::build_test};

    #[test]
    fn build() {
        let options = ListCollectionsOptions::builder()
            .filter(doc! { "name": "chores" })
            .batch_size(2_u32)
            .build();
        let mut op = ListCollections::new("test_db", true, Some(options));
        let mut cmd = build_test(&mut op);

        let mut expected_body = doc! {
            "listCollections": 1,
            "nameOnly": true,
            "filter": { "name": "chores" },
            "cursor": { "batchSize": 2_i32 },
        };

        bson_util::sort_document(&mut cmd.body);
        bson_util::sort_document(&mut expected_body);
        assert_eq!(cmd.body, expected_body);
    }

    #[test]
    fn non_name_filters_disable_name_only() {
        let options = ListCollectionsOptions::builder()
            .filter(doc! { "options.capped": true })
            .build();
        let mut op = ListCollections::new("test_db", true, Some(options));
        let cmd = build_test(&mut op);
        assert_eq!(cmd.body.get("nameOnly"), Some(&bson::Bson::Boolean(false)));
    }
}
