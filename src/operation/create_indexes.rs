use crate::{
    bson::doc,
    bson_util,
    concern::WriteConcern,
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    error::{ErrorKind, Result},
    index::IndexModel,
    operation::{append_options, OperationWithDefaults, WriteConcernOnlyBody},
    options::CreateIndexOptions,
    results::CreateIndexesResult,
    Namespace,
};

use super::SERVER_4_4_0_WIRE_VERSION;

/// Creates one or more indexes on a collection.
#[derive(Debug)]
pub struct CreateIndexes {
    ns: Namespace,
    indexes: Vec<IndexModel>,
    options: Option<CreateIndexOptions>,
}

impl CreateIndexes {
    /// Constructs a createIndexes for the given index models.
    pub fn new(
        ns: Namespace,
        indexes: Vec<IndexModel>,
        options: Option<CreateIndexOptions>,
    ) -> Self {
        Self {
            ns,
            indexes,
            options,
        }
    }
}

impl OperationWithDefaults for CreateIndexes {
    type O = CreateIndexesResult;

    const NAME: &'static str = "createIndexes";

    fn build(
        &mut self,
        ctx: &OperationContext,
        description: &StreamDescription,
    ) -> Result<Command> {
        if description.max_wire_version.unwrap_or(0) < SERVER_4_4_0_WIRE_VERSION
            && self
                .options
                .as_ref()
                .map_or(false, |options| options.commit_quorum.is_some())
        {
            return Err(ErrorKind::InvalidArgument {
                message: "Specifying a commit quorum to create_index(es) is not supported on \
                          server versions < 4.4"
                    .to_string(),
            }
            .into());
        }

        // Generate names for unnamed indexes.
        self.indexes.iter_mut().for_each(|i| i.update_name());

        let indexes: Vec<_> = self
            .indexes
            .iter()
            .map(bson::to_document)
            .collect::<std::result::Result<_, _>>()?;

        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "indexes": bson_util::to_bson_array(&indexes),
        };

        append_options(&mut body, self.options.as_ref())?;

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
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let response: WriteConcernOnlyBody = response.body()?;
        response.validate()?;
        let index_names = self.indexes.iter().filter_map(|i| i.get_name()).collect();
        Ok(CreateIndexesResult { index_names })
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
    use crate::{operation::test::build_test_with_description, options::CommitQuorum};

    #[test]
    fn build_derives_names() {
        let indexes = vec![IndexModel::builder().keys(doc! { "a": 1, "b": -1 }).build()];
        let mut op = CreateIndexes::new(Namespace::new("test_db", "test_coll"), indexes, None);
        let cmd = build_test_with_description(&mut op, &StreamDescription::new_testing());

        assert_eq!(
            cmd.body,
            doc! {
                "createIndexes": "test_coll",
                "indexes": [ { "key": { "a": 1, "b": -1 }, "name": "a_1_b_-1" } ],
            }
        );
    }

    #[test]
    fn commit_quorum_requires_recent_server() {
        let indexes = vec![IndexModel::builder().keys(doc! { "a": 1 }).build()];
        let options = CreateIndexOptions::builder()
            .commit_quorum(CommitQuorum::Majority)
            .build();
        let mut op = CreateIndexes::new(
            Namespace::new("test_db", "test_coll"),
            indexes,
            Some(options),
        );

        let err = op
            .build(
                &crate::OperationContext::new(),
                &StreamDescription::with_wire_version(8),
            )
            .unwrap_err();
        assert!(matches!(*err.kind, ErrorKind::InvalidArgument { .. }));

        build_test_with_description(&mut op, &StreamDescription::with_wire_version(9));
    }
}
