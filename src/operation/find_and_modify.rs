mod options;

use serde::Deserialize;

use crate::{
    bson::{doc, Bson, Document, RawBson},
    bson_util,
    concern::WriteConcern,
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    error::{ErrorKind, Result},
    operation::{append_options, OperationWithDefaults, Retryability, SERVER_4_4_0_WIRE_VERSION},
    options::{
        FindOneAndDeleteOptions,
        FindOneAndReplaceOptions,
        FindOneAndUpdateOptions,
        UpdateModifications,
    },
    Namespace,
};

use self::options::{FindAndModifyOptions, Modification};

/// Atomically modifies at most one document and returns it, with a single `findAndModify`
/// command.
#[derive(Debug)]
pub struct FindAndModify {
    ns: Namespace,
    query: Document,
    modification: Modification,
    options: Option<FindAndModifyOptions>,
}

impl FindAndModify {
    /// Constructs a findAndModify that removes the matched document.
    pub fn with_delete(
        ns: Namespace,
        query: Document,
        options: Option<FindOneAndDeleteOptions>,
    ) -> Self {
        FindAndModify {
            ns,
            query,
            modification: Modification::Delete,
            options: options.map(Into::into),
        }
    }

    /// Constructs a findAndModify that applies an update to the matched document. The update
    /// document is validated to consist of update operators.
    pub fn with_update(
        ns: Namespace,
        query: Document,
        update: UpdateModifications,
        options: Option<FindOneAndUpdateOptions>,
    ) -> Result<Self> {
        if let UpdateModifications::Document(ref d) = update {
            bson_util::update_document_check(d)?;
        };
        Ok(FindAndModify {
            ns,
            query,
            modification: Modification::Update(update.to_bson()),
            options: options.map(Into::into),
        })
    }

    /// Constructs a findAndModify that replaces the matched document. The replacement is
    /// validated to contain no top-level update operators.
    pub fn with_replace(
        ns: Namespace,
        query: Document,
        replacement: Document,
        options: Option<FindOneAndReplaceOptions>,
    ) -> Result<Self> {
        bson_util::replacement_document_check(&replacement)?;
        Ok(FindAndModify {
            ns,
            query,
            modification: Modification::Update(Bson::Document(replacement)),
            options: options.map(Into::into),
        })
    }
}

impl OperationWithDefaults for FindAndModify {
    type O = Option<Document>;

    const NAME: &'static str = "findAndModify";

    fn build(
        &mut self,
        ctx: &OperationContext,
        description: &StreamDescription,
    ) -> Result<Command> {
        if let Some(ref options) = self.options {
            if options.hint.is_some()
                && description.max_wire_version.unwrap_or(0) < SERVER_4_4_0_WIRE_VERSION
            {
                return Err(ErrorKind::InvalidArgument {
                    message: "Specifying a hint to find_one_and_x is not supported on server \
                              versions < 4.4"
                        .to_string(),
                }
                .into());
            }
            if options.hint.is_some() && !self.is_acknowledged() {
                return Err(ErrorKind::InvalidArgument {
                    message: "Specifying a hint to find_one_and_x is not supported with an \
                              unacknowledged write concern"
                        .to_string(),
                }
                .into());
            }
        }

        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "query": self.query.clone(),
        };

        match &self.modification {
            Modification::Delete => body.insert("remove", true),
            Modification::Update(update_or_replace) => {
                body.insert("update", update_or_replace.clone())
            }
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
        #[derive(Debug, Deserialize)]
        struct Response {
            value: RawBson,
        }
        let response: Response = response.body()?;

        match response.value {
            RawBson::Document(doc) => Ok(Some(bson::from_slice(doc.as_bytes())?)),
            RawBson::Null => Ok(None),
            other => Err(ErrorKind::InvalidResponse {
                message: format!(
                    "expected document for value field of findAndModify response, but instead \
                     got {:?}",
                    other
                ),
            }
            .into()),
        }
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options
            .as_ref()
            .and_then(|o| o.write_concern.as_ref())
    }

    fn retryability(&self) -> Retryability {
        Retryability::Write
    }
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;
    use crate::{
        bson_util,
        operation::test::{build_test, handle_response_test},
        options::ReturnDocument,
    };

    #[test]
    fn build_update() {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let mut op = FindAndModify::with_update(
            Namespace::new("test_db", "test_coll"),
            doc! { "_id": 7 },
            UpdateModifications::Document(doc! { "$set": { "x": 1 } }),
            Some(options),
        )
        .unwrap();
        let mut cmd = build_test(&mut op);

        let mut expected_body = doc! {
            "findAndModify": "test_coll",
            "query": { "_id": 7 },
            "update": { "$set": { "x": 1 } },
            "new": true,
            "upsert": true,
        };

        bson_util::sort_document(&mut cmd.body);
        bson_util::sort_document(&mut expected_body);
        assert_eq!(cmd.body, expected_body);
    }

    #[test]
    fn build_delete() {
        let mut op = FindAndModify::with_delete(
            Namespace::new("test_db", "test_coll"),
            doc! { "x": 1 },
            None,
        );
        let cmd = build_test(&mut op);
        assert_eq!(
            cmd.body,
            doc! { "findAndModify": "test_coll", "query": { "x": 1 }, "remove": true }
        );
    }

    #[test]
    fn replacement_rejects_update_operators() {
        FindAndModify::with_replace(
            Namespace::new("db", "coll"),
            doc! {},
            doc! { "$set": { "x": 1 } },
            None,
        )
        .unwrap_err();
    }

    #[test]
    fn hint_requires_recent_server() {
        let options = FindOneAndUpdateOptions::builder()
            .hint(crate::options::Hint::Name("x_1".to_string()))
            .build();
        let mut op = FindAndModify::with_update(
            Namespace::new("db", "coll"),
            doc! {},
            UpdateModifications::Document(doc! { "$set": { "x": 1 } }),
            Some(options),
        )
        .unwrap();
        let err = op
            .build(
                &crate::OperationContext::new(),
                &StreamDescription::with_wire_version(8),
            )
            .unwrap_err();
        assert!(matches!(*err.kind, ErrorKind::InvalidArgument { .. }));
    }

    #[test]
    fn handle_response_value_shapes() {
        let op = FindAndModify::with_delete(Namespace::new("db", "coll"), doc! {}, None);

        let found =
            handle_response_test(&op, doc! { "ok": 1, "value": { "x": 1 } }).unwrap();
        assert_eq!(found, Some(doc! { "x": 1 }));

        let missing =
            handle_response_test(&op, doc! { "ok": 1, "value": Bson::Null }).unwrap();
        assert_eq!(missing, None);

        handle_response_test(&op, doc! { "ok": 1, "value": 5 }).unwrap_err();
    }
}
