use std::collections::VecDeque;

use serde::Deserialize;

use crate::{
    bson::{doc, RawDocumentBuf},
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    cursor::CursorSpecification,
    error::Result,
    operation::{append_options, Access, CursorInfo, OperationWithDefaults, Retryability},
    Namespace,
    options::ListDatabasesOptions,
};

/// Lists the databases of a deployment. The response's `databases` array is surfaced as a
/// completed single-batch cursor so that consumers iterate it uniformly with the other listing
/// operations.
#[derive(Debug)]
pub struct ListDatabases {
    name_only: bool,
    options: Option<ListDatabasesOptions>,
}

impl ListDatabases {
    /// Constructs a listDatabases.
    pub fn new(name_only: bool, options: Option<ListDatabasesOptions>) -> Self {
        ListDatabases { name_only, options }
    }
}

impl OperationWithDefaults for ListDatabases {
    type O = CursorSpecification;

    const NAME: &'static str = "listDatabases";

    fn build(
        &mut self,
        _ctx: &OperationContext,
        _description: &StreamDescription,
    ) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: 1,
            "nameOnly": self.name_only,
        };

        append_options(&mut body, self.options.as_ref())?;

        Ok(Command::new(Self::NAME, "admin", body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        description: &StreamDescription,
    ) -> Result<Self::O> {
        let response: Response = response.body()?;
        Ok(CursorSpecification::new(
            CursorInfo {
                id: 0,
                ns: Namespace::new("admin", "$cmd.listDatabases"),
                first_batch: response.databases,
                post_batch_resume_token: None,
            },
            None,
            description,
            None,
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

#[derive(Debug, Deserialize)]
struct Response {
    databases: VecDeque<RawDocumentBuf>,
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;
    use crate::operation::test::{build_test, handle_response_test};

    #[test]
    fn build() {
        let options = ListDatabasesOptions::builder()
            .authorized_databases(true)
            .build();
        let mut op = ListDatabases::new(false, Some(options));
        let cmd = build_test(&mut op);

        assert_eq!(cmd.target_db.as_str(), "admin");
        assert_eq!(
            cmd.body,
            doc! { "listDatabases": 1, "nameOnly": false, "authorizedDatabases": true }
        );
    }

    #[test]
    fn databases_surface_as_single_batch() {
        let op = ListDatabases::new(false, None);
        let spec = handle_response_test(
            &op,
            doc! {
                "ok": 1,
                "databases": [
                    { "name": "admin", "sizeOnDisk": 1024, "empty": false },
                    { "name": "test", "sizeOnDisk": 2048, "empty": false },
                ],
                "totalSize": 3072,
            },
        )
        .unwrap();
        assert_eq!(spec.id(), 0);
        assert_eq!(spec.initial_buffer.len(), 2);
    }
}
