use crate::{
    bson::doc,
    conn::{Command, RawCommandResponse, StreamDescription},
    context::OperationContext,
    error::Result,
    operation::OperationWithDefaults,
    Namespace,
};

/// Releases a server-side cursor. Issued on cursor close when the server cursor has not been
/// exhausted; failures are swallowed by the caller since release is best-effort.
#[derive(Debug)]
pub struct KillCursors {
    ns: Namespace,
    cursor_id: i64,
}

impl KillCursors {
    /// Constructs a killCursors for the given cursor.
    pub fn new(ns: Namespace, cursor_id: i64) -> Self {
        Self { ns, cursor_id }
    }
}

impl OperationWithDefaults for KillCursors {
    type O = ();

    const NAME: &'static str = "killCursors";

    fn build(
        &mut self,
        ctx: &OperationContext,
        _description: &StreamDescription,
    ) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "cursors": [self.cursor_id],
        };

        if let Some(max_time) = ctx.timeout.max_time_for_command()? {
            body.insert("maxTimeMS", max_time.as_millis() as i64);
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
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;
    use crate::operation::test::build_test;

    #[test]
    fn build() {
        let mut op = KillCursors::new(Namespace::new("test_db", "test_coll"), 42);
        let cmd = build_test(&mut op);
        assert_eq!(
            cmd.body,
            doc! { "killCursors": "test_coll", "cursors": [42_i64] }
        );
    }
}
