use std::{
    fmt,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::{
    concern::{ReadConcern, WriteConcern},
    error::{ErrorKind, Result},
    options::TimeoutMode,
};

/// Per-invocation state carried through an operation's execution: session-level concerns, the
/// timeout budget, and the server API declaration.
///
/// A context is created at operation entry; cursors produced by an operation clone it so that
/// `getMore` and `killCursors` inherit the same session and timeout behavior.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct OperationContext {
    /// Session-level state shared by all operations run under the same logical session.
    pub session: Arc<SessionContext>,

    /// The timeout budget for this operation.
    pub timeout: TimeoutContext,

    /// The declared server API version, if any.
    pub server_api: Option<ServerApi>,

    /// Whether read operations are retried on retryable failures. Defaults to `true`.
    pub retry_reads: Option<bool>,

    /// Whether write operations are retried on retryable failures. Defaults to `true`.
    pub retry_writes: Option<bool>,
}

impl OperationContext {
    /// Creates a context with default session state and no deadline.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns a context using the given session state.
    pub fn with_session(mut self, session: Arc<SessionContext>) -> Self {
        self.session = session;
        self
    }

    /// Returns a context using the given timeout budget.
    pub fn with_timeout(mut self, timeout: TimeoutContext) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns a context declaring the given server API version.
    pub fn with_server_api(mut self, server_api: ServerApi) -> Self {
        self.server_api = Some(server_api);
        self
    }

    pub(crate) fn retry_reads(&self) -> bool {
        self.retry_reads != Some(false)
    }

    pub(crate) fn retry_writes(&self) -> bool {
        self.retry_writes != Some(false)
    }
}

/// The session-level state the operations layer needs: default concerns, the active-transaction
/// flag, and the transaction number allocator used to make writes retryable.
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct SessionContext {
    /// The default read concern applied to reads that don't specify one.
    pub read_concern: Option<ReadConcern>,

    /// The default write concern applied to writes that don't specify one.
    pub write_concern: Option<WriteConcern>,

    /// Whether a transaction is in progress on this session. Concerns are never attached to
    /// individual commands inside a transaction, and in-transaction operations are not retried.
    pub in_transaction: bool,

    txn_number: AtomicI64,
}

impl SessionContext {
    /// Creates session state with the given default concerns.
    pub fn new(read_concern: Option<ReadConcern>, write_concern: Option<WriteConcern>) -> Self {
        Self {
            read_concern,
            write_concern,
            in_transaction: false,
            txn_number: AtomicI64::new(0),
        }
    }

    /// Allocates the transaction number for a retryable write. Called exactly once per logical
    /// write; all retry attempts of that write reuse the allocated value.
    pub(crate) fn allocate_txn_number(&self) -> i64 {
        self.txn_number.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The read concern to attach to a command, given the operation-level override.
    pub(crate) fn effective_read_concern(
        &self,
        operation_level: Option<&ReadConcern>,
    ) -> Option<ReadConcern> {
        if self.in_transaction {
            return None;
        }
        operation_level.or(self.read_concern.as_ref()).cloned()
    }

    /// The write concern to attach to a command, given the operation-level override. Empty and
    /// in-transaction write concerns are never attached.
    pub(crate) fn effective_write_concern(
        &self,
        operation_level: Option<&WriteConcern>,
    ) -> Option<WriteConcern> {
        if self.in_transaction {
            return None;
        }
        operation_level
            .or(self.write_concern.as_ref())
            .filter(|wc| !wc.is_empty())
            .cloned()
    }
}

/// The timeout budget for a single operation, mapping a client-side deadline onto per-command
/// `maxTimeMS` values according to the cursor's [`TimeoutMode`].
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct TimeoutContext {
    /// The absolute deadline for the operation, if any.
    pub deadline: Option<Instant>,

    /// An explicit `maxTimeMS` value.
    pub max_time: Option<Duration>,

    /// The server-side wait budget for `getMore`s on tailable-await cursors.
    pub max_await_time: Option<Duration>,

    /// How the deadline maps onto cursor commands.
    pub mode: TimeoutMode,
}

impl TimeoutContext {
    /// A timeout context with a deadline the given duration from now.
    pub fn with_deadline_in(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            ..Default::default()
        }
    }

    /// Returns a context using the given timeout mode.
    pub fn with_mode(mut self, mode: TimeoutMode) -> Self {
        self.mode = mode;
        self
    }

    /// The time left before the deadline. Returns an error if the deadline has already passed,
    /// so that expired budgets surface before a wire call is issued rather than after.
    pub(crate) fn remaining(&self) -> Result<Option<Duration>> {
        match self.deadline {
            None => Ok(None),
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    Err(ErrorKind::Timeout {
                        message: "operation deadline elapsed".to_string(),
                    }
                    .into())
                } else {
                    Ok(Some(deadline - now))
                }
            }
        }
    }

    /// The `maxTimeMS` value for a cursor-creating command, or `None` if it should be omitted.
    pub(crate) fn max_time_for_initial_command(&self) -> Result<Option<Duration>> {
        match self.mode {
            TimeoutMode::CursorLifetime => Ok(self.max_time.or(self.remaining()?)),
            TimeoutMode::Iteration => Ok(None),
        }
    }

    /// The `maxTimeMS` value for a `getMore`, or `None` if it should be omitted.
    pub(crate) fn max_time_for_get_more(&self) -> Result<Option<Duration>> {
        match self.mode {
            TimeoutMode::CursorLifetime => Ok(None),
            TimeoutMode::Iteration => Ok(self.max_time.or(self.remaining()?)),
        }
    }

    /// The `maxTimeMS` value for a non-cursor command.
    pub(crate) fn max_time_for_command(&self) -> Result<Option<Duration>> {
        Ok(self.max_time.or(self.remaining()?))
    }
}

/// Which versions of the server API the driver can declare.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ServerApiVersion {
    /// Version 1 of the server API.
    #[serde(rename = "1")]
    V1,
}

impl fmt::Display for ServerApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::V1 => write!(f, "1"),
        }
    }
}

/// Options used to declare a stable server API. Declaring an API version guarantees that the
/// server's behavior for the covered commands will not change across server upgrades.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ServerApi {
    /// The declared API version.
    #[serde(rename = "apiVersion")]
    pub version: ServerApiVersion,

    /// Whether the server should return errors for features that are not part of the declared
    /// API version.
    pub strict: Option<bool>,

    /// Whether the server should return errors for deprecated features.
    pub deprecation_errors: Option<bool>,
}

impl ServerApi {
    /// Declares the given API version with no strictness flags.
    pub fn new(version: ServerApiVersion) -> Self {
        Self {
            version,
            strict: None,
            deprecation_errors: None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn txn_numbers_are_monotonic() {
        let session = SessionContext::default();
        assert_eq!(session.allocate_txn_number(), 1);
        assert_eq!(session.allocate_txn_number(), 2);
    }

    #[test]
    fn concerns_suppressed_in_transactions() {
        let mut session = SessionContext::new(
            Some(ReadConcern::majority()),
            Some(WriteConcern::majority()),
        );
        assert!(session.effective_read_concern(None).is_some());
        assert!(session.effective_write_concern(None).is_some());

        session.in_transaction = true;
        assert!(session.effective_read_concern(None).is_none());
        assert!(session.effective_write_concern(None).is_none());
    }

    #[test]
    fn empty_write_concern_not_attached() {
        let session = SessionContext::default();
        let empty = WriteConcern::default();
        assert!(session.effective_write_concern(Some(&empty)).is_none());
    }

    #[test]
    fn expired_deadline_is_a_timeout() {
        let ctx = TimeoutContext {
            deadline: Some(Instant::now() - Duration::from_millis(1)),
            ..Default::default()
        };
        let err = ctx.remaining().unwrap_err();
        assert!(matches!(*err.kind, ErrorKind::Timeout { .. }));
    }

    #[test]
    fn timeout_mode_governs_max_time_placement() {
        let ctx = TimeoutContext {
            max_time: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        // Cursor-lifetime: initial command only.
        assert!(ctx.max_time_for_initial_command().unwrap().is_some());
        assert!(ctx.max_time_for_get_more().unwrap().is_none());

        let ctx = ctx.clone().with_mode(TimeoutMode::Iteration);
        assert!(ctx.max_time_for_initial_command().unwrap().is_none());
        assert!(ctx.max_time_for_get_more().unwrap().is_some());
    }
}
