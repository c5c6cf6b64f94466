//! The seam between the operation layer and the rest of a driver.
//!
//! Server discovery and selection, connection pooling, handshaking, authentication, and the wire
//! codec itself are not this crate's concern. They are reached exclusively through the traits in
//! this module: a [`Binding`] dispenses [`ConnectionSource`]s, a source dispenses
//! [`Connection`]s, and a connection can run one [`Command`] at a time, yielding a
//! [`RawCommandResponse`].

mod pinned;

use std::{
    fmt,
    sync::atomic::{AtomicI32, Ordering},
};

use futures_core::future::BoxFuture;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    bson::{Bson, Document},
    concern::ReadConcern,
    context::ServerApi,
    error::{Error, ErrorKind, Result},
    selection_criteria::{ReadPreference, SelectionCriteria},
};

pub use pinned::PinnedConnectionHandle;
pub(crate) use pinned::PinnedConnection;

static REQUEST_ID: AtomicI32 = AtomicI32::new(0);

/// Returns a monotonically increasing id to attach to the next wire message.
pub(crate) fn next_request_id() -> i32 {
    REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

/// The address of a MongoDB server.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum ServerAddress {
    /// A TCP/IP host and port combination.
    Tcp {
        /// The hostname or IP address.
        host: String,

        /// The port. The default port 27017 is used when `None`.
        port: Option<u16>,
    },
}

impl ServerAddress {
    /// Constructs an address from a host and optional port.
    pub fn new(host: impl Into<String>, port: impl Into<Option<u16>>) -> Self {
        ServerAddress::Tcp {
            host: host.into(),
            port: port.into(),
        }
    }

    /// The hostname of this address.
    pub fn host(&self) -> &str {
        match self {
            ServerAddress::Tcp { host, .. } => host.as_str(),
        }
    }

    /// The port of this address.
    pub fn port(&self) -> Option<u16> {
        match self {
            ServerAddress::Tcp { port, .. } => *port,
        }
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::Tcp {
            host: "localhost".to_string(),
            port: None,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => {
                write!(fmt, "{}:{}", host, port.unwrap_or(27017))
            }
        }
    }
}

/// The type of a server as reported in its handshake response.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ServerType {
    /// A standalone server.
    Standalone,

    /// The primary of a replica set.
    ReplicaSetPrimary,

    /// A secondary of a replica set.
    ReplicaSetSecondary,

    /// A replica set member that can neither be read from nor written to.
    ReplicaSetOther,

    /// A router (`mongos`).
    Mongos,

    /// A load balancer fronting the deployment.
    LoadBalancer,

    /// A server whose type is not yet known.
    Unknown,
}

impl Default for ServerType {
    fn default() -> Self {
        ServerType::Unknown
    }
}

/// Contains information about a given server in a format digestible by a connection.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct StreamDescription {
    /// The address of the server.
    pub server_address: ServerAddress,

    /// The type the server had when the connection was established.
    pub initial_server_type: ServerType,

    /// The maximum wire version that the server understands.
    pub max_wire_version: Option<i32>,

    /// The minimum wire version that the server understands.
    pub min_wire_version: Option<i32>,

    /// The maximum number of individual writes the server accepts in a single write command.
    pub max_write_batch_size: Option<u64>,
}

impl StreamDescription {
    /// Whether this server supports retryable writes.
    pub(crate) fn supports_retryable_writes(&self) -> bool {
        self.initial_server_type != ServerType::Standalone
            && self.max_wire_version.map_or(false, |version| version >= 6)
    }

    /// Gets a description of a stream for a 4.2 connection. For test purposes only.
    #[cfg(test)]
    pub(crate) fn new_testing() -> Self {
        Self::with_wire_version(8)
    }

    /// Gets a description of a stream with the given max wire version. For test purposes only.
    #[cfg(test)]
    pub(crate) fn with_wire_version(max_wire_version: i32) -> Self {
        Self {
            server_address: Default::default(),
            initial_server_type: ServerType::ReplicaSetPrimary,
            max_wire_version: Some(max_wire_version),
            min_wire_version: Some(6),
            max_write_batch_size: Some(100_000),
        }
    }
}

/// A driver-side abstraction of a server command, containing all the information necessary to
/// serialize it to a wire message.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Command {
    /// The name of the command (its first key).
    pub name: String,

    /// The database the command targets.
    pub target_db: String,

    /// The body of the command.
    pub body: Document,
}

impl Command {
    /// Constructs a new command.
    pub(crate) fn new(name: impl ToString, target_db: impl ToString, body: Document) -> Self {
        Self {
            name: name.to_string(),
            target_db: target_db.to_string(),
            body,
        }
    }

    /// Constructs a new command with a read concern appended to the body, if one applies.
    pub(crate) fn new_read(
        name: impl ToString,
        target_db: impl ToString,
        read_concern: Option<ReadConcern>,
        mut body: Document,
    ) -> Self {
        if let Some(read_concern) = read_concern {
            body.insert("readConcern", bson::to_bson(&read_concern).unwrap_or(Bson::Null));
        }
        Self {
            name: name.to_string(),
            target_db: target_db.to_string(),
            body,
        }
    }

    pub(crate) fn set_txn_number(&mut self, txn_number: i64) {
        self.body.insert("txnNumber", txn_number);
    }

    /// Attaches a `$readPreference` for preferences the server needs to see. Primary reads and
    /// secondary-preferred reads with default options are implied by the wire protocol and are
    /// not attached.
    pub(crate) fn set_read_preference(&mut self, read_preference: &ReadPreference) {
        let attach = match read_preference {
            ReadPreference::Primary => false,
            ReadPreference::SecondaryPreferred { options } => !options.is_default(),
            _ => true,
        };
        if attach {
            self.body
                .insert("$readPreference", read_preference.to_document());
        }
    }

    pub(crate) fn set_read_preference_from_criteria(&mut self, criteria: &SelectionCriteria) {
        if let Some(read_pref) = criteria.as_read_pref() {
            self.set_read_preference(read_pref);
        }
    }

    pub(crate) fn set_server_api(&mut self, server_api: &ServerApi) {
        // Versioned API fields are not sent on getMore; the cursor inherits them from the
        // originating command.
        if self.name == "getMore" {
            return;
        }

        self.body
            .insert("apiVersion", format!("{}", server_api.version));

        if let Some(strict) = server_api.strict {
            self.body.insert("apiStrict", strict);
        }

        if let Some(deprecation_errors) = server_api.deprecation_errors {
            self.body.insert("apiDeprecationErrors", deprecation_errors);
        }
    }
}

/// An unparsed response to a command, backed by the raw bytes received from the server. Bodies
/// are deserialized lazily so that cursor batches can be handed out without re-encoding.
#[derive(Clone, Debug)]
pub struct RawCommandResponse {
    source: ServerAddress,
    raw: Vec<u8>,
}

impl RawCommandResponse {
    /// Constructs a response from the raw single-document reply received from the given server.
    pub fn new(source: ServerAddress, raw: Vec<u8>) -> Self {
        Self { source, raw }
    }

    /// Initializes a response from a document.
    pub fn with_document_and_address(source: ServerAddress, doc: Document) -> Result<Self> {
        let mut raw = Vec::new();
        doc.to_writer(&mut raw)?;
        Ok(Self { source, raw })
    }

    #[cfg(test)]
    pub(crate) fn with_document(doc: Document) -> Result<Self> {
        Self::with_document_and_address(ServerAddress::default(), doc)
    }

    /// Deserializes the body of this response.
    pub fn body<T: DeserializeOwned>(&self) -> Result<T> {
        bson::from_slice(self.raw.as_slice()).map_err(|e| {
            Error::from(ErrorKind::InvalidResponse {
                message: format!("{}", e),
            })
        })
    }

    /// A view of the raw bytes as a BSON document.
    pub(crate) fn raw_body(&self) -> Result<&bson::RawDocument> {
        Ok(bson::RawDocument::from_bytes(self.raw.as_slice())?)
    }

    /// The address of the server that sent this response.
    pub fn source_address(&self) -> &ServerAddress {
        &self.source
    }

    /// Checks the `ok` field, converting non-ok responses into command errors with any labels the
    /// server attached.
    pub(crate) fn validate(&self) -> Result<()> {
        let raw = self.raw_body()?;
        let ok = match raw.get("ok")? {
            Some(b) => crate::bson_util::get_int_raw(b).ok_or_else(|| {
                Error::invalid_response(format!(
                    "expected ok value to be a number, instead got {:?}",
                    b
                ))
            })?,
            None => {
                return Err(Error::invalid_response("missing 'ok' value in response"));
            }
        };

        if ok == 1 {
            Ok(())
        } else {
            Err(self
                .body::<crate::operation::CommandErrorBody>()
                .map(Error::from)
                .unwrap_or_else(|e| {
                    Error::invalid_response(format!("error deserializing command error: {}", e))
                }))
        }
    }
}

/// A single logical connection to a server.
///
/// Implementations wrap whatever transport the embedding driver uses. A connection runs at most
/// one command at a time; concurrent use is prevented structurally by `&mut self`.
pub trait Connection: Send {
    /// Information about the server negotiated when the connection was established.
    fn stream_description(&self) -> Result<&StreamDescription>;

    /// Serializes the command to the wire, sends it, and reads the single-document response.
    ///
    /// Implementations report transport-level failures as [`ErrorKind::Io`]; they do not inspect
    /// the `ok` field of the response.
    fn send_command<'a>(
        &'a mut self,
        command: Command,
        request_id: i32,
    ) -> BoxFuture<'a, Result<RawCommandResponse>>;
}

/// A reference-counted dispenser of connections to a single server, typically backed by a
/// connection pool. A source retained by a cursor must keep its server eligible for `getMore`
/// and `killCursors` until the cursor is closed.
pub trait ConnectionSource: Send + Sync {
    /// The address of the server this source dispenses connections to.
    fn address(&self) -> &ServerAddress;

    /// Checks out a connection.
    fn connection(&self) -> BoxFuture<'_, Result<Box<dyn Connection>>>;
}

/// The operations layer's view of a deployment: something that can produce connection sources for
/// reads (under a read preference) and writes.
///
/// Server selection semantics live entirely behind this trait.
pub trait Binding: Send + Sync {
    /// Produces a source suitable for a read operation under the given criteria. `None` requests
    /// the binding's default read preference.
    fn read_source<'a>(
        &'a self,
        criteria: Option<&'a SelectionCriteria>,
    ) -> BoxFuture<'a, Result<std::sync::Arc<dyn ConnectionSource>>>;

    /// Produces a source suitable for a write operation.
    fn write_source(&self) -> BoxFuture<'_, Result<std::sync::Arc<dyn ConnectionSource>>>;

    /// Whether the deployment is behind a load balancer. Cursor-producing operations pin their
    /// connection when this is true.
    fn is_load_balanced(&self) -> bool {
        false
    }
}
