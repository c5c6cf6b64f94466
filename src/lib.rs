//! The operation-execution core of a MongoDB driver.
//!
//! This crate contains the machinery that turns a logical operation (a find, an aggregation, a
//! write, a change stream) into one or more wire commands executed against a deployment, along
//! with everything that surrounds that translation: the retryable execution harness, the batch
//! cursor state machine, change stream resumption, and the pinned-connection lifecycle used
//! under load-balanced topologies.
//!
//! It deliberately does *not* contain a wire codec, server discovery and selection, connection
//! pooling, or authentication. Those live behind the connection traits: the embedding driver
//! supplies a [`Binding`] that dispenses [`ConnectionSource`]s, and everything in this crate is
//! written against that seam.
//!
//! The entry points are the functions in [`executor`], which execute an
//! [`operation::Operation`] under a binding and return either a typed result or a
//! [`Cursor`](cursor::CommandBatchCursor).

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub use bson;

pub mod change_stream;
mod collation;
pub mod concern;
mod conn;
mod context;
pub mod cursor;
pub mod error;
pub mod executor;
mod index;
pub mod operation;
pub mod options;
pub mod results;
mod runtime;
mod selection_criteria;
mod serde_util;
#[cfg(feature = "sync")]
pub mod sync;

mod bson_util;

#[cfg(test)]
mod test;

use std::{fmt, str::FromStr};

use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize};

pub use crate::{
    collation::{
        Collation,
        CollationAlternate,
        CollationCaseFirst,
        CollationMaxVariable,
        CollationStrength,
    },
    conn::{
        Binding,
        Command,
        Connection,
        ConnectionSource,
        PinnedConnectionHandle,
        RawCommandResponse,
        ServerAddress,
        ServerType,
        StreamDescription,
    },
    context::{OperationContext, ServerApi, ServerApiVersion, SessionContext, TimeoutContext},
    index::{IndexModel, IndexOptions},
    selection_criteria::{ReadPreference, ReadPreferenceOptions, SelectionCriteria, TagSet},
};

/// A struct modeling the canonical name for a collection in MongoDB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    /// The name of the database associated with this namespace.
    pub db: String,

    /// The name of the collection this namespace corresponds to.
    pub coll: String,
}

impl Namespace {
    /// Construct a `Namespace` with the given database and collection.
    pub fn new(db: impl Into<String>, coll: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            coll: coll.into(),
        }
    }

    pub(crate) fn from_full_name(s: &str) -> Option<Self> {
        let mut parts = s.split('.');

        let db = parts.next();
        let coll = parts.collect::<Vec<_>>().join(".");

        match (db, coll) {
            (Some(db), coll) if !coll.is_empty() => Some(Self {
                db: db.to_string(),
                coll,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}.{}", self.db, self.coll)
    }
}

impl FromStr for Namespace {
    type Err = error::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_full_name(s).ok_or_else(|| {
            error::Error::invalid_argument("namespaces must be of the form \"db.coll\"")
        })
    }
}

impl<'de> Deserialize<'de> for Namespace {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        Self::from_full_name(&s)
            .ok_or_else(|| D::Error::custom("Missing one or more fields in namespace"))
    }
}

impl Serialize for Namespace {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format!("{}.{}", self.db, self.coll))
    }
}
