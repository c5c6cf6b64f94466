use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

use crate::{
    bson::{doc, Bson, Document},
    conn::ServerAddress,
    error::{ErrorKind, Result},
    serde_util,
};

/// Describes which servers are suitable for a given operation. Bindings interpret this when
/// dispensing a connection source; the operations layer only constructs and forwards it.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum SelectionCriteria {
    /// A read preference that describes the suitable servers based on the server type, max
    /// staleness, and server tags.
    ReadPreference(ReadPreference),

    /// A specific server address. Used to target the server a cursor was opened on for
    /// subsequent `getMore` and `killCursors` commands.
    Address(ServerAddress),
}

impl SelectionCriteria {
    pub(crate) fn as_read_pref(&self) -> Option<&ReadPreference> {
        match self {
            Self::ReadPreference(ref read_pref) => Some(read_pref),
            Self::Address(..) => None,
        }
    }

    pub(crate) fn from_address(address: ServerAddress) -> Self {
        SelectionCriteria::Address(address)
    }
}

impl From<ReadPreference> for SelectionCriteria {
    fn from(read_pref: ReadPreference) -> Self {
        SelectionCriteria::ReadPreference(read_pref)
    }
}

/// Specifies how the driver routes read operations among the members of a replica set.
///
/// See the [documentation](https://www.mongodb.com/docs/manual/core/read-preference) for more
/// details.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ReadPreference {
    /// Only route this operation to the primary.
    Primary,

    /// Only route this operation to a secondary.
    Secondary {
        /// Specifications for the desired secondary.
        options: ReadPreferenceOptions,
    },

    /// Route this operation to the primary if it's available, but fall back to the secondaries if
    /// not.
    PrimaryPreferred {
        /// Specifications for the desired server.
        options: ReadPreferenceOptions,
    },

    /// Route this operation to a secondary if one is available, but fall back to the primary if
    /// not.
    SecondaryPreferred {
        /// Specifications for the desired server.
        options: ReadPreferenceOptions,
    },

    /// Route this operation to the node with the least network latency regardless of whether it's
    /// the primary or a secondary.
    Nearest {
        /// Specifications for the desired server.
        options: ReadPreferenceOptions,
    },
}

/// Specifies read preference options for non-primary read preferences.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ReadPreferenceOptions {
    /// Specifies which replica set members should be considered for operations. Each tag set will
    /// be checked in order until one or more servers is found with each tag in the set.
    pub tag_sets: Option<Vec<TagSet>>,

    /// Specifies the maximum amount of lag behind the primary that a secondary can be to be
    /// considered for the given operation. Any secondaries lagging behind more than
    /// `max_staleness` will not be considered for the operation.
    ///
    /// `max_staleness` must be at least 90 seconds. If a `max_staleness` less than 90 seconds is
    /// specified for an operation, the operation will return an error.
    #[serde(
        rename = "maxStalenessSeconds",
        default,
        serialize_with = "serde_util::serialize_duration_option_as_int_seconds",
        deserialize_with = "serde_util::deserialize_duration_option_from_u64_seconds"
    )]
    pub max_staleness: Option<Duration>,
}

impl ReadPreferenceOptions {
    pub(crate) fn is_default(&self) -> bool {
        self.max_staleness.is_none()
            && self
                .tag_sets
                .as_ref()
                .map(|ts| ts.is_empty())
                .unwrap_or(true)
    }
}

/// A read preference tag set. See the documentation [here](https://www.mongodb.com/docs/manual/tutorial/configure-replica-set-tag-sets/)
/// for more details.
pub type TagSet = HashMap<String, String>;

impl ReadPreference {
    pub(crate) fn mode(&self) -> &'static str {
        match self {
            ReadPreference::Primary => "primary",
            ReadPreference::Secondary { .. } => "secondary",
            ReadPreference::PrimaryPreferred { .. } => "primaryPreferred",
            ReadPreference::SecondaryPreferred { .. } => "secondaryPreferred",
            ReadPreference::Nearest { .. } => "nearest",
        }
    }

    pub(crate) fn options(&self) -> Option<&ReadPreferenceOptions> {
        match self {
            ReadPreference::Primary => None,
            ReadPreference::Secondary { options }
            | ReadPreference::PrimaryPreferred { options }
            | ReadPreference::SecondaryPreferred { options }
            | ReadPreference::Nearest { options } => Some(options),
        }
    }

    /// Constructs a secondary-preferred read preference with default options.
    pub fn secondary_preferred() -> Self {
        ReadPreference::SecondaryPreferred {
            options: Default::default(),
        }
    }

    /// Sets the max staleness value for the read preference, returning an error if the read
    /// preference is a primary.
    pub fn with_max_staleness(mut self, max_staleness: Duration) -> Result<Self> {
        match self {
            ReadPreference::Primary => {
                return Err(ErrorKind::InvalidArgument {
                    message: "cannot set max staleness on a primary read preference".to_string(),
                }
                .into());
            }
            ReadPreference::Secondary { ref mut options }
            | ReadPreference::PrimaryPreferred { ref mut options }
            | ReadPreference::SecondaryPreferred { ref mut options }
            | ReadPreference::Nearest { ref mut options } => {
                options.max_staleness = Some(max_staleness);
            }
        }
        Ok(self)
    }

    /// The document attached to commands as `$readPreference` when the preference needs to be
    /// communicated to the server.
    pub(crate) fn to_document(&self) -> Document {
        let mut doc = doc! { "mode": self.mode() };

        if let Some(options) = self.options() {
            if let Some(ref tag_sets) = options.tag_sets {
                let tags: Vec<Bson> = tag_sets
                    .iter()
                    .map(|tag_set| {
                        Bson::Document(
                            tag_set
                                .iter()
                                .map(|(k, v)| (k.to_string(), Bson::String(v.clone())))
                                .collect(),
                        )
                    })
                    .collect();
                doc.insert("tags", tags);
            }

            if let Some(max_staleness) = options.max_staleness {
                doc.insert("maxStalenessSeconds", max_staleness.as_secs() as i64);
            }
        }

        doc
    }
}

impl Serialize for SelectionCriteria {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            SelectionCriteria::ReadPreference(read_pref) => {
                read_pref.to_document().serialize(serializer)
            }
            SelectionCriteria::Address(address) => doc! {
                "mode": "address",
                "address": address.to_string(),
            }
            .serialize(serializer),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn read_preference_documents() {
        assert_eq!(
            ReadPreference::Primary.to_document(),
            doc! { "mode": "primary" }
        );

        let mut tags = TagSet::new();
        tags.insert("dc".to_string(), "east".to_string());
        let pref = ReadPreference::Secondary {
            options: ReadPreferenceOptions::builder()
                .tag_sets(vec![tags])
                .max_staleness(Duration::from_secs(120))
                .build(),
        };
        assert_eq!(
            pref.to_document(),
            doc! {
                "mode": "secondary",
                "tags": [ { "dc": "east" } ],
                "maxStalenessSeconds": 120_i64,
            }
        );
    }

    #[test]
    fn max_staleness_rejected_on_primary() {
        ReadPreference::Primary
            .with_max_staleness(Duration::from_secs(120))
            .unwrap_err();
        ReadPreference::secondary_preferred()
            .with_max_staleness(Duration::from_secs(120))
            .unwrap();
    }
}
