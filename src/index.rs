use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

use crate::{bson::Document, collation::Collation, serde_util};

/// Specifies the fields and options for an index. For more information, see the
/// [documentation](https://www.mongodb.com/docs/manual/indexes/).
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct IndexModel {
    /// Specifies the index's fields. For each field, specify a key-value pair in which the key
    /// is the name of the field to index and the value is the index type.
    #[serde(rename = "key")]
    #[builder(!default)]
    pub keys: Document,

    /// The options for the index.
    #[serde(flatten)]
    pub options: Option<IndexOptions>,
}

impl IndexModel {
    /// If the client did not specify a name, generate and set it: the names and directions of
    /// the keys joined by underscores, e.g. `a_1_b_-1`.
    pub(crate) fn update_name(&mut self) {
        if self
            .options
            .as_ref()
            .and_then(|o| o.name.as_ref())
            .is_none()
        {
            let key_names: Vec<String> = self
                .keys
                .iter()
                .map(|(k, v)| match v {
                    crate::bson::Bson::String(s) => format!("{}_{}", k, s),
                    other => format!("{}_{}", k, other),
                })
                .collect();
            self.options.get_or_insert_with(Default::default).name = Some(key_names.join("_"));
        }
    }

    pub(crate) fn get_name(&self) -> Option<String> {
        self.options
            .as_ref()
            .and_then(|o| o.name.as_ref())
            .cloned()
    }
}

/// Specifies the options for an index.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct IndexOptions {
    /// Specifies a name outside the default generated name.
    ///
    /// Note that if an index is created for the same key pattern with different collations, a
    /// name must be provided by the user to avoid ambiguity.
    pub name: Option<String>,

    /// If true, the index only references documents with the specified field.
    pub sparse: Option<bool>,

    /// Forces the index to be unique.
    pub unique: Option<bool>,

    /// Specifies a TTL to control how long MongoDB retains documents in this collection.
    ///
    /// This applies only to TTL indexes.
    #[serde(
        rename = "expireAfterSeconds",
        serialize_with = "serde_util::serialize_duration_option_as_int_seconds",
        deserialize_with = "serde_util::deserialize_duration_option_from_u64_seconds",
        default
    )]
    pub expire_after: Option<Duration>,

    /// If specified, the index only references documents that match the filter.
    pub partial_filter_expression: Option<Document>,

    /// Specifies the collation for the index.
    pub collation: Option<Collation>,

    /// Specifies the wildcard projection of the index.
    pub wildcard_projection: Option<Document>,

    /// Whether the index is hidden from the query planner.
    pub hidden: Option<bool>,
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;

    #[test]
    fn derived_index_names() {
        let mut model = IndexModel::builder()
            .keys(doc! { "a": 1, "b": -1 })
            .build();
        model.update_name();
        assert_eq!(model.get_name().as_deref(), Some("a_1_b_-1"));

        let mut model = IndexModel::builder()
            .keys(doc! { "loc": "2dsphere" })
            .build();
        model.update_name();
        assert_eq!(model.get_name().as_deref(), Some("loc_2dsphere"));

        let mut named = IndexModel::builder()
            .keys(doc! { "a": 1 })
            .options(IndexOptions::builder().name("custom".to_string()).build())
            .build();
        named.update_name();
        assert_eq!(named.get_name().as_deref(), Some("custom"));
    }
}
