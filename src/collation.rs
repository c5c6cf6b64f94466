use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

/// A collation configuration that allows users to specify language-specific rules for string
/// comparison, such as rules for letter case and accent marks.
///
/// See the [documentation](https://www.mongodb.com/docs/manual/reference/collation/) for more
/// information on each of the fields.
#[skip_serializing_none]
#[derive(Clone, Debug, Deserialize, Serialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Collation {
    /// The ICU locale.
    ///
    /// See the list of supported languages and locales [here](https://www.mongodb.com/docs/manual/reference/collation-locales-defaults/#collation-languages-locales).
    #[builder(!default)]
    pub locale: String,

    /// The level of comparison to perform. Corresponds to [ICU Comparison Levels](http://userguide.icu-project.org/collation/concepts#TOC-Comparison-Levels).
    pub strength: Option<CollationStrength>,

    /// Whether to include a separate level for case differences.
    pub case_level: Option<bool>,

    /// The sort order of case differences during tertiary level comparisons.
    pub case_first: Option<CollationCaseFirst>,

    /// Whether to compare numeric strings as numbers or strings.
    pub numeric_ordering: Option<bool>,

    /// Whether collation should consider whitespace and punctuation as base characters for
    /// purposes of comparison.
    pub alternate: Option<CollationAlternate>,

    /// Up to which characters are considered ignorable when `alternate` is "shifted".
    pub max_variable: Option<CollationMaxVariable>,

    /// Whether strings with diacritics sort from back of the string, such as with some French
    /// dictionary ordering.
    pub backwards: Option<bool>,

    /// Whether to check if text requires normalization and to perform normalization.
    pub normalization: Option<bool>,
}

/// The level of comparison to perform. Corresponds to [ICU Comparison Levels](http://userguide.icu-project.org/collation/concepts#TOC-Comparison-Levels).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CollationStrength {
    /// Typically, this means case-insensitive and accent-insensitive.
    Primary,

    /// Typically, this means case-insensitive, but accent-sensitive.
    Secondary,

    /// Typically, this means both case-sensitive and accent-sensitive.
    Tertiary,

    /// Identical to `Tertiary`, but also differentiates between punctuation and whitespace.
    Quaternary,

    /// A tie-breaking level, used as a last resort when all other levels are equal.
    Identical,
}

impl From<CollationStrength> for u32 {
    fn from(strength: CollationStrength) -> Self {
        match strength {
            CollationStrength::Primary => 1,
            CollationStrength::Secondary => 2,
            CollationStrength::Tertiary => 3,
            CollationStrength::Quaternary => 4,
            CollationStrength::Identical => 5,
        }
    }
}

impl Serialize for CollationStrength {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let level = u32::from(*self);
        serializer.serialize_i32(level as i32)
    }
}

impl<'de> Deserialize<'de> for CollationStrength {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match u32::deserialize(deserializer)? {
            1 => Ok(CollationStrength::Primary),
            2 => Ok(CollationStrength::Secondary),
            3 => Ok(CollationStrength::Tertiary),
            4 => Ok(CollationStrength::Quaternary),
            5 => Ok(CollationStrength::Identical),
            i => Err(serde::de::Error::custom(format!(
                "invalid collation strength: {}",
                i
            ))),
        }
    }
}

/// The sort order of case differences during tertiary level comparisons.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum CollationCaseFirst {
    /// Uppercase sorts before lowercase.
    Upper,

    /// Lowercase sorts before uppercase.
    Lower,

    /// Default value. Observe comparison rules of the locale.
    Off,
}

/// Whether collation should consider whitespace and punctuation as base characters for purposes
/// of comparison.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub enum CollationAlternate {
    /// Whitespace and punctuation are considered base characters.
    #[serde(rename = "non-ignorable")]
    NonIgnorable,

    /// Whitespace and punctuation are not considered base characters and are only distinguished
    /// at strength levels greater than 3.
    #[serde(rename = "shifted")]
    Shifted,
}

/// Up to which characters are considered ignorable when `alternate` is "shifted".
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum CollationMaxVariable {
    /// Both whitespace and punctuation are ignorable and not considered base characters.
    Punct,

    /// Whitespace is ignorable and not considered to be base characters.
    Space,
}
