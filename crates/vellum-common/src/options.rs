//! Typed conversion options and outputs.
//!
//! The guest accepts a dynamically-typed options object; on the host side
//! every recognized option is enumerated in a typed struct, validated before
//! it crosses the boundary. Parsing options from JSON rejects unknown keys
//! with a typed error instead of letting the guest abort on them.

use serde::{Deserialize, Serialize};

use crate::BridgeError;

/// Options for the Markdown → HTML conversion.
///
/// Field names are host-facing; the guest-facing snake_case key names are
/// produced during marshalling. Unset options are omitted entirely; the
/// guest distinguishes an absent key from a present-but-undefined one.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct MarkdownOptions {
    /// Prefix for relative URLs: with `https://example.com`, `/home` in the
    /// input becomes `https://example.com/home` in the output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_root_url: Option<String>,

    /// Replace `"something"` with typographic quotes, `--` with dashes, and
    /// so on. Defaults to **enabled** on the HTML conversion path when
    /// unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_smart_punctuation: Option<bool>,

    /// Wrap occurrences of this term in `<mark>` tags in the output HTML.
    /// The first occurrence additionally gets `id="search-match"` so it can
    /// be scrolled into view.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_term: Option<String>,
}

impl MarkdownOptions {
    /// Parse options from a JSON value, rejecting unknown keys.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] if the value has keys outside
    /// the recognized option set or mistyped values.
    pub fn from_json(value: serde_json::Value) -> Result<Self, BridgeError> {
        serde_json::from_value(value)
            .map_err(|e| BridgeError::invalid_config(format!("unrecognized markdown options: {e}")))
    }
}

/// Options for the Markdown → plaintext conversion.
///
/// The plaintext path recognizes the HTML options minus the search term, and
/// applies no implicit smart-punctuation default.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PlaintextOptions {
    /// Prefix for relative URLs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_root_url: Option<String>,

    /// Typographic punctuation substitution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_smart_punctuation: Option<bool>,
}

impl PlaintextOptions {
    /// Parse options from a JSON value, rejecting unknown keys.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] if the value has keys outside
    /// the recognized option set or mistyped values.
    pub fn from_json(value: serde_json::Value) -> Result<Self, BridgeError> {
        serde_json::from_value(value).map_err(|e| {
            BridgeError::invalid_config(format!("unrecognized plaintext options: {e}"))
        })
    }
}

/// Successful output of the Markdown → HTML conversion.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MarkdownHtml {
    /// The rendered HTML.
    pub html: String,

    /// The document's headings, in order, with their anchor ids.
    pub headings: Vec<Heading>,

    /// Document statistics.
    pub statistics: Statistics,
}

/// A heading extracted from the converted document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Heading {
    /// The heading text.
    pub heading: String,

    /// The anchor id assigned in the output HTML.
    pub id: String,
}

/// Document statistics reported by the Markdown converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Statistics {
    /// Estimated reading time in minutes.
    pub reading_time: u32,

    /// Number of words in the document.
    pub word_count: u32,
}
