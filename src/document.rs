use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::experiments::Variant;

#[allow(missing_docs)]
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// A full parsed manifest: a mapping from experiment name to its configuration, replaced
/// wholesale on every manifest change and never mutated in place.
///
/// The JSON manifest is an object keyed by experiment name; a duplicate name within one
/// manifest silently overwrites the earlier entry (last-wins during parse).
#[derive(Debug)]
pub struct Document {
    /// Timestamp when the document was loaded.
    pub loaded_at: Timestamp,
    /// Experiment configurations by name.
    ///
    /// Value is wrapped in `TryParse` so that if one experiment entry fails to parse (e.g., a
    /// newer manifest format), the other experiments remain usable.
    pub experiments: HashMap<String, TryParse<ExperimentConfig>>,
}

impl Document {
    /// Create a new document from a decoded manifest.
    pub fn from_manifest(experiments: HashMap<String, TryParse<ExperimentConfig>>) -> Document {
        Document {
            loaded_at: chrono::Utc::now(),
            experiments,
        }
    }

    /// Get a set of all experiment names present in this document. Note that this may include
    /// disabled experiments and experiments with bad configuration.
    pub fn experiment_names(&self) -> Vec<&str> {
        self.experiments.keys().map(String::as_str).collect()
    }
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
///
/// This isolates errors to a subtree: if one experiment's configuration is malformed, the rest
/// of the document still parses.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed.
    ParseFailed(serde_json::Value),
}

impl<T> From<TryParse<T>> for Result<T, serde_json::Value> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Ok(v),
            TryParse::ParseFailed(v) => Err(v),
        }
    }
}
impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}
impl<'a, T> From<&'a TryParse<T>> for Option<&'a T> {
    fn from(value: &TryParse<T>) -> Option<&T> {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

/// One experiment's entry in the manifest. Immutable once loaded.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub id: i64,
    /// Lookup key within the owning document.
    pub name: String,
    #[serde(default)]
    pub owner: String,
    /// Tri-state: absent/null means enabled.
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub version: String,
    /// Lifecycle type. Only the four variant-set type strings are evaluatable; any other type
    /// fails closed at evaluation time.
    #[serde(rename = "type")]
    pub experiment_type: String,
    /// Start of the live window, in fractional seconds since epoch.
    #[serde(default)]
    pub start_ts: f64,
    /// End of the live window, in fractional seconds since epoch.
    #[serde(default)]
    pub stop_ts: f64,
    pub experiment: ExperimentDefinition,
}

/// The embedded experiment definition.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ExperimentDefinition {
    #[serde(default)]
    pub experiment_version: i64,
    /// Changing this (when `bucket_seed` is unset) changes the derived seed and forces a full
    /// rebucketing of all users.
    #[serde(default)]
    pub shuffle_version: i64,
    /// Key into the caller-supplied args to bucket on. Defaults to `"user_id"`.
    #[serde(default)]
    pub bucket_val: String,
    /// Seed mixed into the bucketing hash. Defaults to `"{id}.{name}.{shuffle_version}"`.
    #[serde(default)]
    pub bucket_seed: String,
    #[serde(default)]
    pub variants: Vec<Variant>,
    /// Raw targeting predicate document. Absent means always-true.
    #[serde(default)]
    pub targeting: Option<serde_json::Value>,
    /// Override entries in document order. Each entry maps a variant name to the predicate that
    /// forces it.
    #[serde(default)]
    pub overrides: Vec<HashMap<String, serde_json::Value>>,
}
