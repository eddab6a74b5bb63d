//! Cell keys and identity derivation.
//!
//! A cell is one (dataset, chunker, ranker, qa-model) combination. Its key
//! is the only join between execution, storage and aggregation, so it must
//! be a pure function of the four identities.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Entry names inside `results` that are not cells.
pub const RESERVED_KEYS: [&str; 3] = ["times", "evaluations", "overall"];

/// The four identities that make up a cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub chunker: String,
    pub ranker: String,
    pub qa: String,
    pub dataset: String,
}

impl CellKey {
    pub fn new(
        chunker: impl Into<String>,
        ranker: impl Into<String>,
        qa: impl Into<String>,
        dataset: impl Into<String>,
    ) -> Self {
        Self {
            chunker: chunker.into(),
            ranker: ranker.into(),
            qa: qa.into(),
            dataset: dataset.into(),
        }
    }

    /// `{chunker}_{ranker}_{qa}_{dataset}`
    pub fn render(&self) -> String {
        format!("{}_{}", self.config_key(), self.dataset)
    }

    /// The key with the dataset suffix stripped, shared by every dataset
    /// run under the same configuration.
    pub fn config_key(&self) -> String {
        format!("{}_{}_{}", self.chunker, self.ranker, self.qa)
    }

    pub fn is_reserved(key: &str) -> bool {
        RESERVED_KEYS.contains(&key)
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Short stable digest over configuration fields.
///
/// Used to tell apart collaborators whose readable labels coincide but whose
/// configuration (credentials, prompt, endpoint) differs.
pub fn fingerprint<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..8].to_string()
}

/// Render a float the way identities expect: always with a fractional part.
pub fn format_fraction(value: f64) -> String {
    format!("{:?}", value)
}
