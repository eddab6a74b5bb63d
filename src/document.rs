//! Documents and the questions asked over them.
//!
//! A document is the unit a sweep runs over: one text body plus an ordered
//! question set. Dataset adapters only need to produce this shape; the
//! bundled loader reads it from JSON.

use crate::error::{Result, SweepError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A question with its accepted answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Prompt text. Also the question's identity within a cell.
    pub question: String,
    /// Accepted answers. May be empty.
    #[serde(default)]
    pub ground_truths: Vec<String>,
    /// Evidence keyed by paragraph id, when the dataset provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<BTreeMap<String, String>>,
}

impl Question {
    pub fn new(question: impl Into<String>, ground_truths: Vec<String>) -> Self {
        Self {
            question: question.into(),
            ground_truths,
            evidence: None,
        }
    }
}

/// An immutable document with its question set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier, unique within a sweep.
    pub name: String,
    /// Full text body.
    #[serde(rename = "document")]
    pub text: String,
    /// Questions in declared order.
    pub questions: Vec<Question>,
    /// Section-level structure for strategies that need it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraphs: Option<BTreeMap<String, String>>,
}

impl Document {
    /// Create a validated document.
    pub fn new(
        name: impl Into<String>,
        text: impl Into<String>,
        questions: Vec<Question>,
    ) -> Result<Self> {
        let document = Self {
            name: name.into(),
            text: text.into(),
            questions,
            paragraphs: None,
        };
        document.validate()?;
        Ok(document)
    }

    /// Load a document from a JSON file.
    ///
    /// Expected format:
    /// ```json
    /// {
    ///   "name": "ux_1",
    ///   "document": "Full text...",
    ///   "questions": [
    ///     {"question": "Whodunnit?", "ground_truths": ["The butler did it."]}
    ///   ]
    /// }
    /// ```
    /// When `name` is absent, the file stem is used.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SweepError::DocumentNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| SweepError::io(path, e))?;

        #[derive(Deserialize)]
        struct RawDocument {
            name: Option<String>,
            document: String,
            questions: Vec<Question>,
            #[serde(default)]
            paragraphs: Option<BTreeMap<String, String>>,
        }

        let raw: RawDocument = serde_json::from_str(&content).map_err(|e| {
            SweepError::InvalidDocument {
                name: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        let name = raw.name.unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("untitled")
                .to_string()
        });

        let document = Self {
            name,
            text: raw.document,
            questions: raw.questions,
            paragraphs: raw.paragraphs,
        };
        document.validate()?;
        Ok(document)
    }

    /// Check the document contract.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| SweepError::InvalidDocument {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("identifier is empty"));
        }
        if self.text.trim().is_empty() {
            return Err(invalid("text is empty"));
        }
        if self.questions.iter().any(|q| q.question.trim().is_empty()) {
            return Err(invalid("question text is empty"));
        }

        Ok(())
    }

    /// Number of questions.
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }
}
