//! Run state: everything a sweep has produced so far.
//!
//! The serialized shape is one `results` object whose keys are cell keys,
//! plus the reserved `times`, `evaluations` and `overall` entries.

use crate::cell::CellKey;
use crate::document::Document;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Scalar metrics keyed by metric name.
pub type Metrics = BTreeMap<String, f64>;

/// One answered (cell, question) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub ground_truths: Vec<String>,
    /// Passages given to the model, in rank order.
    #[serde(default)]
    pub contexts: Vec<String>,
    /// 0-based rank of the first passage containing a ground truth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_rank: Option<usize>,
    /// `ground_rank` divided by the number of ranked passages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_distance: Option<f64>,
    /// Query rewrites the ranker searched with.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rewrites: Vec<String>,
    /// Attached by evaluation; absent until then.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
}

impl ResultRecord {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        ground_truths: Vec<String>,
        contexts: Vec<String>,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            ground_truths,
            contexts,
            ground_rank: None,
            ground_distance: None,
            rewrites: Vec::new(),
            metrics: None,
        }
    }
}

/// Results by cell key plus the reserved entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Elapsed-seconds samples per operation label.
    #[serde(default)]
    pub times: BTreeMap<String, Vec<f64>>,
    /// Per-cell metric means.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluations: Option<BTreeMap<String, Metrics>>,
    /// Per-configuration metric means across datasets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall: Option<BTreeMap<String, Metrics>>,
    #[serde(flatten)]
    pub cells: BTreeMap<String, Vec<ResultRecord>>,
}

impl RunState {
    pub fn records(&self, key: &str) -> &[ResultRecord] {
        self.cells.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `question` already has a record in the cell.
    pub fn has_answer(&self, key: &str, question: &str) -> bool {
        self.records(key).iter().any(|r| r.question == question)
    }

    /// Make sure the cell has an entry, even if still empty.
    pub fn ensure_cell(&mut self, key: &str) {
        self.cells.entry(key.to_string()).or_default();
    }

    pub fn push(&mut self, key: &str, record: ResultRecord) {
        self.cells.entry(key.to_string()).or_default().push(record);
    }

    pub fn record_time(&mut self, label: &str, seconds: f64) {
        self.times.entry(label.to_string()).or_default().push(seconds);
    }

    /// Every question of `document` has a record in the cell.
    pub fn is_cell_complete(&self, key: &str, document: &Document) -> bool {
        let answered: HashSet<&str> = self
            .records(key)
            .iter()
            .map(|r| r.question.as_str())
            .collect();
        document
            .questions
            .iter()
            .all(|q| answered.contains(q.question.as_str()))
    }

    /// Records across all cells.
    pub fn record_count(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }
}

/// The persisted unit: one experiment's full state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    pub description: String,
    /// The identities behind each cell key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cells: BTreeMap<String, CellKey>,
    pub results: RunState,
}

impl Snapshot {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            cells: BTreeMap::new(),
            results: RunState::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Question;

    fn record(question: &str) -> ResultRecord {
        ResultRecord::new(question, "answer", vec!["gt".to_string()], vec!["ctx".to_string()])
    }

    #[test]
    fn test_results_json_shape() {
        let mut state = RunState::default();
        state.push("c_r_q_d", record("Who?"));
        state.record_time("Qa", 0.25);

        let value = serde_json::to_value(&state).unwrap();
        assert!(value["c_r_q_d"].is_array());
        assert_eq!(value["times"]["Qa"][0], 0.25);
        assert!(value.get("evaluations").is_none());
        assert!(value["c_r_q_d"][0].get("metrics").is_none());
    }

    #[test]
    fn test_results_json_parses_reserved_entries_apart() {
        let json = r#"{
            "c_r_q_d": [{"question": "Who?", "answer": "Bob", "ground_truths": [], "contexts": []}],
            "times": {"Ranking": [0.1]},
            "overall": {"c_r_q": {"fmeasure": 0.5}}
        }"#;
        let state: RunState = serde_json::from_str(json).unwrap();
        assert_eq!(state.cells.len(), 1);
        assert_eq!(state.records("c_r_q_d")[0].answer, "Bob");
        assert_eq!(state.times["Ranking"], vec![0.1]);
        assert_eq!(state.overall.unwrap()["c_r_q"]["fmeasure"], 0.5);
        assert!(state.evaluations.is_none());
    }

    #[test]
    fn test_cell_completion() {
        let doc = Document::new(
            "d",
            "text",
            vec![Question::new("A?", vec![]), Question::new("B?", vec![])],
        )
        .unwrap();
        let mut state = RunState::default();
        assert!(!state.is_cell_complete("k", &doc));

        state.push("k", record("A?"));
        assert!(state.has_answer("k", "A?"));
        assert!(!state.has_answer("k", "a?"));
        assert!(!state.is_cell_complete("k", &doc));

        state.push("k", record("B?"));
        assert!(state.is_cell_complete("k", &doc));
        assert_eq!(state.record_count(), 2);
    }
}
