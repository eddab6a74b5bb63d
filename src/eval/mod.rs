//! Evaluation of sweep results.
//!
//! This module provides:
//! - Lexical overlap (ROUGE-1 precision, recall and F-measure) against the
//!   ground truths
//! - Retrieval hit and recorded ground rank
//! - LLM-as-judge answer scoring
//! - Per-cell and per-configuration aggregation

mod aggregate;
mod judge;
mod lexical;

pub use aggregate::{AggregationReport, Aggregator};
pub use judge::{JudgeResult, LlmJudge};
pub use lexical::{LexicalScorer, Overlap, RetrievalScorer, best_overlap, rouge1};

use crate::error::Result;
use crate::state::{Metrics, ResultRecord};
use async_trait::async_trait;

/// Computes named metrics for a single record.
#[async_trait]
pub trait Scorer: Send + Sync {
    fn name(&self) -> &str;

    /// Metric names this scorer always produces. A record that already has
    /// all of them is not scored again.
    fn metrics(&self) -> &'static [&'static str];

    async fn score(&self, record: &ResultRecord) -> Result<Metrics>;
}
