//! Reference-based metrics that need no external service.

use super::Scorer;
use crate::error::Result;
use crate::state::{Metrics, ResultRecord};
use async_trait::async_trait;
use std::collections::HashMap;

/// Unigram overlap between a prediction and a reference.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Overlap {
    pub precision: f64,
    pub recall: f64,
    pub fmeasure: f64,
}

/// ROUGE-1 style score of `prediction` against `reference`.
///
/// Tokens are lowercased runs of letters and digits in any script. Repeated tokens
/// count at most as often as they appear on both sides.
pub fn rouge1(reference: &str, prediction: &str) -> Overlap {
    let reference = token_counts(reference);
    let prediction = token_counts(prediction);

    let reference_len: usize = reference.values().sum();
    let prediction_len: usize = prediction.values().sum();
    if reference_len == 0 || prediction_len == 0 {
        return Overlap::default();
    }

    let overlap: usize = prediction
        .iter()
        .map(|(token, count)| reference.get(token).map_or(0, |r| (*r).min(*count)))
        .sum();

    let precision = overlap as f64 / prediction_len as f64;
    let recall = overlap as f64 / reference_len as f64;
    let fmeasure = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    Overlap {
        precision,
        recall,
        fmeasure,
    }
}

fn token_counts(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        *counts.entry(token.to_string()).or_insert(0) += 1;
    }
    counts
}

/// The best overlap across all references, by F-measure.
pub fn best_overlap(references: &[String], prediction: &str) -> Overlap {
    references
        .iter()
        .map(|reference| rouge1(reference, prediction))
        .fold(None, |best: Option<Overlap>, score| match best {
            Some(b) if b.fmeasure >= score.fmeasure => Some(b),
            _ => Some(score),
        })
        .unwrap_or_default()
}

/// `precision`, `recall` and `fmeasure` of the answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalScorer;

#[async_trait]
impl Scorer for LexicalScorer {
    fn name(&self) -> &str {
        "lexical"
    }

    fn metrics(&self) -> &'static [&'static str] {
        &["precision", "recall", "fmeasure"]
    }

    async fn score(&self, record: &ResultRecord) -> Result<Metrics> {
        let overlap = best_overlap(&record.ground_truths, &record.answer);
        Ok(Metrics::from([
            ("precision".to_string(), overlap.precision),
            ("recall".to_string(), overlap.recall),
            ("fmeasure".to_string(), overlap.fmeasure),
        ]))
    }
}

/// Whether the passages contained the answer, plus the recorded ground rank.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetrievalScorer;

#[async_trait]
impl Scorer for RetrievalScorer {
    fn name(&self) -> &str {
        "retrieval"
    }

    fn metrics(&self) -> &'static [&'static str] {
        &["retrieval_hit"]
    }

    async fn score(&self, record: &ResultRecord) -> Result<Metrics> {
        let hit = record.ground_truths.iter().any(|gt| {
            !gt.is_empty() && record.contexts.iter().any(|c| c.contains(gt.as_str()))
        });

        let mut metrics = Metrics::new();
        metrics.insert("retrieval_hit".to_string(), if hit { 1.0 } else { 0.0 });
        if let Some(rank) = record.ground_rank {
            metrics.insert("ground_rank".to_string(), rank as f64);
        }
        if let Some(distance) = record.ground_distance {
            metrics.insert("ground_distance".to_string(), distance);
        }
        Ok(metrics)
    }
}
