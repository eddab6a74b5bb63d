//! Per-cell and per-configuration metric means.

use super::{LexicalScorer, RetrievalScorer, Scorer};
use crate::error::Result;
use crate::state::{Metrics, Snapshot};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Counts from one aggregation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationReport {
    /// Records that received at least one new metric.
    pub scored: usize,
    /// Records left as they were.
    pub unchanged: usize,
    pub cells: usize,
    pub configurations: usize,
}

/// Attaches metrics to records and averages them.
pub struct Aggregator {
    scorers: Vec<Box<dyn Scorer>>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
            .with_scorer(Box::new(LexicalScorer))
            .with_scorer(Box::new(RetrievalScorer))
    }
}

impl Aggregator {
    /// An aggregator without scorers; see [`Aggregator::default`] for the
    /// lexical and retrieval set.
    pub fn new() -> Self {
        Self {
            scorers: Vec::new(),
        }
    }

    pub fn with_scorer(mut self, scorer: Box<dyn Scorer>) -> Self {
        self.scorers.push(scorer);
        self
    }

    /// Score every record that is missing a metric, then rebuild
    /// `evaluations` and `overall`.
    ///
    /// Metrics already on a record are never recomputed, so running this
    /// twice gives the same state. On a scorer error the metrics attached so
    /// far stay on their records.
    pub async fn evaluate(&self, snapshot: &mut Snapshot) -> Result<AggregationReport> {
        let mut report = AggregationReport::default();

        for (key, records) in snapshot.results.cells.iter_mut() {
            for record in records.iter_mut() {
                let mut changed = false;
                for scorer in &self.scorers {
                    let present = record.metrics.as_ref().is_some_and(|m| {
                        scorer.metrics().iter().all(|name| m.contains_key(*name))
                    });
                    if present {
                        continue;
                    }

                    let scored = match scorer.score(record).await {
                        Ok(scored) => scored,
                        Err(e) => {
                            warn!(scorer = scorer.name(), cell = %key, error = %e, "scoring failed");
                            return Err(e);
                        }
                    };
                    record.metrics.get_or_insert_with(Metrics::new).extend(scored);
                    changed = true;
                }
                if changed {
                    report.scored += 1;
                } else {
                    report.unchanged += 1;
                }
            }
            debug!(cell = %key, records = records.len(), "cell scored");
        }

        let evaluations = cell_means(snapshot);
        let overall = configuration_means(snapshot, &evaluations);
        report.cells = evaluations.len();
        report.configurations = overall.len();

        snapshot.results.evaluations = Some(evaluations);
        snapshot.results.overall = Some(overall);

        info!(
            scored = report.scored,
            unchanged = report.unchanged,
            cells = report.cells,
            configurations = report.configurations,
            "evaluation complete"
        );
        Ok(report)
    }
}

/// Mean of every metric over the records of each non-empty cell.
fn cell_means(snapshot: &Snapshot) -> BTreeMap<String, Metrics> {
    snapshot
        .results
        .cells
        .iter()
        .filter(|(_, records)| !records.is_empty())
        .map(|(key, records)| {
            let samples = records.iter().filter_map(|r| r.metrics.as_ref());
            (key.clone(), mean_of(samples))
        })
        .collect()
}

/// Cell means grouped by configuration and averaged across datasets.
fn configuration_means(
    snapshot: &Snapshot,
    evaluations: &BTreeMap<String, Metrics>,
) -> BTreeMap<String, Metrics> {
    let mut groups: BTreeMap<String, Vec<&Metrics>> = BTreeMap::new();
    for (key, means) in evaluations {
        groups
            .entry(configuration_of(snapshot, key))
            .or_default()
            .push(means);
    }

    groups
        .into_iter()
        .map(|(config, cells)| (config, mean_of(cells.into_iter())))
        .collect()
}

/// The cell key without its dataset.
///
/// Snapshots written by this crate carry the identities of every cell; the
/// last `_` split is only used for keys that lack them.
fn configuration_of(snapshot: &Snapshot, key: &str) -> String {
    match snapshot.cells.get(key) {
        Some(cell) => cell.config_key(),
        None => key
            .rsplit_once('_')
            .map_or_else(|| key.to_string(), |(config, _)| config.to_string()),
    }
}

/// Per-metric mean over the samples that carry that metric.
fn mean_of<'a>(samples: impl Iterator<Item = &'a Metrics>) -> Metrics {
    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for metrics in samples {
        for (name, value) in metrics {
            let entry = sums.entry(name.as_str()).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(name, (sum, count))| (name.to_string(), sum / count as f64))
        .collect()
}
