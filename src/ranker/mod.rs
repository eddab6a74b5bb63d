//! Passage ranking strategies.
//!
//! A ranker is initialised once per passage set and then queried once per
//! question. All rankers share one return shape, [`Ranking`]: the ranked
//! passages (with similarities when available) plus any query rewrites the
//! ranker generated on the way.

mod rewrite;
mod tfidf;

pub use rewrite::RewriteRanker;
pub use tfidf::{TfidfIndex, TfidfRanker};

use crate::error::{Result, SweepError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A passage as returned by a ranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPassage {
    pub text: String,
    /// Similarity to the query, higher is closer. `None` for rankers that
    /// only order passages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

/// Output of a single `rank` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ranking {
    /// Passages, most relevant first.
    pub passages: Vec<RankedPassage>,
    /// Alternate phrasings of the query the ranker searched with.
    pub rewrites: Vec<String>,
}

impl Ranking {
    /// Passage texts in rank order.
    pub fn texts(&self) -> Vec<String> {
        self.passages.iter().map(|p| p.text.clone()).collect()
    }

    /// Keep only the first `k` passages.
    pub fn truncated(mut self, k: usize) -> Self {
        self.passages.truncate(k);
        self
    }
}

/// Orders passages by relevance to a query.
#[async_trait]
pub trait Ranker: Send + Sync {
    /// Stable identity derived from the configuration.
    fn identity(&self) -> String;

    /// Number of passages handed to QA models.
    fn top_k(&self) -> usize;

    /// Index a passage set. Must be called before `rank`, and again for every
    /// new passage set.
    async fn initialize(&mut self, passages: &[String]) -> Result<()>;

    /// Rank the indexed passages for `query`.
    ///
    /// With `return_similarities` the whole passage list is returned with
    /// per-passage scores; otherwise only the top-k.
    async fn rank(&self, query: &str, return_similarities: bool) -> Result<Ranking>;
}

/// Returns passages in their original order.
#[derive(Debug, Clone)]
pub struct PassthroughRanker {
    top_k: usize,
    passages: Option<Vec<String>>,
}

impl PassthroughRanker {
    pub fn new(top_k: usize) -> Result<Self> {
        validate_top_k(top_k)?;
        Ok(Self {
            top_k,
            passages: None,
        })
    }
}

#[async_trait]
impl Ranker for PassthroughRanker {
    fn identity(&self) -> String {
        format!("PassthroughRanker_{}", self.top_k)
    }

    fn top_k(&self) -> usize {
        self.top_k
    }

    async fn initialize(&mut self, passages: &[String]) -> Result<()> {
        self.passages = Some(passages.to_vec());
        Ok(())
    }

    async fn rank(&self, _query: &str, return_similarities: bool) -> Result<Ranking> {
        let passages = self
            .passages
            .as_ref()
            .ok_or_else(|| not_initialised(self.identity()))?;

        let ranked: Vec<RankedPassage> = passages
            .iter()
            .map(|text| RankedPassage {
                text: text.clone(),
                similarity: None,
            })
            .collect();

        let ranking = Ranking {
            passages: ranked,
            rewrites: Vec::new(),
        };

        Ok(if return_similarities {
            ranking
        } else {
            ranking.truncated(self.top_k)
        })
    }
}

pub(crate) fn validate_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(SweepError::InvalidConfig(
            "top_k must be at least 1".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn not_initialised(identity: String) -> SweepError {
    SweepError::Collaborator {
        role: "ranker",
        identity,
        reason: "rank called before initialize".to_string(),
    }
}

/// Sort passages by descending score, keeping original order among ties.
pub(crate) fn order_by_score(
    passages: &[String],
    scores: &[f64],
    top_k: usize,
    return_similarities: bool,
) -> Vec<RankedPassage> {
    let mut order: Vec<usize> = (0..passages.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    let take = if return_similarities {
        passages.len()
    } else {
        top_k
    };

    order
        .into_iter()
        .take(take)
        .map(|i| RankedPassage {
            text: passages[i].clone(),
            similarity: Some(scores[i]),
        })
        .collect()
}
