//! TF-IDF cosine ranking.

use super::{Ranker, Ranking, not_initialised, order_by_score, validate_top_k};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Sparse TF-IDF vectors over a fixed passage set.
///
/// Weights follow the smoothed formulation `idf = ln((1 + n) / (1 + df)) + 1`
/// with raw term counts and L2-normalised rows, so the dot product of two rows
/// is their cosine similarity.
#[derive(Debug, Clone)]
pub struct TfidfIndex {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    rows: Vec<HashMap<usize, f64>>,
}

impl TfidfIndex {
    pub fn build(passages: &[String]) -> Self {
        let mut vocabulary = HashMap::new();
        let mut document_frequency: Vec<usize> = Vec::new();
        let mut counts: Vec<HashMap<usize, f64>> = Vec::with_capacity(passages.len());

        for passage in passages {
            let mut row: HashMap<usize, f64> = HashMap::new();
            for term in tokenize(passage) {
                let next_id = vocabulary.len();
                let id = *vocabulary.entry(term).or_insert(next_id);
                if id == document_frequency.len() {
                    document_frequency.push(0);
                }
                *row.entry(id).or_insert(0.0) += 1.0;
            }
            for id in row.keys() {
                document_frequency[*id] += 1;
            }
            counts.push(row);
        }

        let n = passages.len() as f64;
        let idf: Vec<f64> = document_frequency
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        let rows = counts
            .into_iter()
            .map(|row| {
                let weighted = row.into_iter().map(|(id, tf)| (id, tf * idf[id])).collect();
                normalize(weighted)
            })
            .collect();

        Self {
            vocabulary,
            idf,
            rows,
        }
    }

    /// Cosine similarity of `query` to every passage, in passage order.
    /// Terms unseen in the passage set are ignored.
    pub fn similarities(&self, query: &str) -> Vec<f64> {
        let mut query_row: HashMap<usize, f64> = HashMap::new();
        for term in tokenize(query) {
            if let Some(&id) = self.vocabulary.get(&term) {
                *query_row.entry(id).or_insert(0.0) += 1.0;
            }
        }
        let query_row = normalize(
            query_row
                .into_iter()
                .map(|(id, tf)| (id, tf * self.idf[id]))
                .collect(),
        );

        self.rows
            .iter()
            .map(|row| {
                query_row
                    .iter()
                    .filter_map(|(id, weight)| row.get(id).map(|w| w * weight))
                    .sum()
            })
            .collect()
    }
}

/// Lowercased alphanumeric tokens of two or more characters.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_lowercase)
}

fn normalize(row: HashMap<usize, f64>) -> HashMap<usize, f64> {
    let norm = row.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm == 0.0 {
        return row;
    }
    row.into_iter().map(|(id, w)| (id, w / norm)).collect()
}

/// Ranks passages by TF-IDF cosine similarity to the question.
#[derive(Debug, Clone)]
pub struct TfidfRanker {
    top_k: usize,
    state: Option<(Vec<String>, TfidfIndex)>,
}

impl TfidfRanker {
    pub fn new(top_k: usize) -> Result<Self> {
        validate_top_k(top_k)?;
        Ok(Self { top_k, state: None })
    }
}

#[async_trait]
impl Ranker for TfidfRanker {
    fn identity(&self) -> String {
        format!("TfidfRanker_{}", self.top_k)
    }

    fn top_k(&self) -> usize {
        self.top_k
    }

    async fn initialize(&mut self, passages: &[String]) -> Result<()> {
        self.state = Some((passages.to_vec(), TfidfIndex::build(passages)));
        Ok(())
    }

    async fn rank(&self, query: &str, return_similarities: bool) -> Result<Ranking> {
        let (passages, index) = self
            .state
            .as_ref()
            .ok_or_else(|| not_initialised(self.identity()))?;

        let scores = index.similarities(query);
        Ok(Ranking {
            passages: order_by_score(passages, &scores, self.top_k, return_similarities),
            rewrites: Vec::new(),
        })
    }
}
