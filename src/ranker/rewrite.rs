//! Ranking by guessed answer sentences.
//!
//! Instead of matching the question directly, an LLM is asked how the
//! sentence holding the answer might be phrased. Each rewrite is scored
//! against the passages with TF-IDF and the similarities are averaged.

use super::{Ranker, Ranking, TfidfIndex, not_initialised, order_by_score, validate_top_k};
use crate::cell::fingerprint;
use crate::error::{Result, SweepError};
use crate::llm::{LlmClient, Prompts};
use async_trait::async_trait;

pub struct RewriteRanker {
    top_k: usize,
    num_rewrites: usize,
    client: LlmClient,
    state: Option<(Vec<String>, TfidfIndex)>,
}

impl RewriteRanker {
    pub fn new(top_k: usize, num_rewrites: usize, client: LlmClient) -> Result<Self> {
        validate_top_k(top_k)?;
        if num_rewrites == 0 {
            return Err(SweepError::InvalidConfig(
                "num_rewrites must be at least 1".to_string(),
            ));
        }
        client.config().validate()?;
        Ok(Self {
            top_k,
            num_rewrites,
            client,
            state: None,
        })
    }

    async fn rewrites(&self, query: &str) -> Result<Vec<String>> {
        let prompt = Prompts::query_rewrite()
            .replace("{count}", &self.num_rewrites.to_string())
            .replace("{question}", query);

        let response = self.client.complete(None, &prompt).await?;
        Ok(parse_rewrites(&response, self.num_rewrites))
    }
}

/// Split a semicolon separated list, dropping blanks.
fn parse_rewrites(response: &str, limit: usize) -> Vec<String> {
    response
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(limit)
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl Ranker for RewriteRanker {
    fn identity(&self) -> String {
        let config = self.client.config();
        format!(
            "RewriteRanker_{}_{}_{}",
            self.top_k,
            self.num_rewrites,
            fingerprint([
                config.model.as_str(),
                config.api_base.as_str(),
                config.api_key.as_str()
            ])
        )
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

        let rewrites = self.rewrites(query).await?;
        let probes: Vec<&str> = if rewrites.is_empty() {
            vec![query]
        } else {
            rewrites.iter().map(String::as_str).collect()
        };

        let mut scores = vec![0.0; passages.len()];
        for probe in &probes {
            for (total, score) in scores.iter_mut().zip(index.similarities(probe)) {
                *total += score;
            }
        }
        for score in &mut scores {
            *score /= probes.len() as f64;
        }

        Ok(Ranking {
            passages: order_by_score(passages, &scores, self.top_k, return_similarities),
            rewrites,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;

    fn client(key: &str) -> LlmClient {
        LlmClient::new(LlmConfig {
            api_base: "https://api.example.com".to_string(),
            api_key: key.to_string(),
            model: "mistral".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_parse_rewrites() {
        let parsed = parse_rewrites(
            " MASK was driving; The driver was MASK ;; The car was driven by MASK;",
            2,
        );
        assert_eq!(parsed, vec!["MASK was driving", "The driver was MASK"]);
    }

    #[test]
    fn test_requires_credentials() {
        let no_key = LlmClient::new(LlmConfig {
            api_base: "https://api.example.com".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert!(RewriteRanker::new(5, 3, no_key).is_err());
    }

    #[test]
    fn test_identity_separates_credentials() {
        let a = RewriteRanker::new(5, 3, client("key-a")).unwrap();
        let b = RewriteRanker::new(5, 3, client("key-b")).unwrap();
        assert!(a.identity().starts_with("RewriteRanker_5_3_"));
        assert_ne!(a.identity(), b.identity());
        assert_eq!(a.identity(), RewriteRanker::new(5, 3, client("key-a")).unwrap().identity());
    }
}
