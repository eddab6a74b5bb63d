//! LLM-as-judge answer scoring.

use super::Scorer;
use crate::config::{LlmConfig, RetryConfig};
use crate::error::{Result, SweepError};
use crate::llm::{LlmClient, Prompts};
use crate::state::{Metrics, ResultRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Verdict on a single answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeResult {
    /// Answer quality (1-5).
    pub score: u8,
    /// Explanation from the judge.
    pub explanation: String,
}

/// LLM-as-judge comparing answers against the ground truths.
pub struct LlmJudge {
    client: LlmClient,
}

impl LlmJudge {
    pub fn new(client: LlmClient) -> Result<Self> {
        client.config().validate()?;
        Ok(Self { client })
    }

    pub fn from_config(config: LlmConfig, retry: RetryConfig) -> Result<Self> {
        Self::new(LlmClient::with_retry(config, retry)?)
    }

    /// Judge how well `answer` matches the expected answers.
    pub async fn judge_answer(
        &self,
        question: &str,
        ground_truths: &[String],
        answer: &str,
    ) -> Result<JudgeResult> {
        let truths = if ground_truths.is_empty() {
            "(none given)".to_string()
        } else {
            ground_truths
                .iter()
                .map(|gt| format!("- {}", gt))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let prompt = Prompts::judge_answer()
            .replace("{question}", question)
            .replace("{ground_truths}", &truths)
            .replace("{answer}", answer);

        let response = self.client.complete(None, &prompt).await?;
        Self::parse_judge_response(&response)
    }

    fn parse_judge_response(response: &str) -> Result<JudgeResult> {
        let json_str = Self::extract_json(response);

        #[derive(Deserialize)]
        struct RawJudgeResult {
            score: u8,
            #[serde(default)]
            explanation: String,
        }

        let raw: RawJudgeResult = serde_json::from_str(&json_str).map_err(|e| {
            SweepError::LlmParse(format!(
                "Failed to parse judge response: {}. Response: {}",
                e, response
            ))
        })?;

        Ok(JudgeResult {
            score: raw.score.clamp(1, 5),
            explanation: raw.explanation,
        })
    }

    /// Extract JSON from response.
    fn extract_json(response: &str) -> String {
        let response = response.trim();

        if let Some(body) = response.strip_prefix("```json") {
            if let Some(end) = body.rfind("```") {
                return body[..end].trim().to_string();
            }
        }

        if response.starts_with("```") {
            if let Some(end) = response.rfind("```") {
                let start = response.find('\n').map(|n| n + 1).unwrap_or(3);
                if end > start {
                    return response[start..end].trim().to_string();
                }
            }
        }

        if let Some(start) = response.find('{') {
            if let Some(end) = response.rfind('}') {
                if end > start {
                    return response[start..=end].to_string();
                }
            }
        }

        response.to_string()
    }
}

#[async_trait]
impl Scorer for LlmJudge {
    fn name(&self) -> &str {
        "judge"
    }

    fn metrics(&self) -> &'static [&'static str] {
        &["judge_score"]
    }

    async fn score(&self, record: &ResultRecord) -> Result<Metrics> {
        let verdict = self
            .judge_answer(&record.question, &record.ground_truths, &record.answer)
            .await?;
        Ok(Metrics::from([(
            "judge_score".to_string(),
            f64::from(verdict.score),
        )]))
    }
}
