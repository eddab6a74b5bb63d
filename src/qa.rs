//! Question answering models.
//!
//! A QA model turns a question and the passages a ranker selected into an
//! answer string. API-backed models retry transient failures inside their
//! client and only return terminal errors.

use crate::cell::fingerprint;
use crate::error::{Result, SweepError};
use crate::llm::{LlmClient, Prompts};
use async_trait::async_trait;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Answers a question from ranked passages.
#[async_trait]
pub trait QaModel: Send + Sync {
    /// Stable identity derived from the full configuration.
    fn identity(&self) -> String;

    async fn predict(&self, question: &str, passages: &[String]) -> Result<String>;
}

/// Options for [`ChatQa`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatQaOptions {
    /// Readable label for cell keys. Defaults to `ChatQa_{model}`.
    #[serde(default)]
    pub name: Option<String>,
    /// Template with `{context}` and `{question}` placeholders.
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
}

fn default_prompt_template() -> String {
    Prompts::qa_answer().to_string()
}

impl Default for ChatQaOptions {
    fn default() -> Self {
        Self {
            name: None,
            prompt_template: default_prompt_template(),
        }
    }
}

/// Answers through an OpenAI-compatible chat completion endpoint.
pub struct ChatQa {
    options: ChatQaOptions,
    client: LlmClient,
    placeholder: Regex,
}

impl ChatQa {
    /// Fails immediately when the client lacks credentials.
    pub fn new(options: ChatQaOptions, client: LlmClient) -> Result<Self> {
        client.config().validate()?;
        let placeholder = Regex::new(r"\{(context|question)\}")
            .map_err(|e| SweepError::InvalidConfig(format!("prompt placeholder: {}", e)))?;
        Ok(Self {
            options,
            client,
            placeholder,
        })
    }

    /// Fill both placeholders in one pass, so text inside a passage or the
    /// question is never substituted again.
    fn render_prompt(&self, question: &str, passages: &[String]) -> String {
        let context = format_context(passages);
        self.placeholder
            .replace_all(&self.options.prompt_template, |caps: &Captures| {
                if &caps[1] == "context" {
                    context.clone()
                } else {
                    question.to_string()
                }
            })
            .into_owned()
    }
}

#[async_trait]
impl QaModel for ChatQa {
    fn identity(&self) -> String {
        let config = self.client.config();
        let label = self
            .options
            .name
            .clone()
            .unwrap_or_else(|| format!("ChatQa_{}", config.model));
        let digest = fingerprint([
            config.model.as_str(),
            config.api_base.as_str(),
            config.api_key.as_str(),
            self.options.prompt_template.as_str(),
        ]);
        format!("{}_{}", label, digest)
    }

    async fn predict(&self, question: &str, passages: &[String]) -> Result<String> {
        let prompt = self.render_prompt(question, passages);
        let answer = self
            .client
            .complete(Some(Prompts::system_reader()), &prompt)
            .await?;
        Ok(answer.trim().to_string())
    }
}

/// Baseline that answers with the best ranked passage verbatim.
#[derive(Debug, Clone, Default)]
pub struct TopPassageQa;

#[async_trait]
impl QaModel for TopPassageQa {
    fn identity(&self) -> String {
        "TopPassageQa".to_string()
    }

    async fn predict(&self, _question: &str, passages: &[String]) -> Result<String> {
        Ok(passages.first().cloned().unwrap_or_default())
    }
}

/// Number passages so the model can refer to them.
pub fn format_context(passages: &[String]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, passage)| format!("[{}] {}", i + 1, passage))
        .collect::<Vec<_>>()
        .join("\n\n")
}
