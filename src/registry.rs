//! Experiment definitions and strategy construction.
//!
//! Strategies are declared as tagged YAML maps:
//!
//! ```yaml
//! name: mistral-sweep
//! description: Chunk sizes against TF-IDF and rewrite ranking
//! datasets:
//!   - data/dev/ANU.json
//! chunkers:
//!   - { type: sentence, chunk_length: 3, sliding_window_size: 0.0 }
//! rankers:
//!   - { type: tfidf, top_k: 5 }
//!   - { type: rewrite, top_k: 5, num_rewrites: 3 }
//! qa:
//!   - { type: chat, name: mistralqa }
//! collect_ground_rank: true
//! ```
//!
//! Unknown `type` values and invalid parameters fail when the definition is
//! built, before anything runs.

use crate::chunker::{CharChunker, Chunker, SentChunker, WordChunker};
use crate::config::{Config, LlmConfig};
use crate::document::Document;
use crate::error::{Result, SweepError};
use crate::eval::{Aggregator, LlmJudge};
use crate::experiment::Experiment;
use crate::llm::LlmClient;
use crate::persistence::SnapshotStore;
use crate::qa::{ChatQa, ChatQaOptions, QaModel, TopPassageQa};
use crate::ranker::{PassthroughRanker, Ranker, RewriteRanker, TfidfRanker};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Per-strategy replacement of LLM settings from the global config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmOverride {
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl LlmOverride {
    pub fn apply(&self, base: &LlmConfig) -> LlmConfig {
        let mut config = base.clone();
        if let Some(api_base) = &self.api_base {
            config.api_base = api_base.clone();
        }
        if let Some(api_key) = &self.api_key {
            config.api_key = api_key.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.timeout_secs = timeout_secs;
        }
        config
    }
}

fn client_for(config: &Config, llm: Option<&LlmOverride>) -> Result<LlmClient> {
    let llm_config = match llm {
        Some(o) => o.apply(&config.llm),
        None => config.llm.clone(),
    };
    LlmClient::with_retry(llm_config, config.retry)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChunkerConfig {
    Char {
        chunk_length: usize,
        #[serde(default)]
        sliding_window_size: f64,
    },
    Word {
        chunk_length: usize,
        #[serde(default)]
        sliding_window_size: f64,
    },
    Sentence {
        chunk_length: usize,
        #[serde(default)]
        sliding_window_size: f64,
    },
}

impl ChunkerConfig {
    pub fn build(&self) -> Result<Box<dyn Chunker>> {
        Ok(match *self {
            ChunkerConfig::Char {
                chunk_length,
                sliding_window_size,
            } => Box::new(CharChunker::new(chunk_length, sliding_window_size)?),
            ChunkerConfig::Word {
                chunk_length,
                sliding_window_size,
            } => Box::new(WordChunker::new(chunk_length, sliding_window_size)?),
            ChunkerConfig::Sentence {
                chunk_length,
                sliding_window_size,
            } => Box::new(SentChunker::new(chunk_length, sliding_window_size)?),
        })
    }
}

fn default_num_rewrites() -> usize {
    3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RankerConfig {
    Passthrough {
        top_k: usize,
    },
    Tfidf {
        top_k: usize,
    },
    Rewrite {
        top_k: usize,
        #[serde(default = "default_num_rewrites")]
        num_rewrites: usize,
        #[serde(default)]
        llm: Option<LlmOverride>,
    },
}

impl RankerConfig {
    pub fn build(&self, config: &Config) -> Result<Box<dyn Ranker>> {
        Ok(match self {
            RankerConfig::Passthrough { top_k } => Box::new(PassthroughRanker::new(*top_k)?),
            RankerConfig::Tfidf { top_k } => Box::new(TfidfRanker::new(*top_k)?),
            RankerConfig::Rewrite {
                top_k,
                num_rewrites,
                llm,
            } => Box::new(RewriteRanker::new(
                *top_k,
                *num_rewrites,
                client_for(config, llm.as_ref())?,
            )?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QaConfig {
    Chat {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        prompt_template: Option<String>,
        #[serde(default)]
        llm: Option<LlmOverride>,
    },
    TopPassage,
}

impl QaConfig {
    pub fn build(&self, config: &Config) -> Result<Box<dyn QaModel>> {
        Ok(match self {
            QaConfig::Chat {
                name,
                prompt_template,
                llm,
            } => {
                let mut options = ChatQaOptions {
                    name: name.clone(),
                    ..Default::default()
                };
                if let Some(template) = prompt_template {
                    options.prompt_template = template.clone();
                }
                Box::new(ChatQa::new(options, client_for(config, llm.as_ref())?)?)
            }
            QaConfig::TopPassage => Box::new(TopPassageQa),
        })
    }
}

/// Settings for the optional LLM judge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JudgeConfig {
    #[serde(default)]
    pub llm: Option<LlmOverride>,
}

/// A sweep as declared in an experiment file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub datasets: Vec<PathBuf>,
    pub chunkers: Vec<ChunkerConfig>,
    pub rankers: Vec<RankerConfig>,
    pub qa: Vec<QaConfig>,
    #[serde(default)]
    pub collect_ground_rank: bool,
    #[serde(default)]
    pub judge: Option<JudgeConfig>,
}

impl ExperimentDefinition {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| SweepError::Config(format!("Failed to parse experiment definition: {}", e)))
    }

    /// Read a definition file. Relative dataset paths are taken relative
    /// to the file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SweepError::io(path, e))?;
        let mut definition = Self::from_yaml(&content)?;

        if let Some(base) = path.parent() {
            for dataset in &mut definition.datasets {
                if dataset.is_relative() {
                    *dataset = base.join(&*dataset);
                }
            }
        }
        Ok(definition)
    }

    /// Load the datasets and construct every strategy.
    pub fn build(&self, config: &Config) -> Result<Experiment> {
        let mut experiment = Experiment::new(
            &self.name,
            &self.description,
            SnapshotStore::from_config(&config.store),
        )
        .collect_ground_rank(self.collect_ground_rank);

        for path in &self.datasets {
            experiment = experiment.dataset(Document::from_json_file(path)?);
        }
        for chunker in &self.chunkers {
            experiment = experiment.chunker(chunker.build()?);
        }
        for ranker in &self.rankers {
            experiment = experiment.ranker(ranker.build(config)?);
        }
        for qa in &self.qa {
            experiment = experiment.qa(qa.build(config)?);
        }

        Ok(experiment)
    }

    /// Default scorers, plus the judge when requested.
    pub fn aggregator(&self, config: &Config, with_judge: bool) -> Result<Aggregator> {
        let aggregator = Aggregator::default();
        if !with_judge {
            return Ok(aggregator);
        }

        let llm = self.judge.as_ref().and_then(|j| j.llm.as_ref());
        let judge = LlmJudge::new(client_for(config, llm)?)?;
        Ok(aggregator.with_scorer(Box::new(judge)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITION: &str = r#"
name: sweep
datasets: [data/ANU.json]
chunkers:
  - { type: char, chunk_length: 3, sliding_window_size: 0.5 }
  - { type: sentence, chunk_length: 3 }
rankers:
  - { type: tfidf, top_k: 5 }
  - { type: rewrite, top_k: 5, llm: { model: other } }
qa:
  - { type: chat, name: mistralqa }
  - { type: top_passage }
collect_ground_rank: true
"#;

    fn config() -> Config {
        Config::with_llm("https://api.example.com", "key", "mistral")
    }

    #[test]
    fn test_parse_definition() {
        let definition = ExperimentDefinition::from_yaml(DEFINITION).unwrap();
        assert_eq!(definition.name, "sweep");
        assert!(definition.description.is_empty());
        assert_eq!(definition.chunkers.len(), 2);
        assert_eq!(
            definition.chunkers[1],
            ChunkerConfig::Sentence {
                chunk_length: 3,
                sliding_window_size: 0.0
            }
        );
        assert!(matches!(
            definition.rankers[1],
            RankerConfig::Rewrite { num_rewrites: 3, .. }
        ));
        assert_eq!(definition.qa[1], QaConfig::TopPassage);
        assert!(definition.collect_ground_rank);
        assert!(definition.judge.is_none());
    }

    #[test]
    fn test_unknown_strategy_type_is_rejected() {
        let yaml = DEFINITION.replace("type: tfidf", "type: bm25");
        assert!(ExperimentDefinition::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_build_strategies() {
        let definition = ExperimentDefinition::from_yaml(DEFINITION).unwrap();
        let config = config();

        let chunker = definition.chunkers[0].build().unwrap();
        assert_eq!(chunker.identity(), "CharChunker_3_0.5");

        let tfidf = definition.rankers[0].build(&config).unwrap();
        let rewrite = definition.rankers[1].build(&config).unwrap();
        assert_eq!(tfidf.identity(), "TfidfRanker_5");
        assert!(rewrite.identity().starts_with("RewriteRanker_5_3_"));

        let qa = definition.qa[0].build(&config).unwrap();
        assert!(qa.identity().starts_with("mistralqa_"));
    }

    #[test]
    fn test_invalid_parameters_fail_at_build() {
        let bad = ChunkerConfig::Char {
            chunk_length: 0,
            sliding_window_size: 0.0,
        };
        assert!(bad.build().is_err());

        let no_key = Config::with_llm("https://api.example.com", "", "mistral");
        let chat = QaConfig::Chat {
            name: None,
            prompt_template: None,
            llm: None,
        };
        assert!(chat.build(&no_key).is_err());
    }

    #[test]
    fn test_override_changes_identity() {
        let config = config();
        let plain = QaConfig::Chat {
            name: Some("qa".to_string()),
            prompt_template: None,
            llm: None,
        };
        let other_key = QaConfig::Chat {
            name: Some("qa".to_string()),
            prompt_template: None,
            llm: Some(LlmOverride {
                api_key: Some("other".to_string()),
                ..Default::default()
            }),
        };
        assert_ne!(
            plain.build(&config).unwrap().identity(),
            other_key.build(&config).unwrap().identity()
        );
    }

    #[test]
    fn test_load_resolves_dataset_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("experiment.yaml");
        std::fs::write(&path, DEFINITION).unwrap();

        let definition = ExperimentDefinition::load(&path).unwrap();
        assert_eq!(definition.datasets[0], dir.path().join("data/ANU.json"));
    }

    #[test]
    fn test_judge_needs_credentials_only_when_used() {
        let definition = ExperimentDefinition::from_yaml(DEFINITION).unwrap();
        let no_key = Config::default();
        assert!(definition.aggregator(&no_key, false).is_ok());
        assert!(definition.aggregator(&no_key, true).is_err());
    }
}
