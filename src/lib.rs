//! QA Sweep - resumable parameter sweeps over question answering pipelines.
//!
//! A pipeline turns a document and a question into an answer in three steps:
//! a [`Chunker`] splits the document into passages, a [`Ranker`] orders the
//! passages by relevance to the question, and a [`QaModel`] answers from the
//! top-ranked passages. An [`Experiment`] runs every combination of datasets,
//! chunkers, rankers and QA models, and stores one record per (cell,
//! question).
//!
//! # Overview
//!
//! - Every record is followed by a snapshot, so an interrupted sweep resumes
//!   where it stopped and never repeats an answered question
//! - Cells that are already complete are skipped without chunking or ranker
//!   initialisation
//! - Evaluation attaches lexical, retrieval and optional LLM-judge metrics
//!   and averages them per cell and per configuration
//!
//! # Quick Start
//!
//! ```no_run
//! use qa_sweep::{
//!     chunker::SentChunker,
//!     document::{Document, Question},
//!     eval::Aggregator,
//!     experiment::Experiment,
//!     persistence::SnapshotStore,
//!     qa::TopPassageQa,
//!     ranker::TfidfRanker,
//! };
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let document = Document::from_json_file(Path::new("data/ANU.json"))?;
//!
//!     let mut experiment = Experiment::new("demo", "sentence chunks", SnapshotStore::new("data/snapshots", 5))
//!         .dataset(document)
//!         .chunker(Box::new(SentChunker::new(3, 0.0)?))
//!         .ranker(Box::new(TfidfRanker::new(5)?))
//!         .qa(Box::new(TopPassageQa));
//!
//!     let mut outcome = experiment.run().await?;
//!     Aggregator::default().evaluate(&mut outcome.snapshot).await?;
//!
//!     for (config, metrics) in outcome.snapshot.results.overall.iter().flatten() {
//!         println!("{}: {:?}", config, metrics);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Chunker / Ranker / QaModel**: one trait per pipeline role
//! - **CellExecutor**: runs one (dataset, chunker, ranker) group for all models
//! - **Experiment**: enumerates the sweep, resumes and skips finished cells
//! - **Checkpoint / SnapshotStore**: timestamped JSON snapshots with retention
//! - **Aggregator**: per-record metrics and their means

pub mod cell;
pub mod checkpoint;
pub mod chunker;
pub mod config;
pub mod document;
pub mod error;
pub mod eval;
pub mod executor;
pub mod experiment;
pub mod llm;
pub mod persistence;
pub mod progress;
pub mod qa;
pub mod ranker;
pub mod registry;
pub mod state;

// Re-export commonly used types
pub use cell::CellKey;
pub use checkpoint::Checkpoint;
pub use chunker::Chunker;
pub use config::Config;
pub use document::{Document, Question};
pub use error::{Result, SweepError};
pub use eval::{Aggregator, Scorer};
pub use executor::CellExecutor;
pub use experiment::{Experiment, SweepOutcome};
pub use llm::LlmClient;
pub use persistence::SnapshotStore;
pub use qa::QaModel;
pub use ranker::{Ranker, Ranking};
pub use registry::ExperimentDefinition;
pub use state::{ResultRecord, RunState, Snapshot};
