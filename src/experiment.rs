//! Sweep orchestration.
//!
//! An [`Experiment`] runs every (dataset, chunker, ranker, qa model)
//! combination, resuming from the newest snapshot and skipping work that is
//! already on disk.

use crate::cell::CellKey;
use crate::checkpoint::Checkpoint;
use crate::chunker::Chunker;
use crate::document::Document;
use crate::error::{Result, SweepError};
use crate::executor::{CHUNKING, CellExecutor, GroupModel};
use crate::persistence::SnapshotStore;
use crate::progress::{Progress, format_duration};
use crate::qa::QaModel;
use crate::ranker::Ranker;
use crate::state::{RunState, Snapshot};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;
use tracing::{debug, error, info};

/// A group that stopped on a collaborator error.
#[derive(Debug)]
pub struct GroupFailure {
    pub dataset: String,
    pub chunker: String,
    pub ranker: String,
    pub error: SweepError,
}

/// Result of [`Experiment::run`].
#[derive(Debug)]
pub struct SweepOutcome {
    /// Full state as of the final snapshot.
    pub snapshot: Snapshot,
    /// Records produced during this run.
    pub produced: usize,
    pub failed: Vec<GroupFailure>,
}

impl SweepOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A parameter sweep over datasets and pipeline strategies.
pub struct Experiment {
    name: String,
    description: String,
    documents: Vec<Document>,
    chunkers: Vec<Box<dyn Chunker>>,
    rankers: Vec<Box<dyn Ranker>>,
    models: Vec<Box<dyn QaModel>>,
    store: SnapshotStore,
    collect_ground_rank: bool,
    resume: bool,
}

impl Experiment {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        store: SnapshotStore,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            documents: Vec::new(),
            chunkers: Vec::new(),
            rankers: Vec::new(),
            models: Vec::new(),
            store,
            collect_ground_rank: false,
            resume: true,
        }
    }

    pub fn dataset(mut self, document: Document) -> Self {
        self.documents.push(document);
        self
    }

    pub fn chunker(mut self, chunker: Box<dyn Chunker>) -> Self {
        self.chunkers.push(chunker);
        self
    }

    pub fn ranker(mut self, ranker: Box<dyn Ranker>) -> Self {
        self.rankers.push(ranker);
        self
    }

    pub fn qa(mut self, model: Box<dyn QaModel>) -> Self {
        self.models.push(model);
        self
    }

    /// Record where the first ground-truth passage ranks for every question.
    pub fn collect_ground_rank(mut self, enabled: bool) -> Self {
        self.collect_ground_rank = enabled;
        self
    }

    /// Start from an empty state instead of the newest snapshot.
    pub fn resume(mut self, enabled: bool) -> Self {
        self.resume = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every cell key of the sweep, validated.
    ///
    /// Fails before anything is written when documents are invalid or
    /// duplicated, when a role lists the same identity twice, or when cell
    /// keys collide or clash with reserved entries.
    pub fn plan(&self) -> Result<Vec<CellKey>> {
        if self.documents.is_empty()
            || self.chunkers.is_empty()
            || self.rankers.is_empty()
            || self.models.is_empty()
        {
            return Err(SweepError::InvalidConfig(
                "a sweep needs at least one dataset, chunker, ranker and qa model".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for document in &self.documents {
            document.validate()?;
            if !names.insert(document.name.as_str()) {
                return Err(SweepError::InvalidDocument {
                    name: document.name.clone(),
                    reason: "dataset name used more than once".to_string(),
                });
            }
        }

        let chunkers = unique_identities("chunker", self.chunkers.iter().map(|c| c.identity()))?;
        let rankers = unique_identities("ranker", self.rankers.iter().map(|r| r.identity()))?;
        let models = unique_identities("qa model", self.models.iter().map(|m| m.identity()))?;

        let mut rendered: BTreeMap<String, CellKey> = BTreeMap::new();
        let mut plan = Vec::new();

        for document in &self.documents {
            for chunker in &chunkers {
                for ranker in &rankers {
                    for model in &models {
                        let key = CellKey::new(chunker, ranker, model, &document.name);
                        let text = key.render();
                        if CellKey::is_reserved(&text) {
                            return Err(SweepError::ReservedCellKey(text));
                        }
                        if rendered.insert(text.clone(), key.clone()).is_some() {
                            return Err(SweepError::CellKeyCollision { key: text });
                        }
                        plan.push(key);
                    }
                }
            }
        }

        Ok(plan)
    }

    /// Run the sweep to completion.
    ///
    /// A failing group is logged and recorded in the outcome; the remaining
    /// groups still run. A final snapshot is written either way.
    pub async fn run(&mut self) -> Result<SweepOutcome> {
        let plan = self.plan()?;

        let mut checkpoint = if self.resume {
            Checkpoint::resume(self.store.clone(), &self.name, &self.description)
        } else {
            Checkpoint::fresh(self.store.clone(), &self.name, &self.description)
        };
        for key in &plan {
            checkpoint.register_cell(key);
        }

        let total = self.total_results();
        let done = self.results_done(checkpoint.state());
        let mut progress = Progress::new(total, done);
        info!(
            experiment = %self.name,
            cells = plan.len(),
            total,
            done,
            "starting sweep"
        );

        let started = Instant::now();
        let executor = CellExecutor::new(self.collect_ground_rank);
        let mut produced = 0;
        let mut failed = Vec::new();

        for document in &self.documents {
            let model_ids: Vec<String> = self.models.iter().map(|m| m.identity()).collect();

            for chunker in &self.chunkers {
                let chunker_id = chunker.identity();
                let mut passages: Option<Vec<String>> = None;

                let pair_complete = self.rankers.iter().all(|ranker| {
                    let ranker_id = ranker.identity();
                    model_ids.iter().all(|qa| {
                        let key = CellKey::new(&chunker_id, &ranker_id, qa, &document.name);
                        checkpoint.state().is_cell_complete(&key.render(), document)
                    })
                });
                if pair_complete {
                    debug!(dataset = %document.name, chunker = %chunker_id, "all cells complete, skipping");
                    continue;
                }

                for ranker in self.rankers.iter_mut() {
                    let ranker_id = ranker.identity();
                    let models: Vec<GroupModel<'_>> = self
                        .models
                        .iter()
                        .zip(&model_ids)
                        .map(|(model, qa)| GroupModel {
                            key: CellKey::new(&chunker_id, &ranker_id, qa, &document.name).render(),
                            model: model.as_ref(),
                        })
                        .collect();

                    if models
                        .iter()
                        .all(|m| checkpoint.state().is_cell_complete(&m.key, document))
                    {
                        debug!(dataset = %document.name, chunker = %chunker_id, ranker = %ranker_id, "all cells complete, skipping");
                        continue;
                    }

                    if passages.is_none() {
                        let chunk_started = Instant::now();
                        let chunks = chunker.chunk(&document.text);
                        checkpoint.record_time(CHUNKING, chunk_started.elapsed().as_secs_f64());
                        debug!(dataset = %document.name, chunker = %chunker_id, chunks = chunks.len(), "chunked");
                        passages = Some(chunks);
                    }
                    let chunks = passages.as_deref().unwrap_or(&[]);

                    info!(dataset = %document.name, chunker = %chunker_id, ranker = %ranker_id, "running group");

                    match executor
                        .execute(
                            document,
                            chunks,
                            ranker.as_mut(),
                            &models,
                            &mut checkpoint,
                            &mut progress,
                        )
                        .await
                    {
                        Ok(count) => produced += count,
                        Err(e) => {
                            error!(
                                dataset = %document.name,
                                chunker = %chunker_id,
                                ranker = %ranker_id,
                                error = %e,
                                "group failed"
                            );
                            failed.push(GroupFailure {
                                dataset: document.name.clone(),
                                chunker: chunker_id.clone(),
                                ranker: ranker_id,
                                error: e,
                            });
                        }
                    }
                }
            }
        }

        checkpoint.commit()?;
        info!(
            experiment = %self.name,
            produced,
            failed = failed.len(),
            elapsed = %format_duration(started.elapsed()),
            "sweep finished"
        );

        Ok(SweepOutcome {
            snapshot: checkpoint.into_snapshot(),
            produced,
            failed,
        })
    }

    /// Results a complete sweep holds: one per distinct question per cell.
    fn total_results(&self) -> usize {
        let per_document: usize = self
            .documents
            .iter()
            .map(|d| distinct_questions(d).len())
            .sum();
        per_document * self.chunkers.len() * self.rankers.len() * self.models.len()
    }

    fn results_done(&self, state: &RunState) -> usize {
        let chunkers: Vec<String> = self.chunkers.iter().map(|c| c.identity()).collect();
        let rankers: Vec<String> = self.rankers.iter().map(|r| r.identity()).collect();
        let models: Vec<String> = self.models.iter().map(|m| m.identity()).collect();

        let mut done = 0;
        for document in &self.documents {
            let questions = distinct_questions(document);
            for chunker in &chunkers {
                for ranker in &rankers {
                    for model in &models {
                        let key = CellKey::new(chunker, ranker, model, &document.name).render();
                        let answered: HashSet<&str> = state
                            .records(&key)
                            .iter()
                            .map(|r| r.question.as_str())
                            .filter(|q| questions.contains(q))
                            .collect();
                        done += answered.len();
                    }
                }
            }
        }
        done
    }
}

fn distinct_questions(document: &Document) -> HashSet<&str> {
    document
        .questions
        .iter()
        .map(|q| q.question.as_str())
        .collect()
}

fn unique_identities(
    role: &str,
    identities: impl Iterator<Item = String>,
) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for identity in identities {
        if !seen.insert(identity.clone()) {
            return Err(SweepError::InvalidConfig(format!(
                "{} '{}' is listed more than once",
                role, identity
            )));
        }
        unique.push(identity);
    }
    Ok(unique)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Question;
    use crate::qa::TopPassageQa;
    use crate::ranker::PassthroughRanker;

    struct NamedChunker(&'static str);

    impl Chunker for NamedChunker {
        fn identity(&self) -> String {
            self.0.to_string()
        }

        fn chunk(&self, text: &str) -> Vec<String> {
            vec![text.to_string()]
        }
    }

    struct NamedRanker(&'static str, PassthroughRanker);

    #[async_trait::async_trait]
    impl Ranker for NamedRanker {
        fn identity(&self) -> String {
            self.0.to_string()
        }

        fn top_k(&self) -> usize {
            self.1.top_k()
        }

        async fn initialize(&mut self, passages: &[String]) -> Result<()> {
            self.1.initialize(passages).await
        }

        async fn rank(&self, query: &str, return_similarities: bool) -> Result<crate::ranker::Ranking> {
            self.1.rank(query, return_similarities).await
        }
    }

    fn document(name: &str) -> Document {
        Document::new(name, "Bob flies.", vec![Question::new("Who?", vec![])]).unwrap()
    }

    fn ranker(name: &'static str) -> Box<dyn Ranker> {
        Box::new(NamedRanker(name, PassthroughRanker::new(1).unwrap()))
    }

    fn base(store_dir: &std::path::Path) -> Experiment {
        Experiment::new("exp", "", SnapshotStore::new(store_dir, 5))
    }

    #[test]
    fn test_plan_enumerates_cross_product() {
        let experiment = base(std::path::Path::new("/tmp"))
            .dataset(document("d1"))
            .dataset(document("d2"))
            .chunker(Box::new(NamedChunker("c")))
            .ranker(ranker("r1"))
            .ranker(ranker("r2"))
            .qa(Box::new(TopPassageQa));

        let plan = experiment.plan().unwrap();
        assert_eq!(plan.len(), 4);
        assert_eq!(plan[0].render(), "c_r1_TopPassageQa_d1");
        assert_eq!(plan[3].render(), "c_r2_TopPassageQa_d2");
    }

    #[test]
    fn test_plan_rejects_key_collisions() {
        let experiment = base(std::path::Path::new("/tmp"))
            .dataset(document("d"))
            .chunker(Box::new(NamedChunker("a_b")))
            .chunker(Box::new(NamedChunker("a")))
            .ranker(ranker("c"))
            .ranker(ranker("b_c"))
            .qa(Box::new(TopPassageQa));

        let err = experiment.plan().unwrap_err();
        assert!(matches!(err, SweepError::CellKeyCollision { .. }));
    }

    #[test]
    fn test_plan_rejects_duplicate_datasets() {
        let experiment = base(std::path::Path::new("/tmp"))
            .dataset(document("d"))
            .dataset(document("d"))
            .chunker(Box::new(NamedChunker("c")))
            .ranker(ranker("r"))
            .qa(Box::new(TopPassageQa));

        assert!(matches!(
            experiment.plan().unwrap_err(),
            SweepError::InvalidDocument { .. }
        ));
    }

    #[test]
    fn test_plan_rejects_duplicate_identities() {
        let experiment = base(std::path::Path::new("/tmp"))
            .dataset(document("d"))
            .chunker(Box::new(NamedChunker("c")))
            .ranker(ranker("r"))
            .ranker(ranker("r"))
            .qa(Box::new(TopPassageQa));

        assert!(matches!(
            experiment.plan().unwrap_err(),
            SweepError::InvalidConfig(_)
        ));
    }

    #[test]
    fn test_plan_requires_every_role() {
        let experiment = base(std::path::Path::new("/tmp")).dataset(document("d"));
        assert!(experiment.plan().is_err());
    }

    #[tokio::test]
    async fn test_invalid_sweep_writes_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut experiment = base(dir.path())
            .dataset(document("d"))
            .chunker(Box::new(NamedChunker("a_b")))
            .chunker(Box::new(NamedChunker("a")))
            .ranker(ranker("c"))
            .ranker(ranker("b_c"))
            .qa(Box::new(TopPassageQa));

        assert!(experiment.run().await.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
