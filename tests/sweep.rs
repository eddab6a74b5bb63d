//! End-to-end sweeps with stub collaborators.

use async_trait::async_trait;
use qa_sweep::chunker::{CharChunker, Chunker};
use qa_sweep::document::{Document, Question};
use qa_sweep::eval::Aggregator;
use qa_sweep::experiment::Experiment;
use qa_sweep::persistence::SnapshotStore;
use qa_sweep::qa::QaModel;
use qa_sweep::ranker::{PassthroughRanker, Ranker, Ranking};
use qa_sweep::{Result, SweepError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

#[derive(Default)]
struct Calls {
    chunk: AtomicUsize,
    initialize: AtomicUsize,
    rank: AtomicUsize,
    predict: AtomicUsize,
}

impl Calls {
    fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

struct CountingChunker {
    inner: CharChunker,
    calls: Arc<Calls>,
}

impl Chunker for CountingChunker {
    fn identity(&self) -> String {
        self.inner.identity()
    }

    fn chunk(&self, text: &str) -> Vec<String> {
        self.calls.chunk.fetch_add(1, Ordering::SeqCst);
        self.inner.chunk(text)
    }
}

struct CountingRanker {
    name: &'static str,
    inner: PassthroughRanker,
    calls: Arc<Calls>,
    fail: bool,
}

#[async_trait]
impl Ranker for CountingRanker {
    fn identity(&self) -> String {
        self.name.to_string()
    }

    fn top_k(&self) -> usize {
        self.inner.top_k()
    }

    async fn initialize(&mut self, passages: &[String]) -> Result<()> {
        self.calls.initialize.fetch_add(1, Ordering::SeqCst);
        self.inner.initialize(passages).await
    }

    async fn rank(&self, query: &str, return_similarities: bool) -> Result<Ranking> {
        self.calls.rank.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SweepError::LlmApi("index unavailable".to_string()));
        }
        self.inner.rank(query, return_similarities).await
    }
}

struct StubQa {
    calls: Arc<Calls>,
    fail_on: Option<&'static str>,
    failing: Arc<AtomicBool>,
}

#[async_trait]
impl QaModel for StubQa {
    fn identity(&self) -> String {
        "StubQa".to_string()
    }

    async fn predict(&self, question: &str, _passages: &[String]) -> Result<String> {
        self.calls.predict.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) && self.fail_on == Some(question) {
            return Err(SweepError::RetriesExhausted {
                attempts: 5,
                last: "rate limited".to_string(),
            });
        }
        Ok("test answer".to_string())
    }
}

fn chunker(calls: &Arc<Calls>) -> Box<dyn Chunker> {
    Box::new(CountingChunker {
        inner: CharChunker::new(100, 0.0).unwrap(),
        calls: calls.clone(),
    })
}

fn ranker(name: &'static str, calls: &Arc<Calls>) -> Box<dyn Ranker> {
    Box::new(CountingRanker {
        name,
        inner: PassthroughRanker::new(5).unwrap(),
        calls: calls.clone(),
        fail: false,
    })
}

fn qa(calls: &Arc<Calls>) -> Box<dyn QaModel> {
    Box::new(StubQa {
        calls: calls.clone(),
        fail_on: None,
        failing: Arc::new(AtomicBool::new(false)),
    })
}

fn who_document() -> Document {
    Document::new(
        "test1",
        "Bob is a pilot. He flies every day.",
        vec![Question::new("Who?", vec!["Bob".to_string()])],
    )
    .unwrap()
}

fn two_question_document() -> Document {
    Document::new(
        "test2",
        "Bob is a pilot. Alice drives a bus.",
        vec![
            Question::new("Who flies?", vec!["Bob".to_string()]),
            Question::new("Who drives?", vec!["Alice".to_string()]),
        ],
    )
    .unwrap()
}

fn experiment(dir: &TempDir, calls: &Arc<Calls>, document: Document) -> Experiment {
    Experiment::new("test", "integration", SnapshotStore::new(dir.path(), 5))
        .dataset(document)
        .chunker(chunker(calls))
        .ranker(ranker("PassthroughRanker_5", calls))
        .qa(qa(calls))
}

#[tokio::test]
async fn single_question_produces_single_record() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(Calls::default());

    let outcome = experiment(&dir, &calls, who_document()).run().await.unwrap();

    let cells = &outcome.snapshot.results.cells;
    assert_eq!(cells.len(), 1);
    let key = "CharChunker_100_0.0_PassthroughRanker_5_StubQa_test1";
    let records = &cells[key];
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].question, "Who?");
    assert_eq!(records[0].answer, "test answer");
    assert_eq!(records[0].ground_truths, vec!["Bob"]);
    assert_eq!(records[0].contexts.len(), 1);
    assert!(outcome.is_complete());
    assert_eq!(outcome.produced, 1);
}

#[tokio::test]
async fn snapshot_on_disk_matches_returned_state() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(Calls::default());
    let store = SnapshotStore::new(dir.path(), 5);

    let outcome = experiment(&dir, &calls, two_question_document()).run().await.unwrap();
    let loaded = store.load("test").unwrap().unwrap();

    assert_eq!(loaded, outcome.snapshot);
    for label in ["Chunking", "Initialising ranker", "Ranking", "Qa"] {
        assert!(loaded.results.times.contains_key(label), "missing {}", label);
    }

    let raw = std::fs::read_to_string(&store.list("test").unwrap()[0].path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["name"], "test");
    assert!(json["results"]["times"]["Qa"].is_array());
    assert!(
        json["results"]["CharChunker_100_0.0_PassthroughRanker_5_StubQa_test2"].is_array()
    );
}

#[tokio::test]
async fn resume_after_completion_does_no_work() {
    let dir = TempDir::new().unwrap();
    let first_calls = Arc::new(Calls::default());
    let first = experiment(&dir, &first_calls, two_question_document())
        .run()
        .await
        .unwrap();

    let calls = Arc::new(Calls::default());
    let second = experiment(&dir, &calls, two_question_document())
        .run()
        .await
        .unwrap();

    assert_eq!(second.produced, 0);
    assert_eq!(Calls::get(&calls.chunk), 0);
    assert_eq!(Calls::get(&calls.initialize), 0);
    assert_eq!(Calls::get(&calls.rank), 0);
    assert_eq!(Calls::get(&calls.predict), 0);
    assert_eq!(second.snapshot.results.cells, first.snapshot.results.cells);
}

#[tokio::test]
async fn chunks_are_shared_across_rankers() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(Calls::default());

    let outcome = experiment(&dir, &calls, two_question_document())
        .ranker(ranker("OtherRanker", &calls))
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.snapshot.results.cells.len(), 2);
    assert_eq!(Calls::get(&calls.chunk), 1);
    assert_eq!(Calls::get(&calls.initialize), 2);
    assert_eq!(Calls::get(&calls.rank), 4);
}

#[tokio::test]
async fn models_share_one_ranking_per_question() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(Calls::default());

    let second_model = Box::new(StubQaNamed {
        inner: StubQa {
            calls: calls.clone(),
            fail_on: None,
            failing: Arc::new(AtomicBool::new(false)),
        },
    });
    let outcome = experiment(&dir, &calls, two_question_document())
        .qa(second_model)
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.produced, 4);
    assert_eq!(Calls::get(&calls.rank), 2);
    assert_eq!(Calls::get(&calls.predict), 4);
}

struct StubQaNamed {
    inner: StubQa,
}

#[async_trait]
impl QaModel for StubQaNamed {
    fn identity(&self) -> String {
        "OtherQa".to_string()
    }

    async fn predict(&self, question: &str, passages: &[String]) -> Result<String> {
        self.inner.predict(question, passages).await
    }
}

#[tokio::test]
async fn interrupted_cell_resumes_without_duplicates() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(Calls::default());
    let failing = Arc::new(AtomicBool::new(true));

    let flaky = |calls: &Arc<Calls>| -> Box<dyn QaModel> {
        Box::new(StubQa {
            calls: calls.clone(),
            fail_on: Some("Who drives?"),
            failing: failing.clone(),
        })
    };

    let build = |calls: &Arc<Calls>| {
        Experiment::new("test", "integration", SnapshotStore::new(dir.path(), 5))
            .dataset(two_question_document())
            .chunker(chunker(calls))
            .ranker(ranker("PassthroughRanker_5", calls))
            .qa(flaky(calls))
    };

    let first = build(&calls).run().await.unwrap();
    assert_eq!(first.failed.len(), 1);
    assert!(matches!(
        first.failed[0].error,
        SweepError::Collaborator { role: "qa", .. }
    ));
    let key = "CharChunker_100_0.0_PassthroughRanker_5_StubQa_test2";
    assert_eq!(first.snapshot.results.records(key).len(), 1);

    failing.store(false, Ordering::SeqCst);
    let calls = Arc::new(Calls::default());
    let second = build(&calls).run().await.unwrap();

    assert!(second.is_complete());
    assert_eq!(Calls::get(&calls.predict), 1);
    let questions: Vec<_> = second
        .snapshot
        .results
        .records(key)
        .iter()
        .map(|r| r.question.as_str())
        .collect();
    assert_eq!(questions, vec!["Who flies?", "Who drives?"]);
}

#[tokio::test]
async fn failing_group_does_not_stop_the_sweep() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(Calls::default());

    let broken = Box::new(CountingRanker {
        name: "BrokenRanker",
        inner: PassthroughRanker::new(5).unwrap(),
        calls: calls.clone(),
        fail: true,
    });
    let outcome = Experiment::new("test", "integration", SnapshotStore::new(dir.path(), 5))
        .dataset(two_question_document())
        .chunker(chunker(&calls))
        .ranker(broken)
        .ranker(ranker("PassthroughRanker_5", &calls))
        .qa(qa(&calls))
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].ranker, "BrokenRanker");
    let results = &outcome.snapshot.results;
    assert!(results.records("CharChunker_100_0.0_BrokenRanker_StubQa_test2").is_empty());
    assert_eq!(
        results
            .records("CharChunker_100_0.0_PassthroughRanker_5_StubQa_test2")
            .len(),
        2
    );

    let store = SnapshotStore::new(dir.path(), 5);
    assert_eq!(store.load("test").unwrap().unwrap(), outcome.snapshot);
}

#[tokio::test]
async fn aggregation_is_idempotent_across_save_and_load() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(Calls::default());
    let store = SnapshotStore::new(dir.path(), 5);

    let mut snapshot = experiment(&dir, &calls, who_document())
        .run()
        .await
        .unwrap()
        .snapshot;

    let aggregator = Aggregator::default();
    aggregator.evaluate(&mut snapshot).await.unwrap();
    store.save(&snapshot).unwrap();

    let mut reloaded = store.load("test").unwrap().unwrap();
    assert_eq!(reloaded, snapshot);

    let report = aggregator.evaluate(&mut reloaded).await.unwrap();
    assert_eq!(report.scored, 0);
    assert_eq!(reloaded, snapshot);

    let overall = snapshot.results.overall.as_ref().unwrap();
    let metrics = &overall["CharChunker_100_0.0_PassthroughRanker_5_StubQa"];
    assert_eq!(metrics["recall"], 0.0);
    assert_eq!(metrics["retrieval_hit"], 1.0);
}

#[tokio::test]
async fn new_records_invalidate_earlier_means() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(Calls::default());
    let store = SnapshotStore::new(dir.path(), 5);

    let mut snapshot = experiment(&dir, &calls, who_document())
        .run()
        .await
        .unwrap()
        .snapshot;
    Aggregator::default().evaluate(&mut snapshot).await.unwrap();
    store.save(&snapshot).unwrap();

    let extended = Document::new(
        "test1",
        "Bob is a pilot. He flies every day.",
        vec![
            Question::new("Who?", vec!["Bob".to_string()]),
            Question::new("What?", vec!["pilot".to_string()]),
        ],
    )
    .unwrap();
    let outcome = experiment(&dir, &calls, extended).run().await.unwrap();
    assert_eq!(outcome.produced, 1);

    let loaded = store.load("test").unwrap().unwrap();
    let records = &loaded.results.cells["CharChunker_100_0.0_PassthroughRanker_5_StubQa_test1"];
    assert_eq!(records.len(), 2);
    assert!(records[0].metrics.is_some());
    assert!(records[1].metrics.is_none());
    assert!(loaded.results.evaluations.is_none());
    assert!(loaded.results.overall.is_none());
}

#[tokio::test]
async fn demo_definition_runs_end_to_end() {
    let dir = TempDir::new().unwrap();
    let mut config = qa_sweep::Config::default();
    config.store.snapshot_dir = dir.path().to_path_buf();

    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/experiment.yaml");
    let definition = qa_sweep::ExperimentDefinition::load(&path).unwrap();
    let mut outcome = definition.build(&config).unwrap().run().await.unwrap();

    assert!(outcome.is_complete());
    let results = &outcome.snapshot.results;
    assert_eq!(results.cells.len(), 4);
    assert!(results.cells.values().all(|records| records.len() == 3));
    assert!(
        results
            .cells
            .values()
            .flatten()
            .all(|r| r.ground_rank.is_some() && r.contexts.len() <= 2)
    );

    definition
        .aggregator(&config, false)
        .unwrap()
        .evaluate(&mut outcome.snapshot)
        .await
        .unwrap();
    assert_eq!(outcome.snapshot.results.overall.as_ref().unwrap().len(), 4);
}
