//! Runs one (dataset, chunker, ranker) group over all its questions.

use crate::checkpoint::Checkpoint;
use crate::document::Document;
use crate::error::{Result, SweepError};
use crate::progress::Progress;
use crate::qa::QaModel;
use crate::ranker::{Ranker, Ranking};
use crate::state::ResultRecord;
use std::time::Instant;
use tracing::debug;

/// Timing labels stored under `times`.
pub const CHUNKING: &str = "Chunking";
pub const INITIALISING_RANKER: &str = "Initialising ranker";
pub const RANKING: &str = "Ranking";
pub const QA: &str = "Qa";

/// A QA model together with the cell key its answers go to.
pub struct GroupModel<'a> {
    pub key: String,
    pub model: &'a dyn QaModel,
}

/// Executes a group: one ranker initialisation, then per question one
/// ranking shared by every model that still has to answer it.
///
/// There is no retry here. Collaborators handle transient failures
/// themselves, and any error they return aborts the group. Records appended
/// before the failure are already persisted.
#[derive(Debug, Clone, Copy, Default)]
pub struct CellExecutor {
    collect_ground_rank: bool,
}

impl CellExecutor {
    pub fn new(collect_ground_rank: bool) -> Self {
        Self {
            collect_ground_rank,
        }
    }

    /// Returns how many records were produced.
    pub async fn execute(
        &self,
        document: &Document,
        passages: &[String],
        ranker: &mut dyn Ranker,
        models: &[GroupModel<'_>],
        checkpoint: &mut Checkpoint,
        progress: &mut Progress,
    ) -> Result<usize> {
        let ranker_id = ranker.identity();

        let started = Instant::now();
        ranker
            .initialize(passages)
            .await
            .map_err(collaborator("ranker", &ranker_id))?;
        checkpoint.record_time(INITIALISING_RANKER, started.elapsed().as_secs_f64());

        let mut produced = 0;

        for question in &document.questions {
            let pending: Vec<&GroupModel<'_>> = models
                .iter()
                .filter(|m| !checkpoint.state().has_answer(&m.key, &question.question))
                .collect();
            if pending.is_empty() {
                continue;
            }

            let started = Instant::now();
            let ranking = ranker
                .rank(&question.question, self.collect_ground_rank)
                .await
                .map_err(collaborator("ranker", &ranker_id))?;
            checkpoint.record_time(RANKING, started.elapsed().as_secs_f64());

            let ground = if self.collect_ground_rank {
                ground_position(&ranking, &question.ground_truths)
            } else {
                None
            };
            let ranking = ranking.truncated(ranker.top_k());
            let contexts = ranking.texts();

            for entry in pending {
                let started = Instant::now();
                let answer = entry
                    .model
                    .predict(&question.question, &contexts)
                    .await
                    .map_err(collaborator("qa", &entry.model.identity()))?;
                checkpoint.record_time(QA, started.elapsed().as_secs_f64());

                let mut record = ResultRecord::new(
                    question.question.clone(),
                    answer,
                    question.ground_truths.clone(),
                    contexts.clone(),
                );
                if let Some((rank, distance)) = ground {
                    record.ground_rank = Some(rank);
                    record.ground_distance = Some(distance);
                }
                record.rewrites = ranking.rewrites.clone();

                checkpoint.append(&entry.key, record)?;
                produced += 1;
                progress.record();
                debug!(cell = %entry.key, question = %question.question, "record stored");
            }
            progress.log();
        }

        Ok(produced)
    }
}

/// Rank of the first passage containing a ground truth, and that rank over
/// the number of passages ranked.
pub fn ground_position(ranking: &Ranking, ground_truths: &[String]) -> Option<(usize, f64)> {
    let total = ranking.passages.len();
    ranking
        .passages
        .iter()
        .position(|p| {
            ground_truths
                .iter()
                .any(|gt| !gt.is_empty() && p.text.contains(gt.as_str()))
        })
        .map(|rank| (rank, rank as f64 / total as f64))
}

fn collaborator<'a>(role: &'static str, identity: &'a str) -> impl FnOnce(SweepError) -> SweepError + 'a {
    move |err| match err {
        SweepError::Collaborator { .. } => err,
        other => SweepError::Collaborator {
            role,
            identity: identity.to_string(),
            reason: other.to_string(),
        },
    }
}
