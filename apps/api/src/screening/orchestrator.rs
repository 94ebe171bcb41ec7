//! Screening Orchestrator — drives one screening task from upload to report.
//!
//! Flow: unpack archive → extract text (both off the async runtime, task still
//! `PENDING`) → `PROCESSING` with the document total → bounded-concurrency
//! evaluation → ordered report → `COMPLETED`.
//!
//! The orchestrator is the single writer of its task's registry record; all
//! progress and outcomes are published exclusively through `TaskRegistry::update`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::models::screening::{CandidateEvaluation, JobCriteria, Recommendation};
use crate::models::task::TaskId;
use crate::screening::archive::{unpack, ArchiveLimits};
use crate::screening::evaluator::{CandidateEvaluator, EvaluationError};
use crate::screening::extract::{extract_all, CandidateDocument};
use crate::screening::registry::{RegistryError, TaskRegistry};
use crate::screening::report::{build_report, count_of};

/// What one evaluation worker hands back to the orchestrator.
enum WorkerOutcome {
    Evaluated(usize, CandidateEvaluation),
    Escalated(EvaluationError),
    /// Never called the service because the task was already halting.
    Halted,
}

/// Why a task ended up `FAILED` after it was accepted.
#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error("{0}")]
    Input(String),

    #[error(transparent)]
    Escalated(#[from] EvaluationError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RegistryError> for RunError {
    fn from(e: RegistryError) -> Self {
        RunError::Internal(e.to_string())
    }
}

#[derive(Clone)]
pub struct Screener {
    registry: TaskRegistry,
    evaluator: CandidateEvaluator,
    limits: ArchiveLimits,
    concurrency: usize,
}

impl Screener {
    pub fn new(
        registry: TaskRegistry,
        evaluator: CandidateEvaluator,
        limits: ArchiveLimits,
        concurrency: usize,
    ) -> Self {
        Self {
            registry,
            evaluator,
            limits,
            concurrency: concurrency.max(1),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Accepts a screening request: registers a `PENDING` task and schedules its
    /// run in the background. Returns immediately with the task id.
    pub fn submit(&self, archive: Bytes, criteria: JobCriteria) -> TaskId {
        let task_id = self.registry.create();
        info!(
            "Accepted screening task {task_id} for '{}' ({} bytes)",
            criteria.position,
            archive.len()
        );

        let screener = self.clone();
        tokio::spawn(async move {
            screener.run(task_id, archive, criteria).await;
        });

        task_id
    }

    /// Runs the task to a terminal state. Never returns an error: every failure
    /// is recorded on the task itself.
    pub async fn run(&self, task_id: TaskId, archive: Bytes, criteria: JobCriteria) {
        let result = self.execute(task_id, archive, criteria).await;

        let Err(run_error) = result else {
            return;
        };

        match &run_error {
            RunError::Input(msg) => warn!("Task {task_id} rejected input: {msg}"),
            RunError::Escalated(e) => error!("Task {task_id} escalated: {e}"),
            RunError::Internal(msg) => error!("Task {task_id} internal error: {msg}"),
        }

        let message = run_error.to_string();
        if let Err(e) = self.registry.update(&task_id, |t| t.fail(message)) {
            error!("Task {task_id} could not be marked failed: {e}");
        }
    }

    async fn execute(
        &self,
        task_id: TaskId,
        archive: Bytes,
        criteria: JobCriteria,
    ) -> Result<(), RunError> {
        // Unpacking and extraction are CPU-bound; keep them off the async workers.
        let limits = self.limits;
        let documents = tokio::task::spawn_blocking(move || {
            unpack(&archive, &limits).map(extract_all)
        })
        .await
        .map_err(|e| RunError::Internal(format!("document preparation aborted: {e}")))?
        .map_err(|e| RunError::Input(e.to_string()))?;

        let total = documents.len();
        let unreadable = documents.iter().filter(|d| d.text.is_err()).count();
        self.registry
            .update(&task_id, |t| t.start_processing(total))?;
        info!("Task {task_id} processing {total} documents ({unreadable} unreadable)");

        let evaluations = self.evaluate_all(task_id, documents, &criteria).await?;

        let report = build_report(&criteria, &evaluations, Utc::now());
        info!(
            "Task {task_id} completed: {} evaluated, {} failed, {} accepted",
            report.summary.evaluated,
            report.summary.failed,
            count_of(&report, Recommendation::Accept)
        );
        self.registry.update(&task_id, |t| t.complete(report))?;
        Ok(())
    }

    /// Fans documents out to the evaluator with at most `concurrency` calls in
    /// flight. Results come back in completion order and are slotted by index
    /// so the returned list follows archive order.
    async fn evaluate_all(
        &self,
        task_id: TaskId,
        documents: Vec<CandidateDocument>,
        criteria: &JobCriteria,
    ) -> Result<Vec<CandidateEvaluation>, RunError> {
        let total = documents.len();
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let halted = Arc::new(AtomicBool::new(false));
        let criteria = Arc::new(criteria.clone());
        let mut workers = JoinSet::new();

        for (index, document) in documents.into_iter().enumerate() {
            let evaluator = self.evaluator.clone();
            let permits = permits.clone();
            let halted = halted.clone();
            let criteria = criteria.clone();

            workers.spawn(async move {
                let Ok(_permit) = permits.acquire().await else {
                    return WorkerOutcome::Halted;
                };
                if halted.load(Ordering::SeqCst) {
                    return WorkerOutcome::Halted;
                }
                match evaluator.evaluate(&document, &criteria).await {
                    Ok(evaluation) => WorkerOutcome::Evaluated(index, evaluation),
                    Err(e) => {
                        // Flag before the permit is released so no waiter slips through.
                        halted.store(true, Ordering::SeqCst);
                        permits.close();
                        WorkerOutcome::Escalated(e)
                    }
                }
            });
        }

        let mut slots: Vec<Option<CandidateEvaluation>> = vec![None; total];

        while let Some(joined) = workers.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    halt(&permits, &halted, &mut workers);
                    return Err(RunError::Internal(format!("evaluation worker crashed: {e}")));
                }
            };

            match outcome {
                WorkerOutcome::Evaluated(index, evaluation) => {
                    if let Some(reason) = &evaluation.failure {
                        warn!(
                            "Task {task_id}: candidate {} recorded as failed: {reason}",
                            evaluation.candidate_id
                        );
                    }
                    // Progress is published before the result is slotted.
                    self.registry
                        .update(&task_id, |t| t.record_processed(&evaluation.candidate_id))?;
                    slots[index] = Some(evaluation);
                }
                WorkerOutcome::Escalated(e) => {
                    halt(&permits, &halted, &mut workers);
                    return Err(RunError::Escalated(e));
                }
                WorkerOutcome::Halted => {}
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| RunError::Internal(format!("no evaluation for document {i}")))
            })
            .collect()
    }
}

/// Stops issuing new evaluation calls and cancels whatever is still in flight.
fn halt(permits: &Semaphore, halted: &AtomicBool, workers: &mut JoinSet<WorkerOutcome>) {
    halted.store(true, Ordering::SeqCst);
    permits.close();
    workers.abort_all();
}
