use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::screening::CandidateEvaluation;
use crate::screening::report::ScreeningReport;

pub type TaskId = Uuid;

/// Lifecycle of a screening task. Transitions only move forward:
/// `Pending → Processing → {Completed | Failed}` or `Pending → Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub total: usize,
    pub processed: usize,
    /// 0 – 100
    pub percentage: f64,
    /// Candidate whose evaluation finished most recently.
    pub current: Option<String>,
}

impl Progress {
    fn recompute(&mut self) {
        self.percentage = if self.total > 0 {
            self.processed as f64 / self.total as f64 * 100.0
        } else {
            0.0
        };
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TaskStateError {
    #[error("cannot move task from {from} to {to}")]
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("processed count would exceed total ({total})")]
    ProgressOverflow { total: usize },

    #[error("task cannot complete: {processed} of {total} processed, {results} results")]
    Incomplete {
        total: usize,
        processed: usize,
        results: usize,
    },
}

/// One screening request and everything a poller may observe about it.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub status: TaskStatus,
    pub progress: Progress,
    pub result: Option<ScreeningReport>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: TaskId) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: TaskStatus::Pending,
            progress: Progress::default(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Ordered per-candidate verdicts, present only once completed.
    pub fn evaluations(&self) -> Option<&[CandidateEvaluation]> {
        self.result.as_ref().map(|r| r.candidates.as_slice())
    }

    pub fn start_processing(&mut self, total: usize) -> Result<(), TaskStateError> {
        self.expect_status(TaskStatus::Pending, TaskStatus::Processing)?;
        self.status = TaskStatus::Processing;
        self.progress.total = total;
        self.progress.processed = 0;
        self.progress.recompute();
        self.touch();
        Ok(())
    }

    pub fn record_processed(&mut self, candidate_id: &str) -> Result<(), TaskStateError> {
        self.expect_status(TaskStatus::Processing, TaskStatus::Processing)?;
        if self.progress.processed >= self.progress.total {
            return Err(TaskStateError::ProgressOverflow {
                total: self.progress.total,
            });
        }
        self.progress.processed += 1;
        self.progress.current = Some(candidate_id.to_string());
        self.progress.recompute();
        self.touch();
        Ok(())
    }

    pub fn complete(&mut self, report: ScreeningReport) -> Result<(), TaskStateError> {
        self.expect_status(TaskStatus::Processing, TaskStatus::Completed)?;
        let Progress {
            total, processed, ..
        } = self.progress;
        if processed != total || report.candidates.len() != total {
            return Err(TaskStateError::Incomplete {
                total,
                processed,
                results: report.candidates.len(),
            });
        }
        self.status = TaskStatus::Completed;
        self.result = Some(report);
        self.touch();
        Ok(())
    }

    /// Moves a live task to `Failed`. Progress is left as it was so the number
    /// of candidates already processed remains visible.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TaskStateError> {
        if self.status.is_terminal() {
            return Err(TaskStateError::IllegalTransition {
                from: self.status.as_str(),
                to: TaskStatus::Failed.as_str(),
            });
        }
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.touch();
        Ok(())
    }

    fn expect_status(&self, required: TaskStatus, to: TaskStatus) -> Result<(), TaskStateError> {
        if self.status != required {
            return Err(TaskStateError::IllegalTransition {
                from: self.status.as_str(),
                to: to.as_str(),
            });
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
