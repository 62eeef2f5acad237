//! Core job-run types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerbatch_core::BusinessDate;

/// Unique, monotonically increasing run identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl RunId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job run status.
///
/// `Created → Running → {Completed | Failed}`. Terminal states are final;
/// retrying means launching a new run with a new [`RunId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRunStatus {
    Created,
    Running,
    Completed,
    Failed,
}

impl JobRunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobRunStatus::Completed | JobRunStatus::Failed)
    }

    pub fn can_transition_to(self, to: JobRunStatus) -> bool {
        matches!(
            (self, to),
            (JobRunStatus::Created, JobRunStatus::Running)
                | (JobRunStatus::Running, JobRunStatus::Completed)
                | (JobRunStatus::Running, JobRunStatus::Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
}

/// Coarse failure category recorded in run history.
///
/// History carries only this category; the underlying cause goes to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InconsistentLedger,
    AccountNotFound,
    TransactionConflict,
    Storage,
    Other,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::InconsistentLedger => "inconsistent_ledger",
            FailureKind::AccountNotFound => "account_not_found",
            FailureKind::TransactionConflict => "transaction_conflict",
            FailureKind::Storage => "storage",
            FailureKind::Other => "other",
        }
    }
}

/// Counters a tasklet reports about its own invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepContribution {
    pub read_count: u64,
    pub write_count: u64,
    pub skip_count: u64,
}

impl StepContribution {
    pub fn increment_read(&mut self, by: u64) {
        self.read_count += by;
    }

    pub fn increment_write(&mut self, by: u64) {
        self.write_count += by;
    }

    pub fn increment_skip(&mut self) {
        self.skip_count += 1;
    }
}

/// Record of one step execution within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepExecution {
    pub step_name: String,
    pub status: StepStatus,
    pub contribution: StepContribution,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StepExecution {
    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at).num_milliseconds().max(0) as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub step_name: String,
    pub kind: FailureKind,
}

/// One run of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRun {
    pub job_name: String,
    pub run_id: RunId,
    pub business_date: BusinessDate,
    pub status: JobRunStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepExecution>,
    pub failure: Option<RunFailure>,
}

/// A status change that the run state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal job run transition {from:?} -> {to:?}")]
pub struct IllegalRunTransition {
    pub from: JobRunStatus,
    pub to: JobRunStatus,
}

impl JobRun {
    pub fn new(job_name: impl Into<String>, run_id: RunId, business_date: BusinessDate) -> Self {
        Self {
            job_name: job_name.into(),
            run_id,
            business_date,
            status: JobRunStatus::Created,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            steps: Vec::new(),
            failure: None,
        }
    }

    fn transition(&mut self, to: JobRunStatus) -> Result<(), IllegalRunTransition> {
        if !self.status.can_transition_to(to) {
            return Err(IllegalRunTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn mark_running(&mut self) -> Result<(), IllegalRunTransition> {
        self.transition(JobRunStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_completed(&mut self) -> Result<(), IllegalRunTransition> {
        self.transition(JobRunStatus::Completed)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_failed(&mut self, failure: RunFailure) -> Result<(), IllegalRunTransition> {
        self.transition(JobRunStatus::Failed)?;
        self.failure = Some(failure);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn record_step(&mut self, execution: StepExecution) {
        self.steps.push(execution);
    }

    pub fn duration_ms(&self) -> Option<u64> {
        let started = self.started_at?;
        let finished = self.finished_at?;
        Some((finished - started).num_milliseconds().max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> JobRun {
        JobRun::new(
            "update_savings_dormant_accounts",
            RunId(1),
            BusinessDate::from_ymd(2024, 1, 1).unwrap(),
        )
    }

    #[test]
    fn run_lifecycle() {
        let mut run = run();
        assert_eq!(run.status, JobRunStatus::Created);

        run.mark_running().unwrap();
        assert!(run.started_at.is_some());

        run.mark_completed().unwrap();
        assert_eq!(run.status, JobRunStatus::Completed);
        assert!(run.duration_ms().is_some());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut run = run();
        run.mark_running().unwrap();
        run.mark_failed(RunFailure {
            step_name: "s".to_string(),
            kind: FailureKind::Other,
        })
        .unwrap();

        assert!(run.mark_running().is_err());
        assert!(run.mark_completed().is_err());
        assert_eq!(run.status, JobRunStatus::Failed);
    }

    #[test]
    fn cannot_finish_before_starting() {
        let mut run = run();
        let err = run.mark_completed().unwrap_err();
        assert_eq!(err.from, JobRunStatus::Created);
        assert_eq!(err.to, JobRunStatus::Completed);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_value(JobRunStatus::Completed).unwrap();
        assert_eq!(json, serde_json::json!("completed"));
    }
}
