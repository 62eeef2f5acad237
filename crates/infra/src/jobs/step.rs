//! Step: a named binding of a tasklet to one transaction.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use ledgerbatch_core::BusinessDate;

use super::tasklet::{StepContext, Tasklet, TaskletError};
use super::types::{RunId, StepContribution, StepExecution, StepStatus};
use crate::errors::{error_chain, most_specific_cause};
use crate::store::TransactionManager;

/// A failed step execution: what was recorded, and why.
#[derive(Debug, thiserror::Error)]
#[error("step '{}' failed", .execution.step_name)]
pub struct StepFailure {
    pub execution: StepExecution,
    #[source]
    pub error: TaskletError,
}

#[derive(Clone)]
pub struct Step {
    name: String,
    tasklet: Arc<dyn Tasklet>,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Step {
    pub fn new(name: impl Into<String>, tasklet: impl Tasklet + 'static) -> Self {
        Self {
            name: name.into(),
            tasklet: Arc::new(tasklet),
        }
    }

    pub fn from_arc(name: impl Into<String>, tasklet: Arc<dyn Tasklet>) -> Self {
        Self {
            name: name.into(),
            tasklet,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the tasklet once inside a fresh transaction.
    ///
    /// Commits on success. On any tasklet or commit failure the transaction
    /// is dropped, so none of this invocation's writes become visible. A
    /// panicking tasklet is reported as a failure like any other.
    pub fn execute(
        &self,
        job_name: &str,
        run_id: RunId,
        business_date: BusinessDate,
        transactions: &dyn TransactionManager,
    ) -> Result<StepExecution, StepFailure> {
        let started_at = Utc::now();
        let ctx = StepContext {
            job_name: job_name.to_string(),
            step_name: self.name.clone(),
            run_id,
            business_date,
        };
        let mut contribution = StepContribution::default();

        let result = transactions
            .begin()
            .map_err(TaskletError::from)
            .and_then(|mut tx| {
                panic::catch_unwind(AssertUnwindSafe(|| {
                    self.tasklet.execute(&ctx, &mut tx, &mut contribution)
                }))
                .map_err(|payload| {
                    TaskletError::failed(format!("tasklet panicked: {}", panic_message(&*payload)))
                })??;
                transactions.commit(tx).map_err(TaskletError::from)
            });

        let mut execution = StepExecution {
            step_name: self.name.clone(),
            status: StepStatus::Completed,
            contribution,
            started_at,
            finished_at: Utc::now(),
        };

        match result {
            Ok(()) => {
                debug!(
                    job = %job_name,
                    run_id = %run_id,
                    step = %self.name,
                    reads = contribution.read_count,
                    writes = contribution.write_count,
                    skips = contribution.skip_count,
                    "step committed"
                );
                Ok(execution)
            }
            Err(error) => {
                warn!(
                    job = %job_name,
                    run_id = %run_id,
                    step = %self.name,
                    kind = error.kind().as_str(),
                    cause = %most_specific_cause(&error),
                    chain = %error_chain(&error),
                    "step failed; transaction rolled back"
                );
                execution.status = StepStatus::Failed;
                Err(StepFailure { execution, error })
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::FailureKind;
    use crate::store::{InMemoryLedgerDatabase, RunningBalanceStore, Transaction};
    use ledgerbatch_core::AccountId;

    fn business_date() -> BusinessDate {
        BusinessDate::from_ymd(2024, 1, 1).unwrap()
    }

    fn stage_empty_balances(
        _: &StepContext,
        tx: &mut Transaction,
        c: &mut StepContribution,
    ) -> Result<(), TaskletError> {
        tx.replace_running_balances(AccountId::from_u128(1), Vec::new());
        c.increment_write(1);
        Ok(())
    }

    #[test]
    fn successful_tasklet_commits() {
        let db = InMemoryLedgerDatabase::new();
        let step = Step::new("stage", stage_empty_balances);

        let execution = step.execute("job", RunId(1), business_date(), &db).unwrap();

        assert_eq!(execution.status, StepStatus::Completed);
        assert_eq!(execution.contribution.write_count, 1);
        assert_eq!(db.commit_count().unwrap(), 1);
    }

    #[test]
    fn failing_tasklet_rolls_back() {
        let db = InMemoryLedgerDatabase::new();
        let id = AccountId::from_u128(5);
        let step = Step::new(
            "explode",
            move |_: &StepContext,
                  tx: &mut Transaction,
                  _: &mut StepContribution|
                  -> Result<(), TaskletError> {
                tx.replace_running_balances(id, Vec::new());
                Err(TaskletError::failed("boom"))
            },
        );

        let failure = step
            .execute("job", RunId(1), business_date(), &db)
            .unwrap_err();

        assert_eq!(failure.execution.status, StepStatus::Failed);
        assert_eq!(failure.error.kind(), FailureKind::Other);
        assert_eq!(db.commit_count().unwrap(), 0);
        assert!(db.running_balances(id).unwrap().is_empty());
    }

    #[test]
    fn panicking_tasklet_fails_the_step() {
        let db = InMemoryLedgerDatabase::new();
        let id = AccountId::from_u128(6);
        let step = Step::new(
            "index",
            move |_: &StepContext,
                  tx: &mut Transaction,
                  _: &mut StepContribution|
                  -> Result<(), TaskletError> {
                tx.replace_running_balances(id, Vec::new());
                let empty: Vec<u64> = Vec::new();
                let _ = empty[0];
                Ok(())
            },
        );

        let failure = step
            .execute("job", RunId(1), business_date(), &db)
            .unwrap_err();

        assert_eq!(failure.execution.status, StepStatus::Failed);
        assert_eq!(failure.error.kind(), FailureKind::Other);
        assert!(failure.error.to_string().starts_with("tasklet panicked"));
        assert_eq!(db.commit_count().unwrap(), 0);
    }

    #[test]
    fn tasklet_sees_its_context() {
        let db = InMemoryLedgerDatabase::new();
        let step = Step::new(
            "ctx",
            |ctx: &StepContext, _: &mut Transaction, _: &mut StepContribution| {
                if ctx.job_name == "job" && ctx.step_name == "ctx" && ctx.run_id == RunId(7) {
                    Ok(())
                } else {
                    Err(TaskletError::failed("unexpected context"))
                }
            },
        );

        assert!(step.execute("job", RunId(7), business_date(), &db).is_ok());
    }
}
