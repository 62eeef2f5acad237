//! Tasklet: a single idempotent unit of batch work.

use thiserror::Error;

use ledgerbatch_accounting::InconsistentLedgerError;
use ledgerbatch_core::{AccountId, BusinessDate};

use super::types::{FailureKind, RunId, StepContribution};
use crate::store::{StoreError, Transaction};

/// What a tasklet knows about the invocation it runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    pub job_name: String,
    pub step_name: String,
    pub run_id: RunId,
    pub business_date: BusinessDate,
}

#[derive(Debug, Error)]
pub enum TaskletError {
    #[error("inconsistent ledger")]
    InconsistentLedger(#[from] InconsistentLedgerError),

    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("transaction conflict")]
    TransactionConflict(#[source] StoreError),

    #[error("storage failure")]
    Storage(#[source] StoreError),

    #[error("{0}")]
    Failed(String),
}

impl TaskletError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            TaskletError::InconsistentLedger(_) => FailureKind::InconsistentLedger,
            TaskletError::AccountNotFound(_) => FailureKind::AccountNotFound,
            TaskletError::TransactionConflict(_) => FailureKind::TransactionConflict,
            TaskletError::Storage(_) => FailureKind::Storage,
            TaskletError::Failed(_) => FailureKind::Other,
        }
    }
}

impl From<StoreError> for TaskletError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(id) => TaskletError::AccountNotFound(id),
            e @ StoreError::TransactionConflict { .. } => TaskletError::TransactionConflict(e),
            e => TaskletError::Storage(e),
        }
    }
}

/// A unit of work executed by a step inside one transaction.
///
/// Implementations stage every mutation in `tx`. The step commits `tx` when
/// `execute` returns `Ok` and discards it otherwise, so a tasklet never needs
/// to undo anything itself. Tasklets must be safe to run again over the same
/// input.
pub trait Tasklet: Send + Sync {
    fn execute(
        &self,
        ctx: &StepContext,
        tx: &mut Transaction,
        contribution: &mut StepContribution,
    ) -> Result<(), TaskletError>;
}

impl<F> Tasklet for F
where
    F: Fn(&StepContext, &mut Transaction, &mut StepContribution) -> Result<(), TaskletError>
        + Send
        + Sync,
{
    fn execute(
        &self,
        ctx: &StepContext,
        tx: &mut Transaction,
        contribution: &mut StepContribution,
    ) -> Result<(), TaskletError> {
        self(ctx, tx, contribution)
    }
}
