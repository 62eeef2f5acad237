//! Concrete tasklets and the jobs built from them.

use std::sync::Arc;

use ledgerbatch_accounting::AccountEligibilityClassifier;

use super::job::{Job, JobDefinitionError};
use super::step::Step;
use crate::store::{AccountStore, LedgerSnapshot, RunningBalanceStore, TransactionManager};

pub mod dormancy;
pub mod running_balance;

pub use dormancy::{AccountScope, DormantAccountsTasklet};
pub use running_balance::RunningBalanceUpdateTasklet;

pub const RUNNING_BALANCE_JOB: &str = "update_account_running_balances";
pub const RUNNING_BALANCE_STEP: &str = "account_running_balance_update_step";

pub const DORMANT_ACCOUNTS_JOB: &str = "update_savings_dormant_accounts";
pub const DORMANT_ACCOUNTS_STEP: &str = "update_savings_dormant_accounts_step";

/// Single-step job that rebuilds every account's running balances.
pub fn running_balance_job(
    ledger: Arc<dyn LedgerSnapshot>,
    balances: Arc<dyn RunningBalanceStore>,
    transactions: Arc<dyn TransactionManager>,
    workers: usize,
) -> Result<Job, JobDefinitionError> {
    Job::builder(RUNNING_BALANCE_JOB, transactions)
        .start(Step::new(
            RUNNING_BALANCE_STEP,
            RunningBalanceUpdateTasklet::new(ledger, balances).with_workers(workers),
        ))
        .build()
}

/// Single-step job that marks inactive savings accounts dormant.
pub fn dormant_accounts_job(
    accounts: Arc<dyn AccountStore>,
    transactions: Arc<dyn TransactionManager>,
    inactivity_threshold_days: u32,
) -> Result<Job, JobDefinitionError> {
    Job::builder(DORMANT_ACCOUNTS_JOB, transactions)
        .start(Step::new(
            DORMANT_ACCOUNTS_STEP,
            DormantAccountsTasklet::new(
                accounts,
                AccountEligibilityClassifier::new(inactivity_threshold_days),
            ),
        ))
        .build()
}
