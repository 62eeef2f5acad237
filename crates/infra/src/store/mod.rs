//! Storage seams used by batch jobs.
//!
//! Jobs read through [`LedgerSnapshot`], [`AccountStore`] and
//! [`RunningBalanceStore`], and write exclusively through a [`Transaction`]
//! handed out by a [`TransactionManager`]. Nothing staged in a transaction is
//! visible to readers until `commit` succeeds; dropping a transaction
//! discards it.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;

use ledgerbatch_accounting::{Account, AccountStatus, LedgerEntry, RunningBalance};
use ledgerbatch_core::{AccountId, BusinessDate};

pub mod in_memory;

pub use in_memory::InMemoryLedgerDatabase;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    #[error(
        "transaction conflict on account {account_id}: expected status {expected}, found {found}"
    )]
    TransactionConflict {
        account_id: AccountId,
        expected: AccountStatus,
        found: AccountStatus,
    },

    #[error("illegal status transition for account {account_id}: {from} -> {to}")]
    IllegalTransition {
        account_id: AccountId,
        from: AccountStatus,
        to: AccountStatus,
    },

    #[error("storage error: {0}")]
    Storage(String),
}

/// Read-only view of posted ledger entries.
pub trait LedgerSnapshot: Send + Sync {
    /// Entries of `account_id` posted on or before `as_of`, ordered by
    /// `(posted_date, sequence_number)`.
    ///
    /// Duplicates are returned as stored; detecting them is the caller's job.
    fn fetch_entries(
        &self,
        account_id: AccountId,
        as_of: BusinessDate,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Accounts with at least one entry posted on or before `as_of`.
    fn accounts_with_entries(&self, as_of: BusinessDate) -> Result<Vec<AccountId>, StoreError>;

    /// Balance carried into the ledger before its first entry, if any.
    fn opening_balance(&self, account_id: AccountId) -> Result<Option<Decimal>, StoreError>;
}

pub trait AccountStore: Send + Sync {
    fn fetch_account(&self, account_id: AccountId) -> Result<Account, StoreError>;

    fn account_ids_with_status(&self, status: AccountStatus)
    -> Result<Vec<AccountId>, StoreError>;
}

/// Read side of the derived running-balance table.
pub trait RunningBalanceStore: Send + Sync {
    fn running_balances(&self, account_id: AccountId) -> Result<Vec<RunningBalance>, StoreError>;

    /// Accounts with a non-empty stored running-balance set.
    fn accounts_with_running_balances(&self) -> Result<Vec<AccountId>, StoreError>;
}

/// Hands out and commits [`Transaction`]s.
pub trait TransactionManager: Send + Sync {
    fn begin(&self) -> Result<Transaction, StoreError>;

    /// Apply every staged write atomically, or none of them.
    fn commit(&self, tx: Transaction) -> Result<(), StoreError>;
}

/// A status change staged in a transaction.
///
/// `from` is the status the change was decided against; commit fails with
/// [`StoreError::TransactionConflict`] if the stored status moved meanwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: AccountStatus,
    pub to: AccountStatus,
}

/// Writes staged by one step execution.
#[derive(Debug, Default)]
pub struct Transaction {
    running_balances: BTreeMap<AccountId, Vec<RunningBalance>>,
    status_changes: BTreeMap<AccountId, StatusChange>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage the complete running-balance set of an account, replacing
    /// whatever is stored for it. An empty set clears the account.
    pub fn replace_running_balances(&mut self, account_id: AccountId, balances: Vec<RunningBalance>) {
        self.running_balances.insert(account_id, balances);
    }

    /// Stage a single lattice step for an account.
    pub fn apply_status_change(
        &mut self,
        account_id: AccountId,
        from: AccountStatus,
        to: AccountStatus,
    ) -> Result<(), StoreError> {
        if !from.can_transition_to(to) {
            return Err(StoreError::IllegalTransition {
                account_id,
                from,
                to,
            });
        }
        if let Some(staged) = self.status_changes.get(&account_id) {
            // A second step in the same transaction would skip a lattice state.
            return Err(StoreError::IllegalTransition {
                account_id,
                from: staged.from,
                to,
            });
        }
        self.status_changes.insert(account_id, StatusChange { from, to });
        Ok(())
    }

    pub fn staged_running_balances(&self) -> &BTreeMap<AccountId, Vec<RunningBalance>> {
        &self.running_balances
    }

    pub fn staged_status_changes(&self) -> &BTreeMap<AccountId, StatusChange> {
        &self.status_changes
    }

    pub fn is_empty(&self) -> bool {
        self.running_balances.is_empty() && self.status_changes.is_empty()
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        BTreeMap<AccountId, Vec<RunningBalance>>,
        BTreeMap<AccountId, StatusChange>,
    ) {
        (self.running_balances, self.status_changes)
    }
}

impl<S> LedgerSnapshot for Arc<S>
where
    S: LedgerSnapshot + ?Sized,
{
    fn fetch_entries(
        &self,
        account_id: AccountId,
        as_of: BusinessDate,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).fetch_entries(account_id, as_of)
    }

    fn accounts_with_entries(&self, as_of: BusinessDate) -> Result<Vec<AccountId>, StoreError> {
        (**self).accounts_with_entries(as_of)
    }

    fn opening_balance(&self, account_id: AccountId) -> Result<Option<Decimal>, StoreError> {
        (**self).opening_balance(account_id)
    }
}

impl<S> AccountStore for Arc<S>
where
    S: AccountStore + ?Sized,
{
    fn fetch_account(&self, account_id: AccountId) -> Result<Account, StoreError> {
        (**self).fetch_account(account_id)
    }

    fn account_ids_with_status(
        &self,
        status: AccountStatus,
    ) -> Result<Vec<AccountId>, StoreError> {
        (**self).account_ids_with_status(status)
    }
}

impl<S> RunningBalanceStore for Arc<S>
where
    S: RunningBalanceStore + ?Sized,
{
    fn running_balances(&self, account_id: AccountId) -> Result<Vec<RunningBalance>, StoreError> {
        (**self).running_balances(account_id)
    }

    fn accounts_with_running_balances(&self) -> Result<Vec<AccountId>, StoreError> {
        (**self).accounts_with_running_balances()
    }
}

impl<S> TransactionManager for Arc<S>
where
    S: TransactionManager + ?Sized,
{
    fn begin(&self) -> Result<Transaction, StoreError> {
        (**self).begin()
    }

    fn commit(&self, tx: Transaction) -> Result<(), StoreError> {
        (**self).commit(tx)
    }
}
