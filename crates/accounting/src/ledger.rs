//! Ledger entries and running-balance recomputation.
//!
//! Running balances are derived data. They are recomputed from the full,
//! ordered entry sequence of an account on every run and overwritten as a
//! whole, never patched incrementally.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ledgerbatch_core::AccountId;

/// Position of an entry within an account's ledger.
///
/// Ordering is `(posted_date, sequence_number)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryKey {
    pub posted_date: NaiveDate,
    pub sequence_number: u64,
}

impl EntryKey {
    pub fn new(posted_date: NaiveDate, sequence_number: u64) -> Self {
        Self {
            posted_date,
            sequence_number,
        }
    }
}

impl core::fmt::Display for EntryKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}#{}", self.posted_date, self.sequence_number)
    }
}

/// A posted ledger entry (immutable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub account_id: AccountId,
    /// Signed amount: credits positive, debits negative.
    pub amount: Decimal,
    pub posted_date: NaiveDate,
    pub sequence_number: u64,
}

impl LedgerEntry {
    pub fn new(
        account_id: AccountId,
        amount: Decimal,
        posted_date: NaiveDate,
        sequence_number: u64,
    ) -> Self {
        Self {
            account_id,
            amount,
            posted_date,
            sequence_number,
        }
    }

    pub fn key(&self) -> EntryKey {
        EntryKey::new(self.posted_date, self.sequence_number)
    }
}

/// Cumulative balance of an account right after `as_of_entry`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningBalance {
    pub account_id: AccountId,
    pub as_of_entry: EntryKey,
    pub balance: Decimal,
}

/// The entry sequence handed to [`recompute`] is not a valid ledger.
///
/// This points at a data-integrity problem upstream and is not recoverable
/// by the recomputation itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InconsistentLedgerError {
    #[error("duplicate ledger entry {key} for account {account_id}")]
    DuplicateEntry { account_id: AccountId, key: EntryKey },

    #[error("ledger entries out of order for account {account_id}: {previous} followed by {found}")]
    OutOfOrder {
        account_id: AccountId,
        previous: EntryKey,
        found: EntryKey,
    },

    #[error("entry of account {found} found in the ledger sequence of account {expected}")]
    MixedAccounts {
        expected: AccountId,
        found: AccountId,
    },

    #[error("running balance overflow for account {account_id} at entry {key}")]
    BalanceOverflow { account_id: AccountId, key: EntryKey },
}

/// Check that `entries` belong to one account and are strictly increasing by
/// `(posted_date, sequence_number)`.
pub fn validate_ordering(entries: &[LedgerEntry]) -> Result<(), InconsistentLedgerError> {
    let Some(first) = entries.first() else {
        return Ok(());
    };
    let account_id = first.account_id;

    for pair in entries.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.account_id != account_id {
            return Err(InconsistentLedgerError::MixedAccounts {
                expected: account_id,
                found: next.account_id,
            });
        }
        match prev.key().cmp(&next.key()) {
            core::cmp::Ordering::Less => {}
            core::cmp::Ordering::Equal => {
                return Err(InconsistentLedgerError::DuplicateEntry {
                    account_id,
                    key: next.key(),
                });
            }
            core::cmp::Ordering::Greater => {
                return Err(InconsistentLedgerError::OutOfOrder {
                    account_id,
                    previous: prev.key(),
                    found: next.key(),
                });
            }
        }
    }

    Ok(())
}

/// Recompute the running balances of one account from scratch.
///
/// Produces one [`RunningBalance`] per entry, folding each amount into a sum
/// that starts at `opening_balance` (zero when absent). Pure and
/// deterministic: the same input always yields the same output.
pub fn recompute(
    entries: &[LedgerEntry],
    opening_balance: Option<Decimal>,
) -> Result<Vec<RunningBalance>, InconsistentLedgerError> {
    validate_ordering(entries)?;

    let mut balance = opening_balance.unwrap_or(Decimal::ZERO);
    let mut out = Vec::with_capacity(entries.len());

    for entry in entries {
        balance = balance.checked_add(entry.amount).ok_or(
            InconsistentLedgerError::BalanceOverflow {
                account_id: entry.account_id,
                key: entry.key(),
            },
        )?;
        out.push(RunningBalance {
            account_id: entry.account_id,
            as_of_entry: entry.key(),
            balance,
        });
    }

    Ok(out)
}
