//! Accounting module (ledger recomputation, account maintenance rules).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod account;
pub mod ledger;
pub mod loan_summary;

pub use account::{Account, AccountEligibilityClassifier, AccountStatus, Classification};
pub use ledger::{
    EntryKey, InconsistentLedgerError, LedgerEntry, RunningBalance, recompute,
    validate_ordering,
};
pub use loan_summary::{
    LoanBalances, LoanSummary, LoanTransaction, LoanTransactionType, SchedulePeriod,
    TotalOverflow, TransactionTotals,
};
