//! Recomputes the running balances of every account that has ledger entries.
//! Accounts left with no entries as of the run's date are cleared.

use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use ledgerbatch_accounting::{recompute, RunningBalance};
use ledgerbatch_core::{AccountId, BusinessDate};

use crate::jobs::tasklet::{StepContext, Tasklet, TaskletError};
use crate::jobs::types::StepContribution;
use crate::store::{LedgerSnapshot, RunningBalanceStore, Transaction};

/// Rebuilds running balances from the ledger as of the run's business date.
///
/// Every account's set is recomputed from scratch and staged as a whole, so
/// rerunning over the same ledger stages the same result. With more than one
/// worker the accounts are split across scoped threads; all of them finish
/// before anything is staged.
///
/// A stored set for an account with no entries on or before the business
/// date (a back-dated run) is staged as empty, so the committed table always
/// reflects a single as-of date.
pub struct RunningBalanceUpdateTasklet {
    ledger: Arc<dyn LedgerSnapshot>,
    balances: Arc<dyn RunningBalanceStore>,
    workers: usize,
}

impl RunningBalanceUpdateTasklet {
    pub fn new(ledger: Arc<dyn LedgerSnapshot>, balances: Arc<dyn RunningBalanceStore>) -> Self {
        Self {
            ledger,
            balances,
            workers: 1,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    fn recompute_account(
        &self,
        account_id: AccountId,
        as_of: BusinessDate,
    ) -> Result<Vec<RunningBalance>, TaskletError> {
        let entries = self.ledger.fetch_entries(account_id, as_of)?;
        let opening = self.ledger.opening_balance(account_id)?;
        recompute(&entries, opening).map_err(|e| {
            warn!(account_id = %account_id, error = %e, "ledger cannot be recomputed");
            TaskletError::from(e)
        })
    }

    fn recompute_all(
        &self,
        ids: &[AccountId],
        as_of: BusinessDate,
    ) -> Result<Vec<(AccountId, Vec<RunningBalance>)>, TaskletError> {
        let recompute_chunk = |chunk: &[AccountId]| {
            chunk
                .iter()
                .map(|&id| self.recompute_account(id, as_of).map(|set| (id, set)))
                .collect::<Result<Vec<_>, TaskletError>>()
        };

        if self.workers <= 1 || ids.len() < 2 {
            return recompute_chunk(ids);
        }

        let chunk_size = ids.len().div_ceil(self.workers);
        thread::scope(|scope| {
            let handles: Vec<_> = ids
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || recompute_chunk(chunk)))
                .collect();

            let mut out = Vec::with_capacity(ids.len());
            for handle in handles {
                let part = handle
                    .join()
                    .map_err(|_| TaskletError::failed("running balance worker panicked"))??;
                out.extend(part);
            }
            Ok(out)
        })
    }
}

impl Tasklet for RunningBalanceUpdateTasklet {
    fn execute(
        &self,
        ctx: &StepContext,
        tx: &mut Transaction,
        contribution: &mut StepContribution,
    ) -> Result<(), TaskletError> {
        let ids = self.ledger.accounts_with_entries(ctx.business_date)?;
        contribution.increment_read(ids.len() as u64);

        let recomputed = self.recompute_all(&ids, ctx.business_date)?;
        for (account_id, balances) in recomputed {
            debug!(
                account_id = %account_id,
                entries = balances.len(),
                "running balances recomputed"
            );
            tx.replace_running_balances(account_id, balances);
            contribution.increment_write(1);
        }

        for account_id in self.balances.accounts_with_running_balances()? {
            if !tx.staged_running_balances().contains_key(&account_id) {
                debug!(account_id = %account_id, "no entries as of business date; clearing");
                tx.replace_running_balances(account_id, Vec::new());
                contribution.increment_write(1);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::{FailureKind, RunId};
    use crate::store::{InMemoryLedgerDatabase, RunningBalanceStore, TransactionManager};
    use chrono::NaiveDate;
    use ledgerbatch_accounting::LedgerEntry;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ctx(as_of: NaiveDate) -> StepContext {
        StepContext {
            job_name: "job".to_string(),
            step_name: "step".to_string(),
            run_id: RunId(1),
            business_date: BusinessDate::new(as_of),
        }
    }

    fn seeded(accounts: u128) -> Arc<InMemoryLedgerDatabase> {
        let db = InMemoryLedgerDatabase::arc();
        for n in 1..=accounts {
            let id = AccountId::from_u128(n);
            db.post_entry(LedgerEntry::new(id, Decimal::new(100, 0), date(2024, 1, 1), 1))
                .unwrap();
            db.post_entry(LedgerEntry::new(id, Decimal::new(-30, 0), date(2024, 1, 5), 2))
                .unwrap();
        }
        db
    }

    fn tasklet(db: Arc<InMemoryLedgerDatabase>) -> RunningBalanceUpdateTasklet {
        RunningBalanceUpdateTasklet::new(db.clone(), db)
    }

    fn run(tasklet: &RunningBalanceUpdateTasklet, as_of: NaiveDate) -> (Transaction, StepContribution) {
        let mut tx = Transaction::new();
        let mut contribution = StepContribution::default();
        tasklet.execute(&ctx(as_of), &mut tx, &mut contribution).unwrap();
        (tx, contribution)
    }

    #[test]
    fn stages_recomputed_balances() {
        let tasklet = tasklet(seeded(1));

        let (tx, contribution) = run(&tasklet, date(2024, 1, 31));

        let staged = &tx.staged_running_balances()[&AccountId::from_u128(1)];
        let balances: Vec<Decimal> = staged.iter().map(|b| b.balance).collect();
        assert_eq!(balances, vec![Decimal::new(100, 0), Decimal::new(70, 0)]);
        assert_eq!(contribution.read_count, 1);
        assert_eq!(contribution.write_count, 1);
    }

    #[test]
    fn respects_as_of_date() {
        let tasklet = tasklet(seeded(1));

        let (tx, _) = run(&tasklet, date(2024, 1, 2));

        let staged = &tx.staged_running_balances()[&AccountId::from_u128(1)];
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].balance, Decimal::new(100, 0));
    }

    #[test]
    fn opening_balance_is_carried() {
        let db = seeded(1);
        db.set_opening_balance(AccountId::from_u128(1), Decimal::new(5, 0))
            .unwrap();
        let tasklet = tasklet(db);

        let (tx, _) = run(&tasklet, date(2024, 1, 31));

        let staged = &tx.staged_running_balances()[&AccountId::from_u128(1)];
        assert_eq!(staged[1].balance, Decimal::new(75, 0));
    }

    #[test]
    fn workers_produce_the_same_result() {
        let db = seeded(25);
        let sequential = tasklet(db.clone());
        let parallel = tasklet(db).with_workers(4);

        let (a, _) = run(&sequential, date(2024, 1, 31));
        let (b, contribution) = run(&parallel, date(2024, 1, 31));

        assert_eq!(a.staged_running_balances(), b.staged_running_balances());
        assert_eq!(contribution.write_count, 25);
    }

    #[test]
    fn duplicate_entry_fails_without_staging() {
        let db = seeded(3);
        db.post_entry(LedgerEntry::new(
            AccountId::from_u128(2),
            Decimal::ONE,
            date(2024, 1, 5),
            2,
        ))
        .unwrap();
        let tasklet = tasklet(db).with_workers(2);

        let mut tx = Transaction::new();
        let mut contribution = StepContribution::default();
        let err = tasklet
            .execute(&ctx(date(2024, 1, 31)), &mut tx, &mut contribution)
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::InconsistentLedger);
        assert!(tx.is_empty());
    }

    #[test]
    fn clears_accounts_without_entries_as_of_date() {
        let db = seeded(1);
        let later = AccountId::from_u128(2);
        db.post_entry(LedgerEntry::new(later, Decimal::new(100, 0), date(2024, 1, 10), 1))
            .unwrap();
        let tasklet = tasklet(db.clone());
        let (tx, _) = run(&tasklet, date(2024, 1, 31));
        db.commit(tx).unwrap();

        let (tx, contribution) = run(&tasklet, date(2024, 1, 2));

        assert!(tx.staged_running_balances()[&later].is_empty());
        assert_eq!(tx.staged_running_balances()[&AccountId::from_u128(1)].len(), 1);
        assert_eq!(contribution.read_count, 1);
        assert_eq!(contribution.write_count, 2);
    }

    #[test]
    fn zero_workers_means_one() {
        let tasklet = tasklet(seeded(1)).with_workers(0);
        assert_eq!(tasklet.workers(), 1);
    }

    /// `(account, day offset, amount)`; the position doubles as sequence number.
    fn posting_batches() -> impl Strategy<Value = Vec<(u128, u64, i64)>> {
        prop::collection::vec((1u128..=5, 0u64..60, -1_000i64..1_000), 0..40)
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Whatever order runs happen in, the committed table matches the
        /// ledger as of the last run's date.
        #[test]
        fn committed_table_follows_the_last_as_of_date(
            postings in posting_batches(),
            first_day in 0u64..60,
            second_day in 0u64..60,
            workers in 1usize..4,
        ) {
            let start = date(2024, 1, 1);
            let db = InMemoryLedgerDatabase::arc();
            for (seq, (account, day, amount)) in postings.iter().enumerate() {
                db.post_entry(LedgerEntry::new(
                    AccountId::from_u128(*account),
                    Decimal::new(*amount, 2),
                    start.checked_add_days(chrono::Days::new(*day)).unwrap(),
                    seq as u64,
                ))
                .unwrap();
            }
            let tasklet = tasklet(db.clone()).with_workers(workers);

            for day in [first_day, second_day] {
                let as_of = start.checked_add_days(chrono::Days::new(day)).unwrap();
                let (tx, _) = run(&tasklet, as_of);
                db.commit(tx).unwrap();
            }

            let as_of = start.checked_add_days(chrono::Days::new(second_day)).unwrap();
            for account in 1u128..=5 {
                let id = AccountId::from_u128(account);
                let expected = postings
                    .iter()
                    .filter(|(a, day, _)| *a == account && *day <= second_day)
                    .count();
                let stored = db.running_balances(id).unwrap();
                prop_assert_eq!(stored.len(), expected);
                prop_assert!(stored.iter().all(|b| b.as_of_entry.posted_date <= as_of));
            }
        }
    }
}
