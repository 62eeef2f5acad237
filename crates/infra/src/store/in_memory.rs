//! In-memory ledger/account database for tests and dev.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rust_decimal::Decimal;

use ledgerbatch_accounting::{Account, AccountStatus, LedgerEntry, RunningBalance};
use ledgerbatch_core::{AccountId, BusinessDate};

use super::{
    AccountStore, LedgerSnapshot, RunningBalanceStore, StoreError, Transaction,
    TransactionManager,
};

#[derive(Debug, Default)]
struct State {
    entries: HashMap<AccountId, Vec<LedgerEntry>>,
    opening_balances: HashMap<AccountId, Decimal>,
    accounts: HashMap<AccountId, Account>,
    running_balances: HashMap<AccountId, Vec<RunningBalance>>,
    commits: u64,
}

/// Single-process ledger database.
///
/// Commits take the write lock for their whole duration, so readers see a
/// transaction either fully applied or not at all.
#[derive(Debug, Default)]
pub struct InMemoryLedgerDatabase {
    inner: RwLock<State>,
}

impl InMemoryLedgerDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Storage("ledger database lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Storage("ledger database lock poisoned".to_string()))
    }

    /// Append a posted entry. No ordering or uniqueness checks happen here.
    pub fn post_entry(&self, entry: LedgerEntry) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.entries.entry(entry.account_id).or_default().push(entry);
        Ok(())
    }

    pub fn set_opening_balance(
        &self,
        account_id: AccountId,
        balance: Decimal,
    ) -> Result<(), StoreError> {
        self.write()?.opening_balances.insert(account_id, balance);
        Ok(())
    }

    pub fn upsert_account(&self, account: Account) -> Result<(), StoreError> {
        self.write()?.accounts.insert(account.account_id, account);
        Ok(())
    }

    /// Number of successfully committed transactions.
    pub fn commit_count(&self) -> Result<u64, StoreError> {
        Ok(self.read()?.commits)
    }
}

impl LedgerSnapshot for InMemoryLedgerDatabase {
    fn fetch_entries(
        &self,
        account_id: AccountId,
        as_of: BusinessDate,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.read()?;
        let mut entries: Vec<LedgerEntry> = state
            .entries
            .get(&account_id)
            .map(|all| {
                all.iter()
                    .filter(|e| e.posted_date <= as_of.date())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        // Stable: duplicates keep their insertion order.
        entries.sort_by_key(LedgerEntry::key);
        Ok(entries)
    }

    fn accounts_with_entries(&self, as_of: BusinessDate) -> Result<Vec<AccountId>, StoreError> {
        let state = self.read()?;
        let mut ids: Vec<AccountId> = state
            .entries
            .iter()
            .filter(|(_, entries)| entries.iter().any(|e| e.posted_date <= as_of.date()))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn opening_balance(&self, account_id: AccountId) -> Result<Option<Decimal>, StoreError> {
        Ok(self.read()?.opening_balances.get(&account_id).copied())
    }
}

impl AccountStore for InMemoryLedgerDatabase {
    fn fetch_account(&self, account_id: AccountId) -> Result<Account, StoreError> {
        self.read()?
            .accounts
            .get(&account_id)
            .cloned()
            .ok_or(StoreError::AccountNotFound(account_id))
    }

    fn account_ids_with_status(
        &self,
        status: AccountStatus,
    ) -> Result<Vec<AccountId>, StoreError> {
        let state = self.read()?;
        let mut ids: Vec<AccountId> = state
            .accounts
            .values()
            .filter(|a| a.status == status)
            .map(|a| a.account_id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}

impl RunningBalanceStore for InMemoryLedgerDatabase {
    fn running_balances(&self, account_id: AccountId) -> Result<Vec<RunningBalance>, StoreError> {
        Ok(self
            .read()?
            .running_balances
            .get(&account_id)
            .cloned()
            .unwrap_or_default())
    }

    fn accounts_with_running_balances(&self) -> Result<Vec<AccountId>, StoreError> {
        let mut ids: Vec<AccountId> = self.read()?.running_balances.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}

impl TransactionManager for InMemoryLedgerDatabase {
    fn begin(&self) -> Result<Transaction, StoreError> {
        Ok(Transaction::new())
    }

    fn commit(&self, tx: Transaction) -> Result<(), StoreError> {
        let (balances, status_changes) = tx.into_parts();
        let mut state = self.write()?;

        // Validate everything before touching anything.
        for (account_id, change) in &status_changes {
            let account = state
                .accounts
                .get(account_id)
                .ok_or(StoreError::AccountNotFound(*account_id))?;
            if account.status != change.from {
                return Err(StoreError::TransactionConflict {
                    account_id: *account_id,
                    expected: change.from,
                    found: account.status,
                });
            }
        }

        for (account_id, change) in status_changes {
            if let Some(account) = state.accounts.get_mut(&account_id) {
                account.status = change.to;
            }
        }
        for (account_id, set) in balances {
            if set.is_empty() {
                state.running_balances.remove(&account_id);
            } else {
                state.running_balances.insert(account_id, set);
            }
        }
        state.commits += 1;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ledgerbatch_accounting::EntryKey;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bd(y: i32, m: u32, d: u32) -> BusinessDate {
        BusinessDate::from_ymd(y, m, d).unwrap()
    }

    #[test]
    fn snapshot_filters_by_as_of_and_sorts() {
        let db = InMemoryLedgerDatabase::new();
        let id = AccountId::from_u128(1);
        db.post_entry(LedgerEntry::new(id, Decimal::new(5, 0), date(2024, 1, 5), 2))
            .unwrap();
        db.post_entry(LedgerEntry::new(id, Decimal::new(1, 0), date(2024, 1, 1), 1))
            .unwrap();
        db.post_entry(LedgerEntry::new(id, Decimal::new(9, 0), date(2024, 2, 1), 3))
            .unwrap();

        let entries = db.fetch_entries(id, bd(2024, 1, 31)).unwrap();
        let keys: Vec<u64> = entries.iter().map(|e| e.sequence_number).collect();
        assert_eq!(keys, vec![1, 2]);

        assert!(db.accounts_with_entries(bd(2023, 12, 31)).unwrap().is_empty());
        assert_eq!(db.accounts_with_entries(bd(2024, 1, 1)).unwrap(), vec![id]);
    }

    #[test]
    fn commit_applies_staged_writes() {
        let db = InMemoryLedgerDatabase::new();
        let id = AccountId::from_u128(1);
        db.upsert_account(Account::new(id, AccountStatus::Active, date(2020, 1, 1)))
            .unwrap();

        let mut tx = db.begin().unwrap();
        tx.apply_status_change(id, AccountStatus::Active, AccountStatus::Dormant)
            .unwrap();
        tx.replace_running_balances(
            id,
            vec![RunningBalance {
                account_id: id,
                as_of_entry: EntryKey::new(date(2024, 1, 1), 1),
                balance: Decimal::ONE,
            }],
        );

        // Nothing visible before commit.
        assert_eq!(db.fetch_account(id).unwrap().status, AccountStatus::Active);
        assert!(db.running_balances(id).unwrap().is_empty());

        db.commit(tx).unwrap();

        assert_eq!(db.fetch_account(id).unwrap().status, AccountStatus::Dormant);
        assert_eq!(db.running_balances(id).unwrap().len(), 1);
        assert_eq!(db.commit_count().unwrap(), 1);
    }

    #[test]
    fn stale_status_change_conflicts_and_applies_nothing() {
        let db = InMemoryLedgerDatabase::new();
        let stale = AccountId::from_u128(1);
        let fresh = AccountId::from_u128(2);
        db.upsert_account(Account::new(stale, AccountStatus::Active, date(2020, 1, 1)))
            .unwrap();
        db.upsert_account(Account::new(fresh, AccountStatus::Active, date(2020, 1, 1)))
            .unwrap();

        let mut tx = db.begin().unwrap();
        tx.apply_status_change(stale, AccountStatus::Active, AccountStatus::Dormant)
            .unwrap();
        tx.apply_status_change(fresh, AccountStatus::Active, AccountStatus::Dormant)
            .unwrap();

        // Someone else moved the account first.
        db.upsert_account(Account::new(stale, AccountStatus::Closed, date(2020, 1, 1)))
            .unwrap();

        let err = db.commit(tx).unwrap_err();
        assert!(matches!(err, StoreError::TransactionConflict { .. }));
        assert_eq!(db.fetch_account(fresh).unwrap().status, AccountStatus::Active);
        assert_eq!(db.commit_count().unwrap(), 0);
    }

    #[test]
    fn dropped_transaction_leaves_no_trace() {
        let db = InMemoryLedgerDatabase::new();
        let id = AccountId::from_u128(3);
        {
            let mut tx = db.begin().unwrap();
            tx.replace_running_balances(id, Vec::new());
        }
        assert_eq!(db.commit_count().unwrap(), 0);
        assert!(matches!(
            db.fetch_account(id),
            Err(StoreError::AccountNotFound(_))
        ));
    }
}
