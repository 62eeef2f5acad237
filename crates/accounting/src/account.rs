//! Accounts and the dormancy eligibility rule.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use ledgerbatch_core::{AccountId, BusinessDate};

/// Lifecycle status of an account.
///
/// `Active → Dormant → Escheated` is the maintenance lattice; batch jobs only
/// ever move an account forward along it, one step at a time. `Closed` sits
/// outside the lattice and is never touched by maintenance jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Dormant,
    Escheated,
    Closed,
}

impl AccountStatus {
    /// The next status along the maintenance lattice, if any.
    pub fn successor(self) -> Option<AccountStatus> {
        match self {
            AccountStatus::Active => Some(AccountStatus::Dormant),
            AccountStatus::Dormant => Some(AccountStatus::Escheated),
            AccountStatus::Escheated | AccountStatus::Closed => None,
        }
    }

    /// True when `to` is exactly one step forward from `self`.
    pub fn can_transition_to(self, to: AccountStatus) -> bool {
        self.successor() == Some(to)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Dormant => "dormant",
            AccountStatus::Escheated => "escheated",
            AccountStatus::Closed => "closed",
        }
    }
}

impl core::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub status: AccountStatus,
    pub last_activity_date: NaiveDate,
}

impl Account {
    pub fn new(account_id: AccountId, status: AccountStatus, last_activity_date: NaiveDate) -> Self {
        Self {
            account_id,
            status,
            last_activity_date,
        }
    }
}

/// Outcome of classifying one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "status")]
pub enum Classification {
    /// Move the account to this status (always one lattice step).
    Transition(AccountStatus),
    NoChange,
}

/// Decides whether an account becomes dormant as of a business date.
///
/// An `Active` account whose inactivity (`business_date - last_activity_date`)
/// reaches the threshold becomes `Dormant`. The threshold is inclusive.
/// Every other account is left unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountEligibilityClassifier {
    inactivity_threshold_days: u32,
}

impl AccountEligibilityClassifier {
    pub fn new(inactivity_threshold_days: u32) -> Self {
        Self {
            inactivity_threshold_days,
        }
    }

    pub fn inactivity_threshold_days(&self) -> u32 {
        self.inactivity_threshold_days
    }

    pub fn classify(&self, account: &Account, business_date: BusinessDate) -> Classification {
        if account.status != AccountStatus::Active {
            return Classification::NoChange;
        }

        // Activity stamped after the business date counts as none elapsed.
        let inactive_days = business_date.days_since(account.last_activity_date).max(0);
        if inactive_days >= i64::from(self.inactivity_threshold_days) {
            Classification::Transition(AccountStatus::Dormant)
        } else {
            Classification::NoChange
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn account(status: AccountStatus, last_activity: NaiveDate) -> Account {
        Account::new(AccountId::from_u128(7), status, last_activity)
    }

    #[test]
    fn inactive_account_becomes_dormant() {
        let classifier = AccountEligibilityClassifier::new(300);
        let acct = account(AccountStatus::Active, date(2023, 1, 1));
        let bd = BusinessDate::from_ymd(2024, 1, 1).unwrap();

        assert_eq!(
            classifier.classify(&acct, bd),
            Classification::Transition(AccountStatus::Dormant)
        );
    }

    #[test]
    fn threshold_is_inclusive() {
        let classifier = AccountEligibilityClassifier::new(30);
        let bd = BusinessDate::from_ymd(2024, 3, 31).unwrap();

        let on_boundary = account(AccountStatus::Active, date(2024, 3, 1));
        assert_eq!(bd.days_since(on_boundary.last_activity_date), 30);
        assert_eq!(
            classifier.classify(&on_boundary, bd),
            Classification::Transition(AccountStatus::Dormant)
        );

        let one_day_short = account(AccountStatus::Active, date(2024, 3, 2));
        assert_eq!(classifier.classify(&one_day_short, bd), Classification::NoChange);
    }

    #[test]
    fn future_activity_counts_as_recent() {
        let classifier = AccountEligibilityClassifier::new(0);
        let acct = account(AccountStatus::Active, date(2024, 6, 1));
        let bd = BusinessDate::from_ymd(2024, 1, 1).unwrap();
        // Zero threshold: even "no inactivity" qualifies.
        assert_eq!(
            classifier.classify(&acct, bd),
            Classification::Transition(AccountStatus::Dormant)
        );

        let classifier = AccountEligibilityClassifier::new(1);
        assert_eq!(classifier.classify(&acct, bd), Classification::NoChange);
    }

    #[test]
    fn closed_and_escheated_accounts_are_untouched() {
        let classifier = AccountEligibilityClassifier::new(1);
        let bd = BusinessDate::from_ymd(2030, 1, 1).unwrap();
        for status in [AccountStatus::Escheated, AccountStatus::Closed] {
            let acct = account(status, date(2000, 1, 1));
            assert_eq!(classifier.classify(&acct, bd), Classification::NoChange);
        }
    }

    #[test]
    fn lattice_only_moves_one_step() {
        assert!(AccountStatus::Active.can_transition_to(AccountStatus::Dormant));
        assert!(AccountStatus::Dormant.can_transition_to(AccountStatus::Escheated));
        assert!(!AccountStatus::Active.can_transition_to(AccountStatus::Escheated));
        assert!(!AccountStatus::Dormant.can_transition_to(AccountStatus::Active));
        assert!(!AccountStatus::Closed.can_transition_to(AccountStatus::Dormant));
    }

    #[test]
    fn classification_serializes_with_kind_tag() {
        let json = serde_json::to_value(Classification::Transition(AccountStatus::Dormant)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "transition", "status": "dormant"}));
    }

    fn any_status() -> impl Strategy<Value = AccountStatus> {
        prop_oneof![
            Just(AccountStatus::Active),
            Just(AccountStatus::Dormant),
            Just(AccountStatus::Escheated),
            Just(AccountStatus::Closed),
        ]
    }

    proptest! {
        /// A dormant account never changes, whatever the business date.
        #[test]
        fn dormant_is_always_no_change(offset in -20_000i64..20_000, threshold in 0u32..5_000) {
            let classifier = AccountEligibilityClassifier::new(threshold);
            let acct = account(AccountStatus::Dormant, date(2020, 1, 1));
            let bd = BusinessDate::new(date(2020, 1, 1) + chrono::Duration::days(offset));
            prop_assert_eq!(classifier.classify(&acct, bd), Classification::NoChange);
        }

        /// Any transition produced is a single lattice step from the current status.
        #[test]
        fn transitions_are_single_steps(
            status in any_status(),
            offset in -2_000i64..2_000,
            threshold in 0u32..1_000,
        ) {
            let classifier = AccountEligibilityClassifier::new(threshold);
            let acct = account(status, date(2022, 6, 15));
            let bd = BusinessDate::new(date(2022, 6, 15) + chrono::Duration::days(offset));
            if let Classification::Transition(next) = classifier.classify(&acct, bd) {
                prop_assert!(status.can_transition_to(next));
            }
        }
    }
}
