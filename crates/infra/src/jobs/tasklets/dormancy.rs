//! Moves long-inactive savings accounts to `Dormant`.

use std::sync::Arc;

use tracing::{debug, warn};

use ledgerbatch_accounting::{AccountEligibilityClassifier, AccountStatus, Classification};
use ledgerbatch_core::AccountId;

use crate::jobs::tasklet::{StepContext, Tasklet, TaskletError};
use crate::jobs::types::StepContribution;
use crate::store::{AccountStore, StoreError, Transaction};

/// Which accounts a dormancy pass looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountScope {
    /// Every account currently `Active`.
    AllActive,
    /// Exactly these accounts, in this order.
    Only(Vec<AccountId>),
}

/// Classifies accounts as of the run's business date and stages one lattice
/// step for each account that qualifies.
///
/// An account that cannot be found is logged and counted as a skip; the
/// remaining accounts still commit. Any other store error fails the step.
pub struct DormantAccountsTasklet {
    accounts: Arc<dyn AccountStore>,
    classifier: AccountEligibilityClassifier,
    scope: AccountScope,
}

impl DormantAccountsTasklet {
    pub fn new(accounts: Arc<dyn AccountStore>, classifier: AccountEligibilityClassifier) -> Self {
        Self {
            accounts,
            classifier,
            scope: AccountScope::AllActive,
        }
    }

    pub fn with_scope(mut self, scope: AccountScope) -> Self {
        self.scope = scope;
        self
    }

    fn candidates(&self) -> Result<Vec<AccountId>, StoreError> {
        match &self.scope {
            AccountScope::AllActive => self.accounts.account_ids_with_status(AccountStatus::Active),
            AccountScope::Only(ids) => Ok(ids.clone()),
        }
    }
}

impl Tasklet for DormantAccountsTasklet {
    fn execute(
        &self,
        ctx: &StepContext,
        tx: &mut Transaction,
        contribution: &mut StepContribution,
    ) -> Result<(), TaskletError> {
        for account_id in self.candidates()? {
            let account = match self.accounts.fetch_account(account_id) {
                Ok(account) => account,
                Err(StoreError::AccountNotFound(_)) => {
                    warn!(
                        run_id = %ctx.run_id,
                        account_id = %account_id,
                        "account not found; skipped"
                    );
                    contribution.increment_skip();
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            contribution.increment_read(1);

            if let Classification::Transition(to) =
                self.classifier.classify(&account, ctx.business_date)
            {
                tx.apply_status_change(account_id, account.status, to)?;
                contribution.increment_write(1);
                debug!(
                    account_id = %account_id,
                    from = %account.status,
                    to = %to,
                    last_activity = %account.last_activity_date,
                    "status change staged"
                );
            }
        }
        Ok(())
    }
}
