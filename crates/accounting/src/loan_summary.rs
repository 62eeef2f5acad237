//! Loan summary aggregation.
//!
//! A [`LoanSummary`] is an immutable record: the balances reported by the
//! loan itself plus totals folded from its transaction history and repayment
//! schedule. Totals are computed once at construction; there is no mutable
//! accumulation exposed to callers.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ledgerbatch_core::BusinessDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanTransactionType {
    Disbursement,
    Repayment,
    DownPayment,
    MerchantIssuedRefund,
    PayoutRefund,
    GoodwillCredit,
    ChargeAdjustment,
    Chargeback,
    CreditBalanceRefund,
    InterestPaymentWaiver,
    Accrual,
    WriteOff,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTransaction {
    pub kind: LoanTransactionType,
    pub amount: Decimal,
    pub reversed_on: Option<NaiveDate>,
}

impl LoanTransaction {
    pub fn new(kind: LoanTransactionType, amount: Decimal) -> Self {
        Self {
            kind,
            amount,
            reversed_on: None,
        }
    }

    pub fn reversed(mut self, on: NaiveDate) -> Self {
        self.reversed_on = Some(on);
        self
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed_on.is_some()
    }
}

/// One installment of a repayment schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePeriod {
    /// 1-based installment number; `None` for non-installment rows
    /// (e.g. the disbursement row).
    pub period: Option<u32>,
    pub from_date: NaiveDate,
    pub due_date: NaiveDate,
    pub down_payment: bool,
    pub total_accrued_interest: Decimal,
    pub interest_paid: Decimal,
}

impl SchedulePeriod {
    /// The installment the business date currently falls in.
    ///
    /// The first installment includes its start date; later ones start the
    /// day after the previous due date.
    fn is_actual(&self, business_date: NaiveDate) -> bool {
        match self.period {
            Some(1) => business_date >= self.from_date && business_date < self.due_date,
            Some(_) => business_date > self.from_date && business_date < self.due_date,
            None => false,
        }
    }
}

/// Balances as reported by the loan account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanBalances {
    pub currency_code: String,
    pub principal_disbursed: Decimal,
    pub principal_adjustments: Decimal,
    pub principal_paid: Decimal,
    pub principal_written_off: Decimal,
    pub principal_outstanding: Decimal,
    pub principal_overdue: Decimal,
    pub interest_charged: Decimal,
    pub interest_paid: Decimal,
    pub interest_waived: Decimal,
    pub interest_written_off: Decimal,
    pub interest_outstanding: Decimal,
    pub interest_overdue: Decimal,
    pub fee_charges_charged: Decimal,
    pub fee_charges_paid: Decimal,
    pub fee_charges_waived: Decimal,
    pub fee_charges_outstanding: Decimal,
    pub penalty_charges_charged: Decimal,
    pub penalty_charges_paid: Decimal,
    pub penalty_charges_waived: Decimal,
    pub penalty_charges_outstanding: Decimal,
    pub total_expected_repayment: Decimal,
    pub total_repayment: Decimal,
    pub total_waived: Decimal,
    pub total_written_off: Decimal,
    pub total_outstanding: Decimal,
    pub total_overdue: Decimal,
    pub total_recovered: Decimal,
    pub overdue_since_date: Option<NaiveDate>,
    pub write_off_reason: Option<String>,
    pub charge_off_reason: Option<String>,
}

/// Totals derived from the transaction history and schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionTotals {
    pub merchant_refund: Decimal,
    pub merchant_refund_reversed: Decimal,
    pub payout_refund: Decimal,
    pub payout_refund_reversed: Decimal,
    pub goodwill_credit: Decimal,
    pub goodwill_credit_reversed: Decimal,
    pub charge_adjustment: Decimal,
    pub charge_adjustment_reversed: Decimal,
    pub chargeback: Decimal,
    pub credit_balance_refund: Decimal,
    pub credit_balance_refund_reversed: Decimal,
    /// Repayments plus down payments.
    pub repayment: Decimal,
    pub repayment_reversed: Decimal,
    pub interest_payment_waiver: Decimal,
    pub unpaid_accrued_due_interest: Decimal,
    pub unpaid_accrued_not_due_interest: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanSummary {
    balances: LoanBalances,
    totals: TransactionTotals,
}

impl LoanSummary {
    pub fn new(balances: LoanBalances) -> Self {
        Self {
            balances,
            totals: TransactionTotals::default(),
        }
    }

    pub fn with_only_currency(currency_code: impl Into<String>) -> Self {
        Self::new(LoanBalances {
            currency_code: currency_code.into(),
            ..LoanBalances::default()
        })
    }

    /// Build a new summary carrying `base`'s balances plus totals folded from
    /// `transactions` and, when given, the repayment `schedule`.
    pub fn with_transaction_amounts(
        base: &LoanSummary,
        transactions: &[LoanTransaction],
        schedule: Option<&[SchedulePeriod]>,
        business_date: BusinessDate,
    ) -> Result<LoanSummary, TotalOverflow> {
        use LoanTransactionType as T;

        let active = |kind: LoanTransactionType, field: &'static str| {
            checked_sum(
                transactions
                    .iter()
                    .filter(|t| t.kind == kind && !t.is_reversed())
                    .map(|t| t.amount),
                field,
            )
        };
        let reversed = |kind: LoanTransactionType, field: &'static str| {
            checked_sum(
                transactions
                    .iter()
                    .filter(|t| t.kind == kind && t.is_reversed())
                    .map(|t| t.amount),
                field,
            )
        };

        let mut totals = TransactionTotals {
            merchant_refund: active(T::MerchantIssuedRefund, "merchant_refund")?,
            merchant_refund_reversed: reversed(T::MerchantIssuedRefund, "merchant_refund_reversed")?,
            payout_refund: active(T::PayoutRefund, "payout_refund")?,
            payout_refund_reversed: reversed(T::PayoutRefund, "payout_refund_reversed")?,
            goodwill_credit: active(T::GoodwillCredit, "goodwill_credit")?,
            goodwill_credit_reversed: reversed(T::GoodwillCredit, "goodwill_credit_reversed")?,
            charge_adjustment: active(T::ChargeAdjustment, "charge_adjustment")?,
            charge_adjustment_reversed: reversed(
                T::ChargeAdjustment,
                "charge_adjustment_reversed",
            )?,
            chargeback: active(T::Chargeback, "chargeback")?,
            credit_balance_refund: active(T::CreditBalanceRefund, "credit_balance_refund")?,
            credit_balance_refund_reversed: reversed(
                T::CreditBalanceRefund,
                "credit_balance_refund_reversed",
            )?,
            repayment: active(T::Repayment, "repayment")?
                .checked_add(active(T::DownPayment, "repayment")?)
                .ok_or(TotalOverflow("repayment"))?,
            repayment_reversed: reversed(T::Repayment, "repayment_reversed")?,
            interest_payment_waiver: active(T::InterestPaymentWaiver, "interest_payment_waiver")?,
            ..TransactionTotals::default()
        };

        if let Some(periods) = schedule {
            let today = business_date.date();

            let past_due = periods
                .iter()
                .filter(|p| !p.down_payment && today > p.due_date);
            totals.unpaid_accrued_due_interest =
                unpaid_interest(past_due, "unpaid_accrued_due_interest")?;

            let actual = periods
                .iter()
                .filter(|p| !p.down_payment && p.is_actual(today) && today < p.due_date);
            totals.unpaid_accrued_not_due_interest =
                unpaid_interest(actual, "unpaid_accrued_not_due_interest")?;
        }

        Ok(LoanSummary {
            balances: base.balances.clone(),
            totals,
        })
    }

    pub fn balances(&self) -> &LoanBalances {
        &self.balances
    }

    pub fn transaction_totals(&self) -> &TransactionTotals {
        &self.totals
    }

    pub fn currency_code(&self) -> &str {
        &self.balances.currency_code
    }
}

/// A derived total does not fit in a [`Decimal`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("loan summary total '{0}' overflows")]
pub struct TotalOverflow(pub &'static str);

fn checked_sum(
    amounts: impl Iterator<Item = Decimal>,
    field: &'static str,
) -> Result<Decimal, TotalOverflow> {
    let mut total = Decimal::ZERO;
    for amount in amounts {
        total = total.checked_add(amount).ok_or(TotalOverflow(field))?;
    }
    Ok(total)
}

/// Accrued minus paid interest; paid is only netted off when something was accrued.
fn unpaid_interest<'a>(
    periods: impl Iterator<Item = &'a SchedulePeriod> + Clone,
    field: &'static str,
) -> Result<Decimal, TotalOverflow> {
    let accrued = checked_sum(periods.clone().map(|p| p.total_accrued_interest), field)?;
    if accrued > Decimal::ZERO {
        let paid = checked_sum(periods.map(|p| p.interest_paid), field)?;
        accrued.checked_sub(paid).ok_or(TotalOverflow(field))
    } else {
        Ok(accrued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn amount(units: i64) -> Decimal {
        Decimal::new(units, 0)
    }

    fn base() -> LoanSummary {
        LoanSummary::new(LoanBalances {
            currency_code: "USD".to_string(),
            principal_disbursed: amount(1000),
            principal_outstanding: amount(800),
            total_outstanding: amount(850),
            ..LoanBalances::default()
        })
    }

    fn period(n: u32, from: NaiveDate, due: NaiveDate, accrued: i64, paid: i64) -> SchedulePeriod {
        SchedulePeriod {
            period: Some(n),
            from_date: from,
            due_date: due,
            down_payment: false,
            total_accrued_interest: amount(accrued),
            interest_paid: amount(paid),
        }
    }

    #[test]
    fn splits_totals_by_reversal() {
        let txns = vec![
            LoanTransaction::new(LoanTransactionType::MerchantIssuedRefund, amount(10)),
            LoanTransaction::new(LoanTransactionType::MerchantIssuedRefund, amount(5))
                .reversed(date(2024, 2, 1)),
            LoanTransaction::new(LoanTransactionType::GoodwillCredit, amount(7)),
            LoanTransaction::new(LoanTransactionType::Chargeback, amount(3)),
            LoanTransaction::new(LoanTransactionType::Chargeback, amount(100))
                .reversed(date(2024, 2, 1)),
        ];
        let bd = BusinessDate::from_ymd(2024, 3, 1).unwrap();

        let summary = LoanSummary::with_transaction_amounts(&base(), &txns, None, bd).unwrap();
        let totals = summary.transaction_totals();

        assert_eq!(totals.merchant_refund, amount(10));
        assert_eq!(totals.merchant_refund_reversed, amount(5));
        assert_eq!(totals.goodwill_credit, amount(7));
        assert_eq!(totals.goodwill_credit_reversed, Decimal::ZERO);
        assert_eq!(totals.chargeback, amount(3));
    }

    #[test]
    fn repayment_total_includes_down_payments() {
        let txns = vec![
            LoanTransaction::new(LoanTransactionType::Repayment, amount(50)),
            LoanTransaction::new(LoanTransactionType::DownPayment, amount(20)),
            LoanTransaction::new(LoanTransactionType::Repayment, amount(9)).reversed(date(2024, 1, 9)),
            LoanTransaction::new(LoanTransactionType::DownPayment, amount(4)).reversed(date(2024, 1, 9)),
        ];
        let bd = BusinessDate::from_ymd(2024, 3, 1).unwrap();

        let summary = LoanSummary::with_transaction_amounts(&base(), &txns, None, bd).unwrap();

        assert_eq!(summary.transaction_totals().repayment, amount(70));
        assert_eq!(summary.transaction_totals().repayment_reversed, amount(9));
    }

    #[test]
    fn base_balances_are_carried_over() {
        let bd = BusinessDate::from_ymd(2024, 3, 1).unwrap();
        let summary = LoanSummary::with_transaction_amounts(&base(), &[], None, bd).unwrap();
        assert_eq!(summary.balances(), base().balances());
        assert_eq!(summary.transaction_totals(), &TransactionTotals::default());
    }

    #[test]
    fn accrued_interest_split_into_due_and_not_due() {
        let schedule = vec![
            period(1, date(2024, 1, 1), date(2024, 2, 1), 10, 4),
            period(2, date(2024, 2, 1), date(2024, 3, 1), 12, 0),
            period(3, date(2024, 3, 1), date(2024, 4, 1), 6, 1),
            period(4, date(2024, 4, 1), date(2024, 5, 1), 0, 0),
        ];
        let bd = BusinessDate::from_ymd(2024, 3, 15).unwrap();

        let summary = LoanSummary::with_transaction_amounts(&base(), &[], Some(&schedule), bd).unwrap();
        let totals = summary.transaction_totals();

        // Periods 1 and 2 are past due: (10 + 12) - (4 + 0).
        assert_eq!(totals.unpaid_accrued_due_interest, amount(18));
        // Period 3 contains the business date: 6 - 1.
        assert_eq!(totals.unpaid_accrued_not_due_interest, amount(5));
    }

    #[test]
    fn first_period_includes_its_start_date() {
        let schedule = vec![
            period(1, date(2024, 1, 1), date(2024, 2, 1), 3, 1),
            period(2, date(2024, 2, 1), date(2024, 3, 1), 8, 2),
        ];

        let on_start = BusinessDate::from_ymd(2024, 1, 1).unwrap();
        let summary = LoanSummary::with_transaction_amounts(&base(), &[], Some(&schedule), on_start).unwrap();
        assert_eq!(summary.transaction_totals().unpaid_accrued_not_due_interest, amount(2));

        // Day of the first due date: period 2 has not started yet, period 1 is not past due.
        let on_boundary = BusinessDate::from_ymd(2024, 2, 1).unwrap();
        let summary =
            LoanSummary::with_transaction_amounts(&base(), &[], Some(&schedule), on_boundary).unwrap();
        assert_eq!(summary.transaction_totals().unpaid_accrued_not_due_interest, Decimal::ZERO);
        assert_eq!(summary.transaction_totals().unpaid_accrued_due_interest, Decimal::ZERO);
    }

    #[test]
    fn down_payment_periods_are_ignored() {
        let mut down = period(1, date(2024, 1, 1), date(2024, 1, 2), 50, 0);
        down.down_payment = true;
        let bd = BusinessDate::from_ymd(2024, 6, 1).unwrap();

        let summary = LoanSummary::with_transaction_amounts(&base(), &[], Some(&[down]), bd).unwrap();
        assert_eq!(summary.transaction_totals().unpaid_accrued_due_interest, Decimal::ZERO);
    }

    #[test]
    fn paid_is_not_netted_when_nothing_accrued() {
        let schedule = vec![period(1, date(2024, 1, 1), date(2024, 2, 1), 0, 9)];
        let bd = BusinessDate::from_ymd(2024, 3, 1).unwrap();
        let summary = LoanSummary::with_transaction_amounts(&base(), &[], Some(&schedule), bd).unwrap();
        assert_eq!(summary.transaction_totals().unpaid_accrued_due_interest, Decimal::ZERO);
    }

    #[test]
    fn overflowing_total_is_an_error() {
        let txns = vec![
            LoanTransaction::new(LoanTransactionType::GoodwillCredit, Decimal::MAX),
            LoanTransaction::new(LoanTransactionType::GoodwillCredit, Decimal::ONE),
        ];
        let bd = BusinessDate::from_ymd(2024, 3, 1).unwrap();

        let err = LoanSummary::with_transaction_amounts(&base(), &txns, None, bd).unwrap_err();
        assert_eq!(err, TotalOverflow("goodwill_credit"));

        let mut periods = vec![period(1, date(2024, 1, 1), date(2024, 2, 1), 1, 0)];
        periods[0].interest_paid = Decimal::MIN;
        let err = LoanSummary::with_transaction_amounts(&base(), &[], Some(&periods), bd).unwrap_err();
        assert_eq!(err, TotalOverflow("unpaid_accrued_due_interest"));
    }

    #[test]
    fn currency_only_summary() {
        let summary = LoanSummary::with_only_currency("EUR");
        assert_eq!(summary.currency_code(), "EUR");
        assert_eq!(summary.balances().principal_disbursed, Decimal::ZERO);
    }
}
