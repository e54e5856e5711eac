//! Student balance projection
//!
//! The balance is never stored; it is recomputed from invoice and payment
//! facts on every read. Calling `compute` twice over the same snapshot gives
//! identical results, which keeps cached copies in outer layers honest.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use core_kernel::{Currency, Money, StudentId};

use crate::error::FeesError;
use crate::invoice::Invoice;
use crate::payment::Payment;

/// Classification of a student's overall fee position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceStatus {
    /// Payments exceed invoiced fees (credit balance)
    Overpaid,
    /// Everything invoiced has been paid
    Paid,
    /// Some but not all invoiced fees paid
    Partial,
    /// Nothing paid and at least one invoice past its due date
    Overdue,
    /// Nothing paid yet, or no fee relationship at all
    Unpaid,
}

/// A student's fee position, derived from the full transaction history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentBalance {
    /// The student
    pub student_id: StudentId,
    /// Sum of all invoice totals, regardless of status
    pub total_invoiced: Money,
    /// Sum of all completed payments
    pub total_paid: Money,
    /// `total_invoiced - total_paid`; negative means credit
    pub balance: Money,
    /// Position classification
    pub status: BalanceStatus,
}

/// Derives student balances from stored facts
///
/// Pure and side-effect free; safe to call concurrently and repeatedly. The
/// currency anchors the zero sums when a student has no history yet.
#[derive(Debug, Clone, Copy)]
pub struct BalanceCalculator {
    currency: Currency,
}

impl BalanceCalculator {
    /// Creates a calculator for the given ledger currency
    pub fn new(currency: Currency) -> Self {
        Self { currency }
    }

    /// Computes the balance over a consistent snapshot
    ///
    /// Sums every invoice and every completed payment; reversed payments do
    /// not count. `today` is the current date in the school's timezone and
    /// drives the overdue check.
    pub fn compute(
        &self,
        student_id: StudentId,
        invoices: &[Invoice],
        payments: &[Payment],
        today: NaiveDate,
    ) -> Result<StudentBalance, FeesError> {
        let mut total_invoiced = Money::zero(self.currency);
        for invoice in invoices {
            total_invoiced = total_invoiced.checked_add(&invoice.total_amount)?;
        }

        let mut total_paid = Money::zero(self.currency);
        for payment in payments.iter().filter(|payment| payment.is_completed()) {
            total_paid = total_paid.checked_add(&payment.amount)?;
        }

        let balance = total_invoiced.checked_sub(&total_paid)?;
        let any_overdue = invoices.iter().any(|invoice| invoice.is_overdue(today));

        let status = if balance.is_negative() {
            BalanceStatus::Overpaid
        } else if balance.is_zero() && total_invoiced.is_positive() {
            BalanceStatus::Paid
        } else if balance.is_positive() && total_paid.is_positive() {
            BalanceStatus::Partial
        } else if total_paid.is_zero() && any_overdue {
            BalanceStatus::Overdue
        } else {
            BalanceStatus::Unpaid
        };

        Ok(StudentBalance {
            student_id,
            total_invoiced,
            total_paid,
            balance,
            status,
        })
    }
}
