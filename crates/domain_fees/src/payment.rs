//! Student fee payments
//!
//! A payment is the credit side of the fee ledger. Once recorded it is
//! immutable except for reversal, which is the only correction path; there
//! are no in-place amount edits. Every invoice a payment settles is tracked
//! through a [`PaymentAllocation`] row so the effect of a payment can be
//! reconstructed and undone without re-deriving it from timing order.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use core_kernel::{InvoiceId, Money, PaymentId, PaymentModeId, StudentId};

use crate::error::FeesError;

/// Payment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Money received and applied
    Completed,
    /// Corrected by reversal; no longer counts toward balances
    Reversed,
}

impl PaymentStatus {
    /// Returns the status as a lowercase string (persisted form)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Reversed => "reversed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "reversed" => Ok(Self::Reversed),
            other => Err(format!("Unknown payment status: {other}")),
        }
    }
}

/// Money received from or for a student
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Unique identifier
    pub id: PaymentId,
    /// Human-facing receipt number, unique per tenant
    pub receipt_number: String,
    /// Student the money is credited to
    pub student_id: StudentId,
    /// Explicit allocation target; `None` when auto-allocated
    pub invoice_id: Option<InvoiceId>,
    /// Value date of the payment
    pub payment_date: NaiveDate,
    /// Amount received, strictly positive
    pub amount: Money,
    /// Payment mode used (cash, bank, mobile money)
    pub payment_mode: PaymentModeId,
    /// External reference (bank slip, mobile-money transaction code)
    pub reference_number: Option<String>,
    /// Lifecycle status
    pub status: PaymentStatus,
    /// Acting user who recorded the payment
    pub received_by: String,
    /// Free-form notes shown on the receipt
    pub notes: Option<String>,
    /// Whether a journal entry exists for this payment
    pub posted: bool,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// When the payment was reversed, if it was
    pub reversed_at: Option<DateTime<Utc>>,
    /// Why the payment was reversed
    pub reversal_reason: Option<String>,
}

impl Payment {
    /// Records a new completed payment
    ///
    /// The amount must be strictly positive; everything else is accepted as
    /// given. Journal posting is tracked separately via `posted`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        receipt_number: impl Into<String>,
        student_id: StudentId,
        invoice_id: Option<InvoiceId>,
        payment_date: NaiveDate,
        amount: Money,
        payment_mode: PaymentModeId,
        reference_number: Option<String>,
        received_by: impl Into<String>,
        notes: Option<String>,
    ) -> Result<Self, FeesError> {
        if !amount.is_positive() {
            return Err(FeesError::validation(format!(
                "Payment amount must be positive, got {}",
                amount.amount()
            )));
        }

        Ok(Self {
            id: PaymentId::new_v7(),
            receipt_number: receipt_number.into(),
            student_id,
            invoice_id,
            payment_date,
            amount,
            payment_mode,
            reference_number,
            status: PaymentStatus::Completed,
            received_by: received_by.into(),
            notes,
            posted: false,
            created_at: Utc::now(),
            reversed_at: None,
            reversal_reason: None,
        })
    }

    /// Returns true if the payment still counts toward balances
    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed
    }

    /// Marks the payment as posted to the general ledger
    pub fn mark_posted(&mut self) {
        self.posted = true;
    }

    /// Reverses the payment
    ///
    /// Transitions `Completed -> Reversed` exactly once; reversing an
    /// already-reversed payment is a validation error.
    pub fn reverse(&mut self, reason: impl Into<String>, when: DateTime<Utc>) -> Result<(), FeesError> {
        if self.status == PaymentStatus::Reversed {
            return Err(FeesError::validation(format!(
                "Payment {} is already reversed",
                self.receipt_number
            )));
        }
        self.status = PaymentStatus::Reversed;
        self.reversed_at = Some(when);
        self.reversal_reason = Some(reason.into());
        Ok(())
    }
}

/// Records how much of a payment settled a specific invoice
///
/// One row per invoice the payment touched, whether the target was explicit
/// or chosen by oldest-first allocation. Reversal walks these rows to know
/// exactly what to release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAllocation {
    /// The settling payment
    pub payment_id: PaymentId,
    /// The settled invoice
    pub invoice_id: InvoiceId,
    /// Portion of the payment applied to this invoice
    pub amount_applied: Money,
    /// When the allocation was decided
    pub allocated_at: DateTime<Utc>,
}

impl PaymentAllocation {
    /// Creates an allocation record
    pub fn new(payment_id: PaymentId, invoice_id: InvoiceId, amount_applied: Money) -> Self {
        Self {
            payment_id,
            invoice_id,
            amount_applied,
            allocated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;
    use rust_decimal_macros::dec;

    fn sample_payment(amount: rust_decimal::Decimal) -> Result<Payment, FeesError> {
        Payment::new(
            "RCP-000001",
            StudentId::new(),
            None,
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            Money::new(amount, Currency::KES),
            PaymentModeId::new(),
            Some("MPESA-XK12".to_string()),
            "cashier-01",
            None,
        )
    }

    #[test]
    fn test_new_payment_is_completed_and_unposted() {
        let payment = sample_payment(dec!(500)).unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert!(payment.is_completed());
        assert!(!payment.posted);
        assert!(payment.reversed_at.is_none());
    }

    #[test]
    fn test_new_payment_rejects_non_positive_amount() {
        assert!(matches!(sample_payment(dec!(0)), Err(FeesError::Validation { .. })));
        assert!(matches!(sample_payment(dec!(-10)), Err(FeesError::Validation { .. })));
    }

    #[test]
    fn test_reverse_transitions_once() {
        let mut payment = sample_payment(dec!(500)).unwrap();
        let when = Utc::now();

        payment.reverse("Cashier error", when).unwrap();
        assert_eq!(payment.status, PaymentStatus::Reversed);
        assert!(!payment.is_completed());
        assert_eq!(payment.reversed_at, Some(when));
        assert_eq!(payment.reversal_reason.as_deref(), Some("Cashier error"));
    }

    #[test]
    fn test_reverse_twice_is_rejected() {
        let mut payment = sample_payment(dec!(500)).unwrap();
        payment.reverse("First", Utc::now()).unwrap();

        let result = payment.reverse("Second", Utc::now());
        assert!(matches!(result, Err(FeesError::Validation { .. })));
        assert_eq!(payment.reversal_reason.as_deref(), Some("First"));
    }

    #[test]
    fn test_mark_posted() {
        let mut payment = sample_payment(dec!(500)).unwrap();
        payment.mark_posted();
        assert!(payment.posted);
    }

    #[test]
    fn test_allocation_links_payment_and_invoice() {
        let payment = sample_payment(dec!(500)).unwrap();
        let invoice_id = InvoiceId::new();
        let allocation =
            PaymentAllocation::new(payment.id, invoice_id, Money::new(dec!(300), Currency::KES));

        assert_eq!(allocation.payment_id, payment.id);
        assert_eq!(allocation.invoice_id, invoice_id);
        assert_eq!(allocation.amount_applied.amount(), dec!(300));
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [PaymentStatus::Completed, PaymentStatus::Reversed] {
            let parsed: PaymentStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("pending".parse::<PaymentStatus>().is_err());
    }
}
