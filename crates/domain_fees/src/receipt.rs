//! Receipt numbering and the printable receipt value object
//!
//! Receipt numbers are legal document identifiers: strict uniqueness under
//! concurrent issuance is a correctness property, not a nicety. The numberer
//! is a fetch-add atomic counter, so two callers can never draw the same
//! number from one instance; the store's unique constraint on
//! `receipt_number` is the final guarantee behind it.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use core_kernel::Money;

use crate::allocation::AllocationPlan;
use crate::error::FeesError;
use crate::invoice::Invoice;
use crate::payment::Payment;

/// Pad width used for receipt and invoice numbers
pub const DEFAULT_SEQUENCE_WIDTH: usize = 6;

/// Issues unique, monotonically increasing document numbers
pub trait SequenceNumberer: Send + Sync {
    /// Draws the next number
    ///
    /// Must never return a duplicate, regardless of how many callers draw
    /// concurrently.
    fn next(&self) -> Result<String, FeesError>;
}

/// Fetch-add based sequence numberer
///
/// Numbers render as `PREFIX-000042` with a configurable pad width. One
/// instance serves receipt numbers, another invoice numbers. A deployment
/// backed by a store seeds the counter from the stored maximum at startup.
#[derive(Debug)]
pub struct AtomicSequenceNumberer {
    prefix: String,
    width: usize,
    counter: AtomicU64,
}

impl AtomicSequenceNumberer {
    /// Creates a numberer starting from 1
    pub fn new(prefix: impl Into<String>, width: usize) -> Self {
        Self::seeded(prefix, width, 0)
    }

    /// Creates a numberer that continues after `last_issued`
    pub fn seeded(prefix: impl Into<String>, width: usize, last_issued: u64) -> Self {
        Self {
            prefix: prefix.into(),
            width,
            counter: AtomicU64::new(last_issued),
        }
    }

    /// Returns the most recently issued sequence value
    pub fn last_issued(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl SequenceNumberer for AtomicSequenceNumberer {
    fn next(&self) -> Result<String, FeesError> {
        let sequence = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!(
            "{}-{:0width$}",
            self.prefix,
            sequence,
            width = self.width
        ))
    }
}

/// A vote-head attribution line on a receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteHeadAmount {
    /// Fee category name
    pub name: String,
    /// Portion of the payment funding it
    pub amount: Money,
}

/// The value object handed to receipt rendering
///
/// Built after a successful allocation; rendering and printing are external.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    /// The unique receipt number
    pub receipt_number: String,
    /// Value date of the payment
    pub payment_date: NaiveDate,
    /// Student display name
    pub student_name: String,
    /// Student admission/registration number
    pub student_no: String,
    /// Full amount received
    pub amount: Money,
    /// Payment mode display name
    pub payment_mode: String,
    /// External reference, if any
    pub reference_number: Option<String>,
    /// How the money is attributed across fee categories
    pub vote_heads: Vec<VoteHeadAmount>,
    /// Free-form notes
    pub notes: Option<String>,
}

impl PaymentReceipt {
    /// Assembles a receipt from a recorded payment and its allocation plan
    ///
    /// Each settled invoice's application is split across that invoice's
    /// line items proportionally to the line amounts; equally named heads
    /// from different invoices merge. An unallocated remainder appears as a
    /// single "Credit balance carried forward" head, so the vote heads
    /// always sum to the payment amount.
    pub fn assemble(
        payment: &Payment,
        student_name: impl Into<String>,
        student_no: impl Into<String>,
        payment_mode: impl Into<String>,
        plan: &AllocationPlan,
        invoices: &[Invoice],
    ) -> Result<Self, FeesError> {
        let mut vote_heads: Vec<VoteHeadAmount> = Vec::new();

        for entry in &plan.entries {
            let invoice = invoices
                .iter()
                .find(|invoice| invoice.id == entry.invoice_id)
                .ok_or_else(|| FeesError::not_found("Invoice", entry.invoice_id))?;

            let ratios: Vec<_> = invoice
                .line_items
                .iter()
                .map(|item| item.amount.amount())
                .collect();
            let shares = entry.applied.allocate_by_ratios(&ratios)?;

            for (item, share) in invoice.line_items.iter().zip(shares) {
                if share.is_zero() {
                    continue;
                }
                match vote_heads.iter_mut().find(|head| head.name == item.description) {
                    Some(head) => head.amount = head.amount.checked_add(&share)?,
                    None => vote_heads.push(VoteHeadAmount {
                        name: item.description.clone(),
                        amount: share,
                    }),
                }
            }
        }

        if plan.unallocated_remainder.is_positive() {
            vote_heads.push(VoteHeadAmount {
                name: "Credit balance carried forward".to_string(),
                amount: plan.unallocated_remainder,
            });
        }

        Ok(Self {
            receipt_number: payment.receipt_number.clone(),
            payment_date: payment.payment_date,
            student_name: student_name.into(),
            student_no: student_no.into(),
            amount: payment.amount,
            payment_mode: payment_mode.into(),
            reference_number: payment.reference_number.clone(),
            vote_heads,
            notes: payment.notes.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::PaymentAllocator;
    use crate::invoice::NewLineItem;
    use core_kernel::{Currency, PaymentModeId, StudentId};
    use rust_decimal_macros::dec;

    fn kes(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::KES)
    }

    #[test]
    fn test_numberer_sequence_and_padding() {
        let numberer = AtomicSequenceNumberer::new("RCP", 6);
        assert_eq!(numberer.next().unwrap(), "RCP-000001");
        assert_eq!(numberer.next().unwrap(), "RCP-000002");
        assert_eq!(numberer.last_issued(), 2);
    }

    #[test]
    fn test_numberer_seeded_continues() {
        let numberer = AtomicSequenceNumberer::seeded("RCP", 6, 41);
        assert_eq!(numberer.next().unwrap(), "RCP-000042");
    }

    #[test]
    fn test_numberer_width_overflow_keeps_digits() {
        let numberer = AtomicSequenceNumberer::seeded("RCP", 3, 999);
        assert_eq!(numberer.next().unwrap(), "RCP-1000");
    }

    fn receipt_fixture(
        payment_amount: rust_decimal::Decimal,
    ) -> (Payment, AllocationPlan, Vec<Invoice>) {
        let student = StudentId::new();
        let invoice = Invoice::new(
            student,
            "INV-001",
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            vec![
                NewLineItem::new("4010-TUITION", "Tuition", kes(dec!(800))),
                NewLineItem::new("4020-TRANSPORT", "Transport", kes(dec!(200))),
            ],
        )
        .unwrap();

        let payment = Payment::new(
            "RCP-000007",
            student,
            None,
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            kes(payment_amount),
            PaymentModeId::new(),
            Some("SLIP-199".to_string()),
            "cashier-01",
            Some("Term 1".to_string()),
        )
        .unwrap();

        let plan = PaymentAllocator::new()
            .allocate(payment.amount, std::slice::from_ref(&invoice), None)
            .unwrap();

        (payment, plan, vec![invoice])
    }

    #[test]
    fn test_assemble_splits_vote_heads_proportionally() {
        let (payment, plan, invoices) = receipt_fixture(dec!(500));

        let receipt =
            PaymentReceipt::assemble(&payment, "Jane Wanjiku", "ADM-0012", "Cash", &plan, &invoices)
                .unwrap();

        assert_eq!(receipt.receipt_number, "RCP-000007");
        assert_eq!(receipt.vote_heads.len(), 2);
        assert_eq!(receipt.vote_heads[0].name, "Tuition");
        assert_eq!(receipt.vote_heads[0].amount, kes(dec!(400)));
        assert_eq!(receipt.vote_heads[1].name, "Transport");
        assert_eq!(receipt.vote_heads[1].amount, kes(dec!(100)));
    }

    #[test]
    fn test_assemble_carries_overpayment_as_credit_head() {
        let (payment, plan, invoices) = receipt_fixture(dec!(1200));

        let receipt =
            PaymentReceipt::assemble(&payment, "Jane Wanjiku", "ADM-0012", "Cash", &plan, &invoices)
                .unwrap();

        let credit = receipt.vote_heads.last().unwrap();
        assert_eq!(credit.name, "Credit balance carried forward");
        assert_eq!(credit.amount, kes(dec!(200)));

        // Heads sum back to the payment amount
        let mut total = kes(dec!(0));
        for head in &receipt.vote_heads {
            total = total.checked_add(&head.amount).unwrap();
        }
        assert_eq!(total, payment.amount);
    }

    #[test]
    fn test_assemble_merges_heads_across_invoices() {
        let student = StudentId::new();
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let first = Invoice::new(
            student,
            "INV-001",
            date,
            date + chrono::Duration::days(30),
            vec![NewLineItem::new("4010-TUITION", "Tuition", kes(dec!(300)))],
        )
        .unwrap();
        let second = Invoice::new(
            student,
            "INV-002",
            date + chrono::Duration::days(31),
            date + chrono::Duration::days(61),
            vec![NewLineItem::new("4010-TUITION", "Tuition", kes(dec!(200)))],
        )
        .unwrap();

        let payment = Payment::new(
            "RCP-000008",
            student,
            None,
            date + chrono::Duration::days(40),
            kes(dec!(500)),
            PaymentModeId::new(),
            None,
            "cashier-01",
            None,
        )
        .unwrap();

        let invoices = vec![first, second];
        let plan = PaymentAllocator::new()
            .allocate(payment.amount, &invoices, None)
            .unwrap();

        let receipt =
            PaymentReceipt::assemble(&payment, "Jane Wanjiku", "ADM-0012", "Cash", &plan, &invoices)
                .unwrap();

        assert_eq!(receipt.vote_heads.len(), 1);
        assert_eq!(receipt.vote_heads[0].name, "Tuition");
        assert_eq!(receipt.vote_heads[0].amount, kes(dec!(500)));
    }
}
