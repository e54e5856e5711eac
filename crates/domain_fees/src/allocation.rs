//! Payment allocation across open invoices
//!
//! The allocator decides how an incoming amount settles a student's open
//! invoices: against one explicitly named invoice, or oldest-first until the
//! money runs out. It is a pure planning step; nothing is written here. The
//! caller supplies open invoices ordered oldest-first and applies the plan
//! through the store's atomic unit.

use serde::{Deserialize, Serialize};

use core_kernel::{InvoiceId, Money};

use crate::error::AllocationError;
use crate::invoice::{Invoice, InvoiceStatus};

/// One invoice's share of a payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    /// The settled invoice
    pub invoice_id: InvoiceId,
    /// Amount applied to it, always positive
    pub applied: Money,
    /// Balance due after application
    pub new_balance_due: Money,
    /// Status after application
    pub new_status: InvoiceStatus,
}

/// The allocator's decision for a single payment
///
/// Conservation holds by construction: the applied amounts plus the
/// unallocated remainder sum back to the payment amount. Invoices that
/// receive nothing do not appear in the entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    /// Per-invoice applications, in allocation order
    pub entries: Vec<PlanEntry>,
    /// Amount left after all applications (overpayment / prepayment credit)
    pub unallocated_remainder: Money,
}

impl AllocationPlan {
    /// Sums the applied amounts
    ///
    /// All entries share the payment currency by construction, so plain
    /// addition cannot hit a currency mismatch.
    pub fn total_applied(&self) -> Money {
        let mut total = Money::zero(self.unallocated_remainder.currency());
        for entry in &self.entries {
            total = total + entry.applied;
        }
        total
    }

    /// Returns true if nothing could be applied
    pub fn is_pure_credit(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Decides how a payment settles open invoices
///
/// Stateless; the same ordered inputs always produce the same plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentAllocator;

impl PaymentAllocator {
    /// Creates an allocator
    pub fn new() -> Self {
        Self
    }

    /// Builds the allocation plan for `amount` against `open_invoices`
    ///
    /// `open_invoices` must be ordered oldest-first (invoice date ascending);
    /// the store's open-invoice query returns them that way. With an
    /// `explicit_target` only that invoice is touched, however old the
    /// others are; otherwise the amount walks the list front to back.
    ///
    /// # Errors
    ///
    /// * `NonPositiveAmount` when `amount <= 0`
    /// * `CurrencyMismatch` when any open invoice is in another currency
    /// * `UnknownInvoice` when the explicit target is not in the list
    pub fn allocate(
        &self,
        amount: Money,
        open_invoices: &[Invoice],
        explicit_target: Option<InvoiceId>,
    ) -> Result<AllocationPlan, AllocationError> {
        if !amount.is_positive() {
            return Err(AllocationError::NonPositiveAmount {
                amount: amount.amount(),
            });
        }
        for invoice in open_invoices {
            if invoice.currency() != amount.currency() {
                return Err(AllocationError::CurrencyMismatch {
                    payment_currency: amount.currency().to_string(),
                    invoice_id: invoice.id,
                    invoice_currency: invoice.currency().to_string(),
                });
            }
        }

        match explicit_target {
            Some(target) => self.allocate_explicit(amount, open_invoices, target),
            None => self.allocate_fifo(amount, open_invoices),
        }
    }

    /// Applies `min(amount, balance_due)` to the named invoice only
    fn allocate_explicit(
        &self,
        amount: Money,
        open_invoices: &[Invoice],
        target: InvoiceId,
    ) -> Result<AllocationPlan, AllocationError> {
        let invoice = open_invoices
            .iter()
            .find(|invoice| invoice.id == target)
            .ok_or(AllocationError::UnknownInvoice(target))?;

        let mut entries = Vec::new();
        let mut remaining = amount;

        let applied = amount.checked_min(&invoice.balance_due)?;
        if applied.is_positive() {
            entries.push(Self::entry(invoice, applied)?);
            remaining = remaining.checked_sub(&applied)?;
        }

        Ok(AllocationPlan {
            entries,
            unallocated_remainder: remaining,
        })
    }

    /// Walks invoices oldest-first, settling each in turn
    fn allocate_fifo(
        &self,
        amount: Money,
        open_invoices: &[Invoice],
    ) -> Result<AllocationPlan, AllocationError> {
        let mut entries = Vec::new();
        let mut remaining = amount;

        for invoice in open_invoices {
            if remaining.is_zero() {
                break;
            }
            if !invoice.is_open() {
                continue;
            }

            let applied = remaining.checked_min(&invoice.balance_due)?;
            if applied.is_positive() {
                entries.push(Self::entry(invoice, applied)?);
                remaining = remaining.checked_sub(&applied)?;
            }
        }

        Ok(AllocationPlan {
            entries,
            unallocated_remainder: remaining,
        })
    }

    fn entry(invoice: &Invoice, applied: Money) -> Result<PlanEntry, AllocationError> {
        let new_balance_due = invoice.balance_due.checked_sub(&applied)?;
        let new_status = if new_balance_due.is_zero() {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::Partial
        };
        Ok(PlanEntry {
            invoice_id: invoice.id,
            applied,
            new_balance_due,
            new_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::NewLineItem;
    use chrono::NaiveDate;
    use core_kernel::{Currency, StudentId};
    use rust_decimal_macros::dec;

    fn kes(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::KES)
    }

    fn invoice_on(date: (i32, u32, u32), total: rust_decimal::Decimal) -> Invoice {
        let invoice_date = NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap();
        Invoice::new(
            StudentId::new(),
            format!("INV-{}{:02}{:02}", date.0, date.1, date.2),
            invoice_date,
            invoice_date + chrono::Duration::days(30),
            vec![NewLineItem::new("4010-TUITION", "Tuition", kes(total))],
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_zero_amount() {
        let allocator = PaymentAllocator::new();
        let result = allocator.allocate(kes(dec!(0)), &[], None);
        assert_eq!(
            result.unwrap_err(),
            AllocationError::NonPositiveAmount { amount: dec!(0) }
        );
    }

    #[test]
    fn test_rejects_negative_amount() {
        let allocator = PaymentAllocator::new();
        let result = allocator.allocate(kes(dec!(-50)), &[], None);
        assert!(matches!(
            result,
            Err(AllocationError::NonPositiveAmount { .. })
        ));
    }

    #[test]
    fn test_rejects_currency_mismatch() {
        let allocator = PaymentAllocator::new();
        let invoices = vec![invoice_on((2025, 1, 1), dec!(1000))];
        let result = allocator.allocate(Money::new(dec!(100), Currency::USD), &invoices, None);
        assert!(matches!(
            result,
            Err(AllocationError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_explicit_unknown_target() {
        let allocator = PaymentAllocator::new();
        let invoices = vec![invoice_on((2025, 1, 1), dec!(1000))];
        let missing = InvoiceId::new();
        let result = allocator.allocate(kes(dec!(100)), &invoices, Some(missing));
        assert_eq!(result.unwrap_err(), AllocationError::UnknownInvoice(missing));
    }

    #[test]
    fn test_explicit_paid_target_is_pure_credit() {
        let allocator = PaymentAllocator::new();
        let mut invoice = invoice_on((2025, 1, 1), dec!(1000));
        invoice.apply_settlement(kes(dec!(1000))).unwrap();
        let target = invoice.id;

        let plan = allocator
            .allocate(kes(dec!(200)), &[invoice], Some(target))
            .unwrap();

        assert!(plan.is_pure_credit());
        assert_eq!(plan.unallocated_remainder, kes(dec!(200)));
    }

    #[test]
    fn test_fifo_skips_paid_invoices() {
        let allocator = PaymentAllocator::new();
        let mut paid = invoice_on((2025, 1, 1), dec!(500));
        paid.apply_settlement(kes(dec!(500))).unwrap();
        let open = invoice_on((2025, 2, 1), dec!(800));
        let open_id = open.id;

        let plan = allocator
            .allocate(kes(dec!(300)), &[paid, open], None)
            .unwrap();

        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].invoice_id, open_id);
        assert_eq!(plan.entries[0].applied, kes(dec!(300)));
    }

    #[test]
    fn test_exact_settlement_marks_paid() {
        let allocator = PaymentAllocator::new();
        let invoice = invoice_on((2025, 1, 1), dec!(1000));

        let plan = allocator.allocate(kes(dec!(1000)), &[invoice], None).unwrap();

        assert_eq!(plan.entries.len(), 1);
        assert!(plan.entries[0].new_balance_due.is_zero());
        assert_eq!(plan.entries[0].new_status, InvoiceStatus::Paid);
        assert!(plan.unallocated_remainder.is_zero());
    }

    #[test]
    fn test_total_applied_plus_remainder_equals_amount() {
        let allocator = PaymentAllocator::new();
        let invoices = vec![
            invoice_on((2025, 1, 1), dec!(400)),
            invoice_on((2025, 2, 1), dec!(250)),
        ];

        let plan = allocator.allocate(kes(dec!(1000)), &invoices, None).unwrap();

        let reconstructed = plan
            .total_applied()
            .checked_add(&plan.unallocated_remainder)
            .unwrap();
        assert_eq!(reconstructed, kes(dec!(1000)));
    }
}
