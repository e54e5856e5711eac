//! Payment Allocation Tests
//!
//! This module contains comprehensive tests for `PaymentAllocator`:
//! - FIFO settlement across a student's open invoices
//! - Explicit targeting of a single invoice
//! - Overpayment and prepayment credit handling
//!
//! # Test Coverage
//!
//! ## FIFO Tests
//! - Oldest invoice settled first, newer ones untouched
//! - Walk continues across invoices until the money runs out
//! - Partially paid invoices absorb only their remaining balance
//!
//! ## Explicit Targeting Tests
//! - Only the named invoice is touched, regardless of age
//! - Overshoot on the target becomes unallocated credit
//!
//! ## Property Tests
//! - Conservation: applied amounts plus remainder equal the payment
//! - Determinism: the same ordered inputs always yield the same plan
//!
//! # Test Organization
//!
//! - `fifo_allocation` - Oldest-first settlement behavior
//! - `explicit_allocation` - Single-invoice targeting
//! - `overpayment` - Credit remainder handling
//! - `allocation_properties` - Property-based invariants

use chrono::NaiveDate;
use core_kernel::{Currency, Money, StudentId};
use domain_fees::{Invoice, InvoiceStatus, NewLineItem, PaymentAllocator};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ============================================================================
// TEST FIXTURES
// ============================================================================

fn kes(amount: Decimal) -> Money {
    Money::new(amount, Currency::KES)
}

/// Creates an open invoice for one student on the given date
fn create_test_invoice(
    student_id: StudentId,
    number: &str,
    date: NaiveDate,
    total: Decimal,
) -> Invoice {
    Invoice::new(
        student_id,
        number,
        date,
        date + chrono::Duration::days(30),
        vec![NewLineItem::new("4010-TUITION", "Tuition", kes(total))],
    )
    .unwrap()
}

/// Creates the standard two-invoice ledger: January 1000, February 500
fn create_january_february(student_id: StudentId) -> Vec<Invoice> {
    vec![
        create_test_invoice(
            student_id,
            "INV-000001",
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            dec!(1000),
        ),
        create_test_invoice(
            student_id,
            "INV-000002",
            NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            dec!(500),
        ),
    ]
}

// ============================================================================
// FIFO ALLOCATION
// ============================================================================

mod fifo_allocation {
    use super::*;

    /// A 700 payment against January 1000 and February 500 settles January
    /// partially and leaves February untouched
    #[test]
    fn test_payment_settles_oldest_invoice_first() {
        let student_id = StudentId::new();
        let invoices = create_january_february(student_id);
        let january = invoices[0].id;

        let plan = PaymentAllocator::new()
            .allocate(kes(dec!(700)), &invoices, None)
            .unwrap();

        assert_eq!(plan.entries.len(), 1, "February must not be touched");
        assert_eq!(plan.entries[0].invoice_id, january);
        assert_eq!(plan.entries[0].applied, kes(dec!(700)));
        assert_eq!(plan.entries[0].new_balance_due, kes(dec!(300)));
        assert_eq!(plan.entries[0].new_status, InvoiceStatus::Partial);
        assert!(plan.unallocated_remainder.is_zero());
    }

    /// A payment larger than the oldest invoice spills into the next one
    #[test]
    fn test_payment_walks_across_invoices() {
        let student_id = StudentId::new();
        let invoices = create_january_february(student_id);

        let plan = PaymentAllocator::new()
            .allocate(kes(dec!(1200)), &invoices, None)
            .unwrap();

        assert_eq!(plan.entries.len(), 2);
        assert_eq!(plan.entries[0].applied, kes(dec!(1000)));
        assert_eq!(plan.entries[0].new_status, InvoiceStatus::Paid);
        assert_eq!(plan.entries[1].applied, kes(dec!(200)));
        assert_eq!(plan.entries[1].new_balance_due, kes(dec!(300)));
        assert!(plan.unallocated_remainder.is_zero());
    }

    /// A partially paid invoice only absorbs its remaining balance
    #[test]
    fn test_partial_invoice_absorbs_remaining_balance_only() {
        let student_id = StudentId::new();
        let mut invoices = create_january_february(student_id);
        invoices[0].apply_settlement(kes(dec!(600))).unwrap();

        let plan = PaymentAllocator::new()
            .allocate(kes(dec!(700)), &invoices, None)
            .unwrap();

        // 400 closes January, 300 flows to February
        assert_eq!(plan.entries.len(), 2);
        assert_eq!(plan.entries[0].applied, kes(dec!(400)));
        assert_eq!(plan.entries[0].new_status, InvoiceStatus::Paid);
        assert_eq!(plan.entries[1].applied, kes(dec!(300)));
    }

    /// A payment with no open invoices becomes a pure prepayment credit
    #[test]
    fn test_no_open_invoices_is_pure_credit() {
        let plan = PaymentAllocator::new()
            .allocate(kes(dec!(2500)), &[], None)
            .unwrap();

        assert!(plan.is_pure_credit());
        assert_eq!(plan.unallocated_remainder, kes(dec!(2500)));
    }
}

// ============================================================================
// EXPLICIT ALLOCATION
// ============================================================================

mod explicit_allocation {
    use super::*;

    /// Targeting February directly leaves the older January invoice open
    #[test]
    fn test_explicit_target_skips_older_invoices() {
        let student_id = StudentId::new();
        let invoices = create_january_february(student_id);
        let january = invoices[0].id;
        let february = invoices[1].id;

        let plan = PaymentAllocator::new()
            .allocate(kes(dec!(500)), &invoices, Some(february))
            .unwrap();

        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].invoice_id, february);
        assert_eq!(plan.entries[0].new_status, InvoiceStatus::Paid);
        assert!(
            plan.entries.iter().all(|entry| entry.invoice_id != january),
            "January must not receive any of the targeted payment"
        );
    }

    /// Overshoot on the explicit target is not spread to other invoices
    #[test]
    fn test_explicit_overshoot_becomes_credit() {
        let student_id = StudentId::new();
        let invoices = create_january_february(student_id);
        let february = invoices[1].id;

        let plan = PaymentAllocator::new()
            .allocate(kes(dec!(800)), &invoices, Some(february))
            .unwrap();

        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].applied, kes(dec!(500)));
        assert_eq!(plan.unallocated_remainder, kes(dec!(300)));
    }
}

// ============================================================================
// OVERPAYMENT
// ============================================================================

mod overpayment {
    use super::*;

    /// A 1500 payment against a single 1000 invoice leaves a 500 credit
    #[test]
    fn test_overpayment_remainder_is_preserved() {
        let student_id = StudentId::new();
        let invoice = create_test_invoice(
            student_id,
            "INV-000001",
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            dec!(1000),
        );

        let plan = PaymentAllocator::new()
            .allocate(kes(dec!(1500)), &[invoice], None)
            .unwrap();

        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].applied, kes(dec!(1000)));
        assert_eq!(plan.entries[0].new_status, InvoiceStatus::Paid);
        assert_eq!(plan.unallocated_remainder, kes(dec!(500)));
        assert_eq!(plan.total_applied(), kes(dec!(1000)));
    }
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

mod allocation_properties {
    use super::*;

    /// Builds a ledger of open invoices with the given totals, dated a month
    /// apart so the oldest-first order is unambiguous
    fn build_ledger(totals: &[u32]) -> Vec<Invoice> {
        let student_id = StudentId::new();
        totals
            .iter()
            .enumerate()
            .map(|(index, total)| {
                let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(30 * index as i64);
                create_test_invoice(
                    student_id,
                    &format!("INV-{:06}", index + 1),
                    date,
                    Decimal::from(*total),
                )
            })
            .collect()
    }

    proptest! {
        /// Money is conserved: every shilling is either applied or remains
        #[test]
        fn allocation_conserves_the_payment_amount(
            totals in proptest::collection::vec(1u32..100_000u32, 1..8),
            amount in 1u32..500_000u32,
        ) {
            let invoices = build_ledger(&totals);
            let payment = kes(Decimal::from(amount));

            let plan = PaymentAllocator::new()
                .allocate(payment, &invoices, None)
                .unwrap();

            let reconstructed = plan
                .total_applied()
                .checked_add(&plan.unallocated_remainder)
                .unwrap();
            prop_assert_eq!(reconstructed, payment);
            prop_assert!(!plan.unallocated_remainder.is_negative());
        }

        /// No invoice is ever settled beyond its balance due
        #[test]
        fn allocation_never_oversettles_an_invoice(
            totals in proptest::collection::vec(1u32..100_000u32, 1..8),
            amount in 1u32..500_000u32,
        ) {
            let invoices = build_ledger(&totals);
            let plan = PaymentAllocator::new()
                .allocate(kes(Decimal::from(amount)), &invoices, None)
                .unwrap();

            for entry in &plan.entries {
                let invoice = invoices
                    .iter()
                    .find(|invoice| invoice.id == entry.invoice_id)
                    .unwrap();
                prop_assert!(entry.applied.amount() <= invoice.balance_due.amount());
                prop_assert!(entry.applied.is_positive());
                prop_assert!(!entry.new_balance_due.is_negative());
            }
        }

        /// The same ordered inputs always produce the same plan
        #[test]
        fn allocation_is_deterministic(
            totals in proptest::collection::vec(1u32..100_000u32, 1..8),
            amount in 1u32..500_000u32,
        ) {
            let invoices = build_ledger(&totals);
            let payment = kes(Decimal::from(amount));
            let allocator = PaymentAllocator::new();

            let first = allocator.allocate(payment, &invoices, None).unwrap();
            let second = allocator.allocate(payment, &invoices, None).unwrap();

            prop_assert_eq!(first, second);
        }
    }
}
