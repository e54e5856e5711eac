//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data for common entities across the fee ledger.
//! These fixtures are designed to be consistent and predictable for unit tests.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use core_kernel::{
    Currency, InvoiceId, JournalEntryId, Money, PaymentId, PaymentModeId, StudentId,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// Creates a small KES amount for testing
    pub fn kes_100() -> Money {
        Money::new(dec!(100.00), Currency::KES)
    }

    /// Standard term tuition charge
    pub fn term_tuition() -> Money {
        Money::new(dec!(8000.00), Currency::KES)
    }

    /// Standard term transport charge
    pub fn term_transport() -> Money {
        Money::new(dec!(2000.00), Currency::KES)
    }

    /// Total of the standard term charges
    pub fn term_total() -> Money {
        Money::new(dec!(10000.00), Currency::KES)
    }

    /// A typical partial installment
    pub fn installment() -> Money {
        Money::new(dec!(4000.00), Currency::KES)
    }

    /// Creates a zero amount
    pub fn kes_zero() -> Money {
        Money::zero(Currency::KES)
    }

    /// Creates a UGX amount for currency mismatch tests
    pub fn ugx_100() -> Money {
        Money::new(dec!(100.00), Currency::UGX)
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Standard term start date (Jan 6, 2025)
    pub fn term_start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()
    }

    /// Standard fee due date (Feb 5, 2025)
    pub fn fees_due() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 5).unwrap()
    }

    /// Mid-term date for overdue tests
    pub fn mid_term() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 14).unwrap()
    }

    /// Standard term end date (Apr 4, 2025)
    pub fn term_end() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 4).unwrap()
    }

    /// A date before the term opens
    pub fn before_term() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 1).unwrap()
    }

    /// Timestamp for invoice creation
    pub fn raised_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0).unwrap()
    }

    /// Timestamp for payment capture
    pub fn received_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 20, 10, 30, 0).unwrap()
    }

    /// Timestamp for reversal tests
    pub fn reversed_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 21, 9, 0, 0).unwrap()
    }
}

/// Fixture for identifier test data
pub struct IdFixtures;

impl IdFixtures {
    /// Creates a deterministic student ID for testing
    pub fn student_id() -> StudentId {
        StudentId::from_uuid(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440001").unwrap())
    }

    /// Creates a deterministic invoice ID for testing
    pub fn invoice_id() -> InvoiceId {
        InvoiceId::from_uuid(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440002").unwrap())
    }

    /// Creates a deterministic payment ID for testing
    pub fn payment_id() -> PaymentId {
        PaymentId::from_uuid(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440003").unwrap())
    }

    /// Creates a deterministic payment mode ID for testing
    pub fn payment_mode_id() -> PaymentModeId {
        PaymentModeId::from_uuid(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440004").unwrap())
    }

    /// Creates a deterministic journal entry ID for testing
    pub fn journal_entry_id() -> JournalEntryId {
        JournalEntryId::from_uuid(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440005").unwrap())
    }
}

/// Fixture for decimal test data
pub struct DecimalFixtures;

impl DecimalFixtures {
    /// Tuition share of the standard term charges (80%)
    pub fn tuition_ratio() -> Decimal {
        dec!(0.8)
    }

    /// Transport share of the standard term charges (20%)
    pub fn transport_ratio() -> Decimal {
        dec!(0.2)
    }

    /// Zero for comparison tests
    pub fn zero() -> Decimal {
        Decimal::ZERO
    }

    /// Small epsilon for rounding comparisons
    pub fn epsilon() -> Decimal {
        dec!(0.0001)
    }
}

/// Fixture for string test data
pub struct StringFixtures;

impl StringFixtures {
    /// Standard invoice number
    pub fn invoice_number() -> &'static str {
        "INV-000001"
    }

    /// Standard receipt number
    pub fn receipt_number() -> &'static str {
        "RCP-000001"
    }

    /// Tuition vote head account
    pub fn tuition_account() -> &'static str {
        "4010-TUITION"
    }

    /// Transport vote head account
    pub fn transport_account() -> &'static str {
        "4020-TRANSPORT"
    }

    /// Cash asset account
    pub fn cash_account() -> &'static str {
        "1010-CASH"
    }

    /// Bank asset account
    pub fn bank_account() -> &'static str {
        "1020-BANK"
    }

    /// Fees receivable control account
    pub fn receivable_account() -> &'static str {
        "1200-FEES-RECEIVABLE"
    }

    /// Test student name
    pub fn student_name() -> &'static str {
        "Brian Otieno"
    }

    /// Test admission number
    pub fn student_no() -> &'static str {
        "ADM-0417"
    }

    /// Test cashier identifier
    pub fn cashier() -> &'static str {
        "bursar-01"
    }

    /// Test mobile money reference
    pub fn mobile_reference() -> &'static str {
        "MPESA-XK12TQ88"
    }
}
