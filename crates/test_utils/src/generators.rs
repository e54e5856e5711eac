//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data that
//! maintains domain invariants, plus faker helpers for one-off realistic
//! names and references.

use chrono::{Days, NaiveDate};
use core_kernel::{Currency, InvoiceId, Money, PaymentId, StudentId};
use domain_fees::NewLineItem;
use fake::faker::name::en::Name;
use fake::faker::number::en::NumberWithFormat;
use fake::Fake;
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for generating valid Currency values
pub fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::KES),
        Just(Currency::TZS),
        Just(Currency::UGX),
        Just(Currency::RWF),
        Just(Currency::USD),
        Just(Currency::EUR),
        Just(Currency::GBP),
    ]
}

/// Strategy for generating valid positive amounts in minor units
pub fn positive_amount_minor_strategy() -> impl Strategy<Value = i64> {
    1i64..1_000_000_000i64
}

/// Strategy for generating valid amount ranges
pub fn amount_minor_strategy() -> impl Strategy<Value = i64> {
    -1_000_000_000i64..1_000_000_000i64
}

/// Strategy for generating valid Money values with positive amounts
pub fn positive_money_strategy() -> impl Strategy<Value = Money> {
    (positive_amount_minor_strategy(), currency_strategy())
        .prop_map(|(amount, currency)| Money::from_minor(amount, currency))
}

/// Strategy for generating valid Money values (can be negative)
pub fn money_strategy() -> impl Strategy<Value = Money> {
    (amount_minor_strategy(), currency_strategy())
        .prop_map(|(amount, currency)| Money::from_minor(amount, currency))
}

/// Strategy for generating valid KES Money values
pub fn kes_money_strategy() -> impl Strategy<Value = Money> {
    positive_amount_minor_strategy().prop_map(|amount| Money::from_minor(amount, Currency::KES))
}

/// Strategy for generating fee-sized KES amounts (under one million shillings)
pub fn fee_amount_strategy() -> impl Strategy<Value = Money> {
    (100i64..100_000_000i64).prop_map(|minor| Money::from_minor(minor, Currency::KES))
}

/// Strategy for generating valid allocation ratios that sum to 1.0
pub fn allocation_ratios_strategy(count: usize) -> impl Strategy<Value = Vec<Decimal>> {
    proptest::collection::vec(1u32..1000u32, count..=count).prop_map(|weights| {
        let total: u32 = weights.iter().sum();
        weights
            .into_iter()
            .map(|w| Decimal::new(w as i64, 0) / Decimal::new(total as i64, 0))
            .collect()
    })
}

/// Strategy for generating dates within the 2025 school year
pub fn date_2025_strategy() -> impl Strategy<Value = NaiveDate> {
    (0u64..365u64).prop_map(|days| {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .checked_add_days(Days::new(days))
            .unwrap()
    })
}

/// Strategy for generating an invoice date with a due date on or after it
pub fn invoice_window_strategy() -> impl Strategy<Value = (NaiveDate, NaiveDate)> {
    (date_2025_strategy(), 0u64..120u64).prop_map(|(invoice_date, grace_days)| {
        let due_date = invoice_date
            .checked_add_days(Days::new(grace_days))
            .unwrap();
        (invoice_date, due_date)
    })
}

/// Strategy for generating StudentId
pub fn student_id_strategy() -> impl Strategy<Value = StudentId> {
    any::<[u8; 16]>().prop_map(|bytes| StudentId::from_uuid(uuid::Uuid::from_bytes(bytes)))
}

/// Strategy for generating InvoiceId
pub fn invoice_id_strategy() -> impl Strategy<Value = InvoiceId> {
    any::<[u8; 16]>().prop_map(|bytes| InvoiceId::from_uuid(uuid::Uuid::from_bytes(bytes)))
}

/// Strategy for generating PaymentId
pub fn payment_id_strategy() -> impl Strategy<Value = PaymentId> {
    any::<[u8; 16]>().prop_map(|bytes| PaymentId::from_uuid(uuid::Uuid::from_bytes(bytes)))
}

/// Strategy for generating receipt numbers in the issued format
pub fn receipt_number_strategy() -> impl Strategy<Value = String> {
    (1u64..1_000_000u64).prop_map(|n| format!("RCP-{:06}", n))
}

/// Strategy for generating invoice numbers in the issued format
pub fn invoice_number_strategy() -> impl Strategy<Value = String> {
    (1u64..1_000_000u64).prop_map(|n| format!("INV-{:06}", n))
}

/// Strategy for generating vote head account and description pairs
pub fn vote_head_strategy() -> impl Strategy<Value = (String, String)> {
    prop_oneof![
        Just(("4010-TUITION".to_string(), "Tuition".to_string())),
        Just(("4020-TRANSPORT".to_string(), "Transport".to_string())),
        Just(("4030-BOARDING".to_string(), "Boarding".to_string())),
        Just(("4040-ACTIVITY".to_string(), "Activity".to_string())),
        Just(("4050-EXAM".to_string(), "Examination".to_string())),
    ]
}

/// Strategy for generating a single positive KES line item
pub fn line_item_strategy() -> impl Strategy<Value = NewLineItem> {
    (vote_head_strategy(), 100i64..50_000_000i64).prop_map(|((account, description), minor)| {
        NewLineItem::new(account, description, Money::from_minor(minor, Currency::KES))
    })
}

/// Strategy for generating a non-empty set of line items
pub fn line_items_strategy(max: usize) -> impl Strategy<Value = Vec<NewLineItem>> {
    proptest::collection::vec(line_item_strategy(), 1..=max)
}

// =============================================================================
// Faker Helpers
// =============================================================================

/// Generates a realistic student display name
pub fn fake_student_name() -> String {
    Name().fake()
}

/// Generates an admission number in the school's format
pub fn fake_admission_number() -> String {
    NumberWithFormat("ADM-^###").fake()
}

/// Generates a mobile money transaction reference
pub fn fake_mobile_reference() -> String {
    NumberWithFormat("MPESA-^#######").fake()
}
