//! Double-entry journal posting
//!
//! Every completed payment produces exactly one balanced journal entry:
//! debit the payment mode's asset account, credit the fees receivable
//! account. A reversal produces one additional entry with the legs swapped.
//! Entries are validated at construction; an unbalanced entry cannot exist.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{AccountRef, JournalEntryId, LedgerLineId, Money};

use crate::error::PostingError;
use crate::payment::Payment;

/// A single debit or credit leg of a journal entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerLine {
    /// Unique line identifier
    pub id: LedgerLineId,
    /// Account the leg posts to
    pub account_ref: AccountRef,
    /// Debit amount (zero on credit legs)
    pub debit: Money,
    /// Credit amount (zero on debit legs)
    pub credit: Money,
}

impl LedgerLine {
    /// Creates a debit leg
    pub fn debit(account_ref: AccountRef, amount: Money) -> Self {
        Self {
            id: LedgerLineId::new_v7(),
            account_ref,
            debit: amount,
            credit: Money::zero(amount.currency()),
        }
    }

    /// Creates a credit leg
    pub fn credit(account_ref: AccountRef, amount: Money) -> Self {
        Self {
            id: LedgerLineId::new_v7(),
            account_ref,
            debit: Money::zero(amount.currency()),
            credit: amount,
        }
    }

    /// Returns the leg with debit and credit swapped
    pub fn swapped(&self) -> Self {
        Self {
            id: LedgerLineId::new_v7(),
            account_ref: self.account_ref.clone(),
            debit: self.credit,
            credit: self.debit,
        }
    }
}

/// A balanced double-entry journal record
///
/// Construct through [`JournalEntry::builder`]; the builder refuses to yield
/// an entry whose debit and credit totals differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique identifier
    pub id: JournalEntryId,
    /// Value date of the underlying payment
    pub transaction_date: NaiveDate,
    /// Receipt number tying the entry back to its payment
    pub reference: String,
    /// Human-readable description
    pub narration: String,
    /// Debit and credit legs
    pub lines: Vec<LedgerLine>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    /// Starts building an entry
    pub fn builder(narration: impl Into<String>) -> JournalEntryBuilder {
        JournalEntryBuilder::new(narration)
    }

    /// Sums the debit legs
    pub fn total_debits(&self) -> Decimal {
        self.lines.iter().map(|line| line.debit.amount()).sum()
    }

    /// Sums the credit legs
    pub fn total_credits(&self) -> Decimal {
        self.lines.iter().map(|line| line.credit.amount()).sum()
    }

    /// Returns true if debits equal credits
    pub fn is_balanced(&self) -> bool {
        self.total_debits() == self.total_credits()
    }
}

/// Builder for journal entries
///
/// Collects legs, then validates balance and non-emptiness in `build`.
#[derive(Debug)]
pub struct JournalEntryBuilder {
    transaction_date: NaiveDate,
    reference: String,
    narration: String,
    lines: Vec<LedgerLine>,
}

impl JournalEntryBuilder {
    fn new(narration: impl Into<String>) -> Self {
        Self {
            transaction_date: Utc::now().date_naive(),
            reference: String::new(),
            narration: narration.into(),
            lines: Vec::new(),
        }
    }

    /// Sets the transaction date
    pub fn dated(mut self, date: NaiveDate) -> Self {
        self.transaction_date = date;
        self
    }

    /// Sets the reference (receipt number)
    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    /// Adds a debit leg
    pub fn debit(mut self, account_ref: AccountRef, amount: Money) -> Self {
        self.lines.push(LedgerLine::debit(account_ref, amount));
        self
    }

    /// Adds a credit leg
    pub fn credit(mut self, account_ref: AccountRef, amount: Money) -> Self {
        self.lines.push(LedgerLine::credit(account_ref, amount));
        self
    }

    /// Adds an existing line
    pub fn line(mut self, line: LedgerLine) -> Self {
        self.lines.push(line);
        self
    }

    /// Validates and yields the entry
    ///
    /// # Errors
    ///
    /// `PostingError::EmptyEntry` when no legs were added;
    /// `PostingError::Unbalanced` when debits and credits differ.
    pub fn build(self) -> Result<JournalEntry, PostingError> {
        if self.lines.is_empty() {
            return Err(PostingError::EmptyEntry);
        }

        let debits: Decimal = self.lines.iter().map(|line| line.debit.amount()).sum();
        let credits: Decimal = self.lines.iter().map(|line| line.credit.amount()).sum();
        if debits != credits {
            return Err(PostingError::Unbalanced { debits, credits });
        }

        Ok(JournalEntry {
            id: JournalEntryId::new_v7(),
            transaction_date: self.transaction_date,
            reference: self.reference,
            narration: self.narration,
            lines: self.lines,
            created_at: Utc::now(),
        })
    }
}

/// Converts settled payments into balanced journal entries
///
/// Holds the configured fees receivable account; the asset account differs
/// per payment mode and is resolved by the caller before posting.
#[derive(Debug, Clone)]
pub struct JournalPoster {
    receivable_account: AccountRef,
}

impl JournalPoster {
    /// Creates a poster crediting the given receivable account
    pub fn new(receivable_account: AccountRef) -> Self {
        Self { receivable_account }
    }

    /// Returns the configured receivable account
    pub fn receivable_account(&self) -> &AccountRef {
        &self.receivable_account
    }

    /// Builds the posting entry for a completed payment
    ///
    /// One balanced pair: debit the mode's asset account, credit fees
    /// receivable, both for the full payment amount. The entry reference is
    /// the receipt number.
    pub fn post_payment(
        &self,
        payment: &Payment,
        asset_account: &AccountRef,
    ) -> Result<JournalEntry, PostingError> {
        JournalEntry::builder(format!("Fee payment receipt {}", payment.receipt_number))
            .dated(payment.payment_date)
            .reference(payment.receipt_number.clone())
            .debit(asset_account.clone(), payment.amount)
            .credit(self.receivable_account.clone(), payment.amount)
            .build()
    }

    /// Builds the reversing entry for a posted payment
    ///
    /// Every leg of the original entry reappears with debit and credit
    /// swapped, so the reversal nets the original to zero account by account.
    pub fn post_reversal(
        &self,
        original: &JournalEntry,
        reason: &str,
        transaction_date: NaiveDate,
    ) -> Result<JournalEntry, PostingError> {
        let mut builder = JournalEntry::builder(format!("Reversal: {reason}"))
            .dated(transaction_date)
            .reference(original.reference.clone());
        for line in &original.lines {
            builder = builder.line(line.swapped());
        }
        builder.build()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use core_kernel::{Currency, PaymentModeId, StudentId};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn posting_and_reversal_always_balance(minor in 1i64..1_000_000_000i64) {
            let poster = JournalPoster::new(AccountRef::new("1200-FEES-RECEIVABLE"));
            let payment = Payment::new(
                "RCP-000001",
                StudentId::new(),
                None,
                NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
                Money::from_minor(minor, Currency::KES),
                PaymentModeId::new(),
                None,
                "cashier-01",
                None,
            )
            .unwrap();

            let entry = poster
                .post_payment(&payment, &AccountRef::new("1010-CASH"))
                .unwrap();
            prop_assert!(entry.is_balanced());
            prop_assert_eq!(entry.total_debits(), payment.amount.amount());

            let reversal = poster
                .post_reversal(&entry, "Posting error", payment.payment_date)
                .unwrap();
            prop_assert!(reversal.is_balanced());
            prop_assert_eq!(reversal.total_credits(), entry.total_debits());
        }
    }
}
