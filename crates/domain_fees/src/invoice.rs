//! Student fee invoices
//!
//! An invoice is the debit side of the fee ledger: a charge raised against a
//! student, broken into vote-head line items. Balances move only through
//! settlement application, so `amount_paid + balance_due == total_amount`
//! holds at every observable point.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use core_kernel::{AccountRef, Currency, InvoiceId, Money, StudentId};

use crate::error::FeesError;

/// Invoice settlement status, always derived from the amounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    /// Raised, nothing applied yet
    Draft,
    /// Some but not all of the total settled
    Partial,
    /// Balance due is zero
    Paid,
}

impl InvoiceStatus {
    /// Returns the status as a lowercase string (persisted form)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Partial => "partial",
            Self::Paid => "paid",
        }
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "partial" => Ok(Self::Partial),
            "paid" => Ok(Self::Paid),
            other => Err(format!("Unknown invoice status: {other}")),
        }
    }
}

/// A vote-head line on an invoice
///
/// Read-only once the invoice exists; receipts use these to attribute a
/// payment's value across accounting categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    /// Owning invoice
    pub invoice_id: InvoiceId,
    /// Revenue/receivable account the amount funds
    pub account_ref: AccountRef,
    /// Human-readable category name (e.g., "Tuition", "Transport")
    pub description: String,
    /// Charged amount, strictly positive
    pub amount: Money,
}

/// Line-item input for building a new invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLineItem {
    /// Account the amount funds
    pub account_ref: AccountRef,
    /// Category name shown on statements and receipts
    pub description: String,
    /// Charged amount
    pub amount: Money,
}

impl NewLineItem {
    /// Creates a line-item input
    pub fn new(account_ref: impl Into<AccountRef>, description: impl Into<String>, amount: Money) -> Self {
        Self {
            account_ref: account_ref.into(),
            description: description.into(),
            amount,
        }
    }
}

/// A charge raised against a student
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier
    pub id: InvoiceId,
    /// Student being charged
    pub student_id: StudentId,
    /// Human-readable invoice number
    pub invoice_number: String,
    /// Date the charge was raised
    pub invoice_date: NaiveDate,
    /// Payment due date
    pub due_date: NaiveDate,
    /// Sum of all line items
    pub total_amount: Money,
    /// Portion settled by payments
    pub amount_paid: Money,
    /// Portion still owed, never negative
    pub balance_due: Money,
    /// Derived settlement status
    pub status: InvoiceStatus,
    /// Vote-head breakdown
    pub line_items: Vec<InvoiceLineItem>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Optimistic-concurrency token, bumped by the store on every balance write
    pub version: u32,
}

impl Invoice {
    /// Creates a new invoice from its line items
    ///
    /// Validates the construction invariants: at least one line item, every
    /// line amount strictly positive, and a single currency throughout. The
    /// total is the sum of the lines; nothing is settled yet.
    pub fn new(
        student_id: StudentId,
        invoice_number: impl Into<String>,
        invoice_date: NaiveDate,
        due_date: NaiveDate,
        line_items: Vec<NewLineItem>,
    ) -> Result<Self, FeesError> {
        if line_items.is_empty() {
            return Err(FeesError::validation("Invoice requires at least one line item"));
        }

        let currency = line_items[0].amount.currency();
        let mut total = Money::zero(currency);
        for item in &line_items {
            if !item.amount.is_positive() {
                return Err(FeesError::validation(format!(
                    "Line item '{}' must have a positive amount, got {}",
                    item.description,
                    item.amount.amount()
                )));
            }
            total = total.checked_add(&item.amount)?;
        }

        let id = InvoiceId::new_v7();
        let line_items = line_items
            .into_iter()
            .map(|item| InvoiceLineItem {
                invoice_id: id,
                account_ref: item.account_ref,
                description: item.description,
                amount: item.amount,
            })
            .collect();

        Ok(Self {
            id,
            student_id,
            invoice_number: invoice_number.into(),
            invoice_date,
            due_date,
            total_amount: total,
            amount_paid: Money::zero(currency),
            balance_due: total,
            status: InvoiceStatus::Draft,
            line_items,
            created_at: Utc::now(),
            version: 1,
        })
    }

    /// Returns the invoice currency
    pub fn currency(&self) -> Currency {
        self.total_amount.currency()
    }

    /// Returns true if any balance remains due
    pub fn is_open(&self) -> bool {
        self.balance_due.is_positive()
    }

    /// Returns true if the due date has passed and the invoice is not settled
    ///
    /// `today` is the current date in the school's timezone.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.due_date < today && self.status != InvoiceStatus::Paid
    }

    /// Applies a settlement amount from a payment
    ///
    /// The amount must be positive, in the invoice currency, and no larger
    /// than the outstanding balance; the allocator guarantees all three, so a
    /// violation here means the caller bypassed it.
    pub fn apply_settlement(&mut self, amount: Money) -> Result<(), FeesError> {
        if !amount.is_positive() {
            return Err(FeesError::validation(format!(
                "Settlement amount must be positive, got {}",
                amount.amount()
            )));
        }
        let new_balance = self.balance_due.checked_sub(&amount)?;
        if new_balance.is_negative() {
            return Err(FeesError::validation(format!(
                "Settlement of {} exceeds balance due {} on invoice {}",
                amount.amount(),
                self.balance_due.amount(),
                self.invoice_number
            )));
        }

        self.amount_paid = self.amount_paid.checked_add(&amount)?;
        self.balance_due = new_balance;
        self.status = self.derive_status();
        Ok(())
    }

    /// Releases a previously applied settlement (payment reversal)
    ///
    /// The mirror of `apply_settlement`: the amount must not exceed what has
    /// been applied so far.
    pub fn release_settlement(&mut self, amount: Money) -> Result<(), FeesError> {
        if !amount.is_positive() {
            return Err(FeesError::validation(format!(
                "Release amount must be positive, got {}",
                amount.amount()
            )));
        }
        let new_paid = self.amount_paid.checked_sub(&amount)?;
        if new_paid.is_negative() {
            return Err(FeesError::validation(format!(
                "Release of {} exceeds amount paid {} on invoice {}",
                amount.amount(),
                self.amount_paid.amount(),
                self.invoice_number
            )));
        }

        self.amount_paid = new_paid;
        self.balance_due = self.balance_due.checked_add(&amount)?;
        self.status = self.derive_status();
        Ok(())
    }

    fn derive_status(&self) -> InvoiceStatus {
        if self.amount_paid.is_zero() {
            InvoiceStatus::Draft
        } else if self.balance_due.is_zero() {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::Partial
        }
    }
}
