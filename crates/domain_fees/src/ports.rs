//! Fee ledger ports
//!
//! This module defines the port interfaces the fee ledger needs from its
//! surroundings, enabling swappable implementations:
//!
//! - **`LedgerStore`**: durable, transactional storage of invoices, payments,
//!   allocations, and journal entries. Implemented by the in-memory store in
//!   this crate and by the PostgreSQL adapter in `infra_db`.
//! - **`StudentDirectory`**: resolves student display details for receipts.
//! - **`PaymentModeDirectory`**: resolves payment mode names and their
//!   configured asset accounts.
//!
//! The two write operations (`apply_receipt`, `apply_reversal`) are atomic
//! units: a store either applies everything in the unit or nothing, and a
//! failed invoice version check rejects the whole unit with a conflict.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use core_kernel::{
    AccountRef, DomainPort, HealthCheckable, InvoiceId, Money, PaymentId, PaymentModeId,
    PortError, StudentId,
};

use crate::allocation::AllocationPlan;
use crate::error::FeesError;
use crate::invoice::{Invoice, InvoiceStatus};
use crate::journal::JournalEntry;
use crate::payment::{Payment, PaymentAllocation};
use crate::receipt::AtomicSequenceNumberer;

/// Student details needed on a receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentProfile {
    /// The student
    pub id: StudentId,
    /// Display name
    pub name: String,
    /// Admission/registration number
    pub student_no: String,
}

/// A configured way of paying (cash, bank, mobile money)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMode {
    /// Mode identifier
    pub id: PaymentModeId,
    /// Display name
    pub name: String,
    /// Asset account debited when posting; `None` leaves payments unposted
    pub asset_account: Option<AccountRef>,
}

/// A version-checked balance write for one invoice
#[derive(Debug, Clone)]
pub struct InvoiceUpdate {
    /// The invoice to update
    pub invoice_id: InvoiceId,
    /// Version the caller read; the write fails if the row has moved on
    pub expected_version: u32,
    /// Replacement amount paid
    pub new_amount_paid: Money,
    /// Replacement balance due
    pub new_balance_due: Money,
    /// Replacement status
    pub new_status: InvoiceStatus,
}

/// The atomic unit persisted for one received payment
///
/// Either the payment row, its allocation rows, and every invoice update
/// land together, or none of them do.
#[derive(Debug, Clone)]
pub struct PersistPayment {
    /// The new payment
    pub payment: Payment,
    /// One row per invoice the payment settles
    pub allocations: Vec<PaymentAllocation>,
    /// Version-checked balance writes
    pub invoice_updates: Vec<InvoiceUpdate>,
}

impl PersistPayment {
    /// Builds the unit from an allocation plan
    ///
    /// `open_invoices` must be the same snapshot the plan was computed from;
    /// the expected versions are taken from it.
    pub fn from_plan(
        payment: Payment,
        plan: &AllocationPlan,
        open_invoices: &[Invoice],
    ) -> Result<Self, FeesError> {
        let mut allocations = Vec::with_capacity(plan.entries.len());
        let mut invoice_updates = Vec::with_capacity(plan.entries.len());

        for entry in &plan.entries {
            let invoice = open_invoices
                .iter()
                .find(|invoice| invoice.id == entry.invoice_id)
                .ok_or_else(|| FeesError::not_found("Invoice", entry.invoice_id))?;

            allocations.push(PaymentAllocation::new(
                payment.id,
                entry.invoice_id,
                entry.applied,
            ));
            invoice_updates.push(InvoiceUpdate {
                invoice_id: entry.invoice_id,
                expected_version: invoice.version,
                new_amount_paid: invoice.total_amount.checked_sub(&entry.new_balance_due)?,
                new_balance_due: entry.new_balance_due,
                new_status: entry.new_status,
            });
        }

        Ok(Self {
            payment,
            allocations,
            invoice_updates,
        })
    }
}

/// The atomic unit persisted for one payment reversal
#[derive(Debug, Clone)]
pub struct PersistReversal {
    /// The payment being reversed; must still be completed
    pub payment_id: PaymentId,
    /// Reason recorded on the payment
    pub reason: String,
    /// When the reversal happened
    pub reversed_at: DateTime<Utc>,
    /// Version-checked re-opening of the settled invoices
    pub invoice_updates: Vec<InvoiceUpdate>,
    /// The reversing journal entry; `None` when the payment was never posted
    pub reversal_entry: Option<JournalEntry>,
}

/// Durable storage port for the fee ledger
///
/// All reads return consistent snapshots. The store owns two invariants the
/// domain cannot enforce alone: receipt numbers are unique, and at most one
/// posting journal entry exists per payment.
#[async_trait]
pub trait LedgerStore: DomainPort + HealthCheckable {
    /// Persists a freshly raised invoice
    ///
    /// Fails with a duplicate error if the invoice number is taken.
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), PortError>;

    /// Loads one invoice with its line items
    async fn load_invoice(&self, invoice_id: InvoiceId) -> Result<Invoice, PortError>;

    /// Loads a student's invoices with outstanding balance, oldest first
    ///
    /// Ordered by invoice date ascending with ties broken by creation time,
    /// which is the order the allocator walks in FIFO mode.
    async fn load_open_invoices(&self, student_id: StudentId) -> Result<Vec<Invoice>, PortError>;

    /// Loads all of a student's invoices, oldest first
    async fn load_student_invoices(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<Invoice>, PortError>;

    /// Loads all of a student's payments, oldest first
    async fn load_student_payments(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<Payment>, PortError>;

    /// Loads a student's full ledger as one consistent snapshot
    async fn load_student_ledger(
        &self,
        student_id: StudentId,
    ) -> Result<(Vec<Invoice>, Vec<Payment>), PortError>;

    /// Loads one payment
    async fn load_payment(&self, payment_id: PaymentId) -> Result<Payment, PortError>;

    /// Loads the allocation rows recorded for a payment
    async fn load_allocations(
        &self,
        payment_id: PaymentId,
    ) -> Result<Vec<PaymentAllocation>, PortError>;

    /// Atomically persists a received payment
    ///
    /// Any invoice whose stored version differs from the expected version
    /// fails the whole unit with a conflict and nothing is written. A taken
    /// receipt number fails the unit with a duplicate error.
    async fn apply_receipt(&self, unit: PersistPayment) -> Result<(), PortError>;

    /// Records the posting journal entry for a payment and marks it posted
    ///
    /// At most one posting entry may exist per payment; a second call fails
    /// with a duplicate error.
    async fn record_journal_entry(
        &self,
        payment_id: PaymentId,
        entry: &JournalEntry,
    ) -> Result<(), PortError>;

    /// Loads the posting journal entry for a payment, if one exists
    async fn load_journal_entry_for_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<JournalEntry>, PortError>;

    /// Lists completed payments that have no journal entry yet
    ///
    /// The reconciliation queue for back-posting once asset accounts are
    /// configured.
    async fn list_unposted_payments(&self) -> Result<Vec<Payment>, PortError>;

    /// Atomically reverses a payment
    ///
    /// Marks the payment reversed, re-opens the settled invoices through the
    /// version-checked updates, and records the reversing journal entry when
    /// one is supplied. Fails with a conflict if the payment is no longer
    /// completed or any invoice version moved.
    async fn apply_reversal(&self, unit: PersistReversal) -> Result<(), PortError>;

    /// Returns the highest sequence already issued for a receipt prefix
    ///
    /// Zero when no receipt with the prefix exists. Used to seed the
    /// numberer at startup.
    async fn max_receipt_sequence(&self, prefix: &str) -> Result<u64, PortError>;

    /// Returns the highest sequence already issued for an invoice prefix
    async fn max_invoice_sequence(&self, prefix: &str) -> Result<u64, PortError>;
}

/// Convenience methods for ledger stores
#[async_trait]
pub trait LedgerStoreExt: LedgerStore {
    /// Builds a receipt numberer seeded from the store's current maximum
    async fn receipt_numberer(
        &self,
        prefix: &str,
        width: usize,
    ) -> Result<AtomicSequenceNumberer, PortError> {
        let last_issued = self.max_receipt_sequence(prefix).await?;
        Ok(AtomicSequenceNumberer::seeded(prefix, width, last_issued))
    }

    /// Builds an invoice numberer seeded from the store's current maximum
    async fn invoice_numberer(
        &self,
        prefix: &str,
        width: usize,
    ) -> Result<AtomicSequenceNumberer, PortError> {
        let last_issued = self.max_invoice_sequence(prefix).await?;
        Ok(AtomicSequenceNumberer::seeded(prefix, width, last_issued))
    }
}

impl<T: LedgerStore + ?Sized> LedgerStoreExt for T {}

/// Resolves student display details
#[async_trait]
pub trait StudentDirectory: DomainPort {
    /// Finds a student by id
    async fn find_student(&self, student_id: StudentId) -> Result<StudentProfile, PortError>;
}

/// Resolves payment mode configuration
#[async_trait]
pub trait PaymentModeDirectory: DomainPort {
    /// Finds a payment mode by id
    async fn find_mode(&self, mode_id: PaymentModeId) -> Result<PaymentMode, PortError>;
}
