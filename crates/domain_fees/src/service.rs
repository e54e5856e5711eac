//! Fee ledger application service
//!
//! `FeeLedgerService` orchestrates the allocator, poster, numberers and the
//! storage ports behind one API: raise invoices, receive payments, answer
//! balance and statement queries, reverse mistakes.
//!
//! A payment request moves through fixed stages: `Validated` (inputs and
//! directory lookups), `Allocated` (plan computed against a snapshot of open
//! invoices), `Persisted` (one atomic store write), `Posted` (journal entry),
//! `ReceiptIssued`. Failures before `Persisted` write nothing. A posting
//! problem after `Persisted` never fails the call; the payment is money in
//! hand and the entry can be back-posted later.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, instrument, warn, Span};

use core_kernel::{InvoiceId, Money, PaymentId, PaymentModeId, PortError, StudentId};

use crate::allocation::PaymentAllocator;
use crate::balance::{BalanceCalculator, StudentBalance};
use crate::config::FeeLedgerSettings;
use crate::error::{FeesError, PostingError};
use crate::invoice::{Invoice, NewLineItem};
use crate::journal::{JournalEntry, JournalPoster};
use crate::payment::Payment;
use crate::ports::{
    InvoiceUpdate, LedgerStore, LedgerStoreExt, PaymentMode, PaymentModeDirectory,
    PersistPayment, PersistReversal, StudentDirectory, StudentProfile,
};
use crate::receipt::{
    AtomicSequenceNumberer, PaymentReceipt, SequenceNumberer, DEFAULT_SEQUENCE_WIDTH,
};
use crate::statement::{Statement, StatementBuilder};

/// How far a payment request travelled before failing or finishing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveStage {
    /// Inputs checked, student and payment mode resolved
    Validated,
    /// Allocation plan computed over the open-invoice snapshot
    Allocated,
    /// Payment, allocations and invoice updates written atomically
    Persisted,
    /// Journal entry recorded
    Posted,
    /// Printable receipt assembled
    ReceiptIssued,
}

impl ReceiveStage {
    /// Stable lowercase label for log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::Allocated => "allocated",
            Self::Persisted => "persisted",
            Self::Posted => "posted",
            Self::ReceiptIssued => "receipt_issued",
        }
    }
}

/// Request to raise an invoice against a student
#[derive(Debug, Clone)]
pub struct RecordInvoiceRequest {
    /// The student being billed
    pub student_id: StudentId,
    /// Billing date shown on the invoice
    pub invoice_date: NaiveDate,
    /// Date the balance falls overdue
    pub due_date: NaiveDate,
    /// Fee lines; at least one, all positive
    pub line_items: Vec<NewLineItem>,
}

/// Request to receive a fee payment
#[derive(Debug, Clone)]
pub struct ReceivePaymentRequest {
    /// The paying student
    pub student_id: StudentId,
    /// Amount tendered
    pub amount: Money,
    /// Date the money changed hands
    pub payment_date: NaiveDate,
    /// How the money arrived
    pub payment_mode: PaymentModeId,
    /// Directs the full payment at one invoice instead of oldest-first
    pub invoice_id: Option<InvoiceId>,
    /// Bank slip or gateway transaction reference
    pub reference_number: Option<String>,
    /// Staff member who took the payment
    pub received_by: String,
    /// Free-form remarks printed on the receipt
    pub notes: Option<String>,
}

/// Finalized mobile money transaction reported by the gateway callback
#[derive(Debug, Clone)]
pub struct MobileMoneyConfirmation {
    /// The paying student
    pub student_id: StudentId,
    /// Confirmed amount
    pub amount: Money,
    /// Gateway transaction id
    pub gateway_reference: String,
    /// Optional explicit invoice target
    pub invoice_id: Option<InvoiceId>,
}

/// Whether the journal entry for a payment was recorded
#[derive(Debug, Clone)]
pub enum PostingOutcome {
    /// Entry recorded with the payment
    Posted(JournalEntry),
    /// Payment persisted without an entry; back-post via `repost_payment`
    Unposted {
        /// Why posting was skipped or failed
        reason: String,
    },
}

impl PostingOutcome {
    /// Returns true when a journal entry was recorded
    pub fn is_posted(&self) -> bool {
        matches!(self, Self::Posted(_))
    }
}

/// Result of a successful `receive_payment`
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    /// The persisted payment
    pub payment: Payment,
    /// Printable receipt
    pub receipt: PaymentReceipt,
    /// Journal posting result
    pub posting: PostingOutcome,
}

/// Result of a successful `reverse_payment`
#[derive(Debug, Clone)]
pub struct ReversalOutcome {
    /// The payment, now reversed
    pub payment: Payment,
    /// Reversing journal entry; `None` when the payment was never posted
    pub reversal_entry: Option<JournalEntry>,
}

/// Application service for the fee ledger
pub struct FeeLedgerService {
    store: Arc<dyn LedgerStore>,
    students: Arc<dyn StudentDirectory>,
    payment_modes: Arc<dyn PaymentModeDirectory>,
    allocator: PaymentAllocator,
    poster: JournalPoster,
    balances: BalanceCalculator,
    statements: StatementBuilder,
    receipt_numbers: AtomicSequenceNumberer,
    invoice_numbers: AtomicSequenceNumberer,
    settings: FeeLedgerSettings,
}

impl FeeLedgerService {
    /// Creates the service, seeding both numberers from the store
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot report its current maxima.
    pub async fn new(
        store: Arc<dyn LedgerStore>,
        students: Arc<dyn StudentDirectory>,
        payment_modes: Arc<dyn PaymentModeDirectory>,
        settings: FeeLedgerSettings,
    ) -> Result<Self, FeesError> {
        let receipt_numbers = store
            .receipt_numberer(&settings.receipt_prefix, DEFAULT_SEQUENCE_WIDTH)
            .await?;
        let invoice_numbers = store
            .invoice_numberer(&settings.invoice_prefix, DEFAULT_SEQUENCE_WIDTH)
            .await?;

        Ok(Self {
            store,
            students,
            payment_modes,
            allocator: PaymentAllocator::new(),
            poster: JournalPoster::new(settings.receivable_account.clone()),
            balances: BalanceCalculator::new(settings.currency),
            statements: StatementBuilder::new(settings.currency),
            receipt_numbers,
            invoice_numbers,
            settings,
        })
    }

    /// Raises an invoice and assigns it the next invoice number
    ///
    /// # Errors
    ///
    /// Returns error if the student is unknown, the due date precedes the
    /// invoice date, or any line item is invalid.
    #[instrument(skip(self, request), fields(student_id = %request.student_id))]
    pub async fn record_invoice(
        &self,
        request: RecordInvoiceRequest,
    ) -> Result<Invoice, FeesError> {
        if request.due_date < request.invoice_date {
            return Err(FeesError::validation(format!(
                "Due date {} precedes invoice date {}",
                request.due_date, request.invoice_date
            )));
        }
        self.resolve_student(request.student_id).await?;

        let invoice_number = self.invoice_numbers.next()?;
        let invoice = Invoice::new(
            request.student_id,
            invoice_number,
            request.invoice_date,
            request.due_date,
            request.line_items,
        )?;
        if invoice.currency() != self.settings.currency {
            return Err(FeesError::validation(format!(
                "Invoice currency {} does not match ledger currency {}",
                invoice.currency(),
                self.settings.currency
            )));
        }

        self.store.insert_invoice(&invoice).await?;
        info!(
            invoice_number = %invoice.invoice_number,
            total = %invoice.total_amount.amount(),
            due_date = %invoice.due_date,
            "Invoice recorded"
        );
        Ok(invoice)
    }

    /// Receives a payment: allocate, persist, post, issue the receipt
    ///
    /// This method:
    /// 1. Validates the amount and resolves the student and payment mode
    /// 2. Allocates across open invoices (oldest first, or the explicit target)
    /// 3. Persists the payment, allocations and invoice updates atomically
    /// 4. Posts the double-entry journal pair
    /// 5. Assembles the printable receipt with vote head attribution
    ///
    /// # Errors
    ///
    /// Returns `ConcurrencyConflict` when another payment settled the same
    /// invoices first; the whole call is safe to retry. Posting problems do
    /// not fail the call and surface as `PostingOutcome::Unposted`.
    #[instrument(
        skip(self, request),
        fields(student_id = %request.student_id, stage = tracing::field::Empty)
    )]
    pub async fn receive_payment(
        &self,
        request: ReceivePaymentRequest,
    ) -> Result<PaymentOutcome, FeesError> {
        // Validated
        if !request.amount.is_positive() {
            return Err(FeesError::validation(format!(
                "Payment amount must be positive, got {}",
                request.amount.amount()
            )));
        }
        if request.amount.currency() != self.settings.currency {
            return Err(FeesError::validation(format!(
                "Payment currency {} does not match ledger currency {}",
                request.amount.currency(),
                self.settings.currency
            )));
        }
        let student = self.resolve_student(request.student_id).await?;
        let mode = self.resolve_mode(request.payment_mode).await?;
        self.enter(ReceiveStage::Validated);

        // Allocated
        let open_invoices = self.store.load_open_invoices(request.student_id).await?;
        let plan = self
            .allocator
            .allocate(request.amount, &open_invoices, request.invoice_id)?;
        self.enter(ReceiveStage::Allocated);

        // Persisted
        let receipt_number = self.receipt_numbers.next()?;
        let mut payment = Payment::new(
            receipt_number,
            request.student_id,
            request.invoice_id,
            request.payment_date,
            request.amount,
            request.payment_mode,
            request.reference_number,
            request.received_by,
            request.notes,
        )?;
        let unit = PersistPayment::from_plan(payment.clone(), &plan, &open_invoices)?;
        self.store
            .apply_receipt(unit)
            .await
            .map_err(|error| Self::map_receipt_error(error, request.student_id, &payment))?;
        self.enter(ReceiveStage::Persisted);

        // Posted
        let posting = self.post_received_payment(&mut payment, &mode).await;
        if posting.is_posted() {
            self.enter(ReceiveStage::Posted);
        }

        // ReceiptIssued
        let receipt = PaymentReceipt::assemble(
            &payment,
            student.name,
            student.student_no,
            mode.name,
            &plan,
            &open_invoices,
        )?;
        self.enter(ReceiveStage::ReceiptIssued);

        info!(
            receipt_number = %payment.receipt_number,
            amount = %payment.amount.amount(),
            invoices_settled = plan.entries.len(),
            remainder = %plan.unallocated_remainder.amount(),
            posted = posting.is_posted(),
            "Payment received"
        );
        Ok(PaymentOutcome {
            payment,
            receipt,
            posting,
        })
    }

    /// Computes the student's balance over a consistent ledger snapshot
    #[instrument(skip(self))]
    pub async fn get_balance(&self, student_id: StudentId) -> Result<StudentBalance, FeesError> {
        let (invoices, payments) = self.store.load_student_ledger(student_id).await?;
        self.balances.compute(
            student_id,
            &invoices,
            &payments,
            self.settings.timezone.today(),
        )
    }

    /// Builds the student's chronological statement
    #[instrument(skip(self))]
    pub async fn get_statement(&self, student_id: StudentId) -> Result<Statement, FeesError> {
        let (invoices, payments) = self.store.load_student_ledger(student_id).await?;
        self.statements.build(student_id, &invoices, &payments)
    }

    /// Reverses a completed payment
    ///
    /// Re-opens every invoice the payment settled, marks the payment
    /// reversed, and records a journal entry with the original legs swapped
    /// when the payment had been posted. The payment row itself is kept for
    /// the audit trail.
    ///
    /// # Errors
    ///
    /// Returns error if the payment is unknown or already reversed, or with
    /// `ConcurrencyConflict` if a settled invoice moved concurrently.
    #[instrument(skip_all, fields(payment_id = %payment_id, reversed_by))]
    pub async fn reverse_payment(
        &self,
        payment_id: PaymentId,
        reason: impl Into<String>,
        reversed_by: &str,
    ) -> Result<ReversalOutcome, FeesError> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(FeesError::validation("Reversal requires a reason"));
        }

        let payment = self
            .store
            .load_payment(payment_id)
            .await
            .map_err(|error| Self::map_not_found(error, "Payment", payment_id))?;
        if !payment.is_completed() {
            return Err(FeesError::validation(format!(
                "Payment {} is already reversed",
                payment.receipt_number
            )));
        }

        // Release each settled invoice at its current version
        let allocations = self.store.load_allocations(payment_id).await?;
        let mut invoice_updates = Vec::with_capacity(allocations.len());
        for allocation in &allocations {
            let mut invoice = self.store.load_invoice(allocation.invoice_id).await?;
            let expected_version = invoice.version;
            invoice.release_settlement(allocation.amount_applied)?;
            invoice_updates.push(InvoiceUpdate {
                invoice_id: invoice.id,
                expected_version,
                new_amount_paid: invoice.amount_paid,
                new_balance_due: invoice.balance_due,
                new_status: invoice.status,
            });
        }

        let reversal_entry = match self.store.load_journal_entry_for_payment(payment_id).await? {
            Some(original) => Some(self.poster.post_reversal(
                &original,
                &reason,
                self.settings.timezone.today(),
            )?),
            None => None,
        };

        self.store
            .apply_reversal(PersistReversal {
                payment_id,
                reason,
                reversed_at: Utc::now(),
                invoice_updates,
                reversal_entry: reversal_entry.clone(),
            })
            .await
            .map_err(|error| match error {
                PortError::Conflict { .. } => FeesError::ConcurrencyConflict {
                    student_id: payment.student_id,
                },
                other => FeesError::Store(other),
            })?;

        let payment = self.store.load_payment(payment_id).await?;
        info!(
            receipt_number = %payment.receipt_number,
            amount = %payment.amount.amount(),
            invoices_reopened = allocations.len(),
            reversed_by,
            "Payment reversed"
        );
        Ok(ReversalOutcome {
            payment,
            reversal_entry,
        })
    }

    /// Lists completed payments still waiting for a journal entry
    #[instrument(skip(self))]
    pub async fn list_unposted_payments(&self) -> Result<Vec<Payment>, FeesError> {
        Ok(self.store.list_unposted_payments().await?)
    }

    /// Posts the journal entry for a payment recorded without one
    ///
    /// Idempotent: if an entry already exists it is returned unchanged.
    ///
    /// # Errors
    ///
    /// Unlike during `receive_payment`, a missing asset account here is a
    /// hard `Posting` error, since posting is the whole point of the call.
    #[instrument(skip(self))]
    pub async fn repost_payment(&self, payment_id: PaymentId) -> Result<JournalEntry, FeesError> {
        let payment = self
            .store
            .load_payment(payment_id)
            .await
            .map_err(|error| Self::map_not_found(error, "Payment", payment_id))?;
        if !payment.is_completed() {
            return Err(FeesError::validation(format!(
                "Payment {} is reversed and cannot be posted",
                payment.receipt_number
            )));
        }
        if let Some(existing) = self.store.load_journal_entry_for_payment(payment_id).await? {
            info!(receipt_number = %payment.receipt_number, "Payment already posted");
            return Ok(existing);
        }

        let mode = self.resolve_mode(payment.payment_mode).await?;
        let asset_account = mode.asset_account.clone().ok_or_else(|| {
            FeesError::Posting(PostingError::MissingAssetAccount {
                payment_mode: mode.name.clone(),
            })
        })?;
        let entry = self.poster.post_payment(&payment, &asset_account)?;

        match self.store.record_journal_entry(payment_id, &entry).await {
            Ok(()) => {
                info!(
                    receipt_number = %payment.receipt_number,
                    entry_id = %entry.id,
                    "Payment back-posted"
                );
                Ok(entry)
            }
            // Lost a race with another reposter; theirs is the entry of record
            Err(PortError::Duplicate { .. }) => {
                let existing = self.store.load_journal_entry_for_payment(payment_id).await?;
                existing.ok_or_else(|| {
                    FeesError::Store(PortError::internal(
                        "Posting entry vanished after duplicate rejection",
                    ))
                })
            }
            Err(other) => Err(FeesError::Store(other)),
        }
    }

    /// Receives a mobile money payment confirmed by the gateway
    ///
    /// Thin adapter over [`receive_payment`](Self::receive_payment) using the
    /// configured mobile money mode; the gateway transaction id becomes the
    /// payment reference.
    #[instrument(skip(self, confirmation), fields(student_id = %confirmation.student_id))]
    pub async fn confirm_mobile_money(
        &self,
        confirmation: MobileMoneyConfirmation,
    ) -> Result<PaymentOutcome, FeesError> {
        let payment_mode = self
            .settings
            .mobile_money_mode
            .ok_or_else(|| FeesError::validation("No mobile money payment mode configured"))?;

        self.receive_payment(ReceivePaymentRequest {
            student_id: confirmation.student_id,
            amount: confirmation.amount,
            payment_date: self.settings.timezone.today(),
            payment_mode,
            invoice_id: confirmation.invoice_id,
            reference_number: Some(confirmation.gateway_reference),
            received_by: "mobile-money-gateway".to_string(),
            notes: None,
        })
        .await
    }

    /// Records the stage a payment request has reached on the current span
    fn enter(&self, stage: ReceiveStage) {
        Span::current().record("stage", stage.as_str());
    }

    /// Posts the journal entry for a freshly persisted payment
    ///
    /// Never fails: the payment is already money in hand, so every posting
    /// problem collapses to `Unposted` with a warning.
    async fn post_received_payment(
        &self,
        payment: &mut Payment,
        mode: &PaymentMode,
    ) -> PostingOutcome {
        let Some(asset_account) = mode.asset_account.as_ref() else {
            let reason = format!("Payment mode '{}' has no asset account", mode.name);
            warn!(
                receipt_number = %payment.receipt_number,
                %reason,
                "Payment persisted without journal entry"
            );
            return PostingOutcome::Unposted { reason };
        };

        let entry = match self.poster.post_payment(payment, asset_account) {
            Ok(entry) => entry,
            Err(error) => {
                let reason = error.to_string();
                warn!(
                    receipt_number = %payment.receipt_number,
                    %reason,
                    "Payment persisted without journal entry"
                );
                return PostingOutcome::Unposted { reason };
            }
        };
        match self.store.record_journal_entry(payment.id, &entry).await {
            Ok(()) => {
                payment.mark_posted();
                PostingOutcome::Posted(entry)
            }
            Err(error) => {
                let reason = error.to_string();
                warn!(
                    receipt_number = %payment.receipt_number,
                    %reason,
                    "Payment persisted without journal entry"
                );
                PostingOutcome::Unposted { reason }
            }
        }
    }

    async fn resolve_student(&self, student_id: StudentId) -> Result<StudentProfile, FeesError> {
        self.students
            .find_student(student_id)
            .await
            .map_err(|error| Self::map_not_found(error, "Student", student_id))
    }

    /// Resolves a payment mode; an unknown mode is a validation failure
    async fn resolve_mode(&self, mode_id: PaymentModeId) -> Result<PaymentMode, FeesError> {
        self.payment_modes.find_mode(mode_id).await.map_err(|error| {
            if error.is_not_found() {
                FeesError::validation(format!("Unknown payment mode {mode_id}"))
            } else {
                FeesError::Store(error)
            }
        })
    }

    fn map_not_found(
        error: PortError,
        entity: &'static str,
        id: impl std::fmt::Display,
    ) -> FeesError {
        if error.is_not_found() {
            FeesError::not_found(entity, id)
        } else {
            FeesError::Store(error)
        }
    }

    /// Maps atomic-write failures onto the domain taxonomy
    fn map_receipt_error(error: PortError, student_id: StudentId, payment: &Payment) -> FeesError {
        match error {
            PortError::Conflict { .. } => FeesError::ConcurrencyConflict { student_id },
            PortError::Duplicate { .. } => FeesError::DuplicateReceipt {
                receipt_number: payment.receipt_number.clone(),
            },
            other => FeesError::Store(other),
        }
    }
}
