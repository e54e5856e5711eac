//! Fees domain errors

use core_kernel::{InvoiceId, MoneyError, PaymentId, PortError, StudentId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur in the fees domain
///
/// Each variant carries the identifiers and amounts a support desk needs to
/// diagnose a failed call without re-running it.
#[derive(Debug, Error)]
pub enum FeesError {
    /// Input rejected before any write
    #[error("Validation error: {reason}")]
    Validation {
        /// What was wrong with the input
        reason: String,
    },

    /// Optimistic version check failed; the whole call is safe to retry
    #[error("Concurrent modification of ledger for student {student_id}; retry the operation")]
    ConcurrencyConflict {
        /// The student whose invoices were contended
        student_id: StudentId,
    },

    /// A journal posting failed where posting is a hard requirement
    #[error("Posting error: {0}")]
    Posting(#[from] PostingError),

    /// Referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind (Student, Invoice, Payment, ...)
        entity: String,
        /// The identifier that failed to resolve
        id: String,
    },

    /// A receipt number collided; integrity bug, never retried
    #[error("Duplicate receipt number issued: {receipt_number}")]
    DuplicateReceipt {
        /// The colliding number
        receipt_number: String,
    },

    /// Failure inside a storage or directory adapter
    #[error("Store error: {0}")]
    Store(PortError),
}

impl FeesError {
    /// Creates a validation error
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Creates a not-found error
    pub fn not_found(entity: impl Into<String>, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Returns true if retrying the whole call may succeed
    ///
    /// Only version contention and transient adapter failures qualify.
    /// `DuplicateReceipt` is deliberately not retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConcurrencyConflict { .. } => true,
            Self::Store(port_error) => port_error.is_transient(),
            _ => false,
        }
    }
}

impl From<PortError> for FeesError {
    fn from(error: PortError) -> Self {
        Self::Store(error)
    }
}

impl From<MoneyError> for FeesError {
    fn from(error: MoneyError) -> Self {
        Self::Validation {
            reason: error.to_string(),
        }
    }
}

/// Errors from the payment allocator
///
/// All variants reject the call before anything is written.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
    /// Payment amount must be strictly positive
    #[error("Payment amount must be positive, got {amount}")]
    NonPositiveAmount {
        /// The offending amount
        amount: Decimal,
    },

    /// Payment and invoice currencies differ
    #[error("Currency mismatch: payment in {payment_currency}, invoice {invoice_id} in {invoice_currency}")]
    CurrencyMismatch {
        payment_currency: String,
        invoice_id: InvoiceId,
        invoice_currency: String,
    },

    /// Explicit allocation target is not among the student's invoices
    #[error("Invoice not found: {0}")]
    UnknownInvoice(InvoiceId),

    /// Arithmetic failure while building the plan
    #[error("Calculation error: {0}")]
    Calculation(#[from] MoneyError),
}

impl From<AllocationError> for FeesError {
    fn from(error: AllocationError) -> Self {
        match error {
            AllocationError::UnknownInvoice(invoice_id) => {
                FeesError::not_found("Invoice", invoice_id)
            }
            other => FeesError::Validation {
                reason: other.to_string(),
            },
        }
    }
}

/// Errors from double-entry journal posting
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PostingError {
    /// The payment mode carries no asset account to debit
    #[error("No asset account configured for payment mode '{payment_mode}'")]
    MissingAssetAccount {
        /// Display name of the mode
        payment_mode: String,
    },

    /// Debit and credit legs do not balance
    #[error("Unbalanced journal entry: debits={debits}, credits={credits}")]
    Unbalanced {
        debits: Decimal,
        credits: Decimal,
    },

    /// An entry must carry at least one debit and one credit line
    #[error("Journal entry has no lines")]
    EmptyEntry,

    /// A journal entry already exists for this payment
    #[error("Payment {0} is already posted")]
    AlreadyPosted(PaymentId),

    /// Arithmetic failure while assembling lines
    #[error("Calculation error: {0}")]
    Calculation(String),
}
