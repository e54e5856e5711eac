//! Fees Domain - School Fee Ledger and Payment Allocation
//!
//! This crate implements the fee ledger for the school portal: invoices
//! debit a student's account, payments credit it, and everything a family or
//! auditor sees (balances, statements, receipts) is derived from those two
//! record types.
//!
//! # Allocation
//!
//! A payment settles open invoices oldest-first unless the cashier targets
//! one invoice explicitly. Whatever the invoices cannot absorb stays on the
//! account as a credit (an advance payment), never rejected and never
//! invented.
//!
//! # Double-Entry Posting
//!
//! Each completed payment posts one balanced journal pair: debit the payment
//! mode's asset account, credit fees receivable. Posting failures never lose
//! money; the payment is persisted first and the entry can be back-posted.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_fees::{FeeLedgerService, ReceivePaymentRequest};
//!
//! let outcome = service
//!     .receive_payment(ReceivePaymentRequest {
//!         student_id,
//!         amount: Money::new(dec!(5000), Currency::KES),
//!         payment_date,
//!         payment_mode: cash_mode,
//!         invoice_id: None,
//!         reference_number: None,
//!         received_by: "cashier-01".to_string(),
//!         notes: None,
//!     })
//!     .await?;
//! println!("issued {}", outcome.receipt.receipt_number);
//! ```

pub mod allocation;
pub mod balance;
pub mod config;
pub mod error;
pub mod invoice;
pub mod journal;
pub mod payment;
pub mod ports;
pub mod receipt;
pub mod service;
pub mod statement;
pub mod store;

pub use allocation::{AllocationPlan, PaymentAllocator, PlanEntry};
pub use balance::{BalanceCalculator, BalanceStatus, StudentBalance};
pub use config::{FeeLedgerSettings, PaymentModeSetting};
pub use error::{AllocationError, FeesError, PostingError};
pub use invoice::{Invoice, InvoiceLineItem, InvoiceStatus, NewLineItem};
pub use journal::{JournalEntry, JournalEntryBuilder, JournalPoster, LedgerLine};
pub use payment::{Payment, PaymentAllocation, PaymentStatus};
pub use ports::{
    InvoiceUpdate, LedgerStore, LedgerStoreExt, PaymentMode, PaymentModeDirectory,
    PersistPayment, PersistReversal, StudentDirectory, StudentProfile,
};
pub use receipt::{
    AtomicSequenceNumberer, PaymentReceipt, SequenceNumberer, VoteHeadAmount,
    DEFAULT_SEQUENCE_WIDTH,
};
pub use service::{
    FeeLedgerService, MobileMoneyConfirmation, PaymentOutcome, PostingOutcome,
    ReceivePaymentRequest, ReceiveStage, RecordInvoiceRequest, ReversalOutcome,
};
pub use statement::{Statement, StatementBuilder, StatementLine, StatementLineKind};
pub use store::{MemoryLedgerStore, MemoryStudentDirectory, StaticPaymentModes};
