//! Core Kernel - Foundational types and utilities for the school fees system
//!
//! This crate provides the fundamental building blocks used across all domain modules:
//! - Money types with precise decimal arithmetic
//! - Tenant timezone handling for due-date logic
//! - Common identifiers and value objects
//! - Port abstractions shared by all adapters

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod error;
pub mod ports;

pub use money::{Money, Currency, MoneyError};
pub use temporal::Timezone;
pub use identifiers::{
    StudentId, InvoiceId, PaymentId, JournalEntryId, LedgerLineId, PaymentModeId, AccountRef,
};
pub use error::CoreError;
pub use ports::{
    PortError, DomainPort, AdapterHealth, HealthCheckResult, HealthCheckable,
};
