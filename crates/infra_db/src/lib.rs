//! Infrastructure Database Layer
//!
//! This crate provides the PostgreSQL infrastructure for the fee ledger,
//! implementing the domain's storage port using SQLx.
//!
//! # Architecture
//!
//! The crate exposes one adapter, `PostgresLedgerStore`, which implements
//! the `LedgerStore` trait from `domain_fees`. Ledger writes that must land
//! together (a receipt with its allocations and balance updates, a reversal
//! with its re-opened invoices) run inside a single transaction, with
//! invoice versions checked on every balance update.
//!
//! # Schema
//!
//! Migrations are embedded in the crate and applied with `run_migrations`.
//! Statuses are stored as lowercase text and monetary amounts as
//! `NUMERIC(14,4)`, matching the precision of the domain money type.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool_from_url, run_migrations, PostgresLedgerStore};
//!
//! let pool = create_pool_from_url("postgres://localhost/school_fees").await?;
//! run_migrations(&pool).await?;
//! let store = PostgresLedgerStore::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod ledger;

pub use pool::{
    create_pool, create_pool_from_url, run_migrations, DatabaseConfig, DatabasePool, MIGRATOR,
};
pub use error::DatabaseError;
pub use ledger::PostgresLedgerStore;
