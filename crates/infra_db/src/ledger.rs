//! PostgreSQL Ledger Adapter
//!
//! This module provides the database adapter for the fee ledger, implementing
//! the `LedgerStore` trait on PostgreSQL.
//!
//! # Overview
//!
//! The `PostgresLedgerStore` serves as the bridge between the domain layer's
//! port interface and the database. It:
//!
//! - Translates ledger operations into SQL against the fee tables
//! - Converts database rows back to domain models
//! - Handles error translation between database and port errors
//!
//! # Atomicity
//!
//! The two write units (`apply_receipt`, `apply_reversal`) each run inside a
//! single transaction. Invoice balance updates are version-checked: an update
//! whose expected version no longer matches the stored row fails the whole
//! unit with a conflict and the transaction rolls back.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool_from_url, PostgresLedgerStore};
//! use domain_fees::LedgerStore;
//! use std::sync::Arc;
//!
//! let pool = create_pool_from_url("postgres://localhost/school_fees").await?;
//! let store: Arc<dyn LedgerStore> = Arc::new(PostgresLedgerStore::new(pool));
//! let open = store.load_open_invoices(student_id).await?;
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{
    AccountRef, AdapterHealth, Currency, DomainPort, HealthCheckResult, HealthCheckable,
    InvoiceId, JournalEntryId, LedgerLineId, Money, PaymentId, PaymentModeId, PortError,
    StudentId,
};
use domain_fees::{
    Invoice, InvoiceLineItem, InvoiceStatus, InvoiceUpdate, JournalEntry, LedgerLine,
    LedgerStore, Payment, PaymentAllocation, PaymentStatus, PersistPayment, PersistReversal,
};

use crate::error::DatabaseError;

// Reads shared by the pool methods and the snapshot transaction. Open
// invoices and payments are ordered the same way the domain orders them:
// oldest first with ties broken by creation time, then id.
const SELECT_INVOICE_BY_ID: &str = "SELECT invoice_id, student_id, invoice_number, invoice_date, due_date, currency,
            total_amount, amount_paid, balance_due, status, version, created_at
     FROM invoices
     WHERE invoice_id = $1";

const SELECT_OPEN_INVOICES: &str = "SELECT invoice_id, student_id, invoice_number, invoice_date, due_date, currency,
            total_amount, amount_paid, balance_due, status, version, created_at
     FROM invoices
     WHERE student_id = $1 AND balance_due > 0
     ORDER BY invoice_date, created_at, invoice_id";

const SELECT_STUDENT_INVOICES: &str = "SELECT invoice_id, student_id, invoice_number, invoice_date, due_date, currency,
            total_amount, amount_paid, balance_due, status, version, created_at
     FROM invoices
     WHERE student_id = $1
     ORDER BY invoice_date, created_at, invoice_id";

const SELECT_STUDENT_PAYMENTS: &str = "SELECT payment_id, receipt_number, student_id, invoice_id, payment_date, currency,
            amount, payment_mode_id, reference_number, status, received_by, notes,
            posted, created_at, reversed_at, reversal_reason
     FROM payments
     WHERE student_id = $1
     ORDER BY payment_date, created_at, payment_id";

/// PostgreSQL-backed implementation of the `LedgerStore` trait
///
/// # Health Checking
///
/// The adapter implements `HealthCheckable` to verify database connectivity.
/// Health checks perform a simple query to ensure the connection pool is
/// operational.
///
/// # Error Handling
///
/// Database errors are translated to `PortError` variants:
/// - Unique violations on receipt and invoice numbers -> `PortError::Duplicate`
/// - Version check failures -> `PortError::Conflict`
/// - Connection failures and pool exhaustion -> `PortError::Connection`
/// - Other errors -> `PortError::Internal`
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Creates a new PostgreSQL ledger store
    ///
    /// # Arguments
    ///
    /// * `pool` - The PostgreSQL connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PostgresLedgerStore {}

#[async_trait]
impl HealthCheckable for PostgresLedgerStore {
    /// Checks database connectivity
    ///
    /// Performs a simple SELECT 1 query to verify the connection pool
    /// is operational and the database is responsive.
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult {
                adapter_id: "postgres-ledger-store".to_string(),
                status: AdapterHealth::Healthy,
                latency_ms,
                message: None,
                checked_at: Utc::now(),
            },
            Err(e) => HealthCheckResult {
                adapter_id: "postgres-ledger-store".to_string(),
                status: AdapterHealth::Unhealthy,
                latency_ms,
                message: Some(format!("Database error: {}", e)),
                checked_at: Utc::now(),
            },
        }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.id, invoice_number = %invoice.invoice_number))]
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), PortError> {
        debug!(line_items = invoice.line_items.len(), "Inserting invoice");

        let mut tx = self.pool.begin().await.map_err(sqlx_to_port_error)?;

        sqlx::query(
            "INSERT INTO invoices (invoice_id, student_id, invoice_number, invoice_date,
                                   due_date, currency, total_amount, amount_paid,
                                   balance_due, status, version, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(*invoice.id.as_uuid())
        .bind(*invoice.student_id.as_uuid())
        .bind(&invoice.invoice_number)
        .bind(invoice.invoice_date)
        .bind(invoice.due_date)
        .bind(invoice.total_amount.currency().code())
        .bind(invoice.total_amount.amount())
        .bind(invoice.amount_paid.amount())
        .bind(invoice.balance_due.amount())
        .bind(invoice.status.as_str())
        .bind(i64::from(invoice.version))
        .bind(invoice.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|error| match DatabaseError::from(error) {
            DatabaseError::DuplicateEntry(_) => {
                PortError::duplicate("Invoice", &invoice.invoice_number)
            }
            other => db_to_port_error(other),
        })?;

        for (position, item) in invoice.line_items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO invoice_line_items (invoice_id, position, account_ref,
                                                 description, currency, amount)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(*item.invoice_id.as_uuid())
            .bind(position as i32)
            .bind(item.account_ref.as_str())
            .bind(&item.description)
            .bind(item.amount.currency().code())
            .bind(item.amount.amount())
            .execute(&mut *tx)
            .await
            .map_err(sqlx_to_port_error)?;
        }

        tx.commit().await.map_err(sqlx_to_port_error)?;
        Ok(())
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn load_invoice(&self, invoice_id: InvoiceId) -> Result<Invoice, PortError> {
        debug!("Loading invoice");

        let mut conn = self.pool.acquire().await.map_err(sqlx_to_port_error)?;
        let row = sqlx::query_as::<_, InvoiceRow>(SELECT_INVOICE_BY_ID)
            .bind(*invoice_id.as_uuid())
            .fetch_optional(&mut *conn)
            .await
            .map_err(sqlx_to_port_error)?
            .ok_or_else(|| PortError::not_found("Invoice", invoice_id))?;

        let mut invoices = hydrate_invoices(&mut conn, vec![row]).await?;
        invoices
            .pop()
            .ok_or_else(|| PortError::not_found("Invoice", invoice_id))
    }

    #[instrument(skip(self), fields(student_id = %student_id))]
    async fn load_open_invoices(&self, student_id: StudentId) -> Result<Vec<Invoice>, PortError> {
        debug!("Loading open invoices");

        let mut conn = self.pool.acquire().await.map_err(sqlx_to_port_error)?;
        load_invoice_batch(&mut conn, SELECT_OPEN_INVOICES, student_id).await
    }

    #[instrument(skip(self), fields(student_id = %student_id))]
    async fn load_student_invoices(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<Invoice>, PortError> {
        debug!("Loading student invoices");

        let mut conn = self.pool.acquire().await.map_err(sqlx_to_port_error)?;
        load_invoice_batch(&mut conn, SELECT_STUDENT_INVOICES, student_id).await
    }

    #[instrument(skip(self), fields(student_id = %student_id))]
    async fn load_student_payments(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<Payment>, PortError> {
        debug!("Loading student payments");

        let mut conn = self.pool.acquire().await.map_err(sqlx_to_port_error)?;
        load_payment_batch(&mut conn, SELECT_STUDENT_PAYMENTS, student_id).await
    }

    #[instrument(skip(self), fields(student_id = %student_id))]
    async fn load_student_ledger(
        &self,
        student_id: StudentId,
    ) -> Result<(Vec<Invoice>, Vec<Payment>), PortError> {
        debug!("Loading student ledger");

        // One repeatable-read transaction so invoices and payments come
        // from the same snapshot.
        let mut tx = self.pool.begin().await.map_err(sqlx_to_port_error)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await
            .map_err(sqlx_to_port_error)?;

        let invoices = load_invoice_batch(&mut tx, SELECT_STUDENT_INVOICES, student_id).await?;
        let payments = load_payment_batch(&mut tx, SELECT_STUDENT_PAYMENTS, student_id).await?;

        tx.commit().await.map_err(sqlx_to_port_error)?;
        Ok((invoices, payments))
    }

    #[instrument(skip(self), fields(payment_id = %payment_id))]
    async fn load_payment(&self, payment_id: PaymentId) -> Result<Payment, PortError> {
        debug!("Loading payment");

        let row = sqlx::query_as::<_, PaymentRow>(
            "SELECT payment_id, receipt_number, student_id, invoice_id, payment_date,
                    currency, amount, payment_mode_id, reference_number, status,
                    received_by, notes, posted, created_at, reversed_at, reversal_reason
             FROM payments
             WHERE payment_id = $1",
        )
        .bind(*payment_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_to_port_error)?
        .ok_or_else(|| PortError::not_found("Payment", payment_id))?;

        payment_from_row(row).map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(payment_id = %payment_id))]
    async fn load_allocations(
        &self,
        payment_id: PaymentId,
    ) -> Result<Vec<PaymentAllocation>, PortError> {
        debug!("Loading allocations");

        let rows = sqlx::query_as::<_, AllocationRow>(
            "SELECT payment_id, invoice_id, currency, amount_applied, allocated_at
             FROM payment_allocations
             WHERE payment_id = $1
             ORDER BY allocated_at, allocation_id",
        )
        .bind(*payment_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_to_port_error)?;

        rows.into_iter()
            .map(|row| allocation_from_row(row).map_err(db_to_port_error))
            .collect()
    }

    #[instrument(
        skip(self, unit),
        fields(payment_id = %unit.payment.id, receipt_number = %unit.payment.receipt_number)
    )]
    async fn apply_receipt(&self, unit: PersistPayment) -> Result<(), PortError> {
        debug!(
            allocations = unit.allocations.len(),
            invoice_updates = unit.invoice_updates.len(),
            "Applying receipt"
        );

        let mut tx = self.pool.begin().await.map_err(sqlx_to_port_error)?;

        apply_invoice_updates(&mut tx, &unit.invoice_updates).await?;
        insert_payment(&mut tx, &unit.payment).await?;
        for allocation in &unit.allocations {
            insert_allocation(&mut tx, allocation).await?;
        }

        tx.commit().await.map_err(sqlx_to_port_error)?;
        Ok(())
    }

    #[instrument(skip(self, entry), fields(payment_id = %payment_id, entry_id = %entry.id))]
    async fn record_journal_entry(
        &self,
        payment_id: PaymentId,
        entry: &JournalEntry,
    ) -> Result<(), PortError> {
        debug!("Recording posting journal entry");

        let mut tx = self.pool.begin().await.map_err(sqlx_to_port_error)?;

        let updated = sqlx::query("UPDATE payments SET posted = TRUE WHERE payment_id = $1")
            .bind(*payment_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(sqlx_to_port_error)?
            .rows_affected();
        if updated == 0 {
            return Err(PortError::not_found("Payment", payment_id));
        }

        insert_journal_entry(&mut tx, payment_id, entry, "posting").await?;

        tx.commit().await.map_err(sqlx_to_port_error)?;
        Ok(())
    }

    #[instrument(skip(self), fields(payment_id = %payment_id))]
    async fn load_journal_entry_for_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<JournalEntry>, PortError> {
        debug!("Loading posting journal entry");

        let mut conn = self.pool.acquire().await.map_err(sqlx_to_port_error)?;
        let row = sqlx::query_as::<_, JournalEntryRow>(
            "SELECT entry_id, transaction_date, reference, narration, created_at
             FROM journal_entries
             WHERE payment_id = $1 AND entry_kind = 'posting'",
        )
        .bind(*payment_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(sqlx_to_port_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let line_rows = sqlx::query_as::<_, JournalLineRow>(
            "SELECT line_id, account_ref, currency, debit, credit
             FROM journal_lines
             WHERE entry_id = $1
             ORDER BY position",
        )
        .bind(row.entry_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(sqlx_to_port_error)?;

        journal_entry_from_rows(row, line_rows)
            .map(Some)
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self))]
    async fn list_unposted_payments(&self) -> Result<Vec<Payment>, PortError> {
        debug!("Listing unposted payments");

        let rows = sqlx::query_as::<_, PaymentRow>(
            "SELECT payment_id, receipt_number, student_id, invoice_id, payment_date,
                    currency, amount, payment_mode_id, reference_number, status,
                    received_by, notes, posted, created_at, reversed_at, reversal_reason
             FROM payments
             WHERE status = 'completed' AND NOT posted
             ORDER BY created_at, payment_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_to_port_error)?;

        rows.into_iter()
            .map(|row| payment_from_row(row).map_err(db_to_port_error))
            .collect()
    }

    #[instrument(skip(self, unit), fields(payment_id = %unit.payment_id))]
    async fn apply_reversal(&self, unit: PersistReversal) -> Result<(), PortError> {
        debug!(
            invoice_updates = unit.invoice_updates.len(),
            has_entry = unit.reversal_entry.is_some(),
            "Applying reversal"
        );

        let mut tx = self.pool.begin().await.map_err(sqlx_to_port_error)?;

        // Lock the payment row for the duration of the unit.
        let status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM payments WHERE payment_id = $1 FOR UPDATE",
        )
        .bind(*unit.payment_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(sqlx_to_port_error)?
        .ok_or_else(|| PortError::not_found("Payment", unit.payment_id))?;

        if status != PaymentStatus::Completed.as_str() {
            return Err(PortError::conflict(format!(
                "Payment {} is not in a reversible state",
                unit.payment_id
            )));
        }

        apply_invoice_updates(&mut tx, &unit.invoice_updates).await?;

        sqlx::query(
            "UPDATE payments
             SET status = $1, reversed_at = $2, reversal_reason = $3
             WHERE payment_id = $4",
        )
        .bind(PaymentStatus::Reversed.as_str())
        .bind(unit.reversed_at)
        .bind(&unit.reason)
        .bind(*unit.payment_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(sqlx_to_port_error)?;

        if let Some(ref entry) = unit.reversal_entry {
            insert_journal_entry(&mut tx, unit.payment_id, entry, "reversal").await?;
        }

        tx.commit().await.map_err(sqlx_to_port_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn max_receipt_sequence(&self, prefix: &str) -> Result<u64, PortError> {
        debug!("Scanning receipt sequence");

        let max: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(CAST(substring(receipt_number FROM char_length($1) + 2) AS BIGINT))
             FROM payments
             WHERE receipt_number LIKE $1 || '-%'
               AND substring(receipt_number FROM char_length($1) + 2) ~ '^[0-9]+$'",
        )
        .bind(prefix)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_to_port_error)?;

        Ok(max.and_then(|value| u64::try_from(value).ok()).unwrap_or(0))
    }

    #[instrument(skip(self))]
    async fn max_invoice_sequence(&self, prefix: &str) -> Result<u64, PortError> {
        debug!("Scanning invoice sequence");

        let max: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(CAST(substring(invoice_number FROM char_length($1) + 2) AS BIGINT))
             FROM invoices
             WHERE invoice_number LIKE $1 || '-%'
               AND substring(invoice_number FROM char_length($1) + 2) ~ '^[0-9]+$'",
        )
        .bind(prefix)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_to_port_error)?;

        Ok(max.and_then(|value| u64::try_from(value).ok()).unwrap_or(0))
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Applies version-checked invoice balance updates inside a transaction
///
/// When the compare-and-swap misses, the stored version is re-read to tell
/// a concurrent writer apart from a deleted invoice.
async fn apply_invoice_updates(
    tx: &mut Transaction<'_, Postgres>,
    updates: &[InvoiceUpdate],
) -> Result<(), PortError> {
    for update in updates {
        let affected = sqlx::query(
            "UPDATE invoices
             SET amount_paid = $1, balance_due = $2, status = $3, version = version + 1
             WHERE invoice_id = $4 AND version = $5",
        )
        .bind(update.new_amount_paid.amount())
        .bind(update.new_balance_due.amount())
        .bind(update.new_status.as_str())
        .bind(*update.invoice_id.as_uuid())
        .bind(i64::from(update.expected_version))
        .execute(&mut **tx)
        .await
        .map_err(sqlx_to_port_error)?
        .rows_affected();

        if affected == 0 {
            let current: Option<i64> =
                sqlx::query_scalar("SELECT version FROM invoices WHERE invoice_id = $1")
                    .bind(*update.invoice_id.as_uuid())
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(sqlx_to_port_error)?;

            return Err(match current {
                Some(version) => PortError::conflict(format!(
                    "Invoice {} moved from version {} to {}",
                    update.invoice_id, update.expected_version, version
                )),
                None => PortError::not_found("Invoice", update.invoice_id),
            });
        }
    }
    Ok(())
}

/// Inserts the payment row, classifying receipt number collisions
async fn insert_payment(
    tx: &mut Transaction<'_, Postgres>,
    payment: &Payment,
) -> Result<(), PortError> {
    sqlx::query(
        "INSERT INTO payments (payment_id, receipt_number, student_id, invoice_id,
                               payment_date, currency, amount, payment_mode_id,
                               reference_number, status, received_by, notes, posted,
                               created_at, reversed_at, reversal_reason)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
    )
    .bind(*payment.id.as_uuid())
    .bind(&payment.receipt_number)
    .bind(*payment.student_id.as_uuid())
    .bind(payment.invoice_id.map(|id| *id.as_uuid()))
    .bind(payment.payment_date)
    .bind(payment.amount.currency().code())
    .bind(payment.amount.amount())
    .bind(*payment.payment_mode.as_uuid())
    .bind(payment.reference_number.as_deref())
    .bind(payment.status.as_str())
    .bind(&payment.received_by)
    .bind(payment.notes.as_deref())
    .bind(payment.posted)
    .bind(payment.created_at)
    .bind(payment.reversed_at)
    .bind(payment.reversal_reason.as_deref())
    .execute(&mut **tx)
    .await
    .map_err(|error| match DatabaseError::from(error) {
        DatabaseError::DuplicateEntry(_) => {
            PortError::duplicate("Payment", &payment.receipt_number)
        }
        other => db_to_port_error(other),
    })?;
    Ok(())
}

/// Inserts one allocation row
async fn insert_allocation(
    tx: &mut Transaction<'_, Postgres>,
    allocation: &PaymentAllocation,
) -> Result<(), PortError> {
    sqlx::query(
        "INSERT INTO payment_allocations (payment_id, invoice_id, currency,
                                          amount_applied, allocated_at)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(*allocation.payment_id.as_uuid())
    .bind(*allocation.invoice_id.as_uuid())
    .bind(allocation.amount_applied.currency().code())
    .bind(allocation.amount_applied.amount())
    .bind(allocation.allocated_at)
    .execute(&mut **tx)
    .await
    .map_err(sqlx_to_port_error)?;
    Ok(())
}

/// Inserts a journal entry and its lines
///
/// The partial unique index on posting entries turns a second posting for
/// the same payment into a duplicate error.
async fn insert_journal_entry(
    tx: &mut Transaction<'_, Postgres>,
    payment_id: PaymentId,
    entry: &JournalEntry,
    kind: &str,
) -> Result<(), PortError> {
    sqlx::query(
        "INSERT INTO journal_entries (entry_id, payment_id, entry_kind, transaction_date,
                                      reference, narration, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(*entry.id.as_uuid())
    .bind(*payment_id.as_uuid())
    .bind(kind)
    .bind(entry.transaction_date)
    .bind(&entry.reference)
    .bind(&entry.narration)
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|error| match DatabaseError::from(error) {
        DatabaseError::DuplicateEntry(_) => PortError::duplicate("JournalEntry", payment_id),
        other => db_to_port_error(other),
    })?;

    for (position, line) in entry.lines.iter().enumerate() {
        sqlx::query(
            "INSERT INTO journal_lines (line_id, entry_id, position, account_ref,
                                        currency, debit, credit)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(*line.id.as_uuid())
        .bind(*entry.id.as_uuid())
        .bind(position as i32)
        .bind(line.account_ref.as_str())
        .bind(line.debit.currency().code())
        .bind(line.debit.amount())
        .bind(line.credit.amount())
        .execute(&mut **tx)
        .await
        .map_err(sqlx_to_port_error)?;
    }
    Ok(())
}

/// Fetches invoices with one of the shared queries and attaches line items
async fn load_invoice_batch(
    conn: &mut PgConnection,
    query: &str,
    student_id: StudentId,
) -> Result<Vec<Invoice>, PortError> {
    let rows = sqlx::query_as::<_, InvoiceRow>(query)
        .bind(*student_id.as_uuid())
        .fetch_all(&mut *conn)
        .await
        .map_err(sqlx_to_port_error)?;

    hydrate_invoices(conn, rows).await
}

/// Attaches line items to invoice rows with one batched query
async fn hydrate_invoices(
    conn: &mut PgConnection,
    rows: Vec<InvoiceRow>,
) -> Result<Vec<Invoice>, PortError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let invoice_ids: Vec<Uuid> = rows.iter().map(|row| row.invoice_id).collect();
    let line_rows = sqlx::query_as::<_, InvoiceLineItemRow>(
        "SELECT invoice_id, account_ref, description, currency, amount
         FROM invoice_line_items
         WHERE invoice_id = ANY($1)
         ORDER BY invoice_id, position",
    )
    .bind(invoice_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(sqlx_to_port_error)?;

    let mut items_by_invoice: HashMap<Uuid, Vec<InvoiceLineItemRow>> = HashMap::new();
    for line in line_rows {
        items_by_invoice
            .entry(line.invoice_id)
            .or_default()
            .push(line);
    }

    rows.into_iter()
        .map(|row| {
            let lines = items_by_invoice.remove(&row.invoice_id).unwrap_or_default();
            invoice_from_rows(row, lines).map_err(db_to_port_error)
        })
        .collect()
}

/// Fetches payments with one of the shared queries
async fn load_payment_batch(
    conn: &mut PgConnection,
    query: &str,
    student_id: StudentId,
) -> Result<Vec<Payment>, PortError> {
    let rows = sqlx::query_as::<_, PaymentRow>(query)
        .bind(*student_id.as_uuid())
        .fetch_all(conn)
        .await
        .map_err(sqlx_to_port_error)?;

    rows.into_iter()
        .map(|row| payment_from_row(row).map_err(db_to_port_error))
        .collect()
}

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    invoice_id: Uuid,
    student_id: Uuid,
    invoice_number: String,
    invoice_date: NaiveDate,
    due_date: NaiveDate,
    currency: String,
    total_amount: Decimal,
    amount_paid: Decimal,
    balance_due: Decimal,
    status: String,
    version: i64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceLineItemRow {
    invoice_id: Uuid,
    account_ref: String,
    description: String,
    currency: String,
    amount: Decimal,
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    payment_id: Uuid,
    receipt_number: String,
    student_id: Uuid,
    invoice_id: Option<Uuid>,
    payment_date: NaiveDate,
    currency: String,
    amount: Decimal,
    payment_mode_id: Uuid,
    reference_number: Option<String>,
    status: String,
    received_by: String,
    notes: Option<String>,
    posted: bool,
    created_at: DateTime<Utc>,
    reversed_at: Option<DateTime<Utc>>,
    reversal_reason: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct AllocationRow {
    payment_id: Uuid,
    invoice_id: Uuid,
    currency: String,
    amount_applied: Decimal,
    allocated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct JournalEntryRow {
    entry_id: Uuid,
    transaction_date: NaiveDate,
    reference: String,
    narration: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct JournalLineRow {
    line_id: Uuid,
    account_ref: String,
    currency: String,
    debit: Decimal,
    credit: Decimal,
}

// =============================================================================
// Conversion Functions
// =============================================================================

/// Converts a database error to a port error
fn db_to_port_error(error: DatabaseError) -> PortError {
    match error {
        DatabaseError::ConnectionFailed(message) => PortError::connection(message),
        DatabaseError::PoolExhausted => PortError::connection("Connection pool exhausted"),
        other => PortError::internal(other.to_string()),
    }
}

/// Converts a raw driver error to a port error
fn sqlx_to_port_error(error: sqlx::Error) -> PortError {
    db_to_port_error(DatabaseError::from(error))
}

/// Converts an invoice row and its line item rows to a domain invoice
fn invoice_from_rows(
    row: InvoiceRow,
    line_rows: Vec<InvoiceLineItemRow>,
) -> Result<Invoice, DatabaseError> {
    let currency: Currency = row.currency.parse().map_err(DatabaseError::RowMapping)?;
    let status: InvoiceStatus = row.status.parse().map_err(DatabaseError::RowMapping)?;
    let version = u32::try_from(row.version).map_err(|_| {
        DatabaseError::RowMapping(format!(
            "Invoice {} version {} out of range",
            row.invoice_id, row.version
        ))
    })?;

    let line_items = line_rows
        .into_iter()
        .map(line_item_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Invoice {
        id: InvoiceId::from(row.invoice_id),
        student_id: StudentId::from(row.student_id),
        invoice_number: row.invoice_number,
        invoice_date: row.invoice_date,
        due_date: row.due_date,
        total_amount: Money::new(row.total_amount, currency),
        amount_paid: Money::new(row.amount_paid, currency),
        balance_due: Money::new(row.balance_due, currency),
        status,
        line_items,
        created_at: row.created_at,
        version,
    })
}

/// Converts a line item row to a domain line item
fn line_item_from_row(row: InvoiceLineItemRow) -> Result<InvoiceLineItem, DatabaseError> {
    let currency: Currency = row.currency.parse().map_err(DatabaseError::RowMapping)?;
    Ok(InvoiceLineItem {
        invoice_id: InvoiceId::from(row.invoice_id),
        account_ref: AccountRef::new(row.account_ref),
        description: row.description,
        amount: Money::new(row.amount, currency),
    })
}

/// Converts a payment row to a domain payment
fn payment_from_row(row: PaymentRow) -> Result<Payment, DatabaseError> {
    let currency: Currency = row.currency.parse().map_err(DatabaseError::RowMapping)?;
    let status: PaymentStatus = row.status.parse().map_err(DatabaseError::RowMapping)?;

    Ok(Payment {
        id: PaymentId::from(row.payment_id),
        receipt_number: row.receipt_number,
        student_id: StudentId::from(row.student_id),
        invoice_id: row.invoice_id.map(InvoiceId::from),
        payment_date: row.payment_date,
        amount: Money::new(row.amount, currency),
        payment_mode: PaymentModeId::from(row.payment_mode_id),
        reference_number: row.reference_number,
        status,
        received_by: row.received_by,
        notes: row.notes,
        posted: row.posted,
        created_at: row.created_at,
        reversed_at: row.reversed_at,
        reversal_reason: row.reversal_reason,
    })
}

/// Converts an allocation row to a domain allocation
fn allocation_from_row(row: AllocationRow) -> Result<PaymentAllocation, DatabaseError> {
    let currency: Currency = row.currency.parse().map_err(DatabaseError::RowMapping)?;
    Ok(PaymentAllocation {
        payment_id: PaymentId::from(row.payment_id),
        invoice_id: InvoiceId::from(row.invoice_id),
        amount_applied: Money::new(row.amount_applied, currency),
        allocated_at: row.allocated_at,
    })
}

/// Converts a journal entry row and its line rows to a domain entry
fn journal_entry_from_rows(
    row: JournalEntryRow,
    line_rows: Vec<JournalLineRow>,
) -> Result<JournalEntry, DatabaseError> {
    let lines = line_rows
        .into_iter()
        .map(journal_line_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(JournalEntry {
        id: JournalEntryId::from(row.entry_id),
        transaction_date: row.transaction_date,
        reference: row.reference,
        narration: row.narration,
        lines,
        created_at: row.created_at,
    })
}

/// Converts a journal line row to a domain ledger line
fn journal_line_from_row(row: JournalLineRow) -> Result<LedgerLine, DatabaseError> {
    let currency: Currency = row.currency.parse().map_err(DatabaseError::RowMapping)?;
    Ok(LedgerLine {
        id: LedgerLineId::from(row.line_id),
        account_ref: AccountRef::new(row.account_ref),
        debit: Money::new(row.debit, currency),
        credit: Money::new(row.credit, currency),
    })
}
