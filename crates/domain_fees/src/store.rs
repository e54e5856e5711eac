//! In-memory port implementations
//!
//! `MemoryLedgerStore` implements the full `LedgerStore` contract, including
//! the optimistic version checks, behind a single `tokio::sync::RwLock`. It
//! backs the test suites and serves as the embedded deployment for callers
//! that do not need durability. The write lock is never held across an
//! await, so no caller can wedge the store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use core_kernel::{
    AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable, InvoiceId, PaymentId,
    PaymentModeId, PortError, StudentId,
};

use crate::invoice::Invoice;
use crate::journal::JournalEntry;
use crate::payment::{Payment, PaymentAllocation};
use crate::ports::{
    InvoiceUpdate, LedgerStore, PaymentMode, PaymentModeDirectory, PersistPayment,
    PersistReversal, StudentDirectory, StudentProfile,
};

#[derive(Debug, Default)]
struct LedgerState {
    invoices: HashMap<InvoiceId, Invoice>,
    payments: HashMap<PaymentId, Payment>,
    allocations: Vec<PaymentAllocation>,
    postings: HashMap<PaymentId, JournalEntry>,
    reversals: HashMap<PaymentId, JournalEntry>,
}

impl LedgerState {
    /// Checks every expected version against the stored invoices
    fn check_versions(&self, updates: &[InvoiceUpdate]) -> Result<(), PortError> {
        for update in updates {
            let invoice = self
                .invoices
                .get(&update.invoice_id)
                .ok_or_else(|| PortError::not_found("Invoice", update.invoice_id))?;
            if invoice.version != update.expected_version {
                return Err(PortError::conflict(format!(
                    "Invoice {} moved from version {} to {}",
                    update.invoice_id, update.expected_version, invoice.version
                )));
            }
        }
        Ok(())
    }

    /// Applies pre-checked updates, bumping each version
    fn apply_updates(&mut self, updates: &[InvoiceUpdate]) {
        for update in updates {
            if let Some(invoice) = self.invoices.get_mut(&update.invoice_id) {
                invoice.amount_paid = update.new_amount_paid;
                invoice.balance_due = update.new_balance_due;
                invoice.status = update.new_status;
                invoice.version = update.expected_version + 1;
            }
        }
    }
}

/// In-memory implementation of [`LedgerStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    inner: Arc<RwLock<LedgerState>>,
}

impl MemoryLedgerStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with invoices
    pub async fn with_invoices(invoices: Vec<Invoice>) -> Self {
        let store = Self::new();
        {
            let mut state = store.inner.write().await;
            for invoice in invoices {
                state.invoices.insert(invoice.id, invoice);
            }
        }
        store
    }
}

impl DomainPort for MemoryLedgerStore {}

#[async_trait]
impl HealthCheckable for MemoryLedgerStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult {
            adapter_id: "memory-ledger-store".to_string(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: Some("In-memory store always healthy".to_string()),
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), PortError> {
        let mut state = self.inner.write().await;
        if state
            .invoices
            .values()
            .any(|existing| existing.invoice_number == invoice.invoice_number)
        {
            return Err(PortError::duplicate("Invoice", &invoice.invoice_number));
        }
        state.invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn load_invoice(&self, invoice_id: InvoiceId) -> Result<Invoice, PortError> {
        self.inner
            .read()
            .await
            .invoices
            .get(&invoice_id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Invoice", invoice_id))
    }

    async fn load_open_invoices(&self, student_id: StudentId) -> Result<Vec<Invoice>, PortError> {
        let state = self.inner.read().await;
        let mut invoices: Vec<_> = state
            .invoices
            .values()
            .filter(|invoice| invoice.student_id == student_id && invoice.is_open())
            .cloned()
            .collect();
        invoices.sort_by_key(|invoice| {
            (invoice.invoice_date, invoice.created_at, *invoice.id.as_uuid())
        });
        Ok(invoices)
    }

    async fn load_student_invoices(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<Invoice>, PortError> {
        let state = self.inner.read().await;
        let mut invoices: Vec<_> = state
            .invoices
            .values()
            .filter(|invoice| invoice.student_id == student_id)
            .cloned()
            .collect();
        invoices.sort_by_key(|invoice| {
            (invoice.invoice_date, invoice.created_at, *invoice.id.as_uuid())
        });
        Ok(invoices)
    }

    async fn load_student_payments(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<Payment>, PortError> {
        let state = self.inner.read().await;
        let mut payments: Vec<_> = state
            .payments
            .values()
            .filter(|payment| payment.student_id == student_id)
            .cloned()
            .collect();
        payments.sort_by_key(|payment| {
            (payment.payment_date, payment.created_at, *payment.id.as_uuid())
        });
        Ok(payments)
    }

    async fn load_student_ledger(
        &self,
        student_id: StudentId,
    ) -> Result<(Vec<Invoice>, Vec<Payment>), PortError> {
        // Single read guard so invoices and payments come from one snapshot
        let state = self.inner.read().await;
        let mut invoices: Vec<_> = state
            .invoices
            .values()
            .filter(|invoice| invoice.student_id == student_id)
            .cloned()
            .collect();
        invoices.sort_by_key(|invoice| {
            (invoice.invoice_date, invoice.created_at, *invoice.id.as_uuid())
        });
        let mut payments: Vec<_> = state
            .payments
            .values()
            .filter(|payment| payment.student_id == student_id)
            .cloned()
            .collect();
        payments.sort_by_key(|payment| {
            (payment.payment_date, payment.created_at, *payment.id.as_uuid())
        });
        Ok((invoices, payments))
    }

    async fn load_payment(&self, payment_id: PaymentId) -> Result<Payment, PortError> {
        self.inner
            .read()
            .await
            .payments
            .get(&payment_id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Payment", payment_id))
    }

    async fn load_allocations(
        &self,
        payment_id: PaymentId,
    ) -> Result<Vec<PaymentAllocation>, PortError> {
        let state = self.inner.read().await;
        Ok(state
            .allocations
            .iter()
            .filter(|allocation| allocation.payment_id == payment_id)
            .cloned()
            .collect())
    }

    async fn apply_receipt(&self, unit: PersistPayment) -> Result<(), PortError> {
        let mut state = self.inner.write().await;

        // Validate everything before touching anything
        state.check_versions(&unit.invoice_updates)?;
        if state
            .payments
            .values()
            .any(|existing| existing.receipt_number == unit.payment.receipt_number)
        {
            return Err(PortError::duplicate("Payment", &unit.payment.receipt_number));
        }

        state.apply_updates(&unit.invoice_updates);
        state.allocations.extend(unit.allocations);
        state.payments.insert(unit.payment.id, unit.payment);
        Ok(())
    }

    async fn record_journal_entry(
        &self,
        payment_id: PaymentId,
        entry: &JournalEntry,
    ) -> Result<(), PortError> {
        let mut state = self.inner.write().await;
        if state.postings.contains_key(&payment_id) {
            return Err(PortError::duplicate("JournalEntry", payment_id));
        }
        let payment = state
            .payments
            .get_mut(&payment_id)
            .ok_or_else(|| PortError::not_found("Payment", payment_id))?;
        payment.mark_posted();
        state.postings.insert(payment_id, entry.clone());
        Ok(())
    }

    async fn load_journal_entry_for_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<JournalEntry>, PortError> {
        Ok(self.inner.read().await.postings.get(&payment_id).cloned())
    }

    async fn list_unposted_payments(&self) -> Result<Vec<Payment>, PortError> {
        let state = self.inner.read().await;
        let mut payments: Vec<_> = state
            .payments
            .values()
            .filter(|payment| payment.is_completed() && !payment.posted)
            .cloned()
            .collect();
        payments.sort_by_key(|payment| (payment.created_at, *payment.id.as_uuid()));
        Ok(payments)
    }

    async fn apply_reversal(&self, unit: PersistReversal) -> Result<(), PortError> {
        let mut state = self.inner.write().await;

        let payment = state
            .payments
            .get(&unit.payment_id)
            .ok_or_else(|| PortError::not_found("Payment", unit.payment_id))?;
        if !payment.is_completed() {
            return Err(PortError::conflict(format!(
                "Payment {} is not in a reversible state",
                unit.payment_id
            )));
        }
        state.check_versions(&unit.invoice_updates)?;

        state.apply_updates(&unit.invoice_updates);
        if let Some(payment) = state.payments.get_mut(&unit.payment_id) {
            payment
                .reverse(&unit.reason, unit.reversed_at)
                .map_err(|error| PortError::conflict(error.to_string()))?;
        }
        if let Some(entry) = unit.reversal_entry {
            state.reversals.insert(unit.payment_id, entry);
        }
        Ok(())
    }

    async fn max_receipt_sequence(&self, prefix: &str) -> Result<u64, PortError> {
        let state = self.inner.read().await;
        let max = state
            .payments
            .values()
            .filter_map(|payment| parse_sequence(&payment.receipt_number, prefix))
            .max()
            .unwrap_or(0);
        Ok(max)
    }

    async fn max_invoice_sequence(&self, prefix: &str) -> Result<u64, PortError> {
        let state = self.inner.read().await;
        let max = state
            .invoices
            .values()
            .filter_map(|invoice| parse_sequence(&invoice.invoice_number, prefix))
            .max()
            .unwrap_or(0);
        Ok(max)
    }
}

/// Extracts the numeric tail of `PREFIX-000042` style numbers
fn parse_sequence(number: &str, prefix: &str) -> Option<u64> {
    number
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|digits| digits.parse::<u64>().ok())
}

/// In-memory implementation of [`StudentDirectory`]
#[derive(Debug, Clone, Default)]
pub struct MemoryStudentDirectory {
    students: Arc<RwLock<HashMap<StudentId, StudentProfile>>>,
}

impl MemoryStudentDirectory {
    /// Creates an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory pre-populated with students
    pub async fn with_students(students: Vec<StudentProfile>) -> Self {
        let directory = Self::new();
        {
            let mut map = directory.students.write().await;
            for student in students {
                map.insert(student.id, student);
            }
        }
        directory
    }

    /// Adds or replaces a student
    pub async fn register(&self, student: StudentProfile) {
        self.students.write().await.insert(student.id, student);
    }
}

impl DomainPort for MemoryStudentDirectory {}

#[async_trait]
impl StudentDirectory for MemoryStudentDirectory {
    async fn find_student(&self, student_id: StudentId) -> Result<StudentProfile, PortError> {
        self.students
            .read()
            .await
            .get(&student_id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Student", student_id))
    }
}

/// Fixed payment mode configuration
///
/// Payment modes change through administration, not through this engine, so
/// a plain immutable list is enough for embedded and test deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticPaymentModes {
    modes: Vec<PaymentMode>,
}

impl StaticPaymentModes {
    /// Creates a directory over the given modes
    pub fn new(modes: Vec<PaymentMode>) -> Self {
        Self { modes }
    }
}

impl DomainPort for StaticPaymentModes {}

#[async_trait]
impl PaymentModeDirectory for StaticPaymentModes {
    async fn find_mode(&self, mode_id: PaymentModeId) -> Result<PaymentMode, PortError> {
        self.modes
            .iter()
            .find(|mode| mode.id == mode_id)
            .cloned()
            .ok_or_else(|| PortError::not_found("PaymentMode", mode_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::{InvoiceStatus, NewLineItem};
    use chrono::NaiveDate;
    use core_kernel::{AccountRef, Currency, Money};
    use rust_decimal_macros::dec;

    fn kes(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::KES)
    }

    fn test_invoice(student_id: StudentId, number: &str) -> Invoice {
        Invoice::new(
            student_id,
            number,
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            vec![NewLineItem::new("4010-TUITION", "Tuition", kes(dec!(1000)))],
        )
        .unwrap()
    }

    fn test_payment(student_id: StudentId, receipt: &str) -> Payment {
        Payment::new(
            receipt,
            student_id,
            None,
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            kes(dec!(400)),
            PaymentModeId::new(),
            None,
            "cashier-01",
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_load_invoice() {
        let store = MemoryLedgerStore::new();
        let invoice = test_invoice(StudentId::new(), "INV-001");

        store.insert_invoice(&invoice).await.unwrap();
        let loaded = store.load_invoice(invoice.id).await.unwrap();

        assert_eq!(loaded.invoice_number, "INV-001");
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn test_duplicate_invoice_number_rejected() {
        let store = MemoryLedgerStore::new();
        let student = StudentId::new();
        store.insert_invoice(&test_invoice(student, "INV-001")).await.unwrap();

        let result = store.insert_invoice(&test_invoice(student, "INV-001")).await;
        assert!(matches!(result, Err(PortError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn test_open_invoices_ordered_oldest_first() {
        let student = StudentId::new();
        let mut newer = test_invoice(student, "INV-002");
        newer.invoice_date = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        let older = test_invoice(student, "INV-001");

        let store = MemoryLedgerStore::with_invoices(vec![newer, older]).await;
        let open = store.load_open_invoices(student).await.unwrap();

        assert_eq!(open.len(), 2);
        assert_eq!(open[0].invoice_number, "INV-001");
        assert_eq!(open[1].invoice_number, "INV-002");
    }

    #[tokio::test]
    async fn test_apply_receipt_checks_version() {
        let student = StudentId::new();
        let invoice = test_invoice(student, "INV-001");
        let invoice_id = invoice.id;
        let store = MemoryLedgerStore::with_invoices(vec![invoice]).await;

        let payment = test_payment(student, "RCP-000001");
        let stale_unit = PersistPayment {
            payment: payment.clone(),
            allocations: vec![PaymentAllocation::new(payment.id, invoice_id, kes(dec!(400)))],
            invoice_updates: vec![InvoiceUpdate {
                invoice_id,
                expected_version: 7,
                new_amount_paid: kes(dec!(400)),
                new_balance_due: kes(dec!(600)),
                new_status: InvoiceStatus::Partial,
            }],
        };

        let result = store.apply_receipt(stale_unit).await;
        assert!(matches!(result, Err(PortError::Conflict { .. })));

        // Nothing was written
        assert!(store.load_payment(payment.id).await.is_err());
        let untouched = store.load_invoice(invoice_id).await.unwrap();
        assert!(untouched.amount_paid.is_zero());
        assert_eq!(untouched.version, 1);
    }

    #[tokio::test]
    async fn test_apply_receipt_bumps_version() {
        let student = StudentId::new();
        let invoice = test_invoice(student, "INV-001");
        let invoice_id = invoice.id;
        let store = MemoryLedgerStore::with_invoices(vec![invoice]).await;

        let payment = test_payment(student, "RCP-000001");
        let unit = PersistPayment {
            payment: payment.clone(),
            allocations: vec![PaymentAllocation::new(payment.id, invoice_id, kes(dec!(400)))],
            invoice_updates: vec![InvoiceUpdate {
                invoice_id,
                expected_version: 1,
                new_amount_paid: kes(dec!(400)),
                new_balance_due: kes(dec!(600)),
                new_status: InvoiceStatus::Partial,
            }],
        };

        store.apply_receipt(unit).await.unwrap();

        let updated = store.load_invoice(invoice_id).await.unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.balance_due, kes(dec!(600)));
        assert_eq!(updated.status, InvoiceStatus::Partial);

        let allocations = store.load_allocations(payment.id).await.unwrap();
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].invoice_id, invoice_id);
    }

    #[tokio::test]
    async fn test_apply_receipt_rejects_duplicate_receipt_number() {
        let student = StudentId::new();
        let store = MemoryLedgerStore::new();

        let first = PersistPayment {
            payment: test_payment(student, "RCP-000001"),
            allocations: vec![],
            invoice_updates: vec![],
        };
        store.apply_receipt(first).await.unwrap();

        let second = PersistPayment {
            payment: test_payment(student, "RCP-000001"),
            allocations: vec![],
            invoice_updates: vec![],
        };
        let result = store.apply_receipt(second).await;
        assert!(matches!(result, Err(PortError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn test_record_journal_entry_once() {
        let student = StudentId::new();
        let store = MemoryLedgerStore::new();
        let payment = test_payment(student, "RCP-000001");
        store
            .apply_receipt(PersistPayment {
                payment: payment.clone(),
                allocations: vec![],
                invoice_updates: vec![],
            })
            .await
            .unwrap();

        let entry = JournalEntry::builder("Fee payment receipt RCP-000001")
            .reference("RCP-000001")
            .debit(AccountRef::new("1010-CASH"), kes(dec!(400)))
            .credit(AccountRef::new("1200-FEES-RECEIVABLE"), kes(dec!(400)))
            .build()
            .unwrap();

        store.record_journal_entry(payment.id, &entry).await.unwrap();
        assert!(store.load_payment(payment.id).await.unwrap().posted);
        assert!(store
            .load_journal_entry_for_payment(payment.id)
            .await
            .unwrap()
            .is_some());

        let again = store.record_journal_entry(payment.id, &entry).await;
        assert!(matches!(again, Err(PortError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn test_list_unposted_payments() {
        let student = StudentId::new();
        let store = MemoryLedgerStore::new();
        let unposted = test_payment(student, "RCP-000001");
        let posted = test_payment(student, "RCP-000002");

        for payment in [&unposted, &posted] {
            store
                .apply_receipt(PersistPayment {
                    payment: payment.clone(),
                    allocations: vec![],
                    invoice_updates: vec![],
                })
                .await
                .unwrap();
        }
        let entry = JournalEntry::builder("Fee payment receipt RCP-000002")
            .reference("RCP-000002")
            .debit(AccountRef::new("1010-CASH"), kes(dec!(400)))
            .credit(AccountRef::new("1200-FEES-RECEIVABLE"), kes(dec!(400)))
            .build()
            .unwrap();
        store.record_journal_entry(posted.id, &entry).await.unwrap();

        let queue = store.list_unposted_payments().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, unposted.id);
    }

    #[tokio::test]
    async fn test_apply_reversal_reopens_invoice() {
        let student = StudentId::new();
        let invoice = test_invoice(student, "INV-001");
        let invoice_id = invoice.id;
        let store = MemoryLedgerStore::with_invoices(vec![invoice]).await;

        let payment = test_payment(student, "RCP-000001");
        store
            .apply_receipt(PersistPayment {
                payment: payment.clone(),
                allocations: vec![PaymentAllocation::new(payment.id, invoice_id, kes(dec!(400)))],
                invoice_updates: vec![InvoiceUpdate {
                    invoice_id,
                    expected_version: 1,
                    new_amount_paid: kes(dec!(400)),
                    new_balance_due: kes(dec!(600)),
                    new_status: InvoiceStatus::Partial,
                }],
            })
            .await
            .unwrap();

        store
            .apply_reversal(PersistReversal {
                payment_id: payment.id,
                reason: "Cashier error".to_string(),
                reversed_at: Utc::now(),
                invoice_updates: vec![InvoiceUpdate {
                    invoice_id,
                    expected_version: 2,
                    new_amount_paid: kes(dec!(0)),
                    new_balance_due: kes(dec!(1000)),
                    new_status: InvoiceStatus::Draft,
                }],
                reversal_entry: None,
            })
            .await
            .unwrap();

        let reversed = store.load_payment(payment.id).await.unwrap();
        assert!(!reversed.is_completed());
        assert_eq!(reversed.reversal_reason.as_deref(), Some("Cashier error"));

        let reopened = store.load_invoice(invoice_id).await.unwrap();
        assert_eq!(reopened.balance_due, kes(dec!(1000)));
        assert_eq!(reopened.version, 3);
    }

    #[tokio::test]
    async fn test_apply_reversal_twice_conflicts() {
        let student = StudentId::new();
        let store = MemoryLedgerStore::new();
        let payment = test_payment(student, "RCP-000001");
        store
            .apply_receipt(PersistPayment {
                payment: payment.clone(),
                allocations: vec![],
                invoice_updates: vec![],
            })
            .await
            .unwrap();

        let unit = PersistReversal {
            payment_id: payment.id,
            reason: "First".to_string(),
            reversed_at: Utc::now(),
            invoice_updates: vec![],
            reversal_entry: None,
        };
        store.apply_reversal(unit.clone()).await.unwrap();

        let again = store.apply_reversal(unit).await;
        assert!(matches!(again, Err(PortError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_max_receipt_sequence() {
        let student = StudentId::new();
        let store = MemoryLedgerStore::new();
        assert_eq!(store.max_receipt_sequence("RCP").await.unwrap(), 0);

        for receipt in ["RCP-000003", "RCP-000011", "RCP-000007"] {
            store
                .apply_receipt(PersistPayment {
                    payment: test_payment(student, receipt),
                    allocations: vec![],
                    invoice_updates: vec![],
                })
                .await
                .unwrap();
        }

        assert_eq!(store.max_receipt_sequence("RCP").await.unwrap(), 11);
        assert_eq!(store.max_receipt_sequence("INV").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_max_invoice_sequence() {
        let student = StudentId::new();
        let store = MemoryLedgerStore::with_invoices(vec![
            test_invoice(student, "INV-000004"),
            test_invoice(student, "INV-000009"),
            test_invoice(student, "legacy-17"),
        ])
        .await;

        assert_eq!(store.max_invoice_sequence("INV").await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_student_directory() {
        let student_id = StudentId::new();
        let directory = MemoryStudentDirectory::with_students(vec![StudentProfile {
            id: student_id,
            name: "Jane Wanjiku".to_string(),
            student_no: "ADM-0012".to_string(),
        }])
        .await;

        let profile = directory.find_student(student_id).await.unwrap();
        assert_eq!(profile.name, "Jane Wanjiku");

        let missing = directory.find_student(StudentId::new()).await;
        assert!(missing.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_static_payment_modes() {
        let cash_id = PaymentModeId::new();
        let modes = StaticPaymentModes::new(vec![PaymentMode {
            id: cash_id,
            name: "Cash".to_string(),
            asset_account: Some(AccountRef::new("1010-CASH")),
        }]);

        let cash = modes.find_mode(cash_id).await.unwrap();
        assert_eq!(cash.name, "Cash");

        let missing = modes.find_mode(PaymentModeId::new()).await;
        assert!(missing.unwrap_err().is_not_found());
    }
}
