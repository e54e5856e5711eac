//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else.

use chrono::NaiveDate;
use core_kernel::{InvoiceId, Money, PaymentModeId, StudentId};
use domain_fees::{Invoice, NewLineItem, Payment};

use crate::fixtures::{IdFixtures, MoneyFixtures, StringFixtures, TemporalFixtures};

/// Builder for constructing test invoices
///
/// Defaults to the standard term fee structure: tuition and transport for
/// one student, due thirty days after the term opens.
pub struct TestInvoiceBuilder {
    student_id: StudentId,
    invoice_number: String,
    invoice_date: NaiveDate,
    due_date: NaiveDate,
    line_items: Vec<NewLineItem>,
    settled: Option<Money>,
}

impl Default for TestInvoiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestInvoiceBuilder {
    /// Creates a new builder with default values
    pub fn new() -> Self {
        Self {
            student_id: IdFixtures::student_id(),
            invoice_number: StringFixtures::invoice_number().to_string(),
            invoice_date: TemporalFixtures::term_start(),
            due_date: TemporalFixtures::fees_due(),
            line_items: vec![
                NewLineItem::new(
                    StringFixtures::tuition_account(),
                    "Term 1 Tuition",
                    MoneyFixtures::term_tuition(),
                ),
                NewLineItem::new(
                    StringFixtures::transport_account(),
                    "Term 1 Transport",
                    MoneyFixtures::term_transport(),
                ),
            ],
            settled: None,
        }
    }

    /// Sets the student
    pub fn with_student_id(mut self, id: StudentId) -> Self {
        self.student_id = id;
        self
    }

    /// Sets the invoice number
    pub fn with_invoice_number(mut self, number: impl Into<String>) -> Self {
        self.invoice_number = number.into();
        self
    }

    /// Sets the invoice date
    pub fn with_invoice_date(mut self, date: NaiveDate) -> Self {
        self.invoice_date = date;
        self
    }

    /// Sets the due date
    pub fn with_due_date(mut self, date: NaiveDate) -> Self {
        self.due_date = date;
        self
    }

    /// Replaces the line items
    pub fn with_line_items(mut self, items: Vec<NewLineItem>) -> Self {
        self.line_items = items;
        self
    }

    /// Appends one line item
    pub fn with_line_item(
        mut self,
        account: &str,
        description: &str,
        amount: Money,
    ) -> Self {
        self.line_items
            .push(NewLineItem::new(account, description, amount));
        self
    }

    /// Replaces the line items with a single charge for the given amount
    pub fn with_single_charge(mut self, amount: Money) -> Self {
        self.line_items = vec![NewLineItem::new(
            StringFixtures::tuition_account(),
            "Term Fees",
            amount,
        )];
        self
    }

    /// Applies a settlement after construction, moving the invoice out of draft
    pub fn with_settlement(mut self, amount: Money) -> Self {
        self.settled = Some(amount);
        self
    }

    /// Builds the invoice
    ///
    /// # Panics
    ///
    /// Panics if the configured line items or settlement are invalid; test
    /// setup bugs should fail loudly.
    pub fn build(self) -> Invoice {
        let mut invoice = Invoice::new(
            self.student_id,
            self.invoice_number,
            self.invoice_date,
            self.due_date,
            self.line_items,
        )
        .expect("Builder produced an invalid invoice");

        if let Some(amount) = self.settled {
            invoice
                .apply_settlement(amount)
                .expect("Builder settlement exceeds the invoice balance");
        }

        invoice
    }
}

/// Builder for constructing test payments
pub struct TestPaymentBuilder {
    receipt_number: String,
    student_id: StudentId,
    invoice_id: Option<InvoiceId>,
    payment_date: NaiveDate,
    amount: Money,
    payment_mode: PaymentModeId,
    reference_number: Option<String>,
    received_by: String,
    notes: Option<String>,
}

impl Default for TestPaymentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPaymentBuilder {
    /// Creates a new builder with default values
    pub fn new() -> Self {
        Self {
            receipt_number: StringFixtures::receipt_number().to_string(),
            student_id: IdFixtures::student_id(),
            invoice_id: None,
            payment_date: TemporalFixtures::term_start(),
            amount: MoneyFixtures::installment(),
            payment_mode: IdFixtures::payment_mode_id(),
            reference_number: None,
            received_by: StringFixtures::cashier().to_string(),
            notes: None,
        }
    }

    /// Sets the receipt number
    pub fn with_receipt_number(mut self, number: impl Into<String>) -> Self {
        self.receipt_number = number.into();
        self
    }

    /// Sets the student
    pub fn with_student_id(mut self, id: StudentId) -> Self {
        self.student_id = id;
        self
    }

    /// Targets a specific invoice instead of oldest-first allocation
    pub fn with_invoice_id(mut self, id: InvoiceId) -> Self {
        self.invoice_id = Some(id);
        self
    }

    /// Sets the payment date
    pub fn with_payment_date(mut self, date: NaiveDate) -> Self {
        self.payment_date = date;
        self
    }

    /// Sets the amount
    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = amount;
        self
    }

    /// Sets the payment mode
    pub fn with_payment_mode(mut self, mode: PaymentModeId) -> Self {
        self.payment_mode = mode;
        self
    }

    /// Sets the external reference number
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference_number = Some(reference.into());
        self
    }

    /// Sets the capturing cashier
    pub fn with_received_by(mut self, cashier: impl Into<String>) -> Self {
        self.received_by = cashier.into();
        self
    }

    /// Sets free-form notes
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Builds the payment
    ///
    /// # Panics
    ///
    /// Panics if the configured amount is not positive.
    pub fn build(self) -> Payment {
        Payment::new(
            self.receipt_number,
            self.student_id,
            self.invoice_id,
            self.payment_date,
            self.amount,
            self.payment_mode,
            self.reference_number,
            self.received_by,
            self.notes,
        )
        .expect("Builder produced an invalid payment")
    }

    /// Builds the payment already reversed, for statement and audit tests
    pub fn build_reversed(self, reason: &str) -> Payment {
        let mut payment = self.build();
        payment
            .reverse(reason, TemporalFixtures::reversed_at())
            .expect("Fresh payment should be reversible");
        payment
    }
}
