//! Chronological fee statements
//!
//! A statement replays a student's invoices and completed payments in date
//! order and folds the running balance left to right. It is rebuilt from raw
//! facts on every request; no stored running total is ever trusted. Repeated
//! builds over the same snapshot are identical because ties on date are
//! broken by creation time and then by identifier.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{Currency, Money, StudentId};

use crate::error::FeesError;
use crate::invoice::Invoice;
use crate::payment::Payment;

/// Which side of the ledger a statement line sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementLineKind {
    /// A charge (invoice)
    Debit,
    /// Money received (payment)
    Credit,
}

/// One row of a statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementLine {
    /// Value date
    pub date: NaiveDate,
    /// Debit or credit
    pub kind: StatementLineKind,
    /// Invoice number or receipt number
    pub reference: String,
    /// Human-readable description
    pub description: String,
    /// Line amount, always positive
    pub amount: Money,
    /// Balance after this line
    pub running_balance: Money,
}

/// A student's chronological fee statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// The student
    pub student_id: StudentId,
    /// Rows in date order
    pub lines: Vec<StatementLine>,
    /// Balance after the last row (zero for an empty statement)
    pub closing_balance: Money,
}

/// Builds statements from invoice and payment facts
#[derive(Debug, Clone, Copy)]
pub struct StatementBuilder {
    currency: Currency,
}

/// Unsorted statement material before the fold
struct RawLine {
    date: NaiveDate,
    created_at: DateTime<Utc>,
    id: Uuid,
    kind: StatementLineKind,
    reference: String,
    description: String,
    amount: Money,
}

impl StatementBuilder {
    /// Creates a builder for the given ledger currency
    pub fn new(currency: Currency) -> Self {
        Self { currency }
    }

    /// Builds the statement over a consistent snapshot
    ///
    /// Invoices appear as debits dated on their invoice date; completed
    /// payments as credits on their payment date. Reversed payments are
    /// omitted entirely. Lines sort by `(date, created_at, id)` and the
    /// running balance is recomputed by a single fold, debit adding and
    /// credit subtracting.
    pub fn build(
        &self,
        student_id: StudentId,
        invoices: &[Invoice],
        payments: &[Payment],
    ) -> Result<Statement, FeesError> {
        let mut raw: Vec<RawLine> = Vec::with_capacity(invoices.len() + payments.len());

        for invoice in invoices {
            let description = invoice
                .line_items
                .iter()
                .map(|item| item.description.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            raw.push(RawLine {
                date: invoice.invoice_date,
                created_at: invoice.created_at,
                id: *invoice.id.as_uuid(),
                kind: StatementLineKind::Debit,
                reference: invoice.invoice_number.clone(),
                description,
                amount: invoice.total_amount,
            });
        }

        for payment in payments.iter().filter(|payment| payment.is_completed()) {
            let description = match &payment.reference_number {
                Some(reference) => format!("Payment received - {reference}"),
                None => "Payment received".to_string(),
            };
            raw.push(RawLine {
                date: payment.payment_date,
                created_at: payment.created_at,
                id: *payment.id.as_uuid(),
                kind: StatementLineKind::Credit,
                reference: payment.receipt_number.clone(),
                description,
                amount: payment.amount,
            });
        }

        raw.sort_by_key(|line| (line.date, line.created_at, line.id));

        let mut running = Money::zero(self.currency);
        let mut lines = Vec::with_capacity(raw.len());
        for line in raw {
            running = match line.kind {
                StatementLineKind::Debit => running.checked_add(&line.amount)?,
                StatementLineKind::Credit => running.checked_sub(&line.amount)?,
            };
            lines.push(StatementLine {
                date: line.date,
                kind: line.kind,
                reference: line.reference,
                description: line.description,
                amount: line.amount,
                running_balance: running,
            });
        }

        Ok(Statement {
            student_id,
            lines,
            closing_balance: running,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::NewLineItem;
    use core_kernel::PaymentModeId;
    use rust_decimal_macros::dec;

    fn kes(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::KES)
    }

    fn invoice_on(
        student_id: StudentId,
        number: &str,
        date: NaiveDate,
        total: rust_decimal::Decimal,
    ) -> Invoice {
        Invoice::new(
            student_id,
            number,
            date,
            date + chrono::Duration::days(30),
            vec![NewLineItem::new("4010-TUITION", "Tuition", kes(total))],
        )
        .unwrap()
    }

    fn payment_on(
        student_id: StudentId,
        receipt: &str,
        date: NaiveDate,
        amount: rust_decimal::Decimal,
    ) -> Payment {
        Payment::new(
            receipt,
            student_id,
            None,
            date,
            kes(amount),
            PaymentModeId::new(),
            None,
            "cashier-01",
            None,
        )
        .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_empty_statement() {
        let builder = StatementBuilder::new(Currency::KES);
        let statement = builder.build(StudentId::new(), &[], &[]).unwrap();

        assert!(statement.lines.is_empty());
        assert!(statement.closing_balance.is_zero());
    }

    #[test]
    fn test_lines_sorted_by_date_with_running_fold() {
        let builder = StatementBuilder::new(Currency::KES);
        let student = StudentId::new();
        let invoices = vec![
            invoice_on(student, "INV-002", date(2025, 2, 1), dec!(500)),
            invoice_on(student, "INV-001", date(2025, 1, 1), dec!(1000)),
        ];
        let payments = vec![payment_on(student, "RCP-000001", date(2025, 1, 15), dec!(700))];

        let statement = builder.build(student, &invoices, &payments).unwrap();

        let references: Vec<_> = statement
            .lines
            .iter()
            .map(|line| line.reference.as_str())
            .collect();
        assert_eq!(references, vec!["INV-001", "RCP-000001", "INV-002"]);

        assert_eq!(statement.lines[0].running_balance, kes(dec!(1000)));
        assert_eq!(statement.lines[1].running_balance, kes(dec!(300)));
        assert_eq!(statement.lines[2].running_balance, kes(dec!(800)));
        assert_eq!(statement.closing_balance, kes(dec!(800)));
    }

    #[test]
    fn test_same_date_ties_break_by_creation_order() {
        let builder = StatementBuilder::new(Currency::KES);
        let student = StudentId::new();
        let day = date(2025, 1, 1);

        let mut first = invoice_on(student, "INV-001", day, dec!(100));
        let mut second = invoice_on(student, "INV-002", day, dec!(200));
        first.created_at = DateTime::parse_from_rfc3339("2025-01-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        second.created_at = DateTime::parse_from_rfc3339("2025-01-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        // Input order reversed relative to creation order
        let statement = builder
            .build(student, &[second.clone(), first.clone()], &[])
            .unwrap();

        assert_eq!(statement.lines[0].reference, "INV-001");
        assert_eq!(statement.lines[1].reference, "INV-002");

        // Same inputs, same output
        let again = builder.build(student, &[second, first], &[]).unwrap();
        assert_eq!(statement, again);
    }

    #[test]
    fn test_reversed_payments_are_omitted() {
        let builder = StatementBuilder::new(Currency::KES);
        let student = StudentId::new();
        let invoices = vec![invoice_on(student, "INV-001", date(2025, 1, 1), dec!(1000))];
        let mut payment = payment_on(student, "RCP-000001", date(2025, 1, 15), dec!(1000));
        payment.reverse("Bounced cheque", Utc::now()).unwrap();

        let statement = builder.build(student, &invoices, &[payment]).unwrap();

        assert_eq!(statement.lines.len(), 1);
        assert_eq!(statement.closing_balance, kes(dec!(1000)));
    }

    #[test]
    fn test_overpayment_closes_negative() {
        let builder = StatementBuilder::new(Currency::KES);
        let student = StudentId::new();
        let invoices = vec![invoice_on(student, "INV-001", date(2025, 1, 1), dec!(1000))];
        let payments = vec![payment_on(student, "RCP-000001", date(2025, 1, 15), dec!(1500))];

        let statement = builder.build(student, &invoices, &payments).unwrap();

        assert_eq!(statement.closing_balance, kes(dec!(-500)));
    }
}
