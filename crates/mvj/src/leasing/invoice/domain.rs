use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::leasing::domain::{ContactId, LeaseId, ReceivableTypeId, TenantId};
use crate::money::Money;

entity_id!(InvoiceId);
entity_id!(InvoiceRowId);
entity_id!(InvoicePaymentId);
entity_id!(InvoiceSetId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceState {
    Open,
    Paid,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    #[default]
    Charge,
    CreditNote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Mail,
    Electronic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub lease: LeaseId,
    pub invoiceset: Option<InvoiceSetId>,
    pub number: Option<u64>,
    pub recipient: ContactId,
    pub sent_to_sap_at: Option<DateTime<Utc>>,
    pub sap_id: Option<String>,
    pub due_date: NaiveDate,
    pub invoicing_date: Option<NaiveDate>,
    pub state: InvoiceState,
    pub billing_period_start_date: Option<NaiveDate>,
    pub billing_period_end_date: Option<NaiveDate>,
    pub postpone_date: Option<NaiveDate>,
    pub total_amount: Money,
    pub billed_amount: Money,
    pub outstanding_amount: Money,
    pub payment_notification_date: Option<NaiveDate>,
    pub collection_charge: Option<Money>,
    pub payment_notification_catalog_date: Option<NaiveDate>,
    pub delivery_method: Option<DeliveryMethod>,
    #[serde(rename = "type")]
    pub invoice_type: InvoiceType,
    pub notes: String,
    pub generated: bool,
    pub description: Option<String>,
    pub credited_invoice: Option<InvoiceId>,
    pub rows: Vec<InvoiceRow>,
    pub payments: Vec<InvoicePayment>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Invoice {
    pub fn rows_total(&self) -> Money {
        self.rows.iter().map(|row| row.amount).sum()
    }

    pub fn payments_total(&self) -> Money {
        self.payments.iter().map(|payment| payment.paid_amount).sum()
    }

    /// Recomputes billed and outstanding amounts.
    ///
    /// `credited` is the billed total of the credit notes that credit this invoice.
    /// A charge whose outstanding amount drops to zero or below is marked paid unless
    /// it has been refunded.
    pub fn update_amounts(&mut self, credited: Money) {
        self.billed_amount = self.rows_total();
        let credited = match self.invoice_type {
            InvoiceType::Charge => credited,
            InvoiceType::CreditNote => Money::ZERO,
        };
        self.outstanding_amount = self.billed_amount - self.payments_total() - credited;

        if self.invoice_type == InvoiceType::Charge
            && self.state != InvoiceState::Refunded
            && self.billed_amount.is_positive()
            && !self.outstanding_amount.is_positive()
        {
            self.state = InvoiceState::Paid;
        }
    }

    pub fn is_deletable(&self) -> bool {
        self.state == InvoiceState::Open && self.sent_to_sap_at.is_none()
    }

    /// Due date moved past weekends and bank holidays to the next business day.
    pub fn adjusted_due_date(&self, holidays: &BTreeSet<NaiveDate>) -> NaiveDate {
        next_business_day(self.due_date, holidays)
    }
}

pub fn next_business_day(date: NaiveDate, holidays: &BTreeSet<NaiveDate>) -> NaiveDate {
    let mut day = date;
    while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) || holidays.contains(&day) {
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    day
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRow {
    pub id: InvoiceRowId,
    pub tenant: Option<TenantId>,
    pub receivable_type: ReceivableTypeId,
    pub billing_period_start_date: Option<NaiveDate>,
    pub billing_period_end_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRowInput {
    #[serde(default)]
    pub id: Option<InvoiceRowId>,
    #[serde(default)]
    pub tenant: Option<TenantId>,
    pub receivable_type: ReceivableTypeId,
    #[serde(default)]
    pub billing_period_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub billing_period_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: Option<String>,
    pub amount: Money,
}

replace_nested!(InvoiceRow, InvoiceRowInput, |id, input| InvoiceRow {
    id: InvoiceRowId(id),
    tenant: input.tenant,
    receivable_type: input.receivable_type,
    billing_period_start_date: input.billing_period_start_date,
    billing_period_end_date: input.billing_period_end_date,
    description: input.description,
    amount: input.amount,
});

impl From<&InvoiceRow> for InvoiceRowInput {
    fn from(row: &InvoiceRow) -> Self {
        Self {
            id: Some(row.id),
            tenant: row.tenant,
            receivable_type: row.receivable_type,
            billing_period_start_date: row.billing_period_start_date,
            billing_period_end_date: row.billing_period_end_date,
            description: row.description.clone(),
            amount: row.amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePayment {
    pub id: InvoicePaymentId,
    pub paid_amount: Money,
    pub paid_date: NaiveDate,
    pub filing_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePaymentInput {
    #[serde(default)]
    pub id: Option<InvoicePaymentId>,
    pub paid_amount: Money,
    pub paid_date: NaiveDate,
    #[serde(default)]
    pub filing_code: Option<String>,
}

replace_nested!(InvoicePayment, InvoicePaymentInput, |id, input| {
    InvoicePayment {
        id: InvoicePaymentId(id),
        paid_amount: input.paid_amount,
        paid_date: input.paid_date,
        filing_code: input.filing_code,
    }
});

impl From<&InvoicePayment> for InvoicePaymentInput {
    fn from(payment: &InvoicePayment) -> Self {
        Self {
            id: Some(payment.id),
            paid_amount: payment.paid_amount,
            paid_date: payment.paid_date,
            filing_code: payment.filing_code.clone(),
        }
    }
}

/// Invoices billed together for one lease and period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSet {
    pub id: InvoiceSetId,
    pub lease: LeaseId,
    pub billing_period_start_date: Option<NaiveDate>,
    pub billing_period_end_date: Option<NaiveDate>,
    pub invoices: Vec<InvoiceId>,
}

/// Body of `POST /invoices/`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InvoiceDraft {
    pub lease: LeaseId,
    pub recipient: ContactId,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub invoicing_date: Option<NaiveDate>,
    #[serde(default)]
    pub billing_period_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub billing_period_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub postpone_date: Option<NaiveDate>,
    #[serde(default)]
    pub total_amount: Option<Money>,
    #[serde(default)]
    pub billed_amount: Option<Money>,
    #[serde(default)]
    pub payment_notification_date: Option<NaiveDate>,
    #[serde(default)]
    pub collection_charge: Option<Money>,
    #[serde(default)]
    pub payment_notification_catalog_date: Option<NaiveDate>,
    #[serde(default)]
    pub delivery_method: Option<DeliveryMethod>,
    #[serde(default, rename = "type")]
    pub invoice_type: Option<InvoiceType>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub credited_invoice: Option<InvoiceId>,
    #[serde(default)]
    pub invoiceset: Option<InvoiceSetId>,
    pub rows: Vec<InvoiceRowInput>,
    #[serde(default)]
    pub payments: Vec<InvoicePaymentInput>,
}

/// Writable fields of an existing invoice; PATCH bodies are overlaid on the current values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceUpdate {
    pub recipient: ContactId,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub invoicing_date: Option<NaiveDate>,
    #[serde(default)]
    pub billing_period_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub billing_period_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub postpone_date: Option<NaiveDate>,
    pub total_amount: Money,
    #[serde(default)]
    pub payment_notification_date: Option<NaiveDate>,
    #[serde(default)]
    pub collection_charge: Option<Money>,
    #[serde(default)]
    pub payment_notification_catalog_date: Option<NaiveDate>,
    #[serde(default)]
    pub delivery_method: Option<DeliveryMethod>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub description: Option<String>,
    pub rows: Vec<InvoiceRowInput>,
    #[serde(default)]
    pub payments: Vec<InvoicePaymentInput>,
}

impl From<&Invoice> for InvoiceUpdate {
    fn from(invoice: &Invoice) -> Self {
        Self {
            recipient: invoice.recipient,
            due_date: invoice.due_date,
            invoicing_date: invoice.invoicing_date,
            billing_period_start_date: invoice.billing_period_start_date,
            billing_period_end_date: invoice.billing_period_end_date,
            postpone_date: invoice.postpone_date,
            total_amount: invoice.total_amount,
            payment_notification_date: invoice.payment_notification_date,
            collection_charge: invoice.collection_charge,
            payment_notification_catalog_date: invoice.payment_notification_catalog_date,
            delivery_method: invoice.delivery_method,
            notes: invoice.notes.clone(),
            description: invoice.description.clone(),
            rows: invoice.rows.iter().map(InvoiceRowInput::from).collect(),
            payments: invoice.payments.iter().map(InvoicePaymentInput::from).collect(),
        }
    }
}

/// Short reference to another invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineInvoice {
    pub id: InvoiceId,
    pub number: Option<u64>,
    pub due_date: NaiveDate,
    pub total_amount: Money,
}

impl From<&Invoice> for InlineInvoice {
    fn from(invoice: &Invoice) -> Self {
        Self {
            id: invoice.id,
            number: invoice.number,
            due_date: invoice.due_date,
            total_amount: invoice.total_amount,
        }
    }
}

/// Invoice as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceView {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub adjusted_due_date: NaiveDate,
    pub credit_invoices: Vec<InlineInvoice>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn invoice(rows: &[i64], payments: &[i64]) -> Invoice {
        let now = Utc::now();
        Invoice {
            id: InvoiceId(1),
            lease: LeaseId(1),
            invoiceset: None,
            number: Some(1_000_001),
            recipient: ContactId(1),
            sent_to_sap_at: None,
            sap_id: None,
            due_date: date(2024, 6, 1),
            invoicing_date: None,
            state: InvoiceState::Open,
            billing_period_start_date: None,
            billing_period_end_date: None,
            postpone_date: None,
            total_amount: Money::ZERO,
            billed_amount: Money::ZERO,
            outstanding_amount: Money::ZERO,
            payment_notification_date: None,
            collection_charge: None,
            payment_notification_catalog_date: None,
            delivery_method: None,
            invoice_type: InvoiceType::Charge,
            notes: String::new(),
            generated: false,
            description: None,
            credited_invoice: None,
            rows: rows
                .iter()
                .enumerate()
                .map(|(index, cents)| InvoiceRow {
                    id: InvoiceRowId(index as u64 + 1),
                    tenant: None,
                    receivable_type: ReceivableTypeId(1),
                    billing_period_start_date: None,
                    billing_period_end_date: None,
                    description: None,
                    amount: Money::from_cents(*cents),
                })
                .collect(),
            payments: payments
                .iter()
                .enumerate()
                .map(|(index, cents)| InvoicePayment {
                    id: InvoicePaymentId(index as u64 + 10),
                    paid_amount: Money::from_cents(*cents),
                    paid_date: date(2024, 6, 1),
                    filing_code: None,
                })
                .collect(),
            created_at: now,
            modified_at: now,
        }
    }

    #[test]
    fn update_amounts_marks_fully_paid_charges() {
        let mut partially_paid = invoice(&[10_000, 5_000], &[10_000]);
        partially_paid.update_amounts(Money::ZERO);
        assert_eq!(partially_paid.billed_amount, Money::from_cents(15_000));
        assert_eq!(partially_paid.outstanding_amount, Money::from_cents(5_000));
        assert_eq!(partially_paid.state, InvoiceState::Open);

        let mut credited = invoice(&[10_000, 5_000], &[10_000]);
        credited.update_amounts(Money::from_cents(5_000));
        assert_eq!(credited.outstanding_amount, Money::ZERO);
        assert_eq!(credited.state, InvoiceState::Paid);
    }

    #[test]
    fn refunded_and_empty_invoices_keep_their_state() {
        let mut refunded = invoice(&[10_000], &[]);
        refunded.state = InvoiceState::Refunded;
        refunded.update_amounts(Money::from_cents(10_000));
        assert_eq!(refunded.state, InvoiceState::Refunded);

        let mut empty = invoice(&[], &[]);
        empty.update_amounts(Money::ZERO);
        assert_eq!(empty.state, InvoiceState::Open);
    }

    #[test]
    fn credit_notes_ignore_credited_amounts() {
        let mut note = invoice(&[2_500], &[]);
        note.invoice_type = InvoiceType::CreditNote;
        note.update_amounts(Money::from_cents(999));
        assert_eq!(note.outstanding_amount, Money::from_cents(2_500));
        assert_eq!(note.state, InvoiceState::Open);
    }

    #[test]
    fn due_dates_skip_weekends_and_holidays() {
        let holidays: BTreeSet<NaiveDate> = [date(2024, 6, 24)].into_iter().collect();
        // Saturday 22nd, Sunday 23rd, Midsummer holiday Monday 24th.
        assert_eq!(next_business_day(date(2024, 6, 22), &holidays), date(2024, 6, 25));
        assert_eq!(next_business_day(date(2024, 6, 20), &holidays), date(2024, 6, 20));
    }
}
