use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::leasing::domain::{ContactId, Lease, LeaseId, ReceivableTypeId};
use crate::leasing::repository::LeasingRepository;
use crate::money::Money;
use crate::store::{create_nested, merge_nested, IdSource, RepositoryError};

use super::charge::{plan_charge, ChargeRequest};
use super::credit::{
    plan_credit_invoiceset, plan_credit_invoiceset_for_amount, plan_credit_note, CreditNoteDraft,
    CreditRequest, CreditSetPlan, TenantShares,
};
use super::domain::{
    InlineInvoice, Invoice, InvoiceDraft, InvoiceId, InvoicePayment, InvoicePaymentId, InvoiceRow,
    InvoiceRowId, InvoiceRowInput, InvoiceSet, InvoiceSetId, InvoiceState, InvoiceType,
    InvoiceUpdate, InvoiceView,
};
use super::repository::{InvoiceBatch, InvoiceRepository};
use super::InvoiceError;

/// `?lease=&state=&type=` filters of the invoice list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceFilter {
    pub lease: Option<LeaseId>,
    pub state: Option<InvoiceState>,
    #[serde(rename = "type")]
    pub invoice_type: Option<InvoiceType>,
}

impl InvoiceFilter {
    fn matches(&self, invoice: &Invoice) -> bool {
        self.lease.map_or(true, |lease| invoice.lease == lease)
            && self.state.map_or(true, |state| invoice.state == state)
            && self
                .invoice_type
                .map_or(true, |invoice_type| invoice.invoice_type == invoice_type)
    }
}

/// Body of the invoice set credit endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetCreditRequest {
    #[serde(default)]
    pub amount: Option<Money>,
    #[serde(default)]
    pub receivable_type: Option<ReceivableTypeId>,
}

/// A new invoice set together with its invoices.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceSetView {
    #[serde(flatten)]
    pub invoiceset: InvoiceSet,
    #[serde(rename = "invoices")]
    pub invoice_views: Vec<InvoiceView>,
}

/// Payment with the invoice it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentView {
    pub id: InvoicePaymentId,
    pub invoice: InvoiceId,
    pub paid_amount: Money,
    pub paid_date: NaiveDate,
    pub filing_code: Option<String>,
}

impl PaymentView {
    fn new(invoice: InvoiceId, payment: &InvoicePayment) -> Self {
        Self {
            id: payment.id,
            invoice,
            paid_amount: payment.paid_amount,
            paid_date: payment.paid_date,
            filing_code: payment.filing_code.clone(),
        }
    }
}

/// Body of `POST /invoice_payments/`.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentDraft {
    pub invoice: InvoiceId,
    pub paid_amount: Money,
    pub paid_date: NaiveDate,
    #[serde(default)]
    pub filing_code: Option<String>,
}

/// Writable fields of a stored payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentUpdate {
    pub paid_amount: Money,
    pub paid_date: NaiveDate,
    #[serde(default)]
    pub filing_code: Option<String>,
}

impl From<&PaymentView> for PaymentUpdate {
    fn from(view: &PaymentView) -> Self {
        Self {
            paid_amount: view.paid_amount,
            paid_date: view.paid_date,
            filing_code: view.filing_code.clone(),
        }
    }
}

/// Invoice workflows over a store holding both leases and invoices.
pub struct InvoiceService<R> {
    repository: Arc<R>,
}

impl<R> InvoiceService<R>
where
    R: LeasingRepository + InvoiceRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    fn ids(&self) -> &dyn IdSource {
        self.repository.as_ref()
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    pub fn list(&self, filter: &InvoiceFilter) -> Result<Vec<InvoiceView>, InvoiceError> {
        let all = self.repository.invoices()?;
        let selected: Vec<Invoice> = all
            .iter()
            .filter(|invoice| filter.matches(invoice))
            .cloned()
            .collect();
        self.views(selected, &all)
    }

    pub fn get(&self, id: InvoiceId) -> Result<InvoiceView, InvoiceError> {
        let invoice = self.require_invoice(id)?;
        let credit_notes = self.repository.credit_notes_for(id)?;
        let holidays = self.repository.bank_holidays()?;
        Ok(view(invoice, &credit_notes, &holidays))
    }

    /// Current invoice fields as an update body, for merging partial updates.
    pub fn update_template(&self, id: InvoiceId) -> Result<InvoiceUpdate, InvoiceError> {
        Ok(InvoiceUpdate::from(&self.require_invoice(id)?))
    }

    pub fn create(&self, draft: InvoiceDraft) -> Result<InvoiceView, InvoiceError> {
        let lease = self.require_lease(draft.lease)?;
        self.require_contact(draft.recipient)?;
        self.validate_rows(&lease, &draft.rows)?;
        if let Some(credited) = draft.credited_invoice {
            self.require_invoice(credited)?;
        }
        if let Some(set) = draft.invoiceset {
            self.repository
                .invoice_set(set)?
                .ok_or_else(|| RepositoryError::not_found("invoice set", set.0))?;
        }

        let rows: Vec<InvoiceRow> = create_nested(draft.rows, self.ids())?;
        let payments: Vec<InvoicePayment> = create_nested(draft.payments, self.ids())?;
        let rows_total = bounded_total(rows.iter().map(|row| row.amount))?;

        let mut invoice = blank_invoice(
            InvoiceId(self.ids().next_id()),
            draft.lease,
            draft.recipient,
            draft.due_date,
        );
        invoice.invoiceset = draft.invoiceset;
        invoice.invoicing_date = draft.invoicing_date;
        invoice.billing_period_start_date = draft.billing_period_start_date;
        invoice.billing_period_end_date = draft.billing_period_end_date;
        invoice.postpone_date = draft.postpone_date;
        invoice.total_amount = draft.total_amount.unwrap_or(rows_total);
        invoice.billed_amount = draft.billed_amount.unwrap_or(rows_total);
        invoice.payment_notification_date = draft.payment_notification_date;
        invoice.collection_charge = draft.collection_charge;
        invoice.payment_notification_catalog_date = draft.payment_notification_catalog_date;
        invoice.delivery_method = draft.delivery_method;
        invoice.invoice_type = draft.invoice_type.unwrap_or_default();
        invoice.notes = draft.notes.unwrap_or_default();
        invoice.description = draft.description;
        invoice.credited_invoice = draft.credited_invoice;
        invoice.rows = rows;
        invoice.payments = payments;

        let stored = self.commit(InvoiceBatch {
            invoices: vec![invoice],
            ..InvoiceBatch::default()
        })?;
        let created = first(stored)?;
        info!(invoice_id = %created.id, lease_id = %created.lease, "invoice created");
        self.get(created.id)
    }

    pub fn update(&self, id: InvoiceId, update: InvoiceUpdate) -> Result<InvoiceView, InvoiceError> {
        let mut invoice = self.require_invoice(id)?;
        if invoice.sent_to_sap_at.is_some() {
            warn!(invoice_id = %id, "rejected update of an invoice sent to SAP");
            return Err(InvoiceError::SentToSap);
        }
        if invoice.invoice_type == InvoiceType::CreditNote {
            locked_credit_note_fields(&invoice, &update)?;
        }

        let lease = self.require_lease(invoice.lease)?;
        self.require_contact(update.recipient)?;
        self.validate_rows(&lease, &update.rows)?;

        invoice.recipient = update.recipient;
        invoice.due_date = update.due_date;
        invoice.invoicing_date = update.invoicing_date;
        invoice.billing_period_start_date = update.billing_period_start_date;
        invoice.billing_period_end_date = update.billing_period_end_date;
        invoice.postpone_date = update.postpone_date;
        invoice.total_amount = update.total_amount;
        invoice.payment_notification_date = update.payment_notification_date;
        invoice.collection_charge = update.collection_charge;
        invoice.payment_notification_catalog_date = update.payment_notification_catalog_date;
        invoice.delivery_method = update.delivery_method;
        invoice.notes = update.notes;
        invoice.description = update.description;
        invoice.rows = merge_nested(
            "invoice row",
            std::mem::take(&mut invoice.rows),
            update.rows,
            self.ids(),
        )?;
        invoice.payments = merge_nested(
            "invoice payment",
            std::mem::take(&mut invoice.payments),
            update.payments,
            self.ids(),
        )?;
        bounded_total(invoice.rows.iter().map(|row| row.amount))?;
        invoice.modified_at = Utc::now();

        self.commit(InvoiceBatch {
            invoices: vec![invoice],
            ..InvoiceBatch::default()
        })?;
        info!(invoice_id = %id, "invoice updated");
        self.get(id)
    }

    pub fn delete(&self, id: InvoiceId) -> Result<(), InvoiceError> {
        let invoice = self.require_invoice(id)?;
        if !invoice.is_deletable() {
            warn!(invoice_id = %id, state = ?invoice.state, "rejected invoice deletion");
            return Err(InvoiceError::NotDeletable);
        }
        self.repository.delete_invoice(id)?;
        info!(invoice_id = %id, "invoice deleted");
        Ok(())
    }

    /// Credits an invoice and returns the stored credit note.
    pub fn credit(
        &self,
        id: InvoiceId,
        request: &CreditRequest,
    ) -> Result<InvoiceView, InvoiceError> {
        let invoice = self.require_invoice(id)?;
        let lease = self.require_lease(invoice.lease)?;
        let shares = TenantShares::from_tenants(&lease.tenants);

        let draft = plan_credit_note(&invoice, &shares, request, Self::today())
            .inspect_err(|err| warn!(invoice_id = %id, error = %err, "credit rejected"))?;
        let refunded = if draft.refunds_source { vec![id] } else { Vec::new() };
        let note = self.credit_note(draft, None);

        let stored = self.commit(InvoiceBatch {
            invoice_set: None,
            invoices: vec![note],
            refunded,
        })?;
        let note = first(stored)?;
        info!(invoice_id = %id, credit_note_id = %note.id, amount = %note.billed_amount, "invoice credited");
        self.get(note.id)
    }

    /// Credits a set in full, or for an amount of one receivable type when `amount` is given.
    pub fn credit_set(
        &self,
        id: InvoiceSetId,
        request: &SetCreditRequest,
    ) -> Result<InvoiceSetView, InvoiceError> {
        let set = self
            .repository
            .invoice_set(id)?
            .ok_or_else(|| RepositoryError::not_found("invoice set", id.0))?;
        let invoices = self.repository.invoices_in_set(id)?;
        let lease = self.require_lease(set.lease)?;
        let shares = TenantShares::from_tenants(&lease.tenants);
        let today = Self::today();

        let plan = match request.amount {
            Some(amount) => plan_credit_invoiceset_for_amount(
                &set,
                &invoices,
                &shares,
                amount,
                request.receivable_type,
                today,
            ),
            None => plan_credit_invoiceset(&set, &invoices, &shares, request.receivable_type, today),
        }
        .inspect_err(|err| warn!(invoice_set_id = %id, error = %err, "set credit rejected"))?;

        let view = self.commit_credit_set(plan)?;
        info!(
            invoice_set_id = %id,
            credit_set_id = %view.invoiceset.id,
            credit_notes = view.invoice_views.len(),
            "invoice set credited"
        );
        Ok(view)
    }

    /// Creates charge invoices distributed over the lease's tenants.
    pub fn create_charge(
        &self,
        lease_id: LeaseId,
        request: &ChargeRequest,
    ) -> Result<Vec<InvoiceView>, InvoiceError> {
        if let Some(given) = request.lease.filter(|given| *given != lease_id) {
            return Err(InvoiceError::LeaseMismatch {
                expected: lease_id.0,
                given: given.0,
            });
        }
        let lease = self.require_lease(lease_id)?;
        for row in &request.rows {
            self.require_receivable_type(row.receivable_type)?;
        }

        let plan = plan_charge(&lease, request, Self::today())
            .inspect_err(|err| warn!(lease_id = %lease_id, error = %err, "charge rejected"))?;

        let invoice_set = plan.needs_invoice_set().then(|| InvoiceSet {
            id: InvoiceSetId(self.ids().next_id()),
            lease: plan.lease,
            billing_period_start_date: Some(plan.billing_period_start_date),
            billing_period_end_date: Some(plan.billing_period_end_date),
            invoices: Vec::new(),
        });

        let mut invoices = Vec::with_capacity(plan.invoices.len());
        for draft in &plan.invoices {
            let mut invoice = blank_invoice(
                InvoiceId(self.ids().next_id()),
                plan.lease,
                draft.recipient,
                plan.due_date,
            );
            invoice.invoiceset = invoice_set.as_ref().map(|set| set.id);
            invoice.invoicing_date = Some(plan.invoicing_date);
            invoice.billing_period_start_date = Some(plan.billing_period_start_date);
            invoice.billing_period_end_date = Some(plan.billing_period_end_date);
            invoice.total_amount = plan.total_amount;
            invoice.billed_amount = draft.rows_total();
            invoice.notes = plan.notes.clone();
            invoice.rows = draft
                .rows
                .iter()
                .map(|row| InvoiceRow {
                    id: InvoiceRowId(self.ids().next_id()),
                    tenant: Some(row.tenant),
                    receivable_type: row.receivable_type,
                    billing_period_start_date: Some(row.billing_period_start_date),
                    billing_period_end_date: Some(row.billing_period_end_date),
                    description: None,
                    amount: row.amount,
                })
                .collect();
            invoices.push(invoice);
        }

        let stored = self.commit(InvoiceBatch {
            invoice_set,
            invoices,
            refunded: Vec::new(),
        })?;
        info!(lease_id = %lease_id, invoices = stored.len(), "charge created");

        let all = self.repository.invoices()?;
        self.views(stored, &all)
    }

    pub fn payments(&self, invoice: Option<InvoiceId>) -> Result<Vec<PaymentView>, InvoiceError> {
        Ok(self
            .repository
            .invoices()?
            .iter()
            .filter(|candidate| invoice.map_or(true, |id| candidate.id == id))
            .flat_map(|candidate| {
                candidate
                    .payments
                    .iter()
                    .map(|payment| PaymentView::new(candidate.id, payment))
            })
            .collect())
    }

    pub fn payment(&self, id: InvoicePaymentId) -> Result<PaymentView, InvoiceError> {
        let (invoice, index) = self.payment_owner(id)?;
        Ok(PaymentView::new(invoice.id, &invoice.payments[index]))
    }

    pub fn add_payment(&self, draft: PaymentDraft) -> Result<PaymentView, InvoiceError> {
        let mut invoice = self.require_invoice(draft.invoice)?;
        let payment = InvoicePayment {
            id: InvoicePaymentId(self.ids().next_id()),
            paid_amount: draft.paid_amount,
            paid_date: draft.paid_date,
            filing_code: draft.filing_code,
        };
        let view = PaymentView::new(invoice.id, &payment);
        invoice.payments.push(payment);
        self.commit(InvoiceBatch {
            invoices: vec![invoice],
            ..InvoiceBatch::default()
        })?;
        info!(invoice_id = %view.invoice, payment_id = %view.id, amount = %view.paid_amount, "payment added");
        Ok(view)
    }

    pub fn update_payment(
        &self,
        id: InvoicePaymentId,
        update: PaymentUpdate,
    ) -> Result<PaymentView, InvoiceError> {
        let (mut invoice, index) = self.payment_owner(id)?;
        let payment = &mut invoice.payments[index];
        payment.paid_amount = update.paid_amount;
        payment.paid_date = update.paid_date;
        payment.filing_code = update.filing_code;
        let view = PaymentView::new(invoice.id, payment);
        self.commit(InvoiceBatch {
            invoices: vec![invoice],
            ..InvoiceBatch::default()
        })?;
        info!(payment_id = %id, "payment updated");
        Ok(view)
    }

    pub fn delete_payment(&self, id: InvoicePaymentId) -> Result<(), InvoiceError> {
        let (mut invoice, index) = self.payment_owner(id)?;
        invoice.payments.remove(index);
        self.commit(InvoiceBatch {
            invoices: vec![invoice],
            ..InvoiceBatch::default()
        })?;
        info!(payment_id = %id, "payment deleted");
        Ok(())
    }

    fn payment_owner(&self, id: InvoicePaymentId) -> Result<(Invoice, usize), InvoiceError> {
        self.repository
            .invoices()?
            .into_iter()
            .find_map(|invoice| {
                invoice
                    .payments
                    .iter()
                    .position(|payment| payment.id == id)
                    .map(|index| (invoice, index))
            })
            .ok_or_else(|| RepositoryError::not_found("invoice payment", id.0).into())
    }

    fn commit_credit_set(&self, plan: CreditSetPlan) -> Result<InvoiceSetView, InvoiceError> {
        let set_id = InvoiceSetId(self.ids().next_id());
        let invoice_set = InvoiceSet {
            id: set_id,
            lease: plan.lease,
            billing_period_start_date: plan.billing_period_start_date,
            billing_period_end_date: plan.billing_period_end_date,
            invoices: Vec::new(),
        };

        let mut refunded = Vec::new();
        let mut notes = Vec::with_capacity(plan.notes.len());
        for draft in plan.notes {
            if draft.refunds_source {
                refunded.push(draft.credited_invoice);
            }
            notes.push(self.credit_note(draft, Some(set_id)));
        }

        let stored = self.commit(InvoiceBatch {
            invoice_set: Some(invoice_set),
            invoices: notes,
            refunded,
        })?;
        let invoiceset = self
            .repository
            .invoice_set(set_id)?
            .ok_or_else(|| RepositoryError::not_found("invoice set", set_id.0))?;
        let all = self.repository.invoices()?;
        Ok(InvoiceSetView {
            invoiceset,
            invoice_views: self.views(stored, &all)?,
        })
    }

    fn credit_note(&self, draft: CreditNoteDraft, invoiceset: Option<InvoiceSetId>) -> Invoice {
        let mut note = blank_invoice(
            InvoiceId(self.ids().next_id()),
            draft.lease,
            draft.recipient,
            draft.due_date,
        );
        note.invoiceset = invoiceset;
        note.invoice_type = InvoiceType::CreditNote;
        note.credited_invoice = Some(draft.credited_invoice);
        note.invoicing_date = Some(draft.invoicing_date);
        note.billing_period_start_date = draft.billing_period_start_date;
        note.billing_period_end_date = draft.billing_period_end_date;
        note.total_amount = draft.total_amount;
        note.billed_amount = draft.billed_amount;
        note.rows = draft
            .rows
            .into_iter()
            .map(|row| InvoiceRow {
                id: InvoiceRowId(self.ids().next_id()),
                tenant: row.tenant,
                receivable_type: row.receivable_type,
                billing_period_start_date: row.billing_period_start_date,
                billing_period_end_date: row.billing_period_end_date,
                description: row.description,
                amount: row.amount,
            })
            .collect();
        note
    }

    fn commit(&self, batch: InvoiceBatch) -> Result<Vec<Invoice>, InvoiceError> {
        Ok(self.repository.commit_invoices(batch)?)
    }

    fn views(
        &self,
        invoices: Vec<Invoice>,
        all: &[Invoice],
    ) -> Result<Vec<InvoiceView>, InvoiceError> {
        let holidays = self.repository.bank_holidays()?;
        let mut credit_notes: HashMap<InvoiceId, Vec<Invoice>> = HashMap::new();
        for note in all {
            if let Some(credited) = note.credited_invoice {
                credit_notes.entry(credited).or_default().push(note.clone());
            }
        }
        Ok(invoices
            .into_iter()
            .map(|invoice| {
                let notes = credit_notes.get(&invoice.id).map_or(&[][..], Vec::as_slice);
                view(invoice, notes, &holidays)
            })
            .collect())
    }

    fn validate_rows(&self, lease: &Lease, rows: &[InvoiceRowInput]) -> Result<(), InvoiceError> {
        for row in rows {
            self.require_receivable_type(row.receivable_type)?;
            if let Some(tenant) = row.tenant {
                if lease.tenant(tenant).is_none() {
                    return Err(InvoiceError::UnknownTenant(tenant));
                }
            }
        }
        Ok(())
    }

    fn require_invoice(&self, id: InvoiceId) -> Result<Invoice, InvoiceError> {
        self.repository
            .invoice(id)?
            .ok_or_else(|| RepositoryError::not_found("invoice", id.0).into())
    }

    fn require_lease(&self, id: LeaseId) -> Result<Lease, InvoiceError> {
        self.repository
            .lease(id)?
            .ok_or_else(|| RepositoryError::not_found("lease", id.0).into())
    }

    fn require_contact(&self, id: ContactId) -> Result<(), InvoiceError> {
        match self.repository.contact(id)? {
            Some(_) => Ok(()),
            None => Err(InvoiceError::UnknownContact(id)),
        }
    }

    fn require_receivable_type(&self, id: ReceivableTypeId) -> Result<(), InvoiceError> {
        match self.repository.receivable_type(id)? {
            Some(_) => Ok(()),
            None => Err(InvoiceError::UnknownReceivableType(id)),
        }
    }
}

/// Sums invoice row amounts, refusing totals beyond the stored ten digits.
fn bounded_total(amounts: impl Iterator<Item = Money>) -> Result<Money, InvoiceError> {
    let total: Money = amounts.sum();
    if total.is_in_range() {
        Ok(total)
    } else {
        Err(InvoiceError::TotalOutOfRange(total))
    }
}

fn first(mut invoices: Vec<Invoice>) -> Result<Invoice, InvoiceError> {
    if invoices.is_empty() {
        return Err(RepositoryError::Unavailable("commit stored no invoices".to_string()).into());
    }
    Ok(invoices.swap_remove(0))
}

fn locked_credit_note_fields(invoice: &Invoice, update: &InvoiceUpdate) -> Result<(), InvoiceError> {
    let locked = if update.due_date != invoice.due_date {
        Some("due_date")
    } else if update.billing_period_start_date != invoice.billing_period_start_date {
        Some("billing_period_start_date")
    } else if update.billing_period_end_date != invoice.billing_period_end_date {
        Some("billing_period_end_date")
    } else {
        None
    };
    match locked {
        Some(field) => {
            warn!(invoice_id = %invoice.id, field, "rejected credit note update");
            Err(InvoiceError::CreditNoteFieldLocked(field))
        }
        None => Ok(()),
    }
}

fn view(invoice: Invoice, credit_notes: &[Invoice], holidays: &BTreeSet<NaiveDate>) -> InvoiceView {
    InvoiceView {
        adjusted_due_date: invoice.adjusted_due_date(holidays),
        credit_invoices: credit_notes.iter().map(InlineInvoice::from).collect(),
        invoice,
    }
}

/// Open charge with no rows, payments, or optional fields.
pub(crate) fn blank_invoice(
    id: InvoiceId,
    lease: LeaseId,
    recipient: ContactId,
    due_date: NaiveDate,
) -> Invoice {
    let now = Utc::now();
    Invoice {
        id,
        lease,
        invoiceset: None,
        number: None,
        recipient,
        sent_to_sap_at: None,
        sap_id: None,
        due_date,
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
        rows: Vec::new(),
        payments: Vec::new(),
        created_at: now,
        modified_at: now,
    }
}
