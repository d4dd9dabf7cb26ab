//! Process-local store backing every repository trait.
//!
//! All tables sit behind one mutex so composite writes (invoice batches, plot searches
//! that duplicate plan units) are atomic. Ids come from a single counter shared by
//! every table.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use serde::Deserialize;

use crate::credit_integration::domain::{CreditDecision, CreditDecisionId, CreditDecisionLog};
use crate::credit_integration::repository::CreditIntegrationRepository;
use crate::forms::answer::{Answer, AnswerId, Attachment, AttachmentId};
use crate::forms::domain::{FieldType, Form, FormId};
use crate::forms::repository::FormRepository;
use crate::leasing::domain::{
    ConditionType, Contact, ContactId, DecisionMaker, Lease, LeaseId, ReceivableType,
};
use crate::leasing::invoice::domain::{
    Invoice, InvoiceId, InvoiceSet, InvoiceSetId, InvoiceState, InvoiceType,
};
use crate::leasing::invoice::repository::{InvoiceBatch, InvoiceRepository};
use crate::leasing::land_area::{PlanUnit, PlanUnitId};
use crate::leasing::repository::{
    locate_plan_unit, LeasingRepository, PlanUnitAccess, PlanUnitContext,
};
use crate::money::Money;
use crate::plotsearch::domain::{
    AreaSearch, AreaSearchId, AreaSearchIntendedUse, PlotSearch, PlotSearchId, PlotSearchStage,
    PlotSearchSubtype, PlotSearchType,
};
use crate::plotsearch::repository::{PlotSearchRepository, PlotSearchWrite};

use super::{IdSource, RepositoryError};

/// Number given to the first invoice of an empty store.
pub const FIRST_INVOICE_NUMBER: u64 = 1_000_001;

/// Lookup tables loaded once at startup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReferenceData {
    pub receivable_types: Vec<ReceivableType>,
    pub condition_types: Vec<ConditionType>,
    pub decision_makers: Vec<DecisionMaker>,
    pub bank_holidays: Vec<NaiveDate>,
    pub field_types: Vec<FieldType>,
    pub plot_search_types: Vec<PlotSearchType>,
    pub plot_search_subtypes: Vec<PlotSearchSubtype>,
    pub plot_search_stages: Vec<PlotSearchStage>,
    pub intended_uses: Vec<AreaSearchIntendedUse>,
}

#[derive(Debug, Default)]
struct Tables {
    leases: BTreeMap<LeaseId, Lease>,
    contacts: BTreeMap<ContactId, Contact>,
    invoices: BTreeMap<InvoiceId, Invoice>,
    invoice_sets: BTreeMap<InvoiceSetId, InvoiceSet>,
    forms: BTreeMap<FormId, Form>,
    answers: BTreeMap<AnswerId, Answer>,
    attachments: BTreeMap<AttachmentId, Attachment>,
    plot_searches: BTreeMap<PlotSearchId, PlotSearch>,
    area_searches: BTreeMap<AreaSearchId, AreaSearch>,
    credit_decisions: BTreeMap<CreditDecisionId, CreditDecision>,
    credit_decision_logs: Vec<CreditDecisionLog>,
    reference: ReferenceData,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    sequence: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the lookup tables and moves the id counter past every seeded id.
    pub fn seed(&self, mut reference: ReferenceData) -> Result<(), RepositoryError> {
        let highest = reference
            .receivable_types
            .iter()
            .map(|item| item.id.0)
            .chain(reference.condition_types.iter().map(|item| item.id.0))
            .chain(reference.decision_makers.iter().map(|item| item.id.0))
            .chain(reference.field_types.iter().map(|item| item.id.0))
            .chain(reference.plot_search_types.iter().map(|item| item.id.0))
            .chain(reference.plot_search_subtypes.iter().map(|item| item.id.0))
            .chain(reference.plot_search_stages.iter().map(|item| item.id.0))
            .chain(reference.intended_uses.iter().map(|item| item.id.0))
            .max()
            .unwrap_or(0);
        reference.bank_holidays.sort();
        reference.bank_holidays.dedup();

        self.tables()?.reference = reference;
        self.sequence.fetch_max(highest, Ordering::SeqCst);
        Ok(())
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl IdSource for MemoryStore {
    fn next_id(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Copy of the leases handed to a plot search write; kept only when the write succeeds.
struct StagedLeases {
    leases: BTreeMap<LeaseId, Lease>,
}

impl PlanUnitAccess for StagedLeases {
    fn locate(&self, id: PlanUnitId) -> Option<PlanUnitContext> {
        locate_plan_unit(self.leases.values(), id)
    }

    fn duplicate_master(
        &mut self,
        master: PlanUnitId,
        id: PlanUnitId,
    ) -> Result<PlanUnit, RepositoryError> {
        let area = self
            .leases
            .values_mut()
            .flat_map(|lease| lease.lease_areas.iter_mut())
            .find(|area| area.plan_unit(master).is_some())
            .ok_or_else(|| RepositoryError::not_found("plan unit", master.0))?;
        let copy = area
            .plan_unit(master)
            .map(|unit| unit.duplicate(id))
            .ok_or_else(|| RepositoryError::not_found("plan unit", master.0))?;
        area.plan_units.push(copy.clone());
        Ok(copy)
    }

    fn remove(&mut self, id: PlanUnitId) -> Option<PlanUnit> {
        remove_plan_unit(&mut self.leases, id)
    }
}

fn remove_plan_unit(leases: &mut BTreeMap<LeaseId, Lease>, id: PlanUnitId) -> Option<PlanUnit> {
    leases
        .values_mut()
        .flat_map(|lease| lease.lease_areas.iter_mut())
        .find_map(|area| {
            let index = area.plan_units.iter().position(|unit| unit.id == id)?;
            Some(area.plan_units.remove(index))
        })
}

impl LeasingRepository for MemoryStore {
    fn leases(&self) -> Result<Vec<Lease>, RepositoryError> {
        Ok(self.tables()?.leases.values().cloned().collect())
    }

    fn lease(&self, id: LeaseId) -> Result<Option<Lease>, RepositoryError> {
        Ok(self.tables()?.leases.get(&id).cloned())
    }

    fn insert_lease(&self, lease: Lease) -> Result<Lease, RepositoryError> {
        let mut tables = self.tables()?;
        let taken = tables.leases.contains_key(&lease.id)
            || tables
                .leases
                .values()
                .any(|existing| existing.identifier == lease.identifier);
        if taken {
            return Err(RepositoryError::Conflict);
        }
        tables.leases.insert(lease.id, lease.clone());
        Ok(lease)
    }

    fn modify_lease<T, E, F>(&self, id: LeaseId, change: F) -> Result<T, E>
    where
        F: FnOnce(&mut Lease) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut tables = self.tables()?;
        let mut lease = tables
            .leases
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("lease", id.0))?;
        let outcome = change(&mut lease)?;
        lease.id = id;
        tables.leases.insert(id, lease);
        Ok(outcome)
    }

    fn delete_lease(&self, id: LeaseId) -> Result<Lease, RepositoryError> {
        let mut tables = self.tables()?;
        let lease = tables
            .leases
            .get(&id)
            .ok_or_else(|| RepositoryError::not_found("lease", id.0))?;
        let protected = |referenced_by| RepositoryError::Protected {
            entity: "lease",
            id: id.0,
            referenced_by,
        };
        if tables.invoices.values().any(|invoice| invoice.lease == id) {
            return Err(protected("invoice"));
        }
        let targeted = tables
            .plot_searches
            .values()
            .flat_map(|search| search.plot_search_targets.iter())
            .any(|target| {
                lease
                    .lease_areas
                    .iter()
                    .any(|area| area.plan_unit(target.plan_unit).is_some())
            });
        if targeted {
            return Err(protected("plot search target"));
        }
        tables
            .leases
            .remove(&id)
            .ok_or_else(|| RepositoryError::not_found("lease", id.0))
    }

    fn delete_plan_unit(&self, id: PlanUnitId) -> Result<PlanUnit, RepositoryError> {
        let mut tables = self.tables()?;
        let targeted = tables
            .plot_searches
            .values()
            .flat_map(|search| search.plot_search_targets.iter())
            .any(|target| target.plan_unit == id);
        if targeted {
            return Err(RepositoryError::Protected {
                entity: "plan unit",
                id: id.0,
                referenced_by: "plot search target",
            });
        }
        remove_plan_unit(&mut tables.leases, id)
            .ok_or_else(|| RepositoryError::not_found("plan unit", id.0))
    }

    fn next_lease_sequence(&self, prefix: &str) -> Result<u32, RepositoryError> {
        Ok(self
            .tables()?
            .leases
            .values()
            .filter(|lease| lease.identifier.prefix() == prefix)
            .map(|lease| lease.identifier.sequence)
            .max()
            .map_or(1, |highest| highest + 1))
    }

    fn contacts(&self) -> Result<Vec<Contact>, RepositoryError> {
        Ok(self.tables()?.contacts.values().cloned().collect())
    }

    fn contact(&self, id: ContactId) -> Result<Option<Contact>, RepositoryError> {
        Ok(self.tables()?.contacts.get(&id).cloned())
    }

    fn insert_contact(&self, contact: Contact) -> Result<Contact, RepositoryError> {
        let mut tables = self.tables()?;
        if tables.contacts.contains_key(&contact.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.contacts.insert(contact.id, contact.clone());
        Ok(contact)
    }

    fn decision_makers(&self) -> Result<Vec<DecisionMaker>, RepositoryError> {
        Ok(self.tables()?.reference.decision_makers.clone())
    }

    fn condition_types(&self) -> Result<Vec<ConditionType>, RepositoryError> {
        Ok(self.tables()?.reference.condition_types.clone())
    }

    fn receivable_types(&self) -> Result<Vec<ReceivableType>, RepositoryError> {
        Ok(self.tables()?.reference.receivable_types.clone())
    }

    fn bank_holidays(&self) -> Result<BTreeSet<NaiveDate>, RepositoryError> {
        Ok(self
            .tables()?
            .reference
            .bank_holidays
            .iter()
            .copied()
            .collect())
    }
}

/// Billed total of the credit notes crediting `id`.
fn credited_total(invoices: &BTreeMap<InvoiceId, Invoice>, id: InvoiceId) -> Money {
    invoices
        .values()
        .filter(|note| note.credited_invoice == Some(id))
        .map(|note| note.billed_amount)
        .sum()
}

/// Recomputes amounts of `ids` and of the invoices they credit, credit notes first.
fn refresh_amounts(
    invoices: &mut BTreeMap<InvoiceId, Invoice>,
    ids: impl IntoIterator<Item = InvoiceId>,
) {
    let mut pending: BTreeSet<InvoiceId> = ids.into_iter().collect();
    let credited: Vec<InvoiceId> = pending
        .iter()
        .filter_map(|id| invoices.get(id)?.credited_invoice)
        .collect();
    pending.extend(credited);

    let (notes, charges): (Vec<InvoiceId>, Vec<InvoiceId>) =
        pending.into_iter().partition(|id| {
            invoices
                .get(id)
                .is_some_and(|invoice| invoice.invoice_type == InvoiceType::CreditNote)
        });
    for id in notes.into_iter().chain(charges) {
        let credited = credited_total(invoices, id);
        if let Some(invoice) = invoices.get_mut(&id) {
            invoice.update_amounts(credited);
        }
    }
}

impl Tables {
    fn set_with_members(&self, set: &InvoiceSet) -> InvoiceSet {
        InvoiceSet {
            invoices: self
                .invoices
                .values()
                .filter(|invoice| invoice.invoiceset == Some(set.id))
                .map(|invoice| invoice.id)
                .collect(),
            ..set.clone()
        }
    }
}

impl InvoiceRepository for MemoryStore {
    fn invoices(&self) -> Result<Vec<Invoice>, RepositoryError> {
        Ok(self.tables()?.invoices.values().cloned().collect())
    }

    fn invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, RepositoryError> {
        Ok(self.tables()?.invoices.get(&id).cloned())
    }

    fn credit_notes_for(&self, id: InvoiceId) -> Result<Vec<Invoice>, RepositoryError> {
        Ok(self
            .tables()?
            .invoices
            .values()
            .filter(|invoice| invoice.credited_invoice == Some(id))
            .cloned()
            .collect())
    }

    fn invoice_set(&self, id: InvoiceSetId) -> Result<Option<InvoiceSet>, RepositoryError> {
        let tables = self.tables()?;
        Ok(tables
            .invoice_sets
            .get(&id)
            .map(|set| tables.set_with_members(set)))
    }

    fn invoices_in_set(&self, id: InvoiceSetId) -> Result<Vec<Invoice>, RepositoryError> {
        Ok(self
            .tables()?
            .invoices
            .values()
            .filter(|invoice| invoice.invoiceset == Some(id))
            .cloned()
            .collect())
    }

    fn commit_invoices(&self, batch: InvoiceBatch) -> Result<Vec<Invoice>, RepositoryError> {
        let mut tables = self.tables()?;

        if let Some(set) = &batch.invoice_set {
            if tables.invoice_sets.contains_key(&set.id) {
                return Err(RepositoryError::Conflict);
            }
        }
        for id in &batch.refunded {
            let known = tables.invoices.contains_key(id)
                || batch.invoices.iter().any(|invoice| invoice.id == *id);
            if !known {
                return Err(RepositoryError::not_found("invoice", id.0));
            }
        }

        if let Some(set) = batch.invoice_set {
            tables.invoice_sets.insert(set.id, set);
        }

        let mut next_number = tables
            .invoices
            .values()
            .filter_map(|invoice| invoice.number)
            .max()
            .map_or(FIRST_INVOICE_NUMBER, |highest| highest + 1);
        let mut touched = Vec::with_capacity(batch.invoices.len());
        for mut invoice in batch.invoices {
            if invoice.number.is_none() {
                invoice.number = Some(next_number);
                next_number += 1;
            }
            touched.push(invoice.id);
            tables.invoices.insert(invoice.id, invoice);
        }
        for id in &batch.refunded {
            if let Some(invoice) = tables.invoices.get_mut(id) {
                invoice.state = InvoiceState::Refunded;
            }
        }

        refresh_amounts(
            &mut tables.invoices,
            touched.iter().chain(&batch.refunded).copied(),
        );

        Ok(touched
            .iter()
            .filter_map(|id| tables.invoices.get(id).cloned())
            .collect())
    }

    fn delete_invoice(&self, id: InvoiceId) -> Result<Invoice, RepositoryError> {
        let mut tables = self.tables()?;
        if tables
            .invoices
            .values()
            .any(|invoice| invoice.credited_invoice == Some(id))
        {
            return Err(RepositoryError::Protected {
                entity: "invoice",
                id: id.0,
                referenced_by: "credit note",
            });
        }
        let removed = tables
            .invoices
            .remove(&id)
            .ok_or_else(|| RepositoryError::not_found("invoice", id.0))?;
        if let Some(credited) = removed.credited_invoice {
            refresh_amounts(&mut tables.invoices, [credited]);
        }
        Ok(removed)
    }
}

impl FormRepository for MemoryStore {
    fn forms(&self) -> Result<Vec<Form>, RepositoryError> {
        Ok(self.tables()?.forms.values().cloned().collect())
    }

    fn form(&self, id: FormId) -> Result<Option<Form>, RepositoryError> {
        Ok(self.tables()?.forms.get(&id).cloned())
    }

    fn insert_form(&self, form: Form) -> Result<Form, RepositoryError> {
        let mut tables = self.tables()?;
        if tables.forms.contains_key(&form.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.forms.insert(form.id, form.clone());
        Ok(form)
    }

    fn update_form(&self, form: Form) -> Result<Form, RepositoryError> {
        let mut tables = self.tables()?;
        let slot = tables
            .forms
            .get_mut(&form.id)
            .ok_or_else(|| RepositoryError::not_found("form", form.id.0))?;
        *slot = form.clone();
        Ok(form)
    }

    fn delete_form(&self, id: FormId) -> Result<Form, RepositoryError> {
        let mut tables = self.tables()?;
        let protected = |referenced_by| RepositoryError::Protected {
            entity: "form",
            id: id.0,
            referenced_by,
        };
        if tables.answers.values().any(|answer| answer.form == id) {
            return Err(protected("answer"));
        }
        if tables
            .plot_searches
            .values()
            .any(|search| search.form == Some(id))
        {
            return Err(protected("plot search"));
        }
        tables
            .forms
            .remove(&id)
            .ok_or_else(|| RepositoryError::not_found("form", id.0))
    }

    fn field_types(&self) -> Result<Vec<FieldType>, RepositoryError> {
        Ok(self.tables()?.reference.field_types.clone())
    }

    fn insert_field_type(&self, field_type: FieldType) -> Result<FieldType, RepositoryError> {
        let mut tables = self.tables()?;
        let field_types = &mut tables.reference.field_types;
        if field_types
            .iter()
            .any(|existing| existing.id == field_type.id || existing.identifier == field_type.identifier)
        {
            return Err(RepositoryError::Conflict);
        }
        field_types.push(field_type.clone());
        Ok(field_type)
    }

    fn answers(&self) -> Result<Vec<Answer>, RepositoryError> {
        Ok(self.tables()?.answers.values().cloned().collect())
    }

    fn answer(&self, id: AnswerId) -> Result<Option<Answer>, RepositoryError> {
        Ok(self.tables()?.answers.get(&id).cloned())
    }

    fn insert_answer(
        &self,
        answer: Answer,
        attachments: &[AttachmentId],
    ) -> Result<Answer, RepositoryError> {
        let mut tables = self.tables()?;
        if tables.answers.contains_key(&answer.id) {
            return Err(RepositoryError::Conflict);
        }
        if let Some(missing) = attachments
            .iter()
            .find(|id| !tables.attachments.contains_key(*id))
        {
            return Err(RepositoryError::not_found("attachment", missing.0));
        }
        for id in attachments {
            if let Some(attachment) = tables.attachments.get_mut(id) {
                attachment.answer = Some(answer.id);
            }
        }
        tables.answers.insert(answer.id, answer.clone());
        Ok(answer)
    }

    fn attachments(&self) -> Result<Vec<Attachment>, RepositoryError> {
        Ok(self.tables()?.attachments.values().cloned().collect())
    }

    fn insert_attachment(&self, attachment: Attachment) -> Result<Attachment, RepositoryError> {
        let mut tables = self.tables()?;
        if tables.attachments.contains_key(&attachment.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.attachments.insert(attachment.id, attachment.clone());
        Ok(attachment)
    }

    fn delete_attachment(&self, id: AttachmentId) -> Result<Attachment, RepositoryError> {
        self.tables()?
            .attachments
            .remove(&id)
            .ok_or_else(|| RepositoryError::not_found("attachment", id.0))
    }
}

impl PlotSearchRepository for MemoryStore {
    fn plot_searches(&self) -> Result<Vec<PlotSearch>, RepositoryError> {
        Ok(self.tables()?.plot_searches.values().cloned().collect())
    }

    fn plot_search(&self, id: PlotSearchId) -> Result<Option<PlotSearch>, RepositoryError> {
        Ok(self.tables()?.plot_searches.get(&id).cloned())
    }

    fn write_plot_search<E, F>(&self, target: PlotSearchWrite, change: F) -> Result<PlotSearch, E>
    where
        F: FnOnce(&mut PlotSearch, &mut dyn PlanUnitAccess) -> Result<(), E>,
        E: From<RepositoryError>,
    {
        let mut tables = self.tables()?;
        let mut search = match target {
            PlotSearchWrite::Create(search) => {
                if tables.plot_searches.contains_key(&search.id) {
                    return Err(RepositoryError::Conflict.into());
                }
                search
            }
            PlotSearchWrite::Update(id) => tables
                .plot_searches
                .get(&id)
                .cloned()
                .ok_or_else(|| RepositoryError::not_found("plot search", id.0))?,
        };

        let mut staged = StagedLeases {
            leases: tables.leases.clone(),
        };
        change(&mut search, &mut staged)?;

        tables.leases = staged.leases;
        tables.plot_searches.insert(search.id, search.clone());
        Ok(search)
    }

    fn delete_plot_search(&self, id: PlotSearchId) -> Result<PlotSearch, RepositoryError> {
        let mut tables = self.tables()?;
        let search = tables
            .plot_searches
            .remove(&id)
            .ok_or_else(|| RepositoryError::not_found("plot search", id.0))?;
        for target in &search.plot_search_targets {
            remove_plan_unit(&mut tables.leases, target.plan_unit);
        }
        Ok(search)
    }

    fn plot_search_types(&self) -> Result<Vec<PlotSearchType>, RepositoryError> {
        Ok(self.tables()?.reference.plot_search_types.clone())
    }

    fn plot_search_subtypes(&self) -> Result<Vec<PlotSearchSubtype>, RepositoryError> {
        Ok(self.tables()?.reference.plot_search_subtypes.clone())
    }

    fn plot_search_stages(&self) -> Result<Vec<PlotSearchStage>, RepositoryError> {
        Ok(self.tables()?.reference.plot_search_stages.clone())
    }

    fn intended_uses(&self) -> Result<Vec<AreaSearchIntendedUse>, RepositoryError> {
        Ok(self.tables()?.reference.intended_uses.clone())
    }

    fn area_searches(&self) -> Result<Vec<AreaSearch>, RepositoryError> {
        Ok(self.tables()?.area_searches.values().cloned().collect())
    }

    fn insert_area_search(&self, search: AreaSearch) -> Result<AreaSearch, RepositoryError> {
        let mut tables = self.tables()?;
        if tables.area_searches.contains_key(&search.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.area_searches.insert(search.id, search.clone());
        Ok(search)
    }
}

impl CreditIntegrationRepository for MemoryStore {
    fn credit_decisions(&self) -> Result<Vec<CreditDecision>, RepositoryError> {
        Ok(self.tables()?.credit_decisions.values().cloned().collect())
    }

    fn insert_credit_decision(
        &self,
        decision: CreditDecision,
    ) -> Result<CreditDecision, RepositoryError> {
        let mut tables = self.tables()?;
        if tables.credit_decisions.contains_key(&decision.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.credit_decisions.insert(decision.id, decision.clone());
        Ok(decision)
    }

    fn credit_decision_logs(&self) -> Result<Vec<CreditDecisionLog>, RepositoryError> {
        Ok(self.tables()?.credit_decision_logs.clone())
    }

    fn insert_credit_decision_log(
        &self,
        log: CreditDecisionLog,
    ) -> Result<CreditDecisionLog, RepositoryError> {
        self.tables()?.credit_decision_logs.push(log.clone());
        Ok(log)
    }
}
