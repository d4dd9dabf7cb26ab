//! Credit-note allocation.
//!
//! Planning works on plain values and never touches storage: a plan is either fully
//! built or rejected, and the service commits accepted plans in one batch.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::leasing::domain::{ContactId, LeaseId, ReceivableTypeId, Tenant, TenantId};
use crate::money::{Fraction, Money};

use super::domain::{Invoice, InvoiceId, InvoiceRowId, InvoiceSet, InvoiceType};
use super::InvoiceError;

/// `share_numerator / share_denominator` of the tenants referenced by invoice rows.
#[derive(Debug, Clone, Default)]
pub struct TenantShares(HashMap<TenantId, (u32, u32)>);

impl TenantShares {
    pub fn from_tenants<'a>(tenants: impl IntoIterator<Item = &'a Tenant>) -> Self {
        Self(
            tenants
                .into_iter()
                .map(|tenant| (tenant.id, (tenant.share_numerator, tenant.share_denominator)))
                .collect(),
        )
    }

    pub fn insert(&mut self, tenant: TenantId, numerator: u32, denominator: u32) {
        self.0.insert(tenant, (numerator, denominator));
    }

    fn numerator(&self, tenant: TenantId) -> Result<u32, InvoiceError> {
        self.0
            .get(&tenant)
            .map(|(numerator, _)| *numerator)
            .ok_or(InvoiceError::UnknownTenant(tenant))
    }

    fn fraction(&self, tenant: TenantId) -> Result<Fraction, InvoiceError> {
        let (numerator, denominator) = self
            .0
            .get(&tenant)
            .copied()
            .ok_or(InvoiceError::UnknownTenant(tenant))?;
        Fraction::new(i128::from(numerator), i128::from(denominator))
            .ok_or(InvoiceError::UnknownTenant(tenant))
    }
}

/// Body of `POST /invoices/{id}/credit/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreditRequest {
    #[serde(default)]
    pub row_ids: Option<Vec<InvoiceRowId>>,
    #[serde(default)]
    pub amount: Option<Money>,
    #[serde(default)]
    pub receivable_type: Option<ReceivableTypeId>,
}

impl CreditRequest {
    pub fn full() -> Self {
        Self::default()
    }

    fn credits_everything(&self) -> bool {
        self.row_ids.as_ref().map_or(true, Vec::is_empty)
            && self.amount.is_none()
            && self.receivable_type.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditRowDraft {
    pub tenant: Option<TenantId>,
    pub receivable_type: ReceivableTypeId,
    pub billing_period_start_date: Option<NaiveDate>,
    pub billing_period_end_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub amount: Money,
}

/// Credit note waiting to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditNoteDraft {
    pub credited_invoice: InvoiceId,
    pub lease: LeaseId,
    pub recipient: ContactId,
    pub due_date: NaiveDate,
    pub invoicing_date: NaiveDate,
    pub billing_period_start_date: Option<NaiveDate>,
    pub billing_period_end_date: Option<NaiveDate>,
    pub total_amount: Money,
    pub billed_amount: Money,
    pub rows: Vec<CreditRowDraft>,
    /// Whether the credited invoice becomes `Refunded`.
    pub refunds_source: bool,
}

impl CreditNoteDraft {
    pub fn rows_total(&self) -> Money {
        self.rows.iter().map(|row| row.amount).sum()
    }
}

/// Credit notes grouped into a new invoice set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditSetPlan {
    pub lease: LeaseId,
    pub billing_period_start_date: Option<NaiveDate>,
    pub billing_period_end_date: Option<NaiveDate>,
    pub notes: Vec<CreditNoteDraft>,
}

/// Plans a credit note for a charge invoice.
///
/// Rows are narrowed by `row_ids` and `receivable_type`. With an amount, it is split in
/// proportion to the rows' tenant share numerators when every row has a tenant, and
/// equally otherwise. Without an amount every row is credited in full.
pub fn plan_credit_note(
    invoice: &Invoice,
    shares: &TenantShares,
    request: &CreditRequest,
    today: NaiveDate,
) -> Result<CreditNoteDraft, InvoiceError> {
    if invoice.invoice_type != InvoiceType::Charge {
        return Err(InvoiceError::NotCreditable(invoice.invoice_type));
    }

    let rows: Vec<_> = invoice
        .rows
        .iter()
        .filter(|row| {
            request
                .row_ids
                .as_ref()
                .filter(|ids| !ids.is_empty())
                .map_or(true, |ids| ids.contains(&row.id))
        })
        .filter(|row| {
            request
                .receivable_type
                .map_or(true, |kind| row.receivable_type == kind)
        })
        .collect();

    if rows.is_empty() {
        return Err(InvoiceError::NoRowsToCredit);
    }

    let tenants: Option<Vec<TenantId>> = rows.iter().map(|row| row.tenant).collect();
    let numerators = match &tenants {
        Some(tenants) => Some(
            tenants
                .iter()
                .map(|tenant| shares.numerator(*tenant))
                .collect::<Result<Vec<u32>, _>>()?,
        ),
        None => None,
    };
    let numerator_total: i128 = numerators
        .iter()
        .flatten()
        .map(|numerator| i128::from(*numerator))
        .sum();

    let row_count = rows.len() as i128;
    let mut credit_rows = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let amount = match (request.amount, &numerators) {
            (Some(amount), Some(numerators)) => {
                let share = Fraction::new(i128::from(numerators[index]), numerator_total)
                    .ok_or(InvoiceError::SharesDoNotSumToOne(Fraction::ZERO))?;
                amount.mul_fraction(share)
            }
            (Some(amount), None) => Fraction::new(1, row_count)
                .map(|share| amount.mul_fraction(share))
                .unwrap_or(Money::ZERO),
            (None, _) => row.amount,
        };

        credit_rows.push(CreditRowDraft {
            tenant: row.tenant,
            receivable_type: row.receivable_type,
            billing_period_start_date: row.billing_period_start_date,
            billing_period_end_date: row.billing_period_end_date,
            description: row.description.clone(),
            amount,
        });
    }

    Ok(CreditNoteDraft {
        credited_invoice: invoice.id,
        lease: invoice.lease,
        recipient: invoice.recipient,
        due_date: invoice.due_date,
        invoicing_date: today,
        billing_period_start_date: invoice.billing_period_start_date,
        billing_period_end_date: invoice.billing_period_end_date,
        total_amount: invoice.total_amount,
        billed_amount: invoice.billed_amount,
        rows: credit_rows,
        refunds_source: request.credits_everything(),
    })
}

fn charges(invoices: &[Invoice]) -> Result<Vec<&Invoice>, InvoiceError> {
    let charges: Vec<&Invoice> = invoices
        .iter()
        .filter(|invoice| invoice.invoice_type == InvoiceType::Charge)
        .collect();
    if charges.is_empty() {
        return Err(InvoiceError::NoRefundableInvoices);
    }
    Ok(charges)
}

/// Credits every charge invoice of a set in full.
///
/// With a receivable type, charges without rows of that type are left out.
pub fn plan_credit_invoiceset(
    set: &InvoiceSet,
    invoices: &[Invoice],
    shares: &TenantShares,
    receivable_type: Option<ReceivableTypeId>,
    today: NaiveDate,
) -> Result<CreditSetPlan, InvoiceError> {
    let request = CreditRequest {
        receivable_type,
        ..CreditRequest::default()
    };

    let mut notes = Vec::new();
    for invoice in charges(invoices)? {
        match plan_credit_note(invoice, shares, &request, today) {
            Ok(note) => notes.push(note),
            Err(InvoiceError::NoRowsToCredit) if receivable_type.is_some() => continue,
            Err(err) => return Err(err),
        }
    }
    if notes.is_empty() {
        return Err(InvoiceError::NoRowsToCredit);
    }

    Ok(CreditSetPlan {
        lease: set.lease,
        billing_period_start_date: set.billing_period_start_date,
        billing_period_end_date: set.billing_period_end_date,
        notes,
    })
}

/// Exact share of the invoice's rows of `receivable_type`, summed over their tenants.
pub fn fraction_for_receivable_type(
    invoice: &Invoice,
    shares: &TenantShares,
    receivable_type: ReceivableTypeId,
) -> Result<Fraction, InvoiceError> {
    invoice
        .rows
        .iter()
        .filter(|row| row.receivable_type == receivable_type)
        .filter_map(|row| row.tenant)
        .map(|tenant| shares.fraction(tenant))
        .sum()
}

/// Splits `amount` of one receivable type across the set's charge invoices.
///
/// Each invoice's share is the sum of its rows' tenant shares when every matching row
/// has a tenant, otherwise its fraction of the matching rows. The shares must add up to
/// exactly one. Every charge gets a credit note, so a charge without rows of the type
/// fails the whole set with [`InvoiceError::NoRowsToCredit`].
pub fn plan_credit_invoiceset_for_amount(
    set: &InvoiceSet,
    invoices: &[Invoice],
    shares: &TenantShares,
    amount: Money,
    receivable_type: Option<ReceivableTypeId>,
    today: NaiveDate,
) -> Result<CreditSetPlan, InvoiceError> {
    let receivable_type = receivable_type.ok_or(InvoiceError::ReceivableTypeRequired)?;
    let charges = charges(invoices)?;

    let matching: Vec<_> = charges
        .iter()
        .flat_map(|invoice| invoice.rows.iter())
        .filter(|row| row.receivable_type == receivable_type)
        .collect();
    if matching.is_empty() {
        return Err(InvoiceError::NoRowsToCredit);
    }

    let total: Money = matching.iter().map(|row| row.amount).sum();
    if amount > total {
        return Err(InvoiceError::AmountExceedsTotal { amount, total });
    }

    let has_tenants = matching.iter().all(|row| row.tenant.is_some());
    let total_rows = matching.len() as i128;

    let mut invoice_shares = Vec::with_capacity(charges.len());
    for invoice in &charges {
        let share = if has_tenants {
            fraction_for_receivable_type(invoice, shares, receivable_type)?
        } else {
            let rows = invoice
                .rows
                .iter()
                .filter(|row| row.receivable_type == receivable_type)
                .count() as i128;
            Fraction::new(rows, total_rows).unwrap_or(Fraction::ZERO)
        };
        invoice_shares.push((*invoice, share));
    }

    let sum: Fraction = invoice_shares.iter().map(|(_, share)| *share).sum();
    if !sum.is_one() {
        return Err(InvoiceError::SharesDoNotSumToOne(sum));
    }

    let mut notes = Vec::new();
    for (invoice, share) in invoice_shares {
        let request = CreditRequest {
            row_ids: None,
            amount: Some(amount.mul_fraction(share)),
            receivable_type: Some(receivable_type),
        };
        notes.push(plan_credit_note(invoice, shares, &request, today)?);
    }

    Ok(CreditSetPlan {
        lease: set.lease,
        billing_period_start_date: set.billing_period_start_date,
        billing_period_end_date: set.billing_period_end_date,
        notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leasing::invoice::domain::{InvoiceRow, InvoiceSetId, InvoiceState};
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    const RENT: ReceivableTypeId = ReceivableTypeId(1);
    const COLLATERAL: ReceivableTypeId = ReceivableTypeId(2);

    fn row(id: u64, tenant: Option<u64>, kind: ReceivableTypeId, cents: i64) -> InvoiceRow {
        InvoiceRow {
            id: InvoiceRowId(id),
            tenant: tenant.map(TenantId),
            receivable_type: kind,
            billing_period_start_date: Some(date(2024, 1, 1)),
            billing_period_end_date: Some(date(2024, 12, 31)),
            description: None,
            amount: Money::from_cents(cents),
        }
    }

    fn charge(id: u64, rows: Vec<InvoiceRow>) -> Invoice {
        let now = Utc::now();
        let total: Money = rows.iter().map(|row| row.amount).sum();
        Invoice {
            id: InvoiceId(id),
            lease: LeaseId(1),
            invoiceset: Some(InvoiceSetId(50)),
            number: Some(id),
            recipient: ContactId(id),
            sent_to_sap_at: None,
            sap_id: None,
            due_date: date(2024, 3, 1),
            invoicing_date: None,
            state: InvoiceState::Open,
            billing_period_start_date: Some(date(2024, 1, 1)),
            billing_period_end_date: Some(date(2024, 12, 31)),
            postpone_date: None,
            total_amount: total,
            billed_amount: total,
            outstanding_amount: total,
            payment_notification_date: None,
            collection_charge: None,
            payment_notification_catalog_date: None,
            delivery_method: None,
            invoice_type: InvoiceType::Charge,
            notes: String::new(),
            generated: false,
            description: None,
            credited_invoice: None,
            rows,
            payments: Vec::new(),
            created_at: now,
            modified_at: now,
        }
    }

    fn set(invoices: &[Invoice]) -> InvoiceSet {
        InvoiceSet {
            id: InvoiceSetId(50),
            lease: LeaseId(1),
            billing_period_start_date: Some(date(2024, 1, 1)),
            billing_period_end_date: Some(date(2024, 12, 31)),
            invoices: invoices.iter().map(|invoice| invoice.id).collect(),
        }
    }

    fn thirds() -> TenantShares {
        let mut shares = TenantShares::default();
        shares.insert(TenantId(1), 1, 3);
        shares.insert(TenantId(2), 1, 3);
        shares.insert(TenantId(3), 1, 3);
        shares
    }

    fn amounts(note: &CreditNoteDraft) -> Vec<i64> {
        note.rows.iter().map(|row| row.amount.cents()).collect()
    }

    #[test]
    fn full_credit_copies_rows_and_refunds_source() {
        let invoice = charge(1, vec![row(1, None, RENT, 12_000), row(2, None, COLLATERAL, 3_000)]);
        let note = plan_credit_note(&invoice, &TenantShares::default(), &CreditRequest::full(), date(2024, 5, 1))
            .expect("credit plans");

        assert_eq!(amounts(&note), vec![12_000, 3_000]);
        assert!(note.refunds_source);
        assert_eq!(note.credited_invoice, InvoiceId(1));
        assert_eq!(note.due_date, invoice.due_date);
        assert_eq!(note.invoicing_date, date(2024, 5, 1));
        assert_eq!(note.total_amount, invoice.total_amount);
    }

    #[test]
    fn partial_credit_does_not_refund_source() {
        let invoice = charge(1, vec![row(1, None, RENT, 12_000), row(2, None, COLLATERAL, 3_000)]);
        let request = CreditRequest {
            row_ids: Some(vec![InvoiceRowId(2)]),
            ..CreditRequest::default()
        };
        let note = plan_credit_note(&invoice, &TenantShares::default(), &request, date(2024, 5, 1))
            .expect("credit plans");
        assert_eq!(amounts(&note), vec![3_000]);
        assert!(!note.refunds_source);
    }

    #[test]
    fn amount_splits_by_tenant_numerators() {
        let invoice = charge(
            1,
            vec![row(1, Some(1), RENT, 10_000), row(2, Some(2), RENT, 10_000), row(3, Some(3), RENT, 10_000)],
        );
        let request = CreditRequest {
            amount: Some(Money::from_euros(100)),
            ..CreditRequest::default()
        };
        let note = plan_credit_note(&invoice, &thirds(), &request, date(2024, 5, 1)).expect("credit plans");
        assert_eq!(amounts(&note), vec![3_333, 3_333, 3_333]);
    }

    #[test]
    fn amount_without_tenants_splits_equally_and_rounds_half_up() {
        let invoice = charge(1, vec![row(1, None, RENT, 100), row(2, Some(1), RENT, 100)]);
        let request = CreditRequest {
            amount: Some(Money::from_cents(1)),
            ..CreditRequest::default()
        };
        let note = plan_credit_note(&invoice, &thirds(), &request, date(2024, 5, 1)).expect("credit plans");
        // 0.005 rounds up to 0.01
        assert_eq!(amounts(&note), vec![1, 1]);
    }

    #[test]
    fn only_charges_can_be_credited() {
        let mut invoice = charge(1, vec![row(1, None, RENT, 100)]);
        invoice.invoice_type = InvoiceType::CreditNote;
        assert_eq!(
            plan_credit_note(&invoice, &TenantShares::default(), &CreditRequest::full(), date(2024, 5, 1)),
            Err(InvoiceError::NotCreditable(InvoiceType::CreditNote))
        );
    }

    #[test]
    fn unmatched_filters_have_nothing_to_credit() {
        let invoice = charge(1, vec![row(1, None, RENT, 100)]);
        let request = CreditRequest {
            receivable_type: Some(COLLATERAL),
            ..CreditRequest::default()
        };
        assert_eq!(
            plan_credit_note(&invoice, &TenantShares::default(), &request, date(2024, 5, 1)),
            Err(InvoiceError::NoRowsToCredit)
        );
    }

    #[test]
    fn set_credit_covers_every_charge() {
        let invoices = vec![
            charge(1, vec![row(1, Some(1), RENT, 5_000)]),
            charge(2, vec![row(2, Some(2), RENT, 5_000)]),
        ];
        let plan = plan_credit_invoiceset(&set(&invoices), &invoices, &thirds(), None, date(2024, 5, 1))
            .expect("set credit plans");
        assert_eq!(plan.notes.len(), 2);
        assert!(plan.notes.iter().all(|note| note.refunds_source));
        assert_eq!(plan.lease, LeaseId(1));
    }

    #[test]
    fn set_without_charges_is_rejected() {
        let mut only_note = charge(1, vec![row(1, None, RENT, 100)]);
        only_note.invoice_type = InvoiceType::CreditNote;
        let invoices = vec![only_note];
        assert_eq!(
            plan_credit_invoiceset(&set(&invoices), &invoices, &thirds(), None, date(2024, 5, 1)),
            Err(InvoiceError::NoRefundableInvoices)
        );
    }

    #[test]
    fn amount_credit_splits_by_tenant_fractions() {
        let invoices = vec![
            charge(1, vec![row(1, Some(1), RENT, 10_000)]),
            charge(2, vec![row(2, Some(2), RENT, 10_000), row(3, Some(3), RENT, 10_000)]),
        ];
        let plan = plan_credit_invoiceset_for_amount(
            &set(&invoices),
            &invoices,
            &thirds(),
            Money::from_euros(90),
            Some(RENT),
            date(2024, 5, 1),
        )
        .expect("amount credit plans");

        let totals: Vec<i64> = plan.notes.iter().map(|note| note.rows_total().cents()).collect();
        assert_eq!(totals, vec![3_000, 6_000]);
        assert_eq!(amounts(&plan.notes[1]), vec![3_000, 3_000]);
        assert!(plan.notes.iter().all(|note| !note.refunds_source));
    }

    #[test]
    fn amount_credit_splits_by_row_count_without_tenants() {
        let invoices = vec![
            charge(1, vec![row(1, None, RENT, 10_000)]),
            charge(2, vec![row(2, None, RENT, 10_000), row(3, None, COLLATERAL, 500)]),
        ];
        let plan = plan_credit_invoiceset_for_amount(
            &set(&invoices),
            &invoices,
            &TenantShares::default(),
            Money::from_euros(50),
            Some(RENT),
            date(2024, 5, 1),
        )
        .expect("amount credit plans");
        let totals: Vec<i64> = plan.notes.iter().map(|note| note.rows_total().cents()).collect();
        assert_eq!(totals, vec![2_500, 2_500]);
        assert!(plan.notes.iter().all(|note| note.rows.iter().all(|row| row.receivable_type == RENT)));
    }

    #[test]
    fn amount_credit_fails_when_a_charge_has_no_rows_of_the_type() {
        let invoices = vec![
            charge(1, vec![row(1, None, RENT, 10_000)]),
            charge(2, vec![row(2, None, COLLATERAL, 500)]),
        ];
        assert_eq!(
            plan_credit_invoiceset_for_amount(
                &set(&invoices),
                &invoices,
                &TenantShares::default(),
                Money::from_euros(50),
                Some(RENT),
                date(2024, 5, 1),
            ),
            Err(InvoiceError::NoRowsToCredit)
        );
    }

    #[test]
    fn amount_credit_validates_inputs() {
        let invoices = vec![charge(1, vec![row(1, Some(1), RENT, 10_000)])];
        let set = set(&invoices);

        assert_eq!(
            plan_credit_invoiceset_for_amount(&set, &invoices, &thirds(), Money::from_euros(1), None, date(2024, 5, 1)),
            Err(InvoiceError::ReceivableTypeRequired)
        );
        assert_eq!(
            plan_credit_invoiceset_for_amount(&set, &invoices, &thirds(), Money::from_euros(101), Some(RENT), date(2024, 5, 1)),
            Err(InvoiceError::AmountExceedsTotal {
                amount: Money::from_euros(101),
                total: Money::from_euros(100),
            })
        );
        assert_eq!(
            plan_credit_invoiceset_for_amount(&set, &invoices, &thirds(), Money::from_euros(10), Some(RENT), date(2024, 5, 1)),
            Err(InvoiceError::SharesDoNotSumToOne(Fraction::new(1, 3).expect("valid")))
        );
    }
}
