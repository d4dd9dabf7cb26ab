//! Custom charges billed outside the regular rent schedule.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::leasing::domain::{days_inclusive, ContactId, Lease, LeaseId, ReceivableTypeId, TenantId};
use crate::money::{Fraction, Money};

use super::InvoiceError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChargeRowInput {
    pub amount: Money,
    pub receivable_type: ReceivableTypeId,
}

/// Body of `POST /leases/{id}/create_charge/`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChargeRequest {
    #[serde(default)]
    pub lease: Option<LeaseId>,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub billing_period_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub billing_period_end_date: Option<NaiveDate>,
    pub rows: Vec<ChargeRowInput>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ChargeRequest {
    /// Both period dates or neither; a missing period is the single day `today`.
    pub fn billing_period(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), InvoiceError> {
        match (self.billing_period_start_date, self.billing_period_end_date) {
            (Some(start), Some(end)) if end < start => Err(InvoiceError::BillingPeriodReversed),
            (Some(start), Some(end)) => Ok((start, end)),
            (None, None) => Ok((today, today)),
            _ => Err(InvoiceError::BillingPeriodIncomplete),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRowDraft {
    pub tenant: TenantId,
    pub receivable_type: ReceivableTypeId,
    pub billing_period_start_date: NaiveDate,
    pub billing_period_end_date: NaiveDate,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeInvoiceDraft {
    pub recipient: ContactId,
    pub rows: Vec<ChargeRowDraft>,
}

impl ChargeInvoiceDraft {
    pub fn rows_total(&self) -> Money {
        self.rows.iter().map(|row| row.amount).sum()
    }
}

/// One charge invoice per recipient; several recipients share an invoice set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargePlan {
    pub lease: LeaseId,
    pub due_date: NaiveDate,
    pub invoicing_date: NaiveDate,
    pub billing_period_start_date: NaiveDate,
    pub billing_period_end_date: NaiveDate,
    pub notes: String,
    /// Sum of the requested rows; every invoice of the charge carries it as its total.
    pub total_amount: Money,
    pub invoices: Vec<ChargeInvoiceDraft>,
}

impl ChargePlan {
    pub fn needs_invoice_set(&self) -> bool {
        self.invoices.len() > 1
    }
}

/// Distributes each requested row over the lease's tenants for the billing period.
///
/// A tenant's part is the row amount weighted by the days its tenancy overlaps the
/// period and by its share. Rounding leftovers of an input row go to its largest
/// distributed row so the distributed rows add up to the requested amount.
pub fn plan_charge(
    lease: &Lease,
    request: &ChargeRequest,
    today: NaiveDate,
) -> Result<ChargePlan, InvoiceError> {
    let (start, end) = request.billing_period(today)?;
    if request.rows.is_empty() {
        return Err(InvoiceError::NoChargeRows);
    }
    let total_amount: Money = request.rows.iter().map(|row| row.amount).sum();
    if !total_amount.is_in_range() {
        return Err(InvoiceError::TotalOutOfRange(total_amount));
    }

    let period_days = i128::from(days_inclusive(start, end));
    let mut by_recipient: BTreeMap<ContactId, Vec<(TenantId, Fraction, (NaiveDate, NaiveDate))>> =
        BTreeMap::new();
    for tenant in lease.tenants_for_period(start, end) {
        let (Some(overlap), Some(recipient)) =
            (tenant.overlap(start, end), tenant.recipient_for(start, end))
        else {
            continue;
        };
        let days = Fraction::new(i128::from(days_inclusive(overlap.0, overlap.1)), period_days)
            .unwrap_or(Fraction::ZERO);
        by_recipient
            .entry(recipient)
            .or_default()
            .push((tenant.id, days * tenant.share(), overlap));
    }

    if by_recipient.is_empty() {
        return Err(InvoiceError::NoTenantsInPeriod);
    }

    // (invoice index, row index) of every row distributed from one input row
    let mut distributed: Vec<Vec<(usize, usize)>> = vec![Vec::new(); request.rows.len()];
    let mut invoices: Vec<ChargeInvoiceDraft> = Vec::with_capacity(by_recipient.len());
    for (recipient, tenants) in by_recipient {
        let invoice_index = invoices.len();
        let mut rows = Vec::new();
        for (input_index, input) in request.rows.iter().enumerate() {
            for (tenant, weight, (from, to)) in &tenants {
                distributed[input_index].push((invoice_index, rows.len()));
                rows.push(ChargeRowDraft {
                    tenant: *tenant,
                    receivable_type: input.receivable_type,
                    billing_period_start_date: *from,
                    billing_period_end_date: *to,
                    amount: input.amount.mul_fraction(*weight),
                });
            }
        }
        invoices.push(ChargeInvoiceDraft { recipient, rows });
    }

    for (input, positions) in request.rows.iter().zip(&distributed) {
        let sum: Money = positions
            .iter()
            .map(|(invoice, row)| invoices[*invoice].rows[*row].amount)
            .sum();
        let difference = input.amount - sum;
        if difference.is_zero() {
            continue;
        }
        let largest = positions
            .iter()
            .copied()
            .reduce(|best, candidate| {
                let best_amount = invoices[best.0].rows[best.1].amount.abs();
                let candidate_amount = invoices[candidate.0].rows[candidate.1].amount.abs();
                if candidate_amount > best_amount {
                    candidate
                } else {
                    best
                }
            });
        if let Some((invoice, row)) = largest {
            invoices[invoice].rows[row].amount += difference;
        }
    }

    Ok(ChargePlan {
        lease: lease.id,
        due_date: request.due_date,
        invoicing_date: today,
        billing_period_start_date: start,
        billing_period_end_date: end,
        notes: request.notes.clone().unwrap_or_default(),
        total_amount,
        invoices,
    })
}
