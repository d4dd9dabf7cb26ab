//! Invoices, invoice sets and payments, with credit-note allocation and custom charges.

pub mod charge;
pub mod credit;
pub mod domain;
pub mod repository;
pub mod router;
pub mod service;

pub use charge::{plan_charge, ChargePlan, ChargeRequest, ChargeRowInput};
pub use credit::{
    plan_credit_invoiceset, plan_credit_invoiceset_for_amount, plan_credit_note, CreditNoteDraft,
    CreditRequest, CreditSetPlan, TenantShares,
};
pub use domain::{
    DeliveryMethod, Invoice, InvoiceDraft, InvoiceId, InvoicePayment, InvoicePaymentId,
    InvoicePaymentInput, InvoiceRow, InvoiceRowId, InvoiceRowInput, InvoiceSet, InvoiceSetId,
    InvoiceState, InvoiceType, InvoiceUpdate, InvoiceView,
};
pub use repository::{InvoiceBatch, InvoiceRepository};
pub use router::invoice_router;
pub use service::InvoiceService;

use crate::http::ApiError;
use crate::leasing::domain::{ContactId, ReceivableTypeId, TenantId};
use crate::money::{Fraction, Money};
use crate::store::{NestedError, RepositoryError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvoiceError {
    #[error("can not credit an invoice of type {0:?}, only charges can be credited")]
    NotCreditable(InvoiceType),
    #[error("no rows to credit")]
    NoRowsToCredit,
    #[error("no refundable invoices found (no charge invoices in the set)")]
    NoRefundableInvoices,
    #[error("receivable_type is required if amount is provided")]
    ReceivableTypeRequired,
    #[error("credit amount {amount} is more than the total row amount {total}")]
    AmountExceedsTotal { amount: Money, total: Money },
    #[error("shares together do not equal 1/1 (got {0})")]
    SharesDoNotSumToOne(Fraction),
    #[error("can't edit invoices that have been sent to SAP")]
    SentToSap,
    #[error("{0} of a credit note can not be changed")]
    CreditNoteFieldLocked(&'static str),
    #[error("both billing period start and end are required if one of them is provided")]
    BillingPeriodIncomplete,
    #[error("billing period end must be the same or after the start")]
    BillingPeriodReversed,
    #[error("the lease has no tenants in the billing period")]
    NoTenantsInPeriod,
    #[error("a charge needs at least one row")]
    NoChargeRows,
    #[error("total amount {0} does not fit in ten digits")]
    TotalOutOfRange(Money),
    #[error("tenant {0} is not a tenant of this lease")]
    UnknownTenant(TenantId),
    #[error("receivable type {0} does not exist")]
    UnknownReceivableType(ReceivableTypeId),
    #[error("contact {0} does not exist")]
    UnknownContact(ContactId),
    #[error("only open invoices that have not been sent to SAP can be deleted")]
    NotDeletable,
    #[error("the charge belongs to lease {expected}, not lease {given}")]
    LeaseMismatch { expected: u64, given: u64 },
    #[error(transparent)]
    Nested(#[from] NestedError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<InvoiceError> for ApiError {
    fn from(value: InvoiceError) -> Self {
        match value {
            InvoiceError::Repository(err) => err.into(),
            InvoiceError::NotDeletable => ApiError::Conflict(value.to_string()),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}
