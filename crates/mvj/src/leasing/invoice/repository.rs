use crate::store::{IdSource, RepositoryError};

use super::domain::{Invoice, InvoiceId, InvoiceSet, InvoiceSetId};

/// Invoices written together: new or changed invoices, an optional new set, and
/// invoices to mark refunded.
#[derive(Debug, Clone, Default)]
pub struct InvoiceBatch {
    pub invoice_set: Option<InvoiceSet>,
    pub invoices: Vec<Invoice>,
    pub refunded: Vec<InvoiceId>,
}

/// Invoice storage.
///
/// `commit_invoices` applies a whole batch at once: it numbers new invoices, marks the
/// refunded ones, and recomputes amounts of every touched invoice and of the invoices
/// they credit.
pub trait InvoiceRepository: IdSource {
    fn invoices(&self) -> Result<Vec<Invoice>, RepositoryError>;
    fn invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, RepositoryError>;
    fn credit_notes_for(&self, id: InvoiceId) -> Result<Vec<Invoice>, RepositoryError>;
    fn invoice_set(&self, id: InvoiceSetId) -> Result<Option<InvoiceSet>, RepositoryError>;
    fn invoices_in_set(&self, id: InvoiceSetId) -> Result<Vec<Invoice>, RepositoryError>;
    fn commit_invoices(&self, batch: InvoiceBatch) -> Result<Vec<Invoice>, RepositoryError>;
    fn delete_invoice(&self, id: InvoiceId) -> Result<Invoice, RepositoryError>;
}
