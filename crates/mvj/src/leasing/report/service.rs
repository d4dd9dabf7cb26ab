use std::sync::Arc;

use axum::http::Uri;
use tracing::{info, warn};

use crate::leasing::invoice::InvoiceRepository;
use crate::leasing::repository::LeasingRepository;

use super::{
    DecisionConditionsReport, InvoicePaymentsReport, ReportData, ReportError, ReportInfo,
    ReportOutput, ReportRunner,
};

pub struct ReportService<R> {
    repository: Arc<R>,
    reports: Vec<Box<dyn ReportRunner>>,
}

impl<R> ReportService<R>
where
    R: LeasingRepository + InvoiceRepository,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            reports: vec![
                Box::new(InvoicePaymentsReport),
                Box::new(DecisionConditionsReport),
            ],
        }
    }

    pub fn list(&self) -> Vec<ReportInfo> {
        self.reports.iter().map(|report| report.info()).collect()
    }

    pub fn report(&self, slug: &str) -> Result<&dyn ReportRunner, ReportError> {
        self.reports
            .iter()
            .find(|report| report.info().slug == slug)
            .map(|report| report.as_ref())
            .ok_or_else(|| ReportError::UnknownReport(slug.to_string()))
    }

    /// Runs the report with inputs taken from the query string of `uri`.
    pub fn run(&self, slug: &str, uri: &Uri) -> Result<ReportOutput, ReportError> {
        let report = self.report(slug)?;
        let data = ReportData {
            leases: self.repository.leases()?,
            invoices: self.repository.invoices()?,
            condition_types: self.repository.condition_types()?,
        };
        let output = report
            .run(&data, uri)
            .inspect_err(|err| warn!(report = slug, error = %err, "report failed"))?;
        info!(report = slug, rows = output.rows.len(), "report generated");
        Ok(output)
    }
}
