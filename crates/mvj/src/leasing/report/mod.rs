//! Tabular reports over leasing data.
//!
//! A report declares its query inputs and its columns; [`ReportRunner`] erases the input
//! type so every report can be listed and run by slug.

mod decision_conditions;
mod invoice_payments;
pub mod router;
pub mod service;

use axum::extract::Query;
use axum::http::Uri;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::http::ApiError;
use crate::leasing::domain::{ConditionType, Lease};
use crate::leasing::invoice::Invoice;
use crate::money::Money;
use crate::store::RepositoryError;

pub use decision_conditions::DecisionConditionsReport;
pub use invoice_payments::InvoicePaymentsReport;
pub use router::report_router;
pub use service::ReportService;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("report '{0}' does not exist")]
    UnknownReport(String),
    #[error("invalid report input: {0}")]
    InvalidInput(String),
    #[error("failed to render csv: {0}")]
    Csv(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<csv::Error> for ReportError {
    fn from(err: csv::Error) -> Self {
        ReportError::Csv(err.to_string())
    }
}

impl From<ReportError> for ApiError {
    fn from(value: ReportError) -> Self {
        match value {
            ReportError::UnknownReport(_) => ApiError::NotFound(value.to_string()),
            ReportError::InvalidInput(_) => ApiError::BadRequest(value.to_string()),
            ReportError::Csv(_) => ApiError::Internal(value.to_string()),
            ReportError::Repository(err) => err.into(),
        }
    }
}

/// Records a report may read.
#[derive(Debug, Clone, Default)]
pub struct ReportData {
    pub leases: Vec<Lease>,
    pub invoices: Vec<Invoice>,
    pub condition_types: Vec<ConditionType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportColumn {
    pub key: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InputField {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: &'static str,
    pub required: bool,
}

pub trait Report: Send + Sync {
    type Input: DeserializeOwned;
    type Row: Serialize;

    fn slug(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Model permission needed to run the report.
    fn permission(&self) -> &'static str;
    fn input_fields(&self) -> &'static [InputField];
    fn columns(&self) -> &'static [ReportColumn];
    fn rows(&self, data: &ReportData, input: &Self::Input) -> Vec<Self::Row>;

    /// Money column summed into a `Total` row of the CSV output.
    fn total_column(&self) -> Option<&'static str> {
        None
    }
}

/// Listing entry of `GET /reports/`.
#[derive(Debug, Clone, Serialize)]
pub struct ReportInfo {
    pub slug: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub input_fields: &'static [InputField],
}

/// Rows of a finished report, each keyed by column.
#[derive(Debug, Clone, Serialize)]
pub struct ReportOutput {
    pub name: &'static str,
    pub columns: &'static [ReportColumn],
    pub rows: Vec<Value>,
    #[serde(skip)]
    total_column: Option<&'static str>,
}

impl ReportOutput {
    pub fn total(&self) -> Option<Money> {
        let column = self.total_column?;
        Some(
            self.rows
                .iter()
                .filter_map(|row| row.get(column))
                .filter_map(|cell| cell.as_str()?.parse::<Money>().ok())
                .sum(),
        )
    }

    pub fn to_csv(&self) -> Result<String, ReportError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(self.columns.iter().map(|column| column.label))?;
        for row in &self.rows {
            writer.write_record(self.columns.iter().map(|column| cell(row.get(column.key))))?;
        }
        if let (Some(column), Some(total)) = (self.total_column, self.total()) {
            let record: Vec<String> = self
                .columns
                .iter()
                .enumerate()
                .map(|(index, candidate)| {
                    if candidate.key == column {
                        total.to_string()
                    } else if index == 0 {
                        "Total".to_string()
                    } else {
                        String::new()
                    }
                })
                .collect();
            writer.write_record(&record)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| ReportError::Csv(err.to_string()))?;
        String::from_utf8(bytes).map_err(|err| ReportError::Csv(err.to_string()))
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Object-safe view of a [`Report`] that parses its own input from the request URI.
pub trait ReportRunner: Send + Sync {
    fn info(&self) -> ReportInfo;
    fn permission(&self) -> &'static str;
    fn run(&self, data: &ReportData, uri: &Uri) -> Result<ReportOutput, ReportError>;
}

impl<T: Report> ReportRunner for T {
    fn info(&self) -> ReportInfo {
        ReportInfo {
            slug: self.slug(),
            name: self.name(),
            description: self.description(),
            input_fields: self.input_fields(),
        }
    }

    fn permission(&self) -> &'static str {
        Report::permission(self)
    }

    fn run(&self, data: &ReportData, uri: &Uri) -> Result<ReportOutput, ReportError> {
        let Query(input) = Query::<T::Input>::try_from_uri(uri)
            .map_err(|err| ReportError::InvalidInput(err.body_text()))?;
        let rows = self
            .rows(data, &input)
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| ReportError::InvalidInput(err.to_string()))?;
        Ok(ReportOutput {
            name: self.name(),
            columns: self.columns(),
            rows,
            total_column: self.total_column(),
        })
    }
}
