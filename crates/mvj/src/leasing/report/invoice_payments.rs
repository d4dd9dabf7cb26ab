use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::leasing::domain::LeaseId;
use crate::money::Money;

use super::{InputField, Report, ReportColumn, ReportData};

/// Payments received between two dates, with a grand total.
pub struct InvoicePaymentsReport;

#[derive(Debug, Deserialize)]
pub struct InvoicePaymentsInput {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoicePaymentRow {
    pub invoice_number: Option<u64>,
    pub lease_id: String,
    pub paid_date: NaiveDate,
    pub paid_amount: Money,
    pub filing_code: Option<String>,
}

const INPUTS: &[InputField] = &[
    InputField {
        name: "start_date",
        label: "Start date",
        kind: "date",
        required: true,
    },
    InputField {
        name: "end_date",
        label: "End date",
        kind: "date",
        required: true,
    },
];

const COLUMNS: &[ReportColumn] = &[
    ReportColumn {
        key: "invoice_number",
        label: "Invoice number",
    },
    ReportColumn {
        key: "lease_id",
        label: "Lease id",
    },
    ReportColumn {
        key: "paid_date",
        label: "Paid date",
    },
    ReportColumn {
        key: "paid_amount",
        label: "Paid amount",
    },
    ReportColumn {
        key: "filing_code",
        label: "Filing code",
    },
];

impl Report for InvoicePaymentsReport {
    type Input = InvoicePaymentsInput;
    type Row = InvoicePaymentRow;

    fn slug(&self) -> &'static str {
        "invoice_payments"
    }

    fn name(&self) -> &'static str {
        "Invoice payments"
    }

    fn description(&self) -> &'static str {
        "Payments received within the given dates"
    }

    fn permission(&self) -> &'static str {
        "invoicepayment"
    }

    fn input_fields(&self) -> &'static [InputField] {
        INPUTS
    }

    fn columns(&self) -> &'static [ReportColumn] {
        COLUMNS
    }

    fn total_column(&self) -> Option<&'static str> {
        Some("paid_amount")
    }

    fn rows(&self, data: &ReportData, input: &Self::Input) -> Vec<InvoicePaymentRow> {
        let identifiers: HashMap<LeaseId, String> = data
            .leases
            .iter()
            .map(|lease| (lease.id, lease.identifier.to_string()))
            .collect();

        let mut rows: Vec<InvoicePaymentRow> = data
            .invoices
            .iter()
            .flat_map(|invoice| {
                let lease_id = identifiers
                    .get(&invoice.lease)
                    .cloned()
                    .unwrap_or_default();
                invoice
                    .payments
                    .iter()
                    .filter(|payment| {
                        payment.paid_date >= input.start_date && payment.paid_date <= input.end_date
                    })
                    .map(move |payment| InvoicePaymentRow {
                        invoice_number: invoice.number,
                        lease_id: lease_id.clone(),
                        paid_date: payment.paid_date,
                        paid_amount: payment.paid_amount,
                        filing_code: payment.filing_code.clone(),
                    })
            })
            .collect();
        rows.sort_by(|a, b| {
            a.paid_date
                .cmp(&b.paid_date)
                .then(a.invoice_number.cmp(&b.invoice_number))
        });
        rows
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Uri;

    use super::*;
    use crate::leasing::domain::ContactId;
    use crate::leasing::invoice::domain::{InvoiceId, InvoicePayment, InvoicePaymentId};
    use crate::leasing::invoice::service::blank_invoice;
    use crate::leasing::report::ReportRunner;
    use crate::leasing::testing::lease;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn data() -> ReportData {
        let mut first = blank_invoice(InvoiceId(1), LeaseId(1), ContactId(1), date(2024, 1, 31));
        first.number = Some(1_000_001);
        first.payments = vec![
            InvoicePayment {
                id: InvoicePaymentId(1),
                paid_amount: Money::from_cents(12_000),
                paid_date: date(2024, 2, 10),
                filing_code: Some("F1".to_string()),
            },
            InvoicePayment {
                id: InvoicePaymentId(2),
                paid_amount: Money::from_cents(500),
                paid_date: date(2024, 4, 1),
                filing_code: None,
            },
        ];
        let mut second = blank_invoice(InvoiceId(2), LeaseId(1), ContactId(1), date(2024, 1, 31));
        second.number = Some(1_000_002);
        second.payments = vec![InvoicePayment {
            id: InvoicePaymentId(3),
            paid_amount: Money::from_cents(3_050),
            paid_date: date(2024, 2, 1),
            filing_code: None,
        }];
        ReportData {
            leases: vec![lease(1, "A1104-12")],
            invoices: vec![first, second],
            condition_types: Vec::new(),
        }
    }

    #[test]
    fn selects_payments_in_range_ordered_by_date() {
        let rows = InvoicePaymentsReport.rows(
            &data(),
            &InvoicePaymentsInput {
                start_date: date(2024, 2, 1),
                end_date: date(2024, 3, 31),
            },
        );
        let numbers: Vec<_> = rows.iter().map(|row| row.invoice_number).collect();
        assert_eq!(numbers, [Some(1_000_002), Some(1_000_001)]);
        assert_eq!(rows[0].lease_id, "A1104-12");
    }

    #[test]
    fn csv_ends_with_total_row() {
        let uri: Uri = "/api/v1/reports/invoice_payments/?start_date=2024-01-01&end_date=2024-12-31"
            .parse()
            .expect("uri");
        let output = InvoicePaymentsReport.run(&data(), &uri).expect("report runs");
        assert_eq!(output.total(), Some(Money::from_cents(15_550)));

        let csv = output.to_csv().expect("csv renders");
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "Invoice number,Lease id,Paid date,Paid amount,Filing code"
        );
        assert_eq!(lines[1], "1000002,A1104-12,2024-02-01,30.50,");
        assert_eq!(lines.last().copied(), Some("Total,,,155.50,"));
    }

    #[test]
    fn dates_are_required() {
        let uri: Uri = "/api/v1/reports/invoice_payments/?start_date=2024-01-01"
            .parse()
            .expect("uri");
        assert!(matches!(
            InvoicePaymentsReport.run(&data(), &uri),
            Err(crate::leasing::report::ReportError::InvalidInput(_))
        ));
    }
}
