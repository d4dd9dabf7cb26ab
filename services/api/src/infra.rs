use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use mvj::error::AppError;
use mvj::store::memory::ReferenceData;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

const REFERENCE_DATA: &str = include_str!("../data/reference.json");

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Receivable types, holidays and the other lookup tables every deployment starts with.
pub(crate) fn reference_data() -> Result<ReferenceData, AppError> {
    Ok(serde_json::from_str(REFERENCE_DATA)?)
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_reference_data_parses() {
        let reference = reference_data().expect("reference data");
        assert!(!reference.receivable_types.is_empty());
        assert!(reference
            .plot_search_subtypes
            .iter()
            .all(|subtype| reference
                .plot_search_types
                .iter()
                .any(|kind| kind.id == subtype.plot_search_type)));
    }

    #[test]
    fn parse_date_reports_the_offending_value() {
        assert_eq!(
            parse_date(" 2024-02-29 "),
            Ok(NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date"))
        );
        assert!(parse_date("29.2.2024")
            .expect_err("finnish format rejected")
            .contains("29.2.2024"));
    }
}
