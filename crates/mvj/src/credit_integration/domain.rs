use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::UserId;
use crate::leasing::domain::ContactId;

entity_id!(CreditDecisionId);
entity_id!(CreditDecisionLogId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditDecisionStatus {
    Consent,
    NoConsent,
    ManualProcessing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditDecisionReason {
    pub reason_code: String,
    pub reason: String,
}

/// Stored outcome of a business credit inquiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditDecision {
    pub id: CreditDecisionId,
    /// Contact whose business id the inquiry was made for, when one is on file.
    pub customer: Option<ContactId>,
    pub business_id: String,
    pub official_name: Option<String>,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    pub business_entity: Option<String>,
    pub operation_start_date: Option<NaiveDate>,
    pub industry_code: Option<String>,
    pub status: CreditDecisionStatus,
    pub reasons: Vec<CreditDecisionReason>,
    pub claimant: UserId,
    pub created_at: DateTime<Utc>,
    pub original_data: Value,
}

/// Audit line written for every inquiry, business or person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditDecisionLog {
    pub id: CreditDecisionLogId,
    pub identification: String,
    pub user: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a person inquiry. Nothing identifying beyond the inquiry itself is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonDecision {
    pub identity_number: String,
    pub status: CreditDecisionStatus,
    pub reasons: Vec<CreditDecisionReason>,
}

/// Company details reported by the bureau alongside a business decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyDetails {
    #[serde(default)]
    pub official_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub business_entity: Option<String>,
    #[serde(default)]
    pub operation_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub industry_code: Option<String>,
}

/// Decision as returned by a [`super::CreditBureau`].
#[derive(Debug, Clone, PartialEq)]
pub struct BureauReport {
    pub status: CreditDecisionStatus,
    pub reasons: Vec<CreditDecisionReason>,
    pub company: CompanyDetails,
    pub raw: Value,
}

/// Finnish business ids: seven digits, a dash, and a check digit.
pub fn is_business_id(value: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\d{7}-\d$").expect("static pattern compiles"))
        .is_match(value)
}
