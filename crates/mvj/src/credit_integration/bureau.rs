use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::CreditBureauConfig;

use super::domain::{BureauReport, CompanyDetails, CreditDecisionReason, CreditDecisionStatus};
use super::CreditIntegrationError;

/// Failure talking to the credit bureau.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BureauError {
    #[error("credit bureau request failed: {0}")]
    Transport(String),
    #[error("credit bureau answered with status {0}")]
    Status(u16),
    #[error("credit bureau response could not be read: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for BureauError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            BureauError::Decode(value.to_string())
        } else {
            BureauError::Transport(value.to_string())
        }
    }
}

/// External credit bureau answering business and person inquiries.
#[async_trait]
pub trait CreditBureau: Send + Sync {
    async fn business_decision(&self, business_id: &str) -> Result<BureauReport, BureauError>;
    async fn person_decision(&self, identity_number: &str) -> Result<BureauReport, BureauError>;
}

/// Picks the bureau implementation the configuration asks for.
pub fn bureau_from_config(
    config: &CreditBureauConfig,
) -> Result<Arc<dyn CreditBureau>, CreditIntegrationError> {
    if config.mock {
        return Ok(Arc::new(MockCreditBureau));
    }
    let url = config
        .url
        .as_deref()
        .ok_or(CreditIntegrationError::BureauNotConfigured)?;
    let bureau = HttpCreditBureau::new(url, &config.user, &config.password, config.timeout)?;
    Ok(Arc::new(bureau))
}

#[derive(Debug, Deserialize)]
struct WireReport {
    status: CreditDecisionStatus,
    #[serde(default)]
    reasons: Vec<CreditDecisionReason>,
    #[serde(default)]
    company: CompanyDetails,
}

/// JSON client for the bureau's `business` and `person` endpoints, using basic auth.
pub struct HttpCreditBureau {
    client: Client,
    base_url: String,
    user: String,
    password: String,
}

impl HttpCreditBureau {
    pub fn new(
        base_url: &str,
        user: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, CreditIntegrationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CreditIntegrationError::Bureau(err.into()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    async fn inquire(&self, path: &str, body: Value) -> Result<BureauReport, BureauError> {
        let endpoint = format!("{}/{path}", self.base_url);
        debug!(%endpoint, "sending credit bureau inquiry");
        let response = self
            .client
            .post(&endpoint)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), "credit bureau responded");
        if !status.is_success() {
            return Err(BureauError::Status(status.as_u16()));
        }

        let raw: Value = response.json().await?;
        let report: WireReport = serde_json::from_value(raw.clone())
            .map_err(|err| BureauError::Decode(err.to_string()))?;
        Ok(BureauReport {
            status: report.status,
            reasons: report.reasons,
            company: report.company,
            raw,
        })
    }
}

#[async_trait]
impl CreditBureau for HttpCreditBureau {
    async fn business_decision(&self, business_id: &str) -> Result<BureauReport, BureauError> {
        self.inquire("business", json!({ "business_id": business_id }))
            .await
    }

    async fn person_decision(&self, identity_number: &str) -> Result<BureauReport, BureauError> {
        self.inquire("person", json!({ "identity_number": identity_number }))
            .await
    }
}

/// Offline bureau: consent unless the identification ends in `0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockCreditBureau;

impl MockCreditBureau {
    fn report(identification: &str, company: CompanyDetails) -> BureauReport {
        let (status, reasons) = if identification.ends_with('0') {
            (
                CreditDecisionStatus::NoConsent,
                vec![CreditDecisionReason {
                    reason_code: "011".to_string(),
                    reason: "Payment defaults on record".to_string(),
                }],
            )
        } else {
            (CreditDecisionStatus::Consent, Vec::new())
        };
        let raw = json!({
            "identification": identification,
            "status": status,
            "reasons": reasons,
            "company": company,
        });
        BureauReport {
            status,
            reasons,
            company,
            raw,
        }
    }
}

#[async_trait]
impl CreditBureau for MockCreditBureau {
    async fn business_decision(&self, business_id: &str) -> Result<BureauReport, BureauError> {
        let company = CompanyDetails {
            official_name: Some(format!("Company {business_id}")),
            business_entity: Some("Osakeyhtiö".to_string()),
            ..CompanyDetails::default()
        };
        Ok(Self::report(business_id, company))
    }

    async fn person_decision(&self, identity_number: &str) -> Result<BureauReport, BureauError> {
        Ok(Self::report(identity_number, CompanyDetails::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn bureau(server: &MockServer, timeout: Duration) -> HttpCreditBureau {
        HttpCreditBureau::new(&server.base_url(), "mvj", "secret", timeout)
            .expect("client builds")
    }

    #[tokio::test]
    async fn business_inquiry_posts_credentials_and_parses_company() {
        let server = MockServer::start_async().await;
        let inquiry = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/business")
                    .header("authorization", "Basic bXZqOnNlY3JldA==")
                    .json_body(json!({ "business_id": "1234567-8" }));
                then.status(200)
                    .header("Content-Type", "application/json")
                    .json_body(json!({
                        "status": "manual_processing",
                        "reasons": [{ "reason_code": "020", "reason": "Company is new" }],
                        "company": {
                            "official_name": "Testi Oy",
                            "operation_start_date": "2023-05-01",
                            "industry_code": "68200"
                        }
                    }));
            })
            .await;

        let report = bureau(&server, Duration::from_secs(5))
            .business_decision("1234567-8")
            .await
            .expect("bureau answers");

        inquiry.assert_async().await;
        assert_eq!(report.status, CreditDecisionStatus::ManualProcessing);
        assert_eq!(report.reasons[0].reason_code, "020");
        assert_eq!(report.company.official_name.as_deref(), Some("Testi Oy"));
        assert_eq!(
            report.company.operation_start_date,
            chrono::NaiveDate::from_ymd_opt(2023, 5, 1)
        );
        assert_eq!(report.raw["company"]["industry_code"], "68200");
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start_async().await;
        let inquiry = server
            .mock_async(|when, then| {
                when.method(POST).path("/person");
                then.status(503);
            })
            .await;

        let err = bureau(&server, Duration::from_secs(5))
            .person_decision("010101-123N")
            .await
            .expect_err("bureau is down");

        inquiry.assert_async().await;
        assert_eq!(err, BureauError::Status(503));
    }

    #[tokio::test]
    async fn unexpected_body_is_a_decode_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/business");
                then.status(200).json_body(json!({ "verdict": "yes" }));
            })
            .await;

        let err = bureau(&server, Duration::from_secs(5))
            .business_decision("1234567-8")
            .await
            .expect_err("status is missing");
        assert!(matches!(err, BureauError::Decode(_)));
    }

    #[tokio::test]
    async fn slow_bureau_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/business");
                then.status(200)
                    .delay(Duration::from_millis(500))
                    .json_body(json!({ "status": "consent" }));
            })
            .await;

        let err = bureau(&server, Duration::from_millis(50))
            .business_decision("1234567-8")
            .await
            .expect_err("request times out");
        assert!(matches!(err, BureauError::Transport(_)));
    }

    #[tokio::test]
    async fn mock_bureau_refuses_ids_ending_in_zero() {
        let consent = MockCreditBureau
            .business_decision("1234567-8")
            .await
            .expect("mock answers");
        assert_eq!(consent.status, CreditDecisionStatus::Consent);
        assert!(consent.reasons.is_empty());

        let refusal = MockCreditBureau
            .business_decision("1234567-0")
            .await
            .expect("mock answers");
        assert_eq!(refusal.status, CreditDecisionStatus::NoConsent);
        assert_eq!(refusal.reasons.len(), 1);
    }

    #[test]
    fn configuration_without_url_is_rejected_unless_mocked() {
        let mut config = CreditBureauConfig {
            url: None,
            user: String::new(),
            password: String::new(),
            timeout: Duration::from_secs(1),
            mock: false,
        };
        assert!(matches!(
            bureau_from_config(&config),
            Err(CreditIntegrationError::BureauNotConfigured)
        ));
        config.mock = true;
        assert!(bureau_from_config(&config).is_ok());
    }
}
